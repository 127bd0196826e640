use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftCalError {
    #[error("Unable to allocate a calibration record for key: {key}")]
    RecordAllocation { key: String },

    #[error("Malformed histogram blob: {0}")]
    MalformedHistogramBlob(String),

    #[error("Unknown sub-module key: {0}")]
    UnknownKey(String),

    #[error("Sub-module already calibrated: {0}")]
    AlreadyCalibrated(String),

    #[error("Parent record missing or not calibrated for key {key} at level {level}")]
    MissingParent { key: String, level: u8 },

    #[error("Invalid hierarchy level: {0}")]
    InvalidLevel(i64),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid calibrator parameter: {0}")]
    InvalidCalibratorParameter(String),

    #[error("Error during the old constants parsing: {0}")]
    OldConstantsParsing(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV output error: {0}")]
    CsvError(#[from] csv::Error),
}

impl PartialEq for DriftCalError {
    fn eq(&self, other: &Self) -> bool {
        use DriftCalError::*;
        match (self, other) {
            (RecordAllocation { key: a }, RecordAllocation { key: b }) => a == b,
            (MalformedHistogramBlob(a), MalformedHistogramBlob(b)) => a == b,
            (UnknownKey(a), UnknownKey(b)) => a == b,
            (AlreadyCalibrated(a), AlreadyCalibrated(b)) => a == b,
            (
                MissingParent {
                    key: ka,
                    level: la,
                },
                MissingParent {
                    key: kb,
                    level: lb,
                },
            ) => ka == kb && la == lb,
            (InvalidLevel(a), InvalidLevel(b)) => a == b,
            (InvalidSelection(a), InvalidSelection(b)) => a == b,
            (InvalidCalibratorParameter(a), InvalidCalibratorParameter(b)) => a == b,
            (OldConstantsParsing(a), OldConstantsParsing(b)) => a == b,

            // foreign errors: same variant is enough
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            _ => false,
        }
    }
}
