use std::io;

/// All error types for the CDB-to-3D-Tiles pipeline.
#[derive(thiserror::Error, Debug)]
pub enum CdbError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Parse failure: {0}")]
    ParseFailure(String),
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for CdbError {
    fn from(e: serde_json::Error) -> Self {
        CdbError::ParseFailure(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_strings() {
        let e = CdbError::Config("unknown dataset".into());
        assert_eq!(e.to_string(), "Config error: unknown dataset");

        let e = CdbError::OutOfRange("level -11".into());
        assert_eq!(e.to_string(), "Value out of range: level -11");

        let e = CdbError::ParseFailure("bad filename".into());
        assert_eq!(e.to_string(), "Parse failure: bad filename");

        let e = CdbError::PreconditionViolation("negative_child on L>=0".into());
        assert_eq!(
            e.to_string(),
            "Precondition violation: negative_child on L>=0"
        );
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let e: CdbError = io_err.into();
        assert!(matches!(e, CdbError::Io(_)));
        assert!(e.to_string().contains("file missing"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let e: CdbError = json_err.into();
        assert!(matches!(e, CdbError::ParseFailure(_)));
    }
}
