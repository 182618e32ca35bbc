use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuiverError {
    // Construction errors
    #[error("construction error in {op}: {reason}")]
    Construction { op: &'static str, reason: String },

    // Shape errors
    #[error("dimension error in {op}: {reason}")]
    Dimension { op: &'static str, reason: String },

    // Lifecycle errors
    #[error("index not trained: {op} requires a trained '{description}' index")]
    NotTrained {
        op: &'static str,
        description: String,
    },

    #[error("unsupported operation {op}: {reason}")]
    Unsupported { op: &'static str, reason: String },

    // Residency errors
    #[error("accelerator unavailable: {reason}")]
    Unavailable { reason: String },

    // Lookup errors
    #[error("id not found in {op}: {id}")]
    NotFound { op: &'static str, id: i64 },

    // Codec errors
    #[error("corrupt index data: {0}")]
    CorruptData(String),

    #[error("unsupported format version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    // Host boundary errors
    #[error("invalid handle: {handle}")]
    InvalidHandle { handle: u64 },

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Box<bincode::ErrorKind>> for QuiverError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        QuiverError::CorruptData(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuiverError>;

impl QuiverError {
    pub fn construction(op: &'static str, reason: impl Into<String>) -> Self {
        QuiverError::Construction {
            op,
            reason: reason.into(),
        }
    }

    pub fn dimension(op: &'static str, reason: impl Into<String>) -> Self {
        QuiverError::Dimension {
            op,
            reason: reason.into(),
        }
    }

    pub fn unsupported(op: &'static str, reason: impl Into<String>) -> Self {
        QuiverError::Unsupported {
            op,
            reason: reason.into(),
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        QuiverError::CorruptData(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        QuiverError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Stable tag for mapping errors across the host boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            QuiverError::Construction { .. } => "construction_error",
            QuiverError::Dimension { .. } => "dimension_error",
            QuiverError::NotTrained { .. } => "not_trained_error",
            QuiverError::Unsupported { .. } => "unsupported_error",
            QuiverError::Unavailable { .. } => "unavailable_error",
            QuiverError::NotFound { .. } => "not_found_error",
            QuiverError::CorruptData(_) => "corrupt_data_error",
            QuiverError::UnsupportedVersion { .. } => "unsupported_version_error",
            QuiverError::InvalidHandle { .. } => "invalid_handle",
            QuiverError::Config(_) => "config_error",
            QuiverError::Io(_) => "io_error",
            QuiverError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = QuiverError::dimension("train", "n must be positive, got 0");
        assert_eq!(
            err.to_string(),
            "dimension error in train: n must be positive, got 0"
        );

        let err = QuiverError::NotFound {
            op: "reconstruct_batch",
            id: 999,
        };
        assert_eq!(err.to_string(), "id not found in reconstruct_batch: 999");
        assert_eq!(err.kind(), "not_found_error");
    }

    #[test]
    fn test_bincode_error_is_corrupt_data() {
        let bad: std::result::Result<String, _> = bincode::deserialize(&[0xff, 0xff]);
        let err: QuiverError = bad.unwrap_err().into();
        assert!(matches!(err, QuiverError::CorruptData(_)));
    }
}
