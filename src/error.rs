use thiserror::Error;

/// Errors produced while decoding archives and packages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("format error: {0}")]
    Format(String),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("index is encrypted but no key was provided")]
    MissingKey,

    #[error("the provided key does not decrypt the index")]
    BadKey,

    #[error("corrupt pak primary index: {reason} (offset {offset}, size {size})")]
    CorruptIndex {
        reason: String,
        offset: i64,
        size: i64,
    },

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("list-indirection entry at encoded location {0} is not supported")]
    UnsupportedIndirection(i32),

    #[error("bad name index {index} (name map holds {count} names)")]
    BadNameIndex { index: i32, count: usize },

    #[error("bad package index {index}: {reason}")]
    BadPackageIndex { index: i32, reason: &'static str },

    #[error("index has already been read")]
    IndexAlreadyRead,

    #[error("index has not been read yet")]
    IndexNotRead,

    #[error("no entry named {0}")]
    EntryNotFound(String),

    #[error("invalid AES key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Utf16(#[from] std::string::FromUtf16Error),
}

impl Error {
    /// Whether a property decoder may skip the offending tag and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnsupportedFeature(_))
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedFeature(message.into())
    }

    pub(crate) fn corrupt_index(reason: impl Into<String>, offset: i64, size: i64) -> Self {
        Error::CorruptIndex {
            reason: reason.into(),
            offset,
            size,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unsupported_features_are_recoverable() {
        assert!(Error::unsupported("DelegateProperty").is_recoverable());
        assert!(!Error::format("bad magic").is_recoverable());
        assert!(!Error::BadNameIndex { index: 9, count: 2 }.is_recoverable());
        assert!(!Error::corrupt_index("no secondary index", 0, 0).is_recoverable());
    }

    #[test]
    fn corrupt_index_reports_context() {
        let message = Error::corrupt_index("path hash index out of bounds", 4096, 128).to_string();

        assert!(message.contains("4096"));
        assert!(message.contains("128"));
    }
}
