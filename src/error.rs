use std::fmt;
use std::io;
use std::sync::Arc;

use crate::android::zip::ApkZipError;
use crate::dex::DexError;

/// Errors of the opener pipeline.
///
/// Outcomes of a batch are shared with every thread waiting on it, so the
/// error is cheap to clone.
#[derive(Debug, Clone)]
pub enum OpenerError {
    /// Reading the archive, decoding or encoding a dex, or writing the cache.
    Io(Arc<io::Error>),
    /// A name the filter accepts that the archive does not define, or an
    /// unusable configuration.
    IllegalState(String),
    /// A runtime fault signalled by the container loader.
    Loader(String),
    Unexpected(String),
}

impl OpenerError {
    pub fn illegal_state(msg: impl Into<String>) -> OpenerError {
        OpenerError::IllegalState(msg.into())
    }

    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            OpenerError::Io(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for OpenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenerError::Io(e) => write!(f, "I/O error: {}", e),
            OpenerError::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            OpenerError::Loader(msg) => write!(f, "loader error: {}", msg),
            OpenerError::Unexpected(msg) => write!(f, "unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for OpenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenerError::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for OpenerError {
    fn from(e: io::Error) -> Self {
        OpenerError::Io(Arc::new(e))
    }
}

/// A malformed dex file is bad input data.
impl From<DexError> for OpenerError {
    fn from(e: DexError) -> Self {
        OpenerError::Io(Arc::new(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

impl From<ApkZipError> for OpenerError {
    fn from(e: ApkZipError) -> Self {
        match e {
            ApkZipError::Io(e) => OpenerError::from(e),
            ApkZipError::Zip(zip::result::ZipError::Io(e)) => OpenerError::from(e),
            other => OpenerError::Io(Arc::new(io::Error::new(io::ErrorKind::InvalidData, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dex_errors_are_invalid_data() {
        let e: OpenerError = DexError::new("Invalid magic value").into();
        assert_eq!(e.io_kind(), Some(io::ErrorKind::InvalidData));
        assert!(e.to_string().contains("Invalid magic value"));
    }

    #[test]
    fn archive_io_errors_keep_their_kind() {
        let e: OpenerError = ApkZipError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).into();
        assert_eq!(e.io_kind(), Some(io::ErrorKind::NotFound));
        let e: OpenerError = ApkZipError::InvalidInput("bad name".to_string()).into();
        assert_eq!(e.io_kind(), Some(io::ErrorKind::InvalidData));
    }

    #[test]
    fn clones_share_the_io_error() {
        let e = OpenerError::from(io::Error::new(io::ErrorKind::PermissionDenied, "cache"));
        let copy = e.clone();
        match (&e, &copy) {
            (OpenerError::Io(a), OpenerError::Io(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => unreachable!(),
        }
        assert_eq!(OpenerError::illegal_state("x").to_string(), "illegal state: x");
    }
}
