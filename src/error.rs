use std::io;

/// Filesystem error type
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Device or codec failure; fatal to the enclosing operation
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// An inode or data-block bitmap is exhausted
    #[error("no space left in bitmap")]
    NoSpace,

    /// Lookup miss, or a dentry absent from its parent's child list
    #[error("entry not found")]
    NotFound,

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Operation not supported
    #[error("operation not supported")]
    Unsupported,
}

// Record codec failures surface through the same kind as device failures:
// a record that cannot be decoded is indistinguishable from a bad read.
impl From<bincode::error::DecodeError> for FsError {
    fn from(e: bincode::error::DecodeError) -> Self {
        FsError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl From<bincode::error::EncodeError> for FsError {
    fn from(e: bincode::error::EncodeError) -> Self {
        FsError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
