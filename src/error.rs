use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OsdError>;

/// Closed error taxonomy of the container core.
///
/// All fatal conditions propagate to the caller; the core attempts no
/// partial recovery.  A synthetic-channel fallback during resolution is
/// deliberately NOT an error — it is logged and the read continues.
#[derive(Error, Debug)]
pub enum OsdError {
    /// Unknown or unparsable version tag.  The file is rejected outright.
    #[error("unsupported container format version: {0}")]
    UnsupportedFormatVersion(String),

    /// A required descriptor key is absent or a count/pointer is unparsable.
    #[error("malformed record set descriptor: {0}")]
    MalformedDescriptor(String),

    /// A skip or read ran past end-of-stream.
    #[error("container truncated: {0}")]
    TruncatedContainer(String),

    /// A framed line exceeds the 16-bit length prefix of versions ≤3.
    /// Such files require format version 4.
    #[error("framed line of {len} bytes exceeds the 64KB limit of format versions <= 3; version 4 is required")]
    DescriptorTooLong { len: usize },

    /// The caller's confirmation callback declined a device-name or
    /// object-key mismatch.  A clean abort, not a file defect.
    #[error("read aborted by caller confirmation")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid UTF-8 in framed line")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl OsdError {
    /// Rewrap an unexpected-EOF I/O error as [`OsdError::TruncatedContainer`];
    /// anything else stays an I/O error.
    pub(crate) fn from_read(err: io::Error, context: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            OsdError::TruncatedContainer(context.to_string())
        } else {
            OsdError::Io(err)
        }
    }
}
