// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for BlockIO operations.
pub type BlockIOResult<T = ()> = Result<T, BlockIOError>;

/// Error type for BlockIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIOError {
    /// Underlying device I/O error.
    Error(&'static str),

    /// Attempted to read or write out of bounds.
    OutOfBounds,

    /// A read or write moved fewer bytes than requested.
    Short,

    /// Unsupported operation for this backend.
    Unsupported,
}

impl BlockIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            BlockIOError::Error(msg) => msg,
            BlockIOError::OutOfBounds => "Out of bounds",
            BlockIOError::Short => "Short transfer",
            BlockIOError::Unsupported => "Unsupported operation",
        }
    }
}

impl fmt::Display for BlockIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

impl std::error::Error for BlockIOError {}

impl From<std::io::Error> for BlockIOError {
    #[cold]
    #[inline(never)]
    fn from(e: std::io::Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked: &'static str = Box::leak(e.to_string().into_boxed_str());
        BlockIOError::Error(leaked)
    }
}
