// SPDX-License-Identifier: MIT

use core::fmt;

pub use zdio::error::{BlockIOError, BlockIOResult};

/// Configuration-string errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(&'static str),
    Other(&'static str),
}

impl ConfigError {
    pub fn msg(&self) -> &'static str {
        match self {
            ConfigError::Invalid(msg) => msg,
            ConfigError::Other(msg) => msg,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

/// Formatter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    IO(BlockIOError),
    Invalid(&'static str),
    Other(&'static str),
}

impl FormatError {
    pub fn msg(&self) -> &'static str {
        match self {
            FormatError::IO(_) => "IO error",
            FormatError::Invalid(msg) => msg,
            FormatError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<DevError> {
        match self {
            FormatError::IO(e) => Some(DevError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let Some(src) = self.source() {
            write!(f, "\n  caused by: {}", src.msg())?;
        }
        Ok(())
    }
}

impl From<BlockIOError> for FormatError {
    #[inline]
    fn from(e: BlockIOError) -> Self {
        FormatError::IO(e)
    }
}

/// Protocol/state errors raised by zone, realm and data-path operations.
/// Each variant has a fixed sense mapping in the SCSI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZbcError {
    LbaOutOfRange,
    InvalidFieldInCdb,
    InvalidFieldInParamList,
    ParamListLengthError,
    UnalignedWrite,
    WriteBoundaryViolation,
    ReadBoundaryViolation,
    ReadInvalidData,
    AccessGapZone,
    ZoneIsInactive,
    ZoneIsOffline,
    ZoneIsReadOnly,
    InsufficientZoneResources,
    ReadError,
    WriteError,
    Internal(&'static str),
}

impl ZbcError {
    pub fn msg(&self) -> &'static str {
        match self {
            ZbcError::LbaOutOfRange => "LBA out of range",
            ZbcError::InvalidFieldInCdb => "Invalid field in CDB",
            ZbcError::InvalidFieldInParamList => "Invalid field in parameter list",
            ZbcError::ParamListLengthError => "Parameter list length error",
            ZbcError::UnalignedWrite => "Unaligned write command",
            ZbcError::WriteBoundaryViolation => "Write boundary violation",
            ZbcError::ReadBoundaryViolation => "Read boundary violation",
            ZbcError::ReadInvalidData => "Attempt to read invalid data",
            ZbcError::AccessGapZone => "Attempt to access GAP zone",
            ZbcError::ZoneIsInactive => "Zone is inactive",
            ZbcError::ZoneIsOffline => "Zone is offline",
            ZbcError::ZoneIsReadOnly => "Zone is read-only",
            ZbcError::InsufficientZoneResources => "Insufficient zone resources",
            ZbcError::ReadError => "Read error",
            ZbcError::WriteError => "Write error",
            ZbcError::Internal(msg) => msg,
        }
    }
}

impl fmt::Display for ZbcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

/// Top-level device error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    IO(BlockIOError),
    Config(ConfigError),
    Format(FormatError),
    Zbc(ZbcError),
    Other(&'static str),
}

impl DevError {
    pub fn msg(&self) -> &'static str {
        match self {
            DevError::IO(e) => e.msg(),
            DevError::Config(e) => e.msg(),
            DevError::Format(e) => e.msg(),
            DevError::Zbc(e) => e.msg(),
            DevError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<DevError> {
        match self {
            DevError::Format(e) => e.source(),
            _ => None,
        }
    }
}

impl fmt::Display for DevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

impl std::error::Error for DevError {}

// === type aliases ===

pub type DevResult<T = ()> = Result<T, DevError>;
pub type ConfigResult<T = ()> = Result<T, ConfigError>;
pub type FormatResult<T = ()> = Result<T, FormatError>;
pub type ZbcResult<T = ()> = Result<T, ZbcError>;

crate::dev_error_wiring! {
    top => DevError {
        BlockIOError : IO,
        ConfigError  : Config,
        FormatError  : Format,
        ZbcError     : Zbc,
    },
    str_into => [
        ConfigError,
        FormatError,
    ],
}
