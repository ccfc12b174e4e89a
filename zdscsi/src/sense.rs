// SPDX-License-Identifier: MIT

//! SCSI sense data and the mapping from core protocol errors.

use zdcore::errors::ZbcError;

/// Sense keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenseKey {
    NoSense = 0x0,
    MediumError = 0x3,
    HardwareError = 0x4,
    IllegalRequest = 0x5,
    DataProtect = 0x7,
}

// Additional sense code / qualifier pairs.
pub const ASC_READ_ERROR: u16 = 0x1100;
pub const ASC_WRITE_ERROR: u16 = 0x0C00;
pub const ASC_LBA_OUT_OF_RANGE: u16 = 0x2100;
pub const ASC_PARAMETER_LIST_LENGTH_ERROR: u16 = 0x1A00;
pub const ASC_INVALID_FIELD_IN_CDB: u16 = 0x2400;
pub const ASC_INVALID_FIELD_IN_PARAMETER_LIST: u16 = 0x2600;
pub const ASC_INTERNAL_TARGET_FAILURE: u16 = 0x4400;
pub const ASC_UNALIGNED_WRITE_COMMAND: u16 = 0x2104;
pub const ASC_WRITE_BOUNDARY_VIOLATION: u16 = 0x2105;
pub const ASC_ATTEMPT_TO_READ_INVALID_DATA: u16 = 0x2106;
pub const ASC_READ_BOUNDARY_VIOLATION: u16 = 0x2107;
pub const ASC_INSUFFICIENT_ZONE_RESOURCES: u16 = 0x550E;
pub const ASC_ZONE_IS_OFFLINE: u16 = 0x2C0E;
pub const ASC_ZONE_IS_READ_ONLY: u16 = 0x2708;
pub const ASC_ZONE_IS_INACTIVE: u16 = 0x2C12;
pub const ASC_ATTEMPT_TO_ACCESS_GAP_ZONE: u16 = 0x2109;

/// One sense entry: key plus the ASC/ASCQ pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    pub key: SenseKey,
    pub asc_ascq: u16,
}

impl SenseData {
    pub fn new(key: SenseKey, asc_ascq: u16) -> Self {
        Self { key, asc_ascq }
    }

    /// Pack into the deferred-sense FIFO entry form.
    pub fn packed(&self) -> u32 {
        (self.key as u32) << 16 | self.asc_ascq as u32
    }

    pub fn from_packed(v: u32) -> Self {
        let key = match (v >> 16) & 0x0f {
            0x3 => SenseKey::MediumError,
            0x4 => SenseKey::HardwareError,
            0x5 => SenseKey::IllegalRequest,
            0x7 => SenseKey::DataProtect,
            _ => SenseKey::NoSense,
        };
        Self {
            key,
            asc_ascq: v as u16,
        }
    }
}

/// Outcome of one SCSI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdStatus {
    Good,
    CheckCondition(SenseData),
    NotHandled,
}

impl CmdStatus {
    pub fn sense(key: SenseKey, asc_ascq: u16) -> CmdStatus {
        CmdStatus::CheckCondition(SenseData::new(key, asc_ascq))
    }

    pub fn is_good(&self) -> bool {
        matches!(self, CmdStatus::Good)
    }
}

impl From<ZbcError> for CmdStatus {
    fn from(e: ZbcError) -> CmdStatus {
        use SenseKey::*;
        let (key, asc) = match e {
            ZbcError::LbaOutOfRange => (IllegalRequest, ASC_LBA_OUT_OF_RANGE),
            ZbcError::InvalidFieldInCdb => (IllegalRequest, ASC_INVALID_FIELD_IN_CDB),
            ZbcError::InvalidFieldInParamList => {
                (IllegalRequest, ASC_INVALID_FIELD_IN_PARAMETER_LIST)
            }
            ZbcError::ParamListLengthError => (IllegalRequest, ASC_PARAMETER_LIST_LENGTH_ERROR),
            ZbcError::UnalignedWrite => (IllegalRequest, ASC_UNALIGNED_WRITE_COMMAND),
            ZbcError::WriteBoundaryViolation => (IllegalRequest, ASC_WRITE_BOUNDARY_VIOLATION),
            ZbcError::ReadBoundaryViolation => (IllegalRequest, ASC_READ_BOUNDARY_VIOLATION),
            ZbcError::ReadInvalidData => (IllegalRequest, ASC_ATTEMPT_TO_READ_INVALID_DATA),
            ZbcError::AccessGapZone => (IllegalRequest, ASC_ATTEMPT_TO_ACCESS_GAP_ZONE),
            ZbcError::ZoneIsInactive => (DataProtect, ASC_ZONE_IS_INACTIVE),
            ZbcError::ZoneIsOffline => (DataProtect, ASC_ZONE_IS_OFFLINE),
            ZbcError::ZoneIsReadOnly => (DataProtect, ASC_ZONE_IS_READ_ONLY),
            ZbcError::InsufficientZoneResources => {
                (DataProtect, ASC_INSUFFICIENT_ZONE_RESOURCES)
            }
            ZbcError::ReadError => (MediumError, ASC_READ_ERROR),
            ZbcError::WriteError => (MediumError, ASC_WRITE_ERROR),
            ZbcError::Internal(_) => (HardwareError, ASC_INTERNAL_TARGET_FAILURE),
        };
        CmdStatus::sense(key, asc)
    }
}

/// Map a core result onto a command status.
pub fn status_of(res: Result<(), ZbcError>) -> CmdStatus {
    match res {
        Ok(()) => CmdStatus::Good,
        Err(e) => e.into(),
    }
}
