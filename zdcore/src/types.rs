// SPDX-License-Identifier: MIT

use bitflags::bitflags;

/// Zone types as they appear on the wire and in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZoneType {
    Conventional = 0x1,
    SeqWriteReq = 0x2,
    SeqWritePref = 0x3,
    /// Sequential-or-before-required, aka SOBR.
    SeqOrBefReq = 0x4,
    Gap = 0x5,
}

/// Number of activatable zone types (GAP zones excluded).
pub const NR_ZONE_TYPES: usize = 4;

impl ZoneType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x1 => ZoneType::Conventional,
            0x2 => ZoneType::SeqWriteReq,
            0x3 => ZoneType::SeqWritePref,
            0x4 => ZoneType::SeqOrBefReq,
            0x5 => ZoneType::Gap,
            _ => return None,
        })
    }

    /// True for the sequential (SMR-side) types.
    pub fn is_seq(self) -> bool {
        matches!(self, ZoneType::SeqWriteReq | ZoneType::SeqWritePref)
    }

    /// True for the non-WP (CMR-side) types.
    pub fn is_cmr(self) -> bool {
        matches!(self, ZoneType::Conventional | ZoneType::SeqOrBefReq)
    }
}

/// Zone conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZoneCond {
    NotWp = 0x0,
    Empty = 0x1,
    ImpOpen = 0x2,
    ExpOpen = 0x3,
    Closed = 0x4,
    Inactive = 0x5,
    ReadOnly = 0xD,
    Full = 0xE,
    Offline = 0xF,
}

impl ZoneCond {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x0 => ZoneCond::NotWp,
            0x1 => ZoneCond::Empty,
            0x2 => ZoneCond::ImpOpen,
            0x3 => ZoneCond::ExpOpen,
            0x4 => ZoneCond::Closed,
            0x5 => ZoneCond::Inactive,
            0xD => ZoneCond::ReadOnly,
            0xE => ZoneCond::Full,
            0xF => ZoneCond::Offline,
            _ => return None,
        })
    }
}

/// Device types a backing file can be formatted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DeviceType {
    NonZoned = 0x01,
    HmZoned = 0x02,
    HaZoned = 0x03,
    ZoneDomains = 0x04,
}

impl DeviceType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0x01 => DeviceType::NonZoned,
            0x02 => DeviceType::HmZoned,
            0x03 => DeviceType::HaZoned,
            0x04 => DeviceType::ZoneDomains,
            _ => return None,
        })
    }

    pub fn is_zoned(self) -> bool {
        matches!(
            self,
            DeviceType::HmZoned | DeviceType::HaZoned | DeviceType::ZoneDomains
        )
    }
}

/// Model options for the non-zoned device type.
pub const MO_NZ_GENERIC: u32 = 0x01;

/// Model options for the HM/HA zoned device types.
pub const MO_SMR_NO_CMR: u32 = 0x01;
pub const MO_SMR_1PCNT_B: u32 = 0x02;
pub const MO_SMR_2PCNT_BT: u32 = 0x03;
pub const MO_SMR_FAULTY: u32 = 0x04;

/// Model options for the Zone Domains device type.
pub const MO_ZD_NO_CMR: u32 = 0x01;
pub const MO_ZD_1_CMR_BOT: u32 = 0x02;
pub const MO_ZD_1_CMR_BOT_TOP: u32 = 0x03;
pub const MO_ZD_SOBR_NO_CMR: u32 = 0x04;
pub const MO_ZD_1_CMR_BT_SWR: u32 = 0x05;
pub const MO_ZD_BBONE: u32 = 0x06;
pub const MO_ZD_FAULTY: u32 = 0x07;
pub const MO_ZD_SWP: u32 = 0x08;
pub const MO_ZD_SOBR_SWP: u32 = 0x09;
pub const MO_ZD_SOBR_EMPTY: u32 = 0x0a;
pub const MO_ZD_SOBR_FAULTY: u32 = 0x0b;
pub const MO_ZD_1_SOBR_BT_TOP: u32 = 0x0c;

bitflags! {
    /// Realm activation capability flags, one bit per zone type.
    /// Bit position is `zone_type - 1`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActvFlags: u8 {
        const CONV = 1 << (ZoneType::Conventional as u8 - 1);
        const SEQ_REQ = 1 << (ZoneType::SeqWriteReq as u8 - 1);
        const SEQ_PREF = 1 << (ZoneType::SeqWritePref as u8 - 1);
        const SOBR = 1 << (ZoneType::SeqOrBefReq as u8 - 1);
    }
}

impl ActvFlags {
    pub fn for_type(zt: ZoneType) -> Self {
        ActvFlags::from_bits_truncate(1 << (zt as u8 - 1))
    }
}

/// REPORT ZONES reporting options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RzReportOption {
    All = 0x00,
    Empty = 0x01,
    ImpOpen = 0x02,
    ExpOpen = 0x03,
    Closed = 0x04,
    Full = 0x05,
    ReadOnly = 0x06,
    Offline = 0x07,
    Inactive = 0x08,
    RwpRecommended = 0x10,
    NonSeq = 0x11,
    Gap = 0x3e,
    NotWp = 0x3f,
}

/// Partial-report flag in the REPORT ZONES reporting-option byte.
pub const RZ_RO_PARTIAL: u8 = 0x80;

impl RzReportOption {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => RzReportOption::All,
            0x01 => RzReportOption::Empty,
            0x02 => RzReportOption::ImpOpen,
            0x03 => RzReportOption::ExpOpen,
            0x04 => RzReportOption::Closed,
            0x05 => RzReportOption::Full,
            0x06 => RzReportOption::ReadOnly,
            0x07 => RzReportOption::Offline,
            0x08 => RzReportOption::Inactive,
            0x10 => RzReportOption::RwpRecommended,
            0x11 => RzReportOption::NonSeq,
            0x3e => RzReportOption::Gap,
            0x3f => RzReportOption::NotWp,
            _ => return None,
        })
    }
}

/// REPORT ZONE DOMAINS reporting options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RzdReportOption {
    All = 0x00,
    AllActive = 0x01,
    Active = 0x02,
    Inactive = 0x03,
}

impl RzdReportOption {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => RzdReportOption::All,
            0x01 => RzdReportOption::AllActive,
            0x02 => RzdReportOption::Active,
            0x03 => RzdReportOption::Inactive,
            _ => return None,
        })
    }
}

/// REPORT REALMS reporting options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RrReportOption {
    All = 0x00,
    Sobr = 0x01,
    Swr = 0x02,
    Swp = 0x03,
}

impl RrReportOption {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => RrReportOption::All,
            0x01 => RrReportOption::Sobr,
            0x02 => RrReportOption::Swr,
            0x03 => RrReportOption::Swp,
            _ => return None,
        })
    }
}

/// Realm restriction codes.
pub const REALM_RESTR_NONE: u8 = 0x00;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_type_families() {
        assert!(ZoneType::SeqWriteReq.is_seq());
        assert!(ZoneType::SeqWritePref.is_seq());
        assert!(ZoneType::Conventional.is_cmr());
        assert!(ZoneType::SeqOrBefReq.is_cmr());
        assert!(!ZoneType::Gap.is_seq());
        assert!(!ZoneType::Gap.is_cmr());
    }

    #[test]
    fn test_actv_flag_positions() {
        assert_eq!(ActvFlags::for_type(ZoneType::Conventional), ActvFlags::CONV);
        assert_eq!(ActvFlags::for_type(ZoneType::SeqOrBefReq), ActvFlags::SOBR);
        assert_eq!(ActvFlags::CONV.bits(), 0x01);
        assert_eq!(ActvFlags::SEQ_REQ.bits(), 0x02);
        assert_eq!(ActvFlags::SEQ_PREF.bits(), 0x04);
        assert_eq!(ActvFlags::SOBR.bits(), 0x08);
    }

    #[test]
    fn test_cond_raw_roundtrip() {
        for raw in [0x0, 0x1, 0x2, 0x3, 0x4, 0x5, 0xD, 0xE, 0xF] {
            assert_eq!(ZoneCond::from_raw(raw).unwrap() as u8, raw);
        }
        assert!(ZoneCond::from_raw(0x6).is_none());
    }
}
