// SPDX-License-Identifier: MIT

use crate::types::*;

/// Device feature profile. Sets the features that a particular
/// (device type, model) personality has or doesn't have.
#[derive(Debug, Clone, Copy)]
pub struct DevProfile {
    /// Personality name, matched by the `type-<name>` config option.
    pub name: &'static str,

    pub dev_type: DeviceType,
    /// Model code within the device type.
    pub model: u32,

    /// CMR zone type and condition after format.
    pub initial_cmr_type: ZoneType,
    pub initial_cmr_cond: ZoneCond,

    /// SMR zone type and condition after format.
    pub initial_smr_type: ZoneType,
    pub initial_smr_cond: ZoneCond,

    /// If true, the device formats with every realm activated SMR.
    pub initial_all_smr: bool,

    /// Supported activation targets.
    pub actv_of_sobr: bool,
    pub actv_of_conv: bool,
    pub actv_of_seq_req: bool,
    pub actv_of_seq_pref: bool,

    /// If true, setting FSNOZ via MODE SELECT is not supported.
    pub no_za_control: bool,

    /// If true, setting the MAXIMUM ACTIVATION value is supported.
    pub max_act_control: bool,

    /// If true, enabling/disabling URSWRZ is not supported.
    pub no_ur_control: bool,

    /// If true, the NOZSRC bit in ZONE ACTIVATE/QUERY is not supported.
    pub no_nozsrc: bool,

    /// Initial WP-check setting. The value is the opposite of URSWRZ.
    pub initial_wp_check: bool,

    /// If true, the device doesn't support the REPORT REALMS command.
    pub no_report_realms: bool,

    /// Read-only zone injection: count and offset in domain-0 zone space.
    pub nr_rdonly_zones: u32,
    pub rdonly_zone_offset: u32,

    /// Offline zone injection: count and offset in domain-0 zone space.
    pub nr_offline_zones: u32,
    pub offline_zone_offset: u32,

    /// Bottom/top CMR-only counts. In realms for ZD, in zones for HM/HA.
    pub nr_bot_cmr: u32,
    pub nr_top_cmr: u32,

    /// Initial MAXIMUM ACTIVATION value in zones, 0 = unlimited.
    pub max_activate: u32,

    /// Gap between domains in zones, no gap by default.
    pub domain_gap: u32,
}

impl DevProfile {
    /// Activation flags implied by this profile.
    pub fn actv_flags(&self) -> ActvFlags {
        let mut flags = ActvFlags::empty();
        if self.actv_of_conv {
            flags |= ActvFlags::CONV;
        }
        if self.actv_of_seq_req {
            flags |= ActvFlags::SEQ_REQ;
        }
        if self.actv_of_seq_pref {
            flags |= ActvFlags::SEQ_PREF;
        }
        if self.actv_of_sobr {
            flags |= ActvFlags::SOBR;
        }
        flags
    }

    pub fn supports_type(&self, zt: ZoneType) -> bool {
        match zt {
            ZoneType::Conventional => self.actv_of_conv,
            ZoneType::SeqWriteReq => self.actv_of_seq_req,
            ZoneType::SeqWritePref => self.actv_of_seq_pref,
            ZoneType::SeqOrBefReq => self.actv_of_sobr,
            ZoneType::Gap => false,
        }
    }

    /// Look a profile up by device type and model code.
    pub fn find(dev_type: DeviceType, model: u32) -> Option<&'static DevProfile> {
        PROFILES
            .iter()
            .find(|f| f.dev_type == dev_type && f.model == model)
    }

    /// Look a profile up by personality name, as used in config strings.
    pub fn find_by_name(name: &str) -> Option<&'static DevProfile> {
        PROFILES.iter().find(|f| f.name == name)
    }
}

const BASE: DevProfile = DevProfile {
    name: "",
    dev_type: DeviceType::NonZoned,
    model: 0,
    initial_cmr_type: ZoneType::Conventional,
    initial_cmr_cond: ZoneCond::NotWp,
    initial_smr_type: ZoneType::SeqWriteReq,
    initial_smr_cond: ZoneCond::Empty,
    initial_all_smr: false,
    actv_of_sobr: false,
    actv_of_conv: false,
    actv_of_seq_req: false,
    actv_of_seq_pref: false,
    no_za_control: false,
    max_act_control: false,
    no_ur_control: false,
    no_nozsrc: false,
    initial_wp_check: false,
    no_report_realms: false,
    nr_rdonly_zones: 0,
    rdonly_zone_offset: 0,
    nr_offline_zones: 0,
    offline_zone_offset: 0,
    nr_bot_cmr: 0,
    nr_top_cmr: 0,
    max_activate: 0,
    domain_gap: 0,
};

/// Every personality the emulator can format to or mutate into.
pub static PROFILES: &[DevProfile] = &[
    DevProfile {
        name: "NON_ZONED",
        dev_type: DeviceType::NonZoned,
        model: MO_NZ_GENERIC,
        ..BASE
    },
    DevProfile {
        name: "HM_ZONED",
        dev_type: DeviceType::HmZoned,
        model: MO_SMR_NO_CMR,
        ..BASE
    },
    DevProfile {
        name: "HM_ZONED_1PCNT_B",
        dev_type: DeviceType::HmZoned,
        model: MO_SMR_1PCNT_B,
        nr_bot_cmr: 1,
        ..BASE
    },
    DevProfile {
        name: "HM_ZONED_2PCNT_BT",
        dev_type: DeviceType::HmZoned,
        model: MO_SMR_2PCNT_BT,
        nr_bot_cmr: 2,
        nr_top_cmr: 1,
        ..BASE
    },
    DevProfile {
        name: "HM_ZONED_FAULTY",
        dev_type: DeviceType::HmZoned,
        model: MO_SMR_FAULTY,
        nr_rdonly_zones: 2,
        rdonly_zone_offset: 7,
        nr_offline_zones: 2,
        offline_zone_offset: 11,
        ..BASE
    },
    DevProfile {
        name: "HA_ZONED",
        dev_type: DeviceType::HaZoned,
        model: MO_SMR_NO_CMR,
        initial_smr_type: ZoneType::SeqWritePref,
        ..BASE
    },
    DevProfile {
        name: "HA_ZONED_1PCNT_B",
        dev_type: DeviceType::HaZoned,
        model: MO_SMR_1PCNT_B,
        initial_smr_type: ZoneType::SeqWritePref,
        nr_bot_cmr: 1,
        ..BASE
    },
    DevProfile {
        name: "HA_ZONED_2PCNT_BT",
        dev_type: DeviceType::HaZoned,
        model: MO_SMR_2PCNT_BT,
        initial_smr_type: ZoneType::SeqWritePref,
        nr_bot_cmr: 2,
        nr_top_cmr: 1,
        ..BASE
    },
    DevProfile {
        name: "ZONE_DOM",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_NO_CMR,
        initial_all_smr: true,
        actv_of_conv: true,
        actv_of_seq_req: true,
        max_act_control: true,
        max_activate: 64,
        domain_gap: 3,
        ..BASE
    },
    DevProfile {
        name: "ZD_1CMR_BOT",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_1_CMR_BOT,
        initial_all_smr: true,
        actv_of_conv: true,
        actv_of_seq_req: true,
        actv_of_seq_pref: true,
        nr_bot_cmr: 1,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        name: "ZD_1CMR_BOT_SWP",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_SWP,
        initial_all_smr: true,
        initial_smr_type: ZoneType::SeqWritePref,
        actv_of_conv: true,
        actv_of_seq_pref: true,
        nr_bot_cmr: 1,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        name: "ZD_1CMR_BOT_TOP",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_1_CMR_BOT_TOP,
        initial_all_smr: true,
        actv_of_conv: true,
        actv_of_seq_req: true,
        actv_of_seq_pref: true,
        nr_bot_cmr: 1,
        nr_top_cmr: 1,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        // Same as ZD_1CMR_BOT_TOP, but initially all SMR.
        name: "ZD_1CMR_BT_SMR",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_1_CMR_BT_SWR,
        initial_all_smr: true,
        actv_of_conv: true,
        actv_of_seq_req: true,
        actv_of_seq_pref: true,
        nr_bot_cmr: 1,
        nr_top_cmr: 2,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        // SOBR/SWR ZD device.
        name: "ZD_SOBR",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_SOBR_NO_CMR,
        initial_cmr_type: ZoneType::SeqOrBefReq,
        initial_cmr_cond: ZoneCond::Full,
        actv_of_sobr: true,
        actv_of_seq_req: true,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        // SOBR/SWP ZD device.
        name: "ZD_SOBR_SWP",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_SOBR_SWP,
        initial_cmr_type: ZoneType::SeqOrBefReq,
        initial_cmr_cond: ZoneCond::Full,
        initial_smr_type: ZoneType::SeqWritePref,
        actv_of_sobr: true,
        actv_of_seq_pref: true,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        // SOBR/SWR ZD device, SOBR zones start EMPTY.
        name: "ZD_SOBR_EMPTY",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_SOBR_EMPTY,
        initial_cmr_type: ZoneType::SeqOrBefReq,
        initial_cmr_cond: ZoneCond::Empty,
        actv_of_sobr: true,
        actv_of_seq_req: true,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        name: "ZD_1SOBR_BT_TOP",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_1_SOBR_BT_TOP,
        initial_cmr_type: ZoneType::SeqOrBefReq,
        initial_cmr_cond: ZoneCond::Empty,
        actv_of_sobr: true,
        actv_of_seq_req: true,
        actv_of_seq_pref: true,
        nr_bot_cmr: 1,
        nr_top_cmr: 1,
        max_act_control: true,
        max_activate: 64,
        ..BASE
    },
    DevProfile {
        name: "ZD_BARE_BONE",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_BBONE,
        initial_all_smr: true,
        actv_of_conv: true,
        actv_of_seq_req: true,
        no_za_control: true,
        no_ur_control: true,
        ..BASE
    },
    DevProfile {
        name: "ZD_FAULTY",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_FAULTY,
        initial_all_smr: true,
        actv_of_conv: true,
        actv_of_seq_req: true,
        max_act_control: true,
        max_activate: 64,
        nr_rdonly_zones: 2,
        rdonly_zone_offset: 7,
        nr_offline_zones: 2,
        offline_zone_offset: 11,
        ..BASE
    },
    DevProfile {
        // Faulty SOBR/SWR ZD device, fixed zones top and bottom.
        name: "ZD_SOBR_FAULTY",
        dev_type: DeviceType::ZoneDomains,
        model: MO_ZD_SOBR_FAULTY,
        initial_cmr_type: ZoneType::SeqOrBefReq,
        initial_cmr_cond: ZoneCond::Empty,
        actv_of_sobr: true,
        actv_of_seq_req: true,
        max_act_control: true,
        nr_bot_cmr: 1,
        nr_top_cmr: 1,
        nr_rdonly_zones: 2,
        rdonly_zone_offset: 7,
        nr_offline_zones: 2,
        offline_zone_offset: 11,
        ..BASE
    },
];
