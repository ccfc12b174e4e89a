// SPDX-License-Identifier: MIT

/// Device statistics, reported through the Zoned Block Device Stats
/// diagnostic page and kept across commands (not persisted).
#[derive(Debug, Default, Clone, Copy)]
pub struct DevStats {
    /// Maximum number of simultaneously open zones seen.
    pub max_open_zones: u32,
    /// Maximum explicitly open SWR zones seen.
    pub max_exp_open_seq_zones: u32,
    /// Maximum implicitly open SWR zones seen.
    pub max_imp_open_seq_zones: u32,
    /// Maximum implicitly open SOBR zones seen.
    pub max_imp_open_sobr_zones: u32,
    /// Low-water mark of empty zones.
    pub min_empty_zones: u32,
    /// Number of zones transitioned back to Empty by RESET WP.
    pub zones_emptied: u32,
    /// Reserved, always zero.
    pub max_non_seq_zones: u32,
    /// Reserved, always zero.
    pub subopt_write_cmds: u64,
    /// Reserved, always zero.
    pub cmds_above_opt_lim: u64,
    /// Explicit opens rejected for lack of zone resources.
    pub failed_exp_opens: u64,
    /// Reads rejected by zone protocol rules.
    pub read_rule_fails: u64,
    /// Writes rejected by zone protocol rules.
    pub write_rule_fails: u64,

    /// All commands executed.
    pub nr_cdb_cmds: u64,
    /// TEST UNIT READY commands.
    pub nr_tur_cmds: u64,
    /// Commands not handled.
    pub nr_nh_cmds: u64,
}

/// Number of parameters in the stats diagnostic subpage. The parameter
/// code is the index into the order laid down by `param_value`.
pub const NR_STAT_PARAMS: usize = 11;

impl DevStats {
    /// Value of a stats log parameter by its code.
    pub fn param_value(&self, code: u16) -> Option<u64> {
        Some(match code {
            0x00 => self.max_open_zones as u64,
            0x01 => self.max_exp_open_seq_zones as u64,
            0x02 => self.max_imp_open_seq_zones as u64,
            0x03 => self.min_empty_zones as u64,
            0x04 => self.max_non_seq_zones as u64,
            0x05 => self.zones_emptied as u64,
            0x06 => self.subopt_write_cmds,
            0x07 => self.cmds_above_opt_lim,
            0x08 => self.failed_exp_opens,
            0x09 => self.read_rule_fails,
            0x0a => self.write_rule_fails,
            0x0b => self.max_imp_open_sobr_zones as u64,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_codes() {
        let mut s = DevStats::default();
        s.failed_exp_opens = 3;
        s.min_empty_zones = 7;
        assert_eq!(s.param_value(0x08), Some(3));
        assert_eq!(s.param_value(0x03), Some(7));
        assert_eq!(s.param_value(0x0c), None);
    }
}
