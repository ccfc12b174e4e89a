// SPDX-License-Identifier: MIT

//! REPORT ZONES, REPORT ZONE DOMAINS, REPORT REALMS and REPORT MUTATIONS
//! reply marshaling.

use log::warn;

use zdcore::profile::PROFILES;
use zdcore::types::{RrReportOption, RzReportOption, RzdReportOption, RZ_RO_PARTIAL};
use zdio::prelude::*;

use crate::bytes::{cpbe16, cpbe32, cpbe64};
use crate::cmd::{self, ScsiCommand};
use crate::sense::{CmdStatus, SenseKey, ASC_ATTEMPT_TO_ACCESS_GAP_ZONE, ASC_INVALID_FIELD_IN_CDB,
                   ASC_LBA_OUT_OF_RANGE};
use crate::target::Target;

pub const ZONE_DESCRIPTOR_OFFSET: usize = 64;
pub const ZONE_DESCRIPTOR_LENGTH: usize = 64;

pub const RPT_DOMAINS_HEADER_SIZE: usize = 64;
pub const RPT_DOMAINS_RECORD_SIZE: usize = 96;

pub const RPT_REALMS_HEADER_SIZE: usize = 64;
pub const RPT_REALMS_DESC_OFFSET: usize = 16;
pub const RR_START_END_DESC_SIZE: usize = 16;

pub const MUTATE_RPT_HEADER_SIZE: usize = 32;
pub const MUTATE_RPT_RECORD_SIZE: usize = 8;

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    /// REPORT ZONES: two passes, first to size the reply, then to fill
    /// as many descriptors as the buffer holds.
    pub(crate) fn report_zones(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let start_lba = cmd::get_lba(cmd.cdb);
        let alloc_len = cmd::get_xfer_length(cmd.cdb) as usize;
        let partial = cmd.cdb[14] & RZ_RO_PARTIAL != 0;
        let ro_raw = cmd.cdb[14] & !RZ_RO_PARTIAL;

        let dev = &self.dev;
        if start_lba >= dev.logical_capacity() {
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_LBA_OUT_OF_RANGE);
        }
        let Some(ro) = RzReportOption::from_raw(ro_raw) else {
            warn!("unknown REPORT ZONES reporting option {ro_raw:#04x}");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };
        let Some(first) = dev.get_zone(start_lba, false) else {
            warn!("bad zone LBA {start_lba}");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };

        // First pass: count the zones to report.
        let mut len = alloc_len.saturating_sub(ZONE_DESCRIPTOR_OFFSET);
        let mut nr_zones = 0u32;
        for idx in first..dev.nr_zones() {
            if dev.zone_at(idx).matches_report_option(ro) {
                if partial && len < ZONE_DESCRIPTOR_LENGTH {
                    break;
                }
                len = len.saturating_sub(ZONE_DESCRIPTOR_LENGTH);
                nr_zones += 1;
            }
        }

        // Report header.
        let mut data = [0u8; ZONE_DESCRIPTOR_OFFSET];
        cpbe32(&mut data[0..], nr_zones * ZONE_DESCRIPTOR_LENGTH as u32);
        cpbe64(&mut data[8..], dev.logical_capacity() - 1);
        if cmd.sg.copy_in(&data) < ZONE_DESCRIPTOR_OFFSET {
            return CmdStatus::Good;
        }

        // Second pass: zone descriptors.
        let mut data = [0u8; ZONE_DESCRIPTOR_LENGTH];
        for idx in first..dev.nr_zones() {
            if cmd.sg.remaining() < ZONE_DESCRIPTOR_LENGTH {
                break;
            }
            let z = dev.zone_at(idx);
            if !z.matches_report_option(ro) {
                continue;
            }
            data.fill(0);
            data[0] = z.ztype & 0x0f;
            data[1] = (z.cond << 4) & 0xf0;
            if z.reset != 0 {
                data[1] |= 0x01;
            }
            if z.non_seq != 0 {
                data[1] |= 0x02;
            }
            cpbe64(&mut data[8..], z.len);
            cpbe64(&mut data[16..], z.start);
            cpbe64(&mut data[24..], z.wp);
            cmd.sg.copy_in(&data);
        }

        CmdStatus::Good
    }

    fn should_report_domain(&self, domain_id: u32, ro: RzdReportOption) -> bool {
        if ro == RzdReportOption::All {
            return true;
        }
        let active = self.dev.count_active_domain_zones(domain_id);
        match ro {
            RzdReportOption::AllActive => active == self.dev.domain(domain_id).nr_zones,
            RzdReportOption::Active => active != 0,
            RzdReportOption::Inactive => active == 0,
            RzdReportOption::All => true,
        }
    }

    /// REPORT ZONE DOMAINS.
    pub(crate) fn report_zone_domains(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let start_lba = cmd::get_lba(cmd.cdb);
        let ro_raw = cmd.cdb[14] & 0x3f;

        let Some(ro) = RzdReportOption::from_raw(ro_raw) else {
            warn!("unknown REPORT ZONE DOMAINS reporting option {ro_raw:#04x}");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };

        // Validate the domain locator.
        if self.dev.lba_out_of_range(start_lba, 0) {
            warn!("domain locator LBA {start_lba} is out of range");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_LBA_OUT_OF_RANGE);
        }
        let Some(zone_idx) = self.dev.get_zone(start_lba, false) else {
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };
        if self.dev.zone_at(zone_idx).is_gap() {
            warn!("domain locator LBA {start_lba} points to a gap zone");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_ATTEMPT_TO_ACCESS_GAP_ZONE);
        }

        // Skip the domains that end below the locator LBA.
        let nr_domains = self.dev.nr_domains();
        let mut start_dom = nr_domains;
        for i in 0..nr_domains {
            if self.dev.domain(i).end_lba >= start_lba {
                start_dom = i;
                break;
            }
        }
        if start_dom >= nr_domains {
            warn!("can't locate domain for LBA {start_lba}");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        let nr_rpt_domains = (start_dom..nr_domains)
            .filter(|&i| self.should_report_domain(i, ro))
            .count() as u32;

        // Report header.
        let mut data = [0u8; RPT_DOMAINS_HEADER_SIZE];
        cpbe32(
            &mut data[0..],
            (RPT_DOMAINS_HEADER_SIZE + nr_domains as usize * RPT_DOMAINS_RECORD_SIZE) as u32,
        );
        cpbe32(
            &mut data[4..],
            (RPT_DOMAINS_HEADER_SIZE + nr_rpt_domains as usize * RPT_DOMAINS_RECORD_SIZE) as u32,
        );
        data[8] = nr_domains as u8;
        data[9] = nr_rpt_domains as u8;
        data[10] = ro as u8;
        cpbe64(&mut data[16..], start_lba);
        if cmd.sg.copy_in(&data) < RPT_DOMAINS_HEADER_SIZE {
            return CmdStatus::Good;
        }

        // Domain records.
        let mut data = [0u8; RPT_DOMAINS_RECORD_SIZE];
        for i in start_dom..nr_domains {
            if cmd.sg.remaining() < RPT_DOMAINS_RECORD_SIZE {
                break;
            }
            if !self.should_report_domain(i, ro) {
                continue;
            }
            let d = self.dev.domain(i);
            data.fill(0);
            data[0] = i as u8;
            cpbe64(&mut data[16..], d.nr_zones as u64);
            cpbe64(&mut data[24..], d.start_lba);
            cpbe64(&mut data[32..], d.end_lba);
            data[40] = d.dtype;
            data[41] = 0x02; // valid domain zone type
            cmd.sg.copy_in(&data);
        }

        CmdStatus::Good
    }

    fn should_report_realm(&self, realm_idx: u32, ro: RrReportOption) -> bool {
        let r = self.dev.realm_at(realm_idx);
        match ro {
            RrReportOption::All => true,
            RrReportOption::Sobr => r.rtype == zdcore::types::ZoneType::SeqOrBefReq as u8,
            RrReportOption::Swr => r.rtype == zdcore::types::ZoneType::SeqWriteReq as u8,
            RrReportOption::Swp => r.rtype == zdcore::types::ZoneType::SeqWritePref as u8,
        }
    }

    /// REPORT REALMS.
    pub(crate) fn report_realms(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let start_lba = cmd::get_lba(cmd.cdb);
        let alloc_len = cmd::get_xfer_length(cmd.cdb) as usize;
        let ro_raw = cmd.cdb[14] & 0x3f;

        let Some(ro) = RrReportOption::from_raw(ro_raw) else {
            warn!("unknown realm reporting option {ro_raw:#04x}");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };

        // Validate the realm locator.
        if self.dev.lba_out_of_range(start_lba, 0) {
            warn!("realm locator LBA {start_lba} is out of range");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_LBA_OUT_OF_RANGE);
        }
        let Some(zone_idx) = self.dev.get_zone(start_lba, false) else {
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };
        if self.dev.zone_at(zone_idx).is_gap() {
            warn!("realm locator LBA {start_lba} points to a gap zone");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_ATTEMPT_TO_ACCESS_GAP_ZONE);
        }
        let Some((start_realm, zt)) = self.dev.get_zone_realm(start_lba, false) else {
            warn!("invalid realm locator {start_lba}");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };
        if alloc_len < RPT_REALMS_HEADER_SIZE {
            warn!("REPORT REALMS allocated length {alloc_len} too small");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        let nr_realms = self.dev.nr_realms();
        let nr_domains = self.dev.nr_domains() as usize;
        let desc_len = RR_START_END_DESC_SIZE * nr_domains + RPT_REALMS_DESC_OFFSET;

        // Count the realms that fit; remember the locator of the first
        // realm that does not.
        let mut sz = alloc_len - RPT_REALMS_HEADER_SIZE;
        let mut nr_rpt_realms = 0u32;
        let mut next = 0u64;
        for i in start_realm..nr_realms {
            if self.should_report_realm(i, ro) {
                if sz < desc_len {
                    next = self.dev.realm_at(i).start(zt);
                    break;
                }
                nr_rpt_realms += 1;
                sz -= desc_len;
            }
        }
        if next != 0 && next == start_lba {
            warn!("REPORT REALMS allocated length {alloc_len} too small");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        // Report header.
        let mut hdr = [0u8; RPT_REALMS_HEADER_SIZE];
        cpbe32(&mut hdr[0..], nr_realms);
        cpbe32(&mut hdr[4..], desc_len as u32);
        cpbe64(&mut hdr[8..], next);
        if cmd.sg.copy_in(&hdr) < RPT_REALMS_HEADER_SIZE {
            return CmdStatus::Good;
        }

        // Realm descriptors: per-domain start/end LBA pairs, gated on
        // the activation flags.
        let mut data = vec![0u8; desc_len];
        let mut left = nr_rpt_realms;
        for i in start_realm..nr_realms {
            if left == 0 || cmd.sg.remaining() < desc_len {
                break;
            }
            if !self.should_report_realm(i, ro) {
                continue;
            }
            let r = *self.dev.realm_at(i);
            data.fill(0);
            cpbe32(&mut data[0..], r.number);
            cpbe16(&mut data[4..], r.restr as u16);
            if let Some(rt) = r.realm_type() {
                data[7] = self.dev.domain_id_of_type(rt).unwrap_or(0) as u8;
            }
            for dom in 0..nr_domains {
                let d = self.dev.domain(dom as u32);
                let off = RPT_REALMS_DESC_OFFSET + dom * RR_START_END_DESC_SIZE;
                if let Some(dzt) = d.zone_type() {
                    if r.can_actv_as(dzt) {
                        let ri = r.item(dzt);
                        let rhi =
                            ri.start_lba + ri.length as u64 * self.dev.zone_size() - 1;
                        cpbe64(&mut data[off..], ri.start_lba);
                        cpbe64(&mut data[off + 8..], rhi);
                    }
                }
            }
            cmd.sg.copy_in(&data);
            left -= 1;
        }

        CmdStatus::Good
    }

    /// REPORT MUTATIONS: list every supported personality.
    pub(crate) fn report_mutations(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let alloc_len = cmd::get_xfer_length(cmd.cdb) as usize;
        if alloc_len < MUTATE_RPT_HEADER_SIZE {
            warn!("allocated length {alloc_len} too small");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        let mut hdr = [0u8; MUTATE_RPT_HEADER_SIZE];
        cpbe32(&mut hdr[0..], PROFILES.len() as u32);
        if cmd.sg.copy_in(&hdr) < MUTATE_RPT_HEADER_SIZE {
            return CmdStatus::Good;
        }

        let mut data = [0u8; MUTATE_RPT_RECORD_SIZE];
        for f in PROFILES {
            if cmd.sg.remaining() < MUTATE_RPT_RECORD_SIZE {
                break;
            }
            data.fill(0);
            data[0] = f.dev_type as u8;
            cpbe32(&mut data[4..], f.model);
            cmd.sg.copy_in(&data);
        }

        CmdStatus::Good
    }
}
