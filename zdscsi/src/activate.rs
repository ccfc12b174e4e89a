// SPDX-License-Identifier: MIT

//! ZONE ACTIVATE / ZONE QUERY CDB decode and result marshaling.

use log::warn;

use zdcore::activate::{
    ActvResults, ACTV_RES_DESCRIPTOR_SIZE, ACTV_RES_HEADER_SIZE, ACTV_STAT_ACTIVATED,
    ACTV_STAT_NZP_VALID, ACTV_STAT_ZIWUP_VALID,
};
use zdio::prelude::*;

use crate::bytes::{cpbe32, cpbe48, cpbe64, rdbe16, rdbe32, rdbe48, rdbe64};
use crate::cmd::{self, ScsiCommand};
use crate::sense::{CmdStatus, SenseKey, ASC_INVALID_FIELD_IN_CDB};
use crate::target::Target;

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    /// ZONE ACTIVATE(16) / ZONE QUERY(16).
    pub(crate) fn zone_activate16(
        &mut self,
        cmd: &mut ScsiCommand<'_, '_>,
        dry_run: bool,
    ) -> CmdStatus {
        let cdb = cmd.cdb;
        let all = cdb[2] & 0x80 != 0;
        let domain_id = (cdb[2] & 0x3f) as u32;
        // The 16-byte form carries a 48-bit LBA; keep the decoder
        // tolerant of the field widening to 64 bits later.
        let start_lba = rdbe48(&cdb[3..]);
        let alloc_len = rdbe32(&cdb[9..]) as usize;

        let mut nozsrc = false;
        let nr_zones = if cdb[2] & 0x40 != 0 {
            if self.dev.profile().no_nozsrc {
                warn!("NOZSRC bit is not supported");
                return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
            }
            nozsrc = true;
            rdbe16(&cdb[13..]) as u32
        } else {
            self.dev.nr_actv_zones()
        };

        let res = self
            .dev
            .zone_activate(start_lba, nr_zones, domain_id, alloc_len, all, nozsrc, dry_run);
        match res {
            Ok(res) => self.output_actv_results(cmd, &res, alloc_len, dry_run),
            Err(e) => e.into(),
        }
    }

    /// ZONE ACTIVATE(32) / ZONE QUERY(32).
    pub(crate) fn zone_activate32(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let cdb = cmd.cdb;
        if cdb[7] != 0x18 {
            warn!("wrong zone activation CDB length {:#04x}", cdb[7]);
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }
        let dry_run = match rdbe16(&cdb[8..]) {
            cmd::ZBC_SA_ZONE_ACTIVATE_32 => false,
            cmd::ZBC_SA_ZONE_QUERY_32 => true,
            sa => {
                warn!("invalid activation (32) service action {sa:#06x}");
                return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
            }
        };

        let all = cdb[10] & 0x80 != 0;
        let domain_id = cdb[11] as u32;
        let start_lba = rdbe64(&cdb[12..]);
        let alloc_len = rdbe32(&cdb[28..]) as usize;

        let mut nozsrc = false;
        let nr_zones = if cdb[10] & 0x40 != 0 {
            if self.dev.profile().no_nozsrc {
                warn!("NOZSRC bit is not supported");
                return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
            }
            nozsrc = true;
            rdbe32(&cdb[20..])
        } else {
            self.dev.nr_actv_zones()
        };

        let res = self
            .dev
            .zone_activate(start_lba, nr_zones, domain_id, alloc_len, all, nozsrc, dry_run);
        match res {
            Ok(res) => self.output_actv_results(cmd, &res, alloc_len, dry_run),
            Err(e) => e.into(),
        }
    }

    /// Marshal the activation result header and, on success, the
    /// descriptors in ascending zone ID order.
    fn output_actv_results(
        &mut self,
        cmd: &mut ScsiCommand<'_, '_>,
        res: &ActvResults,
        alloc_len: usize,
        dry_run: bool,
    ) -> CmdStatus {
        let mut hdr = [0u8; ACTV_RES_HEADER_SIZE];

        let sz = res.descs.len() * ACTV_RES_DESCRIPTOR_SIZE;
        let avail = alloc_len - ACTV_RES_HEADER_SIZE;
        cpbe32(&mut hdr[0..], sz as u32);
        cpbe32(&mut hdr[4..], sz.min(avail) as u32);

        let mut status = 0u8;
        hdr[10] = res.domain_id;
        if res.nozsrc {
            hdr[12] |= 0x02;
        }
        if res.all {
            hdr[12] |= 0x01;
        }
        if let Some(nzp) = res.nzp {
            status |= ACTV_STAT_NZP_VALID;
            cpbe32(&mut hdr[16..], nzp);
        }
        if res.ok {
            if !dry_run {
                status |= ACTV_STAT_ACTIVATED;
            }
        } else if let Some(ziwup) = res.ziwup {
            status |= ACTV_STAT_ZIWUP_VALID;
            cpbe48(&mut hdr[24..], ziwup);
        }
        hdr[8] = status;
        hdr[9] = res.error;

        if cmd.sg.copy_in(&hdr) < ACTV_RES_HEADER_SIZE || !res.ok {
            return CmdStatus::Good;
        }

        let mut data = [0u8; ACTV_RES_DESCRIPTOR_SIZE];
        for desc in &res.descs {
            if cmd.sg.remaining() < ACTV_RES_DESCRIPTOR_SIZE {
                break;
            }
            data.fill(0);
            data[0] = desc.ztype;
            data[1] = desc.cond << 4;
            data[2] = desc.domain_id;
            cpbe64(&mut data[8..], desc.nr_zones);
            cpbe64(&mut data[16..], desc.start_lba);
            cmd.sg.copy_in(&data);
        }

        CmdStatus::Good
    }
}
