// SPDX-License-Identifier: MIT

//! MODE SENSE / MODE SELECT and the mode pages, including the Zone
//! Domains control page.

use log::debug;

use zdio::prelude::*;

use crate::bytes::{cpbe16, cpbe32, rdbe16, rdbe32};
use crate::cmd::{self, ScsiCommand};
use crate::sense::{
    CmdStatus, SenseKey, ASC_INVALID_FIELD_IN_CDB, ASC_INVALID_FIELD_IN_PARAMETER_LIST,
    ASC_PARAMETER_LIST_LENGTH_ERROR,
};
use crate::target::Target;

/// The Zone Domains control page lives in the vendor-specific range.
const ZONE_DOM_PAGE: u8 = 0x3d;
const ZONE_DOM_SUBPAGE: u8 = 0x08;
const ZONE_DOM_PAGE_LEN: usize = 254;

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    fn ms_get_rwrecovery_page(&self, buf: &mut [u8]) -> Option<usize> {
        if buf.len() < 12 {
            return None;
        }
        buf[0] = 0x01;
        buf[1] = 0x0a;
        Some(12)
    }

    fn ms_get_cache_page(&self, buf: &mut [u8]) -> Option<usize> {
        if buf.len() < 20 {
            return None;
        }
        buf[0] = 0x08;
        buf[1] = 0x12;
        buf[2] = 0x04; // WCE = 1
        Some(20)
    }

    fn ms_get_control_page(&self, buf: &mut [u8]) -> Option<usize> {
        if buf.len() < 12 {
            return None;
        }
        buf[0] = 0x0a;
        buf[1] = 0x0a;
        buf[2] = 0x02; // GLTSD = 1
        buf[5] = 0x40; // TAS = 1
        // Busy timeout period: unlimited.
        buf[8] = 0xff;
        buf[9] = 0xff;
        Some(12)
    }

    fn ms_get_zone_dom_page(&self, buf: &mut [u8]) -> Option<usize> {
        if !self.dev.is_zd() || buf.len() < 20 {
            return None;
        }
        let feat = self.dev.profile();

        buf[0] = ZONE_DOM_PAGE | (0x3 << 6); // PS and SPF set
        buf[1] = ZONE_DOM_SUBPAGE;
        buf[3] = (ZONE_DOM_PAGE_LEN - 3) as u8;

        if !feat.no_za_control {
            cpbe32(&mut buf[4..], self.dev.nr_actv_zones());
        }
        if !feat.no_ur_control {
            buf[10] = if self.dev.wp_check() { 0x00 } else { 0x01 };
        }
        if feat.max_act_control {
            cpbe16(&mut buf[16..], self.dev.max_activate() as u16);
        }

        Some(ZONE_DOM_PAGE_LEN.min(buf.len()))
    }

    fn ms_set_zone_dom_page(&mut self, buf: &[u8]) -> Result<(), ()> {
        if !self.dev.is_zd() || buf.len() < 18 {
            return Err(());
        }
        let feat = self.dev.profile();

        let fsnoz = rdbe32(&buf[4..]);
        let urswrz = buf[10];
        let max_activate = rdbe16(&buf[16..]) as u32;

        if !feat.no_za_control {
            if !self.dev.set_fsnoz(fsnoz) {
                return Err(());
            }
        } else if fsnoz != 0 {
            return Err(());
        }

        if !feat.no_ur_control {
            self.dev.set_urswrz(urswrz);
        } else if urswrz != 0 {
            return Err(());
        }

        if feat.max_act_control {
            self.dev.set_max_activation(max_activate);
        } else if max_activate != 0 {
            return Err(());
        }

        Ok(())
    }

    /// Fill one or all mode pages. `page < 0` selects every page.
    fn fill_mode_pages(&self, page: i32, subpage: i32, buf: &mut [u8]) -> Option<usize> {
        let mut len = 0usize;
        let mut pages: Vec<(u8, u8)> = vec![(0x01, 0), (0x08, 0), (0x0a, 0)];
        if self.dev.is_zd() {
            pages.push((ZONE_DOM_PAGE, ZONE_DOM_SUBPAGE));
        }

        let mut matched = false;
        for (pg, spg) in pages {
            if (page >= 0 && page != pg as i32) || (subpage >= 0 && subpage != spg as i32) {
                continue;
            }
            let ret = match pg {
                0x01 => self.ms_get_rwrecovery_page(&mut buf[len..]),
                0x08 => self.ms_get_cache_page(&mut buf[len..]),
                0x0a => self.ms_get_control_page(&mut buf[len..]),
                ZONE_DOM_PAGE => self.ms_get_zone_dom_page(&mut buf[len..]),
                _ => None,
            };
            // A page that no longer fits ends the fill; pages already
            // emitted still count.
            let Some(ret) = ret else { break };
            len += ret;
            matched = true;
        }

        if matched {
            Some(len)
        } else {
            None
        }
    }

    /// MODE SENSE(6) / MODE SENSE(10).
    pub(crate) fn mode_sense(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let page_code = cmd.cdb[2] & 0x3f;
        let subpage_code = cmd.cdb[3];
        let sense_ten = cmd.opcode() == cmd::MODE_SENSE_10;
        let alloc_len = cmd::get_xfer_length(cmd.cdb) as usize;

        let mut data = [0u8; 512];
        let hdr_len = if sense_ten { 8 } else { 4 };
        let avail = alloc_len.min(data.len());

        let filled = if avail <= hdr_len {
            Some(0)
        } else if page_code == 0x3f {
            self.fill_mode_pages(-1, -1, &mut data[hdr_len..avail])
        } else {
            self.fill_mode_pages(
                page_code as i32,
                subpage_code as i32,
                &mut data[hdr_len..avail],
            )
        };

        let Some(filled) = filled else {
            debug!(
                "MODE SENSE({}) failed, page {page_code:#04x}/{subpage_code:#04x}",
                if sense_ten { "10" } else { "6" }
            );
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };
        if filled == 0 && avail > hdr_len {
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        let len = hdr_len + filled;
        // Mode parameter header: mode data length excludes the field
        // itself.
        if sense_ten {
            cpbe16(&mut data[0..], (len - 2) as u16);
        } else {
            data[0] = (len - 1) as u8;
        }

        cmd.sg.copy_in(&data[..len]);
        CmdStatus::Good
    }

    /// MODE SELECT(6) / MODE SELECT(10).
    pub(crate) fn mode_select(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let cdb = cmd.cdb;
        let select_ten = cmd.opcode() == cmd::MODE_SELECT_10;

        // Pages must come in the page format, and saving is not
        // supported.
        if cdb[1] & 0x10 == 0 || cdb[1] & 0x01 != 0 {
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        let alloc_len = cmd::get_xfer_length(cdb) as usize;
        if alloc_len == 0 {
            return CmdStatus::Good;
        }

        let mut in_buf = [0u8; 512];
        let copied = cmd.sg.copy_out(&mut in_buf);
        if copied >= in_buf.len() {
            debug!("MODE SELECT buffer too long, {copied} bytes");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_PARAMETER_LIST_LENGTH_ERROR);
        }

        let hdr_len = if select_ten { 8 } else { 4 };
        if copied <= hdr_len {
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_PARAMETER_LIST_LENGTH_ERROR);
        }
        let page_code = in_buf[hdr_len] & 0x3f;
        let subpage_code = if in_buf[hdr_len] & 0x40 != 0 {
            in_buf[hdr_len + 1]
        } else {
            0
        };

        if page_code == ZONE_DOM_PAGE && subpage_code == ZONE_DOM_SUBPAGE {
            if self.ms_set_zone_dom_page(&in_buf[hdr_len..copied]).is_err() {
                debug!("MODE SELECT rejected, page {page_code:#04x}/{subpage_code:#04x}");
                return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
            }
            return CmdStatus::Good;
        }

        // No set handler: accept the select only if the payload matches
        // the current page content.
        let mut cur = [0u8; 512];
        match self.fill_mode_pages(page_code as i32, subpage_code as i32, &mut cur) {
            Some(len) if len > 0 && copied - hdr_len >= len
                && cur[..len] == in_buf[hdr_len..hdr_len + len] =>
            {
                CmdStatus::Good
            }
            _ => {
                debug!("MODE SELECT buffer mismatch");
                CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_PARAMETER_LIST)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdcore::config::DevConfig;
    use zdcore::device::Device;

    fn target() -> Target<MemBlockIO> {
        let mut cfg = DevConfig::parse(
            "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25@mem",
        )
        .unwrap();
        cfg.phys_capacity = 8 * 1024 * 1024;
        Target::new(Device::open(MemBlockIO::new(), cfg).unwrap(), "wwn0")
    }

    fn mode_sense10(t: &mut Target<MemBlockIO>, page: u8, subpage: u8, buf: &mut [u8]) -> CmdStatus {
        let mut cdb = [0u8; 10];
        cdb[0] = cmd::MODE_SENSE_10;
        cdb[2] = page;
        cdb[3] = subpage;
        cpbe16(&mut cdb[7..], buf.len() as u16);
        let mut segs = [buf];
        let mut c = ScsiCommand::new(&cdb, SgBuffer::new(&mut segs));
        t.handle_cmd(&mut c)
    }

    fn mode_select10(t: &mut Target<MemBlockIO>, payload: &[u8]) -> CmdStatus {
        let mut cdb = [0u8; 10];
        cdb[0] = cmd::MODE_SELECT_10;
        cdb[1] = 0x10; // PF
        cpbe16(&mut cdb[7..], payload.len() as u16);
        let mut buf = payload.to_vec();
        let mut segs: [&mut [u8]; 1] = [&mut buf];
        let mut c = ScsiCommand::new(&cdb, SgBuffer::new(&mut segs));
        t.handle_cmd(&mut c)
    }

    #[test]
    fn test_mode_sense_zone_dom_page() {
        let mut t = target();
        let mut buf = [0u8; 300];
        assert!(mode_sense10(&mut t, ZONE_DOM_PAGE, ZONE_DOM_SUBPAGE, &mut buf).is_good());
        // Page header after the 8-byte mode parameter header.
        assert_eq!(buf[8] & 0x3f, ZONE_DOM_PAGE);
        assert_eq!(buf[9], ZONE_DOM_SUBPAGE);
        // FSNOZ = the per-realm CMR zone count on a fresh device.
        assert_eq!(rdbe32(&buf[12..]), t.device().nr_actv_zones());
        // MAX ACTIVATION at page offset 16.
        assert_eq!(rdbe16(&buf[24..]) as u32, t.device().max_activate());
    }

    #[test]
    fn test_mode_select_sets_fsnoz_and_urswrz() {
        let mut t = target();

        let mut payload = [0u8; 8 + ZONE_DOM_PAGE_LEN];
        payload[8] = ZONE_DOM_PAGE | 0x40;
        payload[9] = ZONE_DOM_SUBPAGE;
        cpbe32(&mut payload[12..], 7); // FSNOZ
        payload[18] = 0x00; // URSWRZ off (wp check on)
        cpbe16(&mut payload[24..], 32); // MAX ACTIVATION

        assert!(mode_select10(&mut t, &payload).is_good());
        assert_eq!(t.device().nr_actv_zones(), 7);
        assert!(t.device().wp_check());
        assert_eq!(t.device().max_activate(), 32);
    }

    #[test]
    fn test_mode_select_fsnoz_above_max_activation_fails() {
        let mut t = target();
        let mut payload = [0u8; 8 + ZONE_DOM_PAGE_LEN];
        payload[8] = ZONE_DOM_PAGE | 0x40;
        payload[9] = ZONE_DOM_SUBPAGE;
        cpbe32(&mut payload[12..], 100_000); // over the 64-zone limit
        assert_eq!(
            mode_select10(&mut t, &payload),
            CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB)
        );
    }

    #[test]
    fn test_mode_select_read_only_page_verifies_by_compare() {
        let mut t = target();

        // Fetch the caching page, then select it back unchanged.
        let mut buf = [0u8; 64];
        assert!(mode_sense10(&mut t, 0x08, 0, &mut buf).is_good());
        let page_len = 20;
        let mut payload = vec![0u8; 8 + page_len];
        payload[8..8 + page_len].copy_from_slice(&buf[8..8 + page_len]);
        assert!(mode_select10(&mut t, &payload).is_good());

        // A modified payload is rejected.
        payload[10] ^= 0x04;
        assert_eq!(
            mode_select10(&mut t, &payload),
            CmdStatus::sense(
                SenseKey::IllegalRequest,
                ASC_INVALID_FIELD_IN_PARAMETER_LIST
            )
        );
    }

    #[test]
    fn test_mode_sense_all_pages() {
        let mut t = target();
        let mut buf = [0u8; 400];
        assert!(mode_sense10(&mut t, 0x3f, 0, &mut buf).is_good());
        let total = rdbe16(&buf[0..]) as usize + 2;
        // All three standard pages plus the ZD page.
        assert_eq!(total, 8 + 12 + 20 + 12 + ZONE_DOM_PAGE_LEN);
    }
}
