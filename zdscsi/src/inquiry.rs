// SPDX-License-Identifier: MIT

//! INQUIRY: standard data and the VPD pages.

use log::debug;

use zdio::prelude::*;

use crate::bytes::{cpbe16, cpbe32, cpbe64};
use crate::cmd::ScsiCommand;
use crate::sense::{CmdStatus, SenseKey, ASC_INVALID_FIELD_IN_CDB};
use crate::target::Target;

/// Peripheral device type reported by host-managed devices.
const DEV_TYPE_HOST_MANAGED: u8 = 0x14;

const VENDOR_ID: &[u8; 8] = b"HZBC    ";
const PRODUCT_ID: &[u8; 16] = b"Zone Domains dev";
const PRODUCT_REV: &[u8; 4] = b"0002";

/// Maximum length accepted for WRITE SAME, in LBAs.
const VPD_MAX_WRITE_SAME_LENGTH: u64 = 64;

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    pub(crate) fn inquiry(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        if cmd.cdb[1] & 0x01 != 0 {
            return self.evpd_inquiry(cmd);
        }
        if cmd.cdb[2] != 0 {
            // No page code for standard inquiry.
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }
        self.std_inquiry(cmd)
    }

    fn std_inquiry(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let mut buf = [0u8; 36];
        buf[0] = if self.dev.is_hm() {
            DEV_TYPE_HOST_MANAGED
        } else {
            0x00
        };
        buf[2] = 0x05; // SPC-3
        buf[3] = 0x02; // response data format
        buf[4] = 31; // additional length
        buf[7] = 0x02; // CmdQue
        buf[8..16].copy_from_slice(VENDOR_ID);
        buf[16..32].copy_from_slice(PRODUCT_ID);
        buf[32..36].copy_from_slice(PRODUCT_REV);

        cmd.sg.copy_in(&buf);
        CmdStatus::Good
    }

    fn evpd_inquiry(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let page = cmd.cdb[2];
        let mut data = [0u8; 512];
        data[0] = if self.dev.is_hm() {
            DEV_TYPE_HOST_MANAGED
        } else {
            0x00
        };
        data[1] = page;

        match page {
            0x00 => {
                // Supported VPD pages.
                let mut i = 4;
                for p in [0x80u8, 0x83, 0xb0, 0xb1] {
                    data[i] = p;
                    i += 1;
                }
                if self.dev.is_zoned() {
                    data[i] = 0xb6;
                    i += 1;
                }
                data[3] = (i - 4) as u8;
                cmd.sg.copy_in(&data[..i]);
            }

            0x80 => {
                // Unit serial number: the unscrambled WWN.
                let wwn = self.wwn.as_bytes();
                let used = wwn.len().min(36);
                data[4..4 + used].copy_from_slice(&wwn[..used]);
                cpbe16(&mut data[2..], used as u16);
                cmd.sg.copy_in(&data[..used + 4]);
            }

            0x83 => {
                // Device identification: T10 vendor id, then NAA binary.
                let wwn = self.wwn.clone();
                let mut used = 0usize;
                {
                    let ptr = &mut data[4..];
                    ptr[0] = 2; // code set: ASCII
                    ptr[1] = 1; // identifier: T10 vendor id
                    ptr[4..12].copy_from_slice(VENDOR_ID);
                    let len = wwn.len().min(200);
                    ptr[12..12 + len].copy_from_slice(&wwn.as_bytes()[..len]);
                    ptr[3] = (8 + len + 1) as u8;
                    used += ptr[3] as usize + 4;
                }
                fill_naa_id(&mut data[4 + used..], &wwn);
                used += 20;

                cpbe16(&mut data[2..], used as u16);
                cmd.sg.copy_in(&data[..used + 4]);
            }

            0xb0 => {
                // Block limits.
                cpbe16(&mut data[2..], 0x3c);
                // WSNZ: no zero-length WRITE SAME.
                data[4] = 0x01;
                // Maximum COMPARE AND WRITE length.
                data[5] = 0x01;
                cpbe32(&mut data[8..], self.max_xfer_len);
                cpbe32(&mut data[12..], self.max_xfer_len);
                cpbe64(&mut data[36..], VPD_MAX_WRITE_SAME_LENGTH);
                cmd.sg.copy_in(&data[..64]);
            }

            0xb1 => {
                // Block device characteristics.
                cpbe16(&mut data[2..], 0x3c);
                cpbe16(&mut data[4..], 0x1c20); // 7200 RPM
                data[8] = 0x02; // FUAB: flush is supported
                if self.dev.is_ha() {
                    data[8] |= 0x10; // ZONED: host aware
                }
                if self.dev.is_zd() {
                    data[8] |= 0x40; // Zone Domains command set
                }
                data[9] = 0x01; // MUTATE support
                cmd.sg.copy_in(&data[..64]);
            }

            0xb6 => {
                // Zoned block device characteristics.
                if !self.dev.is_zoned() {
                    return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
                }
                let feat = self.dev.profile();
                cpbe16(&mut data[2..], 0x3c);

                // URSWRZ plus the Zone Domains capability bits.
                data[4] = if self.dev.wp_check() { 0x00 } else { 0x01 };
                if self.dev.is_zd() {
                    if feat.max_act_control {
                        data[4] |= 0x04;
                    }
                    if !feat.no_nozsrc {
                        data[4] |= 0x08;
                    }
                    if !feat.no_ur_control {
                        data[4] |= 0x10;
                    }
                    if self.dev.realms_feat_set() && !feat.no_report_realms {
                        data[4] |= 0x20;
                    }
                    if !feat.no_za_control {
                        data[4] |= 0x80;
                    }

                    // Zone types supported.
                    if feat.actv_of_conv {
                        data[10] |= 0x01;
                    }
                    if feat.actv_of_seq_pref {
                        data[10] |= 0x02;
                    }
                    if feat.actv_of_seq_req {
                        data[10] |= 0x04;
                    }
                    if feat.actv_of_sobr {
                        data[10] |= 0x08;
                    }
                    if self.dev.have_gaps() {
                        data[10] |= 0x10;
                    }

                    let mut max_activate = self.dev.max_activate();
                    if max_activate > self.dev.nr_zones() {
                        max_activate = 0;
                    }
                    cpbe16(&mut data[20..], max_activate as u16);
                }

                if self.dev.is_ha() {
                    // Optimal open / non-sequentially written SWP zones.
                    cpbe32(&mut data[8..], self.dev.nr_open_zones());
                    cpbe32(&mut data[12..], self.dev.nr_open_zones());
                } else {
                    // Maximum open SWR zones.
                    cpbe32(&mut data[16..], self.dev.nr_open_zones());
                }
                cmd.sg.copy_in(&data[..64]);
            }

            _ => {
                debug!("unsupported vital product data page {page:#04x}");
                return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
            }
        }

        CmdStatus::Good
    }
}

/// Fill a NAA registered-extended designator from the WWN. Only a nibble
/// of every WWN byte is used, matching what the kernel reports for the
/// same device.
fn fill_naa_id(ptr: &mut [u8], wwn: &str) {
    ptr[0] = 1; // code set: binary
    ptr[1] = 3; // identifier: NAA
    ptr[3] = 16; // body length for NAA registered extended format

    // NAA type 6, OpenFabrics IEEE company ID 00 14 05.
    ptr[4] = 0x60;
    ptr[5] = 0x01;
    ptr[6] = 0x40;
    ptr[7] = 0x50;

    let mut i = 7;
    let mut low_nibble = true;
    for c in wwn.chars() {
        if i >= 20 {
            break;
        }
        let Some(val) = c.to_digit(16) else {
            continue;
        };
        let val = val as u8;
        if low_nibble {
            ptr[i] |= val;
            i += 1;
            low_nibble = false;
        } else {
            ptr[i] = val << 4;
            low_nibble = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd;
    use zdcore::config::DevConfig;
    use zdcore::device::Device;

    fn target() -> Target<MemBlockIO> {
        let mut cfg = DevConfig::parse(
            "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25@mem",
        )
        .unwrap();
        cfg.phys_capacity = 8 * 1024 * 1024;
        Target::new(Device::open(MemBlockIO::new(), cfg).unwrap(), "20011405abcdef01")
    }

    fn inquiry(t: &mut Target<MemBlockIO>, evpd: bool, page: u8, buf: &mut [u8]) -> CmdStatus {
        let mut cdb = [0u8; 6];
        cdb[0] = cmd::INQUIRY;
        cdb[1] = evpd as u8;
        cdb[2] = page;
        cdb[4] = buf.len() as u8;
        let mut segs = [buf];
        let mut c = ScsiCommand::new(&cdb, SgBuffer::new(&mut segs));
        t.handle_cmd(&mut c)
    }

    #[test]
    fn test_std_inquiry() {
        let mut t = target();
        let mut buf = [0u8; 36];
        assert!(inquiry(&mut t, false, 0, &mut buf).is_good());
        assert_eq!(buf[0], 0x00); // ZD reports a standard block device
        assert_eq!(&buf[8..16], VENDOR_ID);
        assert_eq!(&buf[16..32], PRODUCT_ID);
    }

    #[test]
    fn test_supported_vpd_pages_include_b6_when_zoned() {
        let mut t = target();
        let mut buf = [0u8; 16];
        assert!(inquiry(&mut t, true, 0x00, &mut buf).is_good());
        let n = buf[3] as usize;
        assert!(buf[4..4 + n].contains(&0xb6));
    }

    #[test]
    fn test_b6_capability_bits() {
        let mut t = target();
        let mut buf = [0u8; 64];
        assert!(inquiry(&mut t, true, 0xb6, &mut buf).is_good());
        // URSWRZ on by default for this profile.
        assert_eq!(buf[4] & 0x01, 0x01);
        // MAX ACTIVATION control and ZA control advertised.
        assert_eq!(buf[4] & 0x04, 0x04);
        assert_eq!(buf[4] & 0x80, 0x80);
        // Zone types: conventional and SWR.
        assert_eq!(buf[10] & 0x05, 0x05);
        // Gap zones exist on ZONE_DOM (domain_gap = 3).
        assert_eq!(buf[10] & 0x10, 0x10);
        // MAX ACTIVATION default of the profile.
        assert_eq!(crate::bytes::rdbe16(&buf[20..]), 64);
    }

    #[test]
    fn test_serial_page_carries_wwn() {
        let mut t = target();
        let mut buf = [0u8; 64];
        assert!(inquiry(&mut t, true, 0x80, &mut buf).is_good());
        let n = crate::bytes::rdbe16(&buf[2..]) as usize;
        assert_eq!(&buf[4..4 + n], b"20011405abcdef01");
    }

    #[test]
    fn test_unknown_vpd_page_rejected() {
        let mut t = target();
        let mut buf = [0u8; 16];
        let st = inquiry(&mut t, true, 0x99, &mut buf);
        assert_eq!(
            st,
            CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB)
        );
    }
}
