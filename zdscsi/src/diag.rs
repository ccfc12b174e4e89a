// SPDX-License-Identifier: MIT

//! RECEIVE DIAGNOSTIC RESULTS: the supported-pages list and the Zoned
//! Block Device Statistics subpage.

use log::warn;

use zdcore::stats::NR_STAT_PARAMS;
use zdio::prelude::*;

use crate::bytes::{cpbe16, cpbe64, rdbe16};
use crate::cmd::ScsiCommand;
use crate::sense::{CmdStatus, SenseKey, ASC_INVALID_FIELD_IN_CDB,
                   ASC_INVALID_FIELD_IN_PARAMETER_LIST};
use crate::target::Target;

/// Diagnostic page codes.
pub const ZBD_LOG_SUPP_PAGES: u8 = 0x00;
pub const ZBD_LOG_STATS: u8 = 0x14;

/// Size of one statistics log parameter record.
pub const LOG_PARAM_RECORD_SIZE: usize = 12;

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    pub(crate) fn receive_diag(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let cdb = cmd.cdb;
        let page = if cdb[1] & 0x01 != 0 {
            // PCV set: a specific page is requested.
            let page = cdb[2];
            if page != ZBD_LOG_SUPP_PAGES && page != ZBD_LOG_STATS {
                warn!("unsupported diagnostic page {page:#04x}");
                return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
            }
            page
        } else {
            ZBD_LOG_SUPP_PAGES
        };

        let alloc_len = rdbe16(&cdb[3..]) as usize;

        match page {
            ZBD_LOG_SUPP_PAGES => {
                if alloc_len < 6 {
                    return no_room(page, alloc_len);
                }
                let mut data = [0u8; 6];
                data[0] = ZBD_LOG_SUPP_PAGES;
                cpbe16(&mut data[2..], 2);
                data[4] = ZBD_LOG_SUPP_PAGES;
                data[5] = ZBD_LOG_STATS;
                cmd.sg.copy_in(&data);
            }

            ZBD_LOG_STATS => {
                let size = LOG_PARAM_RECORD_SIZE * NR_STAT_PARAMS + 4;
                if alloc_len < size {
                    return no_room(page, alloc_len);
                }
                let mut data = [0u8; 4];
                data[0] = ZBD_LOG_STATS | 0x40; // SPF
                data[1] = 0x01; // subpage
                cpbe16(&mut data[2..], (size - 4) as u16);
                if cmd.sg.copy_in(&data) != 4 {
                    return no_room(page, alloc_len);
                }

                let mut rec = [0u8; LOG_PARAM_RECORD_SIZE];
                for code in 0..NR_STAT_PARAMS as u16 {
                    let val = self
                        .dev
                        .stats()
                        .param_value(code)
                        .expect("stat parameter codes are dense");
                    rec.fill(0);
                    cpbe16(&mut rec[0..], code);
                    rec[2] = 0x03; // binary format
                    rec[3] = 8; // parameter length
                    cpbe64(&mut rec[4..], val);
                    if cmd.sg.copy_in(&rec) != LOG_PARAM_RECORD_SIZE {
                        return no_room(page, alloc_len);
                    }
                }
            }

            _ => return self.not_handled(),
        }

        CmdStatus::Good
    }
}

fn no_room(page: u8, alloc_len: usize) -> CmdStatus {
    warn!("diag page {page:#04x}: transfer length {alloc_len} too small");
    CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_PARAMETER_LIST)
}
