// SPDX-License-Identifier: MIT

//! CDB opcodes, service actions and field extraction, plus the command
//! context handed in by the host runtime.

use zdio::SgBuffer;

use crate::bytes::{rdbe16, rdbe32, rdbe64};

// Opcodes.
pub const TEST_UNIT_READY: u8 = 0x00;
pub const REQUEST_SENSE: u8 = 0x03;
pub const FORMAT_UNIT: u8 = 0x04;
pub const READ_6: u8 = 0x08;
pub const WRITE_6: u8 = 0x0A;
pub const INQUIRY: u8 = 0x12;
pub const MODE_SELECT_6: u8 = 0x15;
pub const MODE_SENSE_6: u8 = 0x1A;
pub const RECEIVE_DIAGNOSTIC_RESULTS: u8 = 0x1C;
pub const READ_CAPACITY_10: u8 = 0x25;
pub const READ_10: u8 = 0x28;
pub const WRITE_10: u8 = 0x2A;
pub const SYNCHRONIZE_CACHE_10: u8 = 0x35;
pub const SANITIZE: u8 = 0x48;
pub const MODE_SELECT_10: u8 = 0x55;
pub const MODE_SENSE_10: u8 = 0x5A;
// Value TBD at the committees; keep the constant authoritative.
pub const ZBC_ZONE_ACTIVATE_32: u8 = 0x7F;
pub const READ_16: u8 = 0x88;
pub const WRITE_16: u8 = 0x8A;
pub const SYNCHRONIZE_CACHE_16: u8 = 0x91;
pub const ZBC_OUT: u8 = 0x94;
pub const ZBC_IN: u8 = 0x95;
pub const SERVICE_ACTION_IN_16: u8 = 0x9E;
pub const READ_12: u8 = 0xA8;
pub const WRITE_12: u8 = 0xAA;

// SERVICE ACTION IN(16) service actions.
pub const SAI_READ_CAPACITY_16: u8 = 0x10;

// ZBC IN service actions.
pub const ZBC_SA_REPORT_ZONES: u8 = 0x00;
// Value TBD, see ZBC_ZONE_ACTIVATE_32.
pub const ZBC_SA_REPORT_MUTATIONS: u8 = 0x05;
pub const ZBC_SA_REPORT_REALMS: u8 = 0x06;
pub const ZBC_SA_REPORT_ZONE_DOMAINS: u8 = 0x07;
pub const ZBC_SA_ZONE_ACTIVATE_16: u8 = 0x08;
pub const ZBC_SA_ZONE_QUERY_16: u8 = 0x09;

// ZBC OUT service actions.
pub const ZBC_SA_CLOSE_ZONE: u8 = 0x01;
pub const ZBC_SA_FINISH_ZONE: u8 = 0x02;
pub const ZBC_SA_OPEN_ZONE: u8 = 0x03;
pub const ZBC_SA_RESET_WP: u8 = 0x04;
pub const ZBC_SA_SEQUENTIALIZE_ZONE: u8 = 0x05;
// Value TBD, see ZBC_ZONE_ACTIVATE_32.
pub const ZBC_SA_MUTATE: u8 = 0x06;

// ZONE ACTIVATE(32) 16-bit service actions. Values TBD.
pub const ZBC_SA_ZONE_ACTIVATE_32: u16 = 0xF800;
pub const ZBC_SA_ZONE_QUERY_32: u16 = 0xF801;

/// The command context delivered by the host runtime: the CDB and the
/// scatter-gather data buffer. Sense data travels back in the command
/// status.
pub struct ScsiCommand<'a, 'b> {
    pub cdb: &'a [u8],
    pub sg: SgBuffer<'b>,
}

impl<'a, 'b> ScsiCommand<'a, 'b> {
    pub fn new(cdb: &'a [u8], sg: SgBuffer<'b>) -> Self {
        Self { cdb, sg }
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.cdb[0]
    }
}

/// Extract the LBA field of a CDB by its opcode family.
pub fn get_lba(cdb: &[u8]) -> u64 {
    match cdb[0] {
        READ_10 | WRITE_10 | READ_12 | WRITE_12 | SYNCHRONIZE_CACHE_10 => rdbe32(&cdb[2..]) as u64,
        _ => rdbe64(&cdb[2..]),
    }
}

/// Extract the transfer/allocation length field of a CDB by its opcode.
pub fn get_xfer_length(cdb: &[u8]) -> u64 {
    match cdb[0] {
        READ_10 | WRITE_10 | SYNCHRONIZE_CACHE_10 => rdbe16(&cdb[7..]) as u64,
        READ_12 | WRITE_12 => rdbe32(&cdb[6..]) as u64,
        MODE_SENSE_6 | MODE_SELECT_6 | REQUEST_SENSE => cdb[4] as u64,
        MODE_SENSE_10 | MODE_SELECT_10 => rdbe16(&cdb[7..]) as u64,
        INQUIRY => rdbe16(&cdb[3..]) as u64,
        RECEIVE_DIAGNOSTIC_RESULTS => rdbe16(&cdb[3..]) as u64,
        _ => rdbe32(&cdb[10..]) as u64,
    }
}
