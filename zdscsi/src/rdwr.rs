// SPDX-License-Identifier: MIT

//! READ, WRITE and READ CAPACITY.

use zdio::prelude::*;

use crate::bytes::{cpbe32, cpbe64};
use crate::cmd::{self, ScsiCommand};
use crate::sense::{status_of, CmdStatus};
use crate::target::Target;

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    pub(crate) fn read(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let lba = cmd::get_lba(cmd.cdb);
        let len = cmd::get_xfer_length(cmd.cdb);
        status_of(self.dev.read(lba, len, &mut cmd.sg))
    }

    pub(crate) fn write(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let lba = cmd::get_lba(cmd.cdb);
        let len = cmd::get_xfer_length(cmd.cdb);
        status_of(self.dev.write(lba, len, &mut cmd.sg))
    }

    /// READ CAPACITY(10): only handled for non-zoned devices; zoned hosts
    /// must use READ CAPACITY(16).
    pub(crate) fn read_capacity10(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        if !self.dev.is_nz() {
            return self.not_handled();
        }

        let mut data = [0u8; 8];
        let capacity = self.dev.logical_capacity();
        if capacity > u32::MAX as u64 {
            // The host needs READ CAPACITY(16).
            cpbe32(&mut data[0..], u32::MAX);
        } else {
            cpbe32(&mut data[0..], (capacity - 1) as u32);
        }
        cpbe32(&mut data[4..], self.dev.lba_size());

        cmd.sg.copy_in(&data);
        CmdStatus::Good
    }

    /// READ CAPACITY(16). A Zone Domains device returns the last LBA of
    /// the CMR space; zoned devices return the whole device with
    /// RC BASIS set to maximum capacity.
    pub(crate) fn read_capacity16(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let mut data = [0u8; 32];

        if self.dev.is_zd() {
            cpbe64(&mut data[0..], self.dev.logical_cmr_capacity() - 1);
        } else {
            cpbe64(&mut data[0..], self.dev.logical_capacity() - 1);
        }
        cpbe32(&mut data[8..], self.dev.lba_size());
        if self.dev.is_hm() || self.dev.is_ha() {
            data[12] = 0x10; // RC BASIS: maximum capacity
        }

        cmd.sg.copy_in(&data);
        CmdStatus::Good
    }
}
