// SPDX-License-Identifier: MIT

//! Command dispatch: maps each SCSI operation and service action onto a
//! handler and keeps the per-target state that is not device metadata
//! (deferred sense, transfer limits, the WWN).

use log::warn;

use zdcore::device::Device;
use zdcore::types::DeviceType;
use zdio::prelude::*;

use crate::bytes::rdbe32;
use crate::cmd::{self, ScsiCommand};
use crate::sense::{status_of, CmdStatus, SenseData, SenseKey, ASC_INVALID_FIELD_IN_CDB};

/// Depth of the deferred sense FIFO.
pub const DEFERRED_SENSE_BUF_SIZE: usize = 4;

/// Default maximum transfer length in LBAs, reported in the Block Limits
/// VPD page.
pub const DEFAULT_MAX_XFER_LEN: u32 = 1024;

/// A SCSI target bound to one emulated device.
pub struct Target<IO: BlockIO + BlockIOSetLen> {
    pub(crate) dev: Device<IO>,
    pub(crate) wwn: String,
    pub(crate) max_xfer_len: u32,
    pub(crate) def_sense: [u32; DEFERRED_SENSE_BUF_SIZE],
}

impl<IO: BlockIO + BlockIOSetLen> Target<IO> {
    pub fn new(dev: Device<IO>, wwn: impl Into<String>) -> Self {
        Self {
            dev,
            wwn: wwn.into(),
            max_xfer_len: DEFAULT_MAX_XFER_LEN,
            def_sense: [0; DEFERRED_SENSE_BUF_SIZE],
        }
    }

    pub fn with_max_xfer_len(mut self, max_xfer_len: u32) -> Self {
        self.max_xfer_len = max_xfer_len;
        self
    }

    #[inline]
    pub fn device(&self) -> &Device<IO> {
        &self.dev
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut Device<IO> {
        &mut self.dev
    }

    pub fn into_device(self) -> Device<IO> {
        self.dev
    }

    /// Handle one command: dispatch, account, and queue the sense of a
    /// failed command for a later REQUEST SENSE.
    pub fn handle_cmd(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        self.dev.stats_mut().nr_cdb_cmds += 1;

        let status = self.dispatch(cmd);
        if let CmdStatus::CheckCondition(sense) = status {
            self.push_deferred_sense(sense);
        }
        status
    }

    fn dispatch(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        match cmd.opcode() {
            cmd::INQUIRY => self.inquiry(cmd),

            cmd::TEST_UNIT_READY => {
                self.dev.stats_mut().nr_tur_cmds += 1;
                CmdStatus::Good
            }

            cmd::READ_CAPACITY_10 => self.read_capacity10(cmd),

            cmd::SERVICE_ACTION_IN_16 => {
                if cmd.cdb[1] & 0x1f == cmd::SAI_READ_CAPACITY_16 {
                    self.read_capacity16(cmd)
                } else {
                    self.not_handled()
                }
            }

            cmd::MODE_SENSE_6 | cmd::MODE_SENSE_10 => self.mode_sense(cmd),
            cmd::MODE_SELECT_6 | cmd::MODE_SELECT_10 => self.mode_select(cmd),

            cmd::REQUEST_SENSE => self.request_sense(cmd),

            cmd::ZBC_IN => self.zbc_in(cmd),
            cmd::ZBC_OUT => self.zbc_out(cmd),

            cmd::ZBC_ZONE_ACTIVATE_32 => {
                if self.dev.is_zd() {
                    self.zone_activate32(cmd)
                } else {
                    self.not_handled()
                }
            }

            cmd::READ_10 | cmd::READ_12 | cmd::READ_16 => self.read(cmd),
            cmd::WRITE_10 | cmd::WRITE_12 | cmd::WRITE_16 => self.write(cmd),
            cmd::READ_6 | cmd::WRITE_6 => self.not_handled(),

            cmd::SYNCHRONIZE_CACHE_10 | cmd::SYNCHRONIZE_CACHE_16 => {
                status_of(self.dev.sync_cache())
            }

            cmd::RECEIVE_DIAGNOSTIC_RESULTS => {
                if self.dev.is_zoned() {
                    self.receive_diag(cmd)
                } else {
                    self.not_handled()
                }
            }

            cmd::SANITIZE => self.sanitize(cmd),
            cmd::FORMAT_UNIT => status_of(self.dev.format_unit()),

            _ => self.not_handled(),
        }
    }

    pub(crate) fn not_handled(&mut self) -> CmdStatus {
        self.dev.stats_mut().nr_nh_cmds += 1;
        CmdStatus::NotHandled
    }

    fn push_deferred_sense(&mut self, sense: SenseData) {
        for slot in self.def_sense.iter_mut() {
            if *slot == 0 {
                *slot = sense.packed();
                return;
            }
        }
        // FIFO full: the oldest entries win, the new one is dropped.
    }

    /// REQUEST SENSE: drain one deferred sense entry into a fixed-format
    /// reply, oldest first.
    fn request_sense(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        if cmd.cdb[1] & 0x01 != 0 {
            // Descriptor format sense is not supported.
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }

        let mut buf = [0u8; 18];
        buf[0] = 0x70;
        buf[7] = 0x0a;
        buf[2] = SenseKey::NoSense as u8;

        if let Some(pos) = self.def_sense.iter().position(|&s| s != 0) {
            let sense = SenseData::from_packed(self.def_sense[pos]);
            buf[2] = sense.key as u8;
            buf[12] = (sense.asc_ascq >> 8) as u8;
            buf[13] = sense.asc_ascq as u8;
            for i in pos..DEFERRED_SENSE_BUF_SIZE - 1 {
                self.def_sense[i] = self.def_sense[i + 1];
            }
            self.def_sense[DEFERRED_SENSE_BUF_SIZE - 1] = 0;
        }

        cmd.sg.copy_in(&buf);
        CmdStatus::Good
    }

    /// SANITIZE re-formats metadata to well-defined initial conditions.
    /// Only the cryptographic erase service action with ZNR clear is
    /// accepted, since all write pointers are reset.
    fn sanitize(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        if cmd.cdb[1] & 0x1f != 0x03 || cmd.cdb[1] & 0x40 != 0 {
            warn!("only crypto SANITIZE with ZNR=0 is supported");
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        }
        status_of(self.dev.sanitize_reset())
    }

    /// ZBC OUT: close/finish/open zone, reset WP, sequentialize, mutate.
    fn zbc_out(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let sa = cmd.cdb[1] & 0x1f;
        let all = cmd.cdb[14] & 0x01 != 0;
        let lba = cmd::get_lba(cmd.cdb);

        if sa == cmd::ZBC_SA_MUTATE {
            return self.mutate(cmd);
        }

        if self.dev.is_zoned() {
            let count = crate::bytes::rdbe16(&cmd.cdb[12..]) as u32;
            let res = match sa {
                cmd::ZBC_SA_CLOSE_ZONE => self.dev.close_zones(lba, count, all),
                cmd::ZBC_SA_FINISH_ZONE => self.dev.finish_zones(lba, count, all),
                cmd::ZBC_SA_OPEN_ZONE => self.dev.open_zones(lba, count, all),
                cmd::ZBC_SA_RESET_WP => self.dev.reset_zones(lba, count, all),
                cmd::ZBC_SA_SEQUENTIALIZE_ZONE => self.dev.sequentialize_zones(lba, count, all),
                _ => {
                    warn!("unsupported ZBC OUT action {sa:#04x}");
                    return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
                }
            };
            return status_of(res);
        }

        warn!("unsupported ZBC OUT action {sa:#04x}");
        CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB)
    }

    /// ZBC IN: reports and zone activation.
    fn zbc_in(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let sa = cmd.cdb[1] & 0x1f;

        match sa {
            cmd::ZBC_SA_REPORT_ZONES if !self.dev.is_nz() => self.report_zones(cmd),
            cmd::ZBC_SA_REPORT_ZONE_DOMAINS if self.dev.is_zd() => self.report_zone_domains(cmd),
            cmd::ZBC_SA_REPORT_REALMS
                if self.dev.is_zd()
                    && self.dev.realms_feat_set()
                    && !self.dev.profile().no_report_realms =>
            {
                self.report_realms(cmd)
            }
            cmd::ZBC_SA_ZONE_ACTIVATE_16 if self.dev.is_zd() => self.zone_activate16(cmd, false),
            cmd::ZBC_SA_ZONE_QUERY_16 if self.dev.is_zd() => self.zone_activate16(cmd, true),
            cmd::ZBC_SA_REPORT_MUTATIONS => self.report_mutations(cmd),
            _ => {
                warn!("unsupported ZBC IN action {sa:#04x}");
                CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB)
            }
        }
    }

    /// MUTATE: change the device personality in place.
    fn mutate(&mut self, cmd: &mut ScsiCommand<'_, '_>) -> CmdStatus {
        let Some(dev_type) = DeviceType::from_raw(cmd.cdb[2] as u32) else {
            warn!("MUTATE, unknown device type {}", cmd.cdb[2]);
            return CmdStatus::sense(SenseKey::IllegalRequest, ASC_INVALID_FIELD_IN_CDB);
        };
        let model = rdbe32(&cmd.cdb[4..]);
        status_of(self.dev.mutate(dev_type, model))
    }
}
