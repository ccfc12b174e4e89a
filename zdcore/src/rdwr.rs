// SPDX-License-Identifier: MIT

//! Read/write data path: zone-type, write-pointer and boundary
//! enforcement, zero-fill above the valid-data boundary, scatter-gather
//! IO to the backing store.

use log::warn;

use zdio::prelude::*;

use crate::device::Device;
use crate::errors::{ZbcError, ZbcResult};

impl<IO: BlockIO + BlockIOSetLen> Device<IO> {
    /// Backing-store byte offset of a data LBA. On a Zone Domains device
    /// each domain's logical range maps onto the same physical region, so
    /// the domain start LBA collapses out of the offset.
    pub(crate) fn bs_offset(&self, lba: u64) -> u64 {
        let mut lba = lba;
        if self.is_zd() {
            for d in self.domains() {
                if lba <= d.end_lba {
                    lba -= d.start_lba;
                    break;
                }
            }
        }
        self.meta_size + (lba << self.lba_log2)
    }

    /// Number of LBAs of the transfer that fall into this zone.
    #[inline]
    fn zone_lba_count(&self, idx: u32, lba: u64, nr_lbas: u64) -> u64 {
        let z = self.meta.zone(idx);
        if lba + nr_lbas > z.end() {
            z.end() - lba
        } else {
            nr_lbas
        }
    }

    /// Upper boundary of valid data in a zone.
    fn zone_boundary(&self, idx: u32) -> u64 {
        let z = self.meta.zone(idx);
        if z.is_empty() || z.is_gap() {
            z.start
        } else if z.is_not_wp() || z.is_full() {
            z.end()
        } else {
            z.wp
        }
    }

    /// Check the LBA range and the transfer buffer length.
    fn check_rdwr(&self, lba: u64, nr_lbas: u64, buf_len: usize) -> ZbcResult {
        if self.lba_out_of_range(lba, nr_lbas) {
            warn!(
                "command past high LBA {} (lba {}, xfer len {})",
                self.logical_capacity.saturating_sub(1),
                lba,
                nr_lbas
            );
            return Err(ZbcError::LbaOutOfRange);
        }
        if buf_len as u64 != nr_lbas << self.lba_log2 {
            warn!(
                "buffer mismatch: len {}, xfer len {}, block size {}",
                buf_len, nr_lbas, self.lba_size
            );
            return Err(ZbcError::Internal("transfer buffer length mismatch"));
        }
        Ok(())
    }

    /// Check if a zone satisfies all protocol conditions for reading
    /// `nr_lbas` starting at `lba` within it.
    fn zone_ok_to_read(&self, idx: u32, lba: u64, nr_lbas: u64, first_type: u8) -> ZbcResult {
        let z = self.meta.zone(idx);

        // Gap zones read as a fill pattern only with URSWRZ on.
        if z.is_gap() && self.wp_check {
            warn!("reading GAP zone, URSWRZ 0, LBA {lba}");
            return Err(ZbcError::AccessGapZone);
        }

        if z.is_offline() {
            warn!("read of an offline zone, LBA {lba}");
            return Err(ZbcError::ZoneIsOffline);
        }

        // Inactive zones read as a fill pattern with URSWRZ on. Inactive
        // SWP and conventional zones are readable regardless.
        if z.is_inactive() && self.wp_check && !z.is_conv() && !z.is_seq_pref() {
            warn!("read of inactive zone, URSWRZ 0, LBA {lba}");
            return Err(ZbcError::ZoneIsInactive);
        }

        // No crossing between zones of different types.
        if z.ztype != first_type {
            warn!("read boundary violation LBA {lba}, xfer len {nr_lbas}");
            return Err(ZbcError::ReadBoundaryViolation);
        }

        // No read restrictions when URSWRZ is enabled, and none on
        // conventional or SWP zones.
        if !self.wp_check || z.is_conv() || z.is_seq_pref() {
            return Ok(());
        }

        // SWR zone boundary.
        if z.is_seq_req() && lba + nr_lbas > z.end() {
            warn!("read boundary violation LBA {lba}, xfer len {nr_lbas}");
            return Err(ZbcError::ReadBoundaryViolation);
        }

        // SWR/SOBR write-pointer restrictions.
        let boundary = self.zone_boundary(idx);
        if lba < boundary && self.zone_lba_count(idx, lba, nr_lbas) > boundary - lba {
            warn!("read through WP LBA {lba}, xfer len {nr_lbas}");
            return Err(ZbcError::ReadInvalidData);
        }
        if lba >= boundary {
            warn!("read over WP LBA {lba}, xfer len {nr_lbas}");
            return Err(ZbcError::ReadInvalidData);
        }

        Ok(())
    }

    /// Check if a zone satisfies all protocol conditions for writing.
    fn zone_ok_to_write(&self, idx: u32, lba: u64, nr_lbas: u64, first_type: u8) -> ZbcResult {
        let z = self.meta.zone(idx);

        if z.is_gap() {
            warn!("write LBA {lba} is in a GAP zone");
            return Err(ZbcError::AccessGapZone);
        }
        if z.is_offline() {
            warn!("write LBA {lba} is in an OFFLINE zone");
            return Err(ZbcError::ZoneIsOffline);
        }
        if z.is_inactive() {
            warn!("write LBA {lba} is in an INACTIVE zone");
            return Err(ZbcError::ZoneIsInactive);
        }
        if z.is_rdonly() {
            warn!("write LBA {lba} is in a READ ONLY zone");
            return Err(ZbcError::ZoneIsReadOnly);
        }

        // Type boundary crossings, and SWR zone boundary crossings.
        if z.ztype != first_type || (z.is_seq_req() && lba + nr_lbas > z.end()) {
            warn!("write boundary violation LBA {lba}, xfer len {nr_lbas}");
            return Err(ZbcError::WriteBoundaryViolation);
        }

        // Writing a full SWR zone is not allowed.
        if z.is_seq_req() && z.is_full() {
            warn!("write to FULL zone, LBA {lba}");
            return Err(ZbcError::InvalidFieldInCdb);
        }

        // SWR zones only accept writes at the write pointer.
        if z.is_seq_req() && lba != z.wp {
            warn!("unaligned write LBA {lba}, wp {}", z.wp);
            return Err(ZbcError::UnalignedWrite);
        }

        // SOBR zones accept writes at or below the write pointer.
        if z.is_sobr() && !z.is_full() && lba > z.wp {
            warn!("unaligned write LBA {lba}, wp {}", z.wp);
            return Err(ZbcError::UnalignedWrite);
        }

        Ok(())
    }

    /// Walk every zone of the transfer, applying the read or write rules.
    fn rdwr_check_zones(&mut self, read: bool, lba: u64, nr_lbas: u64) -> ZbcResult {
        let mut lba = lba;
        let mut nr_lbas = nr_lbas;
        let mut first_type = 0u8;

        while nr_lbas > 0 {
            let idx = self
                .get_zone(lba, false)
                .ok_or(ZbcError::Internal("no zone for LBA"))?;
            if first_type == 0 {
                first_type = self.meta.zone(idx).ztype;
            }

            let ret = if read {
                self.zone_ok_to_read(idx, lba, nr_lbas, first_type)
            } else {
                self.zone_ok_to_write(idx, lba, nr_lbas, first_type)
            };
            if let Err(e) = ret {
                if read {
                    self.stats.read_rule_fails += 1;
                } else {
                    self.stats.write_rule_fails += 1;
                }
                return Err(e);
            }

            let count = self.zone_lba_count(idx, lba, nr_lbas);
            lba += count;
            nr_lbas -= count;
        }

        Ok(())
    }

    /// READ on a zoned device.
    fn read_zoned(&mut self, lba: u64, nr_lbas: u64, sg: &mut SgBuffer<'_>) -> ZbcResult {
        self.check_rdwr(lba, nr_lbas, sg.remaining())?;
        self.rdwr_check_zones(true, lba, nr_lbas)?;

        let mut lba = lba;
        let mut left = nr_lbas;
        while left > 0 {
            let idx = self
                .get_zone(lba, false)
                .ok_or(ZbcError::Internal("no zone for LBA"))?;

            let boundary = self.zone_boundary(idx);
            let count = if lba >= boundary {
                // Reads above the valid-data boundary return zeroes.
                let count = self.zone_lba_count(idx, lba, left);
                sg.fill(0, (count << self.lba_log2) as usize);
                count
            } else {
                let count = (boundary - lba).min(left);
                let bytes = (count << self.lba_log2) as usize;
                let offset = self.bs_offset(lba);
                self.io
                    .read_sg_at(offset, sg, bytes)
                    .map_err(|_| ZbcError::ReadError)?;
                count
            };

            lba += count;
            left -= count;
        }

        Ok(())
    }

    /// WRITE on a zoned device.
    fn write_zoned(&mut self, lba: u64, nr_lbas: u64, sg: &mut SgBuffer<'_>) -> ZbcResult {
        self.check_rdwr(lba, nr_lbas, sg.remaining())?;
        self.rdwr_check_zones(false, lba, nr_lbas)?;

        let mut lba = lba;
        let mut left = nr_lbas;
        loop {
            let idx = self
                .get_zone(lba, false)
                .ok_or(ZbcError::Internal("no zone for LBA"))?;

            // Implicitly open the zone if it is not open yet.
            {
                let z = self.meta.zone(idx);
                if (z.is_seq() || z.is_sobr()) && !z.is_open() && !z.is_full() {
                    if z.is_seq_req() && !self.ozr_check(1) {
                        return Err(ZbcError::InsufficientZoneResources);
                    }
                    self.open_zone_inner(idx, false);
                }
            }

            if left == 0 {
                break;
            }

            let count = self.zone_lba_count(idx, lba, left);
            let bytes = (count << self.lba_log2) as usize;
            let offset = self.bs_offset(lba);
            self.io
                .write_sg_at(offset, sg, bytes)
                .map_err(|_| ZbcError::WriteError)?;

            self.adjust_write_ptr(idx, lba, count);

            lba += count;
            left -= count;
            if left == 0 {
                break;
            }
        }

        Ok(())
    }

    /// READ on a non-zoned device.
    fn read_nz(&mut self, lba: u64, nr_lbas: u64, sg: &mut SgBuffer<'_>) -> ZbcResult {
        self.check_rdwr(lba, nr_lbas, sg.remaining())?;
        let offset = self.bs_offset(lba);
        self.io
            .read_sg_at(offset, sg, (nr_lbas << self.lba_log2) as usize)
            .map_err(|_| ZbcError::ReadError)
    }

    /// WRITE on a non-zoned device.
    fn write_nz(&mut self, lba: u64, nr_lbas: u64, sg: &mut SgBuffer<'_>) -> ZbcResult {
        self.check_rdwr(lba, nr_lbas, sg.remaining())?;
        let offset = self.bs_offset(lba);
        self.io
            .write_sg_at(offset, sg, (nr_lbas << self.lba_log2) as usize)
            .map_err(|_| ZbcError::WriteError)
    }

    /// READ command semantics.
    pub fn read(&mut self, lba: u64, nr_lbas: u64, sg: &mut SgBuffer<'_>) -> ZbcResult {
        if self.is_nz() {
            self.read_nz(lba, nr_lbas, sg)
        } else {
            self.read_zoned(lba, nr_lbas, sg)
        }
    }

    /// WRITE command semantics.
    pub fn write(&mut self, lba: u64, nr_lbas: u64, sg: &mut SgBuffer<'_>) -> ZbcResult {
        if self.is_nz() {
            self.write_nz(lba, nr_lbas, sg)
        } else {
            self.write_zoned(lba, nr_lbas, sg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevConfig;
    use crate::device::Device;
    use crate::types::ZoneType;

    fn zd_dev() -> Device<MemBlockIO> {
        let mut cfg = DevConfig::parse(
            "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25@mem",
        )
        .unwrap();
        cfg.phys_capacity = 8 * 1024 * 1024;
        Device::open(MemBlockIO::new(), cfg).unwrap()
    }

    fn seq_lba(dev: &Device<MemBlockIO>, nth: u32) -> (u32, u64) {
        let dom = dev.domain_id_of_type(ZoneType::SeqWriteReq).unwrap();
        let d = *dev.domain(dom);
        let idx = dev.get_zone(d.start_lba, false).unwrap() + nth;
        (idx, dev.zone_at(idx).start)
    }

    fn write_lbas(dev: &mut Device<MemBlockIO>, lba: u64, data: &[u8]) -> ZbcResult {
        let mut buf = data.to_vec();
        let mut segs: [&mut [u8]; 1] = [&mut buf];
        let mut sg = SgBuffer::new(&mut segs);
        dev.write(lba, (data.len() / 512) as u64, &mut sg)
    }

    fn read_lbas(dev: &mut Device<MemBlockIO>, lba: u64, nr: u64) -> ZbcResult<Vec<u8>> {
        let mut buf = vec![0u8; (nr * 512) as usize];
        {
            let mut segs: [&mut [u8]; 1] = [&mut buf];
            let mut sg = SgBuffer::new(&mut segs);
            dev.read(lba, nr, &mut sg)?;
        }
        Ok(buf)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut dev = zd_dev();
        let (idx, lba) = seq_lba(&dev, 0);

        let data = vec![0xA5u8; 2 * 512];
        write_lbas(&mut dev, lba, &data).unwrap();
        assert!(dev.zone_at(idx).is_imp_open());
        assert_eq!(dev.zone_at(idx).wp, lba + 2);

        let back = read_lbas(&mut dev, lba, 2).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_unaligned_write_rejected() {
        let mut dev = zd_dev();
        let (_, lba) = seq_lba(&dev, 0);

        let data = vec![0u8; 512];
        let err = write_lbas(&mut dev, lba + 16, &data).unwrap_err();
        assert_eq!(err, ZbcError::UnalignedWrite);
        assert_eq!(dev.stats().write_rule_fails, 1);
    }

    #[test]
    fn test_read_above_wp() {
        let mut dev = zd_dev();
        let (_, lba) = seq_lba(&dev, 0);
        write_lbas(&mut dev, lba, &vec![0xEEu8; 512]).unwrap();

        // wp_check is off by default: reading above the WP zero-fills.
        assert!(!dev.wp_check());
        let back = read_lbas(&mut dev, lba, 4).unwrap();
        assert_eq!(&back[..512], &[0xEEu8; 512][..]);
        assert!(back[512..].iter().all(|&b| b == 0));

        // With wp_check on, the same read fails.
        dev.set_urswrz(0x00);
        assert!(dev.wp_check());
        let err = read_lbas(&mut dev, lba, 4).unwrap_err();
        assert_eq!(err, ZbcError::ReadInvalidData);
    }

    #[test]
    fn test_write_full_zone_to_full_condition() {
        let mut dev = zd_dev();
        let (idx, lba) = seq_lba(&dev, 1);
        let len = dev.zone_at(idx).len;

        // Fill the zone in 16-LBA slices.
        let slice = vec![0x11u8; 16 * 512];
        let mut cur = lba;
        for _ in 0..len / 16 {
            write_lbas(&mut dev, cur, &slice).unwrap();
            cur += 16;
        }
        let z = *dev.zone_at(idx);
        assert!(z.is_full());
        assert_eq!(z.wp, z.start + z.len);

        // A further write is rejected.
        let err = write_lbas(&mut dev, z.start + z.len - 16, &slice).unwrap_err();
        assert_eq!(err, ZbcError::InvalidFieldInCdb);
    }

    #[test]
    fn test_write_rejects_inactive_and_gap() {
        let mut dev = zd_dev();
        // Conventional zones start inactive on this profile.
        let conv_lba = dev.domain(0).start_lba;
        let err = write_lbas(&mut dev, conv_lba, &vec![0u8; 512]).unwrap_err();
        assert_eq!(err, ZbcError::ZoneIsInactive);

        let gap_lba = dev.domain(0).end_lba + 1;
        let err = write_lbas(&mut dev, gap_lba, &vec![0u8; 512]).unwrap_err();
        assert_eq!(err, ZbcError::AccessGapZone);
    }

    #[test]
    fn test_read_boundary_type_crossing() {
        let mut dev = zd_dev();
        // Read across the conventional domain end into the gap: the zone
        // type changes mid-transfer.
        let d0 = *dev.domain(0);
        let last = d0.end_lba + 1 - 2;
        let err = read_lbas(&mut dev, last, 4).unwrap_err();
        assert_eq!(err, ZbcError::ReadBoundaryViolation);
    }

    #[test]
    fn test_lba_out_of_range() {
        let mut dev = zd_dev();
        let cap = dev.logical_capacity();
        let err = read_lbas(&mut dev, cap, 1).unwrap_err();
        assert_eq!(err, ZbcError::LbaOutOfRange);
        let err = write_lbas(&mut dev, cap - 1, &vec![0u8; 1024]).unwrap_err();
        assert_eq!(err, ZbcError::LbaOutOfRange);
    }

    #[test]
    fn test_domain_ranges_share_physical_space() {
        let dev = zd_dev();
        let d0 = *dev.domain(0);
        let d1 = *dev.domain(1);
        // The first LBA of both domains maps to the same file offset.
        assert_eq!(dev.bs_offset(d0.start_lba), dev.bs_offset(d1.start_lba));
    }

    #[test]
    fn test_nz_flat_rw() {
        let mut cfg = DevConfig::parse("dhsmr/type-NON_ZONED@mem").unwrap();
        cfg.phys_capacity = 1024 * 1024;
        let mut dev = Device::open(MemBlockIO::new(), cfg).unwrap();

        let data = vec![0x3Cu8; 3 * 512];
        write_lbas(&mut dev, 100, &data).unwrap();
        let back = read_lbas(&mut dev, 100, 3).unwrap();
        assert_eq!(back, data);
    }
}
