// SPDX-License-Identifier: MIT

//! Zone state machine: open, close, finish, reset, sequentialize,
//! implicit-open eviction, write-pointer bookkeeping.

use log::{error, warn};

use zdio::prelude::*;

use crate::device::Device;
use crate::errors::{ZbcError, ZbcResult};
use crate::meta::{ListId, NO_WP};
use crate::types::ZoneCond;

impl<IO: BlockIO + BlockIOSetLen> Device<IO> {
    /// Set the write pointer of a zone entering `cond` and link it into
    /// the sequential-active list when appropriate.
    pub(crate) fn set_initial_wp(&mut self, idx: u32) {
        let cond = self.meta.zone(idx).condition();
        match cond {
            Some(ZoneCond::Empty) => {
                let z = self.meta.zone_mut(idx);
                z.wp = z.start;
                self.meta.list_push_tail(ListId::SeqActive, idx);
            }
            Some(ZoneCond::Full) => {
                let z = self.meta.zone_mut(idx);
                z.wp = if z.is_seq() { z.start + z.len } else { NO_WP };
                self.meta.list_push_tail(ListId::SeqActive, idx);
            }
            Some(ZoneCond::Inactive)
            | Some(ZoneCond::NotWp)
            | Some(ZoneCond::ReadOnly)
            | Some(ZoneCond::Offline) => {
                self.meta.zone_mut(idx).wp = NO_WP;
            }
            _ => {
                error!(
                    "zone {} initialized in condition {:#x}",
                    self.meta.zone(idx).start,
                    self.meta.zone(idx).cond
                );
            }
        }
    }

    /// Called when the condition of a zone is about to change. Keeps the
    /// empty-zone count and its low-water mark current.
    pub(crate) fn on_cond_change(&mut self, idx: u32, new_cond: ZoneCond) {
        if self.meta.zone(idx).is_empty() && new_cond != ZoneCond::Empty {
            self.nr_empty_zones -= 1;
            if self.stats.min_empty_zones > self.nr_empty_zones {
                self.stats.min_empty_zones = self.nr_empty_zones;
            }
        }
    }

    /// Check if another `add_val` SWR zones can be explicitly open
    /// without exceeding the limit.
    pub(crate) fn ozr_check(&self, add_val: u32) -> bool {
        if self.nr_exp_open + add_val > self.nr_open_zones {
            warn!(
                "insufficient zone resources: eopen={} + add={} > max={}",
                self.nr_exp_open, add_val, self.nr_open_zones
            );
            return false;
        }
        true
    }

    /// Close an open zone. No-op for conventional, SOBR and not-open
    /// zones. Only SWR zones count against the open-zone limits.
    pub(crate) fn close_zone_inner(&mut self, idx: u32) {
        {
            let z = self.meta.zone(idx);
            if z.is_conv() || !z.is_open() || z.is_sobr() {
                return;
            }
            if z.is_seq_req() {
                if z.is_imp_open() {
                    self.nr_imp_open -= 1;
                } else {
                    self.nr_exp_open -= 1;
                }
            }
        }

        self.meta.unlink_zone(idx);

        let at_start = {
            let z = self.meta.zone(idx);
            z.wp == z.start
        };
        if at_start {
            self.meta.zone_mut(idx).set_cond(ZoneCond::Empty);
            self.meta.list_push_tail(ListId::SeqActive, idx);
            self.nr_empty_zones += 1;
        } else {
            self.meta.zone_mut(idx).set_cond(ZoneCond::Closed);
            // Head insertion: an implicit close during OPEN ALL must not
            // requeue the zone behind the snapshot being opened.
            self.meta.list_push_head(ListId::Closed, idx);
        }
    }

    /// Close implicitly open zones, head first, until the open-zone
    /// budget holds again.
    pub(crate) fn close_imp_open_zone(&mut self) {
        let mut cur = self.meta.list_first(ListId::ImpOpen);
        while let Some(idx) = cur {
            let next = self.meta.list_next(idx);
            self.close_zone_inner(idx);
            if self.nr_imp_open + self.nr_exp_open < self.nr_open_zones {
                break;
            }
            cur = next;
        }
    }

    /// Explicitly or implicitly open a zone.
    pub(crate) fn open_zone_inner(&mut self, idx: u32, explicit: bool) {
        {
            let z = self.meta.zone(idx);
            if z.is_conv() || z.is_inactive() || z.is_offline() || z.is_rdonly() {
                return;
            }
            if z.is_exp_open() || (!explicit && z.is_imp_open()) {
                return;
            }
        }

        // Close an implicitly open zone if necessary.
        if self.meta.zone(idx).is_seq_req()
            && self.nr_imp_open + self.nr_exp_open >= self.nr_open_zones
        {
            self.close_imp_open_zone();
        }

        self.meta.unlink_zone(idx);
        self.on_cond_change(idx, ZoneCond::ExpOpen);

        let is_swr = self.meta.zone(idx).is_seq_req();
        if explicit {
            self.meta.zone_mut(idx).set_cond(ZoneCond::ExpOpen);
            if is_swr {
                self.nr_exp_open += 1;
            }
            self.meta.list_push_tail(ListId::ExpOpen, idx);

            if self.nr_exp_open > self.stats.max_exp_open_seq_zones {
                self.stats.max_exp_open_seq_zones = self.nr_exp_open;
            }
        } else {
            self.meta.zone_mut(idx).set_cond(ZoneCond::ImpOpen);
            if is_swr {
                self.nr_imp_open += 1;
                if self.nr_imp_open > self.stats.max_imp_open_seq_zones {
                    self.stats.max_imp_open_seq_zones = self.nr_imp_open;
                }
            } else if self.meta.zone(idx).is_sobr() {
                let sobr_open = self.list_count(ListId::ImpOpen, |z| z.is_sobr());
                if sobr_open > self.stats.max_imp_open_sobr_zones {
                    self.stats.max_imp_open_sobr_zones = sobr_open;
                }
            }
            self.meta.list_push_tail(ListId::ImpOpen, idx);
        }
        if self.nr_exp_open + self.nr_imp_open > self.stats.max_open_zones {
            self.stats.max_open_zones = self.nr_exp_open + self.nr_imp_open;
        }
    }

    fn list_count(&self, id: ListId, pred: impl Fn(&crate::meta::Zone) -> bool) -> u32 {
        let mut n = 0;
        let mut cur = self.meta.list_first(id);
        while let Some(idx) = cur {
            if pred(self.meta.zone(idx)) {
                n += 1;
            }
            cur = self.meta.list_next(idx);
        }
        n
    }

    /// Finish a zone. With `empty_ok`, empty zones are finished too.
    pub(crate) fn finish_zone_inner(&mut self, idx: u32, empty_ok: bool) {
        {
            let z = self.meta.zone(idx);
            if z.is_conv() || z.is_inactive() || z.is_offline() || z.is_rdonly() {
                return;
            }
            if !(z.is_closed() || z.is_open() || (empty_ok && z.is_empty())) {
                return;
            }
        }

        if self.meta.zone(idx).is_open() {
            self.close_zone_inner(idx);
        }

        self.on_cond_change(idx, ZoneCond::Full);
        self.meta.unlink_zone(idx);

        let z = self.meta.zone_mut(idx);
        z.wp = if z.is_sobr() { NO_WP } else { z.start + z.len };
        z.set_cond(ZoneCond::Full);
        z.non_seq = 0;
        z.reset = 0;
        self.meta.list_push_tail(ListId::SeqActive, idx);
    }

    /// Reset a zone write pointer, returning the zone to Empty (or NOT WP
    /// for conventional zones).
    pub(crate) fn reset_wp_inner(&mut self, idx: u32) {
        if self.meta.zone(idx).is_open() {
            self.close_zone_inner(idx);
        }

        let z = self.meta.zone(idx);
        if z.is_inactive() || z.is_offline() || z.is_rdonly() {
            self.meta.zone_mut(idx).wp = NO_WP;
        } else if z.is_conv() {
            let z = self.meta.zone_mut(idx);
            z.set_cond(ZoneCond::NotWp);
            z.wp = NO_WP;
        } else if !z.is_empty() {
            self.meta.unlink_zone(idx);
            let z = self.meta.zone_mut(idx);
            z.set_cond(ZoneCond::Empty);
            z.wp = z.start;
            self.meta.list_push_head(ListId::SeqActive, idx);
            self.nr_empty_zones += 1;
            self.stats.zones_emptied += 1;
        }

        let z = self.meta.zone_mut(idx);
        z.non_seq = 0;
        z.reset = 0;
    }

    /// Given the zone ID, locate the zone for a zone operation and run
    /// the checks common to all of them. Returns the first and last zone
    /// index of the range.
    pub(crate) fn get_check_zone(&self, lba: u64, count: u32) -> ZbcResult<(u32, u32)> {
        if self.lba_out_of_range(lba, self.zone_size) {
            return Err(ZbcError::LbaOutOfRange);
        }

        let first = self.get_zone(lba, true).ok_or(ZbcError::InvalidFieldInCdb)?;
        {
            let z = self.meta.zone(first);
            if z.is_gap() {
                return Err(ZbcError::AccessGapZone);
            }
            if z.is_conv() {
                return Err(ZbcError::InvalidFieldInCdb);
            }
        }

        let last = (first + count.saturating_sub(1)).min(self.nr_zones - 1);
        if count <= 1 {
            let z = self.meta.zone(first);
            if z.is_inactive() {
                return Err(ZbcError::ZoneIsInactive);
            }
            if z.is_offline() {
                return Err(ZbcError::ZoneIsOffline);
            }
            if z.is_rdonly() {
                return Err(ZbcError::ZoneIsReadOnly);
            }
        } else {
            if self.domain_of_zone(first) != self.domain_of_zone(last) {
                return Err(ZbcError::InvalidFieldInCdb);
            }
            for idx in first..=last {
                let z = self.meta.zone(idx);
                if z.is_gap() {
                    return Err(ZbcError::AccessGapZone);
                }
                if z.is_conv() {
                    return Err(ZbcError::InvalidFieldInCdb);
                }
            }
        }

        Ok((first, last))
    }

    /// CLOSE ZONE command semantics.
    pub fn close_zones(&mut self, lba: u64, count: u32, all: bool) -> ZbcResult {
        if all {
            if count != 0 {
                warn!("ALL bit is set in CLOSE ZONE, count is {count}");
                return Err(ZbcError::InvalidFieldInCdb);
            }
            for idx in self.meta.list_indices(ListId::ImpOpen) {
                self.close_zone_inner(idx);
            }
            for idx in self.meta.list_indices(ListId::ExpOpen) {
                self.close_zone_inner(idx);
            }
            if self.nr_imp_open != 0 || self.nr_exp_open != 0 {
                error!(
                    "{} implicit, {} explicit still open",
                    self.nr_imp_open, self.nr_exp_open
                );
            }
            return Ok(());
        }

        let count = count.max(1);
        let (first, last) = self.get_check_zone(lba, count).inspect_err(|e| {
            warn!("CLOSE ZONE {lba}, count {count}: {e}");
        })?;

        for idx in first..=last {
            if self.meta.zone(idx).is_sobr() {
                warn!("closing SOBR zone {lba}");
                return Err(ZbcError::InvalidFieldInCdb);
            }
        }

        for idx in first..=last {
            self.close_zone_inner(idx);
        }
        Ok(())
    }

    /// OPEN ZONE command semantics. OPEN ALL pre-checks the resource
    /// budget over every closed SWR zone and fails atomically.
    pub fn open_zones(&mut self, lba: u64, count: u32, all: bool) -> ZbcResult {
        if all {
            if count != 0 {
                warn!("ALL bit is set in OPEN ZONE, count is {count}");
                return Err(ZbcError::InvalidFieldInCdb);
            }

            let mut nr_closed = 0;
            let mut cur = self.meta.list_first(ListId::Closed);
            while let Some(idx) = cur {
                if self.meta.zone(idx).is_seq_req() {
                    nr_closed += 1;
                }
                cur = self.meta.list_next(idx);
            }

            if !self.ozr_check(nr_closed) {
                self.stats.failed_exp_opens += 1;
                return Err(ZbcError::InsufficientZoneResources);
            }

            // Open every zone closed at the time the loop commences.
            for idx in self.meta.list_indices(ListId::Closed) {
                self.open_zone_inner(idx, true);
            }
            return Ok(());
        }

        let count = count.max(1);
        let (first, last) = match self.get_check_zone(lba, count) {
            Ok(r) => r,
            Err(e) => {
                self.stats.failed_exp_opens += 1;
                warn!("OPEN ZONE {lba}, count {count}: {e}");
                return Err(e);
            }
        };

        // Check if errors will be encountered anywhere in the range.
        let mut nr_open = 0;
        for idx in first..=last {
            let z = self.meta.zone(idx);
            if z.is_sobr() {
                warn!("opening SOBR zone {lba}");
                return Err(ZbcError::InvalidFieldInCdb);
            }
            if z.is_exp_open() || z.is_full() {
                continue;
            }
            if z.is_seq_req() {
                nr_open += 1;
                if !self.ozr_check(nr_open) {
                    self.stats.failed_exp_opens += 1;
                    return Err(ZbcError::InsufficientZoneResources);
                }
            }
        }

        for idx in first..=last {
            let z = self.meta.zone(idx);
            if z.is_exp_open() || z.is_full() {
                continue;
            }
            if z.is_imp_open() {
                self.close_zone_inner(idx);
            }
            self.open_zone_inner(idx, true);
        }
        Ok(())
    }

    /// FINISH ZONE command semantics.
    pub fn finish_zones(&mut self, lba: u64, count: u32, all: bool) -> ZbcResult {
        if all {
            if count != 0 {
                warn!("ALL bit is set in FINISH ZONE, count is {count}");
                return Err(ZbcError::InvalidFieldInCdb);
            }
            for id in [ListId::ImpOpen, ListId::ExpOpen, ListId::Closed] {
                for idx in self.meta.list_indices(id) {
                    self.finish_zone_inner(idx, false);
                }
            }
            return Ok(());
        }

        let count = count.max(1);
        let (first, last) = self.get_check_zone(lba, count).inspect_err(|e| {
            warn!("FINISH ZONE {lba}, count {count}: {e}");
        })?;

        for idx in first..=last {
            let z = self.meta.zone(idx);
            if z.is_inactive() {
                return Err(ZbcError::ZoneIsInactive);
            }
            if z.is_offline() {
                return Err(ZbcError::ZoneIsOffline);
            }
            if z.is_rdonly() {
                return Err(ZbcError::ZoneIsReadOnly);
            }
            if z.is_seq_req() && (z.is_closed() || z.is_empty()) && !self.ozr_check(1) {
                return Err(ZbcError::InsufficientZoneResources);
            }
        }

        for idx in first..=last {
            self.finish_zone_inner(idx, true);
        }
        Ok(())
    }

    /// RESET WRITE POINTER command semantics.
    pub fn reset_zones(&mut self, lba: u64, count: u32, all: bool) -> ZbcResult {
        if all {
            if count != 0 {
                warn!("ALL bit is set in RESET WP, count is {count}");
                return Err(ZbcError::InvalidFieldInCdb);
            }
            for id in [
                ListId::SeqActive,
                ListId::ImpOpen,
                ListId::ExpOpen,
                ListId::Closed,
            ] {
                for idx in self.meta.list_indices(id) {
                    self.reset_wp_inner(idx);
                }
            }
            if self.nr_imp_open != 0 || self.nr_exp_open != 0 {
                error!(
                    "{} implicit, {} explicit still open",
                    self.nr_imp_open, self.nr_exp_open
                );
            }
            return Ok(());
        }

        let count = count.max(1);
        let (first, last) = self.get_check_zone(lba, count).inspect_err(|e| {
            warn!("RESET WP, LBA {lba}, count {count}: {e}");
        })?;

        for idx in first..=last {
            self.reset_wp_inner(idx);
        }
        Ok(())
    }

    /// SEQUENTIALIZE ZONE command semantics: clears the non-sequential
    /// write resources attribute of SWP zones.
    pub fn sequentialize_zones(&mut self, lba: u64, count: u32, all: bool) -> ZbcResult {
        if all {
            if count != 0 {
                warn!("ALL bit is set in SEQUENTIALIZE ZONE, count is {count}");
                return Err(ZbcError::InvalidFieldInCdb);
            }
            for idx in self.meta.list_indices(ListId::Closed) {
                self.meta.zone_mut(idx).non_seq = 0;
            }
            return Ok(());
        }

        let count = count.max(1);
        let (first, last) = self.get_check_zone(lba, count).inspect_err(|e| {
            warn!("SEQUENTIALIZE ZONE {lba}, count {count}: {e}");
        })?;

        for idx in first..=last {
            if !self.meta.zone(idx).is_seq_pref() {
                return Err(ZbcError::InvalidFieldInCdb);
            }
        }

        for idx in first..=last {
            if !self.meta.zone(idx).is_empty() {
                self.meta.zone_mut(idx).non_seq = 0;
            }
        }
        Ok(())
    }

    /// Advance the write pointer after a successful write of `count` LBAs
    /// at `lba`, transitioning the zone to Full at the boundary.
    pub(crate) fn adjust_write_ptr(&mut self, idx: u32, lba: u64, count: u64) {
        {
            let z = self.meta.zone_mut(idx);
            if z.is_seq_req() {
                z.wp += count;
            } else if z.is_seq_pref() || z.is_sobr() {
                if lba + count > z.wp {
                    z.wp = lba + count;
                }
            }
        }

        let at_end = {
            let z = self.meta.zone(idx);
            z.wp >= z.start + z.len
        };
        if !at_end {
            return;
        }

        if self.meta.zone(idx).is_open() {
            self.close_zone_inner(idx);
        }
        if self.meta.zone(idx).is_conv() {
            let z = self.meta.zone_mut(idx);
            z.set_cond(ZoneCond::NotWp);
            z.wp = NO_WP;
        } else {
            self.meta.unlink_zone(idx);
            self.on_cond_change(idx, ZoneCond::Full);
            let z = self.meta.zone_mut(idx);
            z.set_cond(ZoneCond::Full);
            z.wp = if z.is_seq() { z.start + z.len } else { NO_WP };
            self.meta.list_push_tail(ListId::SeqActive, idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevConfig;

    fn zd_dev() -> Device<MemBlockIO> {
        let mut cfg = DevConfig::parse(
            "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25/open-4@mem",
        )
        .unwrap();
        cfg.phys_capacity = 8 * 1024 * 1024;
        Device::open(MemBlockIO::new(), cfg).unwrap()
    }

    fn seq_zone(dev: &Device<MemBlockIO>, nth: u32) -> (u32, u64) {
        let d = *dev.domain(dev.domain_id_of_type(crate::types::ZoneType::SeqWriteReq).unwrap());
        let idx = dev.get_zone(d.start_lba, false).unwrap() + nth;
        (idx, dev.zone_at(idx).start)
    }

    #[test]
    fn test_open_close_roundtrip() {
        let mut dev = zd_dev();
        let (idx, lba) = seq_zone(&dev, 0);

        dev.open_zones(lba, 0, false).unwrap();
        assert!(dev.zone_at(idx).is_exp_open());
        assert_eq!(dev.nr_exp_open, 1);

        // Close with wp at start returns the zone to Empty.
        dev.close_zones(lba, 0, false).unwrap();
        assert!(dev.zone_at(idx).is_empty());
        assert_eq!(dev.nr_exp_open, 0);
    }

    #[test]
    fn test_finish_and_reset() {
        let mut dev = zd_dev();
        let (idx, lba) = seq_zone(&dev, 1);

        dev.finish_zones(lba, 0, false).unwrap();
        let z = *dev.zone_at(idx);
        assert!(z.is_full());
        assert_eq!(z.wp, z.start + z.len);

        dev.reset_zones(lba, 0, false).unwrap();
        let z = *dev.zone_at(idx);
        assert!(z.is_empty());
        assert_eq!(z.wp, z.start);
    }

    #[test]
    fn test_open_all_resource_cap_is_atomic() {
        let mut dev = zd_dev();
        assert_eq!(dev.nr_open_zones(), 4);

        // Explicitly open 3 zones.
        for i in 0..3 {
            let (_, lba) = seq_zone(&dev, i);
            dev.open_zones(lba, 0, false).unwrap();
        }

        // Put 6 more into Closed by opening and closing at wp > start.
        for i in 3..9 {
            let (idx, lba) = seq_zone(&dev, i);
            dev.open_zones(lba, 0, false).unwrap();
            dev.adjust_write_ptr(idx, lba, 1);
            dev.close_zones(lba, 0, false).unwrap();
            assert!(dev.zone_at(idx).is_closed());
        }
        assert_eq!(dev.nr_exp_open, 3);

        let failed_before = dev.stats().failed_exp_opens;
        let err = dev.open_zones(0, 0, true).unwrap_err();
        assert_eq!(err, ZbcError::InsufficientZoneResources);
        assert_eq!(dev.stats().failed_exp_opens, failed_before + 1);
        // No zone transitioned.
        for i in 3..9 {
            let (idx, _) = seq_zone(&dev, i);
            assert!(dev.zone_at(idx).is_closed());
        }
    }

    #[test]
    fn test_implicit_open_eviction() {
        let mut dev = zd_dev();

        // Implicitly open up to the cap, then one more: the head of the
        // implicit-open list gets evicted.
        let mut idxs = Vec::new();
        for i in 0..5 {
            let (idx, lba) = seq_zone(&dev, i);
            dev.open_zone_inner(idx, false);
            dev.adjust_write_ptr(idx, lba, 1);
            idxs.push(idx);
        }
        assert!(dev.nr_imp_open <= 4);
        assert!(dev.zone_at(idxs[0]).is_closed());
        assert!(dev.zone_at(idxs[4]).is_imp_open());
        assert!(dev.nr_imp_open + dev.nr_exp_open <= dev.nr_open_zones());
    }

    #[test]
    fn test_range_op_applies_in_order() {
        let mut dev = zd_dev();
        let (idx, lba) = seq_zone(&dev, 0);

        dev.finish_zones(lba, 3, false).unwrap();
        for i in 0..3 {
            assert!(dev.zone_at(idx + i).is_full());
        }
        assert!(dev.zone_at(idx + 3).is_empty());
    }

    #[test]
    fn test_zone_op_rejects_conv_and_gap() {
        let mut dev = zd_dev();
        // Conventional domain zone.
        let d0 = *dev.domain(0);
        let err = dev.open_zones(d0.start_lba, 0, false).unwrap_err();
        assert_eq!(err, ZbcError::InvalidFieldInCdb);
        // Gap zone between the domains.
        let err = dev.open_zones(d0.end_lba + 1, 0, false).unwrap_err();
        assert_eq!(err, ZbcError::AccessGapZone);
        // Unaligned zone ID.
        let (_, lba) = seq_zone(&dev, 0);
        let err = dev.open_zones(lba + 1, 0, false).unwrap_err();
        assert_eq!(err, ZbcError::InvalidFieldInCdb);
    }

    #[test]
    fn test_sequentialize_requires_swp() {
        let mut dev = zd_dev();
        let (_, lba) = seq_zone(&dev, 0);
        let err = dev.sequentialize_zones(lba, 0, false).unwrap_err();
        assert_eq!(err, ZbcError::InvalidFieldInCdb);
    }

    #[test]
    fn test_wp_advance_to_full() {
        let mut dev = zd_dev();
        let (idx, lba) = seq_zone(&dev, 2);
        let len = dev.zone_at(idx).len;

        dev.open_zone_inner(idx, false);
        dev.adjust_write_ptr(idx, lba, len);
        let z = *dev.zone_at(idx);
        assert!(z.is_full());
        assert_eq!(z.wp, z.start + z.len);
        assert_eq!(dev.nr_imp_open, 0);
    }
}
