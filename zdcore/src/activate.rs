// SPDX-License-Identifier: MIT

//! Realm activation engine: ZONE ACTIVATE and ZONE QUERY semantics.
//!
//! The whole range is validated realm by realm; the first realm that
//! fails a prerequisite stops the command without touching state, and the
//! failure is reported through error bits in the result header rather
//! than sense data.

use log::warn;

use zdio::prelude::*;

use crate::device::Device;
use crate::errors::{ZbcError, ZbcResult};
use crate::types::{ZoneCond, ZoneType};

/// Activation result header size on the wire.
pub const ACTV_RES_HEADER_SIZE: usize = 64;
/// Activation result descriptor size on the wire.
pub const ACTV_RES_DESCRIPTOR_SIZE: usize = 24;

/// Unmet prerequisite bits of the activation result header.
pub const ACTV_ERR_NOT_INACTIVE: u8 = 0x01;
pub const ACTV_ERR_NOT_EMPTY: u8 = 0x02;
pub const ACTV_ERR_REALM_ALIGN: u8 = 0x04;
pub const ACTV_ERR_MULTI_TYPES: u8 = 0x08;
pub const ACTV_ERR_UNSUPP: u8 = 0x10;
pub const ACTV_ERR_MULTI_DOMAINS: u8 = 0x20;

/// Activation result status bits.
pub const ACTV_STAT_NZP_VALID: u8 = 0x80;
pub const ACTV_STAT_ZIWUP_VALID: u8 = 0x40;
pub const ACTV_STAT_ACTIVATED: u8 = 0x01;

/// One activation result descriptor: a deactivated or activated zone
/// range of a single realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActvDesc {
    pub ztype: u8,
    pub cond: u8,
    pub domain_id: u8,
    pub nr_zones: u64,
    pub start_lba: u64,
}

/// Outcome of a ZONE ACTIVATE / ZONE QUERY operation.
#[derive(Debug, Default)]
pub struct ActvResults {
    /// Result descriptors in ascending start-LBA order per realm.
    pub descs: Vec<ActvDesc>,
    /// Unmet prerequisite bits.
    pub error: u8,
    /// Zone ID with unmet prerequisites.
    pub ziwup: Option<u64>,
    /// True when every realm in the range passed its prerequisites.
    pub ok: bool,
    /// The number-of-zones value when NZP is valid (ALL clear).
    pub nzp: Option<u32>,
    pub all: bool,
    pub nozsrc: bool,
    pub domain_id: u8,
}

impl<IO: BlockIO + BlockIOSetLen> Device<IO> {
    #[inline]
    fn cmr_to_smr_zones(&self, cmr_zones: u32) -> Option<u32> {
        if cmr_zones == 0 {
            return None;
        }
        self.cmr_to_smr.get(cmr_zones as usize - 1).copied()
    }

    #[inline]
    fn smr_to_cmr_zones(&self, smr_zones: u32) -> Option<u32> {
        if smr_zones == 0 {
            return None;
        }
        self.smr_to_cmr.get(smr_zones as usize - 1).copied()
    }

    /// Number of zones that deactivation of a realm covers: a range given
    /// in target-type zone units is rescaled to the units of the current
    /// type when the two sit in different (CMR/SMR) domain families.
    fn deactv_realm_zones(
        &self,
        realm_idx: u32,
        offset: u32,
        length: u32,
        new_type: ZoneType,
    ) -> Option<u32> {
        let r = self.meta.realm(realm_idx);
        let cur_type = r.realm_type()?;
        let mut length = length;

        if cur_type != new_type {
            let old_dom = self.domain_id_of_type(cur_type)?;
            let new_dom = self.domain_id_of_type(new_type)?;
            let old_smr = self.domain(old_dom).is_smr();
            let new_smr = self.domain(new_dom).is_smr();
            if old_smr && !new_smr {
                length = self.cmr_to_smr_zones(length)?;
            } else if !old_smr && new_smr {
                length = self.smr_to_cmr_zones(length)?;
            }
        }

        Some((self.meta.realm(realm_idx).length(cur_type) - offset).min(length))
    }

    /// Check if the specified realm can be activated to the new type.
    /// On failure sets the error bits and the ZIWUP in the results.
    fn chk_can_actv_realm(
        &self,
        realm_idx: u32,
        offset: u32,
        length: u32,
        new_type: ZoneType,
        all: bool,
        res: &mut ActvResults,
    ) -> bool {
        let r = self.meta.realm(realm_idx);
        let Some(cur_type) = r.realm_type() else {
            res.error |= ACTV_ERR_UNSUPP;
            return false;
        };

        let mut err = 0u8;
        let mut ziwup = None;

        if !all && !r.can_actv_as(new_type) {
            warn!(
                "activate realm {} to type {:#x} disallowed",
                realm_idx, new_type as u8
            );
            err = ACTV_ERR_UNSUPP;
            ziwup = Some(r.start(cur_type));
        } else if (cur_type == ZoneType::Conventional && new_type == ZoneType::SeqOrBefReq)
            || (cur_type == ZoneType::SeqOrBefReq && new_type == ZoneType::Conventional)
            || (cur_type == ZoneType::SeqWritePref && new_type == ZoneType::SeqWriteReq)
            || (cur_type == ZoneType::SeqWriteReq && new_type == ZoneType::SeqWritePref)
        {
            // Direct swaps within a family are not allowed; the host has
            // to route through an intermediate type.
            warn!(
                "can't activate realm {} (type {:#x}) to type {:#x}",
                realm_idx, cur_type as u8, new_type as u8
            );
            err = ACTV_ERR_UNSUPP;
            ziwup = Some(r.start(cur_type));
        }

        if err == 0 {
            // The deactivated range must have no zones with an active WP.
            let start_zone = r.start_zone(cur_type) + offset;
            let nr_zones = self
                .deactv_realm_zones(realm_idx, offset, length, new_type)
                .unwrap_or(0);

            if all {
                let mut have_zt = false;
                let mut stopped = None;
                for idx in start_zone..start_zone + nr_zones {
                    let z = self.meta.zone(idx);
                    if z.is_closed() || z.is_open() || z.is_full() {
                        stopped = Some(idx);
                        break;
                    }
                    if z.is_empty() || z.is_inactive() {
                        have_zt = true;
                    }
                }
                if let Some(idx) = stopped {
                    warn!("realm {} not empty, zone {}", realm_idx, self.meta.zone(idx).start);
                    err = ACTV_ERR_NOT_EMPTY;
                    ziwup = Some(self.meta.zone(idx).start);
                } else if !have_zt {
                    warn!("no empty zones in realm {realm_idx}");
                    err = ACTV_ERR_NOT_EMPTY;
                }
            } else {
                for idx in start_zone..start_zone + nr_zones {
                    let z = self.meta.zone(idx);
                    if !z.is_conv() && !z.is_empty() && !z.is_inactive() {
                        warn!("zone {} of realm {} not empty", z.start, realm_idx);
                        err = ACTV_ERR_NOT_EMPTY;
                        ziwup = Some(z.start);
                        break;
                    }
                }
            }
        }

        if err == 0 && r.can_actv_as(new_type) {
            // The activated range must have no active zones.
            let start_zone = r.start_zone(new_type) + offset;
            let nr_zones = (r.length(new_type) - offset).min(length);

            if all {
                let mut have_zt = false;
                let mut stopped = None;
                for idx in start_zone..start_zone + nr_zones {
                    let z = self.meta.zone(idx);
                    if z.is_imp_open() || z.is_full() {
                        stopped = Some(idx);
                        break;
                    }
                    if z.is_inactive() || z.is_empty() {
                        have_zt = true;
                    }
                }
                if let Some(idx) = stopped {
                    warn!("realm {} active, zone {}", realm_idx, self.meta.zone(idx).start);
                    err = ACTV_ERR_NOT_INACTIVE;
                    ziwup = Some(self.meta.zone(idx).start);
                } else if !have_zt {
                    warn!("no inactive zones in realm {realm_idx}");
                    err = ACTV_ERR_NOT_INACTIVE;
                }
            } else {
                for idx in start_zone..start_zone + nr_zones {
                    let z = self.meta.zone(idx);
                    if !z.is_conv()
                        && !z.is_empty()
                        && !z.is_rdonly()
                        && !z.is_offline()
                        && !z.is_inactive()
                    {
                        warn!("zone {} of realm {} is active", z.start, realm_idx);
                        err = ACTV_ERR_NOT_INACTIVE;
                        ziwup = Some(z.start);
                        break;
                    }
                }
            }
        }

        if err != 0 {
            res.error |= err;
            res.ziwup = ziwup.or(res.ziwup);
            return false;
        }
        true
    }

    /// Put the current zones of the realm into Inactive condition and
    /// produce the deactivation descriptor.
    fn deactivate_realm_zones(&mut self, realm_idx: u32, new_type: ZoneType, dry_run: bool) -> ActvDesc {
        let (cur_type, start_zone, nr_zones) = {
            let r = self.meta.realm(realm_idx);
            let cur = r.realm_type().expect("valid realm type");
            (cur, r.start_zone(cur), r.length(cur))
        };

        let (dry_run, cond) = if new_type == cur_type {
            (true, ZoneCond::from_raw(self.meta.zone(start_zone).cond).unwrap_or(ZoneCond::NotWp))
        } else {
            (dry_run, ZoneCond::Inactive)
        };

        let desc = ActvDesc {
            ztype: self.meta.zone(start_zone).ztype,
            cond: cond as u8,
            domain_id: self.domain_of_zone(start_zone).unwrap_or(0) as u8,
            nr_zones: nr_zones as u64,
            start_lba: self.meta.zone(start_zone).start,
        };

        if !dry_run {
            for idx in start_zone..start_zone + nr_zones {
                let z = self.meta.zone(idx);
                if z.is_rdonly() || z.is_offline() {
                    continue;
                }
                self.meta.unlink_zone(idx);
                self.on_cond_change(idx, cond);
                self.meta.zone_mut(idx).set_cond(cond);
                self.set_initial_wp(idx);
            }
        }

        desc
    }

    /// Activate the zones of the realm's new type and produce the
    /// activation descriptor.
    fn activate_realm_zones(&mut self, realm_idx: u32, new_type: ZoneType, dry_run: bool) -> ActvDesc {
        let (cur_type, start_zone, nr_zones) = {
            let r = self.meta.realm(realm_idx);
            let cur = r.realm_type().expect("valid realm type");
            (cur, r.start_zone(new_type), r.length(new_type))
        };

        let (dry_run, cond) = if new_type == cur_type {
            (true, ZoneCond::from_raw(self.meta.zone(start_zone).cond).unwrap_or(ZoneCond::NotWp))
        } else if new_type == ZoneType::Conventional {
            (dry_run, ZoneCond::NotWp)
        } else {
            (dry_run, ZoneCond::Empty)
        };

        let desc = ActvDesc {
            ztype: self.meta.zone(start_zone).ztype,
            cond: cond as u8,
            domain_id: self.domain_of_zone(start_zone).unwrap_or(0) as u8,
            nr_zones: nr_zones as u64,
            start_lba: self.meta.zone(start_zone).start,
        };

        if !dry_run {
            for idx in start_zone..start_zone + nr_zones {
                let z = self.meta.zone(idx);
                if z.is_rdonly() || z.is_offline() {
                    continue;
                }
                self.meta.unlink_zone(idx);
                if cond == ZoneCond::Empty && !self.meta.zone(idx).is_empty() {
                    self.nr_empty_zones += 1;
                }
                self.meta.zone_mut(idx).set_cond(cond);
                self.set_initial_wp(idx);
            }
        }

        desc
    }

    /// Activate one realm to a new type. Returns false if a prerequisite
    /// failed (the error bits are already recorded in the results).
    fn activate_realm(
        &mut self,
        realm_idx: u32,
        offset: u32,
        length: u32,
        new_type: ZoneType,
        dry_run: bool,
        all: bool,
        res: &mut ActvResults,
    ) -> bool {
        if !self.chk_can_actv_realm(realm_idx, offset, length, new_type, all, res) {
            return false;
        }

        if !self.meta.realm(realm_idx).can_actv_as(new_type) {
            // Only reachable under ALL: skip this realm silently.
            return true;
        }

        let r = self.meta.realm(realm_idx);
        let cur_type = r.realm_type().expect("valid realm type");
        let rs_old = r.start(cur_type);
        let rs_new = r.start(new_type);

        let deact = self.deactivate_realm_zones(realm_idx, new_type, dry_run);
        let act = self.activate_realm_zones(realm_idx, new_type, dry_run);

        if rs_old == rs_new {
            // Same-type no-op: a single descriptor for the range.
            res.descs.push(act);
        } else if rs_old < rs_new {
            res.descs.push(deact);
            res.descs.push(act);
        } else {
            res.descs.push(act);
            res.descs.push(deact);
        }

        if !dry_run {
            self.meta.realm_mut(realm_idx).rtype = new_type as u8;
        }

        true
    }

    /// ZONE ACTIVATE / ZONE QUERY over an LBA range.
    ///
    /// Early CDB-level failures surface as sense errors; prerequisite
    /// failures surface as error bits in the returned results with SCSI
    /// status GOOD.
    pub fn zone_activate(
        &mut self,
        start_lba: u64,
        nr_zones: u32,
        domain_id: u32,
        alloc_len: usize,
        all: bool,
        nozsrc: bool,
        dry_run: bool,
    ) -> ZbcResult<ActvResults> {
        if domain_id >= self.nr_domains {
            warn!("device doesn't support domain ID {domain_id}");
            return Err(ZbcError::InvalidFieldInCdb);
        }
        let d = *self.domain(domain_id);

        // With ALL, the incoming range is ignored and the whole domain
        // addressed by the domain ID is activated.
        let (start_lba, nr_zones) = if all {
            (d.start_lba, d.nr_zones)
        } else {
            (start_lba, nr_zones)
        };

        if nr_zones == 0 {
            warn!("no zones to activate");
            return Err(ZbcError::InvalidFieldInCdb);
        }
        if nr_zones > self.nr_zones {
            warn!("{} zones to activate exceeds {} zone total", nr_zones, self.nr_zones);
            return Err(ZbcError::InvalidFieldInCdb);
        }
        if alloc_len < ACTV_RES_HEADER_SIZE {
            warn!("allocated length {alloc_len} is too small");
            return Err(ZbcError::InvalidFieldInCdb);
        }

        let zone_idx = self
            .get_zone(start_lba, true)
            .ok_or(ZbcError::InvalidFieldInCdb)?;
        if zone_idx > self.nr_zones - nr_zones {
            warn!("activation {start_lba}+{nr_zones} out of LBA range");
            return Err(ZbcError::InvalidFieldInCdb);
        }
        let Some(start_dom) = self.domain_of_zone(zone_idx) else {
            return Err(ZbcError::InvalidFieldInCdb);
        };

        // All further errors are reported by setting status bits in the
        // activation results header.
        let mut res = ActvResults {
            all,
            nozsrc,
            domain_id: domain_id as u8,
            nzp: if all { None } else { Some(nr_zones) },
            ..ActvResults::default()
        };

        let lowest = self.realms_feat_set && !all;
        let Some((start_realm, addr_zt)) = self.get_zone_realm(start_lba, lowest) else {
            warn!("invalid zone activation LBA {start_lba}");
            res.error |= ACTV_ERR_REALM_ALIGN;
            res.ziwup = Some(start_lba);
            return Ok(res);
        };

        // The zone type to activate: the target domain's type, unless a
        // single inactive range names its own domain type.
        let new_type = if all || !self.meta.zone(zone_idx).is_inactive() {
            d.zone_type().ok_or(ZbcError::InvalidFieldInCdb)?
        } else {
            addr_zt
        };

        // The range must not cross into another zone domain.
        let end_zone = zone_idx + nr_zones - 1;
        if self.domain_of_zone(end_zone) != Some(start_dom) {
            warn!("activation range {start_lba}+{nr_zones} crosses domains");
            res.error |= ACTV_ERR_MULTI_DOMAINS;
            res.ziwup = Some(start_lba);
            return Ok(res);
        }

        // Zone offset of the start LBA within its realm. Non-zero only
        // without the Realms feature set, where sub-realm ranges are
        // addressable.
        let mut ofs: u32 = if !self.realms_feat_set {
            let rstart = self
                .meta
                .realm(start_realm)
                .start(self.meta.zone(zone_idx).zone_type().unwrap_or(addr_zt));
            ((self.meta.zone(zone_idx).start - rstart) >> self.zone_log2) as u32
        } else {
            0
        };

        // Find the ending realm and verify realm alignment of the range.
        let addr_dom = self
            .domain_id_of_type(addr_zt)
            .ok_or(ZbcError::InvalidFieldInCdb)?;
        let sz = if self.domain(addr_dom).is_smr() {
            self.nr_smr_realm_zones
        } else {
            self.nr_cmr_realm_zones
        };
        let mut end = start_realm;
        let mut nz = nr_zones as i64;
        if ofs != 0 {
            nz -= (sz - ofs) as i64;
            end += 1;
        }
        while end < self.nr_realms && nz > 0 {
            nz -= sz as i64;
            end += 1;
        }
        if self.realms_feat_set && nz != 0 {
            warn!("activation range {start_lba}+{nr_zones} is off by {} zones", -nz);
            res.error |= ACTV_ERR_REALM_ALIGN;
            res.ziwup = Some(start_lba);
            return Ok(res);
        }

        // Activate or query every realm, collecting the descriptors.
        res.ok = true;
        let mut nz = nr_zones as i64;
        for i in start_realm..end {
            let length = (nz.min(sz as i64)).max(0) as u32;
            if !self.activate_realm(i, ofs, length, new_type, dry_run, all, &mut res) {
                res.ok = false;
                break;
            }
            nz -= (sz - ofs) as i64;
            ofs = 0;
        }

        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevConfig;
    use crate::meta::NO_WP;

    fn zd_dev() -> Device<MemBlockIO> {
        let mut cfg = DevConfig::parse(
            "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25@mem",
        )
        .unwrap();
        cfg.phys_capacity = 8 * 1024 * 1024;
        Device::open(MemBlockIO::new(), cfg).unwrap()
    }

    fn realm_lba(dev: &Device<MemBlockIO>, realm: u32, zt: ZoneType) -> u64 {
        dev.realm_at(realm).start(zt)
    }

    #[test]
    fn test_activate_conv_realm() {
        let mut dev = zd_dev();
        let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();
        let lba = realm_lba(&dev, 3, ZoneType::Conventional);
        let nr = dev.realm_at(3).length(ZoneType::Conventional);

        let res = dev
            .zone_activate(lba, nr, conv_dom, 4096, false, true, false)
            .unwrap();
        assert!(res.ok, "error bits {:#x}", res.error);
        assert_eq!(res.descs.len(), 2);

        // Realm 3 is now conventional; its SWR zones are inactive.
        let r = dev.realm_at(3);
        assert_eq!(r.realm_type(), Some(ZoneType::Conventional));
        let conv_idx = r.start_zone(ZoneType::Conventional);
        assert!(dev.zone_at(conv_idx).is_conv());
        assert!(dev.zone_at(conv_idx).is_not_wp());
        let swr_idx = r.start_zone(ZoneType::SeqWriteReq);
        assert!(dev.zone_at(swr_idx).is_inactive());
        assert_eq!(dev.zone_at(swr_idx).wp, NO_WP);

        // Descriptors come lower start LBA first.
        assert!(res.descs[0].start_lba < res.descs[1].start_lba);
    }

    #[test]
    fn test_query_is_dry_run() {
        let mut dev = zd_dev();
        let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();
        let lba = realm_lba(&dev, 3, ZoneType::Conventional);
        let nr = dev.realm_at(3).length(ZoneType::Conventional);

        let res = dev
            .zone_activate(lba, nr, conv_dom, 4096, false, true, true)
            .unwrap();
        assert!(res.ok);
        assert_eq!(res.descs.len(), 2);
        // Nothing moved.
        assert_eq!(dev.realm_at(3).realm_type(), Some(ZoneType::SeqWriteReq));
    }

    #[test]
    fn test_activate_not_inactive_error_bit() {
        let mut dev = zd_dev();
        // Open a zone in the range to be deactivated.
        let swr_lba = realm_lba(&dev, 2, ZoneType::SeqWriteReq);
        dev.open_zones(swr_lba, 0, false).unwrap();

        let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();
        let lba = realm_lba(&dev, 2, ZoneType::Conventional);
        let nr = dev.realm_at(2).length(ZoneType::Conventional);

        let res = dev
            .zone_activate(lba, nr, conv_dom, 4096, false, true, false)
            .unwrap();
        assert!(!res.ok);
        assert_ne!(res.error & ACTV_ERR_NOT_EMPTY, 0);
        assert_eq!(res.ziwup, Some(swr_lba));
        // The realm keeps its type.
        assert_eq!(dev.realm_at(2).realm_type(), Some(ZoneType::SeqWriteReq));
    }

    #[test]
    fn test_activate_rejects_unaligned_realm_lba() {
        let mut dev = zd_dev();
        let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();
        let lba = realm_lba(&dev, 3, ZoneType::Conventional) + dev.zone_size();

        let res = dev
            .zone_activate(lba, 3, conv_dom, 4096, false, true, false)
            .unwrap();
        assert!(!res.ok);
        assert_ne!(res.error & ACTV_ERR_REALM_ALIGN, 0);
        assert_eq!(res.ziwup, Some(lba));
    }

    #[test]
    fn test_activate_range_crossing_domain_rejected() {
        let mut dev = zd_dev();
        let swr_dom = dev.domain_id_of_type(ZoneType::SeqWriteReq).unwrap();
        // Start at the last SWR realm and run past the domain end.
        let last = dev.nr_realms() - 1;
        let lba = realm_lba(&dev, last, ZoneType::SeqWriteReq);
        let nr = dev.realm_at(last).length(ZoneType::SeqWriteReq) + 1;

        let err = dev
            .zone_activate(lba, nr, swr_dom, 4096, false, true, false)
            .unwrap_err();
        // Running past the end of the zone range is a CDB-level error.
        assert_eq!(err, ZbcError::InvalidFieldInCdb);
    }

    #[test]
    fn test_activate_all_domain() {
        let mut dev = zd_dev();
        let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();

        let res = dev
            .zone_activate(0, 0, conv_dom, 1 << 20, true, false, false)
            .unwrap();
        assert!(res.ok, "error bits {:#x}", res.error);
        // Every realm is now conventional.
        for i in 0..dev.nr_realms() {
            assert_eq!(dev.realm_at(i).realm_type(), Some(ZoneType::Conventional));
        }
        // Going back with ALL fails: the deactivation side now holds
        // conventional NOT WP zones, and ALL only tolerates Empty or
        // Inactive ones.
        let swr_dom = dev.domain_id_of_type(ZoneType::SeqWriteReq).unwrap();
        let res = dev
            .zone_activate(0, 0, swr_dom, 1 << 20, true, false, false)
            .unwrap();
        assert!(!res.ok);
        assert_ne!(res.error & ACTV_ERR_NOT_EMPTY, 0);
    }

    #[test]
    fn test_activate_range_crossing_into_gap_sets_multi_domains() {
        let mut dev = zd_dev();
        let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();
        // Start at the last conventional realm and run into the inter-
        // domain gap.
        let last = dev.nr_realms() - 1;
        let lba = realm_lba(&dev, last, ZoneType::Conventional);
        let nr = dev.realm_at(last).length(ZoneType::Conventional) + 1;

        let res = dev
            .zone_activate(lba, nr, conv_dom, 4096, false, true, false)
            .unwrap();
        assert!(!res.ok);
        assert_ne!(res.error & ACTV_ERR_MULTI_DOMAINS, 0);
        assert_eq!(res.ziwup, Some(lba));
    }

    #[test]
    fn test_activate_same_type_emits_single_descriptor() {
        let mut dev = zd_dev();
        let swr_dom = dev.domain_id_of_type(ZoneType::SeqWriteReq).unwrap();
        let lba = realm_lba(&dev, 1, ZoneType::SeqWriteReq);
        let nr = dev.realm_at(1).length(ZoneType::SeqWriteReq);

        let res = dev
            .zone_activate(lba, nr, swr_dom, 4096, false, true, false)
            .unwrap();
        assert!(res.ok);
        assert_eq!(res.descs.len(), 1);
        assert_eq!(dev.realm_at(1).realm_type(), Some(ZoneType::SeqWriteReq));
    }

    #[test]
    fn test_swr_to_swp_direct_swap_unsupported() {
        let mut cfg = DevConfig::parse(
            "dhsmr/type-ZD_1CMR_BOT/zsize-64K/rsize-256K/sgain-1.25@mem",
        )
        .unwrap();
        cfg.phys_capacity = 8 * 1024 * 1024;
        let mut dev = Device::open(MemBlockIO::new(), cfg).unwrap();

        let swp_dom = dev.domain_id_of_type(ZoneType::SeqWritePref).unwrap();
        // Realm 1 is SWR-active; activating it to SWP directly must fail.
        let lba = realm_lba(&dev, 1, ZoneType::SeqWritePref);
        let nr = dev.realm_at(1).length(ZoneType::SeqWritePref);

        let res = dev
            .zone_activate(lba, nr, swp_dom, 4096, false, true, false)
            .unwrap();
        assert!(!res.ok);
        assert_ne!(res.error & ACTV_ERR_UNSUPP, 0);
    }

    #[test]
    fn test_bad_domain_id_is_cdb_error() {
        let mut dev = zd_dev();
        let err = dev
            .zone_activate(0, 4, 7, 4096, false, true, false)
            .unwrap_err();
        assert_eq!(err, ZbcError::InvalidFieldInCdb);
    }
}
