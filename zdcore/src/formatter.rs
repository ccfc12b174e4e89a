// SPDX-License-Identifier: MIT

//! Metadata formatter.
//!
//! Lays out domains, realms, zones, zone lists and faulty-zone injections
//! for a device personality, then writes the whole metadata region and
//! truncates the backing store to its final size.

use log::{debug, warn};

use zdio::prelude::*;

use crate::device::{log2, zd_capacity_over_domains, Device};
use crate::errors::{FormatError, FormatResult};
use crate::meta::{self, ListId, ZoneListHead, DFLG_SMR, NO_WP};
use crate::profile::DevProfile;
use crate::types::*;
use crate::ensure;

impl<IO: BlockIO + BlockIOSetLen> Device<IO> {
    /// Format metadata for the current personality. With `mutating`, the
    /// conventional zone count is derived from the model rather than the
    /// configuration string.
    pub(crate) fn format_meta(&mut self, mutating: bool) -> FormatResult {
        let profile = DevProfile::find(self.dev_type, self.dev_model)
            .ok_or(FormatError::Invalid("unsupported device type/model"))?;
        self.profile = profile;

        warn!(
            "formatting metadata as type {:?} / model {} ({})",
            self.dev_type, self.dev_model, profile.name
        );

        self.nr_empty_zones = 0;
        self.nr_imp_open = 0;
        self.nr_exp_open = 0;

        match self.dev_type {
            DeviceType::ZoneDomains => self.format_meta_zd(),
            DeviceType::HmZoned | DeviceType::HaZoned => self.format_meta_zoned(mutating),
            DeviceType::NonZoned => self.format_meta_nz(),
        }
    }

    /// Write the metadata portion that is common for all device types.
    fn write_meta_common(&mut self) {
        let dev_type = self.dev_type as u32;
        let dev_model = self.dev_model;
        let bs_size = self.bs_size;
        let phys_capacity = self.phys_capacity;
        let lba_size = self.lba_size;
        let cfg_str = self.cfg.cfg_str.clone();

        let h = self.meta.header_mut();
        h.magic = meta::META_MAGIC;
        h.backstore_version = meta::BACKSTORE_VERSION;
        h.sizeof_struct = core::mem::size_of::<meta::MetaHeader>() as u64;
        h.bs_size = bs_size;
        h.dev_type = dev_type;
        h.dev_model = dev_model;
        h.phys_capacity = phys_capacity;
        h.lba_size = lba_size;
        h.set_cfg_str(&cfg_str);
    }

    fn init_zone_lists(&mut self) {
        for id in [
            ListId::ImpOpen,
            ListId::ExpOpen,
            ListId::Closed,
            ListId::SeqActive,
        ] {
            self.meta.set_list(id, ZoneListHead::EMPTY);
        }
    }

    /// Format metadata to become a Zone Domains device.
    fn format_meta_zd(&mut self) -> FormatResult {
        self.lba_size = self.cfg.lba_size;
        self.lba_log2 = log2(self.lba_size as u64);
        self.phys_capacity = self.cfg.phys_capacity / self.lba_size as u64;
        self.zone_size = self.cfg.zone_size / self.lba_size as u64;
        ensure!(self.zone_size != 0, FormatError::Invalid("zone size below LBA size"));
        self.zone_log2 = log2(self.zone_size);
        self.realm_size = self.cfg.realm_size / self.lba_size as u64;
        self.smr_gain = self.cfg.smr_gain;

        ensure!(
            self.realm_size <= self.phys_capacity / 2,
            FormatError::Invalid("invalid realm/capacity size")
        );
        ensure!(
            self.realm_size >= self.zone_size * 2 && self.realm_size % self.zone_size == 0,
            FormatError::Invalid("invalid realm/zone size")
        );

        self.nr_realms = self.phys_capacity.div_ceil(self.realm_size) as u32;
        self.phys_capacity = self.nr_realms as u64 * self.realm_size;
        self.logical_smr_capacity = self.phys_capacity;
        self.logical_cmr_capacity = self.logical_smr_capacity * 100 / self.smr_gain as u64;

        self.nr_conv_zones = (self.logical_cmr_capacity.div_ceil(self.zone_size)) as u32;
        self.nr_seq_zones = (self.logical_smr_capacity.div_ceil(self.zone_size)) as u32;

        self.nr_cmr_realm_zones = self.nr_conv_zones / self.nr_realms;
        self.nr_smr_realm_zones = self.nr_seq_zones / self.nr_realms;
        ensure!(
            self.nr_cmr_realm_zones != 0 && self.nr_smr_realm_zones != 0,
            FormatError::Invalid("realm too small for its zones")
        );
        self.nr_conv_zones = self.nr_cmr_realm_zones * self.nr_realms;
        self.nr_seq_zones = self.nr_smr_realm_zones * self.nr_realms;
        self.nr_actv_zones = self.nr_cmr_realm_zones;

        // Resulting device capacity over all supported domains.
        self.logical_smr_capacity = (self.nr_seq_zones as u64) << self.zone_log2;
        self.logical_cmr_capacity = (self.nr_conv_zones as u64) << self.zone_log2;
        let (total_cap, total_zones, nr_domains) = zd_capacity_over_domains(
            self.profile,
            self.logical_cmr_capacity,
            self.logical_smr_capacity,
            self.nr_conv_zones,
            self.nr_seq_zones,
        );
        let gapz = (nr_domains - 1) * self.profile.domain_gap;
        self.logical_capacity = total_cap + gapz as u64 * self.zone_size;
        self.nr_zones = total_zones + gapz;
        self.init_nr_zone_maps();

        self.nr_open_zones = self.cfg.open_num;
        if self.nr_open_zones >= self.nr_seq_zones / 2 {
            self.nr_open_zones = (self.nr_seq_zones / 2).max(1);
        }

        self.max_activate = self.cfg.effective_max_activate(self.profile);
        self.realms_feat_set = self.cfg.realms_feat_set;
        self.wp_check = self.cfg.effective_wp_check();

        debug!(
            "formatting ZD metadata: {} realms of {} LBAs, {} zones of {} LBAs, \
             {} conv zones, {} seq zones, {} max open",
            self.nr_realms,
            self.realm_size,
            self.nr_zones,
            self.zone_size,
            self.nr_conv_zones,
            self.nr_seq_zones,
            self.nr_open_zones
        );

        // Truncate the backing file.
        self.meta_size = meta::meta_size(self.nr_realms, self.nr_zones);
        self.bs_size = self.meta_size + self.phys_capacity * self.lba_size as u64;
        self.io.set_len(self.bs_size)?;

        // Fresh metadata region.
        self.meta = meta::MetaStore::new(self.nr_realms, self.nr_zones);
        self.write_meta_common();
        self.init_zone_domains();

        {
            let nr_zones = self.nr_zones;
            let nr_conv_zones = self.nr_conv_zones;
            let nr_open_zones = self.nr_open_zones;
            let wp_check = self.wp_check;
            let realms_feat_set = self.realms_feat_set;
            let realm_size = self.realm_size;
            let nr_realms = self.nr_realms;
            let smr_gain = self.smr_gain;
            let max_activate = self.max_activate;
            let nr_actv_zones = self.nr_actv_zones;
            let zone_size = self.zone_size as u32;

            let h = self.meta.header_mut();
            h.zone_size = zone_size;
            h.nr_zones = nr_zones;
            h.nr_conv_zones = nr_conv_zones;
            h.nr_open_zones = nr_open_zones;
            h.wp_check = wp_check as u32;
            h.realms_feat_set = realms_feat_set as u32;
            h.realm_size = realm_size;
            h.nr_realms = nr_realms;
            h.smr_gain = smr_gain;
            h.max_activate = max_activate;
            h.nr_actv_zones = nr_actv_zones;
        }

        self.init_zone_lists();
        self.init_zone_realms()?;
        self.init_domain_mapping();

        self.meta.flush(&mut self.io)?;
        Ok(())
    }

    /// Initialize the domain array of a Zone Domains device and reset the
    /// whole zone range to GAP type.
    fn init_zone_domains(&mut self) {
        let mut order: Vec<(ZoneType, u8)> = Vec::new();
        if self.profile.actv_of_sobr {
            order.push((ZoneType::SeqOrBefReq, 0));
        }
        if self.profile.actv_of_conv {
            order.push((ZoneType::Conventional, 0));
        }
        if self.profile.actv_of_seq_req {
            order.push((ZoneType::SeqWriteReq, DFLG_SMR));
        }
        if self.profile.actv_of_seq_pref {
            order.push((ZoneType::SeqWritePref, DFLG_SMR));
        }

        let gap_lbas = self.profile.domain_gap as u64 * self.zone_size;
        let cmr_cap = self.logical_cmr_capacity;
        let smr_cap = self.logical_smr_capacity;
        let zone_size = self.zone_size;

        let h = self.meta.header_mut();
        h.domains = [zerocopy::FromZeros::new_zeroed(); meta::MAX_DOMAINS];
        let mut start_lba = 0u64;
        for (i, &(zt, flags)) in order.iter().enumerate() {
            let cap = if flags & DFLG_SMR != 0 { smr_cap } else { cmr_cap };
            let d = &mut h.domains[i];
            d.dtype = zt as u8;
            d.flags = flags;
            d.start_lba = start_lba;
            d.end_lba = start_lba + cap - 1;
            d.nr_zones = (cap / zone_size) as u32;
            start_lba += cap + gap_lbas;
        }
        self.nr_domains = order.len() as u32;

        // Initialize the whole range of zones to have GAP type.
        let mut lba = 0u64;
        for z in self.meta.zones_mut() {
            z.start = lba;
            z.len = zone_size;
            z.ztype = ZoneType::Gap as u8;
            z.cond = ZoneCond::NotWp as u8;
            z.prev = 0;
            z.next = 0;
            z.wp = NO_WP;
            lba += zone_size;
        }
    }

    /// Initialize realms of a Zone Domains device: realm table, zone
    /// conditions, trailing-gap trim and faulty-zone injection.
    fn init_zone_realms(&mut self) -> FormatResult {
        let feat = self.profile;
        let nr_realms = self.nr_realms;
        let cmr_only_bcnt = feat.nr_bot_cmr;
        ensure!(
            feat.nr_bot_cmr + feat.nr_top_cmr < nr_realms,
            FormatError::Invalid("too many CMR-only realms")
        );
        let cmr_only_tcnt = (nr_realms - feat.nr_top_cmr - 1) as i64;

        // Realm IDs and initially active zone types.
        let first_dom_smr = self.domain(0).is_smr();
        for i in 0..nr_realms {
            let cmr_only = i < cmr_only_bcnt || i as i64 > cmr_only_tcnt;
            let rtype = if first_dom_smr || (feat.initial_all_smr && !cmr_only) {
                feat.initial_smr_type
            } else {
                feat.initial_cmr_type
            };
            let r = self.meta.realm_mut(i);
            r.number = i;
            r.rtype = rtype as u8;
            r.flags = 0;
            r.restr = REALM_RESTR_NONE;
        }

        let cr_sz = (self.nr_cmr_realm_zones as u64) << self.zone_log2;
        let sr_sz = (self.nr_smr_realm_zones as u64) << self.zone_log2;

        // Realm starting LBAs and lengths for every supported zone type.
        // CMR-only realms have no slot in the SMR domains; those domains
        // shrink and the freed zones stay GAP.
        for j in 0..self.nr_domains {
            let mut d = *self.domain(j);
            let mut cob = cmr_only_bcnt;
            let mut k = 0u64;
            for i in 0..nr_realms {
                let (add_type, rsz, rl) = if d.is_smr() {
                    let mut add = false;
                    if cob > 0 {
                        cob -= 1;
                    } else if i as i64 <= cmr_only_tcnt {
                        add = true;
                    }
                    (add, sr_sz, self.nr_smr_realm_zones)
                } else {
                    (true, cr_sz, self.nr_cmr_realm_zones)
                };

                if !add_type {
                    d.end_lba -= rl as u64 * self.zone_size;
                    d.nr_zones -= rl;
                    continue;
                }

                let zt = d.zone_type().ok_or(FormatError::Invalid("bad domain type"))?;
                {
                    let r = self.meta.realm_mut(i);
                    let ri = r.item_mut(zt);
                    ri.start_lba = d.start_lba + k * rsz;
                    ri.length = rl;
                    r.flags |= 1 << (d.dtype - 1);
                }
                k += 1;

                self.init_zones_zd(i, &d)?;
            }
            self.meta.header_mut().domains[j as usize] = d;
        }

        self.trim_gap_zones();

        // If needed, mark some zones read-only and/or offline.
        if feat.nr_rdonly_zones != 0 {
            ensure!(
                feat.rdonly_zone_offset + feat.nr_rdonly_zones < self.nr_conv_zones,
                FormatError::Invalid("bad CMR read-only offset/length")
            );
            self.inject_zone_cond_zd(
                feat.rdonly_zone_offset,
                ZoneCond::ReadOnly,
                feat.nr_rdonly_zones,
            )?;
        }
        if feat.nr_offline_zones != 0 {
            ensure!(
                feat.offline_zone_offset + feat.nr_offline_zones < self.nr_conv_zones,
                FormatError::Invalid("bad offline offset/length")
            );
            self.inject_zone_cond_zd(
                feat.offline_zone_offset,
                ZoneCond::Offline,
                feat.nr_offline_zones,
            )?;
        }

        self.stats.min_empty_zones = self.nr_empty_zones;
        Ok(())
    }

    /// Initialize zones of realm `realm_idx` in domain `d`. The domain
    /// zones already carry GAP type and NOT WP condition; set the real
    /// type and the initial condition, and link active zones.
    fn init_zones_zd(&mut self, realm_idx: u32, d: &meta::ZoneDomain) -> FormatResult {
        let feat = self.profile;
        let realm_seq = self.meta.realm(realm_idx).is_seq();

        // All but one set of zones per realm starts inactive.
        let mut cond = ZoneCond::Inactive;
        if d.is_smr() {
            if d.dtype == feat.initial_smr_type as u8 && realm_seq {
                cond = feat.initial_smr_cond;
            }
        } else if d.dtype == feat.initial_cmr_type as u8 && !realm_seq {
            cond = feat.initial_cmr_cond;
        }

        let zt = d.zone_type().ok_or(FormatError::Invalid("bad domain type"))?;
        let (lba, nr_zones) = {
            let ri = self.meta.realm(realm_idx).item(zt);
            (ri.start_lba, ri.length)
        };
        let start_zone = self
            .get_zone(lba, false)
            .ok_or(FormatError::Invalid("realm start zone out of range"))?;
        self.meta.realm_mut(realm_idx).item_mut(zt).start_zone = start_zone;

        for idx in start_zone..start_zone + nr_zones {
            let z = self.meta.zone_mut(idx);
            z.ztype = d.dtype;
            z.set_cond(cond);
            if cond == ZoneCond::Empty {
                self.nr_empty_zones += 1;
            }
            self.set_initial_wp(idx);
        }

        Ok(())
    }

    /// Given the start zone index in the first CMR domain and a zone
    /// count, assign the condition to this zone range in all domains,
    /// rescaling the range for the SMR side.
    fn inject_zone_cond_zd(
        &mut self,
        zone_idx: u32,
        cond: ZoneCond,
        nr_zones: u32,
    ) -> FormatResult {
        let smr_zone_idx = zone_idx as u64 * self.smr_gain as u64 / 100;
        let smr_nrz = (nr_zones as u64 * self.smr_gain as u64 / 100) as u32;

        for i in 0..self.nr_domains {
            let d = *self.domain(i);
            let (start_lba, nrz) = if d.is_smr() {
                (d.start_lba + smr_zone_idx * self.zone_size, smr_nrz)
            } else {
                (d.start_lba + zone_idx as u64 * self.zone_size, nr_zones)
            };
            let zone0 = self
                .get_zone(start_lba, false)
                .ok_or(FormatError::Invalid("faulty zone out of range"))?;
            ensure!(
                zone0 <= self.nr_zones - nrz,
                FormatError::Invalid("faulty zones injected too high")
            );
            for idx in zone0..zone0 + nrz {
                if self.meta.zone(idx).is_empty() && cond != ZoneCond::Empty {
                    self.nr_empty_zones -= 1;
                }
                self.meta.unlink_zone(idx);
                self.meta.zone_mut(idx).set_cond(cond);
                self.set_initial_wp(idx);
            }
        }

        Ok(())
    }

    /// Format metadata to become an HM or HA zoned device.
    fn format_meta_zoned(&mut self, mutating: bool) -> FormatResult {
        self.lba_size = self.cfg.lba_size;
        self.lba_log2 = log2(self.lba_size as u64);
        self.phys_capacity = self.cfg.phys_capacity / self.lba_size as u64;
        self.zone_size = self.cfg.zone_size / self.lba_size as u64;
        ensure!(self.zone_size != 0, FormatError::Invalid("zone size below LBA size"));
        self.zone_log2 = log2(self.zone_size);

        self.nr_zones = self.phys_capacity.div_ceil(self.zone_size) as u32;
        ensure!(self.nr_zones != 0, FormatError::Invalid("no zones fit the capacity"));

        self.nr_conv_zones = if mutating {
            match self.dev_model {
                MO_SMR_1PCNT_B => (self.nr_zones / 100).max(1),
                MO_SMR_2PCNT_BT => (self.nr_zones / 50).max(1) + 1,
                MO_SMR_FAULTY => {
                    let feat = self.profile;
                    let max_rdonly = feat.rdonly_zone_offset + feat.nr_rdonly_zones;
                    let max_offline = feat.offline_zone_offset + feat.nr_offline_zones;
                    let max_faulty = max_rdonly.max(max_offline);
                    ensure!(
                        max_faulty <= self.nr_zones,
                        FormatError::Invalid("not enough zones to set up FAULTY")
                    );
                    (self.nr_zones / 100).max(max_faulty)
                }
                _ => 0,
            }
        } else {
            match self.cfg.conv_num {
                None => (self.nr_zones / 100).max(1),
                Some(n) => {
                    ensure!(n < self.nr_zones, FormatError::Invalid("too many conventional zones"));
                    n
                }
            }
        };
        self.nr_seq_zones = self.nr_zones - self.nr_conv_zones;

        self.logical_capacity = (self.nr_zones as u64) << self.zone_log2;
        self.nr_open_zones = self.cfg.open_num;
        if self.nr_open_zones >= self.nr_seq_zones / 2 {
            self.nr_open_zones = (self.nr_seq_zones / 2).max(1);
        }

        self.wp_check = self.cfg.effective_wp_check();

        // No domains or realms on a plain zoned device.
        self.nr_realms = 0;
        self.realm_size = 0;
        self.nr_cmr_realm_zones = 0;
        self.nr_smr_realm_zones = 0;
        self.nr_domains = 0;
        self.nr_actv_zones = 0;
        self.max_activate = 0;
        self.realms_feat_set = false;
        self.smr_gain = 0;
        self.logical_cmr_capacity = 0;
        self.logical_smr_capacity = 0;
        self.cmr_to_smr.clear();
        self.smr_to_cmr.clear();

        debug!(
            "formatting SMR metadata: model {}, {} zones of {} LBAs, {} conv, {} max open",
            self.profile.name, self.nr_zones, self.zone_size, self.nr_conv_zones, self.nr_open_zones
        );

        self.meta_size = meta::meta_size(0, self.nr_zones);
        self.bs_size = self.meta_size + self.phys_capacity * self.lba_size as u64;
        self.io.set_len(self.bs_size)?;

        self.meta = meta::MetaStore::new(0, self.nr_zones);
        self.write_meta_common();
        {
            let nr_zones = self.nr_zones;
            let nr_conv_zones = self.nr_conv_zones;
            let nr_open_zones = self.nr_open_zones;
            let wp_check = self.wp_check;
            let zone_size = self.zone_size as u32;

            let h = self.meta.header_mut();
            h.zone_size = zone_size;
            h.nr_zones = nr_zones;
            h.nr_conv_zones = nr_conv_zones;
            h.nr_open_zones = nr_open_zones;
            h.wp_check = wp_check as u32;
        }
        self.init_zone_lists();
        self.init_zones_zoned();

        self.zone_type_to_dom = [None; NR_ZONE_TYPES];
        self.meta.flush(&mut self.io)?;
        Ok(())
    }

    fn init_zones_zoned(&mut self) {
        let feat = self.profile;
        let model = self.dev_model;

        let mut nr_convz = self.nr_conv_zones;
        if model == MO_SMR_2PCNT_BT && nr_convz > 0 {
            nr_convz -= 1;
        }
        let seq_type = if self.dev_type == DeviceType::HaZoned {
            ZoneType::SeqWritePref
        } else {
            ZoneType::SeqWriteReq
        };

        let mut lba = 0u64;
        let nr_zones = self.nr_zones;
        for i in 0..nr_zones {
            let zone_size = self.zone_size;
            let logical_capacity = self.logical_capacity;
            let z = self.meta.zone_mut(i);
            z.start = lba;
            z.prev = 0;
            z.next = 0;
            z.len = if z.start + zone_size > logical_capacity {
                logical_capacity - z.start
            } else {
                zone_size
            };
            if i < nr_convz || (model == MO_SMR_2PCNT_BT && i == nr_zones - 1) {
                z.ztype = ZoneType::Conventional as u8;
                z.cond = ZoneCond::NotWp as u8;
            } else {
                z.ztype = seq_type as u8;
                z.cond = ZoneCond::Empty as u8;
                self.nr_empty_zones += 1;
            }
            lba += self.meta.zone(i).len;
            self.set_initial_wp(i);
        }

        // If needed, mark some zones read-only and/or offline. A bad
        // injection range is skipped, not fatal, on plain zoned devices.
        if feat.nr_rdonly_zones != 0 {
            if feat.rdonly_zone_offset + feat.nr_rdonly_zones > self.nr_conv_zones {
                warn!(
                    "ignore bad CMR read-only offset/len {}/{}",
                    feat.rdonly_zone_offset, feat.nr_rdonly_zones
                );
            } else {
                self.inject_zone_cond_zoned(
                    feat.rdonly_zone_offset,
                    ZoneCond::ReadOnly,
                    feat.nr_rdonly_zones,
                );
            }
        }
        if feat.nr_offline_zones != 0 {
            if feat.offline_zone_offset + feat.nr_offline_zones > self.nr_conv_zones {
                warn!(
                    "ignore bad CMR offline offset/len {}/{}",
                    feat.offline_zone_offset, feat.nr_offline_zones
                );
            } else {
                self.inject_zone_cond_zoned(
                    feat.offline_zone_offset,
                    ZoneCond::Offline,
                    feat.nr_offline_zones,
                );
            }
        }

        self.stats.min_empty_zones = self.nr_empty_zones;
    }

    fn inject_zone_cond_zoned(&mut self, zone_idx: u32, cond: ZoneCond, nr_zones: u32) {
        let start_lba = zone_idx as u64 * self.zone_size;
        let Some(zone0) = self.get_zone(start_lba, false) else {
            warn!("can't locate zone {start_lba}");
            return;
        };
        if zone0 > self.nr_zones - nr_zones {
            warn!("{nr_zones} zone(s) at {zone0} being injected too high");
            return;
        }
        for idx in zone0..zone0 + nr_zones {
            if self.meta.zone(idx).is_empty() && cond != ZoneCond::Empty {
                self.nr_empty_zones -= 1;
            }
            self.meta.unlink_zone(idx);
            self.meta.zone_mut(idx).set_cond(cond);
            self.set_initial_wp(idx);
        }
    }

    /// Format metadata for a legacy non-zoned drive.
    fn format_meta_nz(&mut self) -> FormatResult {
        self.lba_size = self.cfg.lba_size;
        self.lba_log2 = log2(self.lba_size as u64);
        self.phys_capacity = self.cfg.phys_capacity / self.lba_size as u64;
        self.logical_capacity = self.phys_capacity;

        self.zone_size = 0;
        self.zone_log2 = 0;
        self.nr_zones = 0;
        self.nr_conv_zones = 0;
        self.nr_seq_zones = 0;
        self.nr_open_zones = 0;
        self.nr_realms = 0;
        self.realm_size = 0;
        self.nr_domains = 0;
        self.zone_type_to_dom = [None; NR_ZONE_TYPES];
        self.logical_cmr_capacity = 0;
        self.logical_smr_capacity = 0;

        debug!("formatting PMR metadata: LBA size {} B", self.lba_size);

        self.meta_size = meta::meta_size(0, 0);
        self.bs_size = self.meta_size + self.phys_capacity * self.lba_size as u64;
        self.io.set_len(self.bs_size)?;

        self.meta = meta::MetaStore::new(0, 0);
        self.write_meta_common();
        self.init_zone_lists();
        self.meta.flush(&mut self.io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevConfig;
    use crate::device::Device;

    pub(crate) fn mem_device(cfgstring: &str, capacity: u64) -> Device<MemBlockIO> {
        let mut cfg = DevConfig::parse(cfgstring).unwrap();
        cfg.phys_capacity = capacity;
        Device::open(MemBlockIO::new(), cfg).unwrap()
    }

    // Small geometry used across the formatter tests: 64 KiB zones
    // (128 LBAs), 256 KiB realms (4 SMR zones), 8 MiB capacity.
    const CFG: &str = "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25@mem";
    const CAP: u64 = 8 * 1024 * 1024;

    #[test]
    fn test_format_zd_geometry() {
        let dev = mem_device(CFG, CAP);
        assert_eq!(dev.lba_size(), 512);
        assert_eq!(dev.zone_size(), 128);
        assert_eq!(dev.nr_realms(), 32);
        // 4 SMR zones per realm, 125% gain -> 3 CMR zones per realm.
        assert_eq!(dev.nr_smr_realm_zones, 4);
        assert_eq!(dev.nr_cmr_realm_zones, 3);
        assert_eq!(dev.nr_domains(), 2);

        // Conv domain first, then the SWR domain behind the gap.
        let d0 = *dev.domain(0);
        let d1 = *dev.domain(1);
        assert_eq!(d0.zone_type(), Some(ZoneType::Conventional));
        assert!(d0.is_cmr());
        assert_eq!(d1.zone_type(), Some(ZoneType::SeqWriteReq));
        assert!(d1.is_smr());
        assert_eq!(d0.start_lba, 0);
        // ZONE_DOM has a 3-zone domain gap.
        assert_eq!(d1.start_lba, d0.end_lba + 1 + 3 * dev.zone_size());
    }

    #[test]
    fn test_format_zd_zone_conditions() {
        let dev = mem_device(CFG, CAP);
        // Conventional zones are inactive until activated; SWR zones
        // start empty.
        let d0 = *dev.domain(0);
        let d1 = *dev.domain(1);
        let z = dev.zone_at(dev.get_zone(d0.start_lba, false).unwrap());
        assert!(z.is_conv() && z.is_inactive());
        assert_eq!(z.wp, NO_WP);

        let z = dev.zone_at(dev.get_zone(d1.start_lba, false).unwrap());
        assert!(z.is_seq_req() && z.is_empty());
        assert_eq!(z.wp, z.start);

        // Gap zones between the domains.
        let gap_lba = d0.end_lba + 1;
        let z = dev.zone_at(dev.get_zone(gap_lba, false).unwrap());
        assert!(z.is_gap() && z.is_not_wp());
    }

    #[test]
    fn test_format_zd_realm_items() {
        let dev = mem_device(CFG, CAP);
        for i in 0..dev.nr_realms() {
            let r = dev.realm_at(i);
            assert_eq!(r.number, i);
            assert!(r.can_actv_as(ZoneType::Conventional));
            assert!(r.can_actv_as(ZoneType::SeqWriteReq));
            assert_eq!(r.length(ZoneType::Conventional), 3);
            assert_eq!(r.length(ZoneType::SeqWriteReq), 4);
        }
        // Realm items pack contiguously within their domains.
        let r0 = dev.realm_at(0);
        let r1 = dev.realm_at(1);
        assert_eq!(
            r1.start(ZoneType::SeqWriteReq),
            r0.start(ZoneType::SeqWriteReq) + 4 * dev.zone_size()
        );
    }

    #[test]
    fn test_format_validates_after_format() {
        // Reopening an untouched device must not trigger a reformat:
        // the zone conditions set at format time survive.
        let mut cfg = DevConfig::parse(CFG).unwrap();
        cfg.phys_capacity = CAP;
        let mut dev = Device::open(MemBlockIO::new(), cfg.clone()).unwrap();
        dev.sync_cache().unwrap();

        // Scribble a recognizable state: nothing; just reopen.
        let io = std::mem::replace(&mut dev.io, MemBlockIO::new());
        let dev2 = Device::open(io, cfg).unwrap();
        assert_eq!(dev2.nr_realms(), 32);
        assert_eq!(dev2.nr_zones(), dev.nr_zones());
    }

    #[test]
    fn test_format_zoned() {
        let dev = mem_device("dhsmr/type-HM_ZONED/zsize-64K/conv-4@mem", 4 * 1024 * 1024);
        assert_eq!(dev.nr_zones(), 64);
        assert_eq!(dev.nr_conv_zones, 4);
        assert!(dev.zone_at(0).is_conv() && dev.zone_at(0).is_not_wp());
        assert!(dev.zone_at(4).is_seq_req() && dev.zone_at(4).is_empty());
        assert_eq!(dev.nr_domains(), 0);
    }

    #[test]
    fn test_format_zoned_faulty_injection() {
        let mut cfg =
            DevConfig::parse("dhsmr/type-HM_ZONED_FAULTY/zsize-64K/conv-16@mem").unwrap();
        cfg.phys_capacity = 4 * 1024 * 1024;
        let dev = Device::open(MemBlockIO::new(), cfg).unwrap();
        // Profile: 2 read-only zones at 7, 2 offline zones at 11.
        assert!(dev.zone_at(7).is_rdonly());
        assert!(dev.zone_at(8).is_rdonly());
        assert!(dev.zone_at(11).is_offline());
        assert!(dev.zone_at(12).is_offline());
        assert_eq!(dev.zone_at(7).wp, NO_WP);
    }

    #[test]
    fn test_format_zd_faulty_injection_hits_all_domains() {
        let dev = mem_device(
            "dhsmr/type-ZD_FAULTY/zsize-64K/rsize-512K/sgain-1.25@mem",
            16 * 1024 * 1024,
        );
        // CMR domain: read-only at zone offset 7 within the domain.
        let d0 = *dev.domain(0);
        let idx = dev.get_zone(d0.start_lba + 7 * dev.zone_size(), false).unwrap();
        assert!(dev.zone_at(idx).is_rdonly());
        // SMR domain: offset rescaled by the 125% gain -> 8.
        let d1 = *dev.domain(1);
        let idx = dev.get_zone(d1.start_lba + 8 * dev.zone_size(), false).unwrap();
        assert!(dev.zone_at(idx).is_rdonly());
    }

    #[test]
    fn test_format_nz() {
        let dev = mem_device("dhsmr/type-NON_ZONED@mem", 1024 * 1024);
        assert_eq!(dev.nr_zones(), 0);
        assert_eq!(dev.logical_capacity(), 2048);
    }

    #[test]
    fn test_cmr_only_realms_shrink_smr_domain() {
        let dev = mem_device(
            "dhsmr/type-ZD_1CMR_BOT/zsize-64K/rsize-256K/sgain-1.25@mem",
            CAP,
        );
        // Realm 0 is CMR-only: no SWR slot.
        let r0 = dev.realm_at(0);
        assert_eq!(r0.length(ZoneType::SeqWriteReq), 0);
        assert!(!r0.can_actv_as(ZoneType::SeqWriteReq));
        assert!(r0.can_actv_as(ZoneType::Conventional));
        // Later realms still have their SMR share.
        let r1 = dev.realm_at(1);
        assert_eq!(r1.length(ZoneType::SeqWriteReq), 4);
    }
}
