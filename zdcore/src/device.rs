// SPDX-License-Identifier: MIT

use log::{debug, warn};

use zdio::prelude::*;

use crate::checker;
use crate::config::DevConfig;
use crate::errors::{DevError, DevResult, ZbcError, ZbcResult};
use crate::meta::{self, MetaHeader, MetaStore, Zone, ZoneDomain, ZoneRealm};
use crate::profile::DevProfile;
use crate::stats::DevStats;
use crate::types::*;

/// Compute log2 of a power-of-two value. Zone and LBA sizes are powers of
/// two, so shifts replace division on the I/O path.
#[inline]
pub(crate) fn log2(n: u64) -> u32 {
    n.trailing_zeros()
}

/// Derived device geometry, recomputed from a metadata header and checked
/// against the stored counts. Shared by the open path and the checker so
/// both agree on what the header implies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub profile: &'static DevProfile,
    pub meta_size: u64,
    pub phys_capacity: u64,
    pub lba_size: u32,
    pub zone_size: u64,
    pub realm_size: u64,
    pub nr_realms: u32,
    /// Zone-array length (pre-trim).
    pub nr_meta_zones: u32,
    pub nr_conv_zones: u32,
    pub nr_seq_zones: u32,
    pub nr_cmr_realm_zones: u32,
    pub nr_smr_realm_zones: u32,
    pub nr_open_zones: u32,
    pub logical_capacity: u64,
    pub logical_cmr_capacity: u64,
    pub logical_smr_capacity: u64,
}

impl Geometry {
    /// Re-derive the geometry of a Zone Domains device from its header.
    /// Returns a failure message naming the first mismatched invariant.
    pub fn derive_zd(h: &MetaHeader) -> Result<Geometry, &'static str> {
        let dev_type = DeviceType::from_raw(h.dev_type).ok_or("bad device type")?;
        if dev_type != DeviceType::ZoneDomains {
            return Err("not a Zone Domains header");
        }
        let profile =
            DevProfile::find(dev_type, h.dev_model).ok_or("unknown device model")?;

        let meta_sz = meta::meta_size(h.nr_realms, h.nr_zones);
        if h.bs_size < meta_sz || h.lba_size == 0 {
            return Err("backing store smaller than metadata");
        }
        let phys_capacity = (h.bs_size - meta_sz) / h.lba_size as u64;
        if h.phys_capacity != phys_capacity {
            return Err("physical capacity mismatch");
        }

        let zone_size = h.zone_size as u64;
        if zone_size == 0 || zone_size & (zone_size - 1) != 0 {
            return Err("zone size not a power of two");
        }
        if h.realm_size < zone_size * 2 || h.realm_size % zone_size != 0 {
            return Err("bad realm/zone size ratio");
        }
        if h.smr_gain <= 100 {
            return Err("bad SMR gain");
        }
        if h.realm_size > phys_capacity / 2 {
            return Err("bad realm/capacity ratio");
        }

        let nr_realms = phys_capacity.div_ceil(h.realm_size) as u32;
        if h.nr_realms != nr_realms {
            return Err("realm count mismatch");
        }

        let logical_cmr = phys_capacity * 100 / h.smr_gain as u64;
        let nr_zones_raw = ((phys_capacity + logical_cmr) / zone_size) as u32;
        let mut nr_conv_zones = logical_cmr.div_ceil(zone_size) as u32;
        let mut nr_seq_zones = phys_capacity.div_ceil(zone_size) as u32;
        if h.nr_open_zones >= nr_seq_zones {
            return Err("open zone limit exceeds zone count");
        }

        let nr_cmr_realm_zones = nr_conv_zones / nr_realms;
        let nr_smr_realm_zones = nr_seq_zones / nr_realms;
        nr_conv_zones = nr_cmr_realm_zones * nr_realms;
        nr_seq_zones = nr_smr_realm_zones * nr_realms;
        if h.nr_conv_zones != nr_conv_zones || h.nr_conv_zones >= nr_zones_raw {
            return Err("conventional zone count mismatch");
        }
        if h.nr_actv_zones == 0 {
            return Err("zero FSNOZ");
        }
        if h.max_activate > h.nr_zones {
            return Err("MAX ACTIVATION exceeds zone count");
        }

        let logical_smr_capacity = (nr_seq_zones as u64) << log2(zone_size);
        let logical_cmr_capacity = (nr_conv_zones as u64) << log2(zone_size);
        let (total_cap, total_zones, nr_domains) = zd_capacity_over_domains(
            profile,
            logical_cmr_capacity,
            logical_smr_capacity,
            nr_conv_zones,
            nr_seq_zones,
        );
        let gapz = (nr_domains - 1) * profile.domain_gap;
        let logical_capacity = total_cap + gapz as u64 * zone_size;
        let nr_meta_zones = total_zones + gapz;
        if h.nr_zones != nr_meta_zones {
            return Err("zone count mismatch");
        }

        Ok(Geometry {
            profile,
            meta_size: meta_sz,
            phys_capacity,
            lba_size: h.lba_size,
            zone_size,
            realm_size: h.realm_size,
            nr_realms,
            nr_meta_zones,
            nr_conv_zones,
            nr_seq_zones,
            nr_cmr_realm_zones,
            nr_smr_realm_zones,
            nr_open_zones: h.nr_open_zones,
            logical_capacity,
            logical_cmr_capacity,
            logical_smr_capacity,
        })
    }

    /// Re-derive the geometry of an HM/HA zoned device from its header.
    pub fn derive_zoned(h: &MetaHeader) -> Result<Geometry, &'static str> {
        let dev_type = DeviceType::from_raw(h.dev_type).ok_or("bad device type")?;
        if !matches!(dev_type, DeviceType::HmZoned | DeviceType::HaZoned) {
            return Err("not a zoned header");
        }
        let profile =
            DevProfile::find(dev_type, h.dev_model).ok_or("unknown device model")?;

        let meta_sz = meta::meta_size(0, h.nr_zones);
        if h.bs_size < meta_sz || h.lba_size == 0 {
            return Err("backing store smaller than metadata");
        }
        let phys_capacity = (h.bs_size - meta_sz) / h.lba_size as u64;
        if h.phys_capacity != phys_capacity {
            return Err("physical capacity mismatch");
        }

        let zone_size = h.zone_size as u64;
        if zone_size == 0 || zone_size & (zone_size - 1) != 0 {
            return Err("zone size not a power of two");
        }
        let nr_zones = phys_capacity.div_ceil(zone_size) as u32;
        if h.nr_zones != nr_zones {
            return Err("zone count mismatch");
        }
        if h.nr_conv_zones >= nr_zones {
            return Err("conventional zone count mismatch");
        }
        if h.nr_open_zones > nr_zones {
            return Err("open zone limit exceeds zone count");
        }

        Ok(Geometry {
            profile,
            meta_size: meta_sz,
            phys_capacity,
            lba_size: h.lba_size,
            zone_size,
            realm_size: 0,
            nr_realms: 0,
            nr_meta_zones: nr_zones,
            nr_conv_zones: h.nr_conv_zones,
            nr_seq_zones: nr_zones - h.nr_conv_zones,
            nr_cmr_realm_zones: 0,
            nr_smr_realm_zones: 0,
            nr_open_zones: h.nr_open_zones,
            logical_capacity: (nr_zones as u64) << log2(zone_size),
            logical_cmr_capacity: 0,
            logical_smr_capacity: 0,
        })
    }

    /// Re-derive the geometry of a non-zoned device from its header.
    pub fn derive_nz(h: &MetaHeader) -> Result<Geometry, &'static str> {
        if h.dev_type != DeviceType::NonZoned as u32 || h.dev_model != MO_NZ_GENERIC {
            return Err("not a non-zoned header");
        }
        let profile = DevProfile::find(DeviceType::NonZoned, MO_NZ_GENERIC)
            .ok_or("unknown device model")?;

        let meta_sz = meta::meta_size(0, 0);
        if h.bs_size < meta_sz || h.lba_size == 0 {
            return Err("backing store smaller than metadata");
        }
        let phys_capacity = (h.bs_size - meta_sz) / h.lba_size as u64;
        if h.phys_capacity != phys_capacity {
            return Err("physical capacity mismatch");
        }

        Ok(Geometry {
            profile,
            meta_size: meta_sz,
            phys_capacity,
            lba_size: h.lba_size,
            zone_size: 0,
            realm_size: 0,
            nr_realms: 0,
            nr_meta_zones: 0,
            nr_conv_zones: 0,
            nr_seq_zones: 0,
            nr_cmr_realm_zones: 0,
            nr_smr_realm_zones: 0,
            nr_open_zones: 0,
            logical_capacity: phys_capacity,
            logical_cmr_capacity: 0,
            logical_smr_capacity: 0,
        })
    }

    pub fn derive(h: &MetaHeader) -> Result<Geometry, &'static str> {
        match DeviceType::from_raw(h.dev_type) {
            Some(DeviceType::NonZoned) => Geometry::derive_nz(h),
            Some(DeviceType::HmZoned) | Some(DeviceType::HaZoned) => Geometry::derive_zoned(h),
            Some(DeviceType::ZoneDomains) => Geometry::derive_zd(h),
            None => Err("bad device type"),
        }
    }
}

/// Sum logical capacity and zone count over the domains a ZD profile
/// supports. Returns (capacity, zones, nr_domains), gaps excluded.
pub(crate) fn zd_capacity_over_domains(
    profile: &DevProfile,
    cmr_capacity: u64,
    smr_capacity: u64,
    nr_conv_zones: u32,
    nr_seq_zones: u32,
) -> (u64, u32, u32) {
    let mut cap = 0u64;
    let mut zones = 0u32;
    let mut domains = 0u32;
    if profile.actv_of_conv {
        cap += cmr_capacity;
        zones += nr_conv_zones;
        domains += 1;
    }
    if profile.actv_of_seq_req {
        cap += smr_capacity;
        zones += nr_seq_zones;
        domains += 1;
    }
    if profile.actv_of_seq_pref {
        cap += smr_capacity;
        zones += nr_seq_zones;
        domains += 1;
    }
    if profile.actv_of_sobr {
        cap += cmr_capacity;
        zones += nr_conv_zones;
        domains += 1;
    }
    (cap, zones, domains)
}

/// The emulated device.
///
/// Owns the backing store, the metadata region and all derived geometry.
/// All command semantics are methods on this type; the SCSI layer only
/// decodes CDBs and marshals replies.
pub struct Device<IO: BlockIO + BlockIOSetLen> {
    pub(crate) io: IO,
    pub(crate) cfg: DevConfig,

    pub(crate) dev_type: DeviceType,
    pub(crate) dev_model: u32,
    pub(crate) profile: &'static DevProfile,

    pub(crate) meta: MetaStore,
    pub(crate) meta_size: u64,
    pub(crate) bs_size: u64,

    pub(crate) phys_capacity: u64,
    pub(crate) lba_size: u32,
    pub(crate) lba_log2: u32,
    pub(crate) zone_size: u64,
    pub(crate) zone_log2: u32,
    pub(crate) realm_size: u64,

    pub(crate) nr_realms: u32,
    /// Post-trim zone count; the metadata zone array may be longer.
    pub(crate) nr_zones: u32,
    pub(crate) nr_conv_zones: u32,
    pub(crate) nr_seq_zones: u32,
    pub(crate) nr_open_zones: u32,
    pub(crate) nr_imp_open: u32,
    pub(crate) nr_exp_open: u32,
    pub(crate) nr_empty_zones: u32,
    pub(crate) nr_cmr_realm_zones: u32,
    pub(crate) nr_smr_realm_zones: u32,
    pub(crate) smr_gain: u32,
    pub(crate) max_activate: u32,
    pub(crate) nr_actv_zones: u32,
    pub(crate) wp_check: bool,
    pub(crate) realms_feat_set: bool,
    pub(crate) force_mutate: bool,
    pub(crate) have_gaps: bool,

    pub(crate) nr_domains: u32,
    pub(crate) zone_type_to_dom: [Option<u8>; NR_ZONE_TYPES],

    pub(crate) logical_capacity: u64,
    pub(crate) logical_cmr_capacity: u64,
    pub(crate) logical_smr_capacity: u64,

    /// Zone count maps for a single realm, CMR->SMR and SMR->CMR.
    pub(crate) cmr_to_smr: Vec<u32>,
    pub(crate) smr_to_cmr: Vec<u32>,

    pub(crate) stats: DevStats,
}

impl<IO: BlockIO + BlockIOSetLen> Device<IO> {
    /// Open the emulated device on a backing store.
    ///
    /// A fresh (zero-length) store is formatted from the configuration.
    /// An existing store is validated against the saved configuration
    /// string and the metadata invariants; any mismatch triggers an
    /// unconditional reformat.
    pub fn open(mut io: IO, cfg: DevConfig) -> DevResult<Device<IO>> {
        let existing = io.len()? != 0;

        let mut dev = Device {
            io,
            dev_type: cfg.dev_type,
            dev_model: cfg.dev_model,
            profile: cfg.profile,
            cfg,
            meta: MetaStore::new(0, 0),
            meta_size: 0,
            bs_size: 0,
            phys_capacity: 0,
            lba_size: 0,
            lba_log2: 0,
            zone_size: 0,
            zone_log2: 0,
            realm_size: 0,
            nr_realms: 0,
            nr_zones: 0,
            nr_conv_zones: 0,
            nr_seq_zones: 0,
            nr_open_zones: 0,
            nr_imp_open: 0,
            nr_exp_open: 0,
            nr_empty_zones: 0,
            nr_cmr_realm_zones: 0,
            nr_smr_realm_zones: 0,
            smr_gain: 0,
            max_activate: 0,
            nr_actv_zones: 0,
            wp_check: false,
            realms_feat_set: false,
            force_mutate: false,
            have_gaps: false,
            nr_domains: 0,
            zone_type_to_dom: [None; NR_ZONE_TYPES],
            logical_capacity: 0,
            logical_cmr_capacity: 0,
            logical_smr_capacity: 0,
            cmr_to_smr: Vec::new(),
            smr_to_cmr: Vec::new(),
            stats: DevStats::default(),
        };

        let mut need_format = !existing;
        if existing {
            match dev.try_adopt_meta()? {
                Ok(()) => {}
                Err(reason) => {
                    warn!(
                        "backing store {} needs reformatting: {}",
                        dev.cfg.path, reason
                    );
                    need_format = true;
                }
            }
        }

        if need_format {
            // Keep the stored personality if the old header still names a
            // valid one, so a mutated device survives metadata corruption.
            let mutating = existing && dev.adopt_stored_personality()?;
            if !mutating {
                dev.dev_type = dev.cfg.dev_type;
                dev.dev_model = dev.cfg.dev_model;
            }
            dev.format_meta(mutating).map_err(DevError::Format)?;
        } else {
            dev.init_meta();
        }

        dev.recount_zones();
        Ok(dev)
    }

    /// Validate the stored metadata and, if it passes, adopt it as the
    /// device state. The outer error is an IO failure, the inner one a
    /// validation failure that should trigger a reformat.
    fn try_adopt_meta(&mut self) -> DevResult<Result<(), &'static str>> {
        let header = match MetaStore::read_header(&mut self.io) {
            Ok(h) => h,
            Err(_) => return Ok(Err("can't read metadata header")),
        };
        let bs_size = self.io.len()?;

        if let Err(reason) = checker::check_header(&header, Some(&self.cfg), bs_size) {
            return Ok(Err(reason));
        }

        let geo = match Geometry::derive(&header) {
            Ok(geo) => geo,
            Err(reason) => return Ok(Err(reason)),
        };

        let meta = match MetaStore::load(&mut self.io, geo.nr_realms, geo.nr_meta_zones) {
            Ok(meta) => meta,
            Err(_) => return Ok(Err("can't read metadata region")),
        };

        self.adopt_geometry(&header, geo);
        self.meta = meta;
        self.init_domain_mapping();

        let report = checker::check_structure(self);
        if report.has_error() {
            debug!("metadata check report:\n{report}");
            return Ok(Err(report.first_error_code().unwrap_or("metadata check failed")));
        }

        Ok(Ok(()))
    }

    fn adopt_geometry(&mut self, header: &MetaHeader, geo: Geometry) {
        self.dev_type = DeviceType::from_raw(header.dev_type).expect("checked device type");
        self.dev_model = header.dev_model;
        self.profile = geo.profile;
        self.meta_size = geo.meta_size;
        self.bs_size = header.bs_size;
        self.phys_capacity = geo.phys_capacity;
        self.lba_size = geo.lba_size;
        self.lba_log2 = log2(geo.lba_size as u64);
        self.zone_size = geo.zone_size;
        self.zone_log2 = if geo.zone_size != 0 {
            log2(geo.zone_size)
        } else {
            0
        };
        self.realm_size = geo.realm_size;
        self.nr_realms = geo.nr_realms;
        self.nr_zones = geo.nr_meta_zones;
        self.nr_conv_zones = geo.nr_conv_zones;
        self.nr_seq_zones = geo.nr_seq_zones;
        self.nr_open_zones = geo.nr_open_zones;
        self.nr_cmr_realm_zones = geo.nr_cmr_realm_zones;
        self.nr_smr_realm_zones = geo.nr_smr_realm_zones;
        self.smr_gain = header.smr_gain;
        self.max_activate = header.max_activate;
        self.nr_actv_zones = header.nr_actv_zones;
        self.wp_check = header.wp_check != 0;
        self.realms_feat_set = header.realms_feat_set != 0;
        self.nr_imp_open = header.imp_open_zones.size;
        self.nr_exp_open = header.exp_open_zones.size;
        self.nr_domains = header
            .domains
            .iter()
            .take_while(|d| d.end_lba != 0)
            .count() as u32;
        self.logical_capacity = geo.logical_capacity;
        self.logical_cmr_capacity = geo.logical_cmr_capacity;
        self.logical_smr_capacity = geo.logical_smr_capacity;
        if self.dev_type == DeviceType::ZoneDomains {
            self.init_nr_zone_maps();
        }
    }

    /// On corrupt metadata, try to keep the personality the device was
    /// last formatted as. Returns true if a valid one was found.
    fn adopt_stored_personality(&mut self) -> DevResult<bool> {
        let header = match MetaStore::read_header(&mut self.io) {
            Ok(h) => h,
            Err(_) => return Ok(false),
        };
        if header.magic != meta::META_MAGIC {
            return Ok(false);
        }
        let dev_type = match DeviceType::from_raw(header.dev_type) {
            Some(t) => t,
            None => return Ok(false),
        };
        match DevProfile::find(dev_type, header.dev_model) {
            Some(profile) => {
                self.dev_type = dev_type;
                self.dev_model = header.dev_model;
                self.profile = profile;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-initialize volatile zone state after adopting valid metadata:
    /// any zone left open by a previous run is closed.
    fn init_meta(&mut self) {
        if self.dev_type == DeviceType::NonZoned {
            return;
        }
        for idx in 0..self.meta.nr_zones() {
            self.close_zone_inner(idx);
        }
        self.nr_imp_open = 0;
        self.nr_exp_open = 0;
        self.trim_gap_zones();
    }

    /// Count empty zones and detect gap zones after open or format.
    fn recount_zones(&mut self) {
        self.nr_empty_zones = 0;
        self.have_gaps = false;
        for z in self.meta.zones() {
            if z.is_empty() {
                self.nr_empty_zones += 1;
            }
            if z.is_gap() {
                self.have_gaps = true;
            }
        }
        self.stats.min_empty_zones = self.nr_empty_zones;
    }

    /// Trim trailing gap zones from the logical LBA range. The zone array
    /// in metadata keeps them; they only disappear from the reported
    /// geometry.
    pub(crate) fn trim_gap_zones(&mut self) {
        let zones = self.meta.zones();
        if zones.is_empty() {
            return;
        }
        let mut to_trim = 0u32;
        for z in zones[..self.nr_zones as usize].iter().rev() {
            if !z.is_gap() {
                break;
            }
            to_trim += 1;
        }
        self.nr_zones -= to_trim;
        self.logical_capacity -= to_trim as u64 * self.zone_size;
    }

    /// Initialize the zone type -> domain ID mapping, the opposite of the
    /// mapping provided by the domain array.
    pub(crate) fn init_domain_mapping(&mut self) {
        let header = self.meta.header();
        for (i, slot) in self.zone_type_to_dom.iter_mut().enumerate() {
            *slot = None;
            for (j, d) in header.domains[..self.nr_domains as usize].iter().enumerate() {
                if d.dtype == i as u8 + 1 {
                    *slot = Some(j as u8);
                    break;
                }
            }
        }
    }

    /// Initialize the CMR->SMR and SMR->CMR zone count maps used when an
    /// activation range is expressed in the other domain's zone units.
    pub(crate) fn init_nr_zone_maps(&mut self) {
        let cmr = self.nr_cmr_realm_zones;
        let smr = self.nr_smr_realm_zones;
        self.cmr_to_smr = (1..=cmr).map(|v| rescale_in_range(v, cmr, smr)).collect();
        self.smr_to_cmr = (1..=smr).map(|v| rescale_in_range(v, smr, cmr)).collect();
    }

    // === Accessors ===

    #[inline]
    pub fn dev_type(&self) -> DeviceType {
        self.dev_type
    }
    #[inline]
    pub fn dev_model(&self) -> u32 {
        self.dev_model
    }
    #[inline]
    pub fn profile(&self) -> &'static DevProfile {
        self.profile
    }
    #[inline]
    pub fn is_nz(&self) -> bool {
        self.dev_type == DeviceType::NonZoned
    }
    #[inline]
    pub fn is_zoned(&self) -> bool {
        self.dev_type.is_zoned()
    }
    #[inline]
    pub fn is_zd(&self) -> bool {
        self.dev_type == DeviceType::ZoneDomains
    }
    #[inline]
    pub fn is_hm(&self) -> bool {
        self.dev_type == DeviceType::HmZoned
    }
    #[inline]
    pub fn is_ha(&self) -> bool {
        self.dev_type == DeviceType::HaZoned
    }
    #[inline]
    pub fn lba_size(&self) -> u32 {
        self.lba_size
    }
    #[inline]
    pub fn zone_size(&self) -> u64 {
        self.zone_size
    }
    #[inline]
    pub fn logical_capacity(&self) -> u64 {
        self.logical_capacity
    }
    #[inline]
    pub fn logical_cmr_capacity(&self) -> u64 {
        self.logical_cmr_capacity
    }
    #[inline]
    pub fn nr_zones(&self) -> u32 {
        self.nr_zones
    }
    #[inline]
    pub fn nr_domains(&self) -> u32 {
        self.nr_domains
    }
    #[inline]
    pub fn nr_realms(&self) -> u32 {
        self.nr_realms
    }
    #[inline]
    pub fn nr_open_zones(&self) -> u32 {
        self.nr_open_zones
    }
    #[inline]
    pub fn max_activate(&self) -> u32 {
        self.max_activate
    }
    #[inline]
    pub fn nr_actv_zones(&self) -> u32 {
        self.nr_actv_zones
    }
    #[inline]
    pub fn wp_check(&self) -> bool {
        self.wp_check
    }
    #[inline]
    pub fn realms_feat_set(&self) -> bool {
        self.realms_feat_set
    }
    #[inline]
    pub fn have_gaps(&self) -> bool {
        self.have_gaps
    }
    #[inline]
    pub fn config(&self) -> &DevConfig {
        &self.cfg
    }

    /// Consume the device, returning the backing store.
    pub fn into_io(self) -> IO {
        self.io
    }
    #[inline]
    pub fn stats(&self) -> &DevStats {
        &self.stats
    }
    #[inline]
    pub fn stats_mut(&mut self) -> &mut DevStats {
        &mut self.stats
    }
    #[inline]
    pub fn zone_at(&self, idx: u32) -> &Zone {
        self.meta.zone(idx)
    }
    #[inline]
    pub fn realm_at(&self, idx: u32) -> &ZoneRealm {
        self.meta.realm(idx)
    }

    pub fn domains(&self) -> &[ZoneDomain] {
        &self.meta.header().domains[..self.nr_domains as usize]
    }

    #[inline]
    pub fn domain(&self, id: u32) -> &ZoneDomain {
        &self.meta.header().domains[id as usize]
    }

    /// Domain ID hosting the given zone type.
    #[inline]
    pub fn domain_id_of_type(&self, zt: ZoneType) -> Option<u32> {
        self.zone_type_to_dom[zt as usize - 1].map(u32::from)
    }

    /// Domain ID of a zone. Gap zones are in no domain.
    pub fn domain_of_zone(&self, zone_idx: u32) -> Option<u32> {
        let zone = self.meta.zone(zone_idx);
        if zone.is_gap() {
            return None;
        }
        self.domains()
            .iter()
            .position(|d| zone.start <= d.end_lba)
            .map(|i| i as u32)
    }

    /// Check an LBA range against the logical capacity.
    #[inline]
    pub fn lba_out_of_range(&self, lba: u64, nr_lbas: u64) -> bool {
        lba >= self.logical_capacity
            || lba + nr_lbas > self.logical_capacity
            || lba.checked_add(nr_lbas).is_none()
    }

    /// Get the zone index for an LBA. With `lowest`, the LBA must be the
    /// zone start.
    pub fn get_zone(&self, lba: u64, lowest: bool) -> Option<u32> {
        let zno = (lba >> self.zone_log2) as u32;
        if zno >= self.nr_zones {
            warn!(
                "zone {} for LBA {} exceeds the highest zone {}",
                zno,
                lba,
                self.nr_zones.saturating_sub(1)
            );
            return None;
        }
        if lowest && lba != self.meta.zone(zno).start {
            warn!("zone {}: LBA {} not aligned to start", zno, lba);
            return None;
        }
        Some(zno)
    }

    /// Look up the realm containing `lba` by binary search within its
    /// domain's realm subrange. With `lowest`, the LBA must be the start
    /// of the realm. Returns the realm index and the addressed zone type.
    pub fn get_zone_realm(&self, lba: u64, lowest: bool) -> Option<(u32, ZoneType)> {
        let d = self.domains().iter().find(|d| d.contains(lba))?;
        let zt = d.zone_type()?;

        let realms = self.meta.realms();
        let mut l = 0i64;
        let mut h = self.nr_realms as i64 - 1;
        let mut r = 0i64;
        let mut rlba = 0u64;
        while l <= h {
            r = (l + h) / 2;
            rlba = realms[r as usize].start(zt);
            if rlba == lba {
                break;
            }
            if rlba < lba {
                l = r + 1;
            } else {
                h = r - 1;
            }
        }
        if lba < rlba {
            if r == 0 {
                return None;
            }
            r -= 1;
            rlba = realms[r as usize].start(zt);
        }

        let rlen = realms[r as usize].length(zt);
        if rlen != 0 {
            let rend = rlba + ((rlen as u64) << self.zone_log2);
            if lba < rlba || lba >= rend {
                warn!("LBA {} not in realm {} [{}+{}]", lba, r, rlba, rlen);
                return None;
            }
        }

        if lowest && lba != rlba {
            debug!("realm start LBA mismatch, {} vs {}", lba, rlba);
            return None;
        }

        Some((r as u32, zt))
    }

    /// Number of zones that are neither inactive nor offline in a domain.
    pub fn count_active_domain_zones(&self, domain_id: u32) -> u32 {
        let d = self.domain(domain_id);
        let Some(start) = self.get_zone(d.start_lba, false) else {
            return 0;
        };
        let mut active = 0;
        for idx in start..start + d.nr_zones {
            let z = self.meta.zone(idx);
            if !z.is_inactive() && !z.is_offline() {
                active += 1;
            }
        }
        active
    }

    // === Flush / maintenance commands ===

    /// SYNCHRONIZE CACHE: flush data and metadata.
    pub fn sync_cache(&mut self) -> ZbcResult {
        self.meta
            .flush(&mut self.io)
            .map_err(|_| ZbcError::WriteError)
    }

    /// MUTATE: change the device personality, reformatting metadata while
    /// keeping the backing file. The data region is not rewritten; stale
    /// bytes survive a mutation but stay unreachable behind the fresh
    /// write pointers.
    pub fn mutate(&mut self, dev_type: DeviceType, model: u32) -> ZbcResult {
        if !self.force_mutate && self.dev_type == dev_type && self.dev_model == model {
            debug!("MUTATE to the current type {:?} / model {}", dev_type, model);
            return Ok(());
        }
        self.force_mutate = false;

        if DevProfile::find(dev_type, model).is_none() {
            warn!("MUTATE, unknown device type {:?} / model {}", dev_type, model);
            return Err(ZbcError::InvalidFieldInCdb);
        }

        let prev_type = self.dev_type;
        let prev_model = self.dev_model;
        self.dev_type = dev_type;
        self.dev_model = model;

        if self.format_meta(true).is_err() {
            warn!(
                "MUTATE format failed, reverting to type {:?} / model {}",
                prev_type, prev_model
            );
            self.dev_type = prev_type;
            self.dev_model = prev_model;
            if self.format_meta(true).is_err() {
                // Last resort: the configured personality and geometry.
                self.dev_type = self.cfg.dev_type;
                self.dev_model = self.cfg.dev_model;
                self.cfg.zone_size = self.cfg.zone_size_cfgstr;
                self.cfg.realm_size = self.cfg.realm_size_cfgstr;
                self.cfg.smr_gain = self.cfg.smr_gain_cfgstr;
                let _ = self.format_meta(true);
            }
            return Err(ZbcError::Internal("mutation format failed"));
        }

        self.recount_zones();
        Ok(())
    }

    /// SANITIZE: reformat metadata to well-defined initial conditions.
    /// The device keeps its current mutation; media is not erased.
    pub fn sanitize_reset(&mut self) -> ZbcResult {
        if self.format_meta(true).is_err() {
            return Err(ZbcError::Internal("sanitize format failed"));
        }
        self.recount_zones();
        Ok(())
    }

    /// FORMAT UNIT: reformat metadata, resetting the mutation back to the
    /// originally configured personality.
    pub fn format_unit(&mut self) -> ZbcResult {
        self.dev_type = self.cfg.dev_type;
        self.dev_model = self.cfg.dev_model;
        if self.format_meta(false).is_err() {
            return Err(ZbcError::Internal("format failed"));
        }
        self.recount_zones();
        Ok(())
    }

    // === MODE SELECT controls ===

    /// Turn unrestricted reads (URSWRZ) on or off.
    pub fn set_urswrz(&mut self, urswrz: u8) {
        if urswrz == 0x00 || urswrz == 0x01 {
            let enable = urswrz == 0x01;
            if self.wp_check == enable {
                debug!("turning URSWRZ {}", if enable { "on" } else { "off" });
                self.wp_check = !enable;
                self.meta.header_mut().wp_check = if enable { 0 } else { 1 };
            }
        }
    }

    /// Set the default number of zones to activate (FSNOZ).
    /// Fails if the value exceeds the MAXIMUM ACTIVATION limit.
    pub fn set_fsnoz(&mut self, fsnoz: u32) -> bool {
        if fsnoz != 0 && fsnoz != self.nr_actv_zones {
            if self.max_activate != 0 && fsnoz > self.max_activate {
                warn!(
                    "subsequent number of zones {} too large, max {}",
                    fsnoz, self.max_activate
                );
                return false;
            }
            debug!("setting FSNOZ to {fsnoz}");
            self.nr_actv_zones = fsnoz;
            self.meta.header_mut().nr_actv_zones = fsnoz;
        }
        true
    }

    /// Set the MAXIMUM ACTIVATION value in zones. Zero or a value above
    /// the zone count means unlimited. FSNOZ is dragged down if needed.
    pub fn set_max_activation(&mut self, max_activate: u32) {
        if max_activate == self.max_activate {
            return;
        }
        if max_activate == 0 || max_activate > self.nr_zones {
            debug!("setting unlimited MAX ACTIVATION");
            self.max_activate = 0;
            self.meta.header_mut().max_activate = 0;
        } else {
            debug!("setting MAX ACTIVATION to {max_activate} zones");
            self.max_activate = max_activate;
            self.meta.header_mut().max_activate = max_activate;
            if self.nr_actv_zones > max_activate {
                debug!("changing FSNOZ to {max_activate}");
                self.nr_actv_zones = max_activate;
                self.meta.header_mut().nr_actv_zones = max_activate;
            }
        }
    }
}

/// Rescale a value in `[1, old_max]` to `[1, new_max]` by linear
/// interpolation, clamped to the target range.
pub(crate) fn rescale_in_range(val: u32, old_max: u32, new_max: u32) -> u32 {
    if old_max <= 1 || new_max == 0 {
        return new_max.max(1);
    }
    let res = ((new_max as f64 - 1.0) * (val as f64 - old_max as f64)
        / (old_max as f64 - 1.0)
        + new_max as f64) as i64;
    res.clamp(1, new_max as i64) as u32
}
