// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use zdio::prelude::*;

use crate::types::{ZoneCond, ZoneType};

/// Metadata magic: 'H' 'Z' 'B' 'C'.
pub const META_MAGIC: u32 =
    (b'H' as u32) << 24 | (b'Z' as u32) << 16 | (b'B' as u32) << 8 | b'C' as u32;

/// Version of the backing-store format (only change if incompatible).
pub const BACKSTORE_VERSION: u32 = 1;

/// A special value to indicate that a zone write pointer is invalid.
pub const NO_WP: u64 = u64::MAX;

/// Zone list terminator index.
pub const LIST_NIL: u32 = u32::MAX;

/// Maximum number of zone domains.
pub const MAX_DOMAINS: usize = 4;

/// Capacity of the cached configuration string in the header.
pub const CFG_STR_SIZE: usize = 512;

/// The metadata region is sized up to this alignment.
pub const META_ALIGN: u64 = 4096;

/// Set for SMR domains. Internal, not a part of the command set.
pub const DFLG_SMR: u8 = 0x01;

/// Metadata zone descriptor.
///
/// `prev`/`next` keep the on-disk three-state link encoding: both zero
/// means "not in any list" (freshly formatted zones), `LIST_NIL` is the
/// list terminator. Any linked zone has at least one non-zero link or is
/// referenced by a list head. All link manipulation goes through
/// `MetaStore`, never through a `Zone` alone.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct Zone {
    /// Zone start LBA.
    pub start: u64,
    /// Zone length in LBAs.
    pub len: u64,
    /// Write pointer position, or `NO_WP`.
    pub wp: u64,
    /// Next zone in list.
    pub next: u32,
    /// Previous zone in list.
    pub prev: u32,
    /// Zone type.
    pub ztype: u8,
    /// Zone condition.
    pub cond: u8,
    /// Non-sequential write resources active.
    pub non_seq: u8,
    /// Reset write pointer recommended.
    pub reset: u8,
    pub reserved: [u8; 28],
}

impl Zone {
    #[inline]
    pub fn zone_type(&self) -> Option<ZoneType> {
        ZoneType::from_raw(self.ztype)
    }

    #[inline]
    pub fn condition(&self) -> Option<ZoneCond> {
        ZoneCond::from_raw(self.cond)
    }

    #[inline]
    pub fn set_cond(&mut self, cond: ZoneCond) {
        self.cond = cond as u8;
    }

    // Type tests.
    #[inline]
    pub fn is_conv(&self) -> bool {
        self.ztype == ZoneType::Conventional as u8
    }
    #[inline]
    pub fn is_seq_req(&self) -> bool {
        self.ztype == ZoneType::SeqWriteReq as u8
    }
    #[inline]
    pub fn is_seq_pref(&self) -> bool {
        self.ztype == ZoneType::SeqWritePref as u8
    }
    #[inline]
    pub fn is_sobr(&self) -> bool {
        self.ztype == ZoneType::SeqOrBefReq as u8
    }
    #[inline]
    pub fn is_gap(&self) -> bool {
        self.ztype == ZoneType::Gap as u8
    }
    /// Sequential family: SWR or SWP.
    #[inline]
    pub fn is_seq(&self) -> bool {
        self.is_seq_req() || self.is_seq_pref()
    }
    /// Non-WP family: conventional or SOBR.
    #[inline]
    pub fn is_cmr(&self) -> bool {
        self.is_conv() || self.is_sobr()
    }

    // Condition tests.
    #[inline]
    pub fn is_not_wp(&self) -> bool {
        self.cond == ZoneCond::NotWp as u8
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cond == ZoneCond::Empty as u8
    }
    #[inline]
    pub fn is_imp_open(&self) -> bool {
        self.cond == ZoneCond::ImpOpen as u8
    }
    #[inline]
    pub fn is_exp_open(&self) -> bool {
        self.cond == ZoneCond::ExpOpen as u8
    }
    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_imp_open() || self.is_exp_open()
    }
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.cond == ZoneCond::Closed as u8
    }
    #[inline]
    pub fn is_inactive(&self) -> bool {
        self.cond == ZoneCond::Inactive as u8
    }
    #[inline]
    pub fn is_rdonly(&self) -> bool {
        self.cond == ZoneCond::ReadOnly as u8
    }
    #[inline]
    pub fn is_full(&self) -> bool {
        self.cond == ZoneCond::Full as u8
    }
    #[inline]
    pub fn is_offline(&self) -> bool {
        self.cond == ZoneCond::Offline as u8
    }

    /// True if the zone is not currently included in any zone list.
    #[inline]
    pub fn not_in_list(&self) -> bool {
        self.prev == 0 && self.next == 0
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// REPORT ZONES filter for one reporting option.
    pub fn matches_report_option(&self, ro: crate::types::RzReportOption) -> bool {
        use crate::types::RzReportOption as Ro;
        match ro {
            Ro::All => true,
            Ro::Empty => self.is_empty(),
            Ro::ImpOpen => self.is_imp_open(),
            Ro::ExpOpen => self.is_exp_open(),
            Ro::Closed => self.is_closed(),
            Ro::Full => self.is_full(),
            Ro::ReadOnly => self.is_rdonly(),
            Ro::Offline => self.is_offline(),
            Ro::Inactive => self.is_inactive(),
            Ro::RwpRecommended => self.reset != 0,
            Ro::NonSeq => self.non_seq != 0,
            Ro::Gap => self.is_gap(),
            Ro::NotWp => self.is_not_wp(),
        }
    }
}

/// Metadata zone domain descriptor.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct ZoneDomain {
    /// Domain start LBA.
    pub start_lba: u64,
    /// Domain end LBA (inclusive).
    pub end_lba: u64,
    /// Number of zones in this domain.
    pub nr_zones: u32,
    /// The type of zones in this domain.
    pub dtype: u8,
    /// Zone domain flags.
    pub flags: u8,
    pub reserved: [u8; 10],
}

impl ZoneDomain {
    #[inline]
    pub fn is_smr(&self) -> bool {
        self.flags & DFLG_SMR != 0
    }
    #[inline]
    pub fn is_cmr(&self) -> bool {
        !self.is_smr()
    }
    #[inline]
    pub fn zone_type(&self) -> Option<ZoneType> {
        ZoneType::from_raw(self.dtype)
    }
    #[inline]
    pub fn contains(&self, lba: u64) -> bool {
        lba >= self.start_lba && lba <= self.end_lba
    }
}

/// Metadata for a specific zone type in a realm.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct RealmItem {
    /// Realm start LBA for this type.
    pub start_lba: u64,
    /// Length in zones.
    pub length: u32,
    /// Index of the realm's first zone.
    pub start_zone: u32,
}

/// Metadata zone realm descriptor. The `ri` array is indexed by
/// `zone type - 1`, one slot per supported type; unsupported types have
/// zero-length slots.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct ZoneRealm {
    /// Realm number.
    pub number: u32,
    /// Realm current zone type.
    pub rtype: u8,
    /// Realm activation flags (one bit per zone type).
    pub flags: u8,
    /// Realm restrictions.
    pub restr: u8,
    pub reserved: u8,
    pub ri: [RealmItem; crate::types::NR_ZONE_TYPES],
}

impl ZoneRealm {
    #[inline]
    pub fn item(&self, zt: ZoneType) -> &RealmItem {
        &self.ri[zt as usize - 1]
    }

    #[inline]
    pub fn item_mut(&mut self, zt: ZoneType) -> &mut RealmItem {
        &mut self.ri[zt as usize - 1]
    }

    /// Check the activation flags to see if this realm can be
    /// activated to the given zone type.
    #[inline]
    pub fn can_actv_as(&self, zt: ZoneType) -> bool {
        self.flags & (1 << (zt as u8 - 1)) != 0
    }

    #[inline]
    pub fn start(&self, zt: ZoneType) -> u64 {
        self.item(zt).start_lba
    }

    #[inline]
    pub fn length(&self, zt: ZoneType) -> u32 {
        self.item(zt).length
    }

    #[inline]
    pub fn start_zone(&self, zt: ZoneType) -> u32 {
        self.item(zt).start_zone
    }

    #[inline]
    pub fn realm_type(&self) -> Option<ZoneType> {
        ZoneType::from_raw(self.rtype)
    }

    #[inline]
    pub fn is_seq(&self) -> bool {
        self.rtype == ZoneType::SeqWriteReq as u8 || self.rtype == ZoneType::SeqWritePref as u8
    }
}

/// Zone list head/tail, stored in the header.
///
/// If the list is empty, both `head` and `tail` are `LIST_NIL` and
/// `size` is zero.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct ZoneListHead {
    pub head: u32,
    pub tail: u32,
    pub size: u32,
    pub reserved: u32,
}

impl ZoneListHead {
    pub const EMPTY: ZoneListHead = ZoneListHead {
        head: LIST_NIL,
        tail: LIST_NIL,
        size: 0,
        reserved: 0,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Persisted device metadata header.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct MetaHeader {
    /// Magic.
    pub magic: u32,
    /// Version of the backing-store format.
    pub backstore_version: u32,
    /// Size of this structure in the backing store (self-describing).
    pub sizeof_struct: u64,
    /// Backing file size in bytes.
    pub bs_size: u64,
    /// Device type. Can be changed via mutation.
    pub dev_type: u32,
    /// Device model, can be changed via mutation.
    pub dev_model: u32,
    /// Emulated device maximum physical capacity in LBAs.
    pub phys_capacity: u64,
    /// Zone realm size in LBAs.
    pub realm_size: u64,
    /// Number of realms.
    pub nr_realms: u32,
    /// LBA size in bytes.
    pub lba_size: u32,
    /// Zone domains. Active domains have a non-zero end LBA.
    pub domains: [ZoneDomain; MAX_DOMAINS],
    /// Capacity gain from going from CMR to SMR, in percent.
    pub smr_gain: u32,
    /// MAXIMUM ACTIVATION in zones, 0 = unlimited.
    pub max_activate: u32,
    /// If zero, unrestricted reads (URSWRZ) are enabled.
    pub wp_check: u32,
    /// If one, the Realms feature set is enabled.
    pub realms_feat_set: u32,
    /// Default number of zones to process by ZONE ACTIVATE (FSNOZ).
    pub nr_actv_zones: u32,
    /// Zone size in LBAs.
    pub zone_size: u32,
    /// Number of zones.
    pub nr_zones: u32,
    /// Number of conventional zones.
    pub nr_conv_zones: u32,
    /// Maximum/optimal number of open zones.
    pub nr_open_zones: u32,
    /// List of implicitly open zones.
    pub imp_open_zones: ZoneListHead,
    /// List of explicitly open zones.
    pub exp_open_zones: ZoneListHead,
    /// List of closed zones.
    pub closed_zones: ZoneListHead,
    /// List of write-pointer zones that are not open or closed.
    pub seq_active_zones: ZoneListHead,
    pub reserved: u32,
    /// Compatible extensibility.
    pub pad: [u64; 10],
    /// Cached config string to avoid excessive reformats.
    pub cfg_str: [u8; CFG_STR_SIZE],
}

impl MetaHeader {
    /// The configuration string saved at format time.
    pub fn cfg_str(&self) -> &[u8] {
        let end = self
            .cfg_str
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CFG_STR_SIZE);
        &self.cfg_str[..end]
    }

    pub fn set_cfg_str(&mut self, s: &str) {
        self.cfg_str = [0u8; CFG_STR_SIZE];
        let n = s.len().min(CFG_STR_SIZE - 1);
        self.cfg_str[..n].copy_from_slice(&s.as_bytes()[..n]);
    }
}

/// The four global zone lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListId {
    ImpOpen,
    ExpOpen,
    Closed,
    SeqActive,
}

/// Return the metadata region size for the given geometry, aligned up to
/// `META_ALIGN`.
pub fn meta_size(nr_realms: u32, nr_zones: u32) -> u64 {
    let raw = core::mem::size_of::<MetaHeader>() as u64
        + nr_realms as u64 * core::mem::size_of::<ZoneRealm>() as u64
        + nr_zones as u64 * core::mem::size_of::<Zone>() as u64;
    (raw + META_ALIGN - 1) & !(META_ALIGN - 1)
}

/// The owned metadata region: header, realm array and zone array in one
/// buffer with typed zerocopy views.
///
/// This is the in-memory image of the on-disk metadata; `flush` writes it
/// back in a single pass. The buffer is backed by `u64` storage so every
/// sub-view is naturally aligned.
pub struct MetaStore {
    buf: Vec<u64>,
    nr_realms: u32,
    nr_zones: u32,
}

impl MetaStore {
    const HDR_SIZE: usize = core::mem::size_of::<MetaHeader>();
    const REALM_SIZE: usize = core::mem::size_of::<ZoneRealm>();
    const ZONE_SIZE: usize = core::mem::size_of::<Zone>();

    /// A zeroed region for the given geometry.
    pub fn new(nr_realms: u32, nr_zones: u32) -> MetaStore {
        let bytes = meta_size(nr_realms, nr_zones);
        MetaStore {
            buf: vec![0u64; (bytes / 8) as usize],
            nr_realms,
            nr_zones,
        }
    }

    /// Load the full metadata region from the backing store.
    pub fn load<IO: BlockIO>(io: &mut IO, nr_realms: u32, nr_zones: u32) -> BlockIOResult<MetaStore> {
        let mut store = MetaStore::new(nr_realms, nr_zones);
        io.read_at(0, store.bytes_mut())?;
        Ok(store)
    }

    /// Read just the header from the backing store.
    pub fn read_header<IO: BlockIO>(io: &mut IO) -> BlockIOResult<MetaHeader> {
        io.read_struct(0)
    }

    /// Write the whole region back and flush the backing store.
    pub fn flush<IO: BlockIO>(&self, io: &mut IO) -> BlockIOResult {
        io.write_at(0, self.bytes())?;
        io.flush()
    }

    #[inline]
    pub fn byte_len(&self) -> u64 {
        (self.buf.len() * 8) as u64
    }

    #[inline]
    pub fn nr_zones(&self) -> u32 {
        self.nr_zones
    }

    #[inline]
    pub fn nr_realms(&self) -> u32 {
        self.nr_realms
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut_bytes()
    }

    #[inline]
    fn zones_offset(&self) -> usize {
        Self::HDR_SIZE + self.nr_realms as usize * Self::REALM_SIZE
    }

    pub fn header(&self) -> &MetaHeader {
        MetaHeader::ref_from_bytes(&self.bytes()[..Self::HDR_SIZE]).expect("header view")
    }

    pub fn header_mut(&mut self) -> &mut MetaHeader {
        MetaHeader::mut_from_bytes(&mut self.bytes_mut()[..Self::HDR_SIZE]).expect("header view")
    }

    pub fn realms(&self) -> &[ZoneRealm] {
        let start = Self::HDR_SIZE;
        let end = start + self.nr_realms as usize * Self::REALM_SIZE;
        <[ZoneRealm]>::ref_from_bytes(&self.bytes()[start..end]).expect("realm view")
    }

    pub fn realms_mut(&mut self) -> &mut [ZoneRealm] {
        let start = Self::HDR_SIZE;
        let end = start + self.nr_realms as usize * Self::REALM_SIZE;
        <[ZoneRealm]>::mut_from_bytes(&mut self.bytes_mut()[start..end]).expect("realm view")
    }

    #[inline]
    pub fn realm(&self, idx: u32) -> &ZoneRealm {
        &self.realms()[idx as usize]
    }

    #[inline]
    pub fn realm_mut(&mut self, idx: u32) -> &mut ZoneRealm {
        &mut self.realms_mut()[idx as usize]
    }

    pub fn zones(&self) -> &[Zone] {
        let start = self.zones_offset();
        let end = start + self.nr_zones as usize * Self::ZONE_SIZE;
        <[Zone]>::ref_from_bytes(&self.bytes()[start..end]).expect("zone view")
    }

    pub fn zones_mut(&mut self) -> &mut [Zone] {
        let start = self.zones_offset();
        let end = start + self.nr_zones as usize * Self::ZONE_SIZE;
        <[Zone]>::mut_from_bytes(&mut self.bytes_mut()[start..end]).expect("zone view")
    }

    #[inline]
    pub fn zone(&self, idx: u32) -> &Zone {
        &self.zones()[idx as usize]
    }

    #[inline]
    pub fn zone_mut(&mut self, idx: u32) -> &mut Zone {
        &mut self.zones_mut()[idx as usize]
    }

    /// Copy a list head out of the header.
    pub fn list(&self, id: ListId) -> ZoneListHead {
        let h = self.header();
        match id {
            ListId::ImpOpen => h.imp_open_zones,
            ListId::ExpOpen => h.exp_open_zones,
            ListId::Closed => h.closed_zones,
            ListId::SeqActive => h.seq_active_zones,
        }
    }

    pub fn set_list(&mut self, id: ListId, head: ZoneListHead) {
        let h = self.header_mut();
        match id {
            ListId::ImpOpen => h.imp_open_zones = head,
            ListId::ExpOpen => h.exp_open_zones = head,
            ListId::Closed => h.closed_zones = head,
            ListId::SeqActive => h.seq_active_zones = head,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_sizes() {
        assert_eq!(core::mem::size_of::<Zone>(), 64);
        assert_eq!(core::mem::size_of::<ZoneDomain>(), 32);
        assert_eq!(core::mem::size_of::<RealmItem>(), 16);
        assert_eq!(core::mem::size_of::<ZoneRealm>(), 72);
        assert_eq!(core::mem::size_of::<ZoneListHead>(), 16);
        assert_eq!(core::mem::size_of::<MetaHeader>() % 8, 0);
    }

    #[test]
    fn test_meta_size_is_aligned() {
        let sz = meta_size(100, 2000);
        assert_eq!(sz % META_ALIGN, 0);
        assert!(sz >= core::mem::size_of::<MetaHeader>() as u64 + 100 * 72 + 2000 * 64);
    }

    #[test]
    fn test_store_views() {
        let mut store = MetaStore::new(4, 32);
        store.header_mut().magic = META_MAGIC;
        store.header_mut().nr_zones = 32;
        store.zone_mut(5).start = 1234;
        store.realm_mut(2).number = 2;

        assert_eq!(store.header().magic, META_MAGIC);
        assert_eq!(store.zone(5).start, 1234);
        assert_eq!(store.realm(2).number, 2);
        assert_eq!(store.zones().len(), 32);
        assert_eq!(store.realms().len(), 4);
    }

    #[test]
    fn test_store_roundtrip_through_io() {
        let mut io = MemBlockIO::with_len(meta_size(2, 8) as usize);
        let mut store = MetaStore::new(2, 8);
        store.header_mut().magic = META_MAGIC;
        store.header_mut().set_cfg_str("dhsmr/@x");
        store.zone_mut(7).wp = NO_WP;
        store.flush(&mut io).unwrap();

        let hdr = MetaStore::read_header(&mut io).unwrap();
        assert_eq!(hdr.magic, META_MAGIC);
        assert_eq!(hdr.cfg_str(), b"dhsmr/@x");

        let back = MetaStore::load(&mut io, 2, 8).unwrap();
        assert_eq!(back.zone(7).wp, NO_WP);
    }

    #[test]
    fn test_cfg_str_truncates() {
        let mut hdr = MetaStore::new(0, 0);
        let long = "x".repeat(CFG_STR_SIZE * 2);
        hdr.header_mut().set_cfg_str(&long);
        assert_eq!(hdr.header().cfg_str().len(), CFG_STR_SIZE - 1);
    }
}
