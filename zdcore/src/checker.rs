// SPDX-License-Identifier: MIT

//! Metadata validator.
//!
//! Re-derives the device geometry from the header and walks every zone,
//! zone list, domain and realm checking the persisted invariants. Any
//! Error-severity finding at open time triggers an unconditional
//! reformat; no in-place repair is attempted.

use core::cmp::Ordering;
use core::fmt;

use zdio::prelude::*;

use crate::config::DevConfig;
use crate::device::Device;
use crate::meta::{ListId, MetaHeader, META_MAGIC, NO_WP};
use crate::types::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(s: Severity) -> u8 {
            match s {
                Severity::Info => 0,
                Severity::Warn => 1,
                Severity::Error => 2,
            }
        }
        rank(*self).cmp(&rank(*other))
    }
}

#[derive(Clone, Debug)]
pub struct Finding {
    pub sev: Severity,
    pub code: &'static str,
    pub msg: String,
}

impl Finding {
    pub fn info(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Info,
            code,
            msg: msg.into(),
        }
    }
    pub fn warn(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Warn,
            code,
            msg: msg.into(),
        }
    }
    pub fn err(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Error,
            code,
            msg: msg.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    pub findings: Vec<Finding>,
}

impl VerifyReport {
    pub fn push(&mut self, f: Finding) {
        self.findings.push(f)
    }

    pub fn has_error(&self) -> bool {
        self.findings.iter().any(|f| f.sev == Severity::Error)
    }

    pub fn ok(&self) -> bool {
        !self.has_error()
    }

    pub fn first_error(&self) -> Option<&Finding> {
        self.findings.iter().find(|f| f.sev == Severity::Error)
    }

    pub fn first_error_code(&self) -> Option<&'static str> {
        self.first_error().map(|f| f.code)
    }

    pub fn count(&self, s: Severity) -> usize {
        self.findings.iter().filter(|f| f.sev == s).count()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for it in &self.findings {
            let tag = match it.sev {
                Severity::Info => "INFO",
                Severity::Warn => "WARN",
                Severity::Error => "ERR ",
            };
            writeln!(f, "{tag}: {:<14} {}", it.code, it.msg)?;
        }
        Ok(())
    }
}

/// Validate the header identity fields against the backing store and the
/// configuration. A failure means the store must be reformatted.
pub fn check_header(
    h: &MetaHeader,
    cfg: Option<&DevConfig>,
    bs_size: u64,
) -> Result<(), &'static str> {
    if h.sizeof_struct != core::mem::size_of::<MetaHeader>() as u64 {
        return Err("header size mismatch");
    }
    if h.bs_size != bs_size {
        return Err("backing store size mismatch");
    }
    if h.magic != META_MAGIC {
        return Err("bad magic");
    }
    if h.backstore_version != crate::meta::BACKSTORE_VERSION {
        return Err("backing store version mismatch");
    }
    // The option string must exactly match the one used at format time.
    if let Some(cfg) = cfg {
        if h.cfg_str() != cfg.cfg_str.as_bytes() {
            return Err("configuration string mismatch");
        }
    }
    if h.lba_size != 512 && h.lba_size != 4096 {
        return Err("bad LBA size");
    }
    Ok(())
}

/// Walk the zone lists, domains, realms and zones of an adopted metadata
/// region, verifying every structural invariant.
pub fn check_structure<IO: BlockIO + BlockIOSetLen>(dev: &Device<IO>) -> VerifyReport {
    let mut rep = VerifyReport::default();

    check_zone_lists(dev, &mut rep);
    if dev.is_zd() {
        check_zone_domains(dev, &mut rep);
        for rno in 0..dev.nr_realms() {
            check_zone_realm(dev, rno, &mut rep);
        }
    }
    for zno in 0..dev.meta.nr_zones() {
        if let Err(code) = check_zone(dev, zno) {
            rep.push(Finding::err(
                "ZONE.INVALID",
                format!("zone {zno} failed check #{code}"),
            ));
            break;
        }
    }
    if rep.findings.is_empty() {
        rep.push(Finding::info("META.OK", "metadata structure validated"));
    }

    rep
}

/// Check one zone record: type validity for the device type, condition
/// against write pointer, contiguity and alignment. Returns the failed
/// check number.
fn check_zone<IO: BlockIO + BlockIOSetLen>(dev: &Device<IO>, zno: u32) -> Result<(), u32> {
    let z = dev.meta.zone(zno);

    match ZoneType::from_raw(z.ztype) {
        Some(ZoneType::Conventional) => {}
        Some(ZoneType::SeqOrBefReq) => {
            if !dev.is_zd() {
                return Err(1);
            }
        }
        Some(ZoneType::SeqWriteReq) => {
            if dev.is_ha() {
                return Err(2);
            }
        }
        Some(ZoneType::SeqWritePref) => {
            if dev.is_hm() {
                return Err(3);
            }
        }
        Some(ZoneType::Gap) => {
            if !dev.is_zd() {
                return Err(4);
            }
        }
        None => return Err(5),
    }

    match ZoneCond::from_raw(z.cond) {
        Some(ZoneCond::NotWp) => {
            if !z.is_conv() && !z.is_gap() {
                return Err(6);
            }
            if z.wp != NO_WP {
                return Err(7);
            }
        }
        Some(ZoneCond::Offline) | Some(ZoneCond::ReadOnly) => {
            if z.wp != NO_WP {
                return Err(7);
            }
        }
        Some(ZoneCond::Empty) => {
            if z.is_conv() {
                return Err(8);
            }
            if z.wp != z.start {
                return Err(9);
            }
        }
        Some(ZoneCond::ExpOpen) | Some(ZoneCond::Closed) => {
            if z.is_cmr() {
                return Err(10);
            }
        }
        Some(ZoneCond::ImpOpen) => {
            if z.is_conv() {
                return Err(11);
            }
            if z.wp < z.start || z.wp >= z.end() {
                return Err(12);
            }
        }
        Some(ZoneCond::Full) => {
            if z.is_conv() {
                return Err(13);
            }
            if z.is_sobr() {
                if z.wp != NO_WP {
                    return Err(14);
                }
            } else if z.wp != z.end() {
                return Err(15);
            }
        }
        Some(ZoneCond::Inactive) => {
            if !dev.is_zd() {
                return Err(16);
            }
            if z.wp != NO_WP {
                return Err(17);
            }
        }
        None => return Err(18),
    }

    if zno > 0 {
        let prev = dev.meta.zone(zno - 1);
        if prev.start + prev.len != z.start {
            return Err(19);
        }
    }
    if z.start % dev.zone_size() != 0 || z.len > dev.zone_size() {
        return Err(20);
    }

    Ok(())
}

/// Check that all four zone lists are self-consistent and that their
/// membership matches the zone conditions.
fn check_zone_lists<IO: BlockIO + BlockIOSetLen>(dev: &Device<IO>, rep: &mut VerifyReport) {
    let cases: [(ListId, &'static str, fn(&crate::meta::Zone) -> bool); 3] = [
        (ListId::ImpOpen, "LIST.IMPOPEN", |z| z.is_imp_open()),
        (ListId::ExpOpen, "LIST.EXPOPEN", |z| z.is_exp_open()),
        (ListId::Closed, "LIST.CLOSED", |z| z.is_closed()),
    ];

    for (id, code, cond) in cases {
        if let Err(n) = dev.meta.check_list(id) {
            rep.push(Finding::err(code, format!("list check #{n} failed")));
            continue;
        }
        let mut cur = dev.meta.list_first(id);
        while let Some(idx) = cur {
            let z = dev.meta.zone(idx);
            if z.is_conv() {
                rep.push(Finding::err(code, format!("conventional zone {idx} linked")));
                return;
            }
            if !cond(z) {
                rep.push(Finding::err(
                    code,
                    format!("zone {idx} in wrong condition {:#x}", z.cond),
                ));
                return;
            }
            cur = dev.meta.list_next(idx);
        }
        let expect = dev.meta.zones().iter().filter(|z| cond(z)).count() as u32;
        if expect != dev.meta.list(id).size {
            rep.push(Finding::err(
                code,
                format!("{} zones in condition, list size {}", expect, dev.meta.list(id).size),
            ));
        }
    }

    // The sequentially-writeable active list holds exactly the empty and
    // full zones of the sequential and SOBR types.
    let id = ListId::SeqActive;
    if let Err(n) = dev.meta.check_list(id) {
        rep.push(Finding::err("LIST.SEQACTIVE", format!("list check #{n} failed")));
        return;
    }
    let mut cur = dev.meta.list_first(id);
    while let Some(idx) = cur {
        let z = dev.meta.zone(idx);
        if z.is_conv()
            || z.is_closed()
            || z.is_imp_open()
            || z.is_inactive()
            || z.is_offline()
            || z.is_rdonly()
        {
            rep.push(Finding::err(
                "LIST.SEQACTIVE",
                format!("zone {idx} in wrong condition {:#x}", z.cond),
            ));
            return;
        }
        cur = dev.meta.list_next(idx);
    }
    let expect = dev
        .meta
        .zones()
        .iter()
        .filter(|z| (z.is_seq() || z.is_sobr()) && (z.is_empty() || z.is_full()))
        .count() as u32;
    if expect != dev.meta.list(id).size {
        rep.push(Finding::err(
            "LIST.SEQACTIVE",
            format!("{} active zones, list size {}", expect, dev.meta.list(id).size),
        ));
    }
}

/// Check the zone domain table against the profile and the geometry.
fn check_zone_domains<IO: BlockIO + BlockIOSetLen>(dev: &Device<IO>, rep: &mut VerifyReport) {
    let feat = dev.profile();
    let domains = dev.domains();

    if domains.is_empty() {
        rep.push(Finding::err("DOM.COUNT", "no zone domains"));
        return;
    }
    if domains[0].start_lba != 0 {
        rep.push(Finding::err("DOM.START", "first domain not at LBA 0"));
        return;
    }

    for (i, d) in domains.iter().enumerate() {
        if d.end_lba == 0 {
            rep.push(Finding::err("DOM.RANGE", format!("domain {i} has no end LBA")));
            return;
        }
        if d.start_lba % dev.zone_size() != 0 || (d.end_lba + 1) % dev.zone_size() != 0 {
            rep.push(Finding::err("DOM.ALIGN", format!("domain {i} not zone aligned")));
            return;
        }
        if d.end_lba - d.start_lba > dev.phys_capacity {
            rep.push(Finding::err("DOM.RANGE", format!("domain {i} exceeds capacity")));
            return;
        }
        if i > 0 {
            let prev = &domains[i - 1];
            if d.start_lba <= prev.start_lba || d.start_lba <= prev.end_lba {
                rep.push(Finding::err("DOM.ORDER", format!("domain {i} overlaps or descends")));
                return;
            }
        }
        if d.nr_zones as u64 != (d.end_lba + 1 - d.start_lba) / dev.zone_size() {
            rep.push(Finding::err("DOM.ZONES", format!("domain {i} zone count wrong")));
            return;
        }
        match d.zone_type() {
            Some(zt) if zt != ZoneType::Gap && feat.supports_type(zt) => {}
            _ => {
                rep.push(Finding::err("DOM.TYPE", format!("domain {i} type unsupported")));
                return;
            }
        }
    }

    // Every supported type must have exactly one domain, on the correct
    // media side.
    for (zt, smr_side) in [
        (ZoneType::Conventional, false),
        (ZoneType::SeqWriteReq, true),
        (ZoneType::SeqWritePref, true),
        (ZoneType::SeqOrBefReq, false),
    ] {
        if !feat.supports_type(zt) {
            continue;
        }
        let matching: Vec<_> = domains.iter().filter(|d| d.dtype == zt as u8).collect();
        if matching.len() != 1 {
            rep.push(Finding::err(
                "DOM.TYPE",
                format!("{} domains of type {:#x}", matching.len(), zt as u8),
            ));
            return;
        }
        if matching[0].is_smr() != smr_side {
            rep.push(Finding::err(
                "DOM.SIDE",
                format!("domain of type {:#x} on wrong media side", zt as u8),
            ));
            return;
        }
    }
}

/// Validate the metadata entry of one zone realm.
fn check_zone_realm<IO: BlockIO + BlockIOSetLen>(
    dev: &Device<IO>,
    rno: u32,
    rep: &mut VerifyReport,
) {
    let fail = |rep: &mut VerifyReport, n: u32| {
        rep.push(Finding::err(
            "REALM.INVALID",
            format!("realm {rno} failed check #{n}"),
        ));
    };

    let r = dev.meta.realm(rno);

    let Some(rtype) = r.realm_type() else {
        return fail(rep, 1);
    };
    if rtype == ZoneType::Gap {
        return fail(rep, 1);
    }
    if r.flags & !ActvFlags::all().bits() != 0 {
        return fail(rep, 2);
    }
    if r.number != rno {
        return fail(rep, 3);
    }
    if r.number >= dev.nr_realms() {
        return fail(rep, 4);
    }

    // Cross-check the current realm type with its domain.
    let Some(dom_id) = dev.domain_id_of_type(rtype) else {
        return fail(rep, 5);
    };
    if dev.domain(dom_id).dtype != rtype as u8 {
        return fail(rep, 6);
    }

    let mut activity = [false; NR_ZONE_TYPES];
    let mut realm_available = true;

    for slot in 0..NR_ZONE_TYPES {
        let zt = ZoneType::from_raw(slot as u8 + 1).expect("slot types are valid");
        let ri = *r.item(zt);
        if ri.length == 0 {
            if ri.start_lba != 0 {
                return fail(rep, 7);
            }
            if r.can_actv_as(zt) {
                return fail(rep, 8);
            }
            continue;
        }

        let Some(dom_id) = dev.domain_id_of_type(zt) else {
            return fail(rep, 9);
        };
        let d = *dev.domain(dom_id);
        if d.dtype != zt as u8 {
            return fail(rep, 10);
        }

        // Realm subranges lie within their domains, at full per-type
        // realm length.
        if d.is_smr() {
            if ri.length != dev.nr_smr_realm_zones {
                return fail(rep, 11);
            }
        } else if ri.length != dev.nr_cmr_realm_zones {
            return fail(rep, 12);
        }
        if ri.start_lba < d.start_lba {
            return fail(rep, 13);
        }
        let realm_sz = (ri.length as u64) << dev.zone_size().trailing_zeros();
        if ri.start_lba + realm_sz - 1 > d.end_lba {
            return fail(rep, 14);
        }
        if ri.start_lba % dev.zone_size() != 0 {
            return fail(rep, 15);
        }
        if ri.start_zone >= dev.meta.nr_zones() {
            return fail(rep, 16);
        }
        if !r.can_actv_as(zt) {
            return fail(rep, 17);
        }
        let Some(start_zone) = dev.get_zone(ri.start_lba, true) else {
            return fail(rep, 18);
        };

        // The first zone that is not read-only/offline decides whether
        // this set is active; the rest must agree.
        let mut zone_inact = false;
        let mut decided = None;
        for (j, idx) in (start_zone..start_zone + ri.length).enumerate() {
            let z = dev.meta.zone(idx);
            if d.is_smr() != z.is_seq() {
                return fail(rep, 19);
            }
            if !z.is_rdonly() && !z.is_offline() {
                zone_inact = z.is_inactive();
                decided = Some(j);
                break;
            }
        }

        // All zones of this (domain x realm) set may be unavailable.
        let Some(first) = decided else {
            realm_available = false;
            continue;
        };

        for idx in start_zone + first as u32..start_zone + ri.length {
            let z = dev.meta.zone(idx);
            if d.is_smr() != z.is_seq() {
                return fail(rep, 20);
            }
            if !z.is_rdonly() && !z.is_offline() && z.is_inactive() != zone_inact {
                return fail(rep, 21);
            }
        }
        activity[slot] = !zone_inact;
    }

    // Exactly one set of zones is active in a realm, unless the whole
    // realm is read-only/offline.
    if realm_available && activity.iter().filter(|&&a| a).count() != 1 {
        fail(rep, 22);
    }
}
