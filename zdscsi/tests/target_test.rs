// SPDX-License-Identifier: MIT

//! Command-level scenarios against a memory-backed target: the zone
//! state machine, activation, reports and mutation, driven through CDBs
//! the way a host would issue them.

use zdcore::config::DevConfig;
use zdcore::device::Device;
use zdcore::types::{DeviceType, ZoneCond, ZoneType, MO_NZ_GENERIC, MO_ZD_NO_CMR};
use zdio::prelude::*;
use zdscsi::bytes::{cpbe16, cpbe32, cpbe48, cpbe64, rdbe16, rdbe32, rdbe48, rdbe64};
use zdscsi::cmd;
use zdscsi::prelude::*;
use zdscsi::sense::{
    ASC_INSUFFICIENT_ZONE_RESOURCES, ASC_UNALIGNED_WRITE_COMMAND,
};

// 64 KiB zones (128 LBAs), 256 KiB realms (4 SMR / 3 CMR zones), 8 MiB
// capacity, 4 open zones max.
const CFG: &str = "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25/open-4@ttest";
const CAP: u64 = 8 * 1024 * 1024;
const ZONE_LBAS: u64 = 128;

fn make_target(cfgstring: &str) -> Target<MemBlockIO> {
    let mut cfg = DevConfig::parse(cfgstring).unwrap();
    cfg.phys_capacity = CAP;
    let dev = Device::open(MemBlockIO::new(), cfg).unwrap();
    Target::new(dev, "20011405deadbeef")
}

fn run<IO: BlockIO + BlockIOSetLen>(t: &mut Target<IO>, cdb: &[u8], buf: &mut [u8]) -> CmdStatus {
    let mut segs = [buf];
    let mut c = ScsiCommand::new(cdb, SgBuffer::new(&mut segs));
    t.handle_cmd(&mut c)
}

fn write16<IO: BlockIO + BlockIOSetLen>(t: &mut Target<IO>, lba: u64, data: &mut [u8]) -> CmdStatus {
    let mut cdb = [0u8; 16];
    cdb[0] = cmd::WRITE_16;
    cpbe64(&mut cdb[2..], lba);
    cpbe32(&mut cdb[10..], (data.len() / 512) as u32);
    run(t, &cdb, data)
}

fn read16<IO: BlockIO + BlockIOSetLen>(t: &mut Target<IO>, lba: u64, nr: u64) -> (CmdStatus, Vec<u8>) {
    let mut cdb = [0u8; 16];
    cdb[0] = cmd::READ_16;
    cpbe64(&mut cdb[2..], lba);
    cpbe32(&mut cdb[10..], nr as u32);
    let mut buf = vec![0u8; (nr * 512) as usize];
    let st = run(t, &cdb, &mut buf);
    (st, buf)
}

fn zbc_out(t: &mut Target<MemBlockIO>, sa: u8, lba: u64, count: u16, all: bool) -> CmdStatus {
    let mut cdb = [0u8; 16];
    cdb[0] = cmd::ZBC_OUT;
    cdb[1] = sa;
    cpbe64(&mut cdb[2..], lba);
    cpbe16(&mut cdb[12..], count);
    cdb[14] = all as u8;
    run(t, &cdb, &mut [])
}

fn report_zones(
    t: &mut Target<MemBlockIO>,
    lba: u64,
    ro: u8,
    buf: &mut [u8],
) -> CmdStatus {
    let mut cdb = [0u8; 16];
    cdb[0] = cmd::ZBC_IN;
    cdb[1] = cmd::ZBC_SA_REPORT_ZONES;
    cpbe64(&mut cdb[2..], lba);
    cpbe32(&mut cdb[10..], buf.len() as u32);
    cdb[14] = ro;
    run(t, &cdb, buf)
}

/// Find the first descriptor for a zone at `lba` in a REPORT ZONES reply.
fn zone_desc(buf: &[u8], lba: u64) -> Option<(u8, u8, u64, u64)> {
    let total = rdbe32(&buf[0..]) as usize / 64;
    for i in 0..total {
        let d = &buf[64 + i * 64..];
        if d.len() < 64 {
            break;
        }
        if rdbe64(&d[16..]) == lba {
            return Some((d[0] & 0x0f, d[1] >> 4, rdbe64(&d[8..]), rdbe64(&d[24..])));
        }
    }
    None
}

fn seq_domain_start<IO: BlockIO + BlockIOSetLen>(t: &Target<IO>) -> u64 {
    let dom = t
        .device()
        .domain_id_of_type(ZoneType::SeqWriteReq)
        .unwrap();
    t.device().domain(dom).start_lba
}

#[test]
fn test_empty_to_full_via_sequential_writes() {
    let mut t = make_target(CFG);
    // Take realm 5's first sequential zone and fill it write by write.
    let zlba = t.device().realm_at(5).start(ZoneType::SeqWriteReq);

    let mut data = vec![0x6Bu8; 8 * 512];
    for i in 0..ZONE_LBAS / 8 {
        let st = write16(&mut t, zlba + i * 8, &mut data);
        assert!(st.is_good(), "write {i} failed: {st:?}");
    }

    let mut buf = vec![0u8; 64 + 64];
    assert!(report_zones(&mut t, zlba, 0x00, &mut buf).is_good());
    let (ztype, cond, len, wp) = zone_desc(&buf, zlba).unwrap();
    assert_eq!(ztype, ZoneType::SeqWriteReq as u8);
    assert_eq!(cond, ZoneCond::Full as u8);
    assert_eq!(wp, zlba + len);
}

#[test]
fn test_unaligned_write_sense() {
    let mut t = make_target(CFG);
    let zlba = seq_domain_start(&t);

    let mut data = vec![0u8; 8 * 512];
    let st = write16(&mut t, zlba + 16, &mut data);
    assert_eq!(
        st,
        CmdStatus::sense(SenseKey::IllegalRequest, ASC_UNALIGNED_WRITE_COMMAND)
    );

    // The failure is also queued for REQUEST SENSE.
    let mut cdb = [0u8; 6];
    cdb[0] = cmd::REQUEST_SENSE;
    cdb[4] = 18;
    let mut sense = [0u8; 18];
    assert!(run(&mut t, &cdb, &mut sense).is_good());
    assert_eq!(sense[2], SenseKey::IllegalRequest as u8);
    assert_eq!(sense[12], 0x21);
    assert_eq!(sense[13], 0x04);
}

#[test]
fn test_open_all_resource_cap() {
    let mut t = make_target(CFG);
    let start = seq_domain_start(&t);

    // Explicitly open 3 zones.
    for i in 0..3u64 {
        let st = zbc_out(&mut t, cmd::ZBC_SA_OPEN_ZONE, start + i * ZONE_LBAS, 0, false);
        assert!(st.is_good());
    }

    // Move 6 more SWR zones to Closed: write one LBA, then CLOSE.
    for i in 3..9u64 {
        let lba = start + i * ZONE_LBAS;
        let mut data = vec![0u8; 512];
        assert!(write16(&mut t, lba, &mut data).is_good());
        assert!(zbc_out(&mut t, cmd::ZBC_SA_CLOSE_ZONE, lba, 0, false).is_good());
    }

    // OPEN ALL: 3 open + 6 closed exceeds the limit of 4; nothing moves.
    let st = zbc_out(&mut t, cmd::ZBC_SA_OPEN_ZONE, 0, 0, true);
    assert_eq!(
        st,
        CmdStatus::sense(SenseKey::DataProtect, ASC_INSUFFICIENT_ZONE_RESOURCES)
    );
    assert_eq!(t.device().stats().failed_exp_opens, 1);

    let mut buf = vec![0u8; 64 + 16 * 64];
    assert!(report_zones(&mut t, start, 0x04 /* closed */, &mut buf).is_good());
    assert_eq!(rdbe32(&buf[0..]) / 64, 6, "all six zones stay closed");
}

#[test]
fn test_report_zone_domains_active_option() {
    // ZD_1CMR_BOT: realm 0 is CMR-only and starts conventional; all the
    // other realms start with their SWR side active; the SWP domain has
    // no active zones at all.
    let mut t = make_target("dhsmr/type-ZD_1CMR_BOT/zsize-64K/rsize-256K/sgain-1.25@ttest");
    assert_eq!(t.device().nr_domains(), 3);

    let mut cdb = [0u8; 16];
    cdb[0] = cmd::ZBC_IN;
    cdb[1] = cmd::ZBC_SA_REPORT_ZONE_DOMAINS;
    let mut buf = vec![0u8; 64 + 4 * 96];
    cpbe32(&mut cdb[10..], buf.len() as u32);
    cdb[14] = 0x02; // ACTIVE: domains with at least one active zone
    assert!(run(&mut t, &cdb, &mut buf).is_good());

    assert_eq!(buf[8], 3, "domains total");
    assert_eq!(buf[9], 2, "domains reported");
    // First record: the conventional domain at LBA 0.
    let rec = &buf[64..];
    assert_eq!(rec[40], ZoneType::Conventional as u8);
    assert_eq!(rdbe64(&rec[24..]), 0);
    // Second record: the SWR domain.
    let rec = &buf[64 + 96..];
    assert_eq!(rec[40], ZoneType::SeqWriteReq as u8);
}

fn activate16(
    t: &mut Target<MemBlockIO>,
    query: bool,
    all: bool,
    domain: u8,
    lba: u64,
    nr_zones: u16,
    buf: &mut [u8],
) -> CmdStatus {
    let mut cdb = [0u8; 16];
    cdb[0] = cmd::ZBC_IN;
    cdb[1] = if query {
        cmd::ZBC_SA_ZONE_QUERY_16
    } else {
        cmd::ZBC_SA_ZONE_ACTIVATE_16
    };
    cdb[2] = domain | if all { 0x80 } else { 0 } | 0x40; // NOZSRC
    cpbe48(&mut cdb[3..], lba);
    cpbe32(&mut cdb[9..], buf.len() as u32);
    cpbe16(&mut cdb[13..], nr_zones);
    run(t, &cdb, buf)
}

#[test]
fn test_zone_activate16_moves_a_realm() {
    let mut t = make_target(CFG);
    let conv_dom = t
        .device()
        .domain_id_of_type(ZoneType::Conventional)
        .unwrap() as u8;
    let lba = t.device().realm_at(3).start(ZoneType::Conventional);
    let nr = t.device().realm_at(3).length(ZoneType::Conventional) as u16;

    let mut buf = vec![0u8; 64 + 2 * 24];
    let st = activate16(&mut t, false, false, conv_dom, lba, nr, &mut buf);
    assert!(st.is_good());

    // Header: activated, NZP valid, no errors.
    assert_eq!(buf[8] & 0x01, 0x01, "ACTIVATED");
    assert_eq!(buf[8] & 0x80, 0x80, "NZP VALID");
    assert_eq!(buf[9], 0, "no error bits");
    assert_eq!(rdbe32(&buf[16..]), nr as u32);
    // Two descriptors: the activated conventional range first (lower
    // LBA), the deactivated sequential range second.
    assert_eq!(rdbe32(&buf[0..]), 48);
    let d0 = &buf[64..];
    assert_eq!(d0[0], ZoneType::Conventional as u8);
    assert_eq!(d0[1] >> 4, ZoneCond::NotWp as u8);
    assert_eq!(rdbe64(&d0[16..]), lba);
    let d1 = &buf[64 + 24..];
    assert_eq!(d1[0], ZoneType::SeqWriteReq as u8);
    assert_eq!(d1[1] >> 4, ZoneCond::Inactive as u8);

    // The conventional zones are writable now.
    let mut data = vec![0x21u8; 512];
    assert!(write16(&mut t, lba, &mut data).is_good());
    let (st, back) = read16(&mut t, lba, 1);
    assert!(st.is_good());
    assert_eq!(back, data);
}

#[test]
fn test_zone_query_does_not_mutate() {
    let mut t = make_target(CFG);
    let conv_dom = t
        .device()
        .domain_id_of_type(ZoneType::Conventional)
        .unwrap() as u8;
    let lba = t.device().realm_at(3).start(ZoneType::Conventional);
    let nr = t.device().realm_at(3).length(ZoneType::Conventional) as u16;

    let mut buf = vec![0u8; 64 + 2 * 24];
    let st = activate16(&mut t, true, false, conv_dom, lba, nr, &mut buf);
    assert!(st.is_good());
    assert_eq!(buf[8] & 0x01, 0, "query never sets ACTIVATED");
    assert_eq!(buf[9], 0);
    assert_eq!(
        t.device().realm_at(3).realm_type(),
        Some(ZoneType::SeqWriteReq)
    );
}

#[test]
fn test_activation_prerequisite_failure_reports_ziwup() {
    let mut t = make_target(CFG);
    // Implicitly open one zone in the range that activation would
    // deactivate.
    let open_lba = t.device().realm_at(2).start(ZoneType::SeqWriteReq);
    let mut data = vec![0u8; 512];
    assert!(write16(&mut t, open_lba, &mut data).is_good());

    let conv_dom = t
        .device()
        .domain_id_of_type(ZoneType::Conventional)
        .unwrap() as u8;
    let lba = t.device().realm_at(2).start(ZoneType::Conventional);
    let nr = t.device().realm_at(2).length(ZoneType::Conventional) as u16;

    let mut buf = vec![0u8; 64 + 2 * 24];
    // SCSI status is GOOD; the failure lives in the result header.
    let st = activate16(&mut t, false, false, conv_dom, lba, nr, &mut buf);
    assert!(st.is_good());

    assert_eq!(buf[8] & 0x01, 0, "not activated");
    assert_eq!(buf[8] & 0x40, 0x40, "ZIWUP valid");
    assert_ne!(buf[9], 0, "error bits set");
    assert_eq!(rdbe48(&buf[24..]), open_lba);
    assert_eq!(
        t.device().realm_at(2).realm_type(),
        Some(ZoneType::SeqWriteReq)
    );
}

#[test]
fn test_zone_activate32_form() {
    let mut t = make_target(CFG);
    let conv_dom = t
        .device()
        .domain_id_of_type(ZoneType::Conventional)
        .unwrap() as u8;
    let lba = t.device().realm_at(1).start(ZoneType::Conventional);
    let nr = t.device().realm_at(1).length(ZoneType::Conventional);

    let mut cdb = [0u8; 32];
    cdb[0] = cmd::ZBC_ZONE_ACTIVATE_32;
    cdb[7] = 0x18; // additional CDB length
    cpbe16(&mut cdb[8..], cmd::ZBC_SA_ZONE_ACTIVATE_32);
    cdb[10] = 0x40; // NOZSRC
    cdb[11] = conv_dom;
    cpbe64(&mut cdb[12..], lba);
    cpbe32(&mut cdb[20..], nr);
    let mut buf = vec![0u8; 64 + 2 * 24];
    cpbe32(&mut cdb[28..], buf.len() as u32);

    assert!(run(&mut t, &cdb, &mut buf).is_good());
    assert_eq!(buf[8] & 0x01, 0x01);
    assert_eq!(
        t.device().realm_at(1).realm_type(),
        Some(ZoneType::Conventional)
    );

    // A wrong additional-CDB-length byte is rejected.
    cdb[7] = 0x10;
    let st = run(&mut t, &cdb, &mut buf);
    assert!(matches!(st, CmdStatus::CheckCondition(_)));
}

#[test]
fn test_report_realms() {
    let mut t = make_target(CFG);
    let nr_domains = t.device().nr_domains() as usize;
    let desc_len = 16 + 16 * nr_domains;

    let mut cdb = [0u8; 16];
    cdb[0] = cmd::ZBC_IN;
    cdb[1] = cmd::ZBC_SA_REPORT_REALMS;
    let mut buf = vec![0u8; 64 + 4 * desc_len];
    cpbe32(&mut cdb[10..], buf.len() as u32);
    assert!(run(&mut t, &cdb, &mut buf).is_good());

    assert_eq!(rdbe32(&buf[0..]), t.device().nr_realms());
    assert_eq!(rdbe32(&buf[4..]), desc_len as u32);
    // Next realm locator: realm 4 is the first that did not fit. The
    // locator LBA 0 sits in the conventional domain, so realm starts
    // are reported in that domain's address space.
    let next = rdbe64(&buf[8..]);
    assert_eq!(next, t.device().realm_at(4).start(ZoneType::Conventional));

    // Realm 0 descriptor: number, current domain, per-domain ranges.
    let d = &buf[64..];
    assert_eq!(rdbe32(&d[0..]), 0);
    let swr_dom = t
        .device()
        .domain_id_of_type(ZoneType::SeqWriteReq)
        .unwrap() as u8;
    assert_eq!(d[7], swr_dom);
    let conv_start = rdbe64(&d[16..]);
    assert_eq!(conv_start, t.device().realm_at(0).start(ZoneType::Conventional));
}

#[test]
fn test_mutate_round_trip_via_commands() {
    let mut t = make_target(CFG);

    // Prove the device is ZD first: READ CAPACITY(16) reports the CMR
    // space.
    let mut cdb = [0u8; 16];
    cdb[0] = cmd::SERVICE_ACTION_IN_16;
    cdb[1] = cmd::SAI_READ_CAPACITY_16;
    let mut buf = [0u8; 32];
    assert!(run(&mut t, &cdb, &mut buf).is_good());
    let cmr_last = rdbe64(&buf[0..]);
    assert_eq!(cmr_last, t.device().logical_cmr_capacity() - 1);

    // MUTATE to a non-zoned device.
    let mut mcdb = [0u8; 16];
    mcdb[0] = cmd::ZBC_OUT;
    mcdb[1] = cmd::ZBC_SA_MUTATE;
    mcdb[2] = DeviceType::NonZoned as u32 as u8;
    cpbe32(&mut mcdb[4..], MO_NZ_GENERIC);
    assert!(run(&mut t, &mcdb, &mut []).is_good());

    let mut buf = [0u8; 32];
    assert!(run(&mut t, &cdb, &mut buf).is_good());
    let phys_last = rdbe64(&buf[0..]);
    assert_eq!(phys_last, CAP / 512 - 1);

    // And back to the Zone Domains personality: a reformatted zone table.
    mcdb[2] = DeviceType::ZoneDomains as u32 as u8;
    cpbe32(&mut mcdb[4..], MO_ZD_NO_CMR);
    assert!(run(&mut t, &mcdb, &mut []).is_good());
    assert!(t.device().is_zd());

    let start = seq_domain_start(&t);
    let mut rz = vec![0u8; 64 + 64];
    assert!(report_zones(&mut t, start, 0x00, &mut rz).is_good());
    let (_, cond, _, wp) = zone_desc(&rz, start).unwrap();
    assert_eq!(cond, ZoneCond::Empty as u8);
    assert_eq!(wp, start);
}

#[test]
fn test_zbd_stats_diag_page() {
    let mut t = make_target(CFG);

    // Provoke one write rule failure.
    let zlba = seq_domain_start(&t);
    let mut data = vec![0u8; 512];
    let _ = write16(&mut t, zlba + 3, &mut data);

    let mut cdb = [0u8; 6];
    cdb[0] = cmd::RECEIVE_DIAGNOSTIC_RESULTS;
    cdb[1] = 0x01; // PCV
    cdb[2] = 0x14;
    let size = 4 + 11 * 12;
    cpbe16(&mut cdb[3..], size as u16);
    let mut buf = vec![0u8; size];
    assert!(run(&mut t, &cdb, &mut buf).is_good());

    assert_eq!(buf[0] & 0x3f, 0x14);
    assert_eq!(buf[1], 0x01, "stats subpage");
    // Parameter 0x0a: write rule violations.
    let rec = &buf[4 + 10 * 12..];
    assert_eq!(rdbe16(&rec[0..]), 0x0a);
    assert_eq!(rec[2], 0x03);
    assert_eq!(rec[3], 8);
    assert_eq!(rdbe64(&rec[4..]), 1);
}

#[test]
fn test_report_zones_partial_and_filtered() {
    let mut t = make_target(CFG);
    let start = seq_domain_start(&t);

    // Open two zones explicitly.
    for i in 0..2u64 {
        assert!(zbc_out(&mut t, cmd::ZBC_SA_OPEN_ZONE, start + i * ZONE_LBAS, 0, false).is_good());
    }

    // Filter: explicitly open zones only.
    let mut buf = vec![0u8; 64 + 4 * 64];
    assert!(report_zones(&mut t, 0, 0x03, &mut buf).is_good());
    assert_eq!(rdbe32(&buf[0..]) / 64, 2);

    // Partial with room for a single descriptor reports just one.
    let mut buf = vec![0u8; 64 + 64];
    assert!(report_zones(&mut t, 0, 0x03 | 0x80, &mut buf).is_good());
    assert_eq!(rdbe32(&buf[0..]) / 64, 1);
}

#[test]
fn test_sync_cache_persists_via_file() {
    let file = tempfile::tempfile().unwrap();
    let mut cfg = DevConfig::parse(CFG).unwrap();
    cfg.phys_capacity = CAP;
    let dev = Device::open(FileBlockIO::new(file.try_clone().unwrap()), cfg.clone()).unwrap();
    let mut t = Target::new(dev, "wwn1");

    let zlba = seq_domain_start(&t);
    let mut data = vec![0x42u8; 1024];
    assert!(write16(&mut t, zlba, &mut data).is_good());

    let mut cdb = [0u8; 16];
    cdb[0] = cmd::SYNCHRONIZE_CACHE_16;
    assert!(run(&mut t, &cdb, &mut []).is_good());
    drop(t);

    let dev = Device::open(FileBlockIO::new(file), cfg).unwrap();
    let mut t = Target::new(dev, "wwn1");
    let (st, back) = read16(&mut t, zlba, 2);
    assert!(st.is_good());
    assert!(back.iter().all(|&b| b == 0x42));
}
