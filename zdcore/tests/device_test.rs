// SPDX-License-Identifier: MIT

//! Device-level integration tests: format, mutate, persistence and the
//! universal zone invariants after every state-changing operation.

use zdcore::checker;
use zdcore::prelude::*;
use zdio::prelude::*;

const CFG: &str = "dhsmr/type-ZONE_DOM/zsize-64K/rsize-256K/sgain-1.25/open-4@itest";
const CAP: u64 = 8 * 1024 * 1024;

fn open_mem(cfgstring: &str) -> Device<MemBlockIO> {
    let mut cfg = DevConfig::parse(cfgstring).unwrap();
    cfg.phys_capacity = CAP;
    Device::open(MemBlockIO::new(), cfg).unwrap()
}

/// The §8-style universal invariants, checked after every command in
/// these tests: WP/condition couplings, list membership, contiguity and
/// the open-zone budget.
fn assert_invariants(dev: &Device<MemBlockIO>) {
    let rep = checker::check_structure(dev);
    assert!(rep.ok(), "invariant violation:\n{rep}");
}

fn seq_lba<IO: BlockIO + BlockIOSetLen>(dev: &Device<IO>, nth: u32) -> u64 {
    let dom = dev.domain_id_of_type(ZoneType::SeqWriteReq).unwrap();
    dev.domain(dom).start_lba + nth as u64 * dev.zone_size()
}

fn write_one<IO: BlockIO + BlockIOSetLen>(dev: &mut Device<IO>, lba: u64, nr: u64, fill: u8) -> ZbcResult {
    let mut buf = vec![fill; (nr * 512) as usize];
    let mut segs: [&mut [u8]; 1] = [&mut buf];
    let mut sg = SgBuffer::new(&mut segs);
    dev.write(lba, nr, &mut sg)
}

#[test]
fn test_invariants_hold_across_zone_ops() {
    let mut dev = open_mem(CFG);
    assert_invariants(&dev);

    let lba = seq_lba(&dev, 0);
    dev.open_zones(lba, 0, false).unwrap();
    assert_invariants(&dev);

    write_one(&mut dev, lba, 8, 0xAB).unwrap();
    assert_invariants(&dev);

    dev.close_zones(lba, 0, false).unwrap();
    assert_invariants(&dev);

    dev.finish_zones(lba, 2, false).unwrap();
    assert_invariants(&dev);

    dev.reset_zones(lba, 2, false).unwrap();
    assert_invariants(&dev);

    dev.finish_zones(0, 0, true).unwrap();
    assert_invariants(&dev);
    dev.reset_zones(0, 0, true).unwrap();
    assert_invariants(&dev);
}

#[test]
fn test_invariants_hold_across_activation() {
    let mut dev = open_mem(CFG);
    let conv_dom = dev.domain_id_of_type(ZoneType::Conventional).unwrap();
    let lba = dev.realm_at(4).start(ZoneType::Conventional);
    let nr = dev.realm_at(4).length(ZoneType::Conventional);

    let res = dev
        .zone_activate(lba, nr, conv_dom, 4096, false, true, false)
        .unwrap();
    assert!(res.ok);
    assert_invariants(&dev);

    // Write to the now-active conventional zones.
    write_one(&mut dev, lba, 4, 0x5A).unwrap();
    assert_invariants(&dev);
}

#[test]
fn test_empty_to_full_via_sequential_writes() {
    let mut dev = open_mem(CFG);
    let lba = seq_lba(&dev, 2);
    let idx = dev.get_zone(lba, true).unwrap();
    let len = dev.zone_at(idx).len;

    // Fill the zone with back-to-back writes of 8 LBAs.
    let mut cur = lba;
    for _ in 0..len / 8 {
        write_one(&mut dev, cur, 8, 0x77).unwrap();
        cur += 8;
    }

    let z = *dev.zone_at(idx);
    assert!(z.is_full());
    assert_eq!(z.wp, z.start + z.len);
    assert_invariants(&dev);

    // The zone sits in the seq-active list: a reset brings it back.
    dev.reset_zones(lba, 0, false).unwrap();
    let z = *dev.zone_at(idx);
    assert!(z.is_empty());
    assert_eq!(z.wp, z.start);
    assert_invariants(&dev);
}

#[test]
fn test_mutate_round_trip() {
    let mut dev = open_mem(CFG);
    let zd_zones = dev.nr_zones();
    let lba0 = seq_lba(&dev, 0);
    write_one(&mut dev, lba0, 4, 0xEE).unwrap();

    // Mutate to a non-zoned device: the capacity becomes flat.
    dev.mutate(DeviceType::NonZoned, MO_NZ_GENERIC).unwrap();
    assert!(dev.is_nz());
    assert_eq!(dev.nr_zones(), 0);
    assert_eq!(dev.logical_capacity(), dev.config().phys_capacity / 512);

    // Mutate back: the zone table is reformatted from scratch.
    dev.mutate(DeviceType::ZoneDomains, MO_ZD_NO_CMR).unwrap();
    assert!(dev.is_zd());
    assert_eq!(dev.nr_zones(), zd_zones);
    let idx = dev.get_zone(seq_lba(&dev, 0), true).unwrap();
    assert!(dev.zone_at(idx).is_empty());
    assert_invariants(&dev);

    // Mutating to the current personality is a no-op.
    dev.mutate(DeviceType::ZoneDomains, MO_ZD_NO_CMR).unwrap();
    assert_invariants(&dev);
}

#[test]
fn test_mutate_to_unknown_model_fails() {
    let mut dev = open_mem(CFG);
    let err = dev.mutate(DeviceType::ZoneDomains, 0xff).unwrap_err();
    assert_eq!(err, ZbcError::InvalidFieldInCdb);
    assert!(dev.is_zd());
}

#[test]
fn test_sanitize_keeps_mutation_format_unit_reverts() {
    let mut dev = open_mem(CFG);
    dev.mutate(DeviceType::HmZoned, MO_SMR_NO_CMR).unwrap();
    assert!(dev.is_hm());

    // SANITIZE re-initializes but keeps the mutated personality.
    dev.sanitize_reset().unwrap();
    assert!(dev.is_hm());

    // FORMAT UNIT reverts to the configured personality.
    dev.format_unit().unwrap();
    assert!(dev.is_zd());
    assert_invariants(&dev);
}

#[test]
fn test_open_zones_survive_close_and_reopen_as_closed() {
    // Leave zones open, flush, reopen: the open path closes them.
    let mut cfg = DevConfig::parse(CFG).unwrap();
    cfg.phys_capacity = CAP;
    let mut dev = Device::open(MemBlockIO::new(), cfg.clone()).unwrap();

    let lba = seq_lba(&dev, 0);
    write_one(&mut dev, lba, 4, 0x42).unwrap();
    let idx = dev.get_zone(lba, true).unwrap();
    assert!(dev.zone_at(idx).is_imp_open());
    dev.sync_cache().unwrap();

    let io = dev.into_io();
    let dev2 = Device::open(io, cfg).unwrap();
    let z = *dev2.zone_at(idx);
    assert!(z.is_closed(), "open zones close on re-open");
    assert_eq!(z.wp, lba + 4);
    assert_invariants(&dev2);
}

#[test]
fn test_file_backed_device_persists() {
    let file = tempfile::tempfile().unwrap();
    let mut cfg = DevConfig::parse(CFG).unwrap();
    cfg.phys_capacity = CAP;

    let mut dev =
        Device::open(FileBlockIO::new(file.try_clone().unwrap()), cfg.clone()).unwrap();
    let lba = seq_lba(&dev, 1);
    write_one(&mut dev, lba, 2, 0x99).unwrap();
    dev.finish_zones(lba, 0, false).unwrap();
    dev.sync_cache().unwrap();
    drop(dev);

    let dev = Device::open(FileBlockIO::new(file), cfg).unwrap();
    let idx = dev.get_zone(lba, true).unwrap();
    assert!(dev.zone_at(idx).is_full());
}

#[test]
fn test_data_survives_metadata_flush_cycle() {
    let file = tempfile::tempfile().unwrap();
    let mut cfg = DevConfig::parse(CFG).unwrap();
    cfg.phys_capacity = CAP;

    let mut dev =
        Device::open(FileBlockIO::new(file.try_clone().unwrap()), cfg.clone()).unwrap();
    let lba = seq_lba(&dev, 0);
    write_one(&mut dev, lba, 2, 0xC3).unwrap();
    dev.sync_cache().unwrap();
    drop(dev);

    let mut dev = Device::open(FileBlockIO::new(file), cfg).unwrap();
    let mut buf = vec![0u8; 1024];
    {
        let mut segs: [&mut [u8]; 1] = [&mut buf];
        let mut sg = SgBuffer::new(&mut segs);
        dev.read(lba, 2, &mut sg).unwrap();
    }
    assert!(buf.iter().all(|&b| b == 0xC3));
}
