// SPDX-License-Identifier: MIT

//! Operator tool for Zone Domains backing files: create/format, validate
//! and inspect them outside of a target runtime.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use zdcore::checker::{self, Severity};
use zdcore::prelude::*;
use zdio::prelude::*;

#[derive(Parser)]
#[command(name = "zdctl", version, about = "Zone Domains backing-file tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Device capacity in MiB (what the target runtime would provide)
    #[arg(short, long, global = true, default_value_t = 1024)]
    size: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or re-open a backing file from a configuration string
    Create {
        /// Configuration string, e.g. dhsmr/zsize-128/rsize-1024@/tmp/zd.raw
        cfgstring: String,
    },
    /// Validate the metadata of an existing backing file
    Check {
        cfgstring: String,
    },
    /// Print the device geometry, domains and realm summary
    Info {
        cfgstring: String,
    },
    /// Dump the zone table
    Zones {
        cfgstring: String,

        /// First zone to print
        #[arg(long, default_value_t = 0)]
        start: u32,

        /// Number of zones to print, 0 = all
        #[arg(long, default_value_t = 0)]
        count: u32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let size = cli.size * 1024 * 1024;

    match cli.command {
        Commands::Create { cfgstring } => create(&cfgstring, size),
        Commands::Check { cfgstring } => check(&cfgstring, size),
        Commands::Info { cfgstring } => info(&cfgstring, size),
        Commands::Zones {
            cfgstring,
            start,
            count,
        } => zones(&cfgstring, size, start, count),
    }
}

fn open_device(cfgstring: &str, size: u64) -> Result<Device<FileBlockIO>> {
    let mut cfg = DevConfig::parse(cfgstring)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid configuration string")?;
    cfg.phys_capacity = size;

    let io = FileBlockIO::open_or_create(&cfg.path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("can't open {}", cfg.path))?;

    Device::open(io, cfg).map_err(|e| anyhow::anyhow!("{e}"))
}

fn create(cfgstring: &str, size: u64) -> Result<()> {
    let dev = open_device(cfgstring, size)?;
    println!(
        "{} {} as {}",
        "created".green().bold(),
        dev.config().path,
        dev.profile().name
    );
    print_geometry(&dev);
    Ok(())
}

fn check(cfgstring: &str, size: u64) -> Result<()> {
    let cfg = DevConfig::parse(cfgstring).map_err(|e| anyhow::anyhow!("{e}"))?;
    if !Path::new(&cfg.path).exists() {
        bail!("{} does not exist", cfg.path);
    }

    // Header identity first, without going through Device::open: a
    // mismatch there would silently reformat the file.
    let mut io = FileBlockIO::open_or_create(&cfg.path).map_err(|e| anyhow::anyhow!("{e}"))?;
    let header = zdcore::meta::MetaStore::read_header(&mut io).map_err(|e| anyhow::anyhow!("{e}"))?;
    let bs_size = io.len().map_err(|e| anyhow::anyhow!("{e}"))?;
    drop(io);
    if let Err(reason) = checker::check_header(&header, Some(&cfg), bs_size) {
        println!("{}: {}", "ERR ".red().bold(), reason);
        bail!("metadata header check failed");
    }

    let dev = open_device(cfgstring, size)?;
    let report = checker::check_structure(&dev);

    for f in &report.findings {
        let tag = match f.sev {
            Severity::Info => "INFO".green(),
            Severity::Warn => "WARN".yellow(),
            Severity::Error => "ERR ".red().bold(),
        };
        println!("{tag}: {:<14} {}", f.code, f.msg);
    }
    println!(
        "errors={} warns={} infos={}",
        report.count(Severity::Error),
        report.count(Severity::Warn),
        report.count(Severity::Info)
    );
    if report.has_error() {
        bail!("metadata check failed");
    }
    Ok(())
}

fn info(cfgstring: &str, size: u64) -> Result<()> {
    let dev = open_device(cfgstring, size)?;
    print_geometry(&dev);

    if dev.is_zd() {
        println!("zone domains:");
        for (i, d) in dev.domains().iter().enumerate() {
            println!(
                "  {i}:  {:>12}..{:<12} type {:#04x} {:>6} zones {}",
                d.start_lba,
                d.end_lba,
                d.dtype,
                d.nr_zones,
                if d.is_smr() { "SMR" } else { "CMR" }
            );
        }
        if dev.nr_realms() > 1 {
            // Realm 0 can be CMR-only; realm 1 shows the regular layout.
            let r = dev.realm_at(1);
            println!(
                "{} realms of {} LBAs ({} CMR / {} SMR zones each)",
                dev.nr_realms(),
                dev.config().realm_size / dev.lba_size() as u64,
                r.length(ZoneType::Conventional)
                    .max(r.length(ZoneType::SeqOrBefReq)),
                r.length(ZoneType::SeqWriteReq)
                    .max(r.length(ZoneType::SeqWritePref)),
            );
        }
    }
    Ok(())
}

fn print_geometry<IO: BlockIO + BlockIOSetLen>(dev: &Device<IO>) {
    println!(
        "type {:?} model {} ({})",
        dev.dev_type(),
        dev.dev_model(),
        dev.profile().name
    );
    println!(
        "{} logical blocks of {} B ({:.3} GB)",
        dev.logical_capacity(),
        dev.lba_size(),
        (dev.logical_capacity() * dev.lba_size() as u64) as f64 / 1e9
    );
    if dev.is_zoned() {
        println!(
            "{} zones of {} LBAs, {} max open",
            dev.nr_zones(),
            dev.zone_size(),
            dev.nr_open_zones()
        );
    }
}

fn zones(cfgstring: &str, size: u64, start: u32, count: u32) -> Result<()> {
    let dev = open_device(cfgstring, size)?;
    if !dev.is_zoned() {
        bail!("not a zoned device");
    }

    let end = if count == 0 {
        dev.nr_zones()
    } else {
        (start + count).min(dev.nr_zones())
    };
    println!("{:>6} {:>14} {:>8} {:>14}  type cond", "zone", "start", "len", "wp");
    for idx in start..end {
        let z = dev.zone_at(idx);
        let wp = if z.wp == NO_WP {
            "-".to_string()
        } else {
            z.wp.to_string()
        };
        println!(
            "{idx:>6} {:>14} {:>8} {wp:>14}  {:#04x} {:#04x}",
            z.start, z.len, z.ztype, z.cond
        );
    }
    Ok(())
}
