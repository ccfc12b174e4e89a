// SPDX-License-Identifier: MIT

//! Core model of a SCSI Zoned Block Device target implementing the Zone
//! Domains / Zone Realms command set family, backed by a single file.
//!
//! The crate owns the persisted metadata layout, the zone and realm state
//! machines, the formatter and validator, and the read/write data path.
//! The SCSI command surface lives in `zdscsi`.

// === Core modules ===
pub mod config;
pub mod errors;
pub mod meta;
pub mod profile;
pub mod stats;
pub mod types;
mod macros;

// === Device model ===
pub mod activate;
pub mod checker;
pub mod device;
mod formatter;
mod rdwr;
mod zoneops;
mod zones;

// === Prelude re-exports (central entrypoint) ===
pub mod prelude {
    pub use crate::activate::{ActvDesc, ActvResults};
    pub use crate::checker::{Finding, Severity, VerifyReport};
    pub use crate::config::DevConfig;
    pub use crate::device::Device;
    pub use crate::errors::*;
    pub use crate::meta::{MetaHeader, Zone, ZoneDomain, ZoneRealm, LIST_NIL, NO_WP};
    pub use crate::profile::{DevProfile, PROFILES};
    pub use crate::stats::DevStats;
    pub use crate::types::*;
}
