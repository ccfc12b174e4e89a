// SPDX-License-Identifier: MIT

//! SCSI command surface of the Zone Domains device emulator.
//!
//! `Target` binds one `zdcore::Device` to the SCSI dispatch: CDB decode,
//! command handlers and reply marshaling. The host runtime delivers a
//! `ScsiCommand` (CDB plus scatter-gather buffer) and receives a
//! `CmdStatus` carrying any sense data.

// === Core modules ===
pub mod bytes;
pub mod cmd;
pub mod sense;
pub mod target;

// === Command handlers ===
mod activate;
mod diag;
mod inquiry;
mod mode;
mod rdwr;
mod report;

// === Prelude re-exports (central entrypoint) ===
pub mod prelude {
    pub use crate::cmd::ScsiCommand;
    pub use crate::sense::{CmdStatus, SenseData, SenseKey};
    pub use crate::target::Target;
}

pub use cmd::ScsiCommand;
pub use sense::{CmdStatus, SenseData, SenseKey};
pub use target::Target;
