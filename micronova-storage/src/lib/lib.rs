//! Emulation of the Micronova moving-head disk controller (6095/6097) and
//! diskette controller (6038), driven by a virtual-time event queue.

mod device;
mod error;
mod floppy;
pub mod geometry;
mod hard_disk;
mod memory;
mod scheduler;
mod store;
mod unit;

pub use device::{IoDevice, IoOp, Pulse};
pub use error::{DiskError, DiskResult};
pub use floppy::{current_address, specify_command, FloppyController, FloppyTiming,
                 PROGRAM_LOAD_ROM};
pub use floppy::command as floppy_command;
pub use hard_disk::{HardDiskController, HardDiskTiming};
pub use memory::{DmaMemory, Memory, ADDRESS_MASK, DEFAULT_MEMORY_WORDS};
pub use scheduler::{EventKey, Time};
pub use store::{FileStore, SectorStore};
pub use unit::{DriveControl, DriveUnit};

/// Status register bits of both controllers.
pub mod status {
    pub use crate::floppy::status as floppy;
    pub use crate::hard_disk::status as hard_disk;
}

#[cfg(test)]
fn init_test_logging() {
    use simplelog::{Config, LevelFilter, TestLogger};

    // The logger can only be initialised once, but we don't know the order of
    // tests. Therefore we ignore the result.
    let _ = TestLogger::init(LevelFilter::Trace, Config::default());
}
