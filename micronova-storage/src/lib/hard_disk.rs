
use log::{debug, error, info, trace, warn};
use std::io;
use std::sync::mpsc::Sender;

use crate::device::{IoDevice, IoOp, Pulse};
use crate::error::DiskResult;
use crate::geometry::{HARD_DISK_TYPES, TYPE_6095, USSC_COUNT_MASK, WORDS_PER_SECTOR,
                      FUNCTION_READ, FUNCTION_RECALIBRATE, FUNCTION_SEEK, FUNCTION_WRITE,
                      ussc_count, ussc_unit};
use crate::memory::{dma_load, dma_store, DmaMemory, ADDRESS_MASK};
use crate::scheduler::{EventKey, Scheduler, Time};
use crate::store::SectorStore;
use crate::unit::{DriveControl, DriveUnit};

/// Unit slots on the controller.
pub const NUM_UNITS: usize = 4;

/// Status register bits.
pub mod status {
    pub const ERR: u16 = 0o1;
    pub const DLT: u16 = 0o2;
    pub const CRC: u16 = 0o4;
    pub const UNS: u16 = 0o10;
    pub const XCY: u16 = 0o20;
    pub const CYL: u16 = 0o40;
    pub const DRDY: u16 = 0o100;
    pub const SEEK3: u16 = 0o200;
    pub const SEEK2: u16 = 0o400;
    pub const SEEK1: u16 = 0o1000;
    pub const SEEK0: u16 = 0o2000;
    pub const SKDN3: u16 = 0o4000;
    pub const SKDN2: u16 = 0o10000;
    pub const SKDN1: u16 = 0o20000;
    pub const SKDN0: u16 = 0o40000;
    pub const DONE: u16 = 0o100000;

    pub const ERROR_FLAGS: u16 = ERR | DLT | CRC | UNS | XCY | CYL;
    pub const DONE_FLAGS: u16 = DONE | SKDN0 | SKDN1 | SKDN2 | SKDN3;
    /// Bits a command register write clears where the written word has ones.
    pub const COMMAND_CLEARABLE: u16 = 0o174000;
    /// Bits a command register write with bit 15 set clears.
    pub const RW_DONE_CLEARABLE: u16 = CYL | XCY | UNS | CRC;

    /// Seek-in-progress bit of a unit.
    pub const fn seeking(unit: usize) -> u16 {
        SEEK0 >> unit
    }

    /// Seek-done bit of a unit.
    pub const fn seek_done(unit: usize) -> u16 {
        SKDN0 >> unit
    }
}

use status::*;

/// Delays, in virtual time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardDiskTiming {
    /// Per cylinder crossed.
    pub seek_wait: Time,
    /// Before a transfer starts.
    pub rotate_wait: Time,
}

impl Default for HardDiskTiming {
    fn default() -> Self {
        HardDiskTiming {
            seek_wait: 100,
            rotate_wait: 100,
        }
    }
}

/// The moving-head disk controller.
pub struct HardDiskController {
    units: Vec<DriveUnit>,
    fccy: u16,
    ussc: u16,
    ma: u16,
    map: u8,
    status: u16,
    busy: bool,
    done: bool,
    timing: HardDiskTiming,
    scheduler: Scheduler,
    interrupt_tx: Sender<u32>,
    interrupt_num: u32,
}

impl HardDiskController {
    /// Create a controller with default timing, raising the given
    /// interrupt number on completion.
    pub fn new(interrupt_tx: Sender<u32>, interrupt_num: u32) -> Self {
        Self::with_timing(interrupt_tx, interrupt_num, HardDiskTiming::default())
    }

    pub fn with_timing(interrupt_tx: Sender<u32>, interrupt_num: u32,
                       timing: HardDiskTiming) -> Self {
        HardDiskController {
            units: (0..NUM_UNITS).map(|_| DriveUnit::new(HARD_DISK_TYPES, TYPE_6095)).collect(),
            fccy: 0,
            ussc: 0,
            ma: 0,
            map: 0,
            status: 0,
            busy: false,
            done: false,
            timing,
            scheduler: Scheduler::new(),
            interrupt_tx,
            interrupt_num,
        }
    }

    /// The raw status register, without the refresh a DIA performs.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Run events until none remain.
    pub fn run_until_idle(&mut self, memory: &mut dyn DmaMemory) -> DiskResult<()> {
        while let Some(time) = self.scheduler.next_fire_time() {
            self.run_until(time, memory)?;
        }
        Ok(())
    }

    /// Drive the done line, interrupting on the rising edge. The interrupt
    /// line is level-triggered: a completion while done is already up (a
    /// second unit finishing its seek, say) only adds its status bits, and
    /// the program finds it when it reads status to service the first.
    fn set_done(&mut self, done: bool) {
        if done && !self.done && self.interrupt_tx.send(self.interrupt_num).is_err() {
            warn!("DHP interrupt receiver has gone away.");
        }
        self.done = done;
    }

    /// Bring the drive-ready, cylinder and summary error bits up to date
    /// for the selected unit.
    fn refresh_status(&mut self) {
        let unit = &self.units[ussc_unit(self.ussc)];
        if unit.is_attached() {
            self.status |= DRDY;
        } else {
            self.status &= !DRDY;
        }
        if unit.cylinder >= unit.geometry().cylinders {
            self.status |= CYL;
        }
        if self.status & ERROR_FLAGS != 0 {
            self.status |= ERR;
        }
    }

    /// Status bits describing why a read or write of unit `u` at the
    /// current address cannot proceed, or zero if it can.
    fn transfer_fault(&self, u: usize) -> u16 {
        let unit = &self.units[u];
        let geometry = unit.geometry();
        let layout = geometry.layout;
        if !unit.is_attached() || (unit.function == FUNCTION_WRITE && unit.write_locked) {
            ERR
        } else if unit.cylinder >= geometry.cylinders {
            ERR | CYL
        } else if layout.surface(self.ussc) >= geometry.surfaces {
            ERR | UNS
        } else if layout.sector(self.ussc) >= geometry.sectors {
            ERR | XCY
        } else {
            0
        }
    }

    /// Start the command in FCCY on the selected unit. Returns false if
    /// the command was refused and must be completed immediately.
    fn dispatch(&mut self, pulse: Pulse) -> bool {
        self.status &= !ERROR_FLAGS;
        let u = ussc_unit(self.ussc);
        let key = EventKey::Unit(u);
        let unit = &mut self.units[u];
        if !unit.is_attached() || self.scheduler.is_active(key) {
            debug!("DHP unit {} not ready for a command.", u);
            self.status |= ERR;
            return false;
        }

        let geometry = unit.geometry();
        let layout = geometry.layout;
        let previous = unit.cylinder;
        let function = layout.function(self.fccy);
        unit.function = function;
        unit.cylinder = layout.cylinder(self.fccy);

        match function {
            FUNCTION_READ | FUNCTION_WRITE => {
                let fault = self.transfer_fault(u);
                if fault != 0 {
                    self.status |= DONE | fault;
                }
                // Transfers only go on the start pulse.
                if pulse != Pulse::Start || self.status & ERR != 0 {
                    return false;
                }
                let unit = &self.units[u];
                debug!("DHP unit {} {} C/H/S {}/{}/{} count {} MA {:06o}.",
                       u, if function == FUNCTION_READ {"read"} else {"write"},
                       unit.cylinder, layout.surface(self.ussc), layout.sector(self.ussc),
                       ussc_count(self.ussc), self.ma);
                self.scheduler.schedule(key, self.timing.rotate_wait);
            }
            _ => {
                if function == FUNCTION_RECALIBRATE {
                    unit.function = FUNCTION_SEEK;
                    unit.cylinder = 0;
                }
                let target = unit.cylinder;
                if target >= geometry.cylinders {
                    self.status |= ERR | CYL;
                }
                // Seeks only go on the special pulse.
                if pulse != Pulse::Special || self.status & ERR != 0 {
                    return false;
                }
                self.status |= seeking(u);
                let distance = target.abs_diff(previous) as Time;
                let delay = (self.timing.seek_wait * distance.max(1)).max(1);
                debug!("DHP unit {} seek from cylinder {} to {}, {} units.",
                       u, previous, target, delay);
                self.scheduler.schedule(key, delay);
            }
        }
        true
    }

    /// Handle a unit's event.
    fn service(&mut self, u: usize, memory: &mut dyn DmaMemory) -> DiskResult<()> {
        let unit = &self.units[u];
        if unit.function == FUNCTION_SEEK {
            if !unit.is_attached() {
                self.status |= DONE | ERR;
            } else if unit.cylinder >= unit.geometry().cylinders {
                self.status |= ERR | CYL;
            }
            debug!("DHP unit {} seek done at cylinder {}.", u, unit.cylinder);
            self.status = (self.status | seek_done(u)) & !seeking(u);
            self.set_done(true);
            return Ok(());
        }

        let fault = self.transfer_fault(u);
        let result = if fault != 0 {
            debug!("DHP unit {} transfer refused, status {:06o}.", u, fault);
            self.status |= fault;
            Ok(())
        } else {
            self.transfer(u, memory)
        };
        self.status |= DONE;
        self.busy = false;
        self.set_done(true);
        result
    }

    fn transfer(&mut self, u: usize, memory: &mut dyn DmaMemory) -> DiskResult<()> {
        let mut store = match self.units[u].take_store() {
            Some(store) => store,
            None => {
                self.status |= ERR;
                return Ok(());
            }
        };
        let result = self.transfer_sectors(u, store.as_mut(), memory);
        self.units[u].restore_store(store);
        if let Err(e) = result {
            error!("DHP unit {} backing store failed: {}", u, e);
            self.status |= ERR | CRC;
            return Err(e.into());
        }
        Ok(())
    }

    /// Move sectors until the count runs out or the heads run off the
    /// last surface.
    fn transfer_sectors(&mut self, u: usize, store: &mut dyn SectorStore,
                        memory: &mut dyn DmaMemory) -> io::Result<()> {
        let unit = &self.units[u];
        let geometry = unit.geometry();
        let layout = geometry.layout;
        let function = unit.function;
        let cylinder = unit.cylinder;
        let mut buffer = [0; WORDS_PER_SECTOR];

        loop {
            let mut surface = layout.surface(self.ussc);
            let mut sector = layout.sector(self.ussc);
            if sector >= geometry.sectors {
                sector = 0;
                surface = (surface + 1) & layout.surface_mask();
                self.ussc = layout.with_position(self.ussc, surface, sector);
                if surface >= geometry.surfaces {
                    debug!("DHP unit {} ran off the last surface.", u);
                    self.status |= DONE | ERR | XCY;
                    return Ok(());
                }
            }

            let block = geometry.block_address(cylinder, surface, sector);
            trace!("DHP unit {} block {} (C/H/S {}/{}/{}) MA {:06o}.",
                   u, block, cylinder, surface, sector, self.ma);
            if function == FUNCTION_READ {
                store.read_sector(block, &mut buffer)?;
                for &word in buffer.iter() {
                    dma_store(memory, self.map, self.ma, word);
                    self.ma = self.ma.wrapping_add(1) & ADDRESS_MASK;
                }
            } else {
                for word in buffer.iter_mut() {
                    *word = dma_load(memory, self.map, self.ma);
                    self.ma = self.ma.wrapping_add(1) & ADDRESS_MASK;
                }
                store.write_sector(block, &buffer)?;
            }

            // The count is a negative sector count, finished when it wraps to zero.
            let count = (self.ussc + 1) & USSC_COUNT_MASK;
            self.ussc = layout.with_position(
                (self.ussc & !USSC_COUNT_MASK) | count, surface, sector + 1);
            if count == 0 {
                return Ok(());
            }
        }
    }
}

impl DriveControl for HardDiskController {
    fn units(&self) -> &[DriveUnit] {
        &self.units
    }

    fn units_mut(&mut self) -> &mut [DriveUnit] {
        &mut self.units
    }
}

impl IoDevice for HardDiskController {
    fn io(&mut self, pulse: Pulse, op: IoOp, ac: u16) -> u16 {
        let layout = self.units[ussc_unit(self.ussc)].geometry().layout;
        let value = match op {
            IoOp::Dia => {
                self.refresh_status();
                self.status
            }
            IoOp::Doa => {
                if ac & 0o100000 != 0 {
                    self.status &= !RW_DONE_CLEARABLE;
                }
                if !self.busy {
                    self.fccy = ac;
                    self.status &= !(ac & COMMAND_CLEARABLE);
                }
                let done = self.status & DONE_FLAGS != 0;
                self.set_done(done);
                0
            }
            IoOp::Dib => self.ma & ADDRESS_MASK,
            IoOp::Dob => {
                if !self.busy {
                    self.ma = ac & layout.memory_address_mask();
                    self.map = if ac & 0o100000 != 0 {3} else {0};
                }
                0
            }
            IoOp::Dic => self.ussc,
            IoOp::Doc => {
                if !self.busy {
                    self.ussc = ac;
                }
                0
            }
            IoOp::Nio | IoOp::Skp => 0,
        };
        trace!("DHP {}{} AC={:06o} -> {:06o}, status {:06o}.",
               op.mnemonic(), pulse.suffix(), ac, value, self.status);

        match pulse {
            Pulse::Start => {
                self.busy = true;
                self.set_done(false);
                if !self.dispatch(pulse) {
                    self.busy = false;
                    self.set_done(true);
                    self.status |= DONE;
                }
            }
            Pulse::Clear => {
                self.busy = false;
                self.set_done(false);
                self.status &= !(DONE_FLAGS | ERROR_FLAGS);
                let u = ussc_unit(self.ussc);
                if self.units[u].function == FUNCTION_SEEK
                        && self.scheduler.cancel(EventKey::Unit(u)) {
                    debug!("DHP unit {} seek cancelled.", u);
                    self.status &= !seeking(u);
                }
            }
            Pulse::Special => {
                self.set_done(false);
                if !self.dispatch(pulse) {
                    let u = ussc_unit(self.ussc);
                    self.set_done(true);
                    self.status |= seek_done(u);
                }
            }
            Pulse::None => {}
        }
        value
    }

    fn reset(&mut self) {
        info!("DHP reset.");
        self.scheduler.clear();
        for unit in self.units.iter_mut() {
            unit.reset();
        }
        self.fccy = 0;
        self.ussc = 0;
        self.ma = 0;
        self.map = 0;
        self.status = 0;
        self.busy = false;
        self.done = false;
    }

    fn busy(&self) -> bool {
        self.busy
    }

    fn done(&self) -> bool {
        self.done
    }

    fn now(&self) -> Time {
        self.scheduler.now()
    }

    fn run_until(&mut self, time: Time, memory: &mut dyn DmaMemory) -> DiskResult<()> {
        while let Some(key) = self.scheduler.pop_due(time) {
            if let EventKey::Unit(u) = key {
                self.service(u, memory)?;
            }
        }
        self.scheduler.advance_to(time);
        Ok(())
    }
}
