#[cfg(test)]
mod tests;

use log::{debug, error, info, trace, warn};
use std::io;
use std::sync::mpsc::Sender;

use crate::device::{IoDevice, IoOp, Pulse};
use crate::error::DiskResult;
use crate::geometry::{FLOPPY_TYPES, TYPE_6038, WORDS_PER_SECTOR};
use crate::memory::{dma_load, dma_store, DmaMemory, ADDRESS_MASK};
use crate::scheduler::{EventKey, Scheduler, Time};
use crate::store::SectorStore;
use crate::unit::{DriveControl, DriveUnit};

/// Drives on the controller.
pub const NUM_UNITS: usize = 2;

/// Status register bits.
pub mod status {
    pub const NOT_READY: u16 = 0o100000;
    pub const TRACK0: u16 = 0o40000;
    pub const HEAD_ON: u16 = 0o20000;
    pub const WRITE_PROTECT: u16 = 0o1000;
    pub const UNIT: u16 = 0o400;
    pub const DRIVE_STATUS: u16 = 0o200;
    pub const ILLEGAL: u16 = 0o40;
    pub const SECTOR_ERROR: u16 = 0o20;
    pub const CHECK_WORD: u16 = 0o10;
    pub const DATA_LATE: u16 = 0o4;
    pub const WRITE_FAULT: u16 = 0o2;
    pub const ERROR: u16 = 0o1;

    pub const ERROR_FLAGS: u16 = ERROR | DATA_LATE | CHECK_WORD | SECTOR_ERROR
        | WRITE_FAULT | ILLEGAL | DRIVE_STATUS;
    /// Cleared by every start pulse.
    pub const CLEARED_ON_START: u16 = ERROR_FLAGS & !DRIVE_STATUS;
    /// Any of these implies ERROR.
    pub const GENERAL_ERROR: u16 = ILLEGAL | SECTOR_ERROR | CHECK_WORD | DATA_LATE | WRITE_FAULT;
}

/// Commands in the low byte of the specify command register.
pub mod command {
    pub const SETTLE: u16 = 0o0;
    pub const STEP_OUT: u16 = 0o1;
    pub const STEP_IN: u16 = 0o2;
    pub const READ_PREAMBLE: u16 = 0o10;
    pub const READ_NEXT: u16 = 0o20;
    pub const WRITE_NEXT: u16 = 0o40;
    pub const FORMAT_0: u16 = 0o240;
    pub const FORMAT_NEXT: u16 = 0o241;

    pub fn name(command: u16) -> &'static str {
        match command {
            SETTLE => "settle",
            STEP_OUT => "step out",
            STEP_IN => "step in",
            READ_PREAMBLE => "read preamble",
            READ_NEXT => "read next",
            WRITE_NEXT => "write next",
            FORMAT_0 => "format 0",
            FORMAT_NEXT => "format next",
            _ => "<?>",
        }
    }
}

use command::*;
use status::*;

/// Bootstrap loader read out a byte at a time with DIAS.
pub const PROGRAM_LOAD_ROM: [u8; 131] = [
    0x00, 0x07, 0xFF, 0xC0, 0x00, 0x3F, 0xFF, 0xD9, 0x00, 0x59, 0x28, 0x58, 0x21, 0xFC, 0x8F, 0x00,
    0x49, 0x38, 0xA8, 0x00, 0x11, 0x29, 0x11, 0x29, 0x11, 0x2A, 0x11, 0x2B, 0xAB, 0x04, 0x01, 0xFB,
    0x21, 0xF3, 0x31, 0xF3, 0x2A, 0x00, 0xDA, 0xC0, 0xFB, 0xC0, 0x4B, 0x00, 0xD3, 0x00, 0x83, 0x04,
    0x01, 0xFA, 0x03, 0xDB, 0x62, 0xBF, 0x65, 0xBF, 0x09, 0x15, 0x01, 0x04, 0x01, 0xFE, 0x85, 0x50,
    0x09, 0x11, 0xAA, 0x4B, 0x01, 0xFD, 0x85, 0x00, 0x09, 0x0E, 0xAE, 0x4B, 0x01, 0xFE, 0x21, 0x18,
    0x09, 0x0A, 0xC4, 0x1C, 0x01, 0xFE, 0x82, 0x50, 0x09, 0x06, 0x01, 0x02, 0x01, 0xEC, 0x21, 0x11,
    0x00, 0xFF, 0xD4, 0x91, 0xD4, 0x00, 0x62, 0x3F, 0x67, 0x7F, 0x01, 0xFF, 0x68, 0xFF, 0xCF, 0x00,
    0x75, 0x7F, 0xD2, 0x90, 0xD2, 0x90, 0xAA, 0x8B, 0xAA, 0x52, 0x03, 0x01, 0x03, 0x00, 0x00, 0x08,
    0x00, 0x44, 0x00,
];

/// Build a specify command word.
pub fn specify_command(unit: usize, sector: u16, command: u16) -> u16 {
    ((unit as u16 & 1) << 15) | ((sector & 0o7) << 8) | (command & 0o377)
}

fn sc_unit(sc: u16) -> usize {
    (sc >> 15) as usize
}

fn sc_sector(sc: u16) -> u16 {
    (sc >> 8) & 0o7
}

fn sc_command(sc: u16) -> u16 {
    sc & 0o377
}

/// Current address register value for a track and sector.
pub fn current_address(track: u16, sector: u16) -> u16 {
    ((track & 0o177) << 8) | ((sector & 0o7) << 2)
}

/// Delays, in virtual time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloppyTiming {
    pub settle: Time,
    /// Per track stepped.
    pub step: Time,
    /// Before a format completes.
    pub rotate_wait: Time,
    /// One sector passing under the head.
    pub sector_time: Time,
    /// Reading a sector's address mark.
    pub address_time: Time,
    /// Reading or writing a sector's data.
    pub data_time: Time,
}

impl Default for FloppyTiming {
    fn default() -> Self {
        FloppyTiming {
            settle: 10,
            step: 1,
            rotate_wait: 100,
            sector_time: 500,
            address_time: 5,
            data_time: 490,
        }
    }
}

/// The diskette controller. A rotation timer steps the sector under every
/// head; commands that need a particular sector wait on it.
pub struct FloppyController {
    units: Vec<DriveUnit>,
    sc: u16,
    ma: u16,
    ca: u16,
    rom_address: usize,
    status: u16,
    busy: bool,
    done: bool,
    timing: FloppyTiming,
    scheduler: Scheduler,
    interrupt_tx: Sender<u32>,
    interrupt_num: u32,
}

impl FloppyController {
    /// Create a controller with default timing. The rotation timer starts
    /// running straight away.
    pub fn new(interrupt_tx: Sender<u32>, interrupt_num: u32) -> Self {
        Self::with_timing(interrupt_tx, interrupt_num, FloppyTiming::default())
    }

    pub fn with_timing(interrupt_tx: Sender<u32>, interrupt_num: u32,
                       timing: FloppyTiming) -> Self {
        let mut floppy = FloppyController {
            units: (0..NUM_UNITS).map(|_| DriveUnit::new(FLOPPY_TYPES, TYPE_6038)).collect(),
            sc: 0,
            ma: 0,
            ca: 0,
            rom_address: 0,
            status: 0,
            busy: false,
            done: false,
            timing,
            scheduler: Scheduler::new(),
            interrupt_tx,
            interrupt_num,
        };
        floppy.reset();
        floppy
    }

    /// The raw status register, without the refresh a DIA performs.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The sector currently passing under a unit's head.
    pub fn sector_under_head(&self, unit: usize) -> DiskResult<u16> {
        self.unit(unit).map(|u| u.sector)
    }

    /// Run events until the done line rises or `deadline` passes. Returns
    /// whether the controller is done.
    pub fn run_until_done(&mut self, deadline: Time,
                          memory: &mut dyn DmaMemory) -> DiskResult<bool> {
        while !self.done {
            match self.scheduler.next_fire_time() {
                Some(time) if time <= deadline => self.run_until(time, memory)?,
                _ => {
                    self.scheduler.advance_to(deadline);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Drive the done line, interrupting on the rising edge.
    fn set_done(&mut self, done: bool) {
        if done && !self.done && self.interrupt_tx.send(self.interrupt_num).is_err() {
            warn!("DKT interrupt receiver has gone away.");
        }
        self.done = done;
    }

    fn complete(&mut self) {
        self.busy = false;
        self.set_done(true);
    }

    /// Does the unit have a command scheduled or waiting on rotation?
    fn engaged(&self, u: usize) -> bool {
        self.units[u].armed || self.scheduler.is_active(EventKey::Unit(u))
    }

    fn set_status(&mut self, bits: u16, on: bool) {
        if on {
            self.status |= bits;
        } else {
            self.status &= !bits;
        }
    }

    /// Status with the drive lines of the selected unit sampled now.
    fn read_status(&mut self) -> u16 {
        let unit = &self.units[sc_unit(self.sc)];
        let (attached, locked) = (unit.is_attached(), unit.write_locked);
        self.set_status(NOT_READY, !attached);
        self.set_status(WRITE_PROTECT, locked);
        self.status
    }

    /// Start the command in SC. Returns false if it was refused and must be
    /// completed immediately.
    fn dispatch(&mut self) -> bool {
        self.status &= !ERROR_FLAGS;
        let u = sc_unit(self.sc);
        if self.engaged(u) {
            debug!("DKT unit {} already has a command.", u);
            self.status |= ERROR;
            return false;
        }
        let unit = &mut self.units[u];
        if !unit.is_attached() {
            debug!("DKT unit {} has no diskette.", u);
            self.status |= DRIVE_STATUS | ERROR;
            return false;
        }

        let command = sc_command(self.sc);
        unit.function = command;
        debug!("DKT unit {} {}: track {} sector {} MA {:06o}.",
               u, command::name(command), unit.cylinder, sc_sector(self.sc), self.ma);
        let key = EventKey::Unit(u);
        match command {
            SETTLE => self.scheduler.schedule(key, self.timing.settle),
            STEP_IN | STEP_OUT => self.scheduler.schedule(key, self.timing.step),
            READ_PREAMBLE | READ_NEXT => unit.armed = true,
            WRITE_NEXT | FORMAT_0 | FORMAT_NEXT if unit.write_locked => {
                self.status |= WRITE_FAULT;
                return false;
            }
            WRITE_NEXT => unit.armed = true,
            FORMAT_0 | FORMAT_NEXT => self.scheduler.schedule(key, self.timing.rotate_wait),
            _ => {
                self.status |= ILLEGAL;
                return false;
            }
        }
        true
    }

    /// One sector time has passed.
    fn rotate(&mut self) {
        for unit in self.units.iter_mut() {
            unit.sector = (unit.sector + 1) % unit.geometry().sectors;
        }

        // A waiting command is released so as to finish while its sector
        // is under the head.
        let u = sc_unit(self.sc);
        let key = EventKey::Unit(u);
        if self.units[u].armed && !self.scheduler.is_active(key) {
            let timing = self.timing;
            let unit = &mut self.units[u];
            unit.armed = false;
            let delay = if unit.function == READ_PREAMBLE {
                timing.address_time
            } else {
                let sectors = unit.geometry().sectors;
                let wanted = sc_sector(self.sc) % sectors;
                let turns = (wanted + sectors - unit.sector) % sectors;
                turns as Time * timing.sector_time + timing.address_time + timing.data_time
            };
            trace!("DKT unit {} {} released at sector {}, due in {}.",
                   u, command::name(unit.function), unit.sector, delay);
            self.scheduler.schedule(key, delay);
        }

        self.scheduler.schedule(EventKey::RotationTimer, self.timing.sector_time.max(1));
    }

    /// Handle a unit's event.
    fn service(&mut self, u: usize, memory: &mut dyn DmaMemory) -> DiskResult<()> {
        let wanted = sc_sector(self.sc);
        let unit = &mut self.units[u];
        let cylinders = unit.geometry().cylinders;
        let mut result = Ok(());
        match unit.function {
            SETTLE => self.status |= HEAD_ON,
            STEP_IN => {
                if unit.cylinder + 1 < cylinders {
                    unit.cylinder += 1;
                }
                trace!("DKT unit {} stepped in to track {}.", u, unit.cylinder);
            }
            STEP_OUT => {
                unit.cylinder = unit.cylinder.saturating_sub(1);
                trace!("DKT unit {} stepped out to track {}.", u, unit.cylinder);
            }
            READ_PREAMBLE => self.ca = current_address(unit.cylinder, unit.sector),
            READ_NEXT | WRITE_NEXT => {
                self.ca = current_address(unit.cylinder, unit.sector);
                if unit.sector != wanted {
                    debug!("DKT unit {} wanted sector {}, head is over {}.",
                           u, wanted, unit.sector);
                    self.status |= SECTOR_ERROR;
                } else {
                    result = self.transfer(u, memory);
                }
            }
            FORMAT_0 | FORMAT_NEXT => {}
            _ => self.status |= ILLEGAL | ERROR,
        }

        let at_track0 = self.units[u].cylinder == 0;
        self.set_status(TRACK0, at_track0);
        if self.status & GENERAL_ERROR != 0 {
            self.status |= ERROR;
        }
        self.complete();
        result
    }

    fn transfer(&mut self, u: usize, memory: &mut dyn DmaMemory) -> DiskResult<()> {
        let unit = &self.units[u];
        let function = unit.function;
        if function == WRITE_NEXT && unit.write_locked {
            self.status |= WRITE_FAULT;
            return Ok(());
        }
        let block = unit.geometry().block_address(unit.cylinder, 0, unit.sector);
        let mut store = match self.units[u].take_store() {
            Some(store) => store,
            None => {
                self.status |= DRIVE_STATUS | ERROR;
                return Ok(());
            }
        };
        trace!("DKT unit {} {} block {} MA {:06o}.",
               u, command::name(function), block, self.ma);
        let result = self.transfer_sector(function, block, store.as_mut(), memory);
        self.units[u].restore_store(store);
        if let Err(e) = result {
            error!("DKT unit {} backing store failed: {}", u, e);
            self.status |= CHECK_WORD | ERROR;
            return Err(e.into());
        }
        Ok(())
    }

    fn transfer_sector(&mut self, function: u16, block: u32, store: &mut dyn SectorStore,
                       memory: &mut dyn DmaMemory) -> io::Result<()> {
        let mut buffer = [0; WORDS_PER_SECTOR];
        if function == READ_NEXT {
            store.read_sector(block, &mut buffer)?;
            for &word in buffer.iter() {
                dma_store(memory, 0, self.ma, word);
                self.ma = (self.ma + 1) & ADDRESS_MASK;
            }
        } else {
            for word in buffer.iter_mut() {
                *word = dma_load(memory, 0, self.ma);
                self.ma = (self.ma + 1) & ADDRESS_MASK;
            }
            store.write_sector(block, &buffer)?;
        }
        Ok(())
    }
}

impl DriveControl for FloppyController {
    fn units(&self) -> &[DriveUnit] {
        &self.units
    }

    fn units_mut(&mut self) -> &mut [DriveUnit] {
        &mut self.units
    }
}

impl IoDevice for FloppyController {
    fn io(&mut self, pulse: Pulse, op: IoOp, ac: u16) -> u16 {
        let mut value = 0;
        let u = sc_unit(self.sc);

        match pulse {
            Pulse::Start if self.engaged(u) => {
                debug!("DKT start refused, unit {} is engaged.", u);
                self.status |= ERROR;
            }
            Pulse::Start => {
                self.status &= !CLEARED_ON_START;
                self.busy = true;
                self.set_done(false);
                match op {
                    IoOp::Nio => {
                        self.rom_address = 0;
                        self.complete();
                    }
                    IoOp::Dia => {
                        value = PROGRAM_LOAD_ROM.get(self.rom_address).map_or(0, |&b| b as u16);
                        self.rom_address += 1;
                        self.complete();
                    }
                    IoOp::Doa => {
                        let selected = sc_unit(ac);
                        if selected != u {
                            // The new drive's last known position.
                            let unit = &self.units[selected];
                            self.ca = current_address(unit.cylinder, unit.sector);
                            self.set_status(UNIT, selected != 0);
                        }
                        self.sc = ac;
                        if !self.dispatch() {
                            self.complete();
                        }
                    }
                    _ => {
                        self.status |= ILLEGAL;
                        self.complete();
                    }
                }
            }
            _ => {
                value = match op {
                    IoOp::Dia => self.read_status(),
                    IoOp::Dib => self.ma & ADDRESS_MASK,
                    IoOp::Dob => {
                        self.ma = ac & ADDRESS_MASK;
                        0
                    }
                    IoOp::Dic => self.ca,
                    _ => 0,
                };
                if pulse == Pulse::Clear {
                    self.busy = false;
                    self.set_done(false);
                    self.status &= !ERROR_FLAGS;
                    let unit = &mut self.units[u];
                    if unit.armed {
                        debug!("DKT unit {} {} withdrawn.", u, command::name(unit.function));
                        unit.armed = false;
                    }
                    if matches!(unit.function, SETTLE | STEP_IN | STEP_OUT)
                            && self.scheduler.cancel(EventKey::Unit(u)) {
                        debug!("DKT unit {} head motion cancelled.", u);
                    }
                }
            }
        }

        if self.status & GENERAL_ERROR != 0 {
            self.status |= ERROR;
        }
        trace!("DKT {}{} AC={:06o} -> {:06o}, status {:06o}.",
               op.mnemonic(), pulse.suffix(), ac, value, self.status);
        value
    }

    fn reset(&mut self) {
        info!("DKT reset.");
        self.scheduler.clear();
        for unit in self.units.iter_mut() {
            unit.reset();
        }
        self.sc = 0;
        self.ma = 0;
        self.ca = 0;
        self.rom_address = 0;
        self.status = 0;
        self.busy = false;
        self.done = false;
        self.scheduler.schedule(EventKey::RotationTimer, self.timing.sector_time.max(1));
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
            match key {
                EventKey::Unit(u) => self.service(u, memory)?,
                EventKey::RotationTimer => self.rotate(),
            }
        }
        self.scheduler.advance_to(time);
        Ok(())
    }
}
