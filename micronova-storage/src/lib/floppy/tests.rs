use super::*;

use ntest::timeout;
use rand;
use std::sync::{Arc, Mutex, mpsc::{self, Receiver}};

use crate::geometry::FLOPPY_TYPES;
use crate::init_test_logging;
use crate::memory::Memory;
use crate::store::{MemMedium, MemStore};

const INTERRUPT_NUM: u32 = 0o20;

/// A controller with a blank diskette in unit 0.
struct FloppyFixture {
    floppy: FloppyController,
    medium: Arc<Mutex<MemMedium>>,
    memory: Memory,
    interrupt_rx: Receiver<u32>,
}

impl FloppyFixture {
    fn new() -> Self {
        Self::with_timing(FloppyTiming::default())
    }

    fn with_timing(timing: FloppyTiming) -> Self {
        init_test_logging();

        let (tx, rx) = mpsc::channel();
        let mut floppy = FloppyController::with_timing(tx, INTERRUPT_NUM, timing);
        let (store, medium) = MemStore::new(FLOPPY_TYPES[TYPE_6038].blocks());
        floppy.attach_store(0, Box::new(store)).unwrap();
        FloppyFixture {
            floppy,
            medium,
            memory: Memory::new(),
            interrupt_rx: rx,
        }
    }

    /// Issue a specify command with the start pulse.
    fn start(&mut self, sc: u16) {
        self.floppy.io(Pulse::Start, IoOp::Doa, sc);
    }

    fn run_to_done(&mut self) -> bool {
        let deadline = self.floppy.now() + 100_000;
        self.floppy.run_until_done(deadline, &mut self.memory).unwrap()
    }

    fn advance(&mut self, delay: Time) {
        let time = self.floppy.now() + delay;
        self.floppy.run_until(time, &mut self.memory).unwrap();
    }

    fn status(&mut self) -> u16 {
        self.floppy.io(Pulse::None, IoOp::Dia, 0)
    }

    fn interrupts(&self) -> usize {
        self.interrupt_rx.try_iter()
            .inspect(|&n| assert_eq!(n, INTERRUPT_NUM))
            .count()
    }

    /// Put random data in a sector of the diskette, returning it.
    fn fill_sector(&self, track: u16, sector: u16) -> Vec<u16> {
        let mut data = Vec::with_capacity(WORDS_PER_SECTOR);
        data.resize_with(WORDS_PER_SECTOR, rand::random);
        let base = FLOPPY_TYPES[TYPE_6038].block_address(track, 0, sector) as usize
            * WORDS_PER_SECTOR;
        self.medium.lock().unwrap().words[base..base + WORDS_PER_SECTOR].copy_from_slice(&data);
        data
    }

    fn memory_slice(&self, start: usize, len: usize) -> Vec<u16> {
        (start..start + len).map(|i| self.memory[i]).collect()
    }

    fn step_in(&mut self, tracks: u16) {
        for _ in 0..tracks {
            self.start(specify_command(0, 0, STEP_IN));
            assert!(self.run_to_done());
        }
    }
}

#[test]
fn test_reset_arms_timer() {
    let mut fixture = FloppyFixture::new();
    assert_eq!(fixture.floppy.scheduler.fire_time(EventKey::RotationTimer), Some(500));
    assert!(!fixture.floppy.busy());
    assert!(!fixture.floppy.done());

    fixture.advance(1500);
    assert_eq!(fixture.floppy.sector_under_head(0).unwrap(), 3);
    assert_eq!(fixture.floppy.sector_under_head(1).unwrap(), 3);

    fixture.floppy.io(Pulse::None, IoOp::Dob, 0o1234);
    fixture.floppy.reset();
    assert_eq!(fixture.floppy.sector_under_head(0).unwrap(), 0);
    assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dib, 0), 0);
    assert_eq!(fixture.floppy.status(), 0);
    assert_eq!(fixture.floppy.scheduler.fire_time(EventKey::RotationTimer), Some(2000));
    assert_eq!(fixture.interrupts(), 0);
}

#[test]
#[timeout(1000)]
fn test_timer_always_rearms() {
    let mut fixture = FloppyFixture::new();
    fixture.advance(500 * 1001);
    assert_eq!(fixture.floppy.sector_under_head(0).unwrap(), 1001 % 8);
    assert_eq!(fixture.floppy.scheduler.fire_time(EventKey::RotationTimer), Some(500 * 1002));
}

#[test]
#[timeout(10000)]
fn test_rotational_latency() {
    let sectors = FLOPPY_TYPES[TYPE_6038].sectors;
    let timing = FloppyTiming::default();
    for start in 0..sectors {
        for wanted in 0..sectors {
            let mut fixture = FloppyFixture::new();
            let data = fixture.fill_sector(0, wanted);
            // Issue the command on a sector boundary.
            let issued = start as Time * timing.sector_time;
            fixture.floppy.run_until(issued, &mut fixture.memory).unwrap();
            assert_eq!(fixture.floppy.sector_under_head(0).unwrap(), start);
            fixture.floppy.io(Pulse::None, IoOp::Dob, 0o1000);
            fixture.start(specify_command(0, wanted, READ_NEXT));
            assert!(fixture.floppy.busy());
            assert!(fixture.run_to_done());
            assert_eq!(fixture.interrupts(), 1);

            let elapsed = fixture.floppy.now() - issued;
            let distance = ((wanted + sectors - start) % sectors) as Time;
            assert!(elapsed >= distance * timing.sector_time + timing.address_time);
            // Released at the next boundary, finishing before the wanted sector passes.
            let turns = ((wanted + 2 * sectors - start - 1) % sectors) as Time;
            assert_eq!(elapsed, (turns + 1) * timing.sector_time
                       + timing.address_time + timing.data_time);

            assert_eq!(fixture.floppy.status() & ERROR_FLAGS, 0);
            assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dic, 0), current_address(0, wanted));
            assert_eq!(fixture.memory_slice(0o1000, WORDS_PER_SECTOR), data);
            assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dib, 0),
                       0o1000 + WORDS_PER_SECTOR as u16);
        }
    }
}

#[test]
fn test_read_issued_just_before_boundary() {
    // Armed one unit before the head reaches the wanted sector: released at
    // the boundary with no extra turn, finishing inside that sector.
    let timing = FloppyTiming::default();
    let mut fixture = FloppyFixture::new();
    let data = fixture.fill_sector(0, 1);
    let issued = timing.sector_time - 1;
    fixture.floppy.run_until(issued, &mut fixture.memory).unwrap();
    assert_eq!(fixture.floppy.sector_under_head(0).unwrap(), 0);

    fixture.start(specify_command(0, 1, READ_NEXT));
    assert!(fixture.run_to_done());
    let elapsed = fixture.floppy.now() - issued;
    assert_eq!(elapsed, 1 + timing.address_time + timing.data_time);
    assert!(elapsed < timing.sector_time);
    assert_eq!(fixture.floppy.sector_under_head(0).unwrap(), 1);
    assert_eq!(fixture.floppy.status() & ERROR_FLAGS, 0);
    assert_eq!(fixture.memory_slice(0, WORDS_PER_SECTOR), data);
    assert_eq!(fixture.interrupts(), 1);
}

#[test]
fn test_read_preamble() {
    let mut fixture = FloppyFixture::new();
    fixture.step_in(5);
    fixture.advance(500 - fixture.floppy.now() % 500);
    let sector = fixture.floppy.sector_under_head(0).unwrap();

    fixture.start(specify_command(0, 0, READ_PREAMBLE));
    let issued = fixture.floppy.now();
    assert!(fixture.run_to_done());
    assert_eq!(fixture.floppy.now() - issued, 500 + 5);
    assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dic, 0),
               current_address(5, (sector + 1) % 8));
    assert_eq!(fixture.floppy.status() & ERROR_FLAGS, 0);
}

#[test]
fn test_late_data_is_sector_error() {
    // Data slower than a sector means the head has moved on.
    let mut fixture = FloppyFixture::with_timing(FloppyTiming {
        data_time: 600,
        ..FloppyTiming::default()
    });
    fixture.fill_sector(0, 3);
    fixture.start(specify_command(0, 3, READ_NEXT));
    assert!(fixture.run_to_done());
    let status = fixture.floppy.status();
    assert_eq!(status & ERROR_FLAGS, SECTOR_ERROR | ERROR);
    assert_eq!(fixture.memory[0], 0);
    assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dib, 0), 0);
}

#[test]
fn test_step_clamps() {
    let mut fixture = FloppyFixture::new();
    fixture.start(specify_command(0, 0, STEP_OUT));
    assert!(fixture.run_to_done());
    assert_eq!(fixture.floppy.cylinder(0).unwrap(), 0);
    assert_ne!(fixture.floppy.status() & TRACK0, 0);

    fixture.step_in(80);
    assert_eq!(fixture.floppy.cylinder(0).unwrap(), 76);
    assert_eq!(fixture.floppy.status() & (TRACK0 | ERROR_FLAGS), 0);

    fixture.start(specify_command(0, 0, STEP_OUT));
    let issued = fixture.floppy.now();
    assert!(fixture.run_to_done());
    assert_eq!(fixture.floppy.now() - issued, 1);
    assert_eq!(fixture.floppy.cylinder(0).unwrap(), 75);
}

#[test]
fn test_settle_loads_head() {
    let mut fixture = FloppyFixture::new();
    assert_eq!(fixture.status() & HEAD_ON, 0);
    fixture.start(specify_command(0, 0, SETTLE));
    fixture.advance(9);
    assert!(!fixture.floppy.done());
    fixture.advance(1);
    assert!(fixture.floppy.done());
    assert_ne!(fixture.status() & HEAD_ON, 0);
    assert_eq!(fixture.interrupts(), 1);
}

#[test]
fn test_write_then_read() {
    let mut fixture = FloppyFixture::new();
    fixture.step_in(3);
    let mut data = Vec::with_capacity(WORDS_PER_SECTOR);
    data.resize_with(WORDS_PER_SECTOR, rand::random);
    for (i, word) in data.iter().enumerate() {
        fixture.memory[0o2000 + i] = *word;
    }

    fixture.floppy.io(Pulse::None, IoOp::Dob, 0o2000);
    fixture.start(specify_command(0, 5, WRITE_NEXT));
    assert!(fixture.run_to_done());
    assert_eq!(fixture.floppy.status() & ERROR_FLAGS, 0);
    {
        let medium = fixture.medium.lock().unwrap();
        assert_eq!(medium.writes, 1);
        let base = FLOPPY_TYPES[TYPE_6038].block_address(3, 0, 5) as usize * WORDS_PER_SECTOR;
        assert_eq!(&medium.words[base..base + WORDS_PER_SECTOR], &data[..]);
    }

    fixture.floppy.io(Pulse::None, IoOp::Dob, 0o4000);
    fixture.start(specify_command(0, 5, READ_NEXT));
    assert!(fixture.run_to_done());
    assert_eq!(fixture.memory_slice(0o4000, WORDS_PER_SECTOR), data);
    assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dic, 0), current_address(3, 5));
}

#[test]
fn test_write_protect() {
    let mut fixture = FloppyFixture::new();
    fixture.floppy.set_write_lock(0, true).unwrap();
    assert_ne!(fixture.status() & WRITE_PROTECT, 0);

    for command in [WRITE_NEXT, FORMAT_0, FORMAT_NEXT] {
        fixture.start(specify_command(0, 2, command));
        assert!(fixture.floppy.done());
        assert!(!fixture.floppy.busy());
        assert!(!fixture.floppy.engaged(0));
        assert_eq!(fixture.floppy.status() & ERROR_FLAGS, WRITE_FAULT | ERROR);
    }
    fixture.advance(10_000);
    assert_eq!(fixture.medium.lock().unwrap().writes, 0);

    fixture.floppy.set_write_lock(0, false).unwrap();
    assert_eq!(fixture.status() & WRITE_PROTECT, 0);
}

#[test]
fn test_empty_drive() {
    let mut fixture = FloppyFixture::new();
    fixture.advance(1000);
    fixture.start(specify_command(1, 0, READ_NEXT));
    assert!(fixture.floppy.done());
    assert!(!fixture.floppy.busy());
    assert_eq!(fixture.interrupts(), 1);
    // Selecting the drive brings back its position.
    assert_eq!(fixture.floppy.io(Pulse::None, IoOp::Dic, 0), current_address(0, 2));

    let status = fixture.status();
    assert_eq!(status & ERROR_FLAGS, DRIVE_STATUS | ERROR);
    assert_ne!(status & NOT_READY, 0);
    assert_ne!(status & UNIT, 0);

    // Back to unit 0.
    fixture.start(specify_command(0, 0, SETTLE));
    assert_eq!(fixture.status() & (UNIT | NOT_READY | DRIVE_STATUS), 0);
}

#[test]
fn test_illegal_commands() {
    let mut fixture = FloppyFixture::new();
    fixture.start(specify_command(0, 0, 0o77));
    assert!(fixture.floppy.done());
    assert_eq!(fixture.floppy.status() & ERROR_FLAGS, ILLEGAL | ERROR);

    fixture.floppy.io(Pulse::None, IoOp::Nio, 0);
    fixture.floppy.io(Pulse::Start, IoOp::Dob, 0o777);
    assert!(fixture.floppy.done());
    assert!(!fixture.floppy.busy());
    assert_eq!(fixture.floppy.status() & ERROR_FLAGS, ILLEGAL | ERROR);
    assert_eq!(fixture.interrupts(), 2);
}

#[test]
fn test_clear() {
    let mut fixture = FloppyFixture::new();

    // A command waiting for its sector is withdrawn.
    fixture.start(specify_command(0, 2, READ_NEXT));
    assert!(fixture.floppy.engaged(0));
    fixture.floppy.io(Pulse::Clear, IoOp::Nio, 0);
    assert!(!fixture.floppy.busy());
    assert!(!fixture.floppy.engaged(0));
    fixture.advance(5000);
    assert!(!fixture.floppy.done());
    assert_eq!(fixture.interrupts(), 0);

    // So is head motion.
    fixture.start(specify_command(0, 0, STEP_IN));
    fixture.floppy.io(Pulse::Clear, IoOp::Nio, 0);
    fixture.advance(100);
    assert_eq!(fixture.floppy.cylinder(0).unwrap(), 0);
    assert!(!fixture.floppy.done());

    // A format already under way finishes.
    fixture.start(specify_command(0, 0, FORMAT_0));
    fixture.floppy.io(Pulse::Clear, IoOp::Nio, 0);
    assert!(!fixture.floppy.busy());
    assert!(fixture.run_to_done());
    assert_eq!(fixture.interrupts(), 1);
}

#[test]
fn test_start_while_engaged() {
    let mut fixture = FloppyFixture::new();
    let data = fixture.fill_sector(0, 4);
    fixture.start(specify_command(0, 4, READ_NEXT));
    fixture.start(specify_command(0, 0, STEP_IN));
    assert!(fixture.floppy.busy());
    assert_ne!(fixture.floppy.status() & ERROR, 0);

    assert!(fixture.run_to_done());
    assert_eq!(fixture.memory_slice(0, WORDS_PER_SECTOR), data);
    assert_eq!(fixture.floppy.cylinder(0).unwrap(), 0);
}

#[test]
fn test_program_load_rom() {
    let mut fixture = FloppyFixture::new();
    fixture.floppy.io(Pulse::Start, IoOp::Nio, 0);
    assert!(fixture.floppy.done());
    for &byte in PROGRAM_LOAD_ROM.iter() {
        assert_eq!(fixture.floppy.io(Pulse::Start, IoOp::Dia, 0), byte as u16);
        assert!(fixture.floppy.done());
    }
    // Past the end reads zero.
    assert_eq!(fixture.floppy.io(Pulse::Start, IoOp::Dia, 0), 0);
    fixture.floppy.io(Pulse::Start, IoOp::Nio, 0);
    assert_eq!(fixture.floppy.io(Pulse::Start, IoOp::Dia, 0), 0x00);
    assert_eq!(fixture.floppy.io(Pulse::Start, IoOp::Dia, 0), 0x07);
    assert_eq!(fixture.interrupts(), PROGRAM_LOAD_ROM.len() + 5);
}

#[test]
fn test_backing_store_failure() {
    let mut fixture = FloppyFixture::new();
    fixture.medium.lock().unwrap().fail_reads = true;
    fixture.start(specify_command(0, 1, READ_NEXT));
    let result = fixture.floppy.run_until_done(100_000, &mut fixture.memory);
    assert!(matches!(result, Err(crate::DiskError::Io(_))));
    assert!(fixture.floppy.done());
    assert!(!fixture.floppy.busy());
    assert_eq!(fixture.floppy.status() & (CHECK_WORD | ERROR), CHECK_WORD | ERROR);
}
