use crate::error::DiskResult;
use crate::memory::DmaMemory;
use crate::scheduler::Time;

/// Control pulse accompanying an I/O instruction (IR<8:9>).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    None,
    Start,
    Clear,
    Special,
}

/// I/O instruction opcode (IR<5:7>).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    /// No transfer, pulse only.
    Nio,
    /// Read A: status.
    Dia,
    /// Write A: command and cylinder.
    Doa,
    /// Read B: memory address.
    Dib,
    /// Write B: memory address.
    Dob,
    /// Read C: unit select / current address.
    Dic,
    /// Write C: unit select.
    Doc,
    /// Skip on busy/done; handled by the CPU, never reaches a device.
    Skp,
}

impl IoOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IoOp::Nio => "NIO",
            IoOp::Dia => "DIA",
            IoOp::Doa => "DOA",
            IoOp::Dib => "DIB",
            IoOp::Dob => "DOB",
            IoOp::Dic => "DIC",
            IoOp::Doc => "DOC",
            IoOp::Skp => "SKP",
        }
    }
}

impl Pulse {
    pub fn suffix(self) -> &'static str {
        match self {
            Pulse::None => "",
            Pulse::Start => "S",
            Pulse::Clear => "C",
            Pulse::Special => "P",
        }
    }
}

/// An I/O bus peripheral driven in virtual time.
pub trait IoDevice {
    /// Perform one bus transaction, returning the data-in value (zero for
    /// output opcodes).
    fn io(&mut self, pulse: Pulse, op: IoOp, ac: u16) -> u16;

    /// Return the device to its power-on state.
    fn reset(&mut self);

    fn busy(&self) -> bool;
    fn done(&self) -> bool;

    /// The device's current virtual time.
    fn now(&self) -> Time;

    /// Run every event due at or before `time`, transferring data through
    /// `memory`. Returns early with the error if the backing store fails;
    /// the failed operation has still completed from the bus's point of
    /// view.
    fn run_until(&mut self, time: Time, memory: &mut dyn DmaMemory) -> DiskResult<()>;
}
