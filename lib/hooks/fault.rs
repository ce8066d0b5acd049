use crate::cpu::{self, Cpu, EmulatorContext};
use crate::error::*;
use std::fmt;
use unicorn_engine::unicorn_const::MemType;
use unicorn_engine::Unicorn;


/// What kind of memory access raised a fault.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FaultKind {
    Read,
    Write,
    Fetch,
    ReadUnmapped,
    WriteUnmapped,
    FetchUnmapped,
    WriteProtected,
    ReadProtected,
    FetchProtected,
    ReadAfter,
}


impl FaultKind {
    /// Whether the faulting access was a store.
    pub fn is_write(&self) -> bool {
        match self {
            FaultKind::Write | FaultKind::WriteUnmapped | FaultKind::WriteProtected => true,
            FaultKind::Read
            | FaultKind::Fetch
            | FaultKind::ReadUnmapped
            | FaultKind::FetchUnmapped
            | FaultKind::ReadProtected
            | FaultKind::FetchProtected
            | FaultKind::ReadAfter => false,
        }
    }
}


impl From<MemType> for FaultKind {
    fn from(mem_type: MemType) -> FaultKind {
        match mem_type {
            MemType::READ => FaultKind::Read,
            MemType::WRITE => FaultKind::Write,
            MemType::FETCH => FaultKind::Fetch,
            MemType::READ_UNMAPPED => FaultKind::ReadUnmapped,
            MemType::WRITE_UNMAPPED => FaultKind::WriteUnmapped,
            MemType::FETCH_UNMAPPED => FaultKind::FetchUnmapped,
            MemType::WRITE_PROT => FaultKind::WriteProtected,
            MemType::READ_PROT => FaultKind::ReadProtected,
            MemType::FETCH_PROT => FaultKind::FetchProtected,
            MemType::READ_AFTER => FaultKind::ReadAfter,
        }
    }
}


impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FaultKind::Read => "READ",
            FaultKind::Write => "WRITE",
            FaultKind::Fetch => "FETCH",
            FaultKind::ReadUnmapped => "READ_UNMAPPED",
            FaultKind::WriteUnmapped => "WRITE_UNMAPPED",
            FaultKind::FetchUnmapped => "FETCH_UNMAPPED",
            FaultKind::WriteProtected => "WRITE_PROT",
            FaultKind::ReadProtected => "READ_PROT",
            FaultKind::FetchProtected => "FETCH_PROT",
            FaultKind::ReadAfter => "READ_AFTER",
        };
        write!(f, "{}", name)
    }
}


/// A single invalid memory access, as reported to a fault hook.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FaultEvent {
    kind: FaultKind,
    address: u64,
    size: usize,
    value: u64,
}


impl FaultEvent {
    /// `value` is the data being stored. It is truncated to `size` bytes, and
    /// ignored unless the access is a write.
    pub fn new(kind: FaultKind, address: u64, size: usize, value: i64) -> FaultEvent {
        let value = if !kind.is_write() {
            0
        } else if size >= 8 {
            value as u64
        } else {
            (value as u64) & ((1u64 << (size * 8)) - 1)
        };

        FaultEvent {
            kind,
            address,
            size,
            value,
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The value being stored, for write faults.
    pub fn value(&self) -> Option<u64> {
        if self.kind.is_write() {
            Some(self.value)
        } else {
            None
        }
    }

    /// This fault, described together with the address of the faulting
    /// instruction.
    pub fn at(&self, pc: u64) -> LocatedFault<'_> {
        LocatedFault { event: self, pc }
    }

    fn fmt_access(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, ", data size = {}", self.size)?;
        if let Some(value) = self.value() {
            write!(f, ", data value = 0x{:x}", value)?;
        }
        Ok(())
    }
}


impl fmt::Display for FaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid {} 0x{:x}", self.kind, self.address)?;
        self.fmt_access(f)
    }
}


/// A `FaultEvent` and the program counter it was raised at.
pub struct LocatedFault<'e> {
    event: &'e FaultEvent,
    pc: u64,
}


impl<'e> fmt::Display for LocatedFault<'e> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid {} 0x{:x} at 0x{:x}",
            self.event.kind, self.event.address, self.pc
        )?;
        self.event.fmt_access(f)
    }
}


/// A fault hook that logs the access and lets the fault stand.
pub fn log_invalid_access(cpu: &mut Cpu<'_, '_>, event: FaultEvent) -> Result<bool> {
    let pc = cpu.pc()?;
    warn!("{}", event.at(pc));
    Ok(false)
}


/// Run a fault hook for `event` and translate its outcome for the emulator.
///
/// An `Err` from the hook halts emulation. The error is returned from the
/// `run` that raised the fault.
pub(crate) fn dispatch<F>(
    uc: &mut Unicorn<'_, EmulatorContext>,
    event: FaultEvent,
    hook: &mut F,
) -> bool
where
    F: FnMut(&mut Cpu<'_, '_>, FaultEvent) -> Result<bool>,
{
    trace!("{}", event);

    if !uc.get_data_mut().enter_fault_hook() {
        cpu::halt(uc, ErrorKind::NestedFault(event.address()).into());
        return false;
    }

    let result = hook(&mut Cpu::new(uc), event);
    uc.get_data_mut().leave_fault_hook();

    match result {
        Ok(handled) => {
            if !handled {
                debug!("fault at 0x{:x} left unhandled", event.address());
            }
            handled
        }
        Err(error) => {
            cpu::halt(uc, error);
            false
        }
    }
}


#[test]
fn fault_kinds_follow_memory_types() {
    assert_eq!(FaultKind::from(MemType::READ_UNMAPPED), FaultKind::ReadUnmapped);
    assert_eq!(FaultKind::from(MemType::WRITE_UNMAPPED), FaultKind::WriteUnmapped);
    assert_eq!(FaultKind::from(MemType::FETCH_PROT), FaultKind::FetchProtected);
    assert_eq!(FaultKind::from(MemType::READ_AFTER), FaultKind::ReadAfter);

    assert!(FaultKind::WriteProtected.is_write());
    assert!(!FaultKind::FetchUnmapped.is_write());
}


#[test]
fn write_values_are_truncated_to_access_size() {
    let event = FaultEvent::new(FaultKind::WriteUnmapped, 0x5000_0000, 4, -1);
    assert_eq!(event.value(), Some(0xffff_ffff));

    let event = FaultEvent::new(FaultKind::WriteUnmapped, 0x5000_0000, 1, 0x1234);
    assert_eq!(event.value(), Some(0x34));

    let event = FaultEvent::new(FaultKind::WriteProtected, 0x5000_0000, 8, -2);
    assert_eq!(event.value(), Some(0xffff_ffff_ffff_fffe));
}


#[test]
fn reads_carry_no_value() {
    let event = FaultEvent::new(FaultKind::ReadUnmapped, 0x10, 4, 0x1234);
    assert_eq!(event.value(), None);
    assert_eq!(event.to_string(), "invalid READ_UNMAPPED 0x10, data size = 4");

    let event = FaultEvent::new(FaultKind::WriteUnmapped, 0x10, 2, 0xbeef);
    assert_eq!(
        event.to_string(),
        "invalid WRITE_UNMAPPED 0x10, data size = 2, data value = 0xbeef"
    );
}


#[test]
fn located_faults_name_the_pc_after_the_address() {
    let event = FaultEvent::new(FaultKind::WriteUnmapped, 0x5000_0000, 4, 0xdead_beef);
    assert_eq!(
        event.at(0x1004).to_string(),
        "invalid WRITE_UNMAPPED 0x50000000 at 0x1004, data size = 4, data value = 0xdeadbeef"
    );

    let event = FaultEvent::new(FaultKind::FetchUnmapped, 0x8000, 4, 0);
    assert_eq!(
        event.at(0x8000).to_string(),
        "invalid FETCH_UNMAPPED 0x8000 at 0x8000, data size = 4"
    );
}
