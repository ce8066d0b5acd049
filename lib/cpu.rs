//! The emulator state an adapter owns, and the `Cpu` view of it that hooks
//! receive.

use crate::arch::Endian;
use crate::error::*;
use crate::registers::{RegisterIndex, RegisterStorage, Registers};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::rc::Rc;
use unicorn_engine::unicorn_const::Permission;
use unicorn_engine::Unicorn;


/// The emulator type every `Architecture` builds.
pub type Emulator = Unicorn<'static, EmulatorContext>;


/// Data the adapter keeps inside its emulator, so that hooks can reach it.
pub struct EmulatorContext {
    index: Rc<RegisterIndex>,
    endian: Endian,
    pointer_size: usize,
    halt_error: Option<Error>,
    in_fault_hook: bool,
}


impl EmulatorContext {
    pub(crate) fn new(
        index: Rc<RegisterIndex>,
        endian: Endian,
        pointer_size: usize,
    ) -> EmulatorContext {
        EmulatorContext {
            index,
            endian,
            pointer_size,
            halt_error: None,
            in_fault_hook: false,
        }
    }

    pub(crate) fn take_halt_error(&mut self) -> Option<Error> {
        self.halt_error.take()
    }

    /// Returns false if the fault hook is already running.
    pub(crate) fn enter_fault_hook(&mut self) -> bool {
        if self.in_fault_hook {
            false
        } else {
            self.in_fault_hook = true;
            true
        }
    }

    pub(crate) fn leave_fault_hook(&mut self) {
        self.in_fault_hook = false;
    }
}


/// Stop the emulator from inside a hook, recording `error` as the reason.
///
/// Only the first error of a run is kept.
pub(crate) fn halt(uc: &mut Unicorn<'_, EmulatorContext>, error: Error) {
    error!("halting emulation: {}", error);

    let context = uc.get_data_mut();
    if context.halt_error.is_none() {
        context.halt_error = Some(error);
    }

    if let Err(err) = uc.emu_stop() {
        warn!("failed to stop emulation: {:?}", err);
    }
}


/// Register and memory access to an emulated CPU.
///
/// A `Cpu` is handed to fault hooks and function replacements while the
/// emulator is running, and is available from `Architecture::cpu` to set up
/// state before a run.
pub struct Cpu<'c, 'u> {
    uc: &'c mut Unicorn<'u, EmulatorContext>,
    index: Rc<RegisterIndex>,
}


impl<'c, 'u> Cpu<'c, 'u> {
    pub(crate) fn new(uc: &'c mut Unicorn<'u, EmulatorContext>) -> Cpu<'c, 'u> {
        let index = uc.get_data().index.clone();
        Cpu { uc, index }
    }

    /// Named access to every register.
    pub fn registers(&mut self) -> Registers<'_, Unicorn<'u, EmulatorContext>> {
        Registers::new(&self.index, &mut *self.uc)
    }

    pub fn read_register(&self, name: &str) -> Result<u64> {
        self.uc.read_slot(self.index.slot(name)?)
    }

    pub fn write_register(&mut self, name: &str, value: u64) -> Result<()> {
        let slot = self.index.slot(name)?;
        self.uc.write_slot(slot, value)
    }

    pub fn sp(&self) -> Result<u64> {
        self.uc.read_slot(self.index.stack_pointer())
    }

    pub fn set_sp(&mut self, value: u64) -> Result<()> {
        self.uc.write_slot(self.index.stack_pointer(), value)
    }

    pub fn pc(&self) -> Result<u64> {
        self.uc.read_slot(self.index.program_counter())
    }

    pub fn set_pc(&mut self, value: u64) -> Result<()> {
        self.uc.write_slot(self.index.program_counter(), value)
    }

    /// The byte order of the emulated CPU.
    pub fn endian(&self) -> Endian {
        self.uc.get_data().endian
    }

    /// The size of a guest pointer in bytes.
    pub fn pointer_size(&self) -> usize {
        self.uc.get_data().pointer_size
    }

    /// Map `size` bytes at `address`. Both must be page aligned.
    pub fn mem_map(&mut self, address: u64, size: usize, permissions: Permission) -> Result<()> {
        Ok(self.uc.mem_map(address, size as _, permissions)?)
    }

    pub fn mem_read(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        Ok(self.uc.mem_read_as_vec(address, size)?)
    }

    pub fn mem_write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        Ok(self.uc.mem_write(address, bytes)?)
    }

    /// Read a guest pointer at `address`, in guest byte order.
    pub fn read_pointer(&self, address: u64) -> Result<u64> {
        let size = self.pointer_size();
        let bytes = self.mem_read(address, size)?;
        Ok(match self.endian() {
            Endian::Big => BigEndian::read_uint(&bytes, size),
            Endian::Little => LittleEndian::read_uint(&bytes, size),
        })
    }

    /// Write a guest pointer at `address`, in guest byte order.
    pub fn write_pointer(&mut self, address: u64, value: u64) -> Result<()> {
        let size = self.pointer_size();
        let value = if size >= 8 {
            value
        } else {
            value & ((1u64 << (size * 8)) - 1)
        };

        let mut bytes = vec![0; size];
        match self.endian() {
            Endian::Big => BigEndian::write_uint(&mut bytes, value, size),
            Endian::Little => LittleEndian::write_uint(&mut bytes, value, size),
        }
        self.mem_write(address, &bytes)
    }

    /// Ask the emulator to stop, ending the run without an error.
    ///
    /// A hook that calls this still completes. A function replacement still
    /// returns, so the run stops at the return address.
    pub fn stop(&mut self) -> Result<()> {
        Ok(self.uc.emu_stop()?)
    }

    /// The underlying Unicorn instance.
    pub fn emulator(&mut self) -> &mut Unicorn<'u, EmulatorContext> {
        self.uc
    }
}
