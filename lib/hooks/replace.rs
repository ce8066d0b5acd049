use crate::cpu::{self, Cpu, EmulatorContext};
use crate::error::*;
use unicorn_engine::Unicorn;


/// Where a called function finds the address it returns to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReturnAddress {
    /// In a link register, as left by `jal` or `bl`.
    Register(&'static str),
    /// In the pointer-sized slot at the stack pointer.
    StackTop,
}


/// How a replaced function hands back its result and returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallingConvention {
    pub return_value: &'static str,
    pub return_address: ReturnAddress,
}


impl CallingConvention {
    /// The address the function currently executing on `cpu` returns to.
    pub fn return_address(&self, cpu: &Cpu<'_, '_>) -> Result<u64> {
        match self.return_address {
            ReturnAddress::Register(name) => cpu.read_register(name),
            ReturnAddress::StackTop => {
                let sp = cpu.sp()?;
                cpu.read_pointer(sp)
            }
        }
    }
}


fn replace<F>(
    cpu: &mut Cpu<'_, '_>,
    address: u64,
    convention: &CallingConvention,
    callback: &mut F,
) -> Result<()>
where
    F: FnMut(&mut Cpu<'_, '_>) -> Result<u64>,
{
    let value = callback(cpu)?;
    let return_address = convention.return_address(cpu)?;

    trace!(
        "function at 0x{:x} returns 0x{:x} to 0x{:x}",
        address,
        value,
        return_address
    );

    cpu.write_register(convention.return_value, value)?;
    cpu.set_pc(return_address)
}


/// Run `callback` in place of the guest function at `address`.
pub(crate) fn dispatch<F>(
    uc: &mut Unicorn<'_, EmulatorContext>,
    address: u64,
    convention: &CallingConvention,
    callback: &mut F,
) where
    F: FnMut(&mut Cpu<'_, '_>) -> Result<u64>,
{
    let result = replace(&mut Cpu::new(uc), address, convention, callback);
    if let Err(error) = result {
        cpu::halt(uc, error);
    }
}
