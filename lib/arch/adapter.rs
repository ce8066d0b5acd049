//! `Architecture`, the adapter that owns one variant's emulator, disassembler
//! and assembler, and installs fault hooks and function replacements on the
//! emulator.

use crate::arch::{arm64, resolve, ArchDescriptor, ArchType, EngineModes, Endian};
use crate::cpu::{Cpu, Emulator, EmulatorContext};
use crate::engine::{self, EngineKind, Instruction};
use crate::error::*;
use crate::hooks::{fault, replace, CallingConvention, FaultEvent, ReturnAddress};
use crate::registers::{RegisterIndex, Registers};
use capstone::{Capstone, ExtraMode};
use keystone_engine::Keystone;
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::rc::Rc;
use unicorn_engine::unicorn_const::{HookType, Mode};
use unicorn_engine::{UcHookId, Unicorn};


/// A lazily constructed engine.
///
/// Construction is attempted once. A failure is returned to the caller that
/// triggered it, and every later request reports the engine as unusable.
enum EngineSlot<T> {
    Vacant,
    Ready(T),
    Poisoned,
}


impl<T> EngineSlot<T> {
    fn get_or_try_init<F>(&mut self, kind: EngineKind, init: F) -> Result<&mut T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let EngineSlot::Vacant = self {
            match init() {
                Ok(engine) => *self = EngineSlot::Ready(engine),
                Err(error) => {
                    error!("could not construct {}: {}", kind, error);
                    *self = EngineSlot::Poisoned;
                    return Err(error);
                }
            }
        }

        match self {
            EngineSlot::Ready(engine) => Ok(engine),
            EngineSlot::Poisoned | EngineSlot::Vacant => Err(ErrorKind::AdapterUnusable(kind).into()),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            EngineSlot::Ready(_) => true,
            EngineSlot::Vacant | EngineSlot::Poisoned => false,
        }
    }
}


fn construction_failed(kind: EngineKind, reason: String) -> Error {
    ErrorKind::EngineConstruction(kind, reason).into()
}


fn emulator_slot<'s>(
    slot: &'s mut EngineSlot<Emulator>,
    descriptor: &'static ArchDescriptor,
    endian: Endian,
    mode: Mode,
    index: &Rc<RegisterIndex>,
) -> Result<&'s mut Emulator> {
    slot.get_or_try_init(EngineKind::Emulator, || {
        trace!("constructing {} emulator, mode {:?}", descriptor.name(), mode);
        let context = EmulatorContext::new(index.clone(), endian, descriptor.pointer_size);
        Unicorn::new_with_data(descriptor.emulator_arch, mode, context)
            .map_err(|err| construction_failed(EngineKind::Emulator, format!("{:?}", err)))
    })
}


/// One architecture variant in one byte order, and the engines for it.
///
/// The emulator, disassembler and assembler are each built on first use and
/// then reused for the life of the adapter.
pub struct Architecture {
    descriptor: &'static ArchDescriptor,
    endian: Endian,
    modes: EngineModes,
    index: Rc<RegisterIndex>,
    emulator: EngineSlot<Emulator>,
    disassembler: EngineSlot<Capstone>,
    assembler: EngineSlot<Keystone>,
    fault_hook: Option<UcHookId>,
    replacements: HashMap<u64, UcHookId>,
}


impl Architecture {
    /// Build an adapter for `arch_type` in byte order `endian`.
    ///
    /// The register index and engine modes are fixed here. No engine is
    /// constructed until it is first asked for.
    pub fn new(arch_type: ArchType, endian: Endian) -> Result<Architecture> {
        let descriptor = arch_type.descriptor();
        let index = descriptor.register_index()?;
        let modes = resolve(descriptor, endian)?;

        debug!(
            "{} {} endian, {} registers",
            descriptor.name(),
            endian,
            index.len()
        );

        Ok(Architecture {
            descriptor,
            endian,
            modes,
            index: Rc::new(index),
            emulator: EngineSlot::Vacant,
            disassembler: EngineSlot::Vacant,
            assembler: EngineSlot::Vacant,
            fault_hook: None,
            replacements: HashMap::new(),
        })
    }

    pub fn arch_type(&self) -> ArchType {
        self.descriptor.arch_type
    }

    pub fn descriptor(&self) -> &'static ArchDescriptor {
        self.descriptor
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn modes(&self) -> EngineModes {
        self.modes
    }

    pub fn register_index(&self) -> &RegisterIndex {
        &self.index
    }

    /// The calling convention `replace_function` uses.
    pub fn calling_convention(&self) -> CallingConvention {
        self.descriptor.calling_convention
    }

    /// The emulator, constructed on first use.
    pub fn emulator(&mut self) -> Result<&mut Emulator> {
        emulator_slot(
            &mut self.emulator,
            self.descriptor,
            self.endian,
            self.modes.emulator,
            &self.index,
        )
    }

    /// The disassembler, constructed on first use.
    pub fn disassembler(&mut self) -> Result<&Capstone> {
        let descriptor = self.descriptor;
        let (mode, endian) = self.modes.disassembler;
        let cs = self
            .disassembler
            .get_or_try_init(EngineKind::Disassembler, || {
                trace!("constructing {} disassembler", descriptor.name());
                Capstone::new_raw(
                    descriptor.disassembler_arch,
                    mode,
                    iter::empty::<ExtraMode>(),
                    Some(endian),
                )
                .map_err(|err| construction_failed(EngineKind::Disassembler, err.to_string()))
            })?;
        Ok(cs)
    }

    /// The assembler, constructed on first use.
    pub fn assembler(&mut self) -> Result<&Keystone> {
        let descriptor = self.descriptor;
        let mode = self.modes.assembler;
        let ks = self.assembler.get_or_try_init(EngineKind::Assembler, || {
            trace!("constructing {} assembler", descriptor.name());
            Keystone::new(descriptor.assembler_arch, mode)
                .map_err(|err| construction_failed(EngineKind::Assembler, format!("{:?}", err)))
        })?;
        Ok(ks)
    }

    /// Named access to the emulator's registers.
    pub fn registers(&mut self) -> Result<Registers<'_, Emulator>> {
        let emulator = emulator_slot(
            &mut self.emulator,
            self.descriptor,
            self.endian,
            self.modes.emulator,
            &self.index,
        )?;
        Ok(Registers::new(&self.index, emulator))
    }

    /// Register and memory access to the emulator, for setting up a run.
    pub fn cpu(&mut self) -> Result<Cpu<'_, 'static>> {
        Ok(Cpu::new(self.emulator()?))
    }

    /// Install the hook consulted on every invalid memory access.
    ///
    /// The hook returns `Ok(true)` if it repaired the fault and execution
    /// should resume, `Ok(false)` to let the fault stop the run. An `Err`
    /// halts the run and is returned from `run`.
    pub fn hook_mem_invalid<F>(&mut self, mut hook: F) -> Result<()>
    where
        F: FnMut(&mut Cpu<'_, '_>, FaultEvent) -> Result<bool> + 'static,
    {
        if self.fault_hook.is_some() {
            bail!(ErrorKind::FaultHookAlreadyRegistered);
        }

        let hook_id = self.emulator()?.add_mem_hook(
            HookType::MEM_INVALID,
            1,
            0,
            move |uc, mem_type, address, size, value| {
                let event = FaultEvent::new(mem_type.into(), address, size, value);
                fault::dispatch(uc, event, &mut hook)
            },
        )?;

        debug!("installed invalid memory hook");
        self.fault_hook = Some(hook_id);
        Ok(())
    }

    /// Remove the invalid memory hook, if one is installed.
    pub fn unhook_mem_invalid(&mut self) -> Result<()> {
        if let Some(hook_id) = self.fault_hook.take() {
            self.emulator()?.remove_hook(hook_id)?;
            debug!("removed invalid memory hook");
        }
        Ok(())
    }

    /// Run `callback` instead of the guest function at `address`, returning
    /// through this architecture's calling convention.
    pub fn replace_function<F>(&mut self, address: u64, callback: F) -> Result<()>
    where
        F: FnMut(&mut Cpu<'_, '_>) -> Result<u64> + 'static,
    {
        let convention = self.descriptor.calling_convention;
        self.replace_function_with(address, convention, callback)
    }

    /// Run `callback` instead of the guest function at `address`.
    ///
    /// When execution reaches `address` the callback runs, its result is
    /// written to the convention's return-value register, and execution
    /// continues at the return address.
    pub fn replace_function_with<F>(
        &mut self,
        address: u64,
        convention: CallingConvention,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Cpu<'_, '_>) -> Result<u64> + 'static,
    {
        if self.replacements.contains_key(&address) {
            bail!(ErrorKind::DuplicateReplacement(address));
        }

        self.index.slot(convention.return_value)?;
        if let ReturnAddress::Register(name) = convention.return_address {
            self.index.slot(name)?;
        }

        let hook_id = self
            .emulator()?
            .add_code_hook(address, address, move |uc, _, _| {
                replace::dispatch(uc, address, &convention, &mut callback)
            })?;

        debug!("replaced function at 0x{:x}", address);
        self.replacements.insert(address, hook_id);
        Ok(())
    }

    /// Let the guest function at `address` run again.
    pub fn remove_replacement(&mut self, address: u64) -> Result<()> {
        let hook_id = match self.replacements.remove(&address) {
            Some(hook_id) => hook_id,
            None => bail!(ErrorKind::NoReplacement(address)),
        };
        self.emulator()?.remove_hook(hook_id)?;
        debug!("restored function at 0x{:x}", address);
        Ok(())
    }

    /// Emulate from `begin` until `until` is reached.
    ///
    /// `timeout` is in microseconds and `count` bounds the number of
    /// instructions. Zero means no limit for either. If a hook halted the
    /// run, its error is returned in place of the emulator's status.
    pub fn run(&mut self, begin: u64, until: u64, timeout: u64, count: usize) -> Result<()> {
        let emulator = self.emulator()?;
        emulator.get_data_mut().take_halt_error();

        debug!("running from 0x{:x} until 0x{:x}", begin, until);
        let status = emulator.emu_start(begin, until, timeout, count);

        if let Some(error) = emulator.get_data_mut().take_halt_error() {
            return Err(error);
        }
        status?;

        trace!("stopped at 0x{:x}", emulator.pc_read()?);
        Ok(())
    }

    /// Decode `code`, located at `address`.
    pub fn disassemble(&mut self, code: &[u8], address: u64) -> Result<Vec<Instruction>> {
        engine::disassemble(self.disassembler()?, code, address)
    }

    /// Encode `text` as if placed at `address`.
    pub fn assemble(&mut self, text: &str, address: u64) -> Result<Vec<u8>> {
        engine::assemble(self.assembler()?, text, address)
    }

    /// Grant the guest access to the floating point and SIMD unit.
    pub fn enable_vfp(&mut self) -> Result<()> {
        match self.descriptor.arch_type {
            ArchType::Arm64 => {
                let mut registers = self.registers()?;
                let cpacr = registers.read("cpacr_el1")?;
                registers.write("cpacr_el1", cpacr | arm64::CPACR_FPEN)?;
                debug!("enabled floating point unit");
                Ok(())
            }
            ArchType::Mips32 => bail!(ErrorKind::UnsupportedConfiguration(format!(
                "{} has no floating point unit to enable",
                self.descriptor.name()
            ))),
        }
    }
}


impl fmt::Debug for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Architecture")
            .field("arch", &self.descriptor.name())
            .field("endian", &self.endian)
            .field("registers", &self.index.len())
            .field("emulator", &self.emulator.is_ready())
            .field("disassembler", &self.disassembler.is_ready())
            .field("assembler", &self.assembler.is_ready())
            .field("fault_hook", &self.fault_hook.is_some())
            .field("replacements", &self.replacements.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::FaultKind;
    use byteorder::{BigEndian, ByteOrder, LittleEndian};
    use std::cell::{Cell, RefCell};
    use unicorn_engine::unicorn_const::{uc_error, Permission};

    const CODE: u64 = 0x1000;

    fn mips(endian: Endian) -> Architecture {
        let mut adapter = Architecture::new(ArchType::Mips32, endian).unwrap();
        adapter
            .cpu()
            .unwrap()
            .mem_map(CODE, 0x4000, Permission::ALL)
            .unwrap();
        adapter
    }

    fn load(adapter: &mut Architecture, address: u64, words: &[u32]) {
        let mut bytes = vec![0; words.len() * 4];
        match adapter.endian() {
            Endian::Big => BigEndian::write_u32_into(words, &mut bytes),
            Endian::Little => LittleEndian::write_u32_into(words, &mut bytes),
        }
        adapter.cpu().unwrap().mem_write(address, &bytes).unwrap();
    }

    /// lui $t0, 0x5000; sw $t1, 0($t0); nop
    const STORE_UNMAPPED: [u32; 3] = [0x3c08_5000, 0xad09_0000, 0x0000_0000];

    #[test]
    fn engines_are_constructed_once() {
        let mut adapter = Architecture::new(ArchType::Mips32, Endian::Big).unwrap();

        let handle = adapter.emulator().unwrap().get_handle();
        assert_eq!(adapter.emulator().unwrap().get_handle(), handle);

        let cs = adapter.disassembler().unwrap() as *const Capstone;
        assert_eq!(adapter.disassembler().unwrap() as *const Capstone, cs);

        let ks = adapter.assembler().unwrap() as *const Keystone;
        assert_eq!(adapter.assembler().unwrap() as *const Keystone, ks);
    }

    #[test]
    fn failed_construction_is_not_retried() {
        let mut slot: EngineSlot<u32> = EngineSlot::Vacant;
        let mut attempts = 0;

        let result = slot.get_or_try_init(EngineKind::Assembler, || {
            attempts += 1;
            Err(construction_failed(EngineKind::Assembler, "broken".to_string()))
        });
        match result {
            Err(Error(ErrorKind::EngineConstruction(EngineKind::Assembler, _), _)) => {}
            other => panic!("expected construction failure, got {:?}", other),
        }

        let result = slot.get_or_try_init(EngineKind::Assembler, || {
            attempts += 1;
            Ok(7)
        });
        match result {
            Err(Error(ErrorKind::AdapterUnusable(EngineKind::Assembler), _)) => {}
            other => panic!("expected unusable adapter, got {:?}", other),
        }
        assert_eq!(attempts, 1);
    }

    #[test]
    fn registers_by_name() {
        let mut adapter = mips(Endian::Big);

        let mut registers = adapter.registers().unwrap();
        registers.write("t1", 0x1_dead_beef).unwrap();
        registers.set_sp(0x4ff0).unwrap();

        assert_eq!(registers.read("t1").unwrap(), 0xdead_beef);
        assert_eq!(registers.read("sp").unwrap(), 0x4ff0);
        assert_eq!(registers.read("v0").unwrap(), 0);

        let cpu = adapter.cpu().unwrap();
        assert_eq!(cpu.sp().unwrap(), 0x4ff0);
        assert!(cpu.read_register("x0").is_err());
    }

    #[test]
    fn unhandled_fault_stops_the_run() {
        let mut adapter = mips(Endian::Big);
        load(&mut adapter, CODE, &STORE_UNMAPPED);
        adapter.registers().unwrap().write("t1", 0xdead_beef).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = events.clone();
        adapter
            .hook_mem_invalid(move |_, event| {
                seen.borrow_mut().push(event);
                Ok(false)
            })
            .unwrap();

        match adapter.run(CODE, CODE + 8, 0, 0) {
            Err(Error(ErrorKind::Emulator(uc_error::WRITE_UNMAPPED), _)) => {}
            other => panic!("expected unmapped write, got {:?}", other),
        }

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), FaultKind::WriteUnmapped);
        assert_eq!(events[0].address(), 0x5000_0000);
        assert_eq!(events[0].size(), 4);
        assert_eq!(events[0].value(), Some(0xdead_beef));
    }

    #[test]
    fn handled_fault_resumes_the_run() {
        let mut adapter = mips(Endian::Big);
        load(&mut adapter, CODE, &STORE_UNMAPPED);
        adapter.registers().unwrap().write("t1", 0xdead_beef).unwrap();

        let faults = Rc::new(RefCell::new(0));
        let counter = faults.clone();
        adapter
            .hook_mem_invalid(move |cpu, event| {
                *counter.borrow_mut() += 1;
                cpu.mem_map(event.address() & !0xfff, 0x1000, Permission::ALL)?;
                Ok(true)
            })
            .unwrap();

        adapter.run(CODE, CODE + 8, 0, 0).unwrap();

        assert_eq!(*faults.borrow(), 1);
        let cpu = adapter.cpu().unwrap();
        assert_eq!(
            cpu.mem_read(0x5000_0000, 4).unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
        assert_eq!(cpu.read_pointer(0x5000_0000).unwrap(), 0xdead_beef);
    }

    #[test]
    fn fault_hook_errors_halt_the_run() {
        let mut adapter = mips(Endian::Big);
        load(&mut adapter, CODE, &STORE_UNMAPPED);

        adapter
            .hook_mem_invalid(|_, event| bail!("no memory at 0x{:x}", event.address()))
            .unwrap();

        match adapter.run(CODE, CODE + 8, 0, 0) {
            Err(Error(ErrorKind::Msg(message), _)) => {
                assert_eq!(message, "no memory at 0x50000000")
            }
            other => panic!("expected hook error, got {:?}", other),
        }

        // The halt error belongs to one run only.
        adapter.unhook_mem_invalid().unwrap();
        match adapter.run(CODE, CODE + 8, 0, 0) {
            Err(Error(ErrorKind::Emulator(uc_error::WRITE_UNMAPPED), _)) => {}
            other => panic!("expected unmapped write, got {:?}", other),
        }
    }

    #[test]
    fn one_fault_hook_at_a_time() {
        let mut adapter = mips(Endian::Little);
        adapter.hook_mem_invalid(|_, _| Ok(false)).unwrap();

        match adapter.hook_mem_invalid(|_, _| Ok(true)) {
            Err(Error(ErrorKind::FaultHookAlreadyRegistered, _)) => {}
            other => panic!("expected hook conflict, got {:?}", other),
        }

        adapter.unhook_mem_invalid().unwrap();
        adapter.hook_mem_invalid(|_, _| Ok(true)).unwrap();
    }

    /// 0x1000: jal 0x2000; nop; addiu $v1, $v0, 1; nop
    /// 0x2000: addiu $v0, $zero, 0x99; jr $ra; nop
    fn load_call(adapter: &mut Architecture) {
        load(
            adapter,
            CODE,
            &[0x0c00_0800, 0x0000_0000, 0x2443_0001, 0x0000_0000],
        );
        load(adapter, 0x2000, &[0x2402_0099, 0x03e0_0008, 0x0000_0000]);
    }

    #[test]
    fn guest_function_runs_without_replacement() {
        let mut adapter = mips(Endian::Big);
        load_call(&mut adapter);

        adapter.run(CODE, CODE + 0xc, 0, 0).unwrap();
        assert_eq!(adapter.registers().unwrap().read("v1").unwrap(), 0x9a);
    }

    #[test]
    fn replaced_function_returns_through_ra() {
        let mut adapter = mips(Endian::Big);
        load_call(&mut adapter);

        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        adapter
            .replace_function(0x2000, move |cpu| {
                *counter.borrow_mut() += 1;
                assert_eq!(cpu.read_register("ra")?, CODE + 8);
                Ok(0x41)
            })
            .unwrap();

        adapter.run(CODE, CODE + 0xc, 0, 0).unwrap();

        assert_eq!(*calls.borrow(), 1);
        let registers = adapter.registers().unwrap();
        assert_eq!(registers.read("v0").unwrap(), 0x41);
        assert_eq!(registers.read("v1").unwrap(), 0x42);
        assert_eq!(registers.pc().unwrap(), CODE + 0xc);
    }

    #[test]
    fn replacements_are_unique_per_address() {
        let mut adapter = mips(Endian::Big);
        load_call(&mut adapter);
        adapter.replace_function(0x2000, |_| Ok(1)).unwrap();

        match adapter.replace_function(0x2000, |_| Ok(2)) {
            Err(Error(ErrorKind::DuplicateReplacement(0x2000), _)) => {}
            other => panic!("expected duplicate replacement, got {:?}", other),
        }

        adapter.remove_replacement(0x2000).unwrap();
        match adapter.remove_replacement(0x2000) {
            Err(Error(ErrorKind::NoReplacement(0x2000), _)) => {}
            other => panic!("expected missing replacement, got {:?}", other),
        }

        adapter.run(CODE, CODE + 0xc, 0, 0).unwrap();
        assert_eq!(adapter.registers().unwrap().read("v1").unwrap(), 0x9a);
    }

    #[test]
    fn replacement_with_return_address_on_stack() {
        let mut adapter = mips(Endian::Little);
        // 0x1000: j 0x2000; nop; addiu $v1, $v0, 1; nop
        load(
            &mut adapter,
            CODE,
            &[0x0800_0800, 0x0000_0000, 0x2443_0001, 0x0000_0000],
        );

        {
            let mut cpu = adapter.cpu().unwrap();
            cpu.set_sp(0x3000).unwrap();
            cpu.write_pointer(0x3000, CODE + 8).unwrap();
            assert_eq!(cpu.mem_read(0x3000, 4).unwrap(), vec![0x08, 0x10, 0x00, 0x00]);
        }

        let convention = CallingConvention {
            return_value: "v0",
            return_address: ReturnAddress::StackTop,
        };
        adapter
            .replace_function_with(0x2000, convention, |_| Ok(7))
            .unwrap();

        adapter.run(CODE, CODE + 0xc, 0, 0).unwrap();
        assert_eq!(adapter.registers().unwrap().read("v1").unwrap(), 8);
    }

    #[test]
    fn replacement_errors_halt_the_run() {
        let mut adapter = mips(Endian::Big);
        load_call(&mut adapter);
        adapter
            .replace_function(0x2000, |_| bail!("unsupported call"))
            .unwrap();

        match adapter.run(CODE, CODE + 0xc, 0, 0) {
            Err(Error(ErrorKind::Msg(message), _)) => assert_eq!(message, "unsupported call"),
            other => panic!("expected replacement error, got {:?}", other),
        }
    }

    #[test]
    fn conventions_are_checked_against_the_register_index() {
        let mut adapter = mips(Endian::Big);
        let convention = CallingConvention {
            return_value: "x0",
            return_address: ReturnAddress::Register("ra"),
        };

        match adapter.replace_function_with(0x2000, convention, |_| Ok(0)) {
            Err(Error(ErrorKind::UnknownRegisterName(name), _)) => assert_eq!(name, "x0"),
            other => panic!("expected unknown register, got {:?}", other),
        }
    }

    #[test]
    fn disassemble_in_either_byte_order() {
        let mut adapter = mips(Endian::Big);
        let instructions = adapter
            .disassemble(&[0x03, 0xe0, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00], CODE)
            .unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].address(), CODE);
        assert_eq!(instructions[0].mnemonic(), "jr");
        assert_eq!(instructions[0].operands(), "$ra");
        assert_eq!(instructions[1].address(), CODE + 4);
        assert_eq!(instructions[1].mnemonic(), "nop");

        let mut adapter = mips(Endian::Little);
        let instructions = adapter.disassemble(&[0x08, 0x00, 0xe0, 0x03], CODE).unwrap();
        assert_eq!(instructions[0].mnemonic(), "jr");

        let mut adapter = Architecture::new(ArchType::Arm64, Endian::Little).unwrap();
        let instructions = adapter.disassemble(&[0x20, 0x00, 0x80, 0xd2], CODE).unwrap();
        assert_eq!(instructions[0].mnemonic(), "mov");
    }

    #[test]
    fn assemble_in_either_byte_order() {
        let mut adapter = mips(Endian::Big);
        assert_eq!(
            adapter.assemble("addiu $v0, $zero, 5", CODE).unwrap(),
            vec![0x24, 0x02, 0x00, 0x05]
        );

        let mut adapter = mips(Endian::Little);
        assert_eq!(
            adapter.assemble("addiu $v0, $zero, 5", CODE).unwrap(),
            vec![0x05, 0x00, 0x02, 0x24]
        );

        let mut adapter = Architecture::new(ArchType::Arm64, Endian::Little).unwrap();
        assert_eq!(
            adapter.assemble("mov x0, #1", CODE).unwrap(),
            vec![0x20, 0x00, 0x80, 0xd2]
        );

        match adapter.assemble("frobnicate x0", CODE) {
            Err(Error(ErrorKind::Assembly(_), _)) => {}
            other => panic!("expected assembly error, got {:?}", other),
        }
    }

    #[test]
    fn vfp_is_arm64_only() {
        let mut adapter = Architecture::new(ArchType::Arm64, Endian::Little).unwrap();
        adapter.enable_vfp().unwrap();
        let cpacr = adapter.registers().unwrap().read("cpacr_el1").unwrap();
        assert_eq!(cpacr & arm64::CPACR_FPEN, arm64::CPACR_FPEN);

        // fmov d0, x1; fmov x2, d0
        adapter
            .cpu()
            .unwrap()
            .mem_map(CODE, 0x1000, Permission::ALL)
            .unwrap();
        load(&mut adapter, CODE, &[0x9e67_0020, 0x9e66_0002]);
        adapter
            .registers()
            .unwrap()
            .write("x1", 0x4009_21fb_5444_2d18)
            .unwrap();

        adapter.run(CODE, CODE + 8, 0, 0).unwrap();
        assert_eq!(
            adapter.registers().unwrap().read("x2").unwrap(),
            0x4009_21fb_5444_2d18
        );

        let mut adapter = mips(Endian::Big);
        match adapter.enable_vfp() {
            Err(Error(ErrorKind::UnsupportedConfiguration(_), _)) => {}
            other => panic!("expected unsupported configuration, got {:?}", other),
        }
    }

    #[test]
    fn faults_inside_the_fault_hook_are_rejected() {
        let mut adapter = mips(Endian::Big);
        load(&mut adapter, CODE, &STORE_UNMAPPED);

        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        adapter
            .hook_mem_invalid(move |cpu, _| {
                *counter.borrow_mut() += 1;
                // Running the same store again faults while this hook is active.
                cpu.emulator().emu_start(CODE, CODE + 8, 0, 0)?;
                Ok(true)
            })
            .unwrap();

        match adapter.run(CODE, CODE + 8, 0, 0) {
            Err(Error(ErrorKind::NestedFault(0x5000_0000), _)) => {}
            other => panic!("expected nested fault, got {:?}", other),
        }
        assert_eq!(*calls.borrow(), 1);

        // The hook is no longer marked active, so the next fault reaches it.
        adapter.unhook_mem_invalid().unwrap();
        adapter
            .hook_mem_invalid(|cpu, event| {
                cpu.mem_map(event.address() & !0xfff, 0x1000, Permission::ALL)?;
                Ok(true)
            })
            .unwrap();
        adapter.run(CODE, CODE + 8, 0, 0).unwrap();
    }

    #[test]
    fn dispatch_refuses_to_reenter_the_fault_hook() {
        let mut adapter = mips(Endian::Little);
        let emulator = adapter.emulator().unwrap();
        assert!(emulator.get_data_mut().enter_fault_hook());

        let calls = Cell::new(0);
        let event = FaultEvent::new(FaultKind::ReadUnmapped, 0x6000_0000, 4, 0);
        let handled = fault::dispatch(emulator, event, &mut |_, _| {
            calls.set(calls.get() + 1);
            Ok(true)
        });
        assert!(!handled);

        match emulator.get_data_mut().take_halt_error() {
            Some(Error(ErrorKind::NestedFault(0x6000_0000), _)) => {}
            other => panic!("expected nested fault, got {:?}", other),
        }

        emulator.get_data_mut().leave_fault_hook();
        let handled = fault::dispatch(emulator, event, &mut |_, _| {
            calls.set(calls.get() + 1);
            Ok(true)
        });
        assert!(handled);
        assert!(emulator.get_data_mut().take_halt_error().is_none());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn replacements_can_stop_the_run() {
        let mut adapter = mips(Endian::Big);
        load_call(&mut adapter);

        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        adapter
            .replace_function(0x2000, move |cpu| {
                *counter.borrow_mut() += 1;
                cpu.stop()?;
                Ok(0x41)
            })
            .unwrap();

        adapter.run(CODE, CODE + 0xc, 0, 0).unwrap();

        assert_eq!(*calls.borrow(), 1);
        let registers = adapter.registers().unwrap();
        assert_eq!(registers.read("v0").unwrap(), 0x41);
        assert_eq!(registers.pc().unwrap(), CODE + 8);
        assert_eq!(registers.read("v1").unwrap(), 0);
    }
}
