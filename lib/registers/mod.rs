//! Named registers: the static tables that declare them, the index built
//! from those tables, and the storage that backs them.
//!
//! Register tables are plain data. An architecture declares one or more
//! `RegisterMap`s, a `RegisterIndexBuilder` expands them into a single
//! namespace, the stack-pointer and program-counter roles are designated, and
//! the builder is frozen into a `RegisterIndex`. From then on the index is
//! read-only and can be shared freely between the adapter and its hooks.

use crate::error::*;
use std::collections::{HashMap, HashSet};
use unicorn_engine::Unicorn;


/// Where a named register lives in the engine, and how many bits wide it is.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RegisterSlot {
    id: i32,
    bits: u8,
}


impl RegisterSlot {
    /// Create a new `RegisterSlot` for engine register `id`.
    pub const fn new(id: i32, bits: u8) -> RegisterSlot {
        RegisterSlot { id, bits }
    }

    /// The engine's identifier for this register.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// The width of this register in bits.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// A mask covering every bit of this register.
    pub fn mask(&self) -> u64 {
        if self.bits >= 64 {
            u64::max_value()
        } else {
            (1u64 << self.bits) - 1
        }
    }
}


/// One entry in a static register table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterMapping {
    pub name: &'static str,
    pub slot: RegisterSlot,
}


impl RegisterMapping {
    pub const fn new(name: &'static str, id: i32, bits: u8) -> RegisterMapping {
        RegisterMapping {
            name,
            slot: RegisterSlot::new(id, bits),
        }
    }
}


/// A static table of register names and their slots.
pub type RegisterMap = &'static [RegisterMapping];


/// Accumulates register maps and role designations before they are frozen
/// into a `RegisterIndex`.
#[derive(Clone, Debug, Default)]
pub struct RegisterIndexBuilder {
    names: Vec<&'static str>,
    slots: HashMap<&'static str, RegisterSlot>,
    stack_pointer: Option<&'static str>,
    program_counter: Option<&'static str>,
}


impl RegisterIndexBuilder {
    /// Create a new, empty `RegisterIndexBuilder`.
    pub fn new() -> RegisterIndexBuilder {
        RegisterIndexBuilder::default()
    }

    /// Install every register of `map`.
    ///
    /// The whole table is checked before anything is installed. If any name
    /// is already installed, or appears twice in `map`, this fails with
    /// `DuplicateRegisterName` and the builder is left untouched.
    pub fn expand_mapping(&mut self, map: RegisterMap) -> Result<()> {
        let mut seen: HashSet<&'static str> = HashSet::new();
        for mapping in map {
            if self.slots.contains_key(mapping.name) || !seen.insert(mapping.name) {
                bail!(ErrorKind::DuplicateRegisterName(mapping.name.to_string()));
            }
        }

        for mapping in map {
            self.names.push(mapping.name);
            self.slots.insert(mapping.name, mapping.slot);
        }

        Ok(())
    }

    /// Designate the installed register `name` as the stack pointer.
    pub fn register_sp(&mut self, name: &str) -> Result<()> {
        self.stack_pointer = Some(self.installed(name)?);
        Ok(())
    }

    /// Designate the installed register `name` as the program counter.
    pub fn register_pc(&mut self, name: &str) -> Result<()> {
        self.program_counter = Some(self.installed(name)?);
        Ok(())
    }

    /// Returns true if a register called `name` has been installed.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// The register currently designated as the stack pointer, if any.
    pub fn stack_pointer(&self) -> Option<&'static str> {
        self.stack_pointer
    }

    /// The register currently designated as the program counter, if any.
    pub fn program_counter(&self) -> Option<&'static str> {
        self.program_counter
    }

    /// Freeze this builder into a `RegisterIndex`.
    ///
    /// Both roles must have been designated.
    pub fn build(self) -> Result<RegisterIndex> {
        let stack_pointer = self
            .stack_pointer
            .ok_or(ErrorKind::RoleNotDesignated("stack pointer"))?;
        let program_counter = self
            .program_counter
            .ok_or(ErrorKind::RoleNotDesignated("program counter"))?;

        let stack_pointer = (stack_pointer, self.slots[stack_pointer]);
        let program_counter = (program_counter, self.slots[program_counter]);

        Ok(RegisterIndex {
            names: self.names,
            slots: self.slots,
            stack_pointer,
            program_counter,
        })
    }

    fn installed(&self, name: &str) -> Result<&'static str> {
        self.slots
            .get_key_value(name)
            .map(|(name, _)| *name)
            .ok_or_else(|| ErrorKind::UnknownRegisterName(name.to_string()).into())
    }
}


/// The immutable index of every named register of one CPU context.
#[derive(Clone, Debug)]
pub struct RegisterIndex {
    names: Vec<&'static str>,
    slots: HashMap<&'static str, RegisterSlot>,
    stack_pointer: (&'static str, RegisterSlot),
    program_counter: (&'static str, RegisterSlot),
}


impl RegisterIndex {
    /// Look up the slot of register `name`.
    pub fn slot(&self, name: &str) -> Result<RegisterSlot> {
        self.slots
            .get(name)
            .cloned()
            .ok_or_else(|| ErrorKind::UnknownRegisterName(name.to_string()).into())
    }

    /// Every installed register name, in the order the maps declared them.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The slot designated as the stack pointer.
    pub fn stack_pointer(&self) -> RegisterSlot {
        self.stack_pointer.1
    }

    pub fn stack_pointer_name(&self) -> &'static str {
        self.stack_pointer.0
    }

    /// The slot designated as the program counter.
    pub fn program_counter(&self) -> RegisterSlot {
        self.program_counter.1
    }

    pub fn program_counter_name(&self) -> &'static str {
        self.program_counter.0
    }
}


/// Something that holds register values, addressed by slot.
pub trait RegisterStorage {
    /// Read the value held in `slot`.
    fn read_slot(&self, slot: RegisterSlot) -> Result<u64>;

    /// Write `value` into `slot`, truncated to the slot's width.
    fn write_slot(&mut self, slot: RegisterSlot, value: u64) -> Result<()>;
}


impl<'u, D> RegisterStorage for Unicorn<'u, D> {
    fn read_slot(&self, slot: RegisterSlot) -> Result<u64> {
        Ok(self.reg_read(slot.id())? & slot.mask())
    }

    fn write_slot(&mut self, slot: RegisterSlot, value: u64) -> Result<()> {
        Ok(self.reg_write(slot.id(), value & slot.mask())?)
    }
}


/// Register storage that lives outside of any engine.
///
/// Every slot reads as zero until it is written.
#[derive(Clone, Debug, Default)]
pub struct RegisterBank {
    values: HashMap<i32, u64>,
}


impl RegisterBank {
    /// Create a new `RegisterBank` with every register zeroed.
    pub fn new() -> RegisterBank {
        RegisterBank::default()
    }
}


impl RegisterStorage for RegisterBank {
    fn read_slot(&self, slot: RegisterSlot) -> Result<u64> {
        Ok(self.values.get(&slot.id()).cloned().unwrap_or(0) & slot.mask())
    }

    fn write_slot(&mut self, slot: RegisterSlot, value: u64) -> Result<()> {
        self.values.insert(slot.id(), value & slot.mask());
        Ok(())
    }
}


/// Access to registers by name and by role.
pub struct Registers<'r, S: RegisterStorage + ?Sized> {
    index: &'r RegisterIndex,
    storage: &'r mut S,
}


impl<'r, S: RegisterStorage + ?Sized> Registers<'r, S> {
    /// Create a new `Registers` view of `storage` through `index`.
    pub fn new(index: &'r RegisterIndex, storage: &'r mut S) -> Registers<'r, S> {
        Registers { index, storage }
    }

    /// The index used to resolve names.
    pub fn index(&self) -> &RegisterIndex {
        self.index
    }

    /// Read register `name`.
    pub fn read(&self, name: &str) -> Result<u64> {
        self.storage.read_slot(self.index.slot(name)?)
    }

    /// Write `value` to register `name`.
    pub fn write(&mut self, name: &str, value: u64) -> Result<()> {
        let slot = self.index.slot(name)?;
        self.storage.write_slot(slot, value)
    }

    /// Read the stack pointer.
    pub fn sp(&self) -> Result<u64> {
        self.storage.read_slot(self.index.stack_pointer())
    }

    /// Set the stack pointer.
    pub fn set_sp(&mut self, value: u64) -> Result<()> {
        self.storage.write_slot(self.index.stack_pointer(), value)
    }

    /// Read the program counter.
    pub fn pc(&self) -> Result<u64> {
        self.storage.read_slot(self.index.program_counter())
    }

    /// Set the program counter.
    pub fn set_pc(&mut self, value: u64) -> Result<()> {
        self.storage.write_slot(self.index.program_counter(), value)
    }

    /// Read every register, in declaration order.
    pub fn dump(&self) -> Result<Vec<(&'static str, u64)>> {
        self.index
            .names()
            .iter()
            .map(|name| -> Result<(&'static str, u64)> { Ok((*name, self.read(name)?)) })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &[RegisterMapping] = &[
        RegisterMapping::new("sp", 0, 32),
        RegisterMapping::new("pc", 1, 32),
    ];

    const EXTENDED: &[RegisterMapping] = &[RegisterMapping::new("v0", 2, 32)];

    const COLLIDING: &[RegisterMapping] = &[
        RegisterMapping::new("a0", 3, 32),
        RegisterMapping::new("sp", 4, 32),
    ];

    const ALIASED: &[RegisterMapping] = &[
        RegisterMapping::new("x30", 5, 64),
        RegisterMapping::new("lr", 5, 64),
    ];

    fn index() -> RegisterIndex {
        let mut builder = RegisterIndexBuilder::new();
        builder.expand_mapping(BASE).unwrap();
        builder.expand_mapping(EXTENDED).unwrap();
        builder.register_sp("sp").unwrap();
        builder.register_pc("pc").unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn expanded_maps_read_back_by_name() {
        let index = index();
        let mut bank = RegisterBank::new();
        let mut registers = Registers::new(&index, &mut bank);

        assert_eq!(registers.read("v0").unwrap(), 0);

        registers.write("sp", 0x1000).unwrap();
        assert_eq!(registers.read("sp").unwrap(), 0x1000);
        assert_eq!(registers.sp().unwrap(), 0x1000);
        assert_eq!(registers.read("pc").unwrap(), 0);
        assert_eq!(registers.read("v0").unwrap(), 0);

        registers.set_pc(0x4000_0000).unwrap();
        assert_eq!(registers.read("pc").unwrap(), 0x4000_0000);
        assert_eq!(registers.read("sp").unwrap(), 0x1000);

        assert_eq!(
            registers.dump().unwrap(),
            vec![("sp", 0x1000), ("pc", 0x4000_0000), ("v0", 0)]
        );
    }

    #[test]
    fn roles_resolve_to_slots() {
        let index = index();
        assert_eq!(index.stack_pointer(), RegisterSlot::new(0, 32));
        assert_eq!(index.program_counter(), RegisterSlot::new(1, 32));
        assert_eq!(index.stack_pointer_name(), "sp");
        assert_eq!(index.program_counter_name(), "pc");
        assert_eq!(index.names(), &["sp", "pc", "v0"]);
    }

    #[test]
    fn collision_leaves_builder_untouched() {
        let mut builder = RegisterIndexBuilder::new();
        builder.expand_mapping(BASE).unwrap();

        match builder.expand_mapping(COLLIDING) {
            Err(Error(ErrorKind::DuplicateRegisterName(name), _)) => assert_eq!(name, "sp"),
            other => panic!("expected duplicate register name, got {:?}", other),
        }

        assert!(!builder.contains("a0"));
        assert!(builder.contains("sp"));
    }

    #[test]
    fn collision_within_one_table() {
        const REPEATED: &[RegisterMapping] = &[
            RegisterMapping::new("t0", 0, 32),
            RegisterMapping::new("t0", 1, 32),
        ];

        let mut builder = RegisterIndexBuilder::new();
        assert!(builder.expand_mapping(REPEATED).is_err());
        assert!(!builder.contains("t0"));
    }

    #[test]
    fn unknown_designation_keeps_prior_role() {
        let mut builder = RegisterIndexBuilder::new();
        builder.expand_mapping(BASE).unwrap();
        builder.register_sp("sp").unwrap();

        match builder.register_sp("esp") {
            Err(Error(ErrorKind::UnknownRegisterName(name), _)) => assert_eq!(name, "esp"),
            other => panic!("expected unknown register name, got {:?}", other),
        }
        assert_eq!(builder.stack_pointer(), Some("sp"));

        assert!(builder.register_pc("rip").is_err());
        assert_eq!(builder.program_counter(), None);
    }

    #[test]
    fn build_requires_both_roles() {
        let mut builder = RegisterIndexBuilder::new();
        builder.expand_mapping(BASE).unwrap();
        builder.register_sp("sp").unwrap();

        match builder.build() {
            Err(Error(ErrorKind::RoleNotDesignated(role), _)) => {
                assert_eq!(role, "program counter")
            }
            other => panic!("expected missing role, got {:?}", other),
        }
    }

    #[test]
    fn explicit_aliases_share_a_slot() {
        let mut builder = RegisterIndexBuilder::new();
        builder.expand_mapping(BASE).unwrap();
        builder.expand_mapping(ALIASED).unwrap();
        builder.register_sp("sp").unwrap();
        builder.register_pc("pc").unwrap();
        let index = builder.build().unwrap();

        let mut bank = RegisterBank::new();
        let mut registers = Registers::new(&index, &mut bank);
        registers.write("lr", 0xdead_beef_0000_1234).unwrap();
        assert_eq!(registers.read("x30").unwrap(), 0xdead_beef_0000_1234);
        assert_eq!(registers.read("sp").unwrap(), 0);
    }

    #[test]
    fn writes_truncate_to_width() {
        let index = index();
        let mut bank = RegisterBank::new();
        let mut registers = Registers::new(&index, &mut bank);

        registers.write("v0", 0x1_2345_6789).unwrap();
        assert_eq!(registers.read("v0").unwrap(), 0x2345_6789);
        assert_eq!(RegisterSlot::new(0, 64).mask(), u64::max_value());
    }

    #[test]
    fn unknown_name_access_fails() {
        let index = index();
        let mut bank = RegisterBank::new();
        let mut registers = Registers::new(&index, &mut bank);

        assert!(registers.read("eax").is_err());
        assert!(registers.write("eax", 1).is_err());
    }
}
