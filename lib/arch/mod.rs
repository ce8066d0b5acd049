//! Architecture variants, their static descriptions, and the adapter that
//! drives engines for them.

use crate::error::*;
use crate::hooks::CallingConvention;
use crate::registers::{RegisterIndex, RegisterIndexBuilder, RegisterMap};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

mod adapter;
pub mod arm64;
mod endian;
pub mod mips;

pub use self::adapter::Architecture;
pub use self::endian::{resolve, EngineModes};


/// The byte order of an architecture variant.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Endian {
    Big,
    Little,
}


impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endian::Big => write!(f, "big"),
            Endian::Little => write!(f, "little"),
        }
    }
}


impl FromStr for Endian {
    type Err = Error;

    fn from_str(s: &str) -> Result<Endian> {
        match s.to_ascii_lowercase().as_str() {
            "big" | "be" | "eb" => Ok(Endian::Big),
            "little" | "le" | "el" => Ok(Endian::Little),
            _ => Err(ErrorKind::UnsupportedConfiguration(format!("unknown byte order \"{}\"", s)).into()),
        }
    }
}


/// The instruction-set variants an `Architecture` can be built for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArchType {
    Mips32,
    Arm64,
}


impl ArchType {
    /// Every supported variant.
    pub fn all() -> &'static [ArchType] {
        &[ArchType::Mips32, ArchType::Arm64]
    }

    /// The static description of this variant.
    pub fn descriptor(self) -> &'static ArchDescriptor {
        match self {
            ArchType::Mips32 => &mips::MIPS32,
            ArchType::Arm64 => &arm64::ARM64,
        }
    }
}


impl fmt::Display for ArchType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.descriptor().name())
    }
}


lazy_static! {
    static ref REGISTRY: HashMap<&'static str, ArchType> = {
        let mut registry = HashMap::new();
        for arch_type in ArchType::all() {
            for name in arch_type.descriptor().names {
                registry.insert(*name, *arch_type);
            }
        }
        registry
    };
}


impl FromStr for ArchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<ArchType> {
        REGISTRY
            .get(s.to_ascii_lowercase().as_str())
            .cloned()
            .ok_or_else(|| {
                ErrorKind::UnsupportedConfiguration(format!("unknown architecture \"{}\"", s)).into()
            })
    }
}


/// Everything that distinguishes one architecture variant from another.
pub struct ArchDescriptor {
    pub arch_type: ArchType,
    /// Names this variant is known by. The first is canonical.
    pub names: &'static [&'static str],
    pub emulator_arch: unicorn_engine::unicorn_const::Arch,
    /// Word-size mode, without a byte-order flag.
    pub emulator_mode: unicorn_engine::unicorn_const::Mode,
    pub disassembler_arch: capstone::Arch,
    pub disassembler_mode: capstone::Mode,
    pub assembler_arch: keystone_engine::Arch,
    /// Word-size mode, without a byte-order flag.
    pub assembler_mode: keystone_engine::Mode,
    /// Byte orders this variant can be emulated in.
    pub endians: &'static [Endian],
    /// Expanded in order when an adapter is built.
    pub register_maps: &'static [RegisterMap],
    pub stack_pointer: &'static str,
    pub program_counter: &'static str,
    pub pointer_size: usize,
    pub calling_convention: CallingConvention,
}


impl ArchDescriptor {
    /// The canonical name of this variant.
    pub fn name(&self) -> &'static str {
        self.names[0]
    }

    /// Expand every register map and designate the stack pointer and program
    /// counter.
    pub fn register_index(&self) -> Result<RegisterIndex> {
        let mut builder = RegisterIndexBuilder::new();
        for map in self.register_maps {
            builder.expand_mapping(map)?;
        }
        builder.register_sp(self.stack_pointer)?;
        builder.register_pc(self.program_counter)?;
        builder.build()
    }
}
