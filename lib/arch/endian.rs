//! Resolve a byte order into the mode values each engine is built with.

use crate::arch::{ArchDescriptor, Endian};
use crate::error::*;
use keystone_engine as keystone;
use unicorn_engine::unicorn_const as unicorn;


/// The modes the emulator, disassembler and assembler of one adapter are
/// constructed with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineModes {
    pub emulator: unicorn::Mode,
    pub disassembler: (capstone::Mode, capstone::Endian),
    pub assembler: keystone::Mode,
}


/// Combine the fixed word-size modes of `descriptor` with the flags for
/// `endian`.
pub fn resolve(descriptor: &ArchDescriptor, endian: Endian) -> Result<EngineModes> {
    if !descriptor.endians.contains(&endian) {
        bail!(ErrorKind::UnsupportedConfiguration(format!(
            "{} can not be emulated {} endian",
            descriptor.name(),
            endian
        )));
    }

    let (emulator, disassembler, assembler) = match endian {
        Endian::Big => (
            unicorn::Mode::BIG_ENDIAN,
            capstone::Endian::Big,
            keystone::Mode::BIG_ENDIAN,
        ),
        Endian::Little => (
            unicorn::Mode::LITTLE_ENDIAN,
            capstone::Endian::Little,
            keystone::Mode::LITTLE_ENDIAN,
        ),
    };

    Ok(EngineModes {
        emulator: descriptor.emulator_mode | emulator,
        disassembler: (descriptor.disassembler_mode, disassembler),
        assembler: descriptor.assembler_mode | assembler,
    })
}
