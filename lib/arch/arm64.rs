//! AArch64, little endian.

use crate::arch::{ArchDescriptor, ArchType, Endian};
use crate::hooks::{CallingConvention, ReturnAddress};
use crate::registers::{RegisterMap, RegisterMapping};
use unicorn_engine::RegisterARM64;


const fn reg(name: &'static str, register: RegisterARM64, bits: u8) -> RegisterMapping {
    RegisterMapping::new(name, register as i32, bits)
}


/// `x0` through `x30`, the `fp`/`lr` aliases, `sp`, `pc` and `nzcv`.
pub const REGISTER_MAP: RegisterMap = &[
    reg("x0", RegisterARM64::X0, 64),
    reg("x1", RegisterARM64::X1, 64),
    reg("x2", RegisterARM64::X2, 64),
    reg("x3", RegisterARM64::X3, 64),
    reg("x4", RegisterARM64::X4, 64),
    reg("x5", RegisterARM64::X5, 64),
    reg("x6", RegisterARM64::X6, 64),
    reg("x7", RegisterARM64::X7, 64),
    reg("x8", RegisterARM64::X8, 64),
    reg("x9", RegisterARM64::X9, 64),
    reg("x10", RegisterARM64::X10, 64),
    reg("x11", RegisterARM64::X11, 64),
    reg("x12", RegisterARM64::X12, 64),
    reg("x13", RegisterARM64::X13, 64),
    reg("x14", RegisterARM64::X14, 64),
    reg("x15", RegisterARM64::X15, 64),
    reg("x16", RegisterARM64::X16, 64),
    reg("x17", RegisterARM64::X17, 64),
    reg("x18", RegisterARM64::X18, 64),
    reg("x19", RegisterARM64::X19, 64),
    reg("x20", RegisterARM64::X20, 64),
    reg("x21", RegisterARM64::X21, 64),
    reg("x22", RegisterARM64::X22, 64),
    reg("x23", RegisterARM64::X23, 64),
    reg("x24", RegisterARM64::X24, 64),
    reg("x25", RegisterARM64::X25, 64),
    reg("x26", RegisterARM64::X26, 64),
    reg("x27", RegisterARM64::X27, 64),
    reg("x28", RegisterARM64::X28, 64),
    reg("x29", RegisterARM64::X29, 64),
    reg("x30", RegisterARM64::X30, 64),
    reg("fp", RegisterARM64::X29, 64),
    reg("lr", RegisterARM64::X30, 64),
    reg("sp", RegisterARM64::SP, 64),
    reg("pc", RegisterARM64::PC, 64),
    reg("nzcv", RegisterARM64::NZCV, 32),
];


/// System registers user-mode code depends on.
pub const SYSTEM_REGISTER_MAP: RegisterMap = &[
    reg("cpacr_el1", RegisterARM64::CPACR_EL1, 64),
    reg("tpidr_el0", RegisterARM64::TPIDR_EL0, 64),
    reg("tpidrro_el0", RegisterARM64::TPIDRRO_EL0, 64),
];


/// Full access to the FP/SIMD unit from EL0 and EL1.
pub const CPACR_FPEN: u64 = 0b11 << 20;


/// AAPCS64: results in `x0`, return address in the link register.
pub const AAPCS64: CallingConvention = CallingConvention {
    return_value: "x0",
    return_address: ReturnAddress::Register("lr"),
};


pub static ARM64: ArchDescriptor = ArchDescriptor {
    arch_type: ArchType::Arm64,
    names: &["arm64", "aarch64"],
    emulator_arch: unicorn_engine::unicorn_const::Arch::ARM64,
    emulator_mode: unicorn_engine::unicorn_const::Mode::ARM,
    disassembler_arch: capstone::Arch::ARM64,
    disassembler_mode: capstone::Mode::Arm,
    assembler_arch: keystone_engine::Arch::ARM64,
    assembler_mode: keystone_engine::Mode::LITTLE_ENDIAN,
    endians: &[Endian::Little],
    register_maps: &[REGISTER_MAP, SYSTEM_REGISTER_MAP],
    stack_pointer: "sp",
    program_counter: "pc",
    pointer_size: 8,
    calling_convention: AAPCS64,
};
