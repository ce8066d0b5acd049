//! 32-bit MIPS, in either byte order.

use crate::arch::{ArchDescriptor, ArchType, Endian};
use crate::hooks::{CallingConvention, ReturnAddress};
use crate::registers::{RegisterMap, RegisterMapping};
use unicorn_engine::RegisterMIPS;


const fn reg(name: &'static str, register: RegisterMIPS) -> RegisterMapping {
    RegisterMapping::new(name, register as i32, 32)
}


/// General purpose registers, by ABI name, plus `pc`, `hi` and `lo`.
pub const REGISTER_MAP: RegisterMap = &[
    reg("zero", RegisterMIPS::ZERO),
    reg("at", RegisterMIPS::AT),
    reg("v0", RegisterMIPS::V0),
    reg("v1", RegisterMIPS::V1),
    reg("a0", RegisterMIPS::A0),
    reg("a1", RegisterMIPS::A1),
    reg("a2", RegisterMIPS::A2),
    reg("a3", RegisterMIPS::A3),
    reg("t0", RegisterMIPS::T0),
    reg("t1", RegisterMIPS::T1),
    reg("t2", RegisterMIPS::T2),
    reg("t3", RegisterMIPS::T3),
    reg("t4", RegisterMIPS::T4),
    reg("t5", RegisterMIPS::T5),
    reg("t6", RegisterMIPS::T6),
    reg("t7", RegisterMIPS::T7),
    reg("s0", RegisterMIPS::S0),
    reg("s1", RegisterMIPS::S1),
    reg("s2", RegisterMIPS::S2),
    reg("s3", RegisterMIPS::S3),
    reg("s4", RegisterMIPS::S4),
    reg("s5", RegisterMIPS::S5),
    reg("s6", RegisterMIPS::S6),
    reg("s7", RegisterMIPS::S7),
    reg("t8", RegisterMIPS::T8),
    reg("t9", RegisterMIPS::T9),
    reg("k0", RegisterMIPS::K0),
    reg("k1", RegisterMIPS::K1),
    reg("gp", RegisterMIPS::GP),
    reg("sp", RegisterMIPS::SP),
    reg("fp", RegisterMIPS::FP),
    reg("ra", RegisterMIPS::RA),
    reg("pc", RegisterMIPS::PC),
    reg("hi", RegisterMIPS::HI),
    reg("lo", RegisterMIPS::LO),
];


/// Coprocessor 0 registers touched by user-mode code (TLS, FPU enable).
pub const CP0_REGISTER_MAP: RegisterMap = &[
    reg("cp0_config3", RegisterMIPS::CP0_CONFIG3),
    reg("cp0_userlocal", RegisterMIPS::CP0_USERLOCAL),
    reg("cp0_status", RegisterMIPS::CP0_STATUS),
];


/// o32: results in `$v0`, return address in `$ra`.
pub const O32: CallingConvention = CallingConvention {
    return_value: "v0",
    return_address: ReturnAddress::Register("ra"),
};


pub static MIPS32: ArchDescriptor = ArchDescriptor {
    arch_type: ArchType::Mips32,
    names: &["mips32", "mips"],
    emulator_arch: unicorn_engine::unicorn_const::Arch::MIPS,
    emulator_mode: unicorn_engine::unicorn_const::Mode::MIPS32,
    disassembler_arch: capstone::Arch::MIPS,
    disassembler_mode: capstone::Mode::Mips32,
    assembler_arch: keystone_engine::Arch::MIPS,
    assembler_mode: keystone_engine::Mode::MIPS32,
    endians: &[Endian::Big, Endian::Little],
    register_maps: &[REGISTER_MAP, CP0_REGISTER_MAP],
    stack_pointer: "sp",
    program_counter: "pc",
    pointer_size: 4,
    calling_convention: O32,
};
