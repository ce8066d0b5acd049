//! Cinch: Architecture Adapters for Unicorn-Based Binary Emulation
//!
//! An `arch::Architecture` wires one instruction-set variant to the Unicorn
//! CPU emulator, the Capstone disassembler and the Keystone assembler,
//! exposes its registers by name, and lets a host observe memory faults and
//! replace guest functions with Rust callbacks.
extern crate byteorder;
extern crate capstone;
#[macro_use]
extern crate error_chain;
extern crate keystone_engine;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate unicorn_engine;

pub mod arch;
pub mod cpu;
pub mod engine;
pub mod hooks;
pub mod registers;

pub use crate::arch::{ArchType, Architecture, Endian};
pub use crate::cpu::Cpu;

pub mod error {
    use crate::engine::EngineKind;
    use unicorn_engine::unicorn_const::uc_error;

    error_chain! {
        types {
            Error, ErrorKind, ResultExt, Result;
        }

        foreign_links {
            Capstone(::capstone::Error);
        }

        errors {
            UnsupportedConfiguration(reason: String) {
                description("Unsupported configuration")
                display("Unsupported configuration: {}", reason)
            }
            DuplicateRegisterName(name: String) {
                description("Register name installed twice")
                display("Register name installed twice: {}", name)
            }
            UnknownRegisterName(name: String) {
                description("Unknown register name")
                display("Unknown register name: {}", name)
            }
            RoleNotDesignated(role: &'static str) {
                description("Register role was never designated")
                display("No register designated as the {}", role)
            }
            EngineConstruction(kind: EngineKind, reason: String) {
                description("Failed to construct engine")
                display("Failed to construct {}: {}", kind, reason)
            }
            AdapterUnusable(kind: EngineKind) {
                description("Engine construction failed earlier")
                display("The {} failed to construct earlier, adapter is unusable", kind)
            }
            Emulator(err: uc_error) {
                description("Emulator error")
                display("Emulator error: {:?}", err)
            }
            Assembly(reason: String) {
                description("Failed to assemble")
                display("Failed to assemble: {}", reason)
            }
            FaultHookAlreadyRegistered {
                description("A memory fault hook is already registered")
                display("A memory fault hook is already registered")
            }
            DuplicateReplacement(address: u64) {
                description("Function already replaced at this address")
                display("Function already replaced at 0x{:x}", address)
            }
            NoReplacement(address: u64) {
                description("No function replacement at this address")
                display("No function replacement at 0x{:x}", address)
            }
            NestedFault(address: u64) {
                description("Memory fault raised inside the fault hook")
                display("Memory fault at 0x{:x} raised inside the fault hook", address)
            }
        }
    }

    impl From<uc_error> for Error {
        fn from(err: uc_error) -> Error {
            ErrorKind::Emulator(err).into()
        }
    }
}
