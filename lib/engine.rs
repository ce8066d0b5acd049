//! The three native engines an `Architecture` drives, and owned views of
//! their output.

use crate::error::*;
use capstone::Capstone;
use keystone_engine::Keystone;
use std::fmt;


/// The kinds of engine an adapter owns.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EngineKind {
    Emulator,
    Disassembler,
    Assembler,
}


impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineKind::Emulator => write!(f, "emulator"),
            EngineKind::Disassembler => write!(f, "disassembler"),
            EngineKind::Assembler => write!(f, "assembler"),
        }
    }
}


/// A decoded instruction, detached from the disassembler that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    address: u64,
    bytes: Vec<u8>,
    mnemonic: String,
    operands: String,
}


impl Instruction {
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operands(&self) -> &str {
        &self.operands
    }
}


impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self
            .bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<String>>()
            .join("");
        if self.operands.is_empty() {
            write!(f, "{:08x}: {} {}", self.address, bytes, self.mnemonic)
        } else {
            write!(
                f,
                "{:08x}: {} {} {}",
                self.address, bytes, self.mnemonic, self.operands
            )
        }
    }
}


/// Decode every instruction in `code`, which is located at `address`.
pub fn disassemble(cs: &Capstone, code: &[u8], address: u64) -> Result<Vec<Instruction>> {
    let instructions = cs.disasm_all(code, address)?;

    Ok(instructions
        .iter()
        .map(|insn| Instruction {
            address: insn.address(),
            bytes: insn.bytes().to_vec(),
            mnemonic: insn.mnemonic().unwrap_or("").to_string(),
            operands: insn.op_str().unwrap_or("").to_string(),
        })
        .collect())
}


/// Encode `text` as though it were placed at `address`.
pub fn assemble(ks: &Keystone, text: &str, address: u64) -> Result<Vec<u8>> {
    let result = ks
        .asm(text.to_string(), address)
        .map_err(|e| ErrorKind::Assembly(format!("{:?} in \"{}\"", e, text)))?;

    trace!(
        "assembled \"{}\" at 0x{:x} into {} bytes",
        text,
        address,
        result.bytes.len()
    );

    Ok(result.bytes)
}
