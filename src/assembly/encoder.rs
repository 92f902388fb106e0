//! CIL instruction encoding.
//!
//! [`InstructionEncoder`] is the reverse of [`crate::assembly::decode_method`]: it assembles
//! opcodes given by mnemonic into a byte stream, resolving branch labels when the method is
//! finalized. Label offsets are returned as well, so exception clauses can be built against the
//! produced code. The encoder is used to build method bodies for tests, benchmarks and fuzz seeds.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::assembly::{Immediate, InstructionEncoder};
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_instruction("ldarg.0", None)?;
//! encoder.emit_branch("brfalse.s", "zero")?;
//! encoder.emit_ldc_i4(1)?;
//! encoder.emit_instruction("ret", None)?;
//! encoder.define_label("zero")?;
//! encoder.emit_instruction("ldc.i4.s", Some(Immediate::Int8(-5)))?;
//! encoder.emit_instruction("ret", None)?;
//!
//! let (code, labels) = encoder.finalize()?;
//! assert_eq!(code, vec![0x02, 0x2C, 0x02, 0x17, 0x2A, 0x1F, 0xFB, 0x2A]);
//! assert_eq!(labels["zero"], 5);
//! # Ok::<(), ciltac::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{FlowType, Immediate, OperandType},
        opcodes::{Opcode, FE_PREFIX},
    },
    metadata::token::Token,
    Error, Result,
};

/// Pending branch displacement, written once all labels are known.
#[derive(Debug, Clone)]
struct LabelFixup {
    label: String,
    /// Position of the displacement bytes
    position: usize,
    /// 1 for short branches, 4 for long ones
    size: usize,
}

/// Pending switch table.
#[derive(Debug, Clone)]
struct SwitchFixup {
    labels: Vec<String>,
    /// Position of the first table entry
    position: usize,
    /// Position after the table, which displacements are relative to
    end: usize,
}

/// Assembles CIL bytecode.
#[derive(Debug, Default)]
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
    switch_fixups: Vec<SwitchFixup>,
}

fn lookup(mnemonic: &str) -> Result<Opcode> {
    mnemonic
        .parse::<Opcode>()
        .map_err(|_| Error::InvalidEncoding(format!("unknown mnemonic '{mnemonic}'")))
}

impl InstructionEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn emit_opcode(&mut self, opcode: Opcode) {
        let code = opcode.code();
        if opcode.is_two_byte() {
            self.bytecode.push(FE_PREFIX);
        }
        self.bytecode.push(code.to_le_bytes()[0]);
    }

    /// Emits an instruction with an optional immediate operand.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] if the mnemonic is unknown, the opcode takes a
    /// token or branch operand, or the immediate does not match the operand kind.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Immediate>) -> Result<()> {
        self.emit(lookup(mnemonic)?, operand)
    }

    /// Emits `opcode` with an optional immediate operand.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit(&mut self, opcode: Opcode, operand: Option<Immediate>) -> Result<()> {
        let bytes: Vec<u8> = match (opcode.operand_type(), operand) {
            (OperandType::None, None) => Vec::new(),
            (OperandType::Int8, Some(Immediate::Int8(v))) => v.to_le_bytes().to_vec(),
            (OperandType::UInt8, Some(Immediate::UInt8(v))) => v.to_le_bytes().to_vec(),
            (OperandType::UInt16, Some(Immediate::UInt16(v))) => v.to_le_bytes().to_vec(),
            (OperandType::Int32, Some(Immediate::Int32(v))) => v.to_le_bytes().to_vec(),
            (OperandType::Int64, Some(Immediate::Int64(v))) => v.to_le_bytes().to_vec(),
            (OperandType::Float32, Some(Immediate::Float32(v))) => v.to_le_bytes().to_vec(),
            (OperandType::Float64, Some(Immediate::Float64(v))) => v.to_le_bytes().to_vec(),
            (expected, given) => {
                return Err(Error::InvalidEncoding(format!(
                    "'{opcode}' expects a {expected:?} operand, got {given:?}"
                )))
            }
        };
        self.emit_opcode(opcode);
        self.bytecode.extend_from_slice(&bytes);
        Ok(())
    }

    /// Emits an instruction taking a metadata token.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] if the opcode does not take a token.
    pub fn emit_token(&mut self, mnemonic: &str, token: Token) -> Result<()> {
        let opcode = lookup(mnemonic)?;
        if opcode.operand_type() != OperandType::Token {
            return Err(Error::InvalidEncoding(format!(
                "'{mnemonic}' does not take a token"
            )));
        }
        self.emit_opcode(opcode);
        self.bytecode.extend_from_slice(&token.value().to_le_bytes());
        Ok(())
    }

    /// Emits a branch to `label`, which may be defined before or after.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] if the mnemonic is not a branch.
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let opcode = lookup(mnemonic)?;
        if !matches!(
            opcode.flow(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        ) {
            return Err(Error::InvalidEncoding(format!(
                "'{mnemonic}' is not a branch instruction"
            )));
        }
        let size = match opcode.operand_type() {
            OperandType::ShortBranch => 1,
            _ => 4,
        };

        self.emit_opcode(opcode);
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            position: self.bytecode.len(),
            size,
        });
        self.bytecode.resize(self.bytecode.len() + size, 0);
        Ok(())
    }

    /// Emits a `switch` over `labels`, case `i` jumping to `labels[i]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] if the table is too large.
    pub fn emit_switch(&mut self, labels: &[&str]) -> Result<()> {
        let count = u32::try_from(labels.len())
            .map_err(|_| Error::InvalidEncoding("too many switch targets".to_string()))?;

        self.emit_opcode(Opcode::Switch);
        self.bytecode.extend_from_slice(&count.to_le_bytes());
        let position = self.bytecode.len();
        self.bytecode.resize(position + labels.len() * 4, 0);
        self.switch_fixups.push(SwitchFixup {
            labels: labels.iter().map(|label| (*label).to_string()).collect(),
            position,
            end: self.bytecode.len(),
        });
        Ok(())
    }

    /// Loads argument `index` with the shortest encoding.
    ///
    /// # Errors
    /// Propagates encoding errors.
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit(Opcode::Ldarg0, None),
            1 => self.emit(Opcode::Ldarg1, None),
            2 => self.emit(Opcode::Ldarg2, None),
            3 => self.emit(Opcode::Ldarg3, None),
            _ => match u8::try_from(index) {
                Ok(short) => self.emit(Opcode::LdargS, Some(Immediate::UInt8(short))),
                Err(_) => self.emit(Opcode::Ldarg, Some(Immediate::UInt16(index))),
            },
        }
    }

    /// Loads local `index` with the shortest encoding.
    ///
    /// # Errors
    /// Propagates encoding errors.
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit(Opcode::Ldloc0, None),
            1 => self.emit(Opcode::Ldloc1, None),
            2 => self.emit(Opcode::Ldloc2, None),
            3 => self.emit(Opcode::Ldloc3, None),
            _ => match u8::try_from(index) {
                Ok(short) => self.emit(Opcode::LdlocS, Some(Immediate::UInt8(short))),
                Err(_) => self.emit(Opcode::Ldloc, Some(Immediate::UInt16(index))),
            },
        }
    }

    /// Stores to local `index` with the shortest encoding.
    ///
    /// # Errors
    /// Propagates encoding errors.
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit(Opcode::Stloc0, None),
            1 => self.emit(Opcode::Stloc1, None),
            2 => self.emit(Opcode::Stloc2, None),
            3 => self.emit(Opcode::Stloc3, None),
            _ => match u8::try_from(index) {
                Ok(short) => self.emit(Opcode::StlocS, Some(Immediate::UInt8(short))),
                Err(_) => self.emit(Opcode::Stloc, Some(Immediate::UInt16(index))),
            },
        }
    }

    /// Pushes an `int32` constant with the shortest encoding.
    ///
    /// # Errors
    /// Propagates encoding errors.
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        let opcode = match value {
            -1 => Opcode::LdcI4M1,
            0 => Opcode::LdcI4_0,
            1 => Opcode::LdcI4_1,
            2 => Opcode::LdcI4_2,
            3 => Opcode::LdcI4_3,
            4 => Opcode::LdcI4_4,
            5 => Opcode::LdcI4_5,
            6 => Opcode::LdcI4_6,
            7 => Opcode::LdcI4_7,
            8 => Opcode::LdcI4_8,
            _ => {
                return match i8::try_from(value) {
                    Ok(short) => self.emit(Opcode::LdcI4S, Some(Immediate::Int8(short))),
                    Err(_) => self.emit(Opcode::LdcI4, Some(Immediate::Int32(value))),
                }
            }
        };
        self.emit(opcode, None)
    }

    /// Binds `name` to the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] if the label is already defined.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        let position = self.current_position();
        if self.labels.insert(name.to_string(), position).is_some() {
            return Err(Error::InvalidEncoding(format!(
                "label '{name}' defined twice"
            )));
        }
        Ok(())
    }

    /// Offset of a defined label.
    #[must_use]
    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    /// Number of bytes emitted so far.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn current_position(&self) -> u32 {
        self.bytecode.len() as u32
    }

    fn displacement(&self, label: &str, from: usize) -> Result<i64> {
        let target = self
            .labels
            .get(label)
            .ok_or_else(|| Error::InvalidEncoding(format!("undefined label '{label}'")))?;
        let from = i64::try_from(from)
            .map_err(|_| Error::InvalidEncoding("code size out of range".to_string()))?;
        Ok(i64::from(*target) - from)
    }

    /// Resolves all branches and returns the code with the final label offsets.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] if a label is undefined or a short branch cannot
    /// reach its target.
    pub fn finalize(mut self) -> Result<(Vec<u8>, HashMap<String, u32>)> {
        for fixup in std::mem::take(&mut self.fixups) {
            let delta = self.displacement(&fixup.label, fixup.position + fixup.size)?;
            if fixup.size == 1 {
                let short = i8::try_from(delta).map_err(|_| {
                    Error::InvalidEncoding(format!(
                        "short branch to '{}' out of range ({delta})",
                        fixup.label
                    ))
                })?;
                self.bytecode[fixup.position] = short.to_le_bytes()[0];
            } else {
                let long = i32::try_from(delta).map_err(|_| {
                    Error::InvalidEncoding(format!("branch to '{}' out of range", fixup.label))
                })?;
                self.bytecode[fixup.position..fixup.position + 4]
                    .copy_from_slice(&long.to_le_bytes());
            }
        }

        for fixup in std::mem::take(&mut self.switch_fixups) {
            for (case, label) in fixup.labels.iter().enumerate() {
                let delta = i32::try_from(self.displacement(label, fixup.end)?).map_err(|_| {
                    Error::InvalidEncoding(format!("switch target '{label}' out of range"))
                })?;
                let at = fixup.position + case * 4;
                self.bytecode[at..at + 4].copy_from_slice(&delta.to_le_bytes());
            }
        }

        Ok((self.bytecode, self.labels))
    }
}
