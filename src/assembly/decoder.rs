//! CIL bytecode decoder.
//!
//! [`decode_method`] turns the raw code bytes of a method body into an
//! [`crate::assembly::InstructionList`]. Decoding runs in two passes:
//!
//! 1. A linear scan reads every opcode and its operand. Branch displacements are converted into
//!    absolute byte offsets, switch tables are expanded into one case node per entry placed right
//!    after the `switch` node, and metadata tokens are resolved through the supplied
//!    [`crate::metadata::resolver::MemberResolver`].
//! 2. Every branch operand is rewritten into a direct reference to the node at its target offset.
//!
//! Any structural defect (unknown opcode, operand reading past the end of the buffer, branch
//! into the middle of an instruction or past the last one) fails with
//! [`crate::Error::MalformedStream`]. Token resolution failures do not: the operand becomes
//! [`crate::metadata::members::Member::Unknown`] and decoding continues.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::{
//!     assembly::{decode_method, Opcode, Operand},
//!     metadata::{resolver::MemoryResolver, token::Token},
//! };
//!
//! // ldarg.0; brtrue.s +1; nop; ret
//! let code = [0x02, 0x2D, 0x01, 0x00, 0x2A];
//! let list = decode_method(&code, Token::new(0x0600_0001), &MemoryResolver::new())?;
//!
//! assert_eq!(list.instruction_count(), 4);
//! let branch = &list[list.next(list.first())];
//! assert!(branch.is(Opcode::BrtrueS));
//! let target = branch.target().unwrap();
//! assert_eq!(list[target].offset, 4);
//! # Ok::<(), ciltac::Error>(())
//! ```

use log::debug;

use crate::{
    assembly::{
        instruction::{Immediate, InstrId, NodeKind, Operand, OperandType},
        list::InstructionList,
        opcodes::{Opcode, FE_PREFIX},
    },
    file::{io::CilIO, parser::Parser},
    metadata::{members::Member, resolver::MemberResolver, token::Token},
    Result,
};

/// Decodes the code bytes of `method` into a linked instruction list.
///
/// # Arguments
/// * `code` - The raw IL bytes, without the method header
/// * `method` - Token of the method, passed on to the resolver for context
/// * `resolver` - Resolves token operands
///
/// # Errors
/// Returns [`crate::Error::MalformedStream`] if the bytes are not a well-formed instruction stream.
pub fn decode_method(
    code: &[u8],
    method: Token,
    resolver: &dyn MemberResolver,
) -> Result<InstructionList> {
    if u32::try_from(code.len()).is_err() {
        return Err(malformed_error!("Code size {} exceeds 4 GiB", code.len()));
    }

    let mut parser = Parser::new(code);
    let mut list = InstructionList::new();
    let mut pending: Vec<(InstrId, u32)> = Vec::new();

    while parser.has_more_data() {
        decode_instruction(&mut parser, &mut list, &mut pending, method, resolver)?;
    }

    if parser.pos() != code.len() {
        return Err(malformed_error!(
            "Decoding stopped at {} of {} bytes",
            parser.pos(),
            code.len()
        ));
    }

    for (id, target) in pending {
        let resolved = match list.node_at(target) {
            Some(node) if !node.is_back() => node,
            Some(_) => {
                return Err(malformed_error!(
                    "Branch at IL_{:04X} targets the end of the method",
                    list[id].offset
                ))
            }
            None => {
                return Err(malformed_error!(
                    "Branch at IL_{:04X} targets IL_{:04X}, which is not an instruction boundary",
                    list[id].offset,
                    target
                ))
            }
        };
        if let Some(node) = list.get_mut(id) {
            node.operand = Operand::Target(resolved);
        }
    }

    Ok(list)
}

#[allow(clippy::cast_possible_truncation)]
fn position(parser: &Parser) -> u32 {
    parser.pos() as u32
}

fn read<T: CilIO>(parser: &mut Parser, offset: u32) -> Result<T> {
    parser.read_le::<T>().map_err(|_| {
        malformed_error!(
            "Operand of instruction at IL_{:04X} reads past the end of the stream",
            offset
        )
    })
}

fn branch_target(offset: u32, next: u32, delta: i64) -> Result<u32> {
    u32::try_from(i64::from(next) + delta).map_err(|_| {
        malformed_error!(
            "Branch at IL_{:04X} with displacement {} leaves the method",
            offset,
            delta
        )
    })
}

fn decode_instruction(
    parser: &mut Parser,
    list: &mut InstructionList,
    pending: &mut Vec<(InstrId, u32)>,
    method: Token,
    resolver: &dyn MemberResolver,
) -> Result<()> {
    let offset = position(parser);
    let first = read::<u8>(parser, offset)?;
    let code = if first == FE_PREFIX {
        0xFE00 | u16::from(read::<u8>(parser, offset)?)
    } else {
        u16::from(first)
    };
    let Some(opcode) = Opcode::from_code(code) else {
        return Err(malformed_error!(
            "Invalid opcode 0x{:X} at IL_{:04X}",
            code,
            offset
        ));
    };

    let operand = match opcode.operand_type() {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(read(parser, offset)?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(read(parser, offset)?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(read(parser, offset)?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(read(parser, offset)?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(read(parser, offset)?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(read(parser, offset)?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(read(parser, offset)?)),
        OperandType::Token => {
            let token = Token::new(read(parser, offset)?);
            Operand::Member(resolve_member(opcode, token, offset, method, resolver))
        }
        OperandType::ShortBranch => {
            let delta = i64::from(read::<i8>(parser, offset)?);
            Operand::Offset(branch_target(offset, position(parser), delta)?)
        }
        OperandType::Branch => {
            let delta = i64::from(read::<i32>(parser, offset)?);
            Operand::Offset(branch_target(offset, position(parser), delta)?)
        }
        OperandType::Switch => return decode_switch(parser, list, pending, offset),
    };

    let size = position(parser) - offset;
    let branch = match operand {
        Operand::Offset(target) => Some(target),
        _ => None,
    };
    let id = list.push_back(NodeKind::Op(opcode), offset, size, operand);
    if let Some(target) = branch {
        pending.push((id, target));
    }
    Ok(())
}

fn decode_switch(
    parser: &mut Parser,
    list: &mut InstructionList,
    pending: &mut Vec<(InstrId, u32)>,
    offset: u32,
) -> Result<()> {
    let count = read::<u32>(parser, offset)?;
    let table_size = u64::from(count) * 4;
    if table_size > parser.remaining() as u64 {
        return Err(malformed_error!(
            "Switch at IL_{:04X} declares {} cases, more than the stream holds",
            offset,
            count
        ));
    }

    let header_end = position(parser);
    list.push_back(
        NodeKind::Op(Opcode::Switch),
        offset,
        header_end - offset,
        Operand::Switch(count),
    );

    #[allow(clippy::cast_possible_truncation)]
    let base = header_end + table_size as u32;
    for _ in 0..count {
        let case_offset = position(parser);
        let delta = i64::from(read::<i32>(parser, offset)?);
        let target = branch_target(offset, base, delta)?;
        let id = list.push_back(NodeKind::SwitchCase, case_offset, 4, Operand::Offset(target));
        pending.push((id, target));
    }
    Ok(())
}

/// Resolves a token operand according to what the opcode expects.
fn resolve_member(
    opcode: Opcode,
    token: Token,
    offset: u32,
    method: Token,
    resolver: &dyn MemberResolver,
) -> Member {
    let resolved = match opcode {
        Opcode::Call
        | Opcode::Callvirt
        | Opcode::Newobj
        | Opcode::Jmp
        | Opcode::Ldftn
        | Opcode::Ldvirtftn => resolver.resolve_method(method, token).map(Member::Method),
        Opcode::Ldfld
        | Opcode::Ldflda
        | Opcode::Stfld
        | Opcode::Ldsfld
        | Opcode::Ldsflda
        | Opcode::Stsfld => resolver.resolve_field(method, token).map(Member::Field),
        Opcode::Ldstr => resolver.resolve_string(method, token).map(Member::String),
        Opcode::Calli => resolver
            .resolve_signature(method, token)
            .map(Member::Signature),
        Opcode::Ldtoken => resolver
            .resolve_type(method, token)
            .map(Member::Type)
            .or_else(|_| resolver.resolve_method(method, token).map(Member::Method))
            .or_else(|_| resolver.resolve_field(method, token).map(Member::Field)),
        _ => resolver.resolve_type(method, token).map(Member::Type),
    };

    resolved.unwrap_or_else(|error| {
        debug!(
            "{method}: {opcode} at IL_{offset:04X} uses placeholder for {token} ({error})"
        );
        Member::Unknown(token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{members::MethodSig, resolver::MemoryResolver, typesystem::TacType},
        Error,
    };

    const METHOD: Token = Token::new(0x0600_0001);

    fn decode(code: &[u8]) -> Result<InstructionList> {
        decode_method(code, METHOD, &MemoryResolver::new())
    }

    #[test]
    fn straight_line() {
        // ldc.i4.s 10; ldc.i4 0x100; add; ret
        let code = [0x1F, 0x0A, 0x20, 0x00, 0x01, 0x00, 0x00, 0x58, 0x2A];
        let list = decode(&code).unwrap();

        assert_eq!(list.instruction_count(), 4);
        let sizes: u32 = list.iter().map(|i| i.size).sum();
        assert_eq!(sizes as usize, code.len());

        let offsets: Vec<u32> = list.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 2, 7, 8]);
        assert_eq!(
            list[InstrId(1)].immediate(),
            Some(Immediate::Int32(0x100))
        );
        assert!(list[InstrId(3)].is(Opcode::Ret));
    }

    #[test]
    fn two_byte_opcodes() {
        // ldarg.0; ldarg.1; ceq; ldarg 0x0102; ret
        let code = [0x02, 0x03, 0xFE, 0x01, 0xFE, 0x09, 0x02, 0x01, 0x2A];
        let list = decode(&code).unwrap();
        assert!(list[InstrId(2)].is(Opcode::Ceq));
        assert_eq!(list[InstrId(2)].size, 2);
        assert_eq!(
            list[InstrId(3)].immediate(),
            Some(Immediate::UInt16(0x0102))
        );
    }

    #[test]
    fn branches_resolve_to_nodes() {
        // 0: br.s +1 ; 2: nop ; 3: br -8 (back to 0)
        let code = [0x2B, 0x01, 0x00, 0x38, 0xF8, 0xFF, 0xFF, 0xFF];
        let list = decode(&code).unwrap();

        let forward = list[InstrId(0)].target().unwrap();
        assert_eq!(list[forward].offset, 3);
        let backward = list[InstrId(2)].target().unwrap();
        assert_eq!(list[backward].offset, 0);
    }

    #[test]
    fn switch_expands_into_cases() {
        // 0: ldarg.0 ; 1: switch (2) [+1, +0] ; 14: nop ; 15: ret
        let code = [
            0x02, 0x45, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x2A,
        ];
        let list = decode(&code).unwrap();

        assert_eq!(list.len(), 6);
        assert_eq!(list.instruction_count(), 4);
        let switch = &list[InstrId(1)];
        assert_eq!(switch.operand, Operand::Switch(2));
        assert_eq!(switch.size, 5);

        let first_case = &list[InstrId(2)];
        assert_eq!(first_case.kind, NodeKind::SwitchCase);
        assert_eq!(list[first_case.target().unwrap()].offset, 15);
        let second_case = &list[InstrId(3)];
        assert_eq!(list[second_case.target().unwrap()].offset, 14);

        let sizes: u32 = list.iter().map(|i| i.size).sum();
        assert_eq!(sizes as usize, code.len());
    }

    #[test]
    fn truncated_operand() {
        // ldc.i4 with only two operand bytes
        let result = decode(&[0x20, 0x01, 0x02]);
        assert!(matches!(result, Err(Error::MalformedStream { .. })));
    }

    #[test]
    fn oversized_switch_table() {
        let result = decode(&[0x45, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(matches!(result, Err(Error::MalformedStream { .. })));
    }

    #[test]
    fn invalid_opcode() {
        assert!(matches!(decode(&[0x24]), Err(Error::MalformedStream { .. })));
        assert!(matches!(
            decode(&[0xFE, 0x08]),
            Err(Error::MalformedStream { .. })
        ));
        assert!(matches!(decode(&[0xFE]), Err(Error::MalformedStream { .. })));
    }

    #[test]
    fn branch_into_instruction_middle() {
        // br.s +1 lands inside ldc.i4.s
        let code = [0x2B, 0x01, 0x1F, 0x05, 0x2A];
        assert!(matches!(decode(&code), Err(Error::MalformedStream { .. })));
    }

    #[test]
    fn branch_past_end() {
        let code = [0x00, 0x2B, 0x00];
        assert!(matches!(decode(&code), Err(Error::MalformedStream { .. })));
        let code = [0x2B, 0xF0];
        assert!(matches!(decode(&code), Err(Error::MalformedStream { .. })));
    }

    #[test]
    fn unresolved_tokens_become_placeholders() {
        // call 0x0A000001; ret
        let code = [0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A];
        let list = decode(&code).unwrap();
        assert_eq!(
            list[InstrId(0)].member(),
            Some(&Member::Unknown(Token::new(0x0A00_0001)))
        );
    }

    #[test]
    fn tokens_resolve_by_opcode() {
        let mut resolver = MemoryResolver::new();
        resolver
            .add_method(
                Token::new(0x0A00_0001),
                MethodSig::new_static(TacType::class("C"), "M", vec![], TacType::Void),
            )
            .add_string(Token::new(0x7000_0001), "text");

        // ldtoken 0x0A000001; pop; ldstr 0x70000001; pop; ret
        let code = [
            0xD0, 0x01, 0x00, 0x00, 0x0A, 0x26, 0x72, 0x01, 0x00, 0x00, 0x70, 0x26, 0x2A,
        ];
        let list = decode_method(&code, METHOD, &resolver).unwrap();

        assert!(matches!(list[InstrId(0)].member(), Some(Member::Method(m)) if m.name == "M"));
        assert!(matches!(list[InstrId(2)].member(), Some(Member::String(s)) if &**s == "text"));
    }

    #[test]
    fn empty_body() {
        let list = decode(&[]).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.code_len(), 0);
    }
}
