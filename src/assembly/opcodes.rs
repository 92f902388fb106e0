//! The CIL opcode table (ECMA-335 Partition III).
//!
//! [`Opcode`] is a closed enumeration of every defined single-byte opcode and every `0xFE`
//! prefixed opcode. Each entry carries its encoding, mnemonic, operand kind and semantic
//! class. Two-byte opcodes are encoded as `0xFE00 | second_byte`.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::assembly::{Opcode, OperandType, OpcodeClass};
//!
//! let op = Opcode::from_code(0xFE01).unwrap();
//! assert_eq!(op, Opcode::Ceq);
//! assert_eq!(op.mnemonic(), "ceq");
//! assert_eq!(op.class(), OpcodeClass::Compare);
//! assert_eq!(Opcode::BrS.operand_type(), OperandType::ShortBranch);
//! assert_eq!("ldc.i4.s".parse::<Opcode>().unwrap(), Opcode::LdcI4S);
//! ```

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::assembly::instruction::{FlowType, OpcodeClass, OperandType};

/// First byte shared by all two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

macro_rules! opcodes {
    ($($name:ident = $code:tt, $mnemonic:tt, $operand:ident, $class:ident;)*) => {
        /// A CIL opcode.
        ///
        /// `Display` and `FromStr` use the ECMA-335 mnemonic.
        #[allow(missing_docs)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
        )]
        pub enum Opcode {
            $(
                #[strum(serialize = $mnemonic)]
                $name,
            )*
        }

        impl Opcode {
            /// Encoded value; two-byte opcodes carry the `0xFE` prefix in the high byte.
            #[must_use]
            pub const fn code(self) -> u16 {
                match self {
                    $(Opcode::$name => $code,)*
                }
            }

            /// Looks up an opcode by its encoded value.
            #[must_use]
            pub const fn from_code(code: u16) -> Option<Opcode> {
                match code {
                    $($code => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Kind of the inline operand following the opcode bytes.
            #[must_use]
            pub const fn operand_type(self) -> OperandType {
                match self {
                    $(Opcode::$name => OperandType::$operand,)*
                }
            }

            /// Semantic group of the opcode.
            #[must_use]
            pub const fn class(self) -> OpcodeClass {
                match self {
                    $(Opcode::$name => OpcodeClass::$class,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None, Misc;
    Break = 0x01, "break", None, Misc;
    Ldarg0 = 0x02, "ldarg.0", None, Load;
    Ldarg1 = 0x03, "ldarg.1", None, Load;
    Ldarg2 = 0x04, "ldarg.2", None, Load;
    Ldarg3 = 0x05, "ldarg.3", None, Load;
    Ldloc0 = 0x06, "ldloc.0", None, Load;
    Ldloc1 = 0x07, "ldloc.1", None, Load;
    Ldloc2 = 0x08, "ldloc.2", None, Load;
    Ldloc3 = 0x09, "ldloc.3", None, Load;
    Stloc0 = 0x0A, "stloc.0", None, Store;
    Stloc1 = 0x0B, "stloc.1", None, Store;
    Stloc2 = 0x0C, "stloc.2", None, Store;
    Stloc3 = 0x0D, "stloc.3", None, Store;
    LdargS = 0x0E, "ldarg.s", UInt8, Load;
    LdargaS = 0x0F, "ldarga.s", UInt8, LoadAddress;
    StargS = 0x10, "starg.s", UInt8, Store;
    LdlocS = 0x11, "ldloc.s", UInt8, Load;
    LdlocaS = 0x12, "ldloca.s", UInt8, LoadAddress;
    StlocS = 0x13, "stloc.s", UInt8, Store;
    Ldnull = 0x14, "ldnull", None, Load;
    LdcI4M1 = 0x15, "ldc.i4.m1", None, Load;
    LdcI4_0 = 0x16, "ldc.i4.0", None, Load;
    LdcI4_1 = 0x17, "ldc.i4.1", None, Load;
    LdcI4_2 = 0x18, "ldc.i4.2", None, Load;
    LdcI4_3 = 0x19, "ldc.i4.3", None, Load;
    LdcI4_4 = 0x1A, "ldc.i4.4", None, Load;
    LdcI4_5 = 0x1B, "ldc.i4.5", None, Load;
    LdcI4_6 = 0x1C, "ldc.i4.6", None, Load;
    LdcI4_7 = 0x1D, "ldc.i4.7", None, Load;
    LdcI4_8 = 0x1E, "ldc.i4.8", None, Load;
    LdcI4S = 0x1F, "ldc.i4.s", Int8, Load;
    LdcI4 = 0x20, "ldc.i4", Int32, Load;
    LdcI8 = 0x21, "ldc.i8", Int64, Load;
    LdcR4 = 0x22, "ldc.r4", Float32, Load;
    LdcR8 = 0x23, "ldc.r8", Float64, Load;
    Dup = 0x25, "dup", None, Stack;
    Pop = 0x26, "pop", None, Stack;
    Jmp = 0x27, "jmp", Token, Call;
    Call = 0x28, "call", Token, Call;
    Calli = 0x29, "calli", Token, Call;
    Ret = 0x2A, "ret", None, Return;
    BrS = 0x2B, "br.s", ShortBranch, Branch;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch, Branch;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch, Branch;
    BeqS = 0x2E, "beq.s", ShortBranch, Branch;
    BgeS = 0x2F, "bge.s", ShortBranch, Branch;
    BgtS = 0x30, "bgt.s", ShortBranch, Branch;
    BleS = 0x31, "ble.s", ShortBranch, Branch;
    BltS = 0x32, "blt.s", ShortBranch, Branch;
    BneUnS = 0x33, "bne.un.s", ShortBranch, Branch;
    BgeUnS = 0x34, "bge.un.s", ShortBranch, Branch;
    BgtUnS = 0x35, "bgt.un.s", ShortBranch, Branch;
    BleUnS = 0x36, "ble.un.s", ShortBranch, Branch;
    BltUnS = 0x37, "blt.un.s", ShortBranch, Branch;
    Br = 0x38, "br", Branch, Branch;
    Brfalse = 0x39, "brfalse", Branch, Branch;
    Brtrue = 0x3A, "brtrue", Branch, Branch;
    Beq = 0x3B, "beq", Branch, Branch;
    Bge = 0x3C, "bge", Branch, Branch;
    Bgt = 0x3D, "bgt", Branch, Branch;
    Ble = 0x3E, "ble", Branch, Branch;
    Blt = 0x3F, "blt", Branch, Branch;
    BneUn = 0x40, "bne.un", Branch, Branch;
    BgeUn = 0x41, "bge.un", Branch, Branch;
    BgtUn = 0x42, "bgt.un", Branch, Branch;
    BleUn = 0x43, "ble.un", Branch, Branch;
    BltUn = 0x44, "blt.un", Branch, Branch;
    Switch = 0x45, "switch", Switch, Branch;
    LdindI1 = 0x46, "ldind.i1", None, Indirect;
    LdindU1 = 0x47, "ldind.u1", None, Indirect;
    LdindI2 = 0x48, "ldind.i2", None, Indirect;
    LdindU2 = 0x49, "ldind.u2", None, Indirect;
    LdindI4 = 0x4A, "ldind.i4", None, Indirect;
    LdindU4 = 0x4B, "ldind.u4", None, Indirect;
    LdindI8 = 0x4C, "ldind.i8", None, Indirect;
    LdindI = 0x4D, "ldind.i", None, Indirect;
    LdindR4 = 0x4E, "ldind.r4", None, Indirect;
    LdindR8 = 0x4F, "ldind.r8", None, Indirect;
    LdindRef = 0x50, "ldind.ref", None, Indirect;
    StindRef = 0x51, "stind.ref", None, Indirect;
    StindI1 = 0x52, "stind.i1", None, Indirect;
    StindI2 = 0x53, "stind.i2", None, Indirect;
    StindI4 = 0x54, "stind.i4", None, Indirect;
    StindI8 = 0x55, "stind.i8", None, Indirect;
    StindR4 = 0x56, "stind.r4", None, Indirect;
    StindR8 = 0x57, "stind.r8", None, Indirect;
    Add = 0x58, "add", None, Arithmetic;
    Sub = 0x59, "sub", None, Arithmetic;
    Mul = 0x5A, "mul", None, Arithmetic;
    Div = 0x5B, "div", None, Arithmetic;
    DivUn = 0x5C, "div.un", None, Arithmetic;
    Rem = 0x5D, "rem", None, Arithmetic;
    RemUn = 0x5E, "rem.un", None, Arithmetic;
    And = 0x5F, "and", None, Bitwise;
    Or = 0x60, "or", None, Bitwise;
    Xor = 0x61, "xor", None, Bitwise;
    Shl = 0x62, "shl", None, Bitwise;
    Shr = 0x63, "shr", None, Bitwise;
    ShrUn = 0x64, "shr.un", None, Bitwise;
    Neg = 0x65, "neg", None, Arithmetic;
    Not = 0x66, "not", None, Bitwise;
    ConvI1 = 0x67, "conv.i1", None, Convert;
    ConvI2 = 0x68, "conv.i2", None, Convert;
    ConvI4 = 0x69, "conv.i4", None, Convert;
    ConvI8 = 0x6A, "conv.i8", None, Convert;
    ConvR4 = 0x6B, "conv.r4", None, Convert;
    ConvR8 = 0x6C, "conv.r8", None, Convert;
    ConvU4 = 0x6D, "conv.u4", None, Convert;
    ConvU8 = 0x6E, "conv.u8", None, Convert;
    Callvirt = 0x6F, "callvirt", Token, Call;
    Cpobj = 0x70, "cpobj", Token, Object;
    Ldobj = 0x71, "ldobj", Token, Object;
    Ldstr = 0x72, "ldstr", Token, Load;
    Newobj = 0x73, "newobj", Token, Object;
    Castclass = 0x74, "castclass", Token, Object;
    Isinst = 0x75, "isinst", Token, Object;
    ConvRUn = 0x76, "conv.r.un", None, Convert;
    Unbox = 0x79, "unbox", Token, Object;
    Throw = 0x7A, "throw", None, ExceptionHandling;
    Ldfld = 0x7B, "ldfld", Token, Field;
    Ldflda = 0x7C, "ldflda", Token, Field;
    Stfld = 0x7D, "stfld", Token, Field;
    Ldsfld = 0x7E, "ldsfld", Token, Field;
    Ldsflda = 0x7F, "ldsflda", Token, Field;
    Stsfld = 0x80, "stsfld", Token, Field;
    Stobj = 0x81, "stobj", Token, Object;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", None, Convert;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", None, Convert;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", None, Convert;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", None, Convert;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", None, Convert;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", None, Convert;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", None, Convert;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", None, Convert;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", None, Convert;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", None, Convert;
    Box = 0x8C, "box", Token, Object;
    Newarr = 0x8D, "newarr", Token, Array;
    Ldlen = 0x8E, "ldlen", None, Array;
    Ldelema = 0x8F, "ldelema", Token, Array;
    LdelemI1 = 0x90, "ldelem.i1", None, Array;
    LdelemU1 = 0x91, "ldelem.u1", None, Array;
    LdelemI2 = 0x92, "ldelem.i2", None, Array;
    LdelemU2 = 0x93, "ldelem.u2", None, Array;
    LdelemI4 = 0x94, "ldelem.i4", None, Array;
    LdelemU4 = 0x95, "ldelem.u4", None, Array;
    LdelemI8 = 0x96, "ldelem.i8", None, Array;
    LdelemI = 0x97, "ldelem.i", None, Array;
    LdelemR4 = 0x98, "ldelem.r4", None, Array;
    LdelemR8 = 0x99, "ldelem.r8", None, Array;
    LdelemRef = 0x9A, "ldelem.ref", None, Array;
    StelemI = 0x9B, "stelem.i", None, Array;
    StelemI1 = 0x9C, "stelem.i1", None, Array;
    StelemI2 = 0x9D, "stelem.i2", None, Array;
    StelemI4 = 0x9E, "stelem.i4", None, Array;
    StelemI8 = 0x9F, "stelem.i8", None, Array;
    StelemR4 = 0xA0, "stelem.r4", None, Array;
    StelemR8 = 0xA1, "stelem.r8", None, Array;
    StelemRef = 0xA2, "stelem.ref", None, Array;
    Ldelem = 0xA3, "ldelem", Token, Array;
    Stelem = 0xA4, "stelem", Token, Array;
    UnboxAny = 0xA5, "unbox.any", Token, Object;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", None, Convert;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", None, Convert;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", None, Convert;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", None, Convert;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", None, Convert;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", None, Convert;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", None, Convert;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", None, Convert;
    Refanyval = 0xC2, "refanyval", Token, Object;
    Ckfinite = 0xC3, "ckfinite", None, Arithmetic;
    Mkrefany = 0xC6, "mkrefany", Token, Object;
    Ldtoken = 0xD0, "ldtoken", Token, Load;
    ConvU2 = 0xD1, "conv.u2", None, Convert;
    ConvU1 = 0xD2, "conv.u1", None, Convert;
    ConvI = 0xD3, "conv.i", None, Convert;
    ConvOvfI = 0xD4, "conv.ovf.i", None, Convert;
    ConvOvfU = 0xD5, "conv.ovf.u", None, Convert;
    AddOvf = 0xD6, "add.ovf", None, Arithmetic;
    AddOvfUn = 0xD7, "add.ovf.un", None, Arithmetic;
    MulOvf = 0xD8, "mul.ovf", None, Arithmetic;
    MulOvfUn = 0xD9, "mul.ovf.un", None, Arithmetic;
    SubOvf = 0xDA, "sub.ovf", None, Arithmetic;
    SubOvfUn = 0xDB, "sub.ovf.un", None, Arithmetic;
    Endfinally = 0xDC, "endfinally", None, ExceptionHandling;
    Leave = 0xDD, "leave", Branch, ExceptionHandling;
    LeaveS = 0xDE, "leave.s", ShortBranch, ExceptionHandling;
    StindI = 0xDF, "stind.i", None, Indirect;
    ConvU = 0xE0, "conv.u", None, Convert;
    Arglist = 0xFE00, "arglist", None, Misc;
    Ceq = 0xFE01, "ceq", None, Compare;
    Cgt = 0xFE02, "cgt", None, Compare;
    CgtUn = 0xFE03, "cgt.un", None, Compare;
    Clt = 0xFE04, "clt", None, Compare;
    CltUn = 0xFE05, "clt.un", None, Compare;
    Ldftn = 0xFE06, "ldftn", Token, Load;
    Ldvirtftn = 0xFE07, "ldvirtftn", Token, Load;
    Ldarg = 0xFE09, "ldarg", UInt16, Load;
    Ldarga = 0xFE0A, "ldarga", UInt16, LoadAddress;
    Starg = 0xFE0B, "starg", UInt16, Store;
    Ldloc = 0xFE0C, "ldloc", UInt16, Load;
    Ldloca = 0xFE0D, "ldloca", UInt16, LoadAddress;
    Stloc = 0xFE0E, "stloc", UInt16, Store;
    Localloc = 0xFE0F, "localloc", None, Misc;
    Endfilter = 0xFE11, "endfilter", None, ExceptionHandling;
    Unaligned = 0xFE12, "unaligned.", UInt8, Prefix;
    Volatile = 0xFE13, "volatile.", None, Prefix;
    Tail = 0xFE14, "tail.", None, Prefix;
    Initobj = 0xFE15, "initobj", Token, Object;
    Constrained = 0xFE16, "constrained.", Token, Prefix;
    Cpblk = 0xFE17, "cpblk", None, Misc;
    Initblk = 0xFE18, "initblk", None, Misc;
    No = 0xFE19, "no.", UInt8, Prefix;
    Rethrow = 0xFE1A, "rethrow", None, ExceptionHandling;
    Sizeof = 0xFE1C, "sizeof", Token, Object;
    Refanytype = 0xFE1D, "refanytype", None, Object;
    Readonly = 0xFE1E, "readonly.", None, Prefix;
}

impl Opcode {
    /// The ECMA-335 mnemonic, e.g. `ldarg.0`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Number of bytes used to encode the opcode itself.
    #[must_use]
    pub const fn size(self) -> usize {
        if self.code() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Returns `true` for opcodes encoded with the `0xFE` prefix.
    #[must_use]
    pub const fn is_two_byte(self) -> bool {
        self.size() == 2
    }

    /// Returns `true` for instruction prefixes such as `tail.` or `volatile.`.
    #[must_use]
    pub fn is_prefix(self) -> bool {
        self.class() == OpcodeClass::Prefix
    }

    /// How execution continues after this opcode.
    #[must_use]
    pub fn flow(self) -> FlowType {
        match self {
            Opcode::Br | Opcode::BrS => FlowType::UnconditionalBranch,
            Opcode::Leave | Opcode::LeaveS => FlowType::Leave,
            Opcode::Switch => FlowType::Switch,
            Opcode::Ret => FlowType::Return,
            Opcode::Throw => FlowType::Throw,
            Opcode::Rethrow => FlowType::Rethrow,
            Opcode::Endfinally => FlowType::EndFinally,
            Opcode::Endfilter => FlowType::EndFilter,
            Opcode::Jmp => FlowType::Jump,
            _ if self.class() == OpcodeClass::Branch => FlowType::ConditionalBranch,
            Opcode::Call | Opcode::Callvirt | Opcode::Calli | Opcode::Newobj => FlowType::Call,
            _ => FlowType::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn table_is_consistent() {
        let mut codes = HashSet::new();
        let mut mnemonics = HashSet::new();
        for op in Opcode::iter() {
            assert!(codes.insert(op.code()), "duplicate code for {op}");
            assert!(mnemonics.insert(op.mnemonic()), "duplicate mnemonic {op}");
            assert_eq!(Opcode::from_code(op.code()), Some(op));
            assert_eq!(op.mnemonic().parse::<Opcode>().unwrap(), op);
        }
        assert_eq!(codes.len(), 219);
    }

    #[test]
    fn reserved_codes() {
        assert_eq!(Opcode::from_code(0x24), None);
        assert_eq!(Opcode::from_code(0xA6), None);
        assert_eq!(Opcode::from_code(0xE1), None);
        assert_eq!(Opcode::from_code(0xFE08), None);
        assert_eq!(Opcode::from_code(0xFE1B), None);
        assert_eq!(Opcode::from_code(0xFEFF), None);
    }

    #[test]
    fn encoding_width() {
        assert_eq!(Opcode::Nop.size(), 1);
        assert_eq!(Opcode::Ceq.size(), 2);
        assert!(Opcode::Rethrow.is_two_byte());
        assert!(!Opcode::Throw.is_two_byte());
    }

    #[test]
    fn flow_classification() {
        assert_eq!(Opcode::BneUnS.flow(), FlowType::ConditionalBranch);
        assert_eq!(Opcode::Brtrue.flow(), FlowType::ConditionalBranch);
        assert_eq!(Opcode::BrS.flow(), FlowType::UnconditionalBranch);
        assert_eq!(Opcode::LeaveS.flow(), FlowType::Leave);
        assert_eq!(Opcode::Switch.flow(), FlowType::Switch);
        assert_eq!(Opcode::Endfilter.flow(), FlowType::EndFilter);
        assert_eq!(Opcode::Callvirt.flow(), FlowType::Call);
        assert_eq!(Opcode::Add.flow(), FlowType::Sequential);
        assert!(Opcode::Tail.is_prefix());
        assert!(Opcode::Constrained.is_prefix());
        assert!(!Opcode::Call.is_prefix());
    }

    #[test]
    fn display_uses_mnemonic() {
        assert_eq!(Opcode::ConvOvfI1Un.to_string(), "conv.ovf.i1.un");
        assert_eq!(Opcode::Readonly.to_string(), "readonly.");
        assert_eq!(Opcode::LdcI4M1.to_string(), "ldc.i4.m1");
    }
}
