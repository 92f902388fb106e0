//! Result types of stack operations.
//!
//! Binary and unary results follow the operand tables of ECMA-335 Partition III, 1.5, applied
//! to the stack types of the inputs. Combinations the tables leave undefined produce
//! [`TacType::Unknown`] instead of an error, since the translator is not a verifier.

use crate::{
    analysis::tac::statement::{BinaryOp, UnaryOp},
    assembly::Opcode,
    metadata::typesystem::TacType,
};

/// Shared numeric type of two stack types, if they may meet in arithmetic.
fn numeric(left: &TacType, right: &TacType) -> Option<TacType> {
    match (left, right) {
        (TacType::I32, TacType::I32) => Some(TacType::I32),
        (TacType::I64, TacType::I64) => Some(TacType::I64),
        (TacType::I32 | TacType::NativeInt, TacType::I32 | TacType::NativeInt) => {
            Some(TacType::NativeInt)
        }
        (TacType::F64, TacType::F64) => Some(TacType::F64),
        _ => None,
    }
}

fn is_offset(ty: &TacType) -> bool {
    matches!(ty, TacType::I32 | TacType::NativeInt)
}

/// Type produced by a binary operator.
pub(crate) fn binary_result(op: BinaryOp, left: &TacType, right: &TacType) -> TacType {
    let (left, right) = (left.stack_type(), right.stack_type());
    if left.is_unknown() || right.is_unknown() {
        return TacType::Unknown;
    }

    if op.is_shift() {
        return match (&left, &right) {
            (TacType::I32 | TacType::I64 | TacType::NativeInt, TacType::I32 | TacType::NativeInt) => {
                left
            }
            _ => TacType::Unknown,
        };
    }

    if let Some(ty) = numeric(&left, &right) {
        let integer_only = op.is_bitwise()
            || op.is_checked()
            || matches!(op, BinaryOp::DivUn | BinaryOp::RemUn);
        return if ty.is_float() && integer_only {
            TacType::Unknown
        } else {
            ty
        };
    }

    // pointer arithmetic
    match op {
        BinaryOp::Add | BinaryOp::AddOvfUn => {
            if left.is_pointer() && is_offset(&right) {
                left
            } else if is_offset(&left) && right.is_pointer() {
                right
            } else {
                TacType::Unknown
            }
        }
        BinaryOp::Sub | BinaryOp::SubOvfUn => {
            if left.is_pointer() && is_offset(&right) {
                left
            } else if left.is_pointer() && right.is_pointer() {
                TacType::NativeInt
            } else {
                TacType::Unknown
            }
        }
        _ => TacType::Unknown,
    }
}

/// Type produced by a unary operator.
pub(crate) fn unary_result(op: UnaryOp, operand: &TacType) -> TacType {
    let ty = operand.stack_type();
    match (op, &ty) {
        (_, TacType::I32 | TacType::I64 | TacType::NativeInt) | (UnaryOp::Neg, TacType::F64) => {
            ty
        }
        _ => TacType::Unknown,
    }
}

/// Target type, overflow check and unsigned source of a conversion opcode.
pub(crate) fn conversion(opcode: Opcode) -> Option<(TacType, bool, bool)> {
    let (ty, checked, unsigned) = match opcode {
        Opcode::ConvI1 => (TacType::I8, false, false),
        Opcode::ConvI2 => (TacType::I16, false, false),
        Opcode::ConvI4 => (TacType::I32, false, false),
        Opcode::ConvI8 => (TacType::I64, false, false),
        Opcode::ConvU1 => (TacType::U8, false, false),
        Opcode::ConvU2 => (TacType::U16, false, false),
        Opcode::ConvU4 => (TacType::U32, false, false),
        Opcode::ConvU8 => (TacType::U64, false, false),
        Opcode::ConvI => (TacType::NativeInt, false, false),
        Opcode::ConvU => (TacType::NativeUInt, false, false),
        Opcode::ConvR4 => (TacType::F32, false, false),
        Opcode::ConvR8 => (TacType::F64, false, false),
        Opcode::ConvRUn => (TacType::F64, false, true),

        Opcode::ConvOvfI1 => (TacType::I8, true, false),
        Opcode::ConvOvfI2 => (TacType::I16, true, false),
        Opcode::ConvOvfI4 => (TacType::I32, true, false),
        Opcode::ConvOvfI8 => (TacType::I64, true, false),
        Opcode::ConvOvfU1 => (TacType::U8, true, false),
        Opcode::ConvOvfU2 => (TacType::U16, true, false),
        Opcode::ConvOvfU4 => (TacType::U32, true, false),
        Opcode::ConvOvfU8 => (TacType::U64, true, false),
        Opcode::ConvOvfI => (TacType::NativeInt, true, false),
        Opcode::ConvOvfU => (TacType::NativeUInt, true, false),

        Opcode::ConvOvfI1Un => (TacType::I8, true, true),
        Opcode::ConvOvfI2Un => (TacType::I16, true, true),
        Opcode::ConvOvfI4Un => (TacType::I32, true, true),
        Opcode::ConvOvfI8Un => (TacType::I64, true, true),
        Opcode::ConvOvfU1Un => (TacType::U8, true, true),
        Opcode::ConvOvfU2Un => (TacType::U16, true, true),
        Opcode::ConvOvfU4Un => (TacType::U32, true, true),
        Opcode::ConvOvfU8Un => (TacType::U64, true, true),
        Opcode::ConvOvfIUn => (TacType::NativeInt, true, true),
        Opcode::ConvOvfUUn => (TacType::NativeUInt, true, true),
        _ => return None,
    };
    Some((ty, checked, unsigned))
}

/// Element type fixed by a typed `ldelem`, `stelem`, `ldind` or `stind` opcode.
///
/// Returns `None` for the `.ref` forms and the token-carrying `ldelem`/`stelem`, whose type
/// comes from the operands.
pub(crate) fn access_type(opcode: Opcode) -> Option<TacType> {
    Some(match opcode {
        Opcode::LdelemI1 | Opcode::StelemI1 | Opcode::LdindI1 | Opcode::StindI1 => TacType::I8,
        Opcode::LdelemU1 | Opcode::LdindU1 => TacType::U8,
        Opcode::LdelemI2 | Opcode::StelemI2 | Opcode::LdindI2 | Opcode::StindI2 => TacType::I16,
        Opcode::LdelemU2 | Opcode::LdindU2 => TacType::U16,
        Opcode::LdelemI4 | Opcode::StelemI4 | Opcode::LdindI4 | Opcode::StindI4 => TacType::I32,
        Opcode::LdelemU4 | Opcode::LdindU4 => TacType::U32,
        Opcode::LdelemI8 | Opcode::StelemI8 | Opcode::LdindI8 | Opcode::StindI8 => TacType::I64,
        Opcode::LdelemI | Opcode::StelemI | Opcode::LdindI | Opcode::StindI => TacType::NativeInt,
        Opcode::LdelemR4 | Opcode::StelemR4 | Opcode::LdindR4 | Opcode::StindR4 => TacType::F32,
        Opcode::LdelemR8 | Opcode::StelemR8 | Opcode::LdindR8 | Opcode::StindR8 => TacType::F64,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic() {
        assert_eq!(
            binary_result(BinaryOp::Add, &TacType::I32, &TacType::U8),
            TacType::I32
        );
        assert_eq!(
            binary_result(BinaryOp::Mul, &TacType::I32, &TacType::NativeInt),
            TacType::NativeInt
        );
        assert_eq!(
            binary_result(BinaryOp::RemUn, &TacType::U64, &TacType::I64),
            TacType::I64
        );
        assert_eq!(
            binary_result(BinaryOp::Add, &TacType::I32, &TacType::I64),
            TacType::Unknown
        );
    }

    #[test]
    fn float_arithmetic() {
        assert_eq!(
            binary_result(BinaryOp::Div, &TacType::F32, &TacType::F64),
            TacType::F64
        );
        assert_eq!(
            binary_result(BinaryOp::DivUn, &TacType::F64, &TacType::F64),
            TacType::Unknown
        );
        assert_eq!(
            binary_result(BinaryOp::AddOvf, &TacType::F64, &TacType::F64),
            TacType::Unknown
        );
        assert_eq!(
            binary_result(BinaryOp::Xor, &TacType::F64, &TacType::F64),
            TacType::Unknown
        );
    }

    #[test]
    fn shifts_keep_the_shifted_type() {
        assert_eq!(
            binary_result(BinaryOp::Shl, &TacType::I64, &TacType::I32),
            TacType::I64
        );
        assert_eq!(
            binary_result(BinaryOp::ShrUn, &TacType::I32, &TacType::I64),
            TacType::Unknown
        );
    }

    #[test]
    fn pointer_arithmetic() {
        let ptr = TacType::Pointer(Box::new(TacType::U8));
        let byref = TacType::by_ref(TacType::I32);
        assert_eq!(binary_result(BinaryOp::Add, &ptr, &TacType::I32), ptr);
        assert_eq!(
            binary_result(BinaryOp::Add, &TacType::NativeInt, &byref),
            byref
        );
        assert_eq!(binary_result(BinaryOp::Sub, &byref, &TacType::I32), byref);
        assert_eq!(
            binary_result(BinaryOp::Sub, &byref, &byref),
            TacType::NativeInt
        );
        assert_eq!(
            binary_result(BinaryOp::Sub, &TacType::I32, &byref),
            TacType::Unknown
        );
        assert_eq!(
            binary_result(BinaryOp::Mul, &ptr, &TacType::I32),
            TacType::Unknown
        );
    }

    #[test]
    fn unary() {
        assert_eq!(unary_result(UnaryOp::Neg, &TacType::I16), TacType::I32);
        assert_eq!(unary_result(UnaryOp::Neg, &TacType::F32), TacType::F64);
        assert_eq!(unary_result(UnaryOp::Not, &TacType::F64), TacType::Unknown);
        assert_eq!(unary_result(UnaryOp::Not, &TacType::Object), TacType::Unknown);
    }

    #[test]
    fn conversions() {
        assert_eq!(conversion(Opcode::ConvU1), Some((TacType::U8, false, false)));
        assert_eq!(
            conversion(Opcode::ConvOvfI4Un),
            Some((TacType::I32, true, true))
        );
        assert_eq!(conversion(Opcode::ConvRUn), Some((TacType::F64, false, true)));
        assert_eq!(conversion(Opcode::Add), None);
        assert_eq!(access_type(Opcode::StindR4), Some(TacType::F32));
        assert_eq!(access_type(Opcode::LdelemRef), None);
    }
}
