//! Types for symbols flowing through the back end.
//!
//! Unlike a general-purpose IR, this type system only needs to describe the
//! handful of shapes the PL/0 front end produces: fixed-width integers,
//! labels, functions, arrays and pointers. `size()` reports the type's width
//! in bits; `byte_size()` is the rounded-up byte count used for frame and
//! `.comm` sizing.

use std::fmt;

/// Signedness of a primitive integer type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// The width, in bits, of a primitive integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
}

impl IntWidth {
    fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
        }
    }
}

/// A symbol's type.
///
/// `Array` carries its dimensions outermost-first and the element type;
/// `Pointer` is always a 32-bit unsigned address, matching the target's
/// register width.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int(IntWidth, Signedness),
    Label,
    Function,
    Array(Vec<u32>, Box<Type>),
    Pointer(Box<Type>),
}

impl Type {
    pub const INT: Type = Type::Int(IntWidth::W32, Signedness::Signed);
    pub const SHORT: Type = Type::Int(IntWidth::W16, Signedness::Signed);
    pub const CHAR: Type = Type::Int(IntWidth::W8, Signedness::Signed);
    pub const UINT: Type = Type::Int(IntWidth::W32, Signedness::Unsigned);
    pub const USHORT: Type = Type::Int(IntWidth::W16, Signedness::Unsigned);
    pub const UCHAR: Type = Type::Int(IntWidth::W8, Signedness::Unsigned);

    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer(Box::new(pointee))
    }

    pub fn array_of(dims: Vec<u32>, element: Type) -> Type {
        Type::Array(dims, Box::new(element))
    }

    /// Size in bits.
    pub fn size(&self) -> u32 {
        match self {
            Type::Int(w, _) => w.bits(),
            Type::Label => 0,
            Type::Function => 0,
            Type::Pointer(_) => 32,
            Type::Array(dims, elem) => dims.iter().product::<u32>() * elem.size(),
        }
    }

    /// Size in bytes, rounded up to a whole byte.
    pub fn byte_size(&self) -> u32 {
        (self.size() + 7) / 8
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Int(_, Signedness::Unsigned))
    }

    /// Element type of an array, or the pointee type of a pointer.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(_, elem) => Some(elem),
            Type::Pointer(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn dims(&self) -> Option<&[u32]> {
        match self {
            Type::Array(dims, _) => Some(dims),
            _ => None,
        }
    }

    /// The wider of two arithmetic types, per [4.1]'s binary-op rule:
    /// unsigned wins only when both operands are unsigned.
    pub fn widen_for_binop(a: &Type, b: &Type) -> Type {
        let bits = a.size().max(b.size());
        let width = if bits <= 8 {
            IntWidth::W8
        } else if bits <= 16 {
            IntWidth::W16
        } else {
            IntWidth::W32
        };
        let sign = if a.is_unsigned() && b.is_unsigned() {
            Signedness::Unsigned
        } else {
            Signedness::Signed
        };
        Type::Int(width, sign)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(w, s) => {
                if *s == Signedness::Unsigned {
                    write!(f, "u")?;
                }
                write!(f, "int{}_t", w.bits())
            }
            Type::Label => write!(f, "label"),
            Type::Function => write!(f, "function"),
            Type::Pointer(p) => write!(f, "&{p}"),
            Type::Array(dims, elem) => {
                write!(f, "{elem}")?;
                for d in dims {
                    write!(f, "[{d}]")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_rounds_up() {
        assert_eq!(Type::CHAR.byte_size(), 1);
        assert_eq!(Type::INT.byte_size(), 4);
    }

    #[test]
    fn widen_prefers_wider_operand() {
        let t = Type::widen_for_binop(&Type::CHAR, &Type::INT);
        assert_eq!(t.size(), 32);
    }

    #[test]
    fn widen_unsigned_requires_both_operands_unsigned() {
        let t = Type::widen_for_binop(&Type::UINT, &Type::INT);
        assert!(!t.is_unsigned());
        let t = Type::widen_for_binop(&Type::UINT, &Type::UCHAR);
        assert!(t.is_unsigned());
    }

    #[test]
    fn array_size_multiplies_dims_by_element() {
        let t = Type::array_of(vec![4, 5], Type::CHAR);
        assert_eq!(t.size(), 160);
        assert_eq!(t.byte_size(), 20);
    }
}
