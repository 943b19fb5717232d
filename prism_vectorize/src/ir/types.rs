//! Value types.
//!
//! Scalars are Java-like: fixed-width two's complement integers that wrap,
//! IEEE floats, and booleans. Arrays are reached through typed references.
//! Vector and predicate types carry their element type so that scalable
//! lane counts can be resolved against the machine's vector length.

use std::fmt;

// =============================================================================
// Scalar Types
// =============================================================================

/// Element and scalar value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarType {
    /// Width in bits. Booleans occupy one byte in arrays.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            ScalarType::Bool | ScalarType::I8 => 8,
            ScalarType::I16 => 16,
            ScalarType::I32 | ScalarType::F32 => 32,
            ScalarType::I64 | ScalarType::F64 => 64,
        }
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        matches!(
            self,
            ScalarType::I8 | ScalarType::I16 | ScalarType::I32 | ScalarType::I64
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Smallest representable value of an integer type.
    #[inline]
    pub const fn int_min(self) -> i64 {
        match self.bits() {
            64 => i64::MIN,
            b => -(1i64 << (b - 1)),
        }
    }

    /// Largest representable value of an integer type.
    #[inline]
    pub const fn int_max(self) -> i64 {
        match self.bits() {
            64 => i64::MAX,
            b => (1i64 << (b - 1)) - 1,
        }
    }

    /// Whether `value` is representable without truncation.
    #[inline]
    pub const fn fits(self, value: i64) -> bool {
        self.is_int() && value >= self.int_min() && value <= self.int_max()
    }

    /// Truncate `value` to this width and sign-extend it back to 64 bits.
    #[inline]
    pub const fn wrap(self, value: i64) -> i64 {
        match self {
            ScalarType::Bool => (value != 0) as i64,
            ScalarType::I8 => value as i8 as i64,
            ScalarType::I16 => value as i16 as i64,
            ScalarType::I32 => value as i32 as i64,
            _ => value,
        }
    }

    /// Reinterpret a wrapped value as unsigned of this width.
    #[inline]
    pub const fn as_unsigned(self, value: i64) -> u64 {
        match self.bits() {
            64 => value as u64,
            b => (value as u64) & ((1u64 << b) - 1),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Lanes
// =============================================================================

/// Number of lanes in a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lanes {
    /// A compile-time lane count.
    Fixed(u16),
    /// Lane count known only at run time: machine vector bits / element bits.
    Scalable,
}

impl Lanes {
    /// Lane count for `elem` on a machine with `scalable_bits`-wide vectors.
    #[inline]
    pub fn resolve(self, elem: ScalarType, scalable_bits: u32) -> usize {
        match self {
            Lanes::Fixed(n) => n as usize,
            Lanes::Scalable => (scalable_bits / elem.bits()).max(1) as usize,
        }
    }

    #[inline]
    pub const fn is_scalable(self) -> bool {
        matches!(self, Lanes::Scalable)
    }
}

impl fmt::Display for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lanes::Fixed(n) => write!(f, "{n}"),
            Lanes::Scalable => f.write_str("vscale"),
        }
    }
}

/// Element type plus lane count of a vector or predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorShape {
    pub elem: ScalarType,
    pub lanes: Lanes,
}

impl VectorShape {
    #[inline]
    pub const fn new(elem: ScalarType, lanes: Lanes) -> Self {
        VectorShape { elem, lanes }
    }
}

impl fmt::Display for VectorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.lanes, self.elem)
    }
}

// =============================================================================
// Types
// =============================================================================

/// Type of an instruction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value (stores, void returns).
    Void,
    Scalar(ScalarType),
    /// Reference to an array with the given element type.
    Ref(ScalarType),
    Vector(VectorShape),
    /// Lane mask governing a vector of the given shape.
    Predicate(VectorShape),
}

impl Type {
    pub const BOOL: Type = Type::Scalar(ScalarType::Bool);
    pub const I32: Type = Type::Scalar(ScalarType::I32);
    pub const I64: Type = Type::Scalar(ScalarType::I64);

    #[inline]
    pub const fn scalar(self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        matches!(self, Type::Scalar(s) if s.is_int())
    }

    #[inline]
    pub const fn is_bool(self) -> bool {
        matches!(self, Type::Scalar(ScalarType::Bool))
    }

    #[inline]
    pub const fn is_vector(self) -> bool {
        matches!(self, Type::Vector(_) | Type::Predicate(_))
    }

    /// Element type of an array reference.
    #[inline]
    pub const fn array_elem(self) -> Option<ScalarType> {
        match self {
            Type::Ref(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub const fn vector_shape(self) -> Option<VectorShape> {
        match self {
            Type::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Scalar(s) => write!(f, "{s}"),
            Type::Ref(e) => write!(f, "ref<{e}>"),
            Type::Vector(v) => write!(f, "<{v}>"),
            Type::Predicate(v) => write!(f, "pred<{v}>"),
        }
    }
}
