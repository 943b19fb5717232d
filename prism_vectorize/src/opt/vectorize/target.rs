//! Target SIMD capabilities.
//!
//! A target offers fixed-width vectors of `vector_bits` and, optionally, a
//! predicated execution mode whose vector length is only known at run time
//! (bounded by `max_scalable_bits`).
//!
//! | Preset | Fixed bits | Predicated |
//! |--------|-----------:|------------|
//! | `sse42` | 128 | no |
//! | `neon` | 128 | no |
//! | `avx2` | 256 | no |
//! | `avx512` | 512 | no |
//! | `sve(n)` | 128 | up to `n` bits |

use bitflags::bitflags;

use crate::ir::ScalarType;

bitflags! {
    /// Element types a target can operate on lane-wise.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElementTypes: u8 {
        const I8 = 1 << 0;
        const I16 = 1 << 1;
        const I32 = 1 << 2;
        const I64 = 1 << 3;
        const F32 = 1 << 4;
        const F64 = 1 << 5;
        const INTEGERS = Self::I8.bits() | Self::I16.bits() | Self::I32.bits() | Self::I64.bits();
        const FLOATS = Self::F32.bits() | Self::F64.bits();
    }
}

impl ElementTypes {
    /// Flag for a scalar type; booleans are never vectorized.
    pub const fn of(ty: ScalarType) -> ElementTypes {
        match ty {
            ScalarType::Bool => ElementTypes::empty(),
            ScalarType::I8 => ElementTypes::I8,
            ScalarType::I16 => ElementTypes::I16,
            ScalarType::I32 => ElementTypes::I32,
            ScalarType::I64 => ElementTypes::I64,
            ScalarType::F32 => ElementTypes::F32,
            ScalarType::F64 => ElementTypes::F64,
        }
    }

    #[inline]
    pub fn supports(self, ty: ScalarType) -> bool {
        let flag = ElementTypes::of(ty);
        !flag.is_empty() && self.contains(flag)
    }
}

/// Vector capabilities of the code generation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCapabilities {
    pub name: &'static str,
    /// Width of fixed-length vector registers.
    pub vector_bits: u32,
    /// Upper bound of the run-time vector length in predicated mode;
    /// `None` if the target has no predicated mode.
    pub max_scalable_bits: Option<u32>,
    pub element_types: ElementTypes,
}

impl TargetCapabilities {
    pub const fn sse42() -> Self {
        TargetCapabilities {
            name: "sse4.2",
            vector_bits: 128,
            max_scalable_bits: None,
            element_types: ElementTypes::all(),
        }
    }

    pub const fn neon() -> Self {
        TargetCapabilities {
            name: "neon",
            vector_bits: 128,
            max_scalable_bits: None,
            element_types: ElementTypes::all(),
        }
    }

    pub const fn avx2() -> Self {
        TargetCapabilities {
            name: "avx2",
            vector_bits: 256,
            max_scalable_bits: None,
            element_types: ElementTypes::all(),
        }
    }

    pub const fn avx512() -> Self {
        TargetCapabilities {
            name: "avx512",
            vector_bits: 512,
            max_scalable_bits: None,
            element_types: ElementTypes::all(),
        }
    }

    /// Scalable predicated vectors of up to `max_bits`, with 128-bit
    /// fixed-width vectors as a fallback.
    pub const fn sve(max_bits: u32) -> Self {
        TargetCapabilities {
            name: "sve",
            vector_bits: 128,
            max_scalable_bits: Some(max_bits),
            element_types: ElementTypes::all(),
        }
    }

    #[inline]
    pub const fn has_predication(&self) -> bool {
        self.max_scalable_bits.is_some()
    }

    /// Lanes of a fixed-width vector of `elem`.
    #[inline]
    pub const fn fixed_lanes(&self, elem: ScalarType) -> u32 {
        self.vector_bits / elem.bits()
    }

    /// Largest possible run-time lane count of a scalable vector of `elem`.
    #[inline]
    pub const fn max_scalable_lanes(&self, elem: ScalarType) -> Option<u32> {
        match self.max_scalable_bits {
            Some(bits) => Some(bits / elem.bits()),
            None => None,
        }
    }
}

impl Default for TargetCapabilities {
    fn default() -> Self {
        Self::avx2()
    }
}
