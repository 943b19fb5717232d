//! Reference interpreter.
//!
//! Executes scalar and vector code over a heap of typed arrays. Integer
//! arithmetic wraps at the operand width and float to integer conversion
//! saturates, so a loop and its vectorized form can be compared value for
//! value. Scalable vectors take their lane count from
//! [`MachineConfig::scalable_bits`].

use crate::error::ExecError;
use crate::ir::{
    BinOp, BlockId, CmpOp, Const, Function, InstId, Opcode, ScalarType, Terminator, Type,
};

// =============================================================================
// Values
// =============================================================================

/// A scalar or a single vector lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    /// Integer of any width, kept sign-extended.
    Int(i64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    /// The zero value of `ty`.
    pub fn zero(ty: ScalarType) -> Scalar {
        match ty {
            ScalarType::Bool => Scalar::Bool(false),
            ScalarType::F32 => Scalar::F32(0.0),
            ScalarType::F64 => Scalar::F64(0.0),
            _ => Scalar::Int(0),
        }
    }

    fn from_const(c: Const, ty: ScalarType) -> Scalar {
        match (c, ty) {
            (Const::Bool(b), _) => Scalar::Bool(b),
            (Const::Int(v), ScalarType::F32) => Scalar::F32(v as f32),
            (Const::Int(v), ScalarType::F64) => Scalar::F64(v as f64),
            (Const::Int(v), ScalarType::Bool) => Scalar::Bool(v != 0),
            (Const::Int(v), _) => Scalar::Int(ty.wrap(v)),
            (Const::Float(v), ScalarType::F32) => Scalar::F32(v as f32),
            (Const::Float(v), ScalarType::F64) => Scalar::F64(v),
            (Const::Float(v), _) => convert(Scalar::F64(v), ty),
        }
    }

    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Scalar::F32(v) => Some(v as f64),
            Scalar::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// Handle to an array on the interpreter heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef(pub usize);

/// Result of evaluating an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Scalar(Scalar),
    Ref(ArrayRef),
    Vector(Vec<Scalar>),
    Predicate(Vec<bool>),
}

impl Value {
    pub fn int(v: i64) -> Value {
        Value::Scalar(Scalar::Int(v))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Scalar(s) => s.as_int(),
            _ => None,
        }
    }
}

/// A typed array.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub elem: ScalarType,
    pub data: Vec<Scalar>,
}

// =============================================================================
// Configuration
// =============================================================================

/// Properties of the simulated machine.
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    /// Vector register width for scalable vectors, in bits.
    pub scalable_bits: u32,
    /// Maximum number of instructions to execute before giving up.
    pub fuel: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            scalable_bits: 128,
            fuel: 10_000_000,
        }
    }
}

impl MachineConfig {
    pub fn with_scalable_bits(bits: u32) -> Self {
        MachineConfig {
            scalable_bits: bits,
            ..Default::default()
        }
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Executes functions against a persistent heap.
#[derive(Debug, Clone)]
pub struct Interpreter {
    config: MachineConfig,
    heap: Vec<Array>,
    executed: u64,
}

impl Interpreter {
    pub fn new(config: MachineConfig) -> Self {
        Interpreter {
            config,
            heap: Vec::new(),
            executed: 0,
        }
    }

    /// Instructions executed by all runs so far.
    #[inline]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Allocate an integer array holding `values` (wrapped to `elem`).
    pub fn alloc_ints(&mut self, elem: ScalarType, values: &[i64]) -> Value {
        let data = values.iter().map(|&v| Scalar::Int(elem.wrap(v))).collect();
        self.alloc(Array { elem, data })
    }

    /// Allocate a float array holding `values`.
    pub fn alloc_floats(&mut self, elem: ScalarType, values: &[f64]) -> Value {
        let data = values
            .iter()
            .map(|&v| Scalar::from_const(Const::Float(v), elem))
            .collect();
        self.alloc(Array { elem, data })
    }

    pub fn alloc(&mut self, array: Array) -> Value {
        self.heap.push(array);
        Value::Ref(ArrayRef(self.heap.len() - 1))
    }

    pub fn array(&self, r: ArrayRef) -> Result<&Array, ExecError> {
        self.heap.get(r.0).ok_or(ExecError::BadReference(r.0))
    }

    /// Contents of an integer array.
    pub fn read_ints(&self, value: &Value) -> Result<Vec<i64>, ExecError> {
        let r = match value {
            Value::Ref(r) => *r,
            _ => return Err(ExecError::BadReference(usize::MAX)),
        };
        Ok(self
            .array(r)?
            .data
            .iter()
            .map(|s| s.as_int().unwrap_or_default())
            .collect())
    }

    /// Contents of a float array, widened to f64.
    pub fn read_floats(&self, value: &Value) -> Result<Vec<f64>, ExecError> {
        let r = match value {
            Value::Ref(r) => *r,
            _ => return Err(ExecError::BadReference(usize::MAX)),
        };
        Ok(self
            .array(r)?
            .data
            .iter()
            .map(|s| s.as_f64().unwrap_or_default())
            .collect())
    }

    /// Run `func` to completion.
    pub fn run(&mut self, func: &Function, args: &[Value]) -> Result<Value, ExecError> {
        if args.len() != func.params.len() {
            return Err(ExecError::ArgumentCount {
                expected: func.params.len(),
                found: args.len(),
            });
        }
        let mut frame = Frame {
            func,
            env: vec![None; func.insts.len()],
            args,
        };

        let mut block = func.entry;
        let mut prev: Option<BlockId> = None;
        loop {
            let b = func.block(block);

            if let Some(pred) = prev {
                let mut incoming = Vec::with_capacity(b.phis.len());
                for &phi in &b.phis {
                    let src = func
                        .inst(phi)
                        .phi_input(pred)
                        .ok_or(ExecError::MissingPhiInput(pred))?;
                    incoming.push((phi, frame.get(src)?.clone()));
                }
                self.burn(incoming.len() as u64)?;
                for (phi, value) in incoming {
                    frame.env[phi.as_usize()] = Some(value);
                }
            }

            for &inst in &b.insts {
                self.burn(1)?;
                let value = self.eval(&frame, inst)?;
                frame.env[inst.as_usize()] = Some(value);
            }

            let next = match b.term {
                Some(Terminator::Jump(t)) => t,
                Some(Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                }) => match frame.scalar(cond)? {
                    Scalar::Bool(true) => then_block,
                    Scalar::Bool(false) => else_block,
                    _ => {
                        return Err(ExecError::TypeMismatch {
                            inst: cond,
                            expected: "bool",
                        });
                    }
                },
                Some(Terminator::Return(v)) => {
                    return match v {
                        Some(v) => Ok(frame.get(v)?.clone()),
                        None => Ok(Value::Void),
                    };
                }
                Some(Terminator::Unreachable) | None => return Err(ExecError::Unreachable(block)),
            };
            prev = Some(block);
            block = next;
        }
    }

    fn burn(&mut self, n: u64) -> Result<(), ExecError> {
        self.executed += n;
        if self.executed > self.config.fuel {
            Err(ExecError::OutOfFuel(self.config.fuel))
        } else {
            Ok(())
        }
    }

    fn lanes(&self, ty: Type) -> usize {
        match ty {
            Type::Vector(s) | Type::Predicate(s) => {
                s.lanes.resolve(s.elem, self.config.scalable_bits)
            }
            _ => 1,
        }
    }

    fn load(&self, r: ArrayRef, index: i64) -> Result<Scalar, ExecError> {
        let array = self.array(r)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| array.data.get(i).copied())
            .ok_or(ExecError::OutOfBounds {
                index,
                len: array.data.len(),
            })
    }

    fn store(&mut self, r: ArrayRef, index: i64, value: Scalar) -> Result<(), ExecError> {
        let array = self
            .heap
            .get_mut(r.0)
            .ok_or(ExecError::BadReference(r.0))?;
        let len = array.data.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| array.data.get_mut(i))
            .ok_or(ExecError::OutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    fn eval(&mut self, frame: &Frame<'_>, id: InstId) -> Result<Value, ExecError> {
        let inst = frame.func.inst(id);
        let args = &inst.args;
        let elem_of = |ty: Type| match ty {
            Type::Scalar(s) => Ok(s),
            Type::Vector(s) | Type::Predicate(s) => Ok(s.elem),
            _ => Err(ExecError::TypeMismatch {
                inst: id,
                expected: "scalar or vector type",
            }),
        };

        let value = match inst.opcode {
            Opcode::Const(c) => Value::Scalar(Scalar::from_const(c, elem_of(inst.ty)?)),
            Opcode::Param(i) => frame.args[i as usize].clone(),
            Opcode::Phi => frame.get(id)?.clone(),
            Opcode::Binary(op) => {
                let ty = elem_of(inst.ty)?;
                let (a, b) = (frame.scalar(args[0])?, frame.scalar(args[1])?);
                Value::Scalar(binary(op, ty, a, b).ok_or(ExecError::TypeMismatch {
                    inst: id,
                    expected: "operands valid for the operator",
                })?)
            }
            Opcode::Compare(op) => {
                let ty = frame.func.value_type(args[0]);
                let result = match (frame.get(args[0])?, frame.get(args[1])?) {
                    (Value::Ref(a), Value::Ref(b)) => match op {
                        CmpOp::Eq => Some(a == b),
                        CmpOp::Ne => Some(a != b),
                        _ => None,
                    },
                    (Value::Scalar(a), Value::Scalar(b)) => compare(op, ty, *a, *b),
                    _ => None,
                };
                Value::Scalar(Scalar::Bool(result.ok_or(ExecError::TypeMismatch {
                    inst: id,
                    expected: "comparable operands",
                })?))
            }
            Opcode::Select => match frame.scalar(args[0])? {
                Scalar::Bool(true) => frame.get(args[1])?.clone(),
                Scalar::Bool(false) => frame.get(args[2])?.clone(),
                _ => {
                    return Err(ExecError::TypeMismatch {
                        inst: id,
                        expected: "bool condition",
                    });
                }
            },
            Opcode::Convert => Value::Scalar(convert(frame.scalar(args[0])?, elem_of(inst.ty)?)),
            Opcode::NewArray => {
                let len = frame.int(args[0])?;
                let elem = inst.ty.array_elem().ok_or(ExecError::TypeMismatch {
                    inst: id,
                    expected: "array type",
                })?;
                let len = usize::try_from(len).map_err(|_| ExecError::NegativeSize(len))?;
                self.alloc(Array {
                    elem,
                    data: vec![Scalar::zero(elem); len],
                })
            }
            Opcode::ArrayGet => {
                Value::Scalar(self.load(frame.array(args[0])?, frame.int(args[1])?)?)
            }
            Opcode::ArraySet => {
                let value = frame.scalar(args[2])?;
                self.store(frame.array(args[0])?, frame.int(args[1])?, value)?;
                Value::Void
            }
            Opcode::ArrayLength => {
                let len = self.array(frame.array(args[0])?)?.data.len();
                Value::int(len as i64)
            }
            Opcode::VecLaneCount(elem) => {
                let shape_lanes = crate::ir::Lanes::Scalable.resolve(elem, self.config.scalable_bits);
                Value::int(shape_lanes as i64)
            }
            Opcode::VecReplicateScalar => {
                Value::Vector(vec![frame.scalar(args[0])?; self.lanes(inst.ty)])
            }
            Opcode::VecSetScalars => {
                let mut lanes = vec![frame.scalar(args[1])?; self.lanes(inst.ty)];
                lanes[0] = frame.scalar(args[0])?;
                Value::Vector(lanes)
            }
            Opcode::VecSeries => {
                let ty = elem_of(inst.ty)?;
                let (start, step) = (frame.int(args[0])?, frame.int(args[1])?);
                Value::Vector(
                    (0..self.lanes(inst.ty) as i64)
                        .map(|k| Scalar::Int(ty.wrap(start.wrapping_add(k.wrapping_mul(step)))))
                        .collect(),
                )
            }
            Opcode::VecLoad => {
                let n = self.lanes(inst.ty);
                let mask = frame.mask(inst.predicate(), n)?;
                let (array, base) = (frame.array(args[0])?, frame.int(args[1])?);
                let zero = Scalar::zero(elem_of(inst.ty)?);
                let mut lanes = Vec::with_capacity(n);
                for (k, &active) in mask.iter().enumerate() {
                    lanes.push(if active {
                        self.load(array, base + k as i64)?
                    } else {
                        zero
                    });
                }
                Value::Vector(lanes)
            }
            Opcode::VecStore => {
                let lanes = frame.vector(args[2])?;
                let mask = frame.mask(inst.predicate(), lanes.len())?;
                let (array, base) = (frame.array(args[0])?, frame.int(args[1])?);
                for (k, lane) in lanes.iter().enumerate() {
                    if mask[k] {
                        self.store(array, base + k as i64, *lane)?;
                    }
                }
                Value::Void
            }
            Opcode::VecBinary(op) => {
                let ty = elem_of(inst.ty)?;
                let (a, b) = (frame.vector(args[0])?, frame.vector(args[1])?);
                let mask = frame.mask(inst.predicate(), a.len())?;
                let mut out = Vec::with_capacity(a.len());
                for k in 0..a.len() {
                    let lane = if mask[k] {
                        let rhs = b.get(k).copied().ok_or(ExecError::TypeMismatch {
                            inst: id,
                            expected: "vectors of equal length",
                        })?;
                        binary(op, ty, a[k], rhs).ok_or(ExecError::TypeMismatch {
                            inst: id,
                            expected: "operands valid for the operator",
                        })?
                    } else {
                        a[k]
                    };
                    out.push(lane);
                }
                Value::Vector(out)
            }
            Opcode::VecConvert => {
                let to = elem_of(inst.ty)?;
                let v = frame.vector(args[0])?;
                let mask = frame.mask(inst.predicate(), v.len())?;
                Value::Vector(
                    v.iter()
                        .zip(&mask)
                        .map(|(&s, &on)| if on { convert(s, to) } else { Scalar::zero(to) })
                        .collect(),
                )
            }
            Opcode::VecReduce(op) => {
                let ty = elem_of(inst.ty)?;
                let v = frame.vector(args[0])?;
                let mut lanes = v.iter().copied();
                let first = lanes.next().ok_or(ExecError::TypeMismatch {
                    inst: id,
                    expected: "non-empty vector",
                })?;
                let mut acc = first;
                for lane in lanes {
                    acc = binary(op, ty, acc, lane).ok_or(ExecError::TypeMismatch {
                        inst: id,
                        expected: "operands valid for the operator",
                    })?;
                }
                Value::Scalar(acc)
            }
            Opcode::VecPredWhile => {
                let ty = elem_of(frame.func.value_type(args[0]))?;
                let low = ty.as_unsigned(frame.int(args[0])?) as u128;
                let high = ty.as_unsigned(frame.int(args[1])?) as u128;
                Value::Predicate(
                    (0..self.lanes(inst.ty) as u128)
                        .map(|k| low + k < high)
                        .collect(),
                )
            }
        };
        Ok(value)
    }
}

// =============================================================================
// Frame
// =============================================================================

struct Frame<'f> {
    func: &'f Function,
    env: Vec<Option<Value>>,
    args: &'f [Value],
}

impl Frame<'_> {
    fn get(&self, v: InstId) -> Result<&Value, ExecError> {
        self.env[v.as_usize()].as_ref().ok_or(ExecError::TypeMismatch {
            inst: v,
            expected: "a computed value",
        })
    }

    fn scalar(&self, v: InstId) -> Result<Scalar, ExecError> {
        match self.get(v)? {
            Value::Scalar(s) => Ok(*s),
            _ => Err(ExecError::TypeMismatch {
                inst: v,
                expected: "scalar",
            }),
        }
    }

    fn int(&self, v: InstId) -> Result<i64, ExecError> {
        self.scalar(v)?.as_int().ok_or(ExecError::TypeMismatch {
            inst: v,
            expected: "integer",
        })
    }

    fn array(&self, v: InstId) -> Result<ArrayRef, ExecError> {
        match self.get(v)? {
            Value::Ref(r) => Ok(*r),
            _ => Err(ExecError::TypeMismatch {
                inst: v,
                expected: "array reference",
            }),
        }
    }

    fn vector(&self, v: InstId) -> Result<&[Scalar], ExecError> {
        match self.get(v)? {
            Value::Vector(lanes) => Ok(lanes),
            _ => Err(ExecError::TypeMismatch {
                inst: v,
                expected: "vector",
            }),
        }
    }

    /// Lane mask of an optional governing predicate; all lanes when absent.
    fn mask(&self, pred: Option<InstId>, lanes: usize) -> Result<Vec<bool>, ExecError> {
        match pred {
            None => Ok(vec![true; lanes]),
            Some(p) => match self.get(p)? {
                Value::Predicate(mask) if mask.len() == lanes => Ok(mask.clone()),
                _ => Err(ExecError::TypeMismatch {
                    inst: p,
                    expected: "predicate matching the vector length",
                }),
            },
        }
    }
}

// =============================================================================
// Scalar Semantics
// =============================================================================

/// Apply `op` at type `ty`. `None` when the operands don't suit the operator.
pub fn binary(op: BinOp, ty: ScalarType, a: Scalar, b: Scalar) -> Option<Scalar> {
    Some(match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => Scalar::Int(ty.wrap(match op {
            BinOp::Add => x.wrapping_add(y),
            BinOp::Sub => x.wrapping_sub(y),
            BinOp::Mul => x.wrapping_mul(y),
            BinOp::And => x & y,
            BinOp::Or => x | y,
            BinOp::Xor => x ^ y,
            BinOp::Min => x.min(y),
            BinOp::Max => x.max(y),
        })),
        (Scalar::F32(x), Scalar::F32(y)) => Scalar::F32(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Min => x.min(y),
            BinOp::Max => x.max(y),
            _ => return None,
        }),
        (Scalar::F64(x), Scalar::F64(y)) => Scalar::F64(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Min => x.min(y),
            BinOp::Max => x.max(y),
            _ => return None,
        }),
        (Scalar::Bool(x), Scalar::Bool(y)) => Scalar::Bool(match op {
            BinOp::And => x & y,
            BinOp::Or => x | y,
            BinOp::Xor => x ^ y,
            _ => return None,
        }),
        _ => return None,
    })
}

/// Compare two scalars of type `ty`.
pub fn compare(op: CmpOp, ty: Type, a: Scalar, b: Scalar) -> Option<bool> {
    let ordering = match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => {
            if op == CmpOp::Ult {
                let s = ty.scalar()?;
                return Some(s.as_unsigned(x) < s.as_unsigned(y));
            }
            Some(x.cmp(&y))
        }
        (Scalar::F32(x), Scalar::F32(y)) => x.partial_cmp(&y),
        (Scalar::F64(x), Scalar::F64(y)) => x.partial_cmp(&y),
        (Scalar::Bool(x), Scalar::Bool(y)) => Some(x.cmp(&y)),
        _ => return None,
    };
    use std::cmp::Ordering::*;
    Some(match (op, ordering) {
        (CmpOp::Ne, o) => o != Some(Equal),
        (CmpOp::Eq, o) => o == Some(Equal),
        (_, None) => false,
        (CmpOp::Lt | CmpOp::Ult, Some(o)) => o == Less,
        (CmpOp::Le, Some(o)) => o != Greater,
        (CmpOp::Gt, Some(o)) => o == Greater,
        (CmpOp::Ge, Some(o)) => o != Less,
    })
}

/// Convert a scalar to `to`, Java style: integers truncate or sign-extend,
/// floats saturate toward integers and NaN becomes zero.
pub fn convert(value: Scalar, to: ScalarType) -> Scalar {
    match (value, to) {
        (Scalar::Int(v), ScalarType::Bool) => Scalar::Bool(v != 0),
        (Scalar::Int(v), ScalarType::F32) => Scalar::F32(v as f32),
        (Scalar::Int(v), ScalarType::F64) => Scalar::F64(v as f64),
        (Scalar::Int(v), _) => Scalar::Int(to.wrap(v)),
        (Scalar::Bool(b), _) => Scalar::from_const(Const::Int(b as i64), to),
        (Scalar::F32(v), _) => convert(Scalar::F64(v as f64), to),
        (Scalar::F64(v), ScalarType::F32) => Scalar::F32(v as f32),
        (Scalar::F64(v), ScalarType::F64) => Scalar::F64(v),
        (Scalar::F64(v), ScalarType::I64) => Scalar::Int(v as i64),
        (Scalar::F64(v), ScalarType::Bool) => Scalar::Bool(v != 0.0),
        (Scalar::F64(v), _) => Scalar::Int(to.wrap(v as i32 as i64)),
    }
}
