//! End-to-end checks of the vectorizer on small array kernels.
//!
//! Every kernel is executed by the reference interpreter before and after the
//! pass; return values and the final contents of every array argument must
//! match exactly.

use prism_vectorize::interp::{Interpreter, MachineConfig, Scalar, Value};
use prism_vectorize::ir::{
    BinOp, CmpOp, Function, FunctionBuilder, Lanes, LoopHint, Opcode, ScalarType, Type, verify,
};
use prism_vectorize::opt::vectorize::{CodegenStyle, RejectReason};
use prism_vectorize::{OptimizationPass, Vectorize, VectorizeConfig};

// =============================================================================
// Harness
// =============================================================================

type Setup<'a> = &'a dyn Fn(&mut Interpreter) -> Vec<Value>;

fn execute(f: &Function, machine: MachineConfig, setup: Setup<'_>) -> (Value, Vec<Vec<Scalar>>) {
    let mut interp = Interpreter::new(machine);
    let args = setup(&mut interp);
    let ret = interp
        .run(f, &args)
        .unwrap_or_else(|e| panic!("{} failed: {e}\n{f}", f.name));
    let arrays = args
        .iter()
        .filter_map(|a| match a {
            Value::Ref(r) => Some(interp.array(*r).unwrap().data.clone()),
            _ => None,
        })
        .collect();
    (ret, arrays)
}

fn vectorized(f: &Function, config: VectorizeConfig) -> (Function, Vectorize) {
    let mut g = f.clone();
    let mut pass = Vectorize::new(config);
    pass.run(&mut g);
    assert_eq!(verify(&g), Ok(()), "{g}");
    (g, pass)
}

/// Compare `f` with its vectorized form on machines of the given widths.
fn assert_equivalent(f: &Function, g: &Function, machine_bits: &[u32], setup: Setup<'_>) {
    for &bits in machine_bits {
        let machine = MachineConfig::with_scalable_bits(bits);
        assert_eq!(
            execute(f, machine, setup),
            execute(g, machine, setup),
            "{bits}-bit machine\n{g}"
        );
    }
}

fn count(f: &Function, pred: impl Fn(&Opcode) -> bool) -> usize {
    f.layout
        .iter()
        .flat_map(|&b| f.block_values(b))
        .filter(|&v| pred(&f.inst(v).opcode))
        .count()
}

fn hints(f: &Function) -> Vec<LoopHint> {
    f.layout.iter().map(|&b| f.block(b).hint).collect()
}

fn ramp(n: usize) -> Vec<i64> {
    (0..n as i64).collect()
}

fn targets() -> Vec<(VectorizeConfig, &'static [u32])> {
    vec![
        (VectorizeConfig::sse42(), &[128]),
        (VectorizeConfig::neon(), &[128]),
        (VectorizeConfig::avx2(), &[128]),
        (VectorizeConfig::avx512(), &[128]),
        (VectorizeConfig::sve(2048), &[128, 256, 512, 2048]),
    ]
}

// =============================================================================
// Kernels
// =============================================================================

/// `for i in 0..100: x[i] = y[i] * 2.5`
fn unroll() -> Function {
    let mut b = FunctionBuilder::new("unroll", Type::Void);
    let x = b.param(Type::Ref(ScalarType::F32));
    let y = b.param(Type::Ref(ScalarType::F32));
    let zero = b.iconst(ScalarType::I32, 0);
    let hundred = b.iconst(ScalarType::I32, 100);
    let lp = b.counted_loop(ScalarType::I32, zero, hundred);
    let v = b.array_get(y, lp.index);
    let k = b.fconst(ScalarType::F32, 2.5);
    let m = b.mul(v, k);
    b.array_set(x, lp.index, m);
    b.close_loop(&lp, &[]);
    b.ret(None);
    b.finish()
}

/// `for i in start..limit: a[i] = b[i + lo] + b[i] + b[i + hi]`
///
/// With `limit == None` the loop runs to `n - 1` for a parameter `n`.
fn stencil(name: &str, start: i64, limit: Option<i64>, lo: i64, hi: i64) -> Function {
    let mut b = FunctionBuilder::new(name, Type::Void);
    let a = b.param(Type::Ref(ScalarType::I32));
    let src = b.param(Type::Ref(ScalarType::I32));
    let init = b.iconst(ScalarType::I32, start);
    let limit = match limit {
        Some(limit) => b.iconst(ScalarType::I32, limit),
        None => {
            let n = b.param(Type::I32);
            let one = b.iconst(ScalarType::I32, 1);
            b.sub(n, one)
        }
    };
    let lp = b.counted_loop(ScalarType::I32, init, limit);
    let klo = b.iconst(ScalarType::I32, lo);
    let ilo = b.add(lp.index, klo);
    let left = b.array_get(src, ilo);
    let mid = b.array_get(src, lp.index);
    let khi = b.iconst(ScalarType::I32, hi);
    let ihi = b.add(lp.index, khi);
    let right = b.array_get(src, ihi);
    let s = b.add(left, mid);
    let s = b.add(s, right);
    b.array_set(a, lp.index, s);
    b.close_loop(&lp, &[]);
    b.ret(None);
    b.finish()
}

/// `x = 1; for (long i = 0; i < 10; i++) x += y[0]; return x`
fn long_induction_reduction() -> Function {
    let mut b = FunctionBuilder::new("long_induction_reduction", Type::I64);
    let y = b.param(Type::Ref(ScalarType::I64));
    let zero = b.iconst(ScalarType::I64, 0);
    let ten = b.iconst(ScalarType::I64, 10);
    let one = b.iconst(ScalarType::I64, 1);
    let lp = b.counted_loop(ScalarType::I64, zero, ten);
    let x = b.loop_phi(&lp, one);
    let first = b.iconst(ScalarType::I32, 0);
    let v = b.array_get(y, first);
    let next = b.add(x, v);
    b.close_loop(&lp, &[(x, next)]);
    b.ret(Some(x));
    b.finish()
}

/// `for i in 0..100: x[i] = (int) y[0]` with `y: long[]`
fn int_vector_long_invariant() -> Function {
    let mut b = FunctionBuilder::new("int_vector_long_invariant", Type::Void);
    let x = b.param(Type::Ref(ScalarType::I32));
    let y = b.param(Type::Ref(ScalarType::I64));
    let zero = b.iconst(ScalarType::I32, 0);
    let hundred = b.iconst(ScalarType::I32, 100);
    let lp = b.counted_loop(ScalarType::I32, zero, hundred);
    let first = b.iconst(ScalarType::I32, 0);
    let v = b.array_get(y, first);
    let narrow = b.convert(ScalarType::I32, v);
    b.array_set(x, lp.index, narrow);
    b.close_loop(&lp, &[]);
    b.ret(None);
    b.finish()
}

/// `for i in 0..100: x[i] = (int) ((long) y[i] + 1L)`
fn long_can_be_done_with_int() -> Function {
    let mut b = FunctionBuilder::new("long_can_be_done_with_int", Type::Void);
    let x = b.param(Type::Ref(ScalarType::I32));
    let y = b.param(Type::Ref(ScalarType::I32));
    let zero = b.iconst(ScalarType::I32, 0);
    let hundred = b.iconst(ScalarType::I32, 100);
    let lp = b.counted_loop(ScalarType::I32, zero, hundred);
    let v = b.array_get(y, lp.index);
    let wide = b.convert(ScalarType::I64, v);
    let one = b.iconst(ScalarType::I64, 1);
    let sum = b.add(wide, one);
    let narrow = b.convert(ScalarType::I32, sum);
    b.array_set(x, lp.index, narrow);
    b.close_loop(&lp, &[]);
    b.ret(None);
    b.finish()
}

/// `s = 0; for i in 0..n: s += y[i] * 3; return s`
fn int_sum(elem: ScalarType) -> Function {
    let mut b = FunctionBuilder::new("int_sum", Type::Scalar(elem));
    let y = b.param(Type::Ref(elem));
    let n = b.param(Type::I32);
    let zero = b.iconst(ScalarType::I32, 0);
    let init = b.iconst(elem, 0);
    let lp = b.counted_loop(ScalarType::I32, zero, n);
    let s = b.loop_phi(&lp, init);
    let v = b.array_get(y, lp.index);
    let k = b.iconst(elem, 3);
    let m = b.mul(v, k);
    let next = b.add(s, m);
    b.close_loop(&lp, &[(s, next)]);
    b.ret(Some(s));
    b.finish()
}

/// `j = j0; for i in 0..n { x[i] = j * i; j += 2 }; return j`
fn secondary_induction() -> Function {
    let mut b = FunctionBuilder::new("secondary_induction", Type::I32);
    let x = b.param(Type::Ref(ScalarType::I32));
    let j0 = b.param(Type::I32);
    let n = b.param(Type::I32);
    let zero = b.iconst(ScalarType::I32, 0);
    let lp = b.counted_loop(ScalarType::I32, zero, n);
    let j = b.loop_phi(&lp, j0);
    let m = b.mul(j, lp.index);
    b.array_set(x, lp.index, m);
    let two = b.iconst(ScalarType::I32, 2);
    let next = b.add(j, two);
    b.close_loop(&lp, &[(j, next)]);
    b.ret(Some(j));
    b.finish()
}

/// `s = init; for i in 0..n: s = s <op> y[i]; return s`
fn reduce(op: BinOp, elem: ScalarType) -> Function {
    let mut b = FunctionBuilder::new(format!("reduce_{}", op.name()), Type::Scalar(elem));
    let y = b.param(Type::Ref(elem));
    let init = b.param(Type::Scalar(elem));
    let n = b.param(Type::I32);
    let zero = b.iconst(ScalarType::I32, 0);
    let lp = b.counted_loop(ScalarType::I32, zero, n);
    let s = b.loop_phi(&lp, init);
    let v = b.array_get(y, lp.index);
    let next = b.binary(op, s, v);
    b.close_loop(&lp, &[(s, next)]);
    b.ret(Some(s));
    b.finish()
}

/// `for i in 0..n: a[i + d] = a[i] * 3`
fn shift(d: i64) -> Function {
    let mut b = FunctionBuilder::new("shift", Type::Void);
    let a = b.param(Type::Ref(ScalarType::I32));
    let n = b.param(Type::I32);
    let zero = b.iconst(ScalarType::I32, 0);
    let lp = b.counted_loop(ScalarType::I32, zero, n);
    let v = b.array_get(a, lp.index);
    let k = b.iconst(ScalarType::I32, 3);
    let m = b.mul(v, k);
    let kd = b.iconst(ScalarType::I32, d);
    let dst = b.add(lp.index, kd);
    b.array_set(a, dst, m);
    b.close_loop(&lp, &[]);
    b.ret(None);
    b.finish()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_unroll_float_scale() {
    let f = unroll();
    let y: Vec<f64> = (0..100).map(|i| i as f64 * 0.75 - 3.0).collect();
    let setup = |it: &mut Interpreter| {
        vec![
            it.alloc_floats(ScalarType::F32, &[0.0; 100]),
            it.alloc_floats(ScalarType::F32, &y),
        ]
    };

    let (g, pass) = vectorized(&f, VectorizeConfig::sse42());
    assert!(pass.decisions()[0].is_vectorized());
    let plan = pass.decisions()[0].plan().unwrap();
    assert_eq!(plan.lanes, Lanes::Fixed(4));
    // Two copies of 4 lanes: 96 iterations vectorized, 4 left over.
    assert_eq!(plan.unroll, 2);
    assert!(plan.needs_cleanup);
    assert_eq!(pass.stats().cleanup_loops, 1);
    assert!(g.has_vector_code());
    assert_eq!(count(&g, |op| *op == Opcode::VecLoad), 2);
    assert_eq!(count(&g, |op| *op == Opcode::VecStore), 2);
    assert_eq!(count(&g, |op| *op == Opcode::VecReplicateScalar), 1);
    assert!(hints(&g).contains(&LoopHint::Cleanup));
    assert_equivalent(&f, &g, &[128], &setup);

    let mut it = Interpreter::new(MachineConfig::default());
    let args = setup(&mut it);
    it.run(&g, &args).unwrap();
    let x = it.read_floats(&args[0]).unwrap();
    assert_eq!(x[10], (4.5f32 * 2.5) as f64);
    assert_eq!(x[99], ((99.0f32 * 0.75 - 3.0) * 2.5) as f64);

    for (config, bits) in targets() {
        let (g, _) = vectorized(&f, config);
        assert_equivalent(&f, &g, bits, &setup);
    }
}

#[test]
fn test_stencil_runtime_trip_counts() {
    let f = stencil("stencil", 1, None, -1, 1);
    for (config, bits) in targets() {
        let (g, pass) = vectorized(&f, config);
        assert_eq!(pass.loops_vectorized(), 1);
        assert_eq!(pass.stats().guards_inserted, 1);
        assert!(hints(&g).contains(&LoopHint::Cleanup));
        assert_eq!(count(&g, |op| *op == Opcode::Compare(CmpOp::Ne)), 1);

        for n in [0usize, 1, 2, 3, 5, 17, 18, 33, 67, 100] {
            let len = n.max(1);
            let setup = |it: &mut Interpreter| {
                vec![
                    it.alloc_ints(ScalarType::I32, &vec![0; len]),
                    it.alloc_ints(ScalarType::I32, &ramp(len)),
                    Value::int(n as i64),
                ]
            };
            assert_equivalent(&f, &g, bits, &setup);
        }
    }
}

#[test]
fn test_stencil_in_place_falls_back_to_scalar() {
    let f = stencil("stencil", 1, None, -1, 1);
    for (config, bits) in targets() {
        let (g, _) = vectorized(&f, config);
        for n in [2usize, 9, 40, 130] {
            let setup = |it: &mut Interpreter| {
                let arr = it.alloc_ints(ScalarType::I32, &ramp(n));
                vec![arr.clone(), arr, Value::int(n as i64)]
            };
            assert_equivalent(&f, &g, bits, &setup);

            let mut it = Interpreter::new(MachineConfig::with_scalable_bits(bits[0]));
            let args = setup(&mut it);
            it.run(&g, &args).unwrap();
            let out = it.read_ints(&args[0]).unwrap();
            for i in 1..n - 1 {
                assert_eq!(out[i], (i * (i + 2)) as i64, "index {i} of {n}");
            }
            assert_eq!(out[n - 1], (n - 1) as i64);
        }
    }
}

#[test]
fn test_stencil_const_size() {
    let f = stencil("stencil_const_size", 1, Some(129), -1, 1);
    let (g, pass) = vectorized(&f, VectorizeConfig::sse42());
    let plan = pass.decisions()[0].plan().unwrap();
    assert_eq!(plan.trip_count, Some(128));
    assert_eq!(plan.unroll, 4);
    // The alias guard may still send every iteration to the scalar loop.
    assert!(plan.needs_cleanup);
    assert_eq!(plan.guards.len(), 1);

    let setup = |it: &mut Interpreter| {
        vec![
            it.alloc_ints(ScalarType::I32, &[0; 130]),
            it.alloc_ints(ScalarType::I32, &ramp(130)),
        ]
    };
    assert_equivalent(&f, &g, &[128], &setup);
    for (config, bits) in targets() {
        let (g, _) = vectorized(&f, config);
        assert_equivalent(&f, &g, bits, &setup);
    }
}

#[test]
fn test_stencil_offset_variants() {
    // Offsets written as `i + (-1)` and `i - 1` analyze identically.
    let add = stencil("stencil_add_int", 1, None, -1, 1);
    let mut b = FunctionBuilder::new("stencil_sub_int", Type::Void);
    let a = b.param(Type::Ref(ScalarType::I32));
    let src = b.param(Type::Ref(ScalarType::I32));
    let n = b.param(Type::I32);
    let one = b.iconst(ScalarType::I32, 1);
    let limit = b.sub(n, one);
    let lp = b.counted_loop(ScalarType::I32, one, limit);
    let ilo = b.binary(BinOp::Sub, lp.index, one);
    let left = b.array_get(src, ilo);
    let mid = b.array_get(src, lp.index);
    let ihi = b.add(lp.index, one);
    let right = b.array_get(src, ihi);
    let s = b.add(left, mid);
    let s = b.add(s, right);
    b.array_set(a, lp.index, s);
    b.close_loop(&lp, &[]);
    b.ret(None);
    let sub = b.finish();

    for f in [add, sub] {
        let (g, pass) = vectorized(&f, VectorizeConfig::avx2());
        assert_eq!(pass.loops_vectorized(), 1, "{}", f.name);
        for n in [0usize, 7, 31, 64] {
            let len = n.max(1);
            let setup = |it: &mut Interpreter| {
                vec![
                    it.alloc_ints(ScalarType::I32, &vec![0; len]),
                    it.alloc_ints(ScalarType::I32, &ramp(len)),
                    Value::int(n as i64),
                ]
            };
            assert_equivalent(&f, &g, &[128], &setup);
        }
    }
}

#[test]
fn test_long_induction_reduction() {
    let f = long_induction_reduction();
    let setup = |it: &mut Interpreter| vec![it.alloc_ints(ScalarType::I64, &[3, 7, 9])];
    let (ret, _) = execute(&f, MachineConfig::default(), &setup);
    assert_eq!(ret.as_int(), Some(31));

    for (config, bits) in targets() {
        let (g, pass) = vectorized(&f, config);
        assert_eq!(pass.stats().reductions, 1);
        assert_eq!(count(&g, |op| *op == Opcode::VecReduce(BinOp::Add)), 1);
        assert_equivalent(&f, &g, bits, &setup);
    }
}

#[test]
fn test_int_vector_long_invariant() {
    let f = int_vector_long_invariant();
    let setup = |it: &mut Interpreter| {
        vec![
            it.alloc_ints(ScalarType::I32, &[0; 100]),
            it.alloc_ints(ScalarType::I64, &[(1 << 40) + 5, 2]),
        ]
    };
    for (config, bits) in targets() {
        let (g, pass) = vectorized(&f, config);
        assert_eq!(pass.loops_vectorized(), 1);
        assert_equivalent(&f, &g, bits, &setup);
    }
    let (g, _) = vectorized(&f, VectorizeConfig::sse42());
    let mut it = Interpreter::new(MachineConfig::default());
    let args = setup(&mut it);
    it.run(&g, &args).unwrap();
    assert!(it.read_ints(&args[0]).unwrap().iter().all(|&v| v == 5));
}

#[test]
fn test_long_can_be_done_with_int() {
    let f = long_can_be_done_with_int();
    let (g, pass) = vectorized(&f, VectorizeConfig::sse42());
    assert_eq!(pass.stats().narrowed_ops, 1);
    let plan = pass.decisions()[0].plan().unwrap();
    assert_eq!(plan.elem, ScalarType::I32);
    assert_eq!(plan.lanes, Lanes::Fixed(4));
    // No widening survives in the vector body.
    assert_eq!(count(&g, |op| *op == Opcode::VecConvert), 0);

    let y: Vec<i64> = (0..100).map(|i| i64::from(i32::MAX) - 50 + i).collect();
    let setup = |it: &mut Interpreter| {
        vec![
            it.alloc_ints(ScalarType::I32, &[0; 100]),
            it.alloc_ints(ScalarType::I32, &y),
        ]
    };
    assert_equivalent(&f, &g, &[128], &setup);
    for (config, bits) in targets() {
        let (g, _) = vectorized(&f, config);
        assert_equivalent(&f, &g, bits, &setup);
    }
}

#[test]
fn test_int_sum_across_trip_counts() {
    for elem in [ScalarType::I32, ScalarType::I64] {
        let f = int_sum(elem);
        for (config, bits) in targets() {
            let (g, pass) = vectorized(&f, config);
            assert_eq!(pass.loops_vectorized(), 1);
            for n in [0usize, 1, 2, 3, 4, 7, 8, 15, 16, 17, 63, 65, 200] {
                let values: Vec<i64> = (0..n as i64).map(|i| i * 7 - 40).collect();
                let setup = |it: &mut Interpreter| {
                    vec![it.alloc_ints(elem, &values), Value::int(n as i64)]
                };
                assert_equivalent(&f, &g, bits, &setup);
            }
        }
    }
}

#[test]
fn test_secondary_induction_as_data() {
    let f = secondary_induction();
    for (config, bits) in targets() {
        let (g, pass) = vectorized(&f, config);
        assert_eq!(pass.loops_vectorized(), 1);
        assert_eq!(pass.stats().reductions, 0);
        assert!(count(&g, |op| *op == Opcode::VecSeries) >= 2);
        // Empty, single, odd and evenly dividing trip counts.
        for n in [0usize, 1, 2, 7, 37, 64, 128] {
            for j0 in [0i64, 5, -3] {
                let setup = |it: &mut Interpreter| {
                    vec![
                        it.alloc_ints(ScalarType::I32, &vec![-1; n.max(1)]),
                        Value::int(j0),
                        Value::int(n as i64),
                    ]
                };
                assert_equivalent(&f, &g, bits, &setup);
            }
        }
    }

    let (g, _) = vectorized(&f, VectorizeConfig::avx2());
    let mut it = Interpreter::new(MachineConfig::default());
    let args = vec![
        it.alloc_ints(ScalarType::I32, &[0; 37]),
        Value::int(5),
        Value::int(37),
    ];
    let ret = it.run(&g, &args).unwrap();
    assert_eq!(ret.as_int(), Some(5 + 2 * 37));
    let x = it.read_ints(&args[0]).unwrap();
    for (i, &v) in x.iter().enumerate() {
        let i = i as i64;
        assert_eq!(v, (5 + 2 * i) * i, "index {i}");
    }
}

#[test]
fn test_reductions_with_parameter_init() {
    let ops = [BinOp::Sub, BinOp::Mul, BinOp::Min, BinOp::Max, BinOp::Xor, BinOp::And, BinOp::Or];
    for elem in [ScalarType::I32, ScalarType::I64] {
        for op in ops {
            let f = reduce(op, elem);
            // Partial results of a subtraction are summed.
            let fold = if op == BinOp::Sub { BinOp::Add } else { op };
            for (config, bits) in targets() {
                let (g, pass) = vectorized(&f, config);
                assert_eq!(pass.loops_vectorized(), 1, "{}", f.name);
                assert_eq!(pass.stats().reductions, 1, "{}", f.name);
                assert_eq!(count(&g, |o| *o == Opcode::VecReduce(fold)), 1);
                for n in [0usize, 1, 2, 7, 37, 64, 128] {
                    // Small nonzero values of both signs.
                    let values: Vec<i64> = (0..n as i64)
                        .map(|i| match i * 13 % 11 - 4 {
                            0 => 3,
                            v => v,
                        })
                        .collect();
                    for init in [7i64, -5] {
                        let setup = |it: &mut Interpreter| {
                            vec![
                                it.alloc_ints(elem, &values),
                                Value::int(init),
                                Value::int(n as i64),
                            ]
                        };
                        assert_equivalent(&f, &g, bits, &setup);
                    }
                }
            }
        }
    }

    // Reference results on a fixed input.
    let values = [3i64, -1, 4, 1, -5, 9, 2, -6, 5, 3, 5];
    let expected = [
        (BinOp::Sub, 7 - values.iter().sum::<i64>()),
        (BinOp::Min, -6),
        (BinOp::Max, 9),
        (BinOp::Xor, values.iter().fold(7, |a, v| a ^ v)),
    ];
    for (op, want) in expected {
        let (g, _) = vectorized(&reduce(op, ScalarType::I32), VectorizeConfig::sse42());
        let mut it = Interpreter::new(MachineConfig::default());
        let args = vec![
            it.alloc_ints(ScalarType::I32, &values),
            Value::int(7),
            Value::int(values.len() as i64),
        ];
        assert_eq!(it.run(&g, &args).unwrap().as_int(), Some(want), "{op:?}");
    }
}

#[test]
fn test_predicated_code_shape() {
    let f = int_sum(ScalarType::I32);
    let (g, pass) = vectorized(&f, VectorizeConfig::sve(512));
    let plan = pass.decisions()[0].plan().unwrap();
    assert_eq!(plan.style, CodegenStyle::Predicated);
    assert_eq!(plan.lanes, Lanes::Scalable);
    assert_eq!(plan.unroll, 1);
    assert!(!plan.needs_cleanup);
    assert_eq!(count(&g, |op| *op == Opcode::VecPredWhile), 1);
    assert_eq!(count(&g, |op| matches!(op, Opcode::VecLaneCount(_))), 1);
    assert!(!hints(&g).contains(&LoopHint::Cleanup));
}

#[test]
fn test_safe_distance_limits_lanes() {
    let f = shift(2);
    let (g, pass) = vectorized(&f, VectorizeConfig::sse42());
    let plan = pass.decisions()[0].plan().unwrap();
    assert_eq!(plan.lanes, Lanes::Fixed(2));
    assert!(plan.guards.is_empty());

    for n in [0usize, 1, 5, 16, 21] {
        let setup = |it: &mut Interpreter| {
            vec![it.alloc_ints(ScalarType::I32, &ramp(n + 2)), Value::int(n as i64)]
        };
        assert_equivalent(&f, &g, &[128], &setup);
    }
}

#[test]
fn test_rejections_leave_function_unchanged() {
    let mut fp = FunctionBuilder::new("float_sum", Type::Scalar(ScalarType::F32));
    let y = fp.param(Type::Ref(ScalarType::F32));
    let n = fp.param(Type::I32);
    let zero = fp.iconst(ScalarType::I32, 0);
    let init = fp.fconst(ScalarType::F32, 0.0);
    let lp = fp.counted_loop(ScalarType::I32, zero, n);
    let s = fp.loop_phi(&lp, init);
    let v = fp.array_get(y, lp.index);
    let next = fp.add(s, v);
    fp.close_loop(&lp, &[(s, next)]);
    fp.ret(Some(s));

    let mut tiny = FunctionBuilder::new("tiny", Type::Void);
    let x = tiny.param(Type::Ref(ScalarType::I32));
    let zero = tiny.iconst(ScalarType::I32, 0);
    let one = tiny.iconst(ScalarType::I32, 1);
    let lp = tiny.counted_loop(ScalarType::I32, zero, one);
    tiny.array_set(x, lp.index, one);
    tiny.close_loop(&lp, &[]);
    tiny.ret(None);

    let mut alloc = FunctionBuilder::new("alloc_in_loop", Type::Void);
    let x = alloc.param(Type::Ref(ScalarType::I32));
    let n = alloc.param(Type::I32);
    let zero = alloc.iconst(ScalarType::I32, 0);
    let lp = alloc.counted_loop(ScalarType::I32, zero, n);
    let len = alloc.iconst(ScalarType::I32, 4);
    alloc.new_array(ScalarType::I32, len);
    alloc.array_set(x, lp.index, lp.index);
    alloc.close_loop(&lp, &[]);
    alloc.ret(None);

    let cases = [
        (fp.finish(), RejectReason::FpReduction),
        (alloc.finish(), RejectReason::SideEffect),
        (shift(1), RejectReason::UnsafeDependence),
        (tiny.finish(), RejectReason::TripCountTooSmall),
    ];
    for (f, reason) in cases {
        let before = f.to_string();
        let (g, pass) = vectorized(&f, VectorizeConfig::avx2());
        assert_eq!(pass.decisions()[0].reject_reason(), Some(reason), "{}", f.name);
        assert!(!pass.decisions()[0].is_vectorized());
        assert_eq!(pass.stats().loops_rejected, 1);
        assert!(!g.has_vector_code());
        assert_eq!(g.to_string(), before);
    }
}

#[test]
fn test_vectorizing_twice_is_a_no_op() {
    let f = stencil("stencil", 1, None, -1, 1);
    for (config, _) in targets() {
        let (mut g, _) = vectorized(&f, config.clone());
        let before = g.to_string();
        let mut again = Vectorize::new(config);
        assert!(!again.run(&mut g));
        assert_eq!(g.to_string(), before);
        assert_eq!(again.loops_vectorized(), 0);
    }
}
