//! Primitive operations with reverse-mode derivatives.
//!
//! A [`Primitive`] evaluates on plain arrays and knows how to pull a
//! cotangent back to each of its inputs. [`apply`] lifts it to [`Value`]s:
//! it peels the newest trace off the arguments, applies the primitive one
//! layer down (recursively), and boxes the answer with a node linking to the
//! boxed inputs. VJPs are themselves built from primitives, so backward
//! passes can be recorded by older traces.

use std::rc::Rc;

use ndarray::{arr0, Array1, Ix2, IxDyn, Zip};

use crate::error::{Error, Result};

use super::trace::{Node, Vjp};
use super::value::{Array, Value};

/// An operation the differentiation engine can record.
pub trait Primitive {
    fn name(&self) -> &'static str;

    /// Forward evaluation on plain arrays.
    fn eval(&self, args: &[Array]) -> Result<Array>;

    /// VJP with respect to argument `argnum`. `ans` and `args` are the
    /// output and inputs one box layer down.
    fn vjp(&self, argnum: usize, ans: &Value, args: &[Value]) -> Result<Vjp>;
}

/// Applies `op`, recording it on the newest trace among `args`.
pub fn apply(op: &dyn Primitive, args: &[Value]) -> Result<Value> {
    let Some(trace) = args.iter().filter_map(Value::trace).max() else {
        let arrays: Vec<Array> = args.iter().map(|a| a.data().clone()).collect();
        return op.eval(&arrays).map(Value::Plain);
    };

    let inner: Vec<Value> = args
        .iter()
        .map(|a| match a {
            Value::Boxed(b) if b.trace == trace => b.value.clone(),
            other => other.clone(),
        })
        .collect();
    let ans = apply(op, &inner)?;

    let mut parents = Vec::new();
    for (argnum, arg) in args.iter().enumerate() {
        if let Value::Boxed(b) = arg {
            if b.trace == trace {
                parents.push((b.node.clone(), op.vjp(argnum, &ans, &inner)?));
            }
        }
    }

    Ok(Value::boxed(ans, trace, Node::new(parents)))
}

fn mismatch(op: &'static str, lhs: &Array, rhs: &Array) -> Error {
    Error::ShapeMismatch {
        op,
        lhs: lhs.shape().to_vec(),
        rhs: rhs.shape().to_vec(),
    }
}

fn first(a: &Array) -> f64 {
    a.iter().next().copied().unwrap_or(0.0)
}

/// Row-major reshape, independent of memory layout.
fn reshaped(op: &'static str, a: &Array, shape: &[usize]) -> Result<Array> {
    let values: Vec<f64> = a.iter().copied().collect();
    Array::from_shape_vec(IxDyn(shape), values).map_err(|_| Error::ShapeMismatch {
        op,
        lhs: a.shape().to_vec(),
        rhs: shape.to_vec(),
    })
}

/// Elementwise binary op: equal shapes, or one side holding one element.
fn broadcast_binary(
    op: &'static str,
    a: &Array,
    b: &Array,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Array> {
    if a.shape() == b.shape() {
        return Ok(Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)));
    }
    if a.len() == 1 && (b.len() != 1 || b.ndim() >= a.ndim()) {
        let x = first(a);
        return Ok(b.mapv(|y| f(x, y)));
    }
    if b.len() == 1 {
        let y = first(b);
        return Ok(a.mapv(|x| f(x, y)));
    }
    Err(mismatch(op, a, b))
}

/// Sums a cotangent back to the shape of a broadcast operand.
fn unbroadcast(g: &Value, shape: &[usize]) -> Result<Value> {
    if g.shape() == shape {
        Ok(g.clone())
    } else {
        reshape(&sum(g)?, shape)
    }
}

struct Add;

impl Primitive for Add {
    fn name(&self) -> &'static str {
        "add"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        broadcast_binary(self.name(), &args[0], &args[1], |x, y| x + y)
    }

    fn vjp(&self, argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[argnum].shape();
        Ok(Rc::new(move |g: &Value| unbroadcast(g, &shape)))
    }
}

struct Sub;

impl Primitive for Sub {
    fn name(&self) -> &'static str {
        "sub"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        broadcast_binary(self.name(), &args[0], &args[1], |x, y| x - y)
    }

    fn vjp(&self, argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[argnum].shape();
        if argnum == 0 {
            Ok(Rc::new(move |g: &Value| unbroadcast(g, &shape)))
        } else {
            Ok(Rc::new(move |g: &Value| unbroadcast(&neg(g)?, &shape)))
        }
    }
}

struct Mul;

impl Primitive for Mul {
    fn name(&self) -> &'static str {
        "mul"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        broadcast_binary(self.name(), &args[0], &args[1], |x, y| x * y)
    }

    fn vjp(&self, argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[argnum].shape();
        let other = args[1 - argnum].clone();
        Ok(Rc::new(move |g: &Value| unbroadcast(&mul(g, &other)?, &shape)))
    }
}

struct Div;

impl Primitive for Div {
    fn name(&self) -> &'static str {
        "div"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        broadcast_binary(self.name(), &args[0], &args[1], |x, y| x / y)
    }

    fn vjp(&self, argnum: usize, ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[argnum].shape();
        let denominator = args[1].clone();
        if argnum == 0 {
            Ok(Rc::new(move |g: &Value| unbroadcast(&div(g, &denominator)?, &shape)))
        } else {
            // d(a/b)/db = -(a/b)/b
            let ans = ans.clone();
            Ok(Rc::new(move |g: &Value| {
                let q = div(&ans, &denominator)?;
                unbroadcast(&neg(&mul(g, &q)?)?, &shape)
            }))
        }
    }
}

struct Neg;

impl Primitive for Neg {
    fn name(&self) -> &'static str {
        "neg"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        Ok(args[0].mapv(|x| -x))
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, _args: &[Value]) -> Result<Vjp> {
        Ok(Rc::new(neg))
    }
}

struct Scale(f64);

impl Primitive for Scale {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let c = self.0;
        Ok(args[0].mapv(|x| c * x))
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, _args: &[Value]) -> Result<Vjp> {
        let c = self.0;
        Ok(Rc::new(move |g: &Value| scale(g, c)))
    }
}

struct AddScalar(f64);

impl Primitive for AddScalar {
    fn name(&self) -> &'static str {
        "add_scalar"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let c = self.0;
        Ok(args[0].mapv(|x| x + c))
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, _args: &[Value]) -> Result<Vjp> {
        Ok(Rc::new(|g: &Value| Ok(g.clone())))
    }
}

struct Sin;

impl Primitive for Sin {
    fn name(&self) -> &'static str {
        "sin"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        Ok(args[0].mapv(f64::sin))
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let x = args[0].clone();
        Ok(Rc::new(move |g: &Value| mul(g, &cos(&x)?)))
    }
}

struct Cos;

impl Primitive for Cos {
    fn name(&self) -> &'static str {
        "cos"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        Ok(args[0].mapv(f64::cos))
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let x = args[0].clone();
        Ok(Rc::new(move |g: &Value| neg(&mul(g, &sin(&x)?)?)))
    }
}

struct Sqrt;

impl Primitive for Sqrt {
    fn name(&self) -> &'static str {
        "sqrt"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        Ok(args[0].mapv(f64::sqrt))
    }

    fn vjp(&self, _argnum: usize, ans: &Value, _args: &[Value]) -> Result<Vjp> {
        let ans = ans.clone();
        Ok(Rc::new(move |g: &Value| div(g, &scale(&ans, 2.0)?)))
    }
}

struct Sum;

impl Primitive for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        Ok(arr0(args[0].sum()).into_dyn())
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[0].shape();
        Ok(Rc::new(move |g: &Value| broadcast_to(g, &shape)))
    }
}

struct BroadcastTo(Vec<usize>);

impl Primitive for BroadcastTo {
    fn name(&self) -> &'static str {
        "broadcast_to"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let a = &args[0];
        if a.len() != 1 {
            return Err(Error::ShapeMismatch {
                op: self.name(),
                lhs: a.shape().to_vec(),
                rhs: self.0.clone(),
            });
        }
        Ok(Array::from_elem(IxDyn(&self.0), first(a)))
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[0].shape();
        Ok(Rc::new(move |g: &Value| reshape(&sum(g)?, &shape)))
    }
}

struct Reshape(Vec<usize>);

impl Primitive for Reshape {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        reshaped(self.name(), &args[0], &self.0)
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[0].shape();
        Ok(Rc::new(move |g: &Value| reshape(g, &shape)))
    }
}

struct Transpose;

impl Primitive for Transpose {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let a = args[0]
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| mismatch(self.name(), &args[0], &args[0]))?;
        Ok(a.t().as_standard_layout().into_owned().into_dyn())
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, _args: &[Value]) -> Result<Vjp> {
        Ok(Rc::new(transpose))
    }
}

/// Matrix product of two 2-d arrays.
struct Dot;

impl Primitive for Dot {
    fn name(&self) -> &'static str {
        "dot"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let err = || mismatch("dot", &args[0], &args[1]);
        let a = args[0].view().into_dimensionality::<Ix2>().map_err(|_| err())?;
        let b = args[1].view().into_dimensionality::<Ix2>().map_err(|_| err())?;
        if a.ncols() != b.nrows() {
            return Err(err());
        }
        Ok(a.dot(&b).into_dyn())
    }

    fn vjp(&self, argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        if argnum == 0 {
            let b = args[1].clone();
            Ok(Rc::new(move |g: &Value| dot(g, &transpose(&b)?)))
        } else {
            let a = args[0].clone();
            Ok(Rc::new(move |g: &Value| dot(&transpose(&a)?, g)))
        }
    }
}

/// Contiguous range of the row-major flattened input.
struct Slice {
    start: usize,
    len: usize,
}

impl Primitive for Slice {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let a = &args[0];
        if self.start + self.len > a.len() {
            return Err(Error::ShapeMismatch {
                op: self.name(),
                lhs: a.shape().to_vec(),
                rhs: vec![self.start, self.start + self.len],
            });
        }
        let values: Vec<f64> = a.iter().skip(self.start).take(self.len).copied().collect();
        Ok(Array1::from(values).into_dyn())
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[0].shape();
        let start = self.start;
        Ok(Rc::new(move |g: &Value| embed(g, start, &shape)))
    }
}

/// Writes the flattened input into zeros of `shape`, starting at `start`.
struct Embed {
    start: usize,
    shape: Vec<usize>,
}

impl Primitive for Embed {
    fn name(&self) -> &'static str {
        "embed"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let a = &args[0];
        let total: usize = self.shape.iter().product();
        if self.start + a.len() > total {
            return Err(Error::ShapeMismatch {
                op: self.name(),
                lhs: a.shape().to_vec(),
                rhs: self.shape.clone(),
            });
        }
        let mut flat = vec![0.0; total];
        for (dst, &src) in flat[self.start..].iter_mut().zip(a.iter()) {
            *dst = src;
        }
        reshaped(self.name(), &Array1::from(flat).into_dyn(), &self.shape)
    }

    fn vjp(&self, _argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let shape = args[0].shape();
        let len = args[0].len();
        let start = self.start;
        Ok(Rc::new(move |g: &Value| reshape(&slice(g, start, len)?, &shape)))
    }
}

/// Concatenation of flattened inputs.
struct Concat;

impl Primitive for Concat {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let values: Vec<f64> = args.iter().flat_map(|a| a.iter().copied()).collect();
        Ok(Array1::from(values).into_dyn())
    }

    fn vjp(&self, argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let offset: usize = args[..argnum].iter().map(Value::len).sum();
        let len = args[argnum].len();
        let shape = args[argnum].shape();
        Ok(Rc::new(move |g: &Value| reshape(&slice(g, offset, len)?, &shape)))
    }
}

pub fn add(a: &Value, b: &Value) -> Result<Value> {
    apply(&Add, &[a.clone(), b.clone()])
}

pub fn sub(a: &Value, b: &Value) -> Result<Value> {
    apply(&Sub, &[a.clone(), b.clone()])
}

pub fn mul(a: &Value, b: &Value) -> Result<Value> {
    apply(&Mul, &[a.clone(), b.clone()])
}

pub fn div(a: &Value, b: &Value) -> Result<Value> {
    apply(&Div, &[a.clone(), b.clone()])
}

pub fn neg(a: &Value) -> Result<Value> {
    apply(&Neg, &[a.clone()])
}

pub fn scale(a: &Value, c: f64) -> Result<Value> {
    apply(&Scale(c), &[a.clone()])
}

pub fn add_scalar(a: &Value, c: f64) -> Result<Value> {
    apply(&AddScalar(c), &[a.clone()])
}

pub fn sin(a: &Value) -> Result<Value> {
    apply(&Sin, &[a.clone()])
}

pub fn cos(a: &Value) -> Result<Value> {
    apply(&Cos, &[a.clone()])
}

pub fn sqrt(a: &Value) -> Result<Value> {
    apply(&Sqrt, &[a.clone()])
}

/// Sum of all elements (0-d result).
pub fn sum(a: &Value) -> Result<Value> {
    apply(&Sum, &[a.clone()])
}

/// Fills `shape` with the single element of `a`.
pub fn broadcast_to(a: &Value, shape: &[usize]) -> Result<Value> {
    apply(&BroadcastTo(shape.to_vec()), &[a.clone()])
}

pub fn reshape(a: &Value, shape: &[usize]) -> Result<Value> {
    if a.shape() == shape {
        return Ok(a.clone());
    }
    apply(&Reshape(shape.to_vec()), &[a.clone()])
}

pub fn transpose(a: &Value) -> Result<Value> {
    apply(&Transpose, &[a.clone()])
}

pub fn dot(a: &Value, b: &Value) -> Result<Value> {
    apply(&Dot, &[a.clone(), b.clone()])
}

/// Elements `start..start + len` of the flattened value.
pub fn slice(a: &Value, start: usize, len: usize) -> Result<Value> {
    apply(&Slice { start, len }, &[a.clone()])
}

pub fn embed(a: &Value, start: usize, shape: &[usize]) -> Result<Value> {
    apply(
        &Embed {
            start,
            shape: shape.to_vec(),
        },
        &[a.clone()],
    )
}

/// Flattened concatenation.
pub fn concat(values: &[Value]) -> Result<Value> {
    apply(&Concat, values)
}

/// Element `i` of the flattened value, as a 0-d value.
pub fn index(a: &Value, i: usize) -> Result<Value> {
    reshape(&slice(a, i, 1)?, &[])
}

/// Row `i` of a 2-d value.
pub fn row(a: &Value, i: usize) -> Result<Value> {
    let shape = a.shape();
    if shape.len() != 2 || i >= shape[0] {
        return Err(Error::ShapeMismatch {
            op: "row",
            lhs: shape,
            rhs: vec![i],
        });
    }
    slice(a, i * shape[1], shape[1])
}
