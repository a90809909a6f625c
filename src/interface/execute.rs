//! Differentiable batch execution of tapes.
//!
//! [`batch_execute`] packs the parameters of every tape into one vector and
//! runs the batch as a single recorded primitive on it. Its backward pass is
//! [`vjp`]: parameter-shift tapes are generated for every trainable
//! parameter, executed through `batch_execute` again one nesting level
//! deeper, and contracted with the incoming cotangent.

use std::cell::RefCell;
use std::rc::Rc;

use ndarray::Array1;
use tracing::debug;

use crate::autodiff::ops::{concat, dot, index, reshape, slice, transpose};
use crate::autodiff::{apply, Array, Primitive, Value, Vjp};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::gradients::{param_shift, GradientFn, Postprocess, ShiftCache};
use crate::tape::Tape;

use super::scope::UnwrapTape;
use super::unwrap::{classify_trainable, peel_above, unwrap_stale};

/// Backward function of one batch: per-tape cotangents in, per-tape
/// gradients out (`None` for tapes without trainable parameters).
pub type GradFn = Box<dyn Fn(&[Value]) -> Result<Vec<Option<Value>>>>;

/// Executes `tapes` on `device` and returns one differentiable result per
/// tape.
///
/// `gradient_fn` defaults to the parameter-shift rule backed by `cache`.
/// `nesting` is the differentiation order this call belongs to; top-level
/// callers pass 1.
pub fn batch_execute(
    tapes: &mut [Tape],
    device: Rc<dyn Device>,
    gradient_fn: Option<GradientFn>,
    cache: &ShiftCache,
    nesting: usize,
) -> Result<Vec<Value>> {
    if tapes.is_empty() {
        return Err(Error::EmptyBatch);
    }
    debug!(tapes = tapes.len(), nesting, device = device.name(), "batch execute");

    let mut flat = Vec::new();
    for (t, tape) in tapes.iter().enumerate() {
        for (i, p) in tape.get_parameters(false).iter().enumerate() {
            if p.len() != 1 {
                return Err(Error::NonScalarParameter {
                    tape: t,
                    index: i,
                    shape: p.shape(),
                });
            }
            flat.push(reshape(p, &[1])?);
        }
    }
    let packed = if flat.is_empty() {
        Value::zeros(&[0])
    } else {
        concat(&flat)?
    };

    let gradient_fn = gradient_fn.unwrap_or_else(|| param_shift(cache));
    let primitive = BatchExecute {
        tapes: RefCell::new(tapes),
        device,
        gradient_fn,
        cache: cache.clone(),
        nesting,
        shapes: RefCell::new(Vec::new()),
    };
    let out = apply(&primitive, &[packed])?;

    let shapes = primitive.shapes.into_inner();
    let mut results = Vec::with_capacity(shapes.len());
    let mut offset = 0;
    for shape in shapes {
        let size = shape.iter().product();
        results.push(reshape(&slice(&out, offset, size)?, &shape)?);
        offset += size;
    }
    Ok(results)
}

/// Executes `tapes` with the default gradient rule and a fresh shift cache.
pub fn execute(tapes: &mut [Tape], device: Rc<dyn Device>) -> Result<Vec<Value>> {
    batch_execute(tapes, device, None, &ShiftCache::new(), 1)
}

/// Builds the backward function of a batch whose results were `ans`.
///
/// The trainable parameters of every tape are recomputed from its current
/// parameters. The cotangent passed to the returned function must hold one
/// entry per tape, each with as many elements as that tape's result.
pub fn vjp(
    ans: &[Value],
    tapes: &[Tape],
    device: Rc<dyn Device>,
    gradient_fn: GradientFn,
    cache: &ShiftCache,
    nesting: usize,
) -> Result<GradFn> {
    if ans.len() != tapes.len() {
        return Err(Error::CotangentMismatch(format!(
            "{} results for {} tapes",
            ans.len(),
            tapes.len()
        )));
    }
    let sizes: Vec<usize> = ans.iter().map(Value::len).collect();
    let mut tapes = tapes.to_vec();
    for tape in &mut tapes {
        let (trainable, _) = classify_trainable(tape);
        tape.set_trainable_params(trainable)?;
    }
    let cache = cache.clone();

    Ok(Box::new(move |dy: &[Value]| -> Result<Vec<Option<Value>>> {
        if dy.len() != tapes.len() {
            return Err(Error::CotangentMismatch(format!(
                "got {} cotangent rows for {} tapes",
                dy.len(),
                tapes.len()
            )));
        }
        for (i, (row, &size)) in dy.iter().zip(&sizes).enumerate() {
            if row.len() != size {
                return Err(Error::CotangentMismatch(format!(
                    "cotangent row {} has {} entries, tape result has {}",
                    i,
                    row.len(),
                    size
                )));
            }
        }

        let mut reshape_info = Vec::new();
        let mut gradient_tapes = Vec::new();
        let mut processing_fns: Vec<Vec<Postprocess>> = Vec::with_capacity(tapes.len());
        for tape in &tapes {
            let mut fns = Vec::with_capacity(tape.num_trainable());
            for idx in 0..tape.num_trainable() {
                let (shifted, post) = gradient_fn(tape, idx)?;
                reshape_info.push(shifted.len());
                gradient_tapes.extend(shifted);
                fns.push(post);
            }
            processing_fns.push(fns);
        }
        debug!(
            gradient_tapes = gradient_tapes.len(),
            nesting, "executing gradient tapes"
        );

        let results = if gradient_tapes.is_empty() {
            Vec::new()
        } else {
            batch_execute(
                &mut gradient_tapes,
                device.clone(),
                Some(gradient_fn.clone()),
                &cache,
                nesting + 1,
            )?
        };

        let mut grads = Vec::with_capacity(tapes.len());
        let mut cursor = 0;
        let mut groups = reshape_info.iter();
        for (t, (fns, row)) in processing_fns.iter().zip(dy).enumerate() {
            if fns.is_empty() {
                grads.push(None);
                continue;
            }
            let m = row.len();
            let mut columns = Vec::with_capacity(fns.len());
            for post in fns {
                let n = groups.next().copied().unwrap_or(0);
                let Some(chunk) = results.get(cursor..cursor + n) else {
                    return Err(Error::CotangentMismatch(format!(
                        "gradient results exhausted at tape {t}"
                    )));
                };
                cursor += n;
                let column = post(chunk)?;
                if column.len() != m {
                    return Err(Error::JacobianShape {
                        tape: t,
                        expected: m,
                        actual: column.len(),
                    });
                }
                columns.push(reshape(&column, &[m])?);
            }

            let k = columns.len();
            let jac = transpose(&reshape(&concat(&columns)?, &[k, m])?)?;
            let g = reshape(&dot(&reshape(row, &[1, m])?, &jac)?, &[k])?;
            grads.push(Some(unwrap_stale(g, nesting)));
        }
        Ok(grads)
    }))
}

/// The recorded batch primitive. Its single argument is the packed vector of
/// all tape parameters; its output is the concatenation of the flattened
/// per-tape results.
struct BatchExecute<'a> {
    tapes: RefCell<&'a mut [Tape]>,
    device: Rc<dyn Device>,
    gradient_fn: GradientFn,
    cache: ShiftCache,
    nesting: usize,
    shapes: RefCell<Vec<Vec<usize>>>,
}

impl Primitive for BatchExecute<'_> {
    fn name(&self) -> &'static str {
        "batch_execute"
    }

    fn eval(&self, _args: &[Array]) -> Result<Array> {
        let mut tapes = self.tapes.borrow_mut();
        let n = tapes.len();
        let results = {
            let scoped = tapes
                .iter_mut()
                .map(UnwrapTape::new)
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Tape> = scoped.iter().map(|s| &**s).collect();
            self.device.batch_execute(&refs)?
        };
        if results.len() != n {
            return Err(Error::Device {
                device: self.device.name().to_string(),
                message: format!("returned {} results for {} tapes", results.len(), n),
            });
        }

        *self.shapes.borrow_mut() = results.iter().map(|r| r.shape().to_vec()).collect();
        let flat: Vec<f64> = results.iter().flat_map(|r| r.iter().copied()).collect();
        Ok(Array1::from(flat).into_dyn())
    }

    fn vjp(&self, _argnum: usize, ans: &Value, args: &[Value]) -> Result<Vjp> {
        // Parameters one layer down, matching `args`
        let floor = args[0].trace();
        let mut tapes: Vec<Tape> = self.tapes.borrow().to_vec();
        for tape in &mut tapes {
            let inner: Vec<Value> = tape
                .get_parameters(false)
                .iter()
                .map(|p| peel_above(p, floor))
                .collect();
            tape.set_parameters(&inner, false)?;
        }

        let shapes = self.shapes.borrow().clone();
        let mut per_tape = Vec::with_capacity(shapes.len());
        let mut offset = 0;
        for shape in &shapes {
            let size: usize = shape.iter().product();
            per_tape.push(reshape(&slice(ans, offset, size)?, shape)?);
            offset += size;
        }

        let layout: Vec<(usize, Vec<usize>)> = tapes
            .iter()
            .map(|t| (t.num_params(), classify_trainable(t).0.into_iter().collect()))
            .collect();
        let grad_fn = vjp(
            &per_tape,
            &tapes,
            self.device.clone(),
            self.gradient_fn.clone(),
            &self.cache,
            self.nesting,
        )?;

        Ok(Rc::new(move |g: &Value| -> Result<Value> {
            let mut dy = Vec::with_capacity(shapes.len());
            let mut offset = 0;
            for shape in &shapes {
                let size: usize = shape.iter().product();
                dy.push(reshape(&slice(g, offset, size)?, shape)?);
                offset += size;
            }

            let grads = grad_fn(&dy)?;
            let mut pieces = Vec::new();
            for ((num_params, trainable), grad) in layout.iter().zip(&grads) {
                for p in 0..*num_params {
                    match (grad, trainable.iter().position(|&i| i == p)) {
                        (Some(grad), Some(pos)) => pieces.push(reshape(&index(grad, pos)?, &[1])?),
                        _ => pieces.push(Value::zeros(&[1])),
                    }
                }
            }
            if pieces.is_empty() {
                return Ok(Value::zeros(&[0]));
            }
            concat(&pieces)
        }))
    }
}
