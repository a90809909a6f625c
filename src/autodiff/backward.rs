//! Backward pass and user-facing derivative operators.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ndarray::IxDyn;

use crate::error::{Error, Result};

use super::ops;
use super::trace::{Node, TraceGuard, TraceId};
use super::value::{Array, Value};

/// Propagates `seed` from `root` back through the graph and returns the
/// accumulated cotangent of node `target`, if it is reachable.
pub(crate) fn backward(root: &Rc<Node>, seed: Value, target: u64) -> Result<Option<Value>> {
    let mut order: Vec<Rc<Node>> = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        for (parent, _) in &node.parents {
            stack.push(parent.clone());
        }
        order.push(node);
    }
    // Children are always newer than their parents
    order.sort_by(|a, b| b.id().cmp(&a.id()));

    let mut cotangents: HashMap<u64, Value> = HashMap::new();
    cotangents.insert(root.id(), seed);

    for node in &order {
        let Some(g) = cotangents.get(&node.id()).cloned() else {
            continue;
        };
        for (parent, vjp) in &node.parents {
            let contribution = vjp(&g)?;
            let total = match cotangents.remove(&parent.id()) {
                Some(previous) => ops::add(&previous, &contribution)?,
                None => contribution,
            };
            cotangents.insert(parent.id(), total);
        }
    }

    Ok(cotangents.remove(&target))
}

/// Evaluates `f` on `x` boxed by a fresh trace. The trace is closed again
/// before returning.
fn trace_call<F>(f: F, x: &Value) -> Result<(Value, TraceId, Rc<Node>)>
where
    F: FnOnce(&Value) -> Result<Value>,
{
    let guard = TraceGuard::open();
    let start = Node::leaf();
    let boxed = Value::boxed(x.clone(), guard.id(), start.clone());
    let out = f(&boxed)?;
    Ok((out, guard.id(), start))
}

/// Gradient of a scalar-valued function.
///
/// The result has the shape of `x`. Calling `grad` inside a function that is
/// itself being differentiated yields a differentiable gradient, so
/// derivatives of any order can be taken by nesting.
pub fn grad<F>(f: F, x: &Value) -> Result<Value>
where
    F: FnOnce(&Value) -> Result<Value>,
{
    let (out, trace, start) = trace_call(f, x)?;
    if out.len() != 1 {
        return Err(Error::NonScalarOutput { shape: out.shape() });
    }

    match &out {
        Value::Boxed(b) if b.trace == trace => {
            let seed = Value::ones(&b.value.shape());
            let g = backward(&b.node, seed, start.id())?;
            Ok(g.unwrap_or_else(|| Value::zeros(&x.shape())))
        }
        _ => Ok(Value::zeros(&x.shape())),
    }
}

/// Jacobian of `f` at `x`, shaped `out_shape ++ in_shape`.
pub fn jacobian<F>(f: F, x: &Value) -> Result<Value>
where
    F: FnOnce(&Value) -> Result<Value>,
{
    let (out, trace, start) = trace_call(f, x)?;
    let out_shape = out.shape();
    let in_shape = x.shape();
    let mut full_shape = out_shape.clone();
    full_shape.extend_from_slice(&in_shape);

    let node = match &out {
        Value::Boxed(b) if b.trace == trace => b.node.clone(),
        _ => return Ok(Value::zeros(&full_shape)),
    };

    let mut rows = Vec::with_capacity(out.len());
    for i in 0..out.len() {
        let mut seed = Array::zeros(IxDyn(&out_shape));
        if let Some(e) = seed.iter_mut().nth(i) {
            *e = 1.0;
        }
        let row = backward(&node, Value::Plain(seed), start.id())?;
        rows.push(row.unwrap_or_else(|| Value::zeros(&in_shape)));
    }
    if rows.is_empty() {
        return Ok(Value::zeros(&full_shape));
    }

    ops::reshape(&ops::concat(&rows)?, &full_shape)
}
