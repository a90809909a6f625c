//! Converting differentiable tape parameters to plain numbers.

use std::collections::BTreeSet;

use crate::autodiff::{is_active, Tensor, TraceId, Value};
use crate::tape::Tape;

/// Indices of the parameters that take part in differentiation, and the
/// parameters themselves.
///
/// A parameter is trainable when it is a [`Tensor`] with `requires_grad` set
/// or when it is boxed by a differentiation trace.
pub fn classify_trainable(tape: &Tape) -> (BTreeSet<usize>, Vec<Value>) {
    let mut trainable = BTreeSet::new();
    let params = tape.get_parameters(false);
    for (idx, value) in params.iter().enumerate() {
        let is_trainable = match value {
            Value::Tensor(t) => t.requires_grad,
            Value::Boxed(_) => true,
            Value::Plain(_) => false,
        };
        if is_trainable {
            trainable.insert(idx);
        }
    }
    (trainable, params)
}

/// Strips box layers, at most `max_depth` of them when given. A value that
/// is unwrapped all the way comes back as a plain array.
pub fn unwrap_value(value: &Value, max_depth: Option<usize>) -> Value {
    let mut current = value;
    let mut depth = 0;
    while let Value::Boxed(b) = current {
        if max_depth.is_some_and(|max| depth >= max) {
            return current.clone();
        }
        current = b.value();
        depth += 1;
    }
    match current {
        Value::Tensor(t) => Value::Plain(t.data.clone()),
        other => other.clone(),
    }
}

/// Fully unwrapped copies of `values`, in order.
pub fn to_plain_numeric(values: &[Value]) -> Vec<Value> {
    values.iter().map(|v| unwrap_value(v, None)).collect()
}

/// Strips up to `nesting` outer layers whose trace has already been closed.
/// Layers of traces that are still recording are kept.
pub(crate) fn unwrap_stale(value: Value, nesting: usize) -> Value {
    let mut current = value;
    for _ in 0..nesting {
        let inner = match &current {
            Value::Boxed(b) if !is_active(b.trace()) => b.value().clone(),
            _ => break,
        };
        current = inner;
    }
    current
}

/// Removes the layers of `value` newer than `floor` (all layers when `floor`
/// is `None`). A value that lost a layer sits on the path being
/// differentiated, so an unboxed result is marked as requiring a gradient.
pub(crate) fn peel_above(value: &Value, floor: Option<TraceId>) -> Value {
    let mut current = value;
    let mut peeled = false;
    while let Value::Boxed(b) = current {
        if Some(b.trace()) <= floor {
            break;
        }
        current = b.value();
        peeled = true;
    }
    match current {
        Value::Plain(a) if peeled => Value::Tensor(Tensor::new(a.clone(), true)),
        Value::Tensor(t) if peeled => Value::Tensor(Tensor::new(t.data.clone(), true)),
        other => other.clone(),
    }
}
