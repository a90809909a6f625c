//! Differentiable values.

use std::fmt;
use std::rc::Rc;

use ndarray::{arr0, ArrayD, IxDyn};

use crate::error::{Error, Result};

use super::trace::{Node, TraceId};

/// Plain dense array of `f64`.
pub type Array = ArrayD<f64>;

/// An array explicitly marked as trainable (or not).
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub data: Array,
    pub requires_grad: bool,
}

impl Tensor {
    pub fn new(data: Array, requires_grad: bool) -> Self {
        Self {
            data,
            requires_grad,
        }
    }
}

/// One layer of differentiation wrapping. `value` is the previous layer,
/// which may itself be boxed by an older trace.
pub struct ArrayBox {
    pub(crate) value: Value,
    pub(crate) trace: TraceId,
    pub(crate) node: Rc<Node>,
}

impl ArrayBox {
    /// The wrapped value one layer down.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn trace(&self) -> TraceId {
        self.trace
    }
}

impl fmt::Debug for ArrayBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayBox")
            .field("trace", &self.trace)
            .field("node", &self.node.id())
            .field("value", &self.value)
            .finish()
    }
}

/// A numeric value as seen by the differentiable layer.
#[derive(Debug, Clone)]
pub enum Value {
    /// Untagged numbers
    Plain(Array),
    /// Numbers carrying an explicit trainability flag
    Tensor(Tensor),
    /// A value recorded by an open differentiation trace
    Boxed(Rc<ArrayBox>),
}

impl Value {
    pub fn scalar(x: f64) -> Self {
        Value::Plain(arr0(x).into_dyn())
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Value::Plain(ndarray::Array1::from(values).into_dyn())
    }

    /// A trainable scalar.
    pub fn trainable(x: f64) -> Self {
        Value::Tensor(Tensor::new(arr0(x).into_dyn(), true))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Value::Plain(Array::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Value::Plain(Array::ones(IxDyn(shape)))
    }

    /// Innermost numeric data, beneath every box layer.
    pub fn data(&self) -> &Array {
        let mut current = self;
        loop {
            match current {
                Value::Plain(a) => return a,
                Value::Tensor(t) => return &t.data,
                Value::Boxed(b) => current = &b.value,
            }
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data().shape().to_vec()
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single element of a one-element value.
    pub fn item(&self) -> Result<f64> {
        let data = self.data();
        if data.len() != 1 {
            return Err(Error::NonScalarOutput {
                shape: data.shape().to_vec(),
            });
        }
        Ok(data.iter().next().copied().unwrap_or_default())
    }

    pub fn is_boxed(&self) -> bool {
        matches!(self, Value::Boxed(_))
    }

    /// Trace of the outermost box layer.
    pub fn trace(&self) -> Option<TraceId> {
        match self {
            Value::Boxed(b) => Some(b.trace),
            _ => None,
        }
    }

    /// Number of box layers.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Value::Boxed(b) = current {
            depth += 1;
            current = &b.value;
        }
        depth
    }

    /// Identity comparison: same box, or equal arrays for unboxed values.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boxed(a), Value::Boxed(b)) => Rc::ptr_eq(a, b),
            (Value::Plain(a), Value::Plain(b)) => a == b,
            (Value::Tensor(a), Value::Tensor(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn boxed(value: Value, trace: TraceId, node: Rc<Node>) -> Self {
        Value::Boxed(Rc::new(ArrayBox { value, trace, node }))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::scalar(x)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Plain(a)
    }
}

impl From<ndarray::Array2<f64>> for Value {
    fn from(a: ndarray::Array2<f64>) -> Self {
        Value::Plain(a.into_dyn())
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::trace::TraceGuard;

    #[test]
    fn test_scalar_shape() {
        let v = Value::scalar(2.5);
        assert!(v.shape().is_empty());
        assert_eq!(v.item().unwrap(), 2.5);
    }

    #[test]
    fn test_item_requires_single_element() {
        let v = Value::from_vec(vec![1.0, 2.0]);
        assert!(matches!(v.item(), Err(Error::NonScalarOutput { .. })));
    }

    #[test]
    fn test_data_reaches_through_boxes() {
        let (t1, t2) = (TraceGuard::open(), TraceGuard::open());
        let inner = Value::boxed(Value::trainable(0.3), t1.id(), Node::leaf());
        let outer = Value::boxed(inner.clone(), t2.id(), Node::leaf());
        assert_eq!(outer.depth(), 2);
        assert_eq!(outer.item().unwrap(), 0.3);
        assert!(outer.ptr_eq(&outer.clone()));
        assert!(!outer.ptr_eq(&inner));
    }
}
