//! Reverse-mode automatic differentiation over dynamically shaped arrays.
//!
//! Values flowing through differentiable code are [`Value`]s: plain arrays,
//! [`Tensor`]s carrying an explicit `requires_grad` flag, or [`ArrayBox`]es
//! recorded by an open differentiation trace. Nested calls to [`grad`] or
//! [`jacobian`] wrap values in one box layer per order, which is how higher
//! derivatives are obtained.
//!
//! New operations plug in through the [`Primitive`] trait and [`apply`].

mod backward;
pub mod ops;
pub mod trace;
mod value;

pub use backward::{grad, jacobian};
pub use ops::{apply, Primitive};
pub use trace::{is_active, TraceGuard, TraceId, Vjp};
pub use value::{Array, ArrayBox, Tensor, Value};
