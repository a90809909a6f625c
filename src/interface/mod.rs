//! Differentiable execution of tapes on devices that only take plain numbers.

mod execute;
mod scope;
mod unwrap;

pub use execute::{batch_execute, execute, vjp, GradFn};
pub use scope::UnwrapTape;
pub use unwrap::{classify_trainable, to_plain_numeric, unwrap_value};
