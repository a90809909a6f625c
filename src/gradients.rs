//! Gradient tape generation.
//!
//! A [`GradientFn`] turns one trainable parameter of a tape into a batch of
//! shifted tapes plus a post-processing function that reduces their results
//! to one Jacobian column.

use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::rc::Rc;

use tracing::debug;

use crate::autodiff::ops::{add_scalar, scale, sub};
use crate::autodiff::Value;
use crate::error::{Error, Result};
use crate::tape::{Gate, Tape};

/// Reduces the results of the shifted tapes to a Jacobian column.
pub type Postprocess = Box<dyn Fn(&[Value]) -> Result<Value>>;

/// `(tape, index into the tape's trainable parameters) -> (tapes, postprocess)`
pub type GradientFn = Rc<dyn Fn(&Tape, usize) -> Result<(Vec<Tape>, Postprocess)>>;

/// Two-term shift rule: `∂f = coefficient * (f(θ + shift) - f(θ - shift))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftRule {
    pub shift: f64,
    pub coefficient: f64,
}

impl ShiftRule {
    fn for_gate(gate: Gate) -> Result<Self> {
        match gate {
            Gate::RX | Gate::RY | Gate::RZ => Ok(Self {
                shift: FRAC_PI_2,
                coefficient: 0.5,
            }),
            other => Err(Error::UnsupportedGate(other.name().to_string())),
        }
    }
}

/// Shift rules by gate name, filled in on first use. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct ShiftCache(Rc<RefCell<HashMap<&'static str, ShiftRule>>>);

impl ShiftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_for(&self, gate: Gate) -> Result<ShiftRule> {
        if let Some(rule) = self.0.borrow().get(gate.name()) {
            return Ok(*rule);
        }
        let rule = ShiftRule::for_gate(gate)?;
        self.0.borrow_mut().insert(gate.name(), rule);
        Ok(rule)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Parameter-shift gradient rule backed by `cache`.
///
/// Shifted parameters are computed with differentiable arithmetic, so the
/// generated tapes stay connected to any open differentiation trace.
pub fn param_shift(cache: &ShiftCache) -> GradientFn {
    let cache = cache.clone();
    Rc::new(move |tape: &Tape, idx: usize| -> Result<(Vec<Tape>, Postprocess)> {
        let len = tape.num_trainable();
        let param = *tape
            .trainable_params()
            .iter()
            .nth(idx)
            .ok_or(Error::ParameterIndex { index: idx, len })?;
        let (op, _) = tape.par_info(param)?;
        let rule = cache.rule_for(tape.operations[op].gate)?;

        let params = tape.get_parameters(false);
        let mut shifted = Vec::with_capacity(2);
        for sign in [1.0, -1.0] {
            let mut values = params.clone();
            values[param] = add_scalar(&params[param], sign * rule.shift)?;
            let mut t = tape.clone();
            t.set_parameters(&values, false)?;
            shifted.push(t);
        }
        debug!(param, shift = rule.shift, "generated parameter-shift tapes");

        let coefficient = rule.coefficient;
        let postprocess: Postprocess = Box::new(move |results: &[Value]| match results {
            [plus, minus] => scale(&sub(plus, minus)?, coefficient),
            other => Err(Error::CotangentMismatch(format!(
                "parameter-shift expects 2 results, got {}",
                other.len()
            ))),
        });
        Ok((shifted, postprocess))
    })
}
