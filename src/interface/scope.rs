//! Scoped unwrapping of a single tape.

use std::collections::BTreeSet;
use std::mem;
use std::ops::Deref;

use crate::autodiff::Value;
use crate::error::{Error, Result};
use crate::tape::Tape;

use super::unwrap::{classify_trainable, to_plain_numeric};

/// Holds a tape with every parameter replaced by its plain numeric value
/// and `trainable_params` set to the classified trainable indices.
///
/// The original parameters and trainable set are put back when the guard is
/// dropped, whichever way the enclosing code exits.
pub struct UnwrapTape<'a> {
    tape: &'a mut Tape,
    params: Vec<Value>,
    trainable: BTreeSet<usize>,
}

impl<'a> UnwrapTape<'a> {
    pub fn new(tape: &'a mut Tape) -> Result<Self> {
        let previous = tape.trainable_params().clone();
        let (trainable, params) = classify_trainable(tape);
        let plain = to_plain_numeric(&params);

        let guard = Self {
            tape,
            params,
            trainable: previous,
        };
        if let Some(index) = plain.iter().position(|p| p.len() != 1) {
            return Err(Error::Type(format!(
                "parameter {} has shape {:?}; tapes take scalar parameters",
                index,
                plain[index].shape()
            )));
        }
        guard.tape.set_parameters(&plain, false)?;
        guard.tape.set_trainable_params(trainable)?;
        Ok(guard)
    }

    /// Parameters as they were before unwrapping.
    pub fn original_parameters(&self) -> &[Value] {
        &self.params
    }
}

impl Deref for UnwrapTape<'_> {
    type Target = Tape;

    fn deref(&self) -> &Tape {
        self.tape
    }
}

impl Drop for UnwrapTape<'_> {
    fn drop(&mut self) {
        let trainable = mem::take(&mut self.trainable);
        self.tape.restore(&self.params, trainable);
    }
}
