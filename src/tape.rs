//! Quantum tapes: recorded operations, their parameters and measurements.
//!
//! Parameters are addressed by a flat index running over the operations in
//! order. A tape also owns the set of indices that participate in
//! differentiation (`trainable_params`).

use std::collections::BTreeSet;

use crate::autodiff::Value;
use crate::error::{Error, Result};

/// Supported gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    RX,
    RY,
    RZ,
    Hadamard,
    PauliX,
    CNOT,
}

impl Gate {
    pub fn name(&self) -> &'static str {
        match self {
            Gate::RX => "RX",
            Gate::RY => "RY",
            Gate::RZ => "RZ",
            Gate::Hadamard => "Hadamard",
            Gate::PauliX => "PauliX",
            Gate::CNOT => "CNOT",
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            Gate::RX | Gate::RY | Gate::RZ => 1,
            Gate::Hadamard | Gate::PauliX | Gate::CNOT => 0,
        }
    }

    pub fn num_wires(&self) -> usize {
        match self {
            Gate::CNOT => 2,
            _ => 1,
        }
    }
}

/// A gate applied to wires with its parameters.
#[derive(Debug, Clone)]
pub struct Operation {
    pub gate: Gate,
    pub params: Vec<Value>,
    pub wires: Vec<usize>,
}

impl Operation {
    pub fn new(gate: Gate, params: Vec<Value>, wires: Vec<usize>) -> Result<Self> {
        if params.len() != gate.num_params() {
            return Err(Error::ParameterCount {
                expected: gate.num_params(),
                actual: params.len(),
            });
        }
        if wires.len() != gate.num_wires() {
            return Err(Error::WireCount {
                gate: gate.name(),
                expected: gate.num_wires(),
                actual: wires,
            });
        }
        Ok(Self {
            gate,
            params,
            wires,
        })
    }

    /// Parameter-free gate.
    pub fn fixed(gate: Gate, wires: Vec<usize>) -> Result<Self> {
        Self::new(gate, Vec::new(), wires)
    }

    /// One-parameter rotation on a single wire.
    pub fn rotation(gate: Gate, param: impl Into<Value>, wire: usize) -> Result<Self> {
        Self::new(gate, vec![param.into()], vec![wire])
    }
}

/// What a tape returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measurement {
    /// Expectation value of Pauli Z on `wire`.
    Expval { wire: usize },
    /// Computational-basis probabilities of `wires`.
    Probs { wires: Vec<usize> },
}

impl Measurement {
    pub fn size(&self) -> usize {
        match self {
            Measurement::Expval { .. } => 1,
            Measurement::Probs { wires } => 1 << wires.len(),
        }
    }

    pub fn wires(&self) -> Vec<usize> {
        match self {
            Measurement::Expval { wire } => vec![*wire],
            Measurement::Probs { wires } => wires.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tape {
    pub operations: Vec<Operation>,
    pub measurements: Vec<Measurement>,
    trainable_params: BTreeSet<usize>,
}

impl Tape {
    /// Every parameter starts out trainable.
    pub fn new(operations: Vec<Operation>, measurements: Vec<Measurement>) -> Self {
        let n: usize = operations.iter().map(|op| op.params.len()).sum();
        Self {
            operations,
            measurements,
            trainable_params: (0..n).collect(),
        }
    }

    pub fn num_params(&self) -> usize {
        self.operations.iter().map(|op| op.params.len()).sum()
    }

    /// Maps a flat parameter index to `(operation index, index within the
    /// operation)`.
    pub fn par_info(&self, idx: usize) -> Result<(usize, usize)> {
        let mut offset = 0;
        for (op_idx, op) in self.operations.iter().enumerate() {
            if idx < offset + op.params.len() {
                return Ok((op_idx, idx - offset));
            }
            offset += op.params.len();
        }
        Err(Error::ParameterIndex {
            index: idx,
            len: offset,
        })
    }

    /// Parameter at flat index `idx`.
    pub fn parameter(&self, idx: usize) -> Result<&Value> {
        let (op, p) = self.par_info(idx)?;
        Ok(&self.operations[op].params[p])
    }

    pub fn trainable_params(&self) -> &BTreeSet<usize> {
        &self.trainable_params
    }

    pub fn num_trainable(&self) -> usize {
        self.trainable_params.len()
    }

    pub fn set_trainable_params(&mut self, trainable: BTreeSet<usize>) -> Result<()> {
        let len = self.num_params();
        if let Some(&index) = trainable.iter().find(|&&i| i >= len) {
            return Err(Error::ParameterIndex { index, len });
        }
        self.trainable_params = trainable;
        Ok(())
    }

    /// All parameters in flat order, or only the trainable ones.
    pub fn get_parameters(&self, trainable_only: bool) -> Vec<Value> {
        self.operations
            .iter()
            .flat_map(|op| op.params.iter())
            .enumerate()
            .filter(|(i, _)| !trainable_only || self.trainable_params.contains(i))
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Overwrites all parameters, or only the trainable ones (in trainable
    /// index order).
    pub fn set_parameters(&mut self, values: &[Value], trainable_only: bool) -> Result<()> {
        let expected = if trainable_only {
            self.trainable_params.len()
        } else {
            self.num_params()
        };
        if values.len() != expected {
            return Err(Error::ParameterCount {
                expected,
                actual: values.len(),
            });
        }

        let trainable = &self.trainable_params;
        let slots = self
            .operations
            .iter_mut()
            .flat_map(|op| op.params.iter_mut())
            .enumerate()
            .filter(|(i, _)| !trainable_only || trainable.contains(i));
        for ((_, slot), value) in slots.zip(values) {
            *slot = value.clone();
        }
        Ok(())
    }

    /// Puts back a parameter list and trainable set taken from this tape.
    pub(crate) fn restore(&mut self, params: &[Value], trainable: BTreeSet<usize>) {
        let slots = self.operations.iter_mut().flat_map(|op| op.params.iter_mut());
        for (slot, value) in slots.zip(params) {
            *slot = value.clone();
        }
        self.trainable_params = trainable;
    }

    /// Number of wires touched by operations or measurements.
    pub fn num_wires(&self) -> usize {
        let ops = self.operations.iter().flat_map(|op| op.wires.iter().copied());
        let meas = self.measurements.iter().flat_map(|m| m.wires());
        ops.chain(meas).max().map_or(0, |w| w + 1)
    }

    /// Shape of the device result for this tape.
    pub fn output_shape(&self) -> Vec<usize> {
        match self.measurements.as_slice() {
            [Measurement::Expval { .. }] => Vec::new(),
            [single] => vec![single.size()],
            many => vec![many.iter().map(Measurement::size).sum()],
        }
    }

    pub fn output_size(&self) -> usize {
        self.measurements.iter().map(Measurement::size).sum()
    }
}
