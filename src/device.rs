//! Devices that execute tapes.

use std::cell::Cell;

use ndarray::{arr0, Array1, IxDyn};
use num_complex::Complex64;

use crate::autodiff::{Array, Value};
use crate::error::{Error, Result};
use crate::tape::{Gate, Measurement, Tape};

/// Executes batches of tapes on plain numbers.
pub trait Device {
    fn name(&self) -> &str;

    /// One result per tape, in tape order.
    fn batch_execute(&self, tapes: &[&Tape]) -> Result<Vec<Array>>;
}

/// State-vector simulator. Wire 0 is the most significant bit of a basis
/// index.
#[derive(Debug)]
pub struct DefaultQubit {
    wires: usize,
    executions: Cell<usize>,
}

impl DefaultQubit {
    pub fn new(wires: usize) -> Self {
        Self {
            wires,
            executions: Cell::new(0),
        }
    }

    pub fn wires(&self) -> usize {
        self.wires
    }

    /// Number of `batch_execute` calls served so far.
    pub fn num_executions(&self) -> usize {
        self.executions.get()
    }

    fn error(&self, message: String) -> Error {
        Error::Device {
            device: self.name().to_string(),
            message,
        }
    }

    fn check_wires(&self, wires: &[usize]) -> Result<()> {
        match wires.iter().find(|&&w| w >= self.wires) {
            Some(w) => Err(self.error(format!(
                "wire {} is outside the {} available wires",
                w, self.wires
            ))),
            None => Ok(()),
        }
    }

    fn mask(&self, wire: usize) -> usize {
        1 << (self.wires - 1 - wire)
    }

    fn angle(value: &Value) -> Result<f64> {
        if value.is_boxed() {
            return Err(Error::Type(
                "device received a differentiable parameter; unwrap the tape first".to_string(),
            ));
        }
        value.item()
    }

    fn apply_single(&self, state: &mut [Complex64], wire: usize, u: [[Complex64; 2]; 2]) {
        let mask = self.mask(wire);
        for i0 in (0..state.len()).filter(|i| i & mask == 0) {
            let i1 = i0 | mask;
            let (a, b) = (state[i0], state[i1]);
            state[i0] = u[0][0] * a + u[0][1] * b;
            state[i1] = u[1][0] * a + u[1][1] * b;
        }
    }

    fn apply_cnot(&self, state: &mut [Complex64], control: usize, target: usize) {
        let (c, t) = (self.mask(control), self.mask(target));
        for i in (0..state.len()).filter(|i| i & c != 0 && i & t == 0) {
            state.swap(i, i | t);
        }
    }

    fn simulate(&self, tape: &Tape) -> Result<Vec<Complex64>> {
        let zero = Complex64::new(0.0, 0.0);
        let mut state = vec![zero; 1 << self.wires];
        state[0] = Complex64::new(1.0, 0.0);

        for op in &tape.operations {
            self.check_wires(&op.wires)?;
            let theta = match op.params.first() {
                Some(p) => Self::angle(p)?,
                None => 0.0,
            };
            let (c, s) = ((theta / 2.0).cos(), (theta / 2.0).sin());
            let re = |x: f64| Complex64::new(x, 0.0);
            let im = |x: f64| Complex64::new(0.0, x);

            let wire = op.wires[0];
            match op.gate {
                Gate::RX => self.apply_single(&mut state, wire, [[re(c), im(-s)], [im(-s), re(c)]]),
                Gate::RY => self.apply_single(&mut state, wire, [[re(c), re(-s)], [re(s), re(c)]]),
                Gate::RZ => {
                    let (minus, plus) = (Complex64::new(c, -s), Complex64::new(c, s));
                    self.apply_single(&mut state, wire, [[minus, zero], [zero, plus]])
                }
                Gate::Hadamard => {
                    let h = re(std::f64::consts::FRAC_1_SQRT_2);
                    self.apply_single(&mut state, wire, [[h, h], [h, -h]])
                }
                Gate::PauliX => {
                    let one = re(1.0);
                    self.apply_single(&mut state, wire, [[zero, one], [one, zero]])
                }
                Gate::CNOT => self.apply_cnot(&mut state, op.wires[0], op.wires[1]),
            }
        }
        Ok(state)
    }

    fn measure(&self, state: &[Complex64], measurement: &Measurement) -> Result<Vec<f64>> {
        self.check_wires(&measurement.wires())?;
        match measurement {
            Measurement::Expval { wire } => {
                let mask = self.mask(*wire);
                let z: f64 = state
                    .iter()
                    .enumerate()
                    .map(|(i, a)| if i & mask == 0 { a.norm_sqr() } else { -a.norm_sqr() })
                    .sum();
                Ok(vec![z])
            }
            Measurement::Probs { wires } => {
                let mut probs = vec![0.0; 1 << wires.len()];
                for (i, a) in state.iter().enumerate() {
                    let outcome = wires
                        .iter()
                        .fold(0, |acc, &w| (acc << 1) | usize::from(i & self.mask(w) != 0));
                    probs[outcome] += a.norm_sqr();
                }
                Ok(probs)
            }
        }
    }

    fn execute(&self, tape: &Tape) -> Result<Array> {
        let state = self.simulate(tape)?;
        let mut values = Vec::with_capacity(tape.output_size());
        for m in &tape.measurements {
            values.extend(self.measure(&state, m)?);
        }

        let shape = tape.output_shape();
        if shape.is_empty() {
            return Ok(arr0(values[0]).into_dyn());
        }
        Array1::from(values)
            .into_shape(IxDyn(&shape))
            .map_err(|e| self.error(e.to_string()))
    }
}

impl Device for DefaultQubit {
    fn name(&self) -> &str {
        "default.qubit"
    }

    fn batch_execute(&self, tapes: &[&Tape]) -> Result<Vec<Array>> {
        self.executions.set(self.executions.get() + 1);
        tapes.iter().map(|tape| self.execute(tape)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::grad;
    use crate::tape::Operation;
    use approx::assert_abs_diff_eq;

    fn run(tape: &Tape, wires: usize) -> Array {
        let dev = DefaultQubit::new(wires);
        dev.batch_execute(&[tape]).unwrap().remove(0)
    }

    #[test]
    fn test_rotation_expectations() {
        let tape = Tape::new(
            vec![
                Operation::rotation(Gate::RX, 0.4, 0).unwrap(),
                Operation::rotation(Gate::RY, 0.9, 0).unwrap(),
            ],
            vec![Measurement::Expval { wire: 0 }],
        );
        let out = run(&tape, 1);
        assert!(out.shape().is_empty());
        assert_abs_diff_eq!(out.sum(), 0.4f64.cos() * 0.9f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_bell_state_probabilities() {
        let tape = Tape::new(
            vec![
                Operation::fixed(Gate::Hadamard, vec![0]).unwrap(),
                Operation::fixed(Gate::CNOT, vec![0, 1]).unwrap(),
            ],
            vec![Measurement::Probs { wires: vec![0, 1] }],
        );
        let probs: Vec<f64> = run(&tape, 2).iter().copied().collect();
        assert_abs_diff_eq!(probs[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(probs[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs[3], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_wire_order_is_big_endian() {
        let tape = Tape::new(
            vec![Operation::fixed(Gate::PauliX, vec![1]).unwrap()],
            vec![Measurement::Probs { wires: vec![0, 1] }],
        );
        let probs: Vec<f64> = run(&tape, 2).iter().copied().collect();
        assert_eq!(probs, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rz_leaves_populations() {
        let tape = Tape::new(
            vec![
                Operation::fixed(Gate::Hadamard, vec![0]).unwrap(),
                Operation::rotation(Gate::RZ, 0.7, 0).unwrap(),
                Operation::fixed(Gate::Hadamard, vec![0]).unwrap(),
            ],
            vec![Measurement::Expval { wire: 0 }],
        );
        assert_abs_diff_eq!(run(&tape, 1).sum(), 0.7f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_unknown_wire() {
        let tape = Tape::new(
            vec![Operation::rotation(Gate::RX, 0.1, 3).unwrap()],
            vec![Measurement::Expval { wire: 0 }],
        );
        let dev = DefaultQubit::new(2);
        assert!(matches!(dev.batch_execute(&[&tape]), Err(Error::Device { .. })));
        assert_eq!(dev.num_executions(), 1);
    }

    #[test]
    fn test_rejects_boxed_parameters() {
        let dev = DefaultQubit::new(1);
        let result = grad(
            |x| {
                let tape = Tape::new(
                    vec![Operation::rotation(Gate::RX, x.clone(), 0)?],
                    vec![Measurement::Expval { wire: 0 }],
                );
                dev.batch_execute(&[&tape])?;
                Ok(x.clone())
            },
            &Value::scalar(0.1),
        );
        assert!(matches!(result, Err(Error::Type(_))));
    }
}
