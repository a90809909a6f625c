//! # qhf
//!
//! Differentiable batch execution of parameterized quantum tapes, and a
//! Hartree-Fock solver that can be differentiated with respect to nuclear
//! coordinates and basis parameters.
//!
//! ## Modules
//!
//! - `autodiff`: reverse-mode differentiation over nested traces
//! - `tape`, `device`, `gradients`: tapes, a state-vector simulator and the parameter-shift rule
//! - `interface`: unwrapping of differentiable parameters and the batch executor with its VJP
//! - `dual`, `linalg`: forward-mode scalars and linear algebra generic over them
//! - `molecule`, `basis`, `basis_data`, `integrals`: molecular input and Gaussian basis integrals
//! - `scf`: Self-Consistent Field (Hartree-Fock) implementation

pub mod autodiff;
pub mod basis;
pub mod basis_data;
pub mod device;
pub mod dual;
pub mod error;
pub mod gradients;
pub mod integrals;
pub mod interface;
pub mod linalg;
pub mod molecule;
pub mod scf;
pub mod tape;

/// Re-export commonly used types
pub use autodiff::{grad, jacobian, Tensor, Value};
pub use device::{DefaultQubit, Device};
pub use error::{Error, Result};
pub use gradients::{param_shift, GradientFn, ShiftCache};
pub use interface::{batch_execute, execute};
pub use linalg::{Matrix, Vector};
pub use molecule::{Molecule, MoleculeOptions};
pub use scf::{
    generate_hartree_fock, hf_energy, hf_energy_derivative, hf_energy_gradient, nuclear_energy,
    Parameter, ScfOptions, ScfSolution,
};
pub use tape::{Gate, Measurement, Operation, Tape};
