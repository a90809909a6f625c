//! Error types for qhf.

use thiserror::Error;

/// Errors raised by the batch executor, the autodiff engine and the
/// Hartree-Fock engine.
#[derive(Debug, Error)]
pub enum Error {
    /// `batch_execute` was called without any tapes.
    #[error("cannot execute an empty batch of tapes")]
    EmptyBatch,

    /// Operand shapes are incompatible for an elementwise or contraction op.
    #[error("shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    /// `grad` requires a function with a single-element output.
    #[error("grad requires a scalar output, got shape {shape:?}")]
    NonScalarOutput { shape: Vec<usize> },

    /// A tape parameter holds more than one element.
    #[error("tape {tape} parameter {index} is not a scalar (shape {shape:?})")]
    NonScalarParameter {
        tape: usize,
        index: usize,
        shape: Vec<usize>,
    },

    /// Parameter index outside the tape's parameter range.
    #[error("parameter index {index} out of range for tape with {len} parameters")]
    ParameterIndex { index: usize, len: usize },

    /// Wrong number of values passed to `set_parameters`.
    #[error("expected {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    /// An operation was built with the wrong number of wires for its gate.
    #[error("{gate} acts on {expected} wire(s), got {actual:?}")]
    WireCount {
        gate: &'static str,
        expected: usize,
        actual: Vec<usize>,
    },

    /// The upstream gradient does not line up with the executed tapes.
    #[error("cotangent mismatch: {0}")]
    CotangentMismatch(String),

    /// A post-processing function produced a Jacobian column of the wrong size.
    #[error("jacobian column for tape {tape} has {actual} entries, expected {expected}")]
    JacobianShape {
        tape: usize,
        expected: usize,
        actual: usize,
    },

    /// No shift rule exists for the gate owning a trainable parameter.
    #[error("gate {0} has no parameter-shift rule")]
    UnsupportedGate(String),

    /// A differentiable wrapper reached code that only accepts plain numbers.
    #[error("type error: {0}")]
    Type(String),

    /// Error raised by a device while executing tapes.
    #[error("device {device}: {message}")]
    Device { device: String, message: String },

    /// Requested basis set is not available.
    #[error("Currently, the only supported basis set is 'sto-3g', got '{0}'.")]
    UnsupportedBasis(String),

    /// One or more atomic symbols have no basis data.
    #[error("Atoms in {0:?} are not supported.")]
    UnsupportedSymbols(Vec<String>),

    /// Coordinates do not match the list of atomic symbols.
    #[error("coordinates must have shape ({atoms}, 3), got {shape:?}")]
    Geometry { atoms: usize, shape: Vec<usize> },

    /// Restricted Hartree-Fock needs a closed-shell electron configuration.
    #[error("closed-shell system required, got {n_electrons} electrons with multiplicity {mult}")]
    OpenShell { n_electrons: i64, mult: u32 },

    /// Index outside the basis set or orbital range.
    #[error("orbital index {index} out of range for {len} orbitals")]
    OrbitalIndex { index: usize, len: usize },

    /// The bundled basis data could not be parsed.
    #[error("invalid basis data: {0}")]
    BasisData(#[from] serde_json::Error),

    /// Matrix routine called with an unsuitable matrix.
    #[error("linear algebra error: {0}")]
    Linalg(String),

    /// A primitive was asked for a derivative order it does not provide.
    #[error("{0} supports first-order differentiation only")]
    HigherOrderUnsupported(&'static str),
}

/// Result type for qhf operations.
pub type Result<T> = std::result::Result<T, Error>;
