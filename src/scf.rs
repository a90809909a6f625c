//! Self-Consistent Field (Hartree-Fock) implementation
//!
//! Restricted closed-shell Hartree-Fock in the Roothaan-Hall formulation.
//! The iteration is written once over [`Real`], so the same code produces
//! energies with `f64` and exact directional derivatives with [`Dual`]
//! numbers. [`hf_energy`] exposes the total energy to the reverse-mode
//! engine as a differentiable function of the nuclear coordinates.

use std::rc::Rc;

use ndarray::{arr0, Array2, Array4, ArrayView2, Ix2};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::autodiff::ops::{add, div, mul, row, sqrt, sub, sum};
use crate::autodiff::{apply, Array, Primitive, Value, Vjp};
use crate::basis::{BasisSet, Shell};
use crate::dual::{Dual, Real};
use crate::error::{Error, Result};
use crate::linalg::{
    self, eigh, frobenius_norm, inverse_sqrt, matmul, trace, transpose, Matrix, Vector,
};
use crate::molecule::Molecule;

/// SCF iteration controls.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScfOptions {
    /// Maximum number of Fock builds
    pub n_steps: usize,
    /// Convergence threshold on the change of the density matrix
    pub tol: f64,
}

impl Default for ScfOptions {
    fn default() -> Self {
        Self {
            n_steps: 50,
            tol: 1e-8,
        }
    }
}

/// An input the energy can be differentiated with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Cartesian component `axis` of nucleus `atom`
    Coordinate { atom: usize, axis: usize },
    /// Exponent of one primitive of basis function `basis`
    Exponent { basis: usize, primitive: usize },
    /// Contraction coefficient of one primitive of basis function `basis`
    Coefficient { basis: usize, primitive: usize },
}

/// Converged (or last) SCF quantities.
#[derive(Debug, Clone)]
pub struct ScfSolution {
    /// Eigenvalues of the Fock matrix, ascending
    pub orbital_energies: Vector,
    /// Molecular orbital coefficients, one column per orbital
    pub coefficients: Matrix,
    pub fock_matrix: Matrix,
    pub core_hamiltonian: Matrix,
    /// Electron repulsion integrals `(pq|rs)` in chemists' notation
    pub repulsion_tensor: Array4<f64>,
    pub density_matrix: Matrix,
    /// Total energy (electronic + nuclear) in Hartree
    pub energy: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl ScfSolution {
    /// Returns a function evaluating molecular orbital `i` at a point.
    pub fn molecular_orbital(&self, mol: &Molecule, i: usize) -> Result<impl Fn([f64; 3]) -> f64> {
        if i >= self.coefficients.ncols() {
            return Err(Error::OrbitalIndex {
                index: i,
                len: self.coefficients.ncols(),
            });
        }
        let column: Vec<f64> = self.coefficients.column(i).to_vec();
        let functions = mol.basis_set();
        Ok(move |point: [f64; 3]| {
            column
                .iter()
                .zip(&functions)
                .map(|(c, f)| c * f.evaluate(point))
                .sum::<f64>()
        })
    }
}

struct ScfState<T> {
    orbital_energies: Vector<T>,
    coefficients: Matrix<T>,
    fock: Matrix<T>,
    core: Matrix<T>,
    eri: Array4<T>,
    density: Matrix<T>,
    energy: T,
    iterations: usize,
    converged: bool,
}

impl ScfState<f64> {
    fn into_solution(self) -> ScfSolution {
        ScfSolution {
            orbital_energies: self.orbital_energies,
            coefficients: self.coefficients,
            fock_matrix: self.fock,
            core_hamiltonian: self.core,
            repulsion_tensor: self.eri,
            density_matrix: self.density,
            energy: self.energy,
            iterations: self.iterations,
            converged: self.converged,
        }
    }
}

/// Shells and nuclear positions of `mol` at `coordinates`, with every
/// differentiable input passed through `lift`.
fn build_inputs<T: Real>(
    mol: &Molecule,
    coordinates: ArrayView2<f64>,
    lift: &impl Fn(Parameter, f64) -> T,
) -> (Vec<Shell<T>>, Vec<[T; 3]>) {
    let nuclei: Vec<[T; 3]> = (0..mol.n_atoms())
        .map(|atom| {
            [0, 1, 2].map(|axis| {
                lift(Parameter::Coordinate { atom, axis }, coordinates[[atom, axis]])
            })
        })
        .collect();

    let shells = (0..mol.n_orbitals)
        .map(|basis| {
            let alpha: Vec<T> = mol.alpha[basis]
                .iter()
                .enumerate()
                .map(|(primitive, &a)| lift(Parameter::Exponent { basis, primitive }, a))
                .collect();
            let coeff: Vec<T> = mol.coeff[basis]
                .iter()
                .enumerate()
                .map(|(primitive, &c)| lift(Parameter::Coefficient { basis, primitive }, c))
                .collect();
            Shell::new(mol.l[basis], &alpha, &coeff, nuclei[mol.basis_owner(basis)])
        })
        .collect();

    (shells, nuclei)
}

fn nuclear_repulsion<T: Real>(charges: &[u32], nuclei: &[[T; 3]]) -> T {
    let mut energy = T::zero();
    for i in 0..nuclei.len() {
        for j in (i + 1)..nuclei.len() {
            let d2 = (0..3).fold(T::zero(), |acc, k| {
                let d = nuclei[i][k] - nuclei[j][k];
                acc + d * d
            });
            energy += T::from_f64((charges[i] * charges[j]) as f64) / d2.sqrt();
        }
    }
    energy
}

/// `P = C_occ C_occᵀ`
fn density<T: Real>(c: &Matrix<T>, n_occ: usize) -> Matrix<T> {
    let n = c.nrows();
    Array2::from_shape_fn((n, n), |(p, q)| {
        (0..n_occ).fold(T::zero(), |acc, k| acc + c[[p, k]] * c[[q, k]])
    })
}

/// `F = H + 2J - K`
fn fock<T: Real>(h: &Matrix<T>, eri: &Array4<T>, p: &Matrix<T>) -> Matrix<T> {
    let n = h.nrows();
    let two = T::from_f64(2.0);
    Array2::from_shape_fn((n, n), |(a, b)| {
        let mut j = T::zero();
        let mut k = T::zero();
        for r in 0..n {
            for s in 0..n {
                j += eri[[a, b, r, s]] * p[[r, s]];
                k += eri[[a, s, b, r]] * p[[r, s]];
            }
        }
        h[[a, b]] + two * j - k
    })
}

fn density_change<T: Real>(new: &Matrix<T>, old: &Matrix<T>) -> f64 {
    frobenius_norm(&Array2::from_shape_fn(new.dim(), |idx| new[idx] - old[idx]))
}

fn run_scf<T: Real>(
    mol: &Molecule,
    coordinates: ArrayView2<f64>,
    options: &ScfOptions,
    lift: impl Fn(Parameter, f64) -> T,
) -> Result<ScfState<T>> {
    mol.require_closed_shell()?;
    let n_occ = mol.num_occupied();

    let (shells, nuclei) = build_inputs(mol, coordinates, &lift);
    let basis = BasisSet::new(shells);
    let overlap = basis.overlap_matrix();
    let core = basis.core_hamiltonian(&mol.nuclear_charges, &nuclei);
    let eri = basis.repulsion_tensor();
    let x = inverse_sqrt(&overlap)?;
    let xt = transpose(&x);

    // Roothaan-Hall in the orthogonalized basis
    let solve = |f: &Matrix<T>| -> Result<(Vector<T>, Matrix<T>)> {
        let (w, v) = eigh(&matmul(&xt, &matmul(f, &x)))?;
        Ok((w, matmul(&x, &v)))
    };

    let (mut orbital_energies, mut coefficients) = solve(&core)?;
    let mut p = density(&coefficients, n_occ);
    let mut f = core.clone();
    let mut iterations = 0;
    let mut converged = false;

    for step in 1..=options.n_steps {
        iterations = step;
        f = fock(&core, &eri, &p);
        (orbital_energies, coefficients) = solve(&f)?;
        let p_new = density(&coefficients, n_occ);
        let delta = density_change(&p_new, &p);
        debug!(iteration = step, delta, "scf iteration");
        if delta <= options.tol {
            converged = true;
            break;
        }
        p = p_new;
    }

    let p = density(&coefficients, n_occ);
    let electronic = trace(&matmul(&linalg::add(&f, &core), &p));
    let energy = electronic + nuclear_repulsion(&mol.nuclear_charges, &nuclei);

    if converged {
        info!(iterations, energy = energy.re(), "scf converged");
    } else {
        warn!(n_steps = options.n_steps, energy = energy.re(), "scf did not converge");
    }

    Ok(ScfState {
        orbital_energies,
        coefficients,
        fock: f,
        core,
        eri,
        density: p,
        energy,
        iterations,
        converged,
    })
}

/// Returns a function that runs the SCF for `mol`.
pub fn generate_hartree_fock(mol: &Molecule) -> impl Fn() -> Result<ScfSolution> + '_ {
    generate_hartree_fock_with_options(mol, ScfOptions::default())
}

pub fn generate_hartree_fock_with_options(
    mol: &Molecule,
    options: ScfOptions,
) -> impl Fn() -> Result<ScfSolution> + '_ {
    move || {
        run_scf(mol, mol.coordinates.view(), &options, |_, x| x).map(ScfState::into_solution)
    }
}

fn geometry<'a>(mol: &Molecule, coordinates: &'a Array) -> Result<ArrayView2<'a, f64>> {
    let err = || Error::Geometry {
        atoms: mol.n_atoms(),
        shape: coordinates.shape().to_vec(),
    };
    let view = coordinates.view().into_dimensionality::<Ix2>().map_err(|_| err())?;
    if view.dim() != (mol.n_atoms(), 3) {
        return Err(err());
    }
    Ok(view)
}

/// Copy of `mol` with the [`hf_energy`] inputs in place: coordinates, then
/// optionally the exponent and coefficient tables.
fn configured(mol: &Molecule, inputs: &[&Array]) -> Result<Molecule> {
    let mut configured = mol.clone();
    if let Some(coordinates) = inputs.first() {
        configured.coordinates = geometry(mol, coordinates)?.to_owned();
    }
    if let Some(alpha) = inputs.get(1) {
        configured.alpha = basis_rows(mol, "hf_energy alpha", alpha)?;
    }
    if let Some(coeff) = inputs.get(2) {
        configured.coeff = basis_rows(mol, "hf_energy coeff", coeff)?;
    }
    Ok(configured)
}

fn basis_rows(mol: &Molecule, op: &'static str, table: &Array) -> Result<Vec<Vec<f64>>> {
    let expected = mol.alpha_table()?.shape().to_vec();
    let err = || Error::ShapeMismatch {
        op,
        lhs: table.shape().to_vec(),
        rhs: expected.clone(),
    };
    if table.shape() != expected.as_slice() {
        return Err(err());
    }
    let table = table.view().into_dimensionality::<Ix2>().map_err(|_| err())?;
    Ok(table.outer_iter().map(|row| row.to_vec()).collect())
}

fn derivative_at(mol: &Molecule, options: &ScfOptions, parameter: Parameter) -> Result<f64> {
    let state = run_scf(mol, mol.coordinates.view(), options, |p, x| {
        if p == parameter {
            Dual::variable(x)
        } else {
            Dual::constant(x)
        }
    })?;
    Ok(state.energy.eps)
}

fn gradient_at(mol: &Molecule, options: &ScfOptions) -> Result<Array2<f64>> {
    let mut gradient = Array2::zeros((mol.n_atoms(), 3));
    for atom in 0..mol.n_atoms() {
        for axis in 0..3 {
            let parameter = Parameter::Coordinate { atom, axis };
            gradient[[atom, axis]] = derivative_at(mol, options, parameter)?;
        }
    }
    Ok(gradient)
}

/// Derivatives with respect to one basis parameter kind, shaped like
/// [`Molecule::alpha_table`].
fn basis_gradient_at(
    mol: &Molecule,
    options: &ScfOptions,
    parameter: impl Fn(usize, usize) -> Parameter,
) -> Result<Array2<f64>> {
    let (rows, width) = mol.alpha_table()?.dim();
    let mut gradient = Array2::zeros((rows, width));
    for basis in 0..rows {
        for primitive in 0..width {
            let parameter = parameter(basis, primitive);
            gradient[[basis, primitive]] = derivative_at(mol, options, parameter)?;
        }
    }
    Ok(gradient)
}

/// Derivative of the total energy with respect to one input, from a single
/// forward-mode SCF pass.
pub fn hf_energy_derivative(mol: &Molecule, parameter: Parameter) -> Result<f64> {
    derivative_at(mol, &ScfOptions::default(), parameter)
}

/// Nuclear gradient `dE/dR`, shaped like the coordinates.
pub fn hf_energy_gradient(mol: &Molecule) -> Result<Array2<f64>> {
    gradient_at(mol, &ScfOptions::default())
}

struct HfEnergy {
    mol: Molecule,
    options: ScfOptions,
}

impl Primitive for HfEnergy {
    fn name(&self) -> &'static str {
        "hf_energy"
    }

    fn eval(&self, args: &[Array]) -> Result<Array> {
        let inputs: Vec<&Array> = args.iter().collect();
        let mol = configured(&self.mol, &inputs)?;
        let state = run_scf(&mol, mol.coordinates.view(), &self.options, |_, x| x)?;
        Ok(arr0(state.energy).into_dyn())
    }

    fn vjp(&self, argnum: usize, _ans: &Value, args: &[Value]) -> Result<Vjp> {
        let inputs: Vec<&Array> = args.iter().map(Value::data).collect();
        let mol = configured(&self.mol, &inputs)?;
        let options = self.options;
        let nested = args.iter().any(Value::is_boxed);
        Ok(Rc::new(move |g: &Value| -> Result<Value> {
            if nested {
                return Err(Error::HigherOrderUnsupported("hf_energy"));
            }
            let gradient = match argnum {
                0 => gradient_at(&mol, &options)?,
                1 => basis_gradient_at(&mol, &options, |basis, primitive| {
                    Parameter::Exponent { basis, primitive }
                })?,
                _ => basis_gradient_at(&mol, &options, |basis, primitive| {
                    Parameter::Coefficient { basis, primitive }
                })?,
            };
            mul(g, &Value::from(gradient))
        }))
    }
}

/// Returns a function of `[coordinates, alpha, coeff]` giving the total
/// Hartree-Fock energy.
///
/// `coordinates` is `N×3` in Bohr; `alpha` and `coeff` are laid out like
/// [`Molecule::alpha_table`]. Trailing inputs that are left out take the
/// molecule's own values. The result is differentiable to first order with
/// respect to every input given.
pub fn hf_energy(mol: &Molecule) -> impl Fn(&[Value]) -> Result<Value> {
    let primitive = HfEnergy {
        mol: mol.clone(),
        options: ScfOptions::default(),
    };
    move |args: &[Value]| {
        if args.len() > 3 {
            return Err(Error::ParameterCount {
                expected: 3,
                actual: args.len(),
            });
        }
        let inputs: Vec<&Array> = args.iter().map(Value::data).collect();
        configured(&primitive.mol, &inputs)?;
        apply(&primitive, args)
    }
}

/// Returns a function of the nuclear coordinates giving
/// `Σ_{i<j} Z_i Z_j / |R_i - R_j|`, built from differentiable primitives.
/// Called without arguments it uses `coordinates`.
pub fn nuclear_energy(
    charges: &[u32],
    coordinates: Value,
) -> impl Fn(&[Value]) -> Result<Value> {
    let charges = charges.to_vec();
    move |args: &[Value]| {
        let r = args.first().unwrap_or(&coordinates);
        let mut energy = Value::scalar(0.0);
        for i in 0..charges.len() {
            for j in (i + 1)..charges.len() {
                let d = sub(&row(r, i)?, &row(r, j)?)?;
                let distance = sqrt(&sum(&mul(&d, &d)?)?)?;
                let zz = Value::scalar((charges[i] * charges[j]) as f64);
                energy = add(&energy, &div(&zz, &distance)?)?;
            }
        }
        Ok(energy)
    }
}
