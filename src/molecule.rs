//! Molecular system representation
//!
//! A [`Molecule`] is built from atomic symbols and nuclear coordinates (in
//! Bohr). Construction validates the inputs and derives everything the
//! Hartree-Fock engine needs: electron count, nuclear charges and the
//! contracted Gaussian basis functions placed on each atom.

use ndarray::Array2;
use serde::Deserialize;

use crate::basis::BasisFunction;
use crate::basis_data::{atomic_number, AngularMomentum, BasisEntry, BasisLibrary};
use crate::error::{Error, Result};

/// Optional molecular inputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MoleculeOptions {
    /// Net charge of the molecule
    pub charge: i32,
    /// Spin multiplicity (2S + 1)
    pub mult: u32,
    /// Name of the atomic basis set
    pub basis_name: String,
}

impl Default for MoleculeOptions {
    fn default() -> Self {
        Self {
            charge: 0,
            mult: 1,
            basis_name: "sto-3g".to_string(),
        }
    }
}

/// Represents a molecule as atoms plus a basis set
#[derive(Debug, Clone)]
pub struct Molecule {
    /// Atomic symbols
    pub symbols: Vec<String>,
    /// Nuclear coordinates, one row per atom, in Bohr
    pub coordinates: Array2<f64>,
    /// Total charge of the molecule
    pub charge: i32,
    /// Spin multiplicity (2S + 1)
    pub mult: u32,
    pub basis_name: String,
    pub n_electrons: usize,
    /// Total number of basis functions
    pub n_orbitals: usize,
    pub nuclear_charges: Vec<u32>,
    /// Number of basis functions on each atom
    pub n_basis: Vec<usize>,
    pub l: Vec<AngularMomentum>,
    pub alpha: Vec<Vec<f64>>,
    pub coeff: Vec<Vec<f64>>,
    owners: Vec<usize>,
}

impl Molecule {
    /// Creates a neutral singlet molecule in the STO-3G basis
    pub fn new<S: AsRef<str>>(symbols: &[S], coordinates: Array2<f64>) -> Result<Self> {
        Self::with_options(symbols, coordinates, MoleculeOptions::default())
    }

    pub fn with_options<S: AsRef<str>>(
        symbols: &[S],
        coordinates: Array2<f64>,
        options: MoleculeOptions,
    ) -> Result<Self> {
        if !options.basis_name.eq_ignore_ascii_case("sto-3g") {
            return Err(Error::UnsupportedBasis(options.basis_name));
        }

        let symbols: Vec<String> = symbols.iter().map(|s| s.as_ref().to_string()).collect();

        let unsupported: Vec<String> = symbols
            .iter()
            .filter(|s| atomic_number(s).is_none())
            .cloned()
            .collect();
        if !unsupported.is_empty() {
            return Err(Error::UnsupportedSymbols(unsupported));
        }

        if coordinates.nrows() != symbols.len() || coordinates.ncols() != 3 {
            return Err(Error::Geometry {
                atoms: symbols.len(),
                shape: coordinates.shape().to_vec(),
            });
        }

        let nuclear_charges: Vec<u32> = symbols
            .iter()
            .filter_map(|s| atomic_number(s))
            .collect();

        let total: i64 = nuclear_charges.iter().map(|&z| z as i64).sum();
        let n_electrons = total - options.charge as i64;
        if n_electrons < 0 {
            return Err(Error::OpenShell {
                n_electrons,
                mult: options.mult,
            });
        }

        let library = BasisLibrary::sto3g()?;

        let mut n_basis = Vec::with_capacity(symbols.len());
        let mut entries = Vec::new();
        let mut owners = Vec::new();
        for (atom, symbol) in symbols.iter().enumerate() {
            let atom_entries = library.atom_basis_data(symbol)?;
            n_basis.push(atom_entries.len());
            entries.extend(atom_entries.iter().cloned());
            owners.extend(std::iter::repeat(atom).take(atom_entries.len()));
        }

        let l: Vec<AngularMomentum> = entries.iter().map(|(l, _, _)| *l).collect();
        let alpha: Vec<Vec<f64>> = entries.iter().map(|(_, a, _)| a.clone()).collect();
        let coeff: Vec<Vec<f64>> = entries.into_iter().map(|(_, _, c)| c).collect();

        Ok(Self {
            symbols,
            coordinates,
            charge: options.charge,
            mult: options.mult,
            basis_name: options.basis_name.to_lowercase(),
            n_electrons: n_electrons as usize,
            n_orbitals: l.len(),
            nuclear_charges,
            n_basis,
            l,
            alpha,
            coeff,
            owners,
        })
    }

    /// Number of atoms
    pub fn n_atoms(&self) -> usize {
        self.symbols.len()
    }

    /// Index of the atom carrying basis function `i`
    pub fn basis_owner(&self, i: usize) -> usize {
        self.owners[i]
    }

    /// Returns the number of occupied orbitals (closed shell)
    pub fn num_occupied(&self) -> usize {
        self.n_electrons / 2
    }

    /// Checks that the electrons pair up in doubly occupied orbitals.
    pub fn require_closed_shell(&self) -> Result<()> {
        if self.n_electrons % 2 != 0 || self.mult != 1 {
            return Err(Error::OpenShell {
                n_electrons: self.n_electrons as i64,
                mult: self.mult,
            });
        }
        Ok(())
    }

    /// `(l, alpha, coeff)` of every basis function
    pub fn basis_data(&self) -> Vec<BasisEntry> {
        (0..self.n_orbitals)
            .map(|i| (self.l[i], self.alpha[i].clone(), self.coeff[i].clone()))
            .collect()
    }

    /// Center of every basis function, taken from the current coordinates
    pub fn r(&self) -> Vec<[f64; 3]> {
        self.owners
            .iter()
            .map(|&atom| {
                let row = self.coordinates.row(atom);
                [row[0], row[1], row[2]]
            })
            .collect()
    }

    /// Basis functions built from the current `l`, `alpha`, `coeff` and
    /// coordinates.
    pub fn basis_set(&self) -> Vec<BasisFunction> {
        self.basis_data()
            .into_iter()
            .zip(self.r())
            .map(|((l, alpha, coeff), center)| BasisFunction::new(l, alpha, coeff, center))
            .collect()
    }

    /// Exponents as an `n_orbitals × n_primitives` table.
    pub fn alpha_table(&self) -> Result<Array2<f64>> {
        parameter_table(&self.alpha)
    }

    /// Contraction coefficients as an `n_orbitals × n_primitives` table.
    pub fn coeff_table(&self) -> Result<Array2<f64>> {
        parameter_table(&self.coeff)
    }

    /// Returns a function evaluating atomic orbital `i` at a point.
    pub fn atomic_orbital(&self, i: usize) -> Result<impl Fn([f64; 3]) -> f64> {
        let function = self
            .basis_set()
            .into_iter()
            .nth(i)
            .ok_or(Error::OrbitalIndex {
                index: i,
                len: self.n_orbitals,
            })?;
        Ok(move |point: [f64; 3]| function.evaluate(point))
    }

    /// Computes nuclear repulsion energy
    pub fn nuclear_repulsion(&self) -> f64 {
        let n = self.n_atoms();
        let mut energy = 0.0;

        for i in 0..n {
            for j in (i + 1)..n {
                let zi = self.nuclear_charges[i] as f64;
                let zj = self.nuclear_charges[j] as f64;
                energy += zi * zj / self.bond_length(i, j);
            }
        }

        energy
    }

    /// Returns the distance between two atoms in Bohr.
    pub fn bond_length(&self, i: usize, j: usize) -> f64 {
        let d = &self.coordinates.row(i) - &self.coordinates.row(j);
        d.dot(&d).sqrt()
    }

    /// Returns the angle (degrees) formed by atoms i-j-k with j at the vertex.
    pub fn bond_angle(&self, i: usize, j: usize, k: usize) -> f64 {
        let a = &self.coordinates.row(i) - &self.coordinates.row(j);
        let b = &self.coordinates.row(k) - &self.coordinates.row(j);
        let cos = a.dot(&b) / (a.dot(&a).sqrt() * b.dot(&b).sqrt());
        cos.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

/// Rows of equal length stacked into a matrix.
fn parameter_table(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    if let Some(row) = rows.iter().find(|row| row.len() != width) {
        return Err(Error::ShapeMismatch {
            op: "parameter table",
            lhs: vec![rows.len(), width],
            rhs: vec![row.len()],
        });
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| Error::ShapeMismatch {
        op: "parameter table",
        lhs: vec![rows.len(), width],
        rhs: vec![rows.iter().map(Vec::len).sum()],
    })
}
