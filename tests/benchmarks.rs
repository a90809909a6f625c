use std::fs;
use std::path::Path;

use ndarray::Array2;
use qhf::basis_data::SUPPORTED_SYMBOLS;
use qhf::scf::generate_hartree_fock_with_options;
use qhf::{nuclear_energy, Molecule, MoleculeOptions, ScfOptions, Value};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Benchmarks {
    version: u32,
    basis: String,
    molecules: Vec<BenchmarkMolecule>,
}

#[derive(Debug, Deserialize)]
struct BenchmarkMolecule {
    name: String,
    charge: i32,
    multiplicity: u32,
    #[serde(default)]
    tags: Vec<String>,
    atoms: Vec<BenchmarkAtom>,
    reference: BenchmarkReference,
    #[serde(default)]
    geometry: BenchmarkGeometry,
}

#[derive(Debug, Deserialize)]
struct BenchmarkAtom {
    atomic_number: u32,
    position: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct BenchmarkReference {
    energy_total: f64,
    energy_electronic: f64,
    energy_nuclear: f64,
}

#[derive(Debug, Default, Deserialize)]
struct BenchmarkGeometry {
    #[serde(default)]
    bond_lengths: Vec<Measured>,
    #[serde(default)]
    bond_angles: Vec<Measured>,
}

/// A bond length (two atoms) or angle (three atoms, vertex in the middle).
#[derive(Debug, Deserialize)]
struct Measured {
    atoms: Vec<usize>,
    value: f64,
}

/// `QHF_BENCHMARKS=full` (or `1`, `all`, `true`) also runs the entries not
/// tagged `quick`.
fn full_run() -> bool {
    matches!(
        std::env::var("QHF_BENCHMARKS").as_deref(),
        Ok("1") | Ok("full") | Ok("all") | Ok("true")
    )
}

fn load() -> Option<Benchmarks> {
    let path = Path::new("data/benchmarks.json");
    if !path.exists() {
        eprintln!("Skipping benchmarks: data/benchmarks.json not found.");
        return None;
    }
    let contents = fs::read_to_string(path).expect("Failed to read benchmarks.json");
    Some(serde_json::from_str(&contents).expect("Invalid benchmarks.json"))
}

fn build(entry: &BenchmarkMolecule) -> Molecule {
    let symbols: Vec<&str> = entry
        .atoms
        .iter()
        .map(|atom| SUPPORTED_SYMBOLS[atom.atomic_number as usize - 1])
        .collect();
    let positions: Vec<f64> = entry.atoms.iter().flat_map(|atom| atom.position).collect();
    let coordinates =
        Array2::from_shape_vec((entry.atoms.len(), 3), positions).expect("Invalid positions");
    let options = MoleculeOptions {
        charge: entry.charge,
        mult: entry.multiplicity,
        ..Default::default()
    };
    Molecule::with_options(&symbols, coordinates, options).expect("Failed to build molecule")
}

#[test]
fn benchmark_file_is_consistent() {
    let Some(data) = load() else { return };
    assert!(data.version >= 1);
    assert_eq!(data.basis, "sto-3g");
    assert!(data.molecules.iter().any(|m| m.tags.iter().any(|t| t == "quick")));

    for entry in &data.molecules {
        let r = &entry.reference;
        assert!(
            (r.energy_electronic + r.energy_nuclear - r.energy_total).abs() <= 1e-9,
            "Reference energies of {} do not add up",
            entry.name
        );
    }
}

#[test]
fn compare_benchmarks_to_reference() {
    let Some(data) = load() else { return };
    let full = full_run();
    let energy_tol = if full { 5e-3 } else { 1e-3 };

    let selected = data
        .molecules
        .iter()
        .filter(|entry| full || entry.tags.iter().any(|tag| tag == "quick"));
    for entry in selected {
        assert_eq!(
            entry.multiplicity, 1,
            "Only closed-shell benchmarks supported ({})",
            entry.name
        );
        let molecule = build(entry);

        let nuclear = nuclear_energy(
            &molecule.nuclear_charges,
            Value::from(molecule.coordinates.clone()),
        )(&[])
        .and_then(|e| e.item())
        .expect("Nuclear energy failed");
        assert!(
            (nuclear - entry.reference.energy_nuclear).abs() <= 1e-6,
            "Nuclear repulsion mismatch for {}",
            entry.name
        );
        assert!((nuclear - molecule.nuclear_repulsion()).abs() <= 1e-12);

        let options = ScfOptions {
            n_steps: 100,
            tol: 1e-6,
        };
        let result = generate_hartree_fock_with_options(&molecule, options)().expect("SCF failed");
        assert!(result.converged, "SCF did not converge for {}", entry.name);
        let electronic = result.energy - nuclear;
        assert!(
            (result.energy - entry.reference.energy_total).abs() <= energy_tol,
            "Total energy mismatch for {}: {}",
            entry.name,
            result.energy
        );
        assert!(
            (electronic - entry.reference.energy_electronic).abs() <= energy_tol,
            "Electronic energy mismatch for {}",
            entry.name
        );

        for bond in &entry.geometry.bond_lengths {
            let [i, j] = bond.atoms[..] else {
                panic!("Bond length of {} needs two atoms", entry.name);
            };
            assert!(
                (molecule.bond_length(i, j) - bond.value).abs() <= 1e-6,
                "Bond length mismatch for {}",
                entry.name
            );
        }
        for angle in &entry.geometry.bond_angles {
            let [i, j, k] = angle.atoms[..] else {
                panic!("Bond angle of {} needs three atoms", entry.name);
            };
            assert!(
                (molecule.bond_angle(i, j, k) - angle.value).abs() <= 1e-6,
                "Bond angle mismatch for {}",
                entry.name
            );
        }
    }
}
