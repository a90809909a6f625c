use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use qhf::scf::generate_hartree_fock_with_options;
use qhf::{
    generate_hartree_fock, grad, hf_energy, hf_energy_derivative, hf_energy_gradient,
    nuclear_energy, Error, Molecule, MoleculeOptions, Parameter, ScfOptions, Value,
};

fn h2() -> Molecule {
    Molecule::new(&["H", "H"], array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap()
}

fn hf() -> Molecule {
    Molecule::new(&["H", "F"], array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap()
}

fn assert_abs_matrix(actual: &Array2<f64>, expected: [[f64; 2]; 2]) {
    for i in 0..2 {
        for j in 0..2 {
            assert_abs_diff_eq!(actual[[i, j]].abs(), expected[i][j].abs(), epsilon = 1e-6);
        }
    }
}

#[test]
fn test_h2_energy() {
    let energy = hf_energy(&h2())(&[]).unwrap();
    assert!(energy.shape().is_empty());
    assert_abs_diff_eq!(energy.item().unwrap(), -1.06599931664376, epsilon = 1e-6);
}

#[test]
fn test_hf_energy() {
    let energy = hf_energy(&hf())(&[]).unwrap();
    assert_abs_diff_eq!(energy.item().unwrap(), -97.8884541671664, epsilon = 1e-5);
}

#[test]
fn test_h2_scf_matrices() {
    let mol = h2();
    let solution = generate_hartree_fock(&mol)().unwrap();

    assert!(solution.converged);
    assert_abs_diff_eq!(solution.orbital_energies[0], -0.67578019, epsilon = 1e-6);
    assert_abs_diff_eq!(solution.orbital_energies[1], 0.94181155, epsilon = 1e-6);
    // Orbital phases are arbitrary
    assert_abs_matrix(
        &solution.coefficients,
        [[0.52754647, 1.56782303], [0.52754647, 1.56782303]],
    );
    assert_abs_matrix(
        &solution.fock_matrix,
        [[-0.51126165, -0.70283714], [-0.70283714, -0.51126165]],
    );
    assert_abs_matrix(
        &solution.core_hamiltonian,
        [[-1.27848869, -1.21916299], [-1.21916299, -1.27848869]],
    );
    assert_eq!(solution.repulsion_tensor.shape(), &[2, 2, 2, 2]);
    assert_abs_diff_eq!(
        solution.repulsion_tensor[[0, 1, 0, 1]],
        solution.repulsion_tensor[[1, 0, 1, 0]],
        epsilon = 1e-14
    );
}

#[test]
fn test_loose_tolerance_still_close() {
    let mol = hf();
    let options = ScfOptions {
        n_steps: 50,
        tol: 1e-4,
    };
    let solution = generate_hartree_fock_with_options(&mol, options)().unwrap();
    assert!(solution.converged);
    assert_abs_diff_eq!(solution.energy, -97.8884541671664, epsilon = 1e-4);
}

#[test]
fn test_open_shell_is_rejected() {
    let options = MoleculeOptions {
        charge: 1,
        ..Default::default()
    };
    let mol =
        Molecule::with_options(&["H", "H"], array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]], options)
            .unwrap();
    assert!(matches!(
        generate_hartree_fock(&mol)(),
        Err(Error::OpenShell { .. })
    ));
}

#[test]
fn test_nuclear_energy() {
    let h2 = nuclear_energy(&[1, 1], Value::from(array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]));
    assert_abs_diff_eq!(h2(&[]).unwrap().item().unwrap(), 1.0, epsilon = 1e-14);

    let hf = nuclear_energy(&[1, 9], Value::from(array![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]]));
    assert_abs_diff_eq!(hf(&[]).unwrap().item().unwrap(), 4.5, epsilon = 1e-14);

    let water = nuclear_energy(
        &[1, 8, 1],
        Value::from(array![[0.0, 1.2, 0.0], [0.0, 0.0, 0.0], [1.0, -0.2, 0.0]]),
    );
    assert_abs_diff_eq!(water(&[]).unwrap().item().unwrap(), 15.09255, epsilon = 1e-5);
}

#[test]
fn test_nuclear_energy_takes_new_coordinates() {
    let energy = nuclear_energy(&[1, 1], Value::from(array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]));
    let stretched = Value::from(array![[0.0, 0.0, 0.0], [0.0, 0.0, 4.0]]);
    assert_abs_diff_eq!(energy(&[stretched]).unwrap().item().unwrap(), 0.25, epsilon = 1e-14);
}

#[test]
fn test_nuclear_energy_second_derivative() {
    // E(z) = 1/z along the bond, d²E/dz² = 2/z³
    let energy = nuclear_energy(&[1, 1], Value::scalar(0.0));
    let coords = Value::from(array![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]]);
    let second = grad(
        |c| {
            let g = grad(|c| energy(std::slice::from_ref(c)), c)?;
            qhf::autodiff::ops::index(&g, 5)
        },
        &coords,
    )
    .unwrap();
    assert_abs_diff_eq!(second.data()[[1, 2]], 0.25, epsilon = 1e-12);
}

#[test]
fn test_unsupported_inputs() {
    let err = Molecule::new(&["H", "Og"], array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap_err();
    assert!(err.to_string().contains("are not supported"));

    let options = MoleculeOptions {
        basis_name: "6-31g".to_string(),
        ..Default::default()
    };
    let err = Molecule::with_options(&["H", "H"], array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]], options)
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Currently, the only supported basis set is"));
}

#[test]
fn test_molecule_defaults_and_basis_data() {
    let mol = hf();
    assert_eq!(mol.charge, 0);
    assert_eq!(mol.mult, 1);
    assert_eq!(mol.basis_name, "sto-3g");
    assert_eq!(mol.n_orbitals, 6);
    assert_eq!(mol.l[0], (0, 0, 0));
    assert_eq!(mol.l[3], (1, 0, 0));
    assert_eq!(mol.l[5], (0, 0, 1));
    assert_eq!(mol.r()[0], [0.0, 0.0, 0.0]);
    assert_eq!(mol.r()[4], [0.0, 0.0, 1.0]);
    assert_abs_diff_eq!(mol.alpha[0][0], 3.42525091, epsilon = 1e-8);
    assert_abs_diff_eq!(mol.coeff[0][0], 0.15432897, epsilon = 1e-8);
    // 2s and 2p of fluorine share exponents
    assert_eq!(mol.alpha[2], mol.alpha[3]);
}

#[test]
fn test_orbital_values() {
    let mol = h2();
    let ao = mol.atomic_orbital(0).unwrap();
    assert_abs_diff_eq!(ao([0.0, 0.0, 0.0]), 0.62824688, epsilon = 1e-7);

    let solution = generate_hartree_fock(&mol)().unwrap();
    let mo0 = solution.molecular_orbital(&mol, 0).unwrap();
    let mo1 = solution.molecular_orbital(&mol, 1).unwrap();
    assert_abs_diff_eq!(mo0([0.0, 0.0, 0.0]).abs(), 0.449091183400809, epsilon = 1e-7);
    assert_abs_diff_eq!(mo1([0.0, 0.0, 0.0]).abs(), 0.635299214486085, epsilon = 1e-7);
    assert!(solution.molecular_orbital(&mol, 2).is_err());
    assert!(mol.atomic_orbital(2).is_err());
}

#[test]
fn test_nuclear_gradient() {
    let mol = h2();
    let g = hf_energy_gradient(&mol).unwrap();
    assert_eq!(g.dim(), (2, 3));
    assert_abs_diff_eq!(g[[1, 2]], -0.36504350841, epsilon = 1e-6);
    assert_abs_diff_eq!(g[[0, 2]], 0.36504350841, epsilon = 1e-6);
    assert_abs_diff_eq!(g[[0, 0]], 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(g[[1, 1]], 0.0, epsilon = 1e-10);
}

#[test]
fn test_coordinate_derivative_matches_finite_differences() {
    let mol = h2();
    let energy = hf_energy(&mol);
    let at = |z: f64| {
        let coords = Value::from(array![[0.0, 0.0, 0.0], [0.0, 0.0, z]]);
        energy(&[coords]).unwrap().item().unwrap()
    };
    let step = 1e-4;
    let fd = (at(1.0 + step) - at(1.0 - step)) / (2.0 * step);

    let exact = hf_energy_derivative(&mol, Parameter::Coordinate { atom: 1, axis: 2 }).unwrap();
    assert_abs_diff_eq!(exact, fd, epsilon = 1e-6);
}

#[test]
fn test_basis_parameter_derivatives() {
    let mol = h2();
    let step = 1e-5;
    let central = |perturb: fn(&mut Molecule, f64)| {
        let energy_at = |delta: f64| {
            let mut m = mol.clone();
            perturb(&mut m, delta);
            hf_energy(&m)(&[]).unwrap().item().unwrap()
        };
        (energy_at(step) - energy_at(-step)) / (2.0 * step)
    };

    let exponent = Parameter::Exponent {
        basis: 0,
        primitive: 1,
    };
    let fd = central(|m, delta| m.alpha[0][1] += delta);
    let exact = hf_energy_derivative(&mol, exponent).unwrap();
    assert_abs_diff_eq!(exact, fd, epsilon = 1e-6);

    let coefficient = Parameter::Coefficient {
        basis: 1,
        primitive: 0,
    };
    let fd = central(|m, delta| m.coeff[1][0] += delta);
    let exact = hf_energy_derivative(&mol, coefficient).unwrap();
    assert_abs_diff_eq!(exact, fd, epsilon = 1e-6);
}

#[test]
fn test_hf_energy_reverse_mode() {
    let mol = h2();
    let energy = hf_energy(&mol);
    let coords = Value::from(mol.coordinates.clone());
    let g = grad(|c| energy(std::slice::from_ref(c)), &coords).unwrap();

    assert_eq!(g.shape(), vec![2, 3]);
    assert_abs_diff_eq!(g.data()[[1, 2]], -0.36504350841, epsilon = 1e-6);
    assert_abs_diff_eq!(g.data()[[0, 2]], 0.36504350841, epsilon = 1e-6);
}

#[test]
fn test_hf_energy_basis_parameter_gradients() {
    let mol = h2();
    let energy = hf_energy(&mol);
    let coords = Value::from(mol.coordinates.clone());
    let alpha_table = mol.alpha_table().unwrap();
    let coeff_table = mol.coeff_table().unwrap();
    let step = 1e-5;

    let g_alpha = grad(
        |a| energy(&[coords.clone(), a.clone()]),
        &Value::from(alpha_table.clone()),
    )
    .unwrap();
    assert_eq!(g_alpha.shape(), vec![2, 3]);
    let energy_at = |delta: f64| {
        let mut shifted = alpha_table.clone();
        shifted[[0, 1]] += delta;
        energy(&[coords.clone(), Value::from(shifted)]).unwrap().item().unwrap()
    };
    let fd = (energy_at(step) - energy_at(-step)) / (2.0 * step);
    assert_abs_diff_eq!(g_alpha.data()[[0, 1]], fd, epsilon = 1e-6);
    let exponent = Parameter::Exponent {
        basis: 0,
        primitive: 1,
    };
    let forward = hf_energy_derivative(&mol, exponent).unwrap();
    assert_abs_diff_eq!(g_alpha.data()[[0, 1]], forward, epsilon = 1e-10);
    // Both hydrogens are equivalent
    assert_abs_diff_eq!(g_alpha.data()[[0, 1]], g_alpha.data()[[1, 1]], epsilon = 1e-8);

    let alpha = Value::from(alpha_table);
    let g_coeff = grad(
        |c| energy(&[coords.clone(), alpha.clone(), c.clone()]),
        &Value::from(coeff_table.clone()),
    )
    .unwrap();
    let energy_at = |delta: f64| {
        let mut shifted = coeff_table.clone();
        shifted[[1, 0]] += delta;
        let inputs = [coords.clone(), alpha.clone(), Value::from(shifted)];
        energy(&inputs).unwrap().item().unwrap()
    };
    let fd = (energy_at(step) - energy_at(-step)) / (2.0 * step);
    assert_abs_diff_eq!(g_coeff.data()[[1, 0]], fd, epsilon = 1e-6);
}

#[test]
fn test_hf_energy_is_first_order_only() {
    let mol = h2();
    let energy = hf_energy(&mol);
    let coords = Value::from(mol.coordinates.clone());
    let result = grad(
        |c| {
            let g = grad(|c| energy(std::slice::from_ref(c)), c)?;
            qhf::autodiff::ops::index(&g, 5)
        },
        &coords,
    );
    assert!(matches!(result, Err(Error::HigherOrderUnsupported(_))));
}
