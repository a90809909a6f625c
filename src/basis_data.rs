//! STO-3G basis data sourced from the Basis Set Exchange (BSE).
//!
//! The bundled file `data/sto-3g.json` is the BSE "complete" JSON export.
//! Exponents and coefficients are stored as strings there; they are parsed
//! into `f64` while deserializing.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

pub const STO3G_JSON: &str = include_str!("../data/sto-3g.json");

/// Element symbols covered by the bundled basis, indexed by `Z - 1`.
pub const SUPPORTED_SYMBOLS: [&str; 10] = ["H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne"];

/// Atomic number of a supported element symbol.
pub fn atomic_number(symbol: &str) -> Option<u32> {
    SUPPORTED_SYMBOLS
        .iter()
        .position(|&s| s == symbol)
        .map(|i| i as u32 + 1)
}

/// Cartesian angular momentum exponents `(lx, ly, lz)`.
pub type AngularMomentum = (u32, u32, u32);

/// One contracted Cartesian function of an atom: `(l, alpha, coeff)`.
pub type BasisEntry = (AngularMomentum, Vec<f64>, Vec<f64>);

#[derive(Debug, Deserialize)]
struct BasisSetFile {
    name: String,
    elements: BTreeMap<String, ElementData>,
}

#[derive(Debug, Deserialize)]
struct ElementData {
    electron_shells: Vec<ElectronShell>,
}

#[derive(Debug, Deserialize)]
struct ElectronShell {
    angular_momentum: Vec<u32>,
    #[serde(deserialize_with = "numeric_strings")]
    exponents: Vec<f64>,
    #[serde(deserialize_with = "numeric_string_rows")]
    coefficients: Vec<Vec<f64>>,
}

fn parse_number<E: serde::de::Error>(s: &str) -> std::result::Result<f64, E> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| E::custom(format!("invalid number '{s}': {e}")))
}

fn numeric_strings<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<f64>, D::Error> {
    let raw = Vec::<String>::deserialize(d)?;
    raw.iter().map(|s| parse_number(s)).collect()
}

fn numeric_string_rows<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<Vec<f64>>, D::Error> {
    let raw = Vec::<Vec<String>>::deserialize(d)?;
    raw.iter()
        .map(|row| row.iter().map(|s| parse_number(s)).collect())
        .collect()
}

/// Cartesian components of a shell with total angular momentum `l`.
fn cartesian_components(l: u32) -> Vec<AngularMomentum> {
    let mut out = Vec::new();
    for lx in (0..=l).rev() {
        for ly in (0..=(l - lx)).rev() {
            out.push((lx, ly, l - lx - ly));
        }
    }
    out
}

/// Parsed basis library, keyed by atomic number.
#[derive(Debug, Clone)]
pub struct BasisLibrary {
    pub name: String,
    elements: BTreeMap<u32, Vec<BasisEntry>>,
}

impl BasisLibrary {
    /// Parses a BSE JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: BasisSetFile = serde_json::from_str(json)?;

        let mut elements = BTreeMap::new();
        for (z, data) in file.elements {
            let z: u32 = z
                .parse()
                .map_err(|_| Error::Type(format!("invalid element key '{z}' in basis data")))?;

            let mut entries = Vec::new();
            for shell in data.electron_shells {
                // General contractions (sp shells) carry one coefficient row per l
                for (l, coeff) in shell.angular_momentum.iter().zip(&shell.coefficients) {
                    for lxyz in cartesian_components(*l) {
                        entries.push((lxyz, shell.exponents.clone(), coeff.clone()));
                    }
                }
            }
            elements.insert(z, entries);
        }

        Ok(Self {
            name: file.name,
            elements,
        })
    }

    /// The bundled STO-3G library.
    pub fn sto3g() -> Result<Self> {
        Self::from_json(STO3G_JSON)
    }

    /// Basis functions of one element, in shell order.
    pub fn atom_basis_data(&self, symbol: &str) -> Result<&[BasisEntry]> {
        atomic_number(symbol)
            .and_then(|z| self.elements.get(&z))
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnsupportedSymbols(vec![symbol.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sto3g_parses() {
        let lib = BasisLibrary::sto3g().unwrap();
        assert_eq!(lib.name, "STO-3G");
        for symbol in SUPPORTED_SYMBOLS {
            assert!(lib.atom_basis_data(symbol).is_ok(), "{symbol}");
        }
    }

    #[test]
    fn test_hydrogen_entry() {
        let lib = BasisLibrary::sto3g().unwrap();
        let h = lib.atom_basis_data("H").unwrap();
        assert_eq!(h.len(), 1);
        let (l, alpha, coeff) = &h[0];
        assert_eq!(*l, (0, 0, 0));
        assert_abs_diff_eq!(alpha[0], 3.425250914, epsilon = 1e-9);
        assert_abs_diff_eq!(coeff[2], 0.4446345422, epsilon = 1e-10);
    }

    #[test]
    fn test_sp_shell_expands_to_cartesians() {
        let lib = BasisLibrary::sto3g().unwrap();
        let f = lib.atom_basis_data("F").unwrap();
        let ls: Vec<_> = f.iter().map(|(l, _, _)| *l).collect();
        assert_eq!(
            ls,
            vec![(0, 0, 0), (0, 0, 0), (1, 0, 0), (0, 1, 0), (0, 0, 1)]
        );
        assert_abs_diff_eq!(f[1].2[0], -0.09996722919, epsilon = 1e-11);
        assert_abs_diff_eq!(f[2].2[0], 0.1559162750, epsilon = 1e-10);
    }

    #[test]
    fn test_unknown_symbol() {
        let lib = BasisLibrary::sto3g().unwrap();
        assert!(matches!(
            lib.atom_basis_data("Og"),
            Err(Error::UnsupportedSymbols(_))
        ));
        assert_eq!(atomic_number("O"), Some(8));
    }

    #[test]
    fn test_malformed_number_is_reported() {
        let json = r#"{"name": "x", "elements": {"1": {"electron_shells": [
            {"angular_momentum": [0], "exponents": ["abc"], "coefficients": [["1.0"]]}
        ]}}}"#;
        assert!(matches!(
            BasisLibrary::from_json(json),
            Err(Error::BasisData(_))
        ));
    }
}
