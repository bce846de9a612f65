//! Basis set data assembled from shell lists, laid out in `atm`/`bas`/`env` slots as PySCF does.

use crate::prelude::*;
use libcint::util::gaussian_int;
use std::collections::BTreeMap;

pub const BOHR: f64 = 0.52917721092;

/// Default ratio of neighbouring exponents in even-tempered auxiliary shells.
pub const ETB_BETA: f64 = 2.0;

/// Libcint reserves the first slots of `env` for global parameters.
const PTR_ENV_START: usize = 20;

/// One contracted shell, primitive coefficients given unnormalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Shell {
    pub l: usize,
    pub exponents: Vec<f64>,
    pub coefficients: Vec<f64>,
}

impl Shell {
    pub fn new(l: usize, prims: &[(f64, f64)]) -> Self {
        let (exponents, coefficients) = prims.iter().copied().unzip();
        Self { l, exponents, coefficients }
    }

    /// Uncontracted shell of a single primitive.
    pub fn primitive(l: usize, exponent: f64) -> Self {
        Self { l, exponents: vec![exponent], coefficients: vec![1.0] }
    }
}

/// Atom with its nuclear charge, coordinates in bohr and shells.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisAtom {
    pub charge: i32,
    pub coord: [f64; 3],
    pub shells: Vec<Shell>,
}

fn gto_norm(l: usize, alpha: f64) -> f64 {
    1.0 / gaussian_int((2 * l + 2) as f64, 2.0 * alpha).sqrt()
}

/// Coefficients of normalized primitives, rescaled so that the contracted function is normalized.
pub fn normalized_coefficients(shell: &Shell) -> Vec<f64> {
    let l = shell.l;
    let coeffs = shell.exponents.iter().zip(&shell.coefficients).map(|(&a, &c)| c * gto_norm(l, a)).collect_vec();
    let ovlp = shell
        .exponents
        .iter()
        .zip(&coeffs)
        .cartesian_product(shell.exponents.iter().zip(&coeffs))
        .map(|((&a_i, &c_i), (&a_j, &c_j))| c_i * c_j * gaussian_int((2 * l + 2) as f64, a_i + a_j))
        .sum::<f64>();
    coeffs.into_iter().map(|c| c / ovlp.sqrt()).collect()
}

/// Spherical basis data of point-charge nuclei.
pub fn build_cint(atoms: &[BasisAtom]) -> CInt {
    let mut env = vec![0.0; PTR_ENV_START];
    let mut atm = vec![];
    for atom in atoms {
        let ptr_coord = env.len() as i32;
        env.extend(atom.coord);
        env.push(0.0); // zeta of nuclear charge distribution
        atm.push([atom.charge, ptr_coord, 1, ptr_coord + 3, 0, 0]);
    }

    let mut bas = vec![];
    for (iatm, atom) in atoms.iter().enumerate() {
        for shell in &atom.shells {
            let ptr_exp = env.len() as i32;
            env.extend(&shell.exponents);
            let ptr_coeff = env.len() as i32;
            env.extend(normalized_coefficients(shell));
            bas.push([iatm as i32, shell.l as i32, shell.exponents.len() as i32, 1, 0, ptr_exp, ptr_coeff, 0]);
        }
    }

    CInt { atm, bas, ecpbas: vec![], env, cint_type: CIntType::Spheric }
}

/// Highest angular momentum among occupied shells of a neutral atom.
fn occupied_lmax(charge: i32) -> usize {
    match charge {
        ..=2 => 0,
        3..=18 => 1,
        19..=54 => 2,
        _ => 3,
    }
}

/// Even-tempered shells fitting orbital products of one atom.
///
/// `ranges` maps angular momentum to the smallest and largest exponent of the orbital basis.
/// Product angular momenta are capped at twice the occupied angular momentum plus one.
fn etb_shells(charge: i32, ranges: &BTreeMap<usize, (f64, f64)>, beta: f64) -> Vec<Shell> {
    let Some(&lmax) = ranges.keys().max() else {
        return vec![];
    };
    let lmax_aux = 2 * lmax.min(occupied_lmax(charge) + 1);

    let mut shells = vec![];
    for l_aux in 0..=lmax_aux {
        let products = ranges
            .iter()
            .cartesian_product(ranges.iter())
            .filter(|((li, _), (lj, _))| **li + **lj == l_aux)
            .map(|((_, &(emin_i, emax_i)), (_, &(emin_j, emax_j)))| ((emin_i * emin_j).sqrt(), (emax_i * emax_j).sqrt()))
            .collect_vec();
        if products.is_empty() {
            continue;
        }
        let emin = 2.0 * products.iter().map(|&(emin, _)| emin).fold(f64::INFINITY, f64::min);
        let emax = 2.0 * products.iter().map(|&(_, emax)| emax).fold(0.0, f64::max);
        let n = (((emax + emin) / emin).ln() / beta.ln()).ceil() as i32;
        shells.extend((0..n).rev().map(|k| Shell::primitive(l_aux, emin * beta.powi(k))));
    }
    shells
}

/// Even-tempered auxiliary basis spanning the exponent range of the orbital basis on every atom.
pub fn get_etb_aux(cint_data: &CInt, beta: f64) -> CInt {
    let coords = cint_data.atom_coords();
    let atoms = cint_data
        .atm
        .iter()
        .zip(coords)
        .enumerate()
        .map(|(iatm, (atm, coord))| {
            let mut ranges: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
            for bas in cint_data.bas.iter().filter(|bas| bas[0] as usize == iatm) {
                let (l, nprim, ptr_exp) = (bas[1] as usize, bas[2] as usize, bas[5] as usize);
                for &exponent in &cint_data.env[ptr_exp..ptr_exp + nprim] {
                    let range = ranges.entry(l).or_insert((exponent, exponent));
                    *range = (range.0.min(exponent), range.1.max(exponent));
                }
            }
            let charge = atm[0];
            BasisAtom { charge, coord, shells: etb_shells(charge, &ranges, beta) }
        })
        .collect_vec();
    build_cint(&atoms)
}
