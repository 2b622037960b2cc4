//! Weak-field hyperfine basis, level energies, and dipole coupling tensors.
//!
//! Levels are labeled by `|F, m_F>` and energies include only the magnetic
//! dipole hyperfine interaction and a linear Zeeman shift along `z`, which is
//! accurate while the Zeeman shifts are small compared to the hyperfine
//! splittings. Transverse fields and hyperfine mixing are not diagonalized.

use std::ops::Range;
use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use ndarray as nd;
use crate::{
    atom::{ AtomParameters, MagneticField },
    spin::{ self, Spin, coupled_totals, w3j, w6j },
    units::{ G_J_2P12, G_J_2P32, G_J_2S12, zeeman_shift },
};

/// One of the three level manifolds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Manifold {
    /// Lower ground hyperfine level.
    G,
    /// Upper ground hyperfine level.
    F,
    /// Every hyperfine level of the excited state.
    E,
}

/// A single `|F, m_F>` sublevel, with doubled quantum numbers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HfLevel {
    pub manifold: Manifold,
    pub spin: Spin,
}

impl HfLevel {
    pub fn f2(&self) -> u32 { self.spin.j2() }

    pub fn m2(&self) -> i32 { self.spin.m2() }
}

/// Index ranges of each manifold within the flat population layout, which
/// runs G, F, E.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifoldBounds {
    pub g: Range<usize>,
    pub f: Range<usize>,
    pub e: Range<usize>,
}

impl ManifoldBounds {
    /// Lay out manifolds of the given sizes.
    pub fn new(num_e: usize, num_f: usize, num_g: usize) -> Self {
        Self {
            g: 0..num_g,
            f: num_g..num_g + num_f,
            e: num_g + num_f..num_g + num_f + num_e,
        }
    }

    pub fn num_g(&self) -> usize { self.g.len() }

    pub fn num_f(&self) -> usize { self.f.len() }

    pub fn num_e(&self) -> usize { self.e.len() }

    /// Length of the flat layout.
    pub fn len(&self) -> usize { self.e.end }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Range belonging to a manifold.
    pub fn range(&self, manifold: Manifold) -> Range<usize> {
        match manifold {
            Manifold::G => self.g.clone(),
            Manifold::F => self.f.clone(),
            Manifold::E => self.e.clone(),
        }
    }
}

/// Basis of hyperfine sublevels together with everything the pumping engines
/// need from it: energies per manifold, index bounds, and coupling tensors.
///
/// `a_eg[[e, g, q]]` is the normalized electric dipole matrix element between
/// excited level `e` and ground level `g` for a photon of angular momentum
/// projection `q - 1`, signed so that absorption takes `m_g` to
/// `m_g + q - 1`. Squared, these are the spontaneous branching ratios: for
/// every `e` they sum to one over all ground levels of both manifolds and all
/// `q`.
#[derive(Clone, Debug)]
pub struct Eigenbasis {
    atom: AtomParameters,
    field: MagneticField,
    levels: IndexMap<HfLevel, f64>,
    bounds: ManifoldBounds,
    pub nu_e: nd::Array1<f64>,
    pub nu_f: nd::Array1<f64>,
    pub nu_g: nd::Array1<f64>,
    pub a_eg: nd::Array3<f64>,
    pub a_ef: nd::Array3<f64>,
}

fn lande_g(g_j: f64, g_i: f64, i2: u32, j2: u32, f2: u32) -> f64 {
    if f2 == 0 { return 0.0; }
    let [i, j, f] = [i2, j2, f2].map(|x| f64::from(x) / 2.0);
    let ff = f * (f + 1.0);
    let ii = i * (i + 1.0);
    let jj = j * (j + 1.0);
    g_j * (ff - ii + jj) / (2.0 * ff) + g_i * (ff + ii - jj) / (2.0 * ff)
}

fn hyperfine_shift(a: f64, i2: u32, j2: u32, f2: u32) -> f64 {
    let [i, j, f] = [i2, j2, f2].map(|x| f64::from(x) / 2.0);
    a / 2.0 * (f * (f + 1.0) - i * (i + 1.0) - j * (j + 1.0))
}

impl Eigenbasis {
    /// Build the basis for an atom in a magnetic field.
    pub fn new(atom: &AtomParameters, field: MagneticField) -> Self {
        if field.b_x != 0.0 {
            warn!(
                "transverse field B_x = {} G is ignored by the weak-field basis",
                field.b_x,
            );
        }
        let levels: IndexMap<HfLevel, f64>
            = [
                (Manifold::G, atom.f2_lower()),
                (Manifold::F, atom.f2_upper()),
            ]
            .into_iter()
            .flat_map(|(manifold, f2)| {
                Spin::projections(f2)
                    .map(move |spin| HfLevel { manifold, spin })
            })
            .chain(
                coupled_totals(atom.i2, atom.je2)
                .flat_map(Spin::projections)
                .map(|spin| HfLevel { manifold: Manifold::E, spin })
            )
            .map(|level| (level, 0.0))
            .collect();
        let bounds = ManifoldBounds::new(atom.num_e, atom.num_f, atom.num_g);
        let mut basis = Self {
            atom: *atom,
            field,
            levels,
            bounds,
            nu_e: nd::Array1::zeros(atom.num_e),
            nu_f: nd::Array1::zeros(atom.num_f),
            nu_g: nd::Array1::zeros(atom.num_g),
            a_eg: nd::Array3::zeros((atom.num_e, atom.num_g, 3)),
            a_ef: nd::Array3::zeros((atom.num_e, atom.num_f, 3)),
        };
        basis.set_energies();
        basis.set_couplings();
        basis
    }

    /// Get a reference to the atom the basis was built for.
    pub fn atom(&self) -> &AtomParameters { &self.atom }

    /// Get the current magnetic field.
    pub fn field(&self) -> MagneticField { self.field }

    /// Get the manifold index bounds.
    pub fn bounds(&self) -> &ManifoldBounds { &self.bounds }

    /// Get all levels in flat layout order, with energies in Hz.
    pub fn levels(&self) -> &IndexMap<HfLevel, f64> { &self.levels }

    /// Iterate over the levels of a single manifold.
    pub fn manifold(&self, manifold: Manifold)
        -> impl Iterator<Item = (&HfLevel, &f64)> + '_
    {
        self.levels.iter().filter(move |(l, _)| l.manifold == manifold)
    }

    /// Change the field along `z` and recompute level energies. Couplings do
    /// not depend on the field.
    pub fn set_field(&mut self, b_z: f64) {
        self.field.b_z = b_z;
        self.set_energies();
    }

    fn level_energy(&self, level: &HfLevel) -> f64 {
        let atom = &self.atom;
        let (j2, a, g_j, offset)
            = match level.manifold {
                Manifold::E => {
                    let g_j = if atom.je2 == 1 { G_J_2P12 } else { G_J_2P32 };
                    (atom.je2, atom.aj_e, g_j, atom.nu_excited)
                },
                Manifold::F | Manifold::G
                    => (atom.jg2, atom.aj_g, G_J_2S12, 0.0),
            };
        let g_f = lande_g(g_j, atom.g_i, atom.i2, j2, level.f2());
        offset
            + hyperfine_shift(a, atom.i2, j2, level.f2())
            + zeeman_shift(g_f, level.m2(), self.field.b_z)
    }

    fn set_energies(&mut self) {
        let energies: Vec<f64>
            = self.levels.keys().map(|l| self.level_energy(l)).collect();
        self.levels.values_mut().zip(&energies)
            .for_each(|(e, new)| { *e = *new; });
        let b = &self.bounds;
        self.nu_g = energies[b.g.clone()].iter().copied().collect();
        self.nu_f = energies[b.f.clone()].iter().copied().collect();
        self.nu_e = energies[b.e.clone()].iter().copied().collect();
    }

    /// Normalized dipole coupling between an excited and a ground level for
    /// photon channel `q`.
    fn coupling(&self, excited: &HfLevel, ground: &HfLevel, q: usize) -> f64 {
        let atom = &self.atom;
        let p2 = 2 * q as i32 - 2;
        if excited.m2() != ground.m2() + p2 { return 0.0; }
        let (Some(e), Some(photon), Some(g))
            = (
                Spin::new(excited.f2(), -excited.m2()),
                Spin::new(2, p2),
                Spin::new(ground.f2(), ground.m2()),
            )
            else { return 0.0; };
        let norm
            = f64::from(
                (excited.f2() + 1) * (ground.f2() + 1) * (atom.je2 + 1)
            )
            .sqrt();
        let sign
            = spin::phase(
                excited.f2() as i32 - excited.m2()
                + (atom.je2 + atom.i2 + ground.f2()) as i32 + 2
            );
        sign * norm
            * w3j(e, photon, g)
            * w6j(atom.je2, excited.f2(), atom.i2, ground.f2(), atom.jg2, 2)
    }

    fn set_couplings(&mut self) {
        let excited: Vec<HfLevel>
            = self.manifold(Manifold::E).map(|(l, _)| *l).collect();
        let upper: Vec<HfLevel>
            = self.manifold(Manifold::F).map(|(l, _)| *l).collect();
        let lower: Vec<HfLevel>
            = self.manifold(Manifold::G).map(|(l, _)| *l).collect();
        let mut a_eg: nd::Array3<f64> = nd::Array3::zeros(self.a_eg.raw_dim());
        let mut a_ef: nd::Array3<f64> = nd::Array3::zeros(self.a_ef.raw_dim());
        let iter
            = excited.iter().enumerate()
            .cartesian_product(lower.iter().enumerate())
            .cartesian_product(0..3);
        for (((e, le), (g, lg)), q) in iter {
            a_eg[[e, g, q]] = self.coupling(le, lg, q);
        }
        let iter
            = excited.iter().enumerate()
            .cartesian_product(upper.iter().enumerate())
            .cartesian_product(0..3);
        for (((e, le), (f, lf)), q) in iter {
            a_ef[[e, f, q]] = self.coupling(le, lf, q);
        }
        self.a_eg = a_eg;
        self.a_ef = a_ef;
    }

    /// Zero-field frequency [Hz] of the transition from ground level `f2` to
    /// excited level `f2_excited` (both doubled).
    pub fn transition_frequency(&self, f2: u32, f2_excited: u32) -> f64 {
        let atom = &self.atom;
        atom.nu_excited
            + hyperfine_shift(atom.aj_e, atom.i2, atom.je2, f2_excited)
            - hyperfine_shift(atom.aj_g, atom.i2, atom.jg2, f2)
    }

    /// Doubled excited hyperfine totals available for tuning.
    pub fn excited_totals(&self) -> impl Iterator<Item = u32> + Clone {
        coupled_totals(self.atom.i2, self.atom.je2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{ assert_abs_diff_eq, assert_relative_eq };
    use crate::atom::Isotope;

    fn k37(je2: u32, b_z: f64) -> Eigenbasis {
        let atom = AtomParameters::new(Isotope::K37, je2).unwrap();
        Eigenbasis::new(&atom, MagneticField { b_z, b_x: 0.0 })
    }

    #[test]
    fn layout_runs_g_f_e() {
        let basis = k37(1, 0.0);
        let b = basis.bounds();
        assert_eq!(b.g, 0..3);
        assert_eq!(b.f, 3..8);
        assert_eq!(b.e, 8..16);
        assert_eq!(b.len(), 16);
        let manifolds: Vec<Manifold>
            = basis.levels().keys().map(|l| l.manifold).collect();
        assert!(manifolds.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(basis.a_eg.dim(), (8, 3, 3));
        assert_eq!(basis.a_ef.dim(), (8, 5, 3));
    }

    #[test]
    fn branching_ratios_sum_to_one() {
        for je2 in [1, 3] {
            let basis = k37(je2, 1.0);
            for e in 0..basis.bounds().num_e() {
                let total: f64
                    = basis.a_eg.slice(nd::s![e, .., ..]).mapv(|a| a * a).sum()
                    + basis.a_ef.slice(nd::s![e, .., ..]).mapv(|a| a * a).sum();
                assert_abs_diff_eq!(total, 1.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn selection_rules() {
        let basis = k37(1, 0.0);
        let excited: Vec<HfLevel>
            = basis.manifold(Manifold::E).map(|(l, _)| *l).collect();
        let upper: Vec<HfLevel>
            = basis.manifold(Manifold::F).map(|(l, _)| *l).collect();
        for ((e, le), (f, lf)) in excited.iter().enumerate()
            .cartesian_product(upper.iter().enumerate())
        {
            for q in 0..3 {
                if le.m2() - lf.m2() != 2 * q as i32 - 2 {
                    assert_eq!(basis.a_ef[[e, f, q]], 0.0);
                }
            }
        }
        // the stretched F = 2, m = 2 state is dark to sigma+ on D1
        let stretched = upper.len() - 1;
        assert!(upper[stretched].spin.is_stretched());
        assert!(
            basis.a_ef.slice(nd::s![.., stretched, 2]).iter()
                .all(|a| *a == 0.0)
        );
    }

    #[test]
    fn hyperfine_and_zeeman_energies() {
        let basis = k37(1, 0.0);
        let atom = *basis.atom();
        // ground splitting is 2 A for I = 3/2
        let split = basis.nu_f[0] - basis.nu_g[0];
        assert_relative_eq!(split, 2.0 * atom.aj_g, max_relative = 1e-12);
        assert!(basis.nu_e.iter().all(|nu| (nu - atom.nu_excited).abs() < 1e9));

        let mut shifted = basis.clone();
        shifted.set_field(2.0);
        // g_F = +1/2 for F = 2 (ignoring the nuclear term): m = +2 shifts up
        let df = shifted.nu_f[4] - basis.nu_f[4];
        assert_relative_eq!(df, 0.5 * 2.0 * 2.0 * 1.3996245e6, max_relative = 1e-2);
        assert_eq!(shifted.a_ef, basis.a_ef);
    }

    #[test]
    fn transition_frequencies() {
        let basis = k37(1, 0.0);
        let nu = basis.transition_frequency(4, 4);
        let e = basis.manifold(Manifold::E)
            .find(|(l, _)| l.f2() == 4).map(|(_, e)| *e).unwrap();
        let f = basis.nu_f[0];
        assert_relative_eq!(nu, e - f, max_relative = 1e-12);
        assert_eq!(basis.excited_totals().collect::<Vec<_>>(), vec![2, 4]);
    }
}
