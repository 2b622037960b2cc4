//! Block-structured density matrix over the three level manifolds.

use ndarray as nd;
use num_complex::Complex64 as C64;

/// Default tolerance for [`DensityMatrix::equals_zero`].
pub const ZERO_TOL: f64 = 1e-6;

/// Populations and coherences of an atom whose levels are split into an
/// excited manifold E and two ground manifolds F and G.
///
/// The full density matrix is stored as its six independent blocks: three
/// square blocks whose diagonals are populations, and the three upper
/// off-diagonal blocks `ef`, `eg`, `fg` (the lower ones are their Hermitian
/// conjugates and are not stored). The same type is used for a state and for
/// its time derivative or a finite step, combined through [`Self::add`] and
/// [`Self::mul`].
#[derive(Clone, Debug, PartialEq)]
pub struct DensityMatrix {
    num_e: usize,
    num_f: usize,
    num_g: usize,
    pub ee: nd::Array2<C64>,
    pub ff: nd::Array2<C64>,
    pub gg: nd::Array2<C64>,
    pub ef: nd::Array2<C64>,
    pub eg: nd::Array2<C64>,
    pub fg: nd::Array2<C64>,
}

impl DensityMatrix {
    /// Create a new density matrix with every element equal to zero.
    pub fn new(num_e: usize, num_f: usize, num_g: usize) -> Self {
        Self {
            num_e,
            num_f,
            num_g,
            ee: nd::Array2::zeros((num_e, num_e)),
            ff: nd::Array2::zeros((num_f, num_f)),
            gg: nd::Array2::zeros((num_g, num_g)),
            ef: nd::Array2::zeros((num_e, num_f)),
            eg: nd::Array2::zeros((num_e, num_g)),
            fg: nd::Array2::zeros((num_f, num_g)),
        }
    }

    /// Return the manifold sizes `(num_e, num_f, num_g)`.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.num_e, self.num_f, self.num_g)
    }

    fn blocks(&self) -> [&nd::Array2<C64>; 6] {
        [&self.ee, &self.ff, &self.gg, &self.ef, &self.eg, &self.fg]
    }

    fn blocks_mut(&mut self) -> [&mut nd::Array2<C64>; 6] {
        [
            &mut self.ee,
            &mut self.ff,
            &mut self.gg,
            &mut self.ef,
            &mut self.eg,
            &mut self.fg,
        ]
    }

    /// Element-wise add `other` into `self`.
    ///
    /// *Panics* if the manifold sizes or the shapes of any pair of blocks
    /// differ; blocks are never broadcast.
    pub fn add(&mut self, other: &Self) {
        assert_eq!(
            self.dims(), other.dims(),
            "DensityMatrix::add: mismatched manifold sizes",
        );
        for (a, b) in self.blocks_mut().into_iter().zip(other.blocks()) {
            assert_eq!(
                a.dim(), b.dim(),
                "DensityMatrix::add: mismatched block shapes",
            );
            *a += b;
        }
    }

    /// Multiply every element by a real scalar.
    pub fn mul(&mut self, c: f64) {
        for a in self.blocks_mut() {
            a.mapv_inplace(|x| x * c);
        }
    }

    /// Return `true` if adding `other` to `self` would leave every population
    /// within `[0, 1]`. `self` is not modified.
    ///
    /// Coherence magnitudes and the total trace are not checked.
    ///
    /// *Panics* if the manifold sizes differ.
    pub fn okay_to_add(&self, other: &Self) -> bool {
        let mut tmp = self.clone();
        tmp.add(other);
        tmp.populations().all(|p| (0.0..=1.0).contains(&p))
    }

    /// Return `true` if the real and imaginary parts of every element are at
    /// most `tol` in magnitude.
    pub fn is_zero(&self, tol: f64) -> bool {
        self.blocks().into_iter()
            .flat_map(|a| a.iter())
            .all(|x| x.re.abs() <= tol && x.im.abs() <= tol)
    }

    /// [`Self::is_zero`] with the default tolerance [`ZERO_TOL`].
    pub fn equals_zero(&self) -> bool { self.is_zero(ZERO_TOL) }

    /// Iterate over the real parts of all populations, in E, F, G order.
    pub fn populations(&self) -> impl Iterator<Item = f64> + '_ {
        self.ee.diag().into_iter()
            .chain(self.ff.diag())
            .chain(self.gg.diag())
            .map(|p| p.re)
    }

    /// Sum of all populations.
    pub fn trace(&self) -> f64 { self.populations().sum() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn filled(num_e: usize, num_f: usize, num_g: usize, seed: f64)
        -> DensityMatrix
    {
        let mut dm = DensityMatrix::new(num_e, num_f, num_g);
        let mut k = seed;
        for block in dm.blocks_mut() {
            block.iter_mut()
                .for_each(|x| {
                    k += 0.137;
                    *x = C64::new(k.sin() * 0.1, k.cos() * 0.05);
                });
        }
        dm
    }

    fn assert_dm_eq(a: &DensityMatrix, b: &DensityMatrix, eps: f64) {
        for (x, y) in a.blocks().into_iter().zip(b.blocks()) {
            for (xi, yi) in x.iter().zip(y) {
                assert_abs_diff_eq!(xi.re, yi.re, epsilon = eps);
                assert_abs_diff_eq!(xi.im, yi.im, epsilon = eps);
            }
        }
    }

    #[test]
    fn new_is_zero() {
        let dm = DensityMatrix::new(8, 5, 3);
        assert!(dm.equals_zero());
        assert_eq!(dm.ef.dim(), (8, 5));
        assert_eq!(dm.eg.dim(), (8, 3));
        assert_eq!(dm.fg.dim(), (5, 3));
        assert_eq!(dm.trace(), 0.0);
    }

    #[test]
    fn additive_inverse() {
        let a = filled(4, 3, 2, 0.0);
        let b = filled(4, 3, 2, 1.7);
        let mut sum = a.clone();
        sum.add(&b);
        let mut neg = b.clone();
        neg.mul(-1.0);
        sum.add(&neg);
        assert_dm_eq(&sum, &a, 1e-14);
    }

    #[test]
    fn scalar_identity_and_zero() {
        let a = filled(3, 2, 2, 0.4);
        let mut one = a.clone();
        one.mul(1.0);
        assert_eq!(one, a);
        let mut zero = a.clone();
        zero.mul(0.0);
        assert!(zero.equals_zero());
        assert!(!a.equals_zero());
    }

    #[test]
    fn zero_tolerance() {
        let mut dm = DensityMatrix::new(2, 2, 2);
        dm.fg[[1, 0]] = C64::new(0.0, 5e-7);
        assert!(dm.equals_zero());
        dm.fg[[1, 0]] = C64::new(0.0, 2e-6);
        assert!(!dm.equals_zero());
        assert!(dm.is_zero(1e-5));
    }

    #[test]
    fn okay_to_add_guards_populations() {
        let mut state = DensityMatrix::new(1, 1, 1);
        state.gg[[0, 0]] = C64::from(0.6);
        state.ff[[0, 0]] = C64::from(0.4);
        let before = state.clone();

        let mut step = DensityMatrix::new(1, 1, 1);
        step.gg[[0, 0]] = C64::from(-0.1);
        step.ee[[0, 0]] = C64::from(0.1);
        assert!(state.okay_to_add(&step));

        step.gg[[0, 0]] = C64::from(-0.7);
        assert!(!state.okay_to_add(&step));
        assert_eq!(state, before);

        step.gg[[0, 0]] = C64::from(0.0);
        step.ff[[0, 0]] = C64::from(0.65);
        assert!(!state.okay_to_add(&step));
        assert_eq!(state, before);

        // coherences are not checked
        step.ff[[0, 0]] = C64::from(0.0);
        step.fg[[0, 0]] = C64::new(3.0, -3.0);
        assert!(state.okay_to_add(&step));
    }

    #[test]
    #[should_panic(expected = "mismatched manifold sizes")]
    fn mismatched_add_panics() {
        let mut a = DensityMatrix::new(2, 2, 2);
        let b = DensityMatrix::new(2, 3, 2);
        a.add(&b);
    }

    #[test]
    #[should_panic(expected = "mismatched block shapes")]
    fn reshaped_block_is_not_broadcast() {
        let mut a = DensityMatrix::new(3, 2, 2);
        let mut b = DensityMatrix::new(3, 2, 2);
        b.ee = nd::Array2::from_elem((1, 1), C64::from(0.5));
        a.add(&b);
    }

    #[test]
    #[should_panic(expected = "mismatched block shapes")]
    fn reshaped_block_fails_safety_check() {
        let mut a = DensityMatrix::new(3, 2, 2);
        a.fg = nd::Array2::zeros((2, 1));
        let b = DensityMatrix::new(3, 2, 2);
        a.okay_to_add(&b);
    }
}
