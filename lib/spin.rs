//! Angular momentum quantum numbers and coupling coefficients.
//!
//! All quantum numbers are stored doubled so that half-integer values stay
//! integral, the same convention used for `I2`, `Je2` and the like in
//! [`AtomParameters`][crate::atom::AtomParameters].

use wigner_symbols::{ Wigner3jm, Wigner6j };

/// A `(total, projection)` angular momentum pair, both in halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Spin {
    j2: u32,
    m2: i32,
}

impl Spin {
    /// Create a new spin if the projection is valid for the total.
    pub fn new(j2: u32, m2: i32) -> Option<Self> {
        let j = i64::from(j2);
        let m = i64::from(m2);
        ((-j..=j).contains(&m) && (j - m) % 2 == 0)
            .then_some(Self { j2, m2 })
    }

    /// Doubled total angular momentum.
    pub fn j2(self) -> u32 { self.j2 }

    /// Doubled projection.
    pub fn m2(self) -> i32 { self.m2 }

    /// Total angular momentum as a true (possibly half-integer) value.
    pub fn j(self) -> f64 { f64::from(self.j2) / 2.0 }

    /// Projection as a true (possibly half-integer) value.
    pub fn m(self) -> f64 { f64::from(self.m2) / 2.0 }

    /// `true` if this state has the largest possible `|m|`.
    pub fn is_stretched(self) -> bool { self.m2.unsigned_abs() == self.j2 }

    /// Iterate over all projections of a total `j2`, ascending in `m`.
    pub fn projections(j2: u32) -> impl Iterator<Item = Self> + Clone {
        let j = j2 as i32;
        (-j..=j).step_by(2).map(move |m2| Self { j2, m2 })
    }
}

/// Iterate over the doubled totals allowed by coupling `a2` with `b2`, from
/// `|a - b|` up to `a + b`.
pub fn coupled_totals(a2: u32, b2: u32) -> impl Iterator<Item = u32> + Clone {
    (a2.abs_diff(b2)..=a2 + b2).step_by(2)
}

fn triangle(a2: u32, b2: u32, c2: u32) -> bool {
    c2 >= a2.abs_diff(b2) && c2 <= a2 + b2 && (a2 + b2 + c2) % 2 == 0
}

/// Wigner 3j symbol with columns `(j1 m1) (j2 m2) (j3 m3)`, all doubled.
///
/// Returns zero outside the selection rules instead of deferring to
/// `wigner_symbols`.
pub fn w3j(s1: Spin, s2: Spin, s3: Spin) -> f64 {
    if s1.m2 + s2.m2 + s3.m2 != 0 || !triangle(s1.j2, s2.j2, s3.j2) {
        return 0.0;
    }
    Wigner3jm {
        tj1: s1.j2 as i32,
        tm1: s1.m2,
        tj2: s2.j2 as i32,
        tm2: s2.m2,
        tj3: s3.j2 as i32,
        tm3: s3.m2,
    }
    .value()
    .into()
}

/// Wigner 6j symbol `{j1 j2 j3; j4 j5 j6}`, all doubled.
pub fn w6j(j1: u32, j2: u32, j3: u32, j4: u32, j5: u32, j6: u32) -> f64 {
    let ok
        = triangle(j1, j2, j3)
        && triangle(j1, j5, j6)
        && triangle(j4, j2, j6)
        && triangle(j4, j5, j3);
    if !ok { return 0.0; }
    Wigner6j {
        tj1: j1 as i32,
        tj2: j2 as i32,
        tj3: j3 as i32,
        tj4: j4 as i32,
        tj5: j5 as i32,
        tj6: j6 as i32,
    }
    .value()
    .into()
}

/// `(-1)^(n2 / 2)` for an even doubled exponent `n2`.
pub fn phase(n2: i32) -> f64 {
    if (n2 / 2).rem_euclid(2) == 0 { 1.0 } else { -1.0 }
}
