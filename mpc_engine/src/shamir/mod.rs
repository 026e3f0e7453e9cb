//! Shamir threshold secret sharing.
//!
//! Party `i` holds `f(i + 1)` for a random polynomial `f` of degree `t` with `f(0) = x`.

mod opener;
pub use opener::ShamirOpener;

mod share;
pub use share::ShamirShare;

use crate::{error::ProtocolError, fields::MpcField};

/// Lagrange coefficients that interpolate `f(0)` from `f(1), ..., f(n)`.
///
/// The coefficient of `f(i + 1)` is `prod_{j != i} (j + 1) / (j - i)`.
pub fn reconstruction_coefficients<F: MpcField>(n: usize) -> Result<Vec<F>, ProtocolError> {
    (0..n)
        .map(|i| {
            let mut numerator = F::one();
            let mut denominator = F::one();
            for j in (0..n).filter(|&j| j != i) {
                numerator *= F::from(j as u64 + 1);
                denominator *= F::from(j as u64 + 1) - F::from(i as u64 + 1);
            }
            let inverse = denominator.invert().ok_or_else(|| {
                ProtocolError::InvalidParameters(format!(
                    "{n} evaluation points do not fit into the field"
                ))
            })?;
            Ok(numerator * inverse)
        })
        .collect()
}

/// Evaluate polynomial with given coefficients (constant term first) at `x`.
pub fn evaluate<F: MpcField>(coefficients: &[F], x: F) -> F {
    coefficients
        .iter()
        .rev()
        .fold(F::zero(), |acc, &coefficient| acc * x + coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Mersenne61, MpcRing};
    use proptest::prelude::*;
    use rand::{rngs::SmallRng, SeedableRng};

    type Fp = Mersenne61;

    #[test]
    fn test_coefficients_sum_to_one() {
        for n in 1..8 {
            let lambdas = reconstruction_coefficients::<Fp>(n).unwrap();
            let sum = lambdas.iter().fold(Fp::zero(), |acc, &x| acc + x);
            assert_eq!(sum, Fp::one(), "n = {n}");
        }
    }

    #[test]
    fn test_two_points() {
        // Line through (1, y1) and (2, y2) meets the axis at 2 * y1 - y2.
        let lambdas = reconstruction_coefficients::<Fp>(2).unwrap();
        assert_eq!(lambdas, vec![Fp::from(2), -Fp::one()]);
    }

    proptest! {
        #[test]
        fn interpolation_recovers_constant_term(seed in any::<u64>(), degree in 0usize..6, extra in 0usize..4) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let coefficients: Vec<Fp> = (0..=degree).map(|_| Fp::random(&mut rng)).collect();
            let n = degree + 1 + extra;
            let points: Vec<Fp> = (1..=n as u64).map(|x| evaluate(&coefficients, Fp::from(x))).collect();
            let lambdas = reconstruction_coefficients::<Fp>(n).unwrap();
            let secret = points.iter().zip(&lambdas).fold(Fp::zero(), |acc, (&y, &l)| acc + y * l);
            prop_assert_eq!(secret, coefficients[0]);
        }
    }
}
