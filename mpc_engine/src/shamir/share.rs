use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::{fields::MpcField, Share, SharingScheme};

/// Evaluation of the sharing polynomial at this party's point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShamirShare<T>(pub T);

impl<T: MpcField> Share for ShamirShare<T> {
    type Clear = T;
    type MacKey = ();

    const SCHEME: SharingScheme = SharingScheme::ShamirThreshold;
    const BYTES: usize = T::BYTES;

    fn zero() -> Self {
        ShamirShare(T::zero())
    }

    /// A constant polynomial: every party holds the value itself.
    fn constant(value: T, _: usize, _: ()) -> Self {
        ShamirShare(value)
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.0.write_bytes(out);
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        T::read_bytes(bytes).map(ShamirShare)
    }
}

impl<T: MpcField> Add for ShamirShare<T> {
    type Output = ShamirShare<T>;
    fn add(self, rhs: Self) -> Self::Output {
        ShamirShare(self.0 + rhs.0)
    }
}

impl<T: MpcField> Sub for ShamirShare<T> {
    type Output = ShamirShare<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        ShamirShare(self.0 - rhs.0)
    }
}

impl<T: MpcField> AddAssign for ShamirShare<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl<T: MpcField> SubAssign for ShamirShare<T> {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl<T: MpcField> Neg for ShamirShare<T> {
    type Output = ShamirShare<T>;
    fn neg(self) -> Self::Output {
        ShamirShare(-self.0)
    }
}

impl<T: MpcField> Mul<T> for ShamirShare<T> {
    type Output = ShamirShare<T>;
    fn mul(self, rhs: T) -> Self::Output {
        ShamirShare(self.0 * rhs)
    }
}
