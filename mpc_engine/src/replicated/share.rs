use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::{fields::MpcRing, Share, SharingScheme};

/// Replicated share: sub-shares `x_i` and `x_{i+1}` held by party `i`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rep3Share<T> {
    pub shares: [T; 2],
}

impl<T: MpcRing> Rep3Share<T> {
    pub fn new(own: T, next: T) -> Self {
        Rep3Share {
            shares: [own, next],
        }
    }

    /// Sum of both held sub-shares.
    pub fn sum(&self) -> T {
        self.shares[0] + self.shares[1]
    }
}

impl<T: MpcRing> Share for Rep3Share<T> {
    type Clear = T;
    type MacKey = ();

    const SCHEME: SharingScheme = SharingScheme::Replicated3;
    const BYTES: usize = 2 * T::BYTES;

    fn zero() -> Self {
        Rep3Share::new(T::zero(), T::zero())
    }

    /// The constant is placed in `x_0`, which parties 0 and 2 hold.
    fn constant(value: T, party_id: usize, _: ()) -> Self {
        match party_id {
            0 => Rep3Share::new(value, T::zero()),
            2 => Rep3Share::new(T::zero(), value),
            _ => Self::zero(),
        }
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.shares[0].write_bytes(out);
        self.shares[1].write_bytes(out);
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::BYTES {
            return None;
        }
        let (own, next) = bytes.split_at(T::BYTES);
        Some(Rep3Share::new(T::read_bytes(own)?, T::read_bytes(next)?))
    }
}

impl<T: MpcRing> Add for Rep3Share<T> {
    type Output = Rep3Share<T>;
    fn add(self, rhs: Self) -> Self::Output {
        Rep3Share::new(
            self.shares[0] + rhs.shares[0],
            self.shares[1] + rhs.shares[1],
        )
    }
}

impl<T: MpcRing> Sub for Rep3Share<T> {
    type Output = Rep3Share<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        Rep3Share::new(
            self.shares[0] - rhs.shares[0],
            self.shares[1] - rhs.shares[1],
        )
    }
}

impl<T: MpcRing> AddAssign for Rep3Share<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: MpcRing> SubAssign for Rep3Share<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: MpcRing> Neg for Rep3Share<T> {
    type Output = Rep3Share<T>;
    fn neg(self) -> Self::Output {
        Rep3Share::new(-self.shares[0], -self.shares[1])
    }
}

impl<T: MpcRing> Mul<T> for Rep3Share<T> {
    type Output = Rep3Share<T>;
    fn mul(self, rhs: T) -> Self::Output {
        Rep3Share::new(self.shares[0] * rhs, self.shares[1] * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Z64;

    #[test]
    fn test_constant_adds_up_once() {
        let shares: Vec<_> = (0..3)
            .map(|id| Rep3Share::constant(Z64(9), id, ()))
            .collect();
        // x_0 is held by party 0 (first slot) and party 2 (second slot).
        assert_eq!(shares[0].shares[0], Z64(9));
        assert_eq!(shares[2].shares[1], Z64(9));
        assert_eq!(shares[1], Rep3Share::zero());
        let x = shares[0].shares[0] + shares[1].shares[0] + shares[2].shares[0];
        assert_eq!(x, Z64(9));
    }

    #[test]
    fn test_encoding_puts_own_sub_share_first() {
        let share = Rep3Share::new(Z64(3), Z64(u64::MAX));
        let mut bytes = Vec::new();
        share.write_bytes(&mut bytes);
        assert_eq!(bytes.len(), Rep3Share::<Z64>::BYTES);
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[8..], [0xff; 8]);
        assert_eq!(Rep3Share::read_bytes(&bytes), Some(share));
        assert_eq!(Rep3Share::<Z64>::read_bytes(&bytes[..15]), None);
        bytes.push(0);
        assert_eq!(Rep3Share::<Z64>::read_bytes(&bytes), None);
    }
}
