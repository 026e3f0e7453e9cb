use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::{fields::MpcField, Share, SharingScheme};

/// Value share in SPDZ protocol.
///
/// Summing `value` over all parties gives the secret `x`, summing `mac` gives `x * key`
/// where `key` is the sum of all parties' MAC-key shares.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpdzShare<T> {
    pub value: T,
    pub mac: T,
}

impl<T: MpcField> Share for SpdzShare<T> {
    type Clear = T;
    type MacKey = T;

    const SCHEME: SharingScheme = SharingScheme::AdditiveMac;
    const BYTES: usize = 2 * T::BYTES;

    fn zero() -> Self {
        SpdzShare {
            value: T::zero(),
            mac: T::zero(),
        }
    }

    fn constant(value: T, party_id: usize, mac_key: T) -> Self {
        SpdzShare {
            value: if party_id == 0 { value } else { T::zero() },
            mac: value * mac_key,
        }
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.value.write_bytes(out);
        self.mac.write_bytes(out);
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::BYTES {
            return None;
        }
        let (value, mac) = bytes.split_at(T::BYTES);
        Some(SpdzShare {
            value: T::read_bytes(value)?,
            mac: T::read_bytes(mac)?,
        })
    }
}

impl<T: MpcField> Add for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn add(self, rhs: Self) -> Self::Output {
        SpdzShare {
            value: self.value + rhs.value,
            mac: self.mac + rhs.mac,
        }
    }
}

impl<T: MpcField> Sub for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        SpdzShare {
            value: self.value - rhs.value,
            mac: self.mac - rhs.mac,
        }
    }
}

impl<T: MpcField> AddAssign for SpdzShare<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: MpcField> SubAssign for SpdzShare<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: MpcField> Neg for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn neg(self) -> Self::Output {
        SpdzShare {
            value: -self.value,
            mac: -self.mac,
        }
    }
}

impl<T: MpcField> Mul<T> for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn mul(self, rhs: T) -> Self::Output {
        SpdzShare {
            value: self.value * rhs,
            mac: self.mac * rhs,
        }
    }
}
