use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Clear value of a sharing: element of a finite ring with a fixed-size encoding.
pub trait MpcRing:
    Copy
    + Clone
    + Debug
    + Default
    + PartialEq
    + Eq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + From<u64>
{
    /// Length of the binary encoding in bytes.
    const BYTES: usize;

    fn zero() -> Self;

    fn one() -> Self;

    fn is_zero(&self) -> bool;

    /// Uniformly random element.
    fn random(rng: &mut impl RngCore) -> Self;

    /// Append little-endian encoding to `out`.
    fn write_bytes(&self, out: &mut Vec<u8>);

    /// Decode element from exactly `Self::BYTES` bytes. Rejects non-canonical encodings.
    fn read_bytes(bytes: &[u8]) -> Option<Self>;
}

/// Clear value that additionally supports division.
pub trait MpcField: MpcRing {
    /// Multiplicative inverse, `None` for zero.
    fn invert(&self) -> Option<Self>;
}

/// Implements `MpcField` for a type produced by `ff`'s `PrimeField` derive.
macro_rules! impl_prime_field {
    ($field:ty, $bytes:expr) => {
        impl MpcRing for $field {
            const BYTES: usize = $bytes;

            fn zero() -> Self {
                <Self as ff::Field>::zero()
            }

            fn one() -> Self {
                <Self as ff::Field>::one()
            }

            fn is_zero(&self) -> bool {
                <Self as ff::Field>::is_zero_vartime(self)
            }

            fn random(rng: &mut impl RngCore) -> Self {
                <Self as ff::Field>::random(rng)
            }

            fn write_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(ff::PrimeField::to_repr(self).as_ref());
            }

            fn read_bytes(bytes: &[u8]) -> Option<Self> {
                if bytes.len() != Self::BYTES {
                    return None;
                }
                let mut repr = <Self as ff::PrimeField>::Repr::default();
                repr.as_mut().copy_from_slice(bytes);
                <Self as ff::PrimeField>::from_repr_vartime(repr)
            }
        }

        impl MpcField for $field {
            fn invert(&self) -> Option<Self> {
                Option::from(<Self as ff::Field>::invert(self))
            }
        }
    };
}

mod mersenne_61 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);

    impl Serialize for Mersenne61 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne61 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne61Repr(Deserialize::deserialize(deserializer)?);
            Self::from_repr_vartime(repr)
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }
}

mod mersenne_127 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);

    impl Serialize for Mersenne127 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne127 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne127Repr(Deserialize::deserialize(deserializer)?);
            Self::from_repr_vartime(repr)
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }
}

pub use mersenne_127::{Mersenne127, Mersenne127Repr};
pub use mersenne_61::{Mersenne61, Mersenne61Repr};

impl_prime_field!(Mersenne61, 8);
impl_prime_field!(Mersenne127, 16);

/// Ring of integers mod 2^64.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Z64(pub u64);

impl MpcRing for Z64 {
    const BYTES: usize = 8;

    fn zero() -> Self {
        Z64(0)
    }

    fn one() -> Self {
        Z64(1)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn random(rng: &mut impl RngCore) -> Self {
        Z64(rng.next_u64())
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_le_bytes());
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Z64(u64::from_le_bytes(bytes.try_into().ok()?)))
    }
}

impl From<u64> for Z64 {
    fn from(x: u64) -> Self {
        Z64(x)
    }
}

impl Add for Z64 {
    type Output = Z64;
    fn add(self, rhs: Self) -> Self::Output {
        Z64(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Z64 {
    type Output = Z64;
    fn sub(self, rhs: Self) -> Self::Output {
        Z64(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for Z64 {
    type Output = Z64;
    fn mul(self, rhs: Self) -> Self::Output {
        Z64(self.0.wrapping_mul(rhs.0))
    }
}

impl Neg for Z64 {
    type Output = Z64;
    fn neg(self) -> Self::Output {
        Z64(self.0.wrapping_neg())
    }
}

impl AddAssign for Z64 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Z64 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Z64 {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

/// Binary field GF(2^64) with reduction polynomial x^64 + x^4 + x^3 + x + 1.
///
/// Bit `i` of the representation is the coefficient of `x^i`, so `From<u64>` maps distinct
/// integers to distinct elements. Addition and subtraction are both XOR.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gf64Bit(pub u64);

impl Gf64Bit {
    const BITS: u32 = 64;
    const POLYNOMIAL: u128 = (1 << 64) | 0b1_1011;

    /// Carry-less product of two 64-bit polynomials.
    fn clmul(a: u64, b: u64) -> u128 {
        let a = u128::from(a);
        let mut product = 0;
        for i in 0..Self::BITS {
            let bit = u128::from(b >> i & 1);
            product ^= bit * (a << i);
        }
        product
    }

    fn pow(self, mut exponent: u64) -> Self {
        let mut base = self;
        let mut result = Gf64Bit(1);
        while exponent > 0 {
            if exponent & 1 == 1 {
                result *= base;
            }
            base *= base;
            exponent >>= 1;
        }
        result
    }
}

impl MpcRing for Gf64Bit {
    const BYTES: usize = 8;

    fn zero() -> Self {
        Gf64Bit(0)
    }

    fn one() -> Self {
        Gf64Bit(1)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn random(rng: &mut impl RngCore) -> Self {
        Gf64Bit(rng.next_u64())
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_le_bytes());
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Gf64Bit(u64::from_le_bytes(bytes.try_into().ok()?)))
    }
}

impl MpcField for Gf64Bit {
    fn invert(&self) -> Option<Self> {
        // The multiplicative group has order 2^64 - 1.
        (!self.is_zero()).then(|| self.pow(u64::MAX - 1))
    }
}

impl From<u64> for Gf64Bit {
    fn from(x: u64) -> Self {
        Gf64Bit(x)
    }
}

impl Add for Gf64Bit {
    type Output = Gf64Bit;
    fn add(self, rhs: Self) -> Self::Output {
        Gf64Bit(self.0 ^ rhs.0)
    }
}

impl Sub for Gf64Bit {
    type Output = Gf64Bit;
    fn sub(self, rhs: Self) -> Self::Output {
        Gf64Bit(self.0 ^ rhs.0)
    }
}

impl Mul for Gf64Bit {
    type Output = Gf64Bit;
    fn mul(self, rhs: Self) -> Self::Output {
        let mut product = Self::clmul(self.0, rhs.0);
        for i in (0..Self::BITS - 1).rev() {
            let b = product >> (Self::BITS + i);
            product ^= (Self::POLYNOMIAL * b) << i;
        }
        // Every bit above 63 was cleared by the reduction.
        Gf64Bit(product as u64)
    }
}

impl Neg for Gf64Bit {
    type Output = Gf64Bit;
    fn neg(self) -> Self::Output {
        self
    }
}

impl AddAssign for Gf64Bit {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Gf64Bit {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Gf64Bit {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
