//! Authenticated opening ("MAC check") and Beaver multiplication over interchangeable
//! secret-sharing schemes.
//!
//! Three sharing schemes are provided:
//!
//! * [`spdz`]: additive shares authenticated with an information-theoretic MAC (dishonest
//!   majority),
//! * [`replicated`]: 3-party replicated shares (honest majority),
//! * [`shamir`]: Shamir threshold shares with optional redundant reconstruction.
//!
//! Each scheme has its own [`Opener`]; the [`beaver::Beaver`] multiplier is generic over all of
//! them. Callers batch many openings or multiplications, trigger one network round per batch and
//! must call [`Opener::check`] before discarding an opener.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod beaver;
pub mod circuits;
pub mod codec;
pub mod commit;
pub mod config;
pub mod dealer;
pub mod error;
pub mod executor;
pub mod fields;
pub mod processor;
pub mod replicated;
pub mod shamir;
pub mod simulation;
pub mod spdz;
pub mod transport;

pub use error::ProtocolError;
pub use fields::{MpcField, MpcRing};
pub use transport::Player;

/// Closed set of supported sharing schemes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SharingScheme {
    /// Additive shares with MAC shares (SPDZ).
    AdditiveMac,
    /// Three-party replicated shares.
    Replicated3,
    /// Shamir shares of a degree-t polynomial.
    ShamirThreshold,
}

impl FromStr for SharingScheme {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spdz" | "additive" => Ok(SharingScheme::AdditiveMac),
            "rep3" | "replicated" => Ok(SharingScheme::Replicated3),
            "shamir" => Ok(SharingScheme::ShamirThreshold),
            _ => Err("Unsupported sharing scheme. Available options: spdz, rep3, shamir"),
        }
    }
}

/// Private share of a clear value held by one party.
/// Sharing is linear: addition of shares and scaling by clear values need no communication.
pub trait Share:
    Copy
    + Clone
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + Mul<Self::Clear, Output = Self>
{
    /// Type of value represented by this share.
    type Clear: MpcRing;

    /// Party-local key material needed to share public constants.
    type MacKey: Copy + Debug + Default + Send + Sync;

    const SCHEME: SharingScheme;

    /// Length of the binary encoding in bytes.
    const BYTES: usize;

    fn zero() -> Self;

    /// Share of public `value` held by party `party_id`.
    fn constant(value: Self::Clear, party_id: usize, mac_key: Self::MacKey) -> Self;

    /// Append the encoding of this share: value-share first, then MAC-share if any.
    fn write_bytes(&self, out: &mut Vec<u8>);

    /// Decode a share from exactly `Self::BYTES` bytes.
    fn read_bytes(bytes: &[u8]) -> Option<Self>;
}

/// Turns batches of shares into clear values and verifies that nobody cheated.
///
/// Usage per batch: [`init_open`](Opener::init_open), any number of
/// [`prepare_open`](Opener::prepare_open), one [`exchange`](Opener::exchange), then
/// [`finalize_open`](Opener::finalize_open) once per prepared share, in the same order.
#[async_trait(?Send)]
pub trait Opener {
    type Share: Share;

    /// ID of the party owning this opener.
    fn party_id(&self) -> usize;

    /// Reset per-batch state and reserve room for `n` shares.
    fn init_open(&mut self, n: usize);

    /// Queue a share for the next exchange. No network traffic.
    fn prepare_open(&mut self, share: &Self::Share);

    /// Reveal every queued share in one network round.
    async fn exchange(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError>;

    /// Next opened value, in `prepare_open` order.
    fn finalize_open(&mut self) -> Result<<Self::Share as Share>::Clear, ProtocolError>;

    /// Verify everything opened since the last check. No-op when nothing is pending.
    async fn check(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError>;

    /// Number of opened values still awaiting verification.
    fn pending_checks(&self) -> usize;

    /// Local share of a public value.
    fn constant(&self, value: <Self::Share as Share>::Clear) -> Self::Share;

    /// Open a whole batch at once.
    async fn open_batch(
        &mut self,
        shares: &[Self::Share],
        player: &mut dyn Player,
    ) -> Result<Vec<<Self::Share as Share>::Clear>, ProtocolError> {
        self.init_open(shares.len());
        for share in shares {
            self.prepare_open(share);
        }
        self.exchange(player).await?;
        shares.iter().map(|_| self.finalize_open()).collect()
    }
}

/// Multiplication of shared values, unmasking delegated to an [`Opener`].
#[async_trait(?Send)]
pub trait Multiplier {
    type Share: Share;

    /// Forget all pending multiplications.
    fn init_mul(&mut self);

    /// Queue multiplication of `x` and `y`. No network traffic.
    fn prepare_mul(&mut self, x: Self::Share, y: Self::Share) -> Result<(), ProtocolError>;

    /// Run one network round for all queued multiplications.
    async fn exchange<O>(
        &mut self,
        opener: &mut O,
        player: &mut dyn Player,
    ) -> Result<(), ProtocolError>
    where
        O: Opener<Share = Self::Share>;

    /// Product share of the next pending multiplication, in `prepare_mul` order.
    fn finalize_mul<O>(&mut self, opener: &O) -> Result<Self::Share, ProtocolError>
    where
        O: Opener<Share = Self::Share>;
}

/// Source of preprocessed correlated randomness.
pub trait Preprocessing<S: Share> {
    /// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
    fn get_triple(&mut self) -> Result<(S, S, S), ProtocolError>;

    /// Random sharing of a secret random bit.
    fn get_bit(&mut self) -> Result<S, ProtocolError>;

    /// Random sharing of a mask for inputs of `player`.
    /// The plain mask is returned only when `player` is the current party.
    fn get_input_mask(&mut self, player: usize) -> Result<(S, Option<S::Clear>), ProtocolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::dealer::{PreprocessingCounts, ShareDealer};
    use crate::fields::{Mersenne61, Z64};
    use crate::simulation::{setup_replicated, setup_shamir, setup_spdz, simulate, PartySetup};
    use std::cell::RefCell;

    /// Open `2x + y - z * 3 + 5` and `-x` where x, y, z are dealt by `dealer`.
    async fn open_linear_combination<D, O>(
        mut dealer: D,
        setups: Vec<PartySetup<O, D::Share>>,
        values: [<D::Share as Share>::Clear; 3],
    ) -> Vec<Result<Vec<<D::Share as Share>::Clear>, ProtocolError>>
    where
        D: ShareDealer,
        O: Opener<Share = D::Share>,
    {
        let dealt: Vec<_> = values.iter().map(|&v| dealer.share(v)).collect();
        let setups = RefCell::new(setups.into_iter().map(Some).collect::<Vec<_>>());
        simulate(dealer.num_parties(), |id, mut player| {
            let PartySetup { mut opener, .. } = setups.borrow_mut()[id].take().unwrap();
            let (x, y, z) = (dealt[0][id], dealt[1][id], dealt[2][id]);
            async move {
                let two = <D::Share as Share>::Clear::from(2u64);
                let three = <D::Share as Share>::Clear::from(3u64);
                let five = opener.constant(<D::Share as Share>::Clear::from(5u64));
                let mut combination = x * two + y;
                combination -= z * three;
                combination += five;
                let opened = opener.open_batch(&[combination, -x], &mut player).await?;
                opener.check(&mut player).await?;
                Ok::<_, ProtocolError>(opened)
            }
        })
        .await
    }

    #[tokio::test]
    async fn test_linear_operations_for_all_schemes() {
        let config = ProtocolConfig::default();
        let counts = PreprocessingCounts::default();
        let expected = |x: u64, y: u64, z: u64| 2 * x + y + 5 - 3 * z;

        let (dealer, setups) = setup_spdz::<Mersenne61>(4, &counts, &config, 1);
        let values = [10u64, 20, 4].map(Mersenne61::from);
        for result in open_linear_combination(dealer, setups, values).await {
            assert_eq!(
                result,
                Ok(vec![Mersenne61::from(expected(10, 20, 4)), -values[0]])
            );
        }

        let (dealer, setups) = setup_replicated::<Z64>(&counts, &config, 2);
        for result in open_linear_combination(dealer, setups, [Z64(10), Z64(20), Z64(4)]).await {
            assert_eq!(
                result,
                Ok(vec![Z64(expected(10, 20, 4)), Z64(10u64.wrapping_neg())])
            );
        }

        let (dealer, setups) = setup_shamir::<Mersenne61>(5, &counts, &config, 3).unwrap();
        let values = [10u64, 20, 4].map(Mersenne61::from);
        for result in open_linear_combination(dealer, setups, values).await {
            assert_eq!(
                result,
                Ok(vec![Mersenne61::from(expected(10, 20, 4)), -values[0]])
            );
        }
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!("spdz".parse(), Ok(SharingScheme::AdditiveMac));
        assert_eq!("rep3".parse(), Ok(SharingScheme::Replicated3));
        assert_eq!("shamir".parse(), Ok(SharingScheme::ShamirThreshold));
        assert!("yao".parse::<SharingScheme>().is_err());
    }
}
