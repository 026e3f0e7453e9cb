//! Trusted dealers and precomputed preprocessing.
//!
//! A [`ShareDealer`] knows every secret it shares and hands out the shares of all parties at
//! once. This is insecure and meant for tests and simulations. [`generate_preprocessing`] uses a
//! dealer to produce the per-party [`PrecomputedData`] bundles that a [`PrecomputedDealer`]
//! serves during the online phase.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    marker::PhantomData,
    path::Path,
};

use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::ProtocolError,
    fields::{MpcField, MpcRing},
    replicated::{Rep3Share, NUM_PARTIES},
    shamir::{evaluate, ShamirShare},
    spdz::SpdzShare,
    Preprocessing, Share, SharingScheme,
};

/// Shares values for all parties of one sharing scheme.
pub trait ShareDealer {
    type Share: Share;

    fn num_parties(&self) -> usize;

    /// MAC-key material of every party, indexed by party ID.
    fn mac_keys(&self) -> Vec<<Self::Share as Share>::MacKey>;

    /// Shares of `value`, indexed by party ID.
    fn share(&mut self, value: <Self::Share as Share>::Clear) -> Vec<Self::Share>;

    /// Uniformly random clear value.
    fn random_value(&mut self) -> <Self::Share as Share>::Clear;

    /// Uniformly random bit as clear value.
    fn random_bit(&mut self) -> <Self::Share as Share>::Clear;
}

/// Split `value` into `n` random additive parts.
fn additive_split<T: MpcRing>(rng: &mut impl Rng, value: T, n: usize) -> Vec<T> {
    let mut parts: Vec<T> = (1..n).map(|_| T::random(rng)).collect();
    let rest = parts.iter().fold(value, |acc, &part| acc - part);
    parts.insert(0, rest);
    parts
}

fn random_bit<T: MpcRing>(rng: &mut impl Rng) -> T {
    if rng.gen() {
        T::one()
    } else {
        T::zero()
    }
}

/// Dealer of MAC-authenticated additive shares.
pub struct AdditiveDealer<T, R> {
    key_shares: Vec<T>,
    key: T,
    rng: R,
}

impl<T: MpcField, R: Rng> AdditiveDealer<T, R> {
    /// Create dealer for `num_parties` parties with a fresh random MAC key.
    pub fn new(num_parties: usize, mut rng: R) -> Self {
        let key_shares: Vec<T> = (0..num_parties).map(|_| T::random(&mut rng)).collect();
        let key = key_shares.iter().fold(T::zero(), |acc, &x| acc + x);
        Self {
            key_shares,
            key,
            rng,
        }
    }

    /// Global MAC key.
    pub fn mac_key(&self) -> T {
        self.key
    }
}

impl<T: MpcField, R: Rng> ShareDealer for AdditiveDealer<T, R> {
    type Share = SpdzShare<T>;

    fn num_parties(&self) -> usize {
        self.key_shares.len()
    }

    fn mac_keys(&self) -> Vec<T> {
        self.key_shares.clone()
    }

    fn share(&mut self, value: T) -> Vec<SpdzShare<T>> {
        let n = self.num_parties();
        let values = additive_split(&mut self.rng, value, n);
        let macs = additive_split(&mut self.rng, value * self.key, n);
        values
            .into_iter()
            .zip(macs)
            .map(|(value, mac)| SpdzShare { value, mac })
            .collect()
    }

    fn random_value(&mut self) -> T {
        T::random(&mut self.rng)
    }

    fn random_bit(&mut self) -> T {
        random_bit(&mut self.rng)
    }
}

/// Dealer of 3-party replicated shares.
pub struct ReplicatedDealer<T, R> {
    rng: R,
    _ring: PhantomData<T>,
}

impl<T: MpcRing, R: Rng> ReplicatedDealer<T, R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            _ring: PhantomData,
        }
    }
}

impl<T: MpcRing, R: Rng> ShareDealer for ReplicatedDealer<T, R> {
    type Share = Rep3Share<T>;

    fn num_parties(&self) -> usize {
        NUM_PARTIES
    }

    fn mac_keys(&self) -> Vec<()> {
        vec![(); NUM_PARTIES]
    }

    fn share(&mut self, value: T) -> Vec<Rep3Share<T>> {
        let parts = additive_split(&mut self.rng, value, NUM_PARTIES);
        (0..NUM_PARTIES)
            .map(|i| Rep3Share::new(parts[i], parts[(i + 1) % NUM_PARTIES]))
            .collect()
    }

    fn random_value(&mut self) -> T {
        T::random(&mut self.rng)
    }

    fn random_bit(&mut self) -> T {
        random_bit(&mut self.rng)
    }
}

/// Dealer of Shamir shares of degree `threshold`.
pub struct ShamirDealer<T, R> {
    num_parties: usize,
    threshold: usize,
    rng: R,
    _field: PhantomData<T>,
}

impl<T: MpcField, R: Rng> ShamirDealer<T, R> {
    pub fn new(num_parties: usize, threshold: usize, rng: R) -> Result<Self, ProtocolError> {
        if threshold >= num_parties {
            return Err(ProtocolError::InvalidParameters(format!(
                "threshold {threshold} must be below the number of parties {num_parties}"
            )));
        }
        Ok(Self {
            num_parties,
            threshold,
            rng,
            _field: PhantomData,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl<T: MpcField, R: Rng> ShareDealer for ShamirDealer<T, R> {
    type Share = ShamirShare<T>;

    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn mac_keys(&self) -> Vec<()> {
        vec![(); self.num_parties]
    }

    fn share(&mut self, value: T) -> Vec<ShamirShare<T>> {
        let mut coefficients = vec![value];
        coefficients.extend((0..self.threshold).map(|_| T::random(&mut self.rng)));
        (1..=self.num_parties as u64)
            .map(|x| ShamirShare(evaluate(&coefficients, T::from(x))))
            .collect()
    }

    fn random_value(&mut self) -> T {
        T::random(&mut self.rng)
    }

    fn random_bit(&mut self) -> T {
        random_bit(&mut self.rng)
    }
}

/// Amounts of correlated randomness to generate per party.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreprocessingCounts {
    pub triples: usize,
    pub bits: usize,
    /// Number of input masks for each input owner.
    pub input_masks: usize,
}

/// Precomputed correlated randomness of one party.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(bound(
    serialize = "S: Serialize, S::Clear: Serialize, S::MacKey: Serialize",
    deserialize = "S: DeserializeOwned, S::Clear: DeserializeOwned, S::MacKey: DeserializeOwned"
))]
pub struct PrecomputedData<S: Share> {
    /// Scheme the shares were dealt for, checked on load.
    pub scheme: SharingScheme,
    pub num_parties: usize,
    pub party_id: usize,
    pub mac_key: S::MacKey,
    pub beaver_triples: Vec<(S, S, S)>,
    pub random_bits: Vec<S>,
    /// Masks for inputs of each party, indexed by input owner.
    pub input_masks: Vec<Vec<S>>,
    /// Plain values of this party's own input masks.
    pub input_masks_plain: Vec<S::Clear>,
}

impl<S> PrecomputedData<S>
where
    S: Share + Serialize + DeserializeOwned,
    S::Clear: Serialize + DeserializeOwned,
    S::MacKey: Serialize + DeserializeOwned,
{
    /// Load precomputed data from file. Fails if the file was dealt for another scheme.
    pub fn load_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let data: Self = bincode::deserialize_from(reader)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        if data.scheme != S::SCHEME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "preprocessing was dealt for {:?}, expected {:?}",
                    data.scheme,
                    S::SCHEME
                ),
            ));
        }
        Ok(data)
    }

    /// Save precomputed data to file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

/// Generate preprocessing for every party, indexed by party ID.
pub fn generate_preprocessing<D: ShareDealer>(
    dealer: &mut D,
    counts: &PreprocessingCounts,
) -> Vec<PrecomputedData<D::Share>> {
    let n = dealer.num_parties();
    let mut data: Vec<PrecomputedData<D::Share>> = dealer
        .mac_keys()
        .into_iter()
        .enumerate()
        .map(|(party_id, mac_key)| PrecomputedData {
            scheme: D::Share::SCHEME,
            num_parties: n,
            party_id,
            mac_key,
            beaver_triples: Vec::with_capacity(counts.triples),
            random_bits: Vec::with_capacity(counts.bits),
            input_masks: vec![Vec::with_capacity(counts.input_masks); n],
            input_masks_plain: Vec::with_capacity(counts.input_masks),
        })
        .collect();

    for _ in 0..counts.triples {
        let a = dealer.random_value();
        let b = dealer.random_value();
        let shares_a = dealer.share(a);
        let shares_b = dealer.share(b);
        let shares_c = dealer.share(a * b);
        let triples = shares_a.into_iter().zip(shares_b).zip(shares_c);
        for (party, ((a, b), c)) in data.iter_mut().zip(triples) {
            party.beaver_triples.push((a, b, c));
        }
    }

    for _ in 0..counts.bits {
        let bit = dealer.random_bit();
        for (party, share) in data.iter_mut().zip(dealer.share(bit)) {
            party.random_bits.push(share);
        }
    }

    for owner in 0..n {
        for _ in 0..counts.input_masks {
            let mask = dealer.random_value();
            for (party, share) in data.iter_mut().zip(dealer.share(mask)) {
                party.input_masks[owner].push(share);
            }
            data[owner].input_masks_plain.push(mask);
        }
    }

    data
}

/// Preprocessing source that serves precomputed data.
pub struct PrecomputedDealer<S: Share> {
    data: PrecomputedData<S>,
}

impl<S: Share> PrecomputedDealer<S> {
    /// Create new dealer given precomputed data.
    pub fn new(data: PrecomputedData<S>) -> Self {
        Self { data }
    }

    pub fn party_id(&self) -> usize {
        self.data.party_id
    }

    pub fn num_parties(&self) -> usize {
        self.data.num_parties
    }

    pub fn mac_key(&self) -> S::MacKey {
        self.data.mac_key
    }

    /// Number of triples left.
    pub fn remaining_triples(&self) -> usize {
        self.data.beaver_triples.len()
    }
}

impl<S: Share> Preprocessing<S> for PrecomputedDealer<S> {
    fn get_triple(&mut self) -> Result<(S, S, S), ProtocolError> {
        self.data
            .beaver_triples
            .pop()
            .ok_or(ProtocolError::InsufficientPreprocessing { kind: "triple" })
    }

    fn get_bit(&mut self) -> Result<S, ProtocolError> {
        self.data
            .random_bits
            .pop()
            .ok_or(ProtocolError::InsufficientPreprocessing { kind: "bit" })
    }

    fn get_input_mask(&mut self, player: usize) -> Result<(S, Option<S::Clear>), ProtocolError> {
        let exhausted = ProtocolError::InsufficientPreprocessing { kind: "input mask" };
        let masks = self.data.input_masks.get_mut(player).ok_or_else(|| {
            ProtocolError::InvalidParameters(format!("no input masks for party {player}"))
        })?;
        let mask = masks.pop().ok_or_else(|| exhausted.clone())?;
        if player == self.data.party_id {
            let plain = self.data.input_masks_plain.pop().ok_or(exhausted)?;
            Ok((mask, Some(plain)))
        } else {
            Ok((mask, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Mersenne61, Z64};
    use crate::shamir::reconstruction_coefficients;
    use proptest::prelude::*;
    use rand::{rngs::SmallRng, SeedableRng};

    type Fp = Mersenne61;

    fn counts() -> PreprocessingCounts {
        PreprocessingCounts {
            triples: 5,
            bits: 4,
            input_masks: 3,
        }
    }

    #[test]
    fn test_additive_shares_are_authenticated() {
        let mut dealer = AdditiveDealer::<Fp, _>::new(4, SmallRng::seed_from_u64(1));
        let shares = dealer.share(Fp::from(42));
        let value = shares.iter().fold(Fp::zero(), |acc, s| acc + s.value);
        let mac = shares.iter().fold(Fp::zero(), |acc, s| acc + s.mac);
        assert_eq!(value, Fp::from(42));
        assert_eq!(mac, Fp::from(42) * dealer.mac_key());
        let key = dealer.mac_keys().iter().fold(Fp::zero(), |acc, &k| acc + k);
        assert_eq!(key, dealer.mac_key());
    }

    #[test]
    fn test_replicated_sub_shares_overlap() {
        let mut dealer = ReplicatedDealer::new(SmallRng::seed_from_u64(2));
        let shares = dealer.share(Z64(7));
        for i in 0..3 {
            assert_eq!(shares[i].shares[1], shares[(i + 1) % 3].shares[0]);
        }
        assert_eq!(shares[0].sum() + shares[1].shares[1], Z64(7));
    }

    #[test]
    fn test_shamir_shares_interpolate() {
        let mut dealer = ShamirDealer::new(5, 2, SmallRng::seed_from_u64(3)).unwrap();
        let shares = dealer.share(Fp::from(99));
        let lambdas = reconstruction_coefficients::<Fp>(3).unwrap();
        let secret = shares
            .iter()
            .zip(&lambdas)
            .fold(Fp::zero(), |acc, (s, &l)| acc + s.0 * l);
        assert_eq!(secret, Fp::from(99));
        assert!(ShamirDealer::<Fp, _>::new(3, 3, SmallRng::seed_from_u64(3)).is_err());
    }

    #[test]
    fn test_generated_triples_multiply() {
        let mut dealer = ReplicatedDealer::<Z64, _>::new(SmallRng::seed_from_u64(4));
        let data = generate_preprocessing(&mut dealer, &counts());
        assert_eq!(data.len(), 3);
        let open = |shares: Vec<Rep3Share<Z64>>| shares[0].sum() + shares[1].shares[1];
        for k in 0..5 {
            let a = open(data.iter().map(|d| d.beaver_triples[k].0).collect());
            let b = open(data.iter().map(|d| d.beaver_triples[k].1).collect());
            let c = open(data.iter().map(|d| d.beaver_triples[k].2).collect());
            assert_eq!(a * b, c);
        }
        for k in 0..4 {
            let bit = open(data.iter().map(|d| d.random_bits[k]).collect());
            assert!(bit == Z64(0) || bit == Z64(1));
        }
    }

    #[test]
    fn test_own_input_masks_come_with_plain_value() {
        let mut dealer = AdditiveDealer::<Fp, _>::new(2, SmallRng::seed_from_u64(5));
        let mut data = generate_preprocessing(&mut dealer, &counts());
        let mut second = PrecomputedDealer::new(data.pop().unwrap());
        let mut first = PrecomputedDealer::new(data.pop().unwrap());

        let (own, plain) = first.get_input_mask(0).unwrap();
        let (other, none) = second.get_input_mask(0).unwrap();
        assert_eq!(none, None);
        assert_eq!(Some(own.value + other.value), plain);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let mut dealer = ShamirDealer::<Fp, _>::new(3, 1, SmallRng::seed_from_u64(6)).unwrap();
        let data = generate_preprocessing(&mut dealer, &counts());
        let mut prep = PrecomputedDealer::new(data[1].clone());
        for _ in 0..5 {
            prep.get_triple().unwrap();
        }
        assert_eq!(
            prep.get_triple(),
            Err(ProtocolError::InsufficientPreprocessing { kind: "triple" })
        );
        for _ in 0..3 {
            prep.get_input_mask(2).unwrap();
        }
        assert!(matches!(
            prep.get_input_mask(2),
            Err(ProtocolError::InsufficientPreprocessing { .. })
        ));
        assert!(matches!(
            prep.get_input_mask(7),
            Err(ProtocolError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_data_survives_file_round_trip() {
        let mut dealer = AdditiveDealer::<Fp, _>::new(2, SmallRng::seed_from_u64(7));
        let data = generate_preprocessing(&mut dealer, &counts());
        let path = std::env::temp_dir().join(format!("mpc_engine_prep_{}.bin", std::process::id()));
        data[0].save_file(&path).unwrap();
        let loaded = PrecomputedData::<SpdzShare<Fp>>::load_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.beaver_triples, data[0].beaver_triples);
        assert_eq!(loaded.mac_key, data[0].mac_key);
        assert_eq!(loaded.scheme, SharingScheme::AdditiveMac);
    }

    #[test]
    fn test_load_rejects_data_for_other_scheme() {
        let mut dealer = AdditiveDealer::<Fp, _>::new(2, SmallRng::seed_from_u64(8));
        let mut data = generate_preprocessing(&mut dealer, &counts()).remove(1);
        data.scheme = SharingScheme::ShamirThreshold;
        let path = std::env::temp_dir().join(format!("mpc_engine_scheme_{}.bin", std::process::id()));
        data.save_file(&path).unwrap();
        let loaded = PrecomputedData::<SpdzShare<Fp>>::load_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    proptest! {
        #[test]
        fn dealt_shares_are_linear(seed in any::<u64>(), x in any::<u64>(), y in any::<u64>(), c in any::<u64>()) {
            let mut dealer = ReplicatedDealer::new(SmallRng::seed_from_u64(seed));
            let (xs, ys) = (dealer.share(Z64(x)), dealer.share(Z64(y)));
            let combined: Vec<_> = xs.iter().zip(&ys).map(|(&a, &b)| a * Z64(c) + b).collect();
            let opened = combined[0].sum() + combined[1].shares[1];
            prop_assert_eq!(opened, Z64(x.wrapping_mul(c).wrapping_add(y)));

            let mut dealer = AdditiveDealer::<Fp, _>::new(3, SmallRng::seed_from_u64(seed));
            let (xs, ys) = (dealer.share(Fp::from(x)), dealer.share(Fp::from(y)));
            let combined: Vec<_> = xs.iter().zip(&ys).map(|(&a, &b)| a - b).collect();
            let value = combined.iter().fold(Fp::zero(), |acc, s| acc + s.value);
            let mac = combined.iter().fold(Fp::zero(), |acc, s| acc + s.mac);
            prop_assert_eq!(value, Fp::from(x) - Fp::from(y));
            prop_assert_eq!(mac, value * dealer.mac_key());
        }
    }
}
