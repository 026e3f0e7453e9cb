use std::collections::VecDeque;

use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, warn};

use crate::{
    codec::{decode_values, encode_values},
    commit::{commit_and_open, shared_seed},
    config::ProtocolConfig,
    error::ProtocolError,
    fields::MpcField,
    transport::Player,
    Opener, Share,
};

use super::SpdzShare;

/// Values and MAC shares opened since the last successful check.
#[derive(Clone, Debug, Default)]
pub struct PendingChecks<T> {
    values: Vec<T>,
    macs: Vec<T>,
}

impl<T: MpcField> PendingChecks<T> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn push(&mut self, value: T, mac: T) {
        self.values.push(value);
        self.macs.push(mac);
    }

    fn clear(&mut self) {
        self.values.clear();
        self.macs.clear();
    }

    /// Per-item residuals `value * key - mac`. They sum to zero over all parties iff every MAC
    /// is correct.
    fn residuals(&self, mac_key: T) -> Vec<T> {
        self.values
            .iter()
            .zip(&self.macs)
            .map(|(&value, &mac)| value * mac_key - mac)
            .collect()
    }

    /// Random linear combination `sum(h * mac) - key * sum(h * value)` with coefficients drawn
    /// from `coefficients`.
    fn combined_residual(&self, mac_key: T, coefficients: &mut StdRng) -> T {
        let mut value = T::zero();
        let mut mac = T::zero();
        for (&x, &m) in self.values.iter().zip(&self.macs) {
            let h = T::random(coefficients);
            value += h * x;
            mac += h * m;
        }
        mac - mac_key * value
    }
}

/// Opener for [`SpdzShare`]s with deferred, batched MAC verification.
///
/// Opening only reveals value shares; the MAC shares of every opened value are kept until
/// [`Opener::check`] runs, which happens automatically once `check_threshold` values are pending.
/// Dropping a `MacCheck` with unchecked values panics.
pub struct MacCheck<T> {
    party_id: usize,
    mac_key: T,
    check_threshold: usize,
    small_check_threshold: usize,
    batch: Vec<SpdzShare<T>>,
    opened: VecDeque<T>,
    pending: PendingChecks<T>,
    rng: StdRng,
    poisoned: bool,
}

impl<T: MpcField> MacCheck<T> {
    /// Create new opener for party `party_id` holding MAC-key share `mac_key`.
    pub fn new(party_id: usize, mac_key: T, config: &ProtocolConfig) -> Self {
        Self::with_rng(party_id, mac_key, config, StdRng::from_entropy())
    }

    /// Same as [`MacCheck::new`] with explicit source of commitment nonces and seeds.
    pub fn with_rng(party_id: usize, mac_key: T, config: &ProtocolConfig, rng: StdRng) -> Self {
        Self {
            party_id,
            mac_key,
            check_threshold: config.check_threshold,
            small_check_threshold: config.small_check_threshold,
            batch: Vec::new(),
            opened: VecDeque::new(),
            pending: PendingChecks::default(),
            rng,
            poisoned: false,
        }
    }

    /// MAC-key share of this party.
    pub fn mac_key(&self) -> T {
        self.mac_key
    }

    /// Whether a failed check has made this opener unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Poison the opener and hand back `err`.
    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        self.poisoned = true;
        err
    }

    /// Commit to and open the exact residual of every pending value.
    async fn check_each(&mut self, player: &mut dyn Player) -> Result<bool, ProtocolError> {
        let residuals = self.pending.residuals(self.mac_key);
        let payload = encode_values(&residuals);
        let opened = commit_and_open(player, payload, &mut self.rng).await?;

        let mut sums = residuals;
        for (id, bytes) in opened.iter().enumerate() {
            if id == self.party_id {
                continue;
            }
            let theirs = decode_values::<T>(bytes, Some(sums.len()))?;
            for (sum, x) in sums.iter_mut().zip(theirs) {
                *sum += x;
            }
        }
        Ok(sums.iter().all(|x| x.is_zero()))
    }

    /// Commit to and open a random linear combination of all pending residuals.
    async fn check_combined(&mut self, player: &mut dyn Player) -> Result<bool, ProtocolError> {
        let seed = shared_seed(player, &mut self.rng).await?;
        let mut coefficients = StdRng::from_seed(seed);
        let tau = self
            .pending
            .combined_residual(self.mac_key, &mut coefficients);

        let opened = commit_and_open(player, encode_values(&[tau]), &mut self.rng).await?;
        let mut sum = T::zero();
        for bytes in &opened {
            sum += decode_values::<T>(bytes, Some(1))?[0];
        }
        Ok(sum.is_zero())
    }
}

#[async_trait(?Send)]
impl<T: MpcField> Opener for MacCheck<T> {
    type Share = SpdzShare<T>;

    fn party_id(&self) -> usize {
        self.party_id
    }

    fn init_open(&mut self, n: usize) {
        self.batch.clear();
        self.opened.clear();
        self.batch.reserve(n);
    }

    fn prepare_open(&mut self, share: &SpdzShare<T>) {
        self.batch.push(*share);
    }

    async fn exchange(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        if self.batch.is_empty() {
            return Ok(());
        }
        debug!(party = self.party_id, size = self.batch.len(), "Opening SPDZ batch");

        let payload = encode_values(self.batch.iter().map(|share| &share.value));
        let received = player.broadcast_and_receive(payload).await?;

        let mut values: Vec<T> = self.batch.iter().map(|share| share.value).collect();
        for (id, bytes) in received.iter().enumerate() {
            if id == self.party_id {
                continue;
            }
            let theirs = decode_values::<T>(bytes, Some(values.len()))?;
            for (value, x) in values.iter_mut().zip(theirs) {
                *value += x;
            }
        }

        for (share, &value) in self.batch.iter().zip(&values) {
            self.pending.push(value, share.mac);
        }
        self.opened.extend(values);
        self.batch.clear();

        if self.pending.len() >= self.check_threshold {
            self.check(player).await?;
        }
        Ok(())
    }

    fn finalize_open(&mut self) -> Result<T, ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        self.opened
            .pop_front()
            .ok_or(ProtocolError::ProtocolMisuse(
                "finalize_open called without opened values",
            ))
    }

    async fn check(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        debug!(
            party = self.party_id,
            pending = self.pending.len(),
            "Checking MACs"
        );

        let outcome = if self.pending.len() < self.small_check_threshold {
            self.check_each(player).await
        } else {
            self.check_combined(player).await
        };

        match outcome {
            Ok(true) => {
                self.pending.clear();
                Ok(())
            }
            Ok(false) => {
                warn!(party = self.party_id, "MAC check failed");
                Err(self.fail(ProtocolError::MacFail))
            }
            Err(err) => {
                warn!(party = self.party_id, %err, "MAC check aborted");
                Err(self.fail(err))
            }
        }
    }

    fn pending_checks(&self) -> usize {
        self.pending.len()
    }

    fn constant(&self, value: T) -> SpdzShare<T> {
        SpdzShare::constant(value, self.party_id, self.mac_key)
    }
}

impl<T> Drop for MacCheck<T> {
    fn drop(&mut self) {
        if !self.pending.values.is_empty() && !self.poisoned && !std::thread::panicking() {
            panic!(
                "MacCheck dropped with {} unchecked openings",
                self.pending.values.len()
            );
        }
    }
}
