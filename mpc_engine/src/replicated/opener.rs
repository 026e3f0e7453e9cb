use std::collections::VecDeque;

use async_trait::async_trait;
use digest::Digest;
use itertools::Itertools;
use sha3::Sha3_256;
use tracing::{debug, warn};

use crate::{
    codec::{decode_values, encode_values},
    config::ReplicatedCheck,
    error::ProtocolError,
    fields::MpcRing,
    transport::Player,
    Opener, Share,
};

use super::{Rep3Share, NUM_PARTIES};

/// Reconstruction material for one opening.
struct Received<T> {
    local_sum: T,
    /// `x_{i-1}` as sent by party `i-1`.
    from_prev: T,
    /// `x_{i-1}` as sent by party `i+1`, in communication mode only.
    from_next: Option<T>,
}

/// Opener for [`Rep3Share`]s.
///
/// Each party only misses the sub-share `x_{i-1}`, which party `i-1` passes along the ring.
/// In [`ReplicatedCheck::Hash`] mode all opened values are hashed and the digests are compared at
/// [`Opener::check`]. In [`ReplicatedCheck::Communication`] mode party `i+1` sends the same
/// sub-share too and both copies are compared in [`Opener::finalize_open`].
pub struct ReplicatedOpener<T> {
    party_id: usize,
    mode: ReplicatedCheck,
    batch: Vec<Rep3Share<T>>,
    received: VecDeque<Received<T>>,
    hasher: Sha3_256,
    needs_checking: bool,
    poisoned: bool,
}

impl<T: MpcRing> ReplicatedOpener<T> {
    pub fn new(party_id: usize, mode: ReplicatedCheck) -> Self {
        Self {
            party_id,
            mode,
            batch: Vec::new(),
            received: VecDeque::new(),
            hasher: Sha3_256::new(),
            needs_checking: false,
            poisoned: false,
        }
    }

    pub fn mode(&self) -> ReplicatedCheck {
        self.mode
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
}

#[async_trait(?Send)]
impl<T: MpcRing> Opener for ReplicatedOpener<T> {
    type Share = Rep3Share<T>;

    fn party_id(&self) -> usize {
        self.party_id
    }

    fn init_open(&mut self, n: usize) {
        self.batch.clear();
        self.received.clear();
        self.batch.reserve(n);
    }

    fn prepare_open(&mut self, share: &Rep3Share<T>) {
        self.batch.push(*share);
    }

    async fn exchange(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        if player.num_players() != NUM_PARTIES {
            return Err(ProtocolError::ProtocolMisuse(
                "replicated sharing requires exactly three parties",
            ));
        }
        if self.batch.is_empty() {
            return Ok(());
        }
        debug!(
            party = self.party_id,
            size = self.batch.len(),
            mode = ?self.mode,
            "Opening replicated batch"
        );

        let own = encode_values(self.batch.iter().map(|share| &share.shares[0]));
        let bytes = player.pass_around(own, 1).await?;
        let from_prev = decode_values::<T>(&bytes, Some(self.batch.len()))?;

        let from_next: Vec<Option<T>> = if self.mode == ReplicatedCheck::Communication {
            let next = encode_values(self.batch.iter().map(|share| &share.shares[1]));
            let bytes = player.pass_around(next, 2).await?;
            decode_values::<T>(&bytes, Some(self.batch.len()))?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; self.batch.len()]
        };

        for ((share, from_prev), from_next) in self.batch.drain(..).zip(from_prev).zip(from_next) {
            self.received.push_back(Received {
                local_sum: share.sum(),
                from_prev,
                from_next,
            });
        }
        Ok(())
    }

    fn finalize_open(&mut self) -> Result<T, ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        let received = self
            .received
            .pop_front()
            .ok_or(ProtocolError::ProtocolMisuse(
                "finalize_open called without opened values",
            ))?;

        if let Some(from_next) = received.from_next {
            if from_next != received.from_prev {
                warn!(party = self.party_id, "Replicated sub-shares disagree");
                return Err(self.fail(ProtocolError::MacFail));
            }
        }

        let value = received.local_sum + received.from_prev;
        if self.mode == ReplicatedCheck::Hash {
            let mut bytes = Vec::with_capacity(T::BYTES);
            value.write_bytes(&mut bytes);
            self.hasher.update(&bytes);
            self.needs_checking = true;
        }
        Ok(value)
    }

    async fn check(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        if !self.needs_checking {
            return Ok(());
        }
        let digest = self.hasher.clone().finalize().to_vec();
        let digests = match player.broadcast_and_receive(digest).await {
            Ok(digests) => digests,
            Err(err) => {
                warn!(party = self.party_id, %err, "Replicated check aborted");
                return Err(self.fail(err.into()));
            }
        };
        if !digests.iter().all_equal() {
            warn!(party = self.party_id, "Replicated opening hashes disagree");
            return Err(self.fail(ProtocolError::MacFail));
        }
        self.hasher.reset();
        self.needs_checking = false;
        Ok(())
    }

    fn pending_checks(&self) -> usize {
        usize::from(self.needs_checking)
    }

    fn constant(&self, value: T) -> Rep3Share<T> {
        Rep3Share::constant(value, self.party_id, ())
    }
}

impl<T> Drop for ReplicatedOpener<T> {
    fn drop(&mut self) {
        if self.needs_checking && !self.poisoned && !std::thread::panicking() {
            panic!("ReplicatedOpener dropped with unchecked openings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dealer::{ReplicatedDealer, ShareDealer};
    use crate::fields::{Mersenne61, Z64};
    use crate::simulation::simulate;
    use crate::transport::{BroadcastFault, FaultyPlayer, TransportError};
    use rand::{rngs::SmallRng, SeedableRng};

    const MODES: [ReplicatedCheck; 3] = [
        ReplicatedCheck::SemiHonest,
        ReplicatedCheck::Hash,
        ReplicatedCheck::Communication,
    ];

    /// Open `shares[id]` on party `id` and run a check afterwards.
    async fn open_all<T: MpcRing>(
        shares: Vec<Vec<Rep3Share<T>>>,
        mode: ReplicatedCheck,
    ) -> Vec<(Result<Vec<T>, ProtocolError>, Result<(), ProtocolError>)> {
        simulate(3, |id, mut player| {
            let shares = shares[id].clone();
            async move {
                let mut mc = ReplicatedOpener::new(id, mode);
                let opened = mc.open_batch(&shares, &mut player).await;
                let checked = mc.check(&mut player).await;
                (opened, checked)
            }
        })
        .await
    }

    fn deal<T: MpcRing>(values: &[T], seed: u64) -> Vec<Vec<Rep3Share<T>>> {
        let mut dealer = ReplicatedDealer::new(SmallRng::seed_from_u64(seed));
        let mut parties = vec![Vec::new(); 3];
        for &value in values {
            for (party, share) in parties.iter_mut().zip(dealer.share(value)) {
                party.push(share);
            }
        }
        parties
    }

    #[tokio::test]
    async fn test_open_in_all_modes() {
        let values: Vec<Mersenne61> = (0..100u64).map(|x| Mersenne61::from(x * x)).collect();
        for mode in MODES {
            for (opened, checked) in open_all(deal(&values, 1), mode).await {
                assert_eq!(opened, Ok(values.clone()));
                assert_eq!(checked, Ok(()));
            }
        }
    }

    /// Secret 7 split as (3, 2, 2); party 1 reports its sub-share x_1 as 5 instead of 2.
    fn seven_with_lying_party() -> Vec<Vec<Rep3Share<Z64>>> {
        vec![
            vec![Rep3Share::new(Z64(3), Z64(2))],
            vec![Rep3Share::new(Z64(5), Z64(2))],
            vec![Rep3Share::new(Z64(2), Z64(3))],
        ]
    }

    #[tokio::test]
    async fn test_honest_seven_reconstructs() {
        let shares = vec![
            vec![Rep3Share::new(Z64(3), Z64(2))],
            vec![Rep3Share::new(Z64(2), Z64(2))],
            vec![Rep3Share::new(Z64(2), Z64(3))],
        ];
        for (opened, checked) in open_all(shares, ReplicatedCheck::Hash).await {
            assert_eq!(opened, Ok(vec![Z64(7)]));
            assert_eq!(checked, Ok(()));
        }
    }

    #[tokio::test]
    async fn test_hash_mode_catches_inconsistent_sub_share() {
        let results = open_all(seven_with_lying_party(), ReplicatedCheck::Hash).await;
        // Party 0 reconstructs correctly, the lie propagates to the others.
        assert_eq!(results[0].0, Ok(vec![Z64(7)]));
        assert_eq!(results[2].0, Ok(vec![Z64(10)]));
        for (_, checked) in results {
            assert_eq!(checked, Err(ProtocolError::MacFail));
        }
    }

    #[tokio::test]
    async fn test_communication_mode_catches_inconsistent_sub_share() {
        let results = open_all(seven_with_lying_party(), ReplicatedCheck::Communication).await;
        // Party 2 receives x_1 from both party 1 and party 0.
        assert_eq!(results[2].0, Err(ProtocolError::MacFail));
        assert_eq!(results[0].0, Ok(vec![Z64(7)]));
    }

    #[tokio::test]
    async fn test_fifo_order_for_many_batch_sizes() {
        let mut rng = SmallRng::seed_from_u64(11);
        for size in [0, 1, 2, 17, 250, 1000] {
            let values: Vec<Z64> = (0..size).map(|_| Z64::random(&mut rng)).collect();
            for (opened, checked) in open_all(deal(&values, size as u64), ReplicatedCheck::Hash).await
            {
                assert_eq!(opened, Ok(values.clone()));
                assert_eq!(checked, Ok(()));
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_number_of_players_is_misuse() {
        let results = simulate(2, |id, mut player| async move {
            let mut mc = ReplicatedOpener::<Z64>::new(id, ReplicatedCheck::SemiHonest);
            mc.open_batch(&[Rep3Share::zero()], &mut player).await
        })
        .await;
        for result in results {
            assert!(matches!(result, Err(ProtocolError::ProtocolMisuse(_))));
        }
    }

    #[tokio::test]
    async fn test_empty_check_sends_nothing() {
        for mode in MODES {
            let results = simulate(3, |id, player| async move {
                // Any broadcast would fail.
                let mut player = FaultyPlayer::new(player, 0, BroadcastFault::Fail);
                let mut mc = ReplicatedOpener::<Z64>::new(id, mode);
                let checked = mc.check(&mut player).await;
                (checked, mc.pending_checks())
            })
            .await;
            for result in results {
                assert_eq!(result, (Ok(()), 0), "mode {mode:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_failed_check_keeps_hash_pending() {
        let values = [Z64(1), Z64(2), Z64(3)];
        let shares = deal(&values, 3);
        let results = simulate(3, |id, player| {
            let shares = shares[id].clone();
            async move {
                let mut player = FaultyPlayer::new(player, 0, BroadcastFault::Fail);
                let mut mc = ReplicatedOpener::new(id, ReplicatedCheck::Hash);
                let opened = mc.open_batch(&shares, &mut player).await;
                let pending_before = mc.pending_checks();
                let first = mc.check(&mut player).await;
                let pending_after = mc.pending_checks();
                let second = mc.check(&mut player).await;
                (
                    opened,
                    pending_before,
                    first,
                    pending_after,
                    second,
                    mc.is_poisoned(),
                )
            }
        })
        .await;
        for (id, result) in results.into_iter().enumerate() {
            assert_eq!(
                result,
                (
                    Ok(values.to_vec()),
                    1,
                    Err(ProtocolError::Transport(TransportError::Send((id + 1) % 3))),
                    1,
                    Err(ProtocolError::MacFail),
                    true
                )
            );
        }
    }
}
