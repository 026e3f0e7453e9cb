use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    codec::{decode_values, encode_values},
    error::ProtocolError,
    fields::MpcField,
    transport::Player,
    Opener, Share,
};

use super::{reconstruction_coefficients, ShamirShare};

/// Opener for [`ShamirShare`]s.
///
/// Only the first `t + 1` parties (`2t + 1` when malicious) send their evaluations, every party
/// receives them. In malicious mode the value interpolated from the first `t + 1` evaluations is
/// compared to interpolations over the first `t + 2, ..., 2t + 1` evaluations, so a single
/// evaluation off the polynomial makes [`Opener::finalize_open`] fail.
pub struct ShamirOpener<T> {
    party_id: usize,
    num_parties: usize,
    threshold: usize,
    malicious: bool,
    /// `reconstructions[k]` interpolates from the first `threshold + 1 + k` parties.
    reconstructions: Vec<Vec<T>>,
    batch: Vec<ShamirShare<T>>,
    received: VecDeque<Vec<T>>,
    poisoned: bool,
}

impl<T: MpcField> ShamirOpener<T> {
    /// Create opener for polynomials of degree `threshold`.
    pub fn new(
        party_id: usize,
        num_parties: usize,
        threshold: usize,
        malicious: bool,
    ) -> Result<Self, ProtocolError> {
        let relevant = if malicious {
            2 * threshold + 1
        } else {
            threshold + 1
        };
        if num_parties < relevant {
            return Err(ProtocolError::InvalidParameters(format!(
                "threshold {threshold} needs {relevant} parties, only {num_parties} present"
            )));
        }
        if party_id >= num_parties {
            return Err(ProtocolError::InvalidParameters(format!(
                "party {party_id} out of range"
            )));
        }
        let reconstructions = (threshold + 1..=relevant)
            .map(reconstruction_coefficients)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            party_id,
            num_parties,
            threshold,
            malicious,
            reconstructions,
            batch: Vec::new(),
            received: VecDeque::new(),
            poisoned: false,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of parties whose evaluations are needed.
    fn relevant_parties(&self) -> usize {
        self.threshold + self.reconstructions.len()
    }

    /// Poison the opener and hand back `err`.
    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        self.poisoned = true;
        err
    }
}

#[async_trait(?Send)]
impl<T: MpcField> Opener for ShamirOpener<T> {
    type Share = ShamirShare<T>;

    fn party_id(&self) -> usize {
        self.party_id
    }

    fn init_open(&mut self, n: usize) {
        self.batch.clear();
        self.received.clear();
        self.batch.reserve(n);
    }

    fn prepare_open(&mut self, share: &ShamirShare<T>) {
        self.batch.push(*share);
    }

    async fn exchange(&mut self, player: &mut dyn Player) -> Result<(), ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        if player.num_players() != self.num_parties {
            return Err(ProtocolError::ProtocolMisuse(
                "player count differs from Shamir parameters",
            ));
        }
        if self.batch.is_empty() {
            return Ok(());
        }
        let n = self.num_parties;
        let relevant = self.relevant_parties();
        let count = self.batch.len();
        debug!(
            party = self.party_id,
            size = count,
            senders = relevant,
            "Opening Shamir batch"
        );

        let own = encode_values(self.batch.iter().map(|share| &share.0));
        let mut evaluations: Vec<Vec<T>> = vec![Vec::new(); relevant];
        if self.party_id < relevant {
            evaluations[self.party_id] = self.batch.iter().map(|share| share.0).collect();
        }

        let send = self.party_id < relevant;
        for offset in 1..n {
            let send_to = (self.party_id + offset) % n;
            let receive_from = (self.party_id + n - offset) % n;
            let receive = receive_from < relevant;
            let bytes = match (send, receive) {
                (true, true) => Some(player.pass_around(own.clone(), offset).await?),
                (true, false) => {
                    player.send_to(send_to, own.clone()).await?;
                    None
                }
                (false, true) => Some(player.receive_from(receive_from).await?),
                (false, false) => None,
            };
            if let Some(bytes) = bytes {
                evaluations[receive_from] = decode_values::<T>(&bytes, Some(count))?;
            }
        }

        for i in 0..count {
            self.received
                .push_back(evaluations.iter().map(|column| column[i]).collect());
        }
        self.batch.clear();
        Ok(())
    }

    fn finalize_open(&mut self) -> Result<T, ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        let evaluations = self
            .received
            .pop_front()
            .ok_or(ProtocolError::ProtocolMisuse(
                "finalize_open called without opened values",
            ))?;

        let interpolate = |coefficients: &[T]| {
            coefficients
                .iter()
                .zip(&evaluations)
                .fold(T::zero(), |acc, (&l, &y)| acc + l * y)
        };

        let value = interpolate(&self.reconstructions[0]);
        let consistent = !self.malicious
            || self.reconstructions[1..]
                .iter()
                .all(|coefficients| interpolate(coefficients) == value);
        if !consistent {
            warn!(party = self.party_id, "Redundant Shamir reconstruction disagrees");
            return Err(self.fail(ProtocolError::MacFail));
        }
        Ok(value)
    }

    /// Shamir openings are verified when finalized, nothing is deferred.
    async fn check(&mut self, _player: &mut dyn Player) -> Result<(), ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::MacFail);
        }
        Ok(())
    }

    fn pending_checks(&self) -> usize {
        0
    }

    fn constant(&self, value: T) -> ShamirShare<T> {
        ShamirShare::constant(value, self.party_id, ())
    }
}
