//! Commit-then-reveal broadcast and the coin toss built on it.

use digest::Digest;
use rand::{CryptoRng, RngCore};
use sha3::Sha3_256;
use tracing::warn;

use crate::{error::ProtocolError, transport::Player};

/// Length of commitment nonces and shared seeds.
pub const SEED_SIZE: usize = 32;

/// Commitment to `payload` under `nonce`.
fn commitment(nonce: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(nonce);
    hasher.update(payload);
    hasher.finalize().to_vec()
}

/// Broadcast `payload` so that nobody can choose theirs after seeing the others.
///
/// Costs two rounds: commitments first, then openings. Returns every party's payload indexed by
/// party ID. An opening that does not match its commitment is reported as
/// [`ProtocolError::MacFail`].
pub async fn commit_and_open(
    player: &mut dyn Player,
    payload: Vec<u8>,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let mut nonce = [0u8; SEED_SIZE];
    rng.fill_bytes(&mut nonce);

    let commitments = player
        .broadcast_and_receive(commitment(&nonce, &payload))
        .await?;

    let mut opening = nonce.to_vec();
    opening.extend_from_slice(&payload);
    let openings = player.broadcast_and_receive(opening).await?;

    openings
        .into_iter()
        .zip(commitments)
        .enumerate()
        .map(|(id, (mut opening, commitment_bytes))| {
            if opening.len() < SEED_SIZE {
                return Err(ProtocolError::InvalidShareSet(format!(
                    "opening from party {id} is too short"
                )));
            }
            let payload = opening.split_off(SEED_SIZE);
            if commitment(&opening, &payload) != commitment_bytes {
                warn!(party = id, "opening does not match commitment");
                return Err(ProtocolError::MacFail);
            }
            Ok(payload)
        })
        .collect()
}

/// Jointly sample a seed no single party can bias.
pub async fn shared_seed(
    player: &mut dyn Player,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<[u8; SEED_SIZE], ProtocolError> {
    let mut own = [0u8; SEED_SIZE];
    rng.fill_bytes(&mut own);

    let mut seed = [0u8; SEED_SIZE];
    for contribution in commit_and_open(player, own.to_vec(), rng).await? {
        if contribution.len() != SEED_SIZE {
            return Err(ProtocolError::InvalidShareSet(
                "seed contribution has wrong length".to_string(),
            ));
        }
        for (s, c) in seed.iter_mut().zip(contribution) {
            *s ^= c;
        }
    }
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock_multiparty_channels;
    use rand::{rngs::StdRng, SeedableRng};

    #[tokio::test]
    async fn test_all_parties_agree_on_seed() {
        let players = mock_multiparty_channels::<Vec<u8>>(4, 1 << 16);
        let seeds = futures::future::join_all(players.into_iter().map(|mut p| async move {
            let mut rng = StdRng::seed_from_u64(p.my_id() as u64);
            shared_seed(&mut p, &mut rng).await.unwrap()
        }))
        .await;
        assert!(seeds.iter().all(|s| *s == seeds[0]));
        assert_ne!(seeds[0], [0u8; SEED_SIZE]);
    }

    #[tokio::test]
    async fn test_commit_and_open_returns_payloads_in_party_order() {
        let players = mock_multiparty_channels::<Vec<u8>>(3, 1 << 16);
        let results = futures::future::join_all(players.into_iter().map(|mut p| async move {
            let mut rng = StdRng::seed_from_u64(7 + p.my_id() as u64);
            let payload = vec![p.my_id() as u8; 3];
            commit_and_open(&mut p, payload, &mut rng).await.unwrap()
        }))
        .await;
        for result in results {
            assert_eq!(result, vec![vec![0; 3], vec![1; 3], vec![2; 3]]);
        }
    }

    #[test]
    fn test_commitment_binds_payload() {
        let nonce = [1u8; SEED_SIZE];
        assert_ne!(commitment(&nonce, b"abc"), commitment(&nonce, b"abd"));
        assert_ne!(commitment(&nonce, b"abc"), commitment(&[2u8; SEED_SIZE], b"abc"));
    }
}
