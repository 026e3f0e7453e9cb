//! In-process simulation of all parties of a protocol.
//!
//! Parties are connected by tokio duplex pipes and polled concurrently on the current task, so
//! nothing here needs `Send`.

use std::future::Future;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::ProtocolConfig,
    dealer::{
        generate_preprocessing, AdditiveDealer, PrecomputedDealer, PreprocessingCounts,
        ReplicatedDealer, ShamirDealer,
    },
    error::ProtocolError,
    fields::{MpcField, MpcRing},
    replicated::{Rep3Share, ReplicatedOpener},
    shamir::{ShamirOpener, ShamirShare},
    spdz::{MacCheck, SpdzShare},
    transport::{mock_multiparty_channels, MockPlayer},
    Share,
};

/// Capacity of each simulated pipe in bytes.
const PIPE_CAPACITY: usize = 1 << 20;

/// Run `party(id, player)` for every party and collect the outputs by party ID.
pub async fn simulate<F, Fut, T>(num_parties: usize, party: F) -> Vec<T>
where
    F: Fn(usize, MockPlayer) -> Fut,
    Fut: Future<Output = T>,
{
    let players = mock_multiparty_channels::<Vec<u8>>(num_parties, PIPE_CAPACITY);
    futures::future::join_all(
        players
            .into_iter()
            .enumerate()
            .map(|(id, player)| party(id, player)),
    )
    .await
}

/// Everything one party needs besides its player.
pub struct PartySetup<O, S: Share> {
    pub opener: O,
    pub preprocessing: PrecomputedDealer<S>,
}

/// Dealer and per-party state for MAC-authenticated additive sharing.
pub fn setup_spdz<F: MpcField>(
    num_parties: usize,
    counts: &PreprocessingCounts,
    config: &ProtocolConfig,
    seed: u64,
) -> (
    AdditiveDealer<F, StdRng>,
    Vec<PartySetup<MacCheck<F>, SpdzShare<F>>>,
) {
    let mut dealer = AdditiveDealer::new(num_parties, StdRng::seed_from_u64(seed));
    let parties = generate_preprocessing(&mut dealer, counts)
        .into_iter()
        .map(|data| {
            let rng = StdRng::seed_from_u64(seed.wrapping_add(data.party_id as u64 + 1));
            PartySetup {
                opener: MacCheck::with_rng(data.party_id, data.mac_key, config, rng),
                preprocessing: PrecomputedDealer::new(data),
            }
        })
        .collect();
    (dealer, parties)
}

/// Dealer and per-party state for 3-party replicated sharing.
pub fn setup_replicated<T: MpcRing>(
    counts: &PreprocessingCounts,
    config: &ProtocolConfig,
    seed: u64,
) -> (
    ReplicatedDealer<T, StdRng>,
    Vec<PartySetup<ReplicatedOpener<T>, Rep3Share<T>>>,
) {
    let mut dealer = ReplicatedDealer::new(StdRng::seed_from_u64(seed));
    let parties = generate_preprocessing(&mut dealer, counts)
        .into_iter()
        .map(|data| PartySetup {
            opener: ReplicatedOpener::new(data.party_id, config.replicated_check),
            preprocessing: PrecomputedDealer::new(data),
        })
        .collect();
    (dealer, parties)
}

/// Dealer and per-party state for Shamir sharing with the configured threshold.
pub fn setup_shamir<F: MpcField>(
    num_parties: usize,
    counts: &PreprocessingCounts,
    config: &ProtocolConfig,
    seed: u64,
) -> Result<
    (
        ShamirDealer<F, StdRng>,
        Vec<PartySetup<ShamirOpener<F>, ShamirShare<F>>>,
    ),
    ProtocolError,
> {
    let threshold = config.shamir_threshold_for(num_parties);
    let mut dealer = ShamirDealer::new(num_parties, threshold, StdRng::seed_from_u64(seed))?;
    let parties = generate_preprocessing(&mut dealer, counts)
        .into_iter()
        .map(|data| {
            Ok(PartySetup {
                opener: ShamirOpener::new(
                    data.party_id,
                    num_parties,
                    threshold,
                    config.malicious_shamir,
                )?,
                preprocessing: PrecomputedDealer::new(data),
            })
        })
        .collect::<Result<_, ProtocolError>>()?;
    Ok((dealer, parties))
}
