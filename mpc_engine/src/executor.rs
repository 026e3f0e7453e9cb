use std::{
    cell::{Cell, RefCell},
    future::Future,
    mem,
    task::Poll,
};

use tracing::trace;

use crate::{
    error::ProtocolError, processor::Processor, transport::Player, Opener, Preprocessing, Share,
};

type Clear<O> = <<O as Opener>::Share as Share>::Clear;

/// Executor of async MPC circuits.
///
/// Circuits issue single multiplications and openings. Whenever the circuit cannot make progress
/// all requests issued by its concurrent branches are processed together, with at most one
/// multiplication round and one opening round.
pub struct MpcExecutor<P, O: Opener, Prep> {
    processor: RefCell<Processor<P, O, Prep>>,
    mul_buffer: RoundCommandBuffer<(O::Share, O::Share), O::Share>,
    open_buffer: RoundCommandBuffer<O::Share, Clear<O>>,
    rounds: Cell<usize>,
}

impl<P, O, Prep> MpcExecutor<P, O, Prep>
where
    P: Player,
    O: Opener,
    Prep: Preprocessing<O::Share>,
{
    /// Create new MPC circuit executor.
    pub fn new(processor: Processor<P, O, Prep>) -> Self {
        MpcExecutor {
            processor: RefCell::new(processor),
            mul_buffer: RoundCommandBuffer::new(),
            open_buffer: RoundCommandBuffer::new(),
            rounds: Cell::new(0),
        }
    }

    /// Multiply shared values. Requires communication.
    pub async fn mul(&self, a: O::Share, b: O::Share) -> O::Share {
        self.mul_buffer.queue((a, b)).await
    }

    /// Open provided share. Requires communication.
    pub async fn open(&self, a: O::Share) -> Clear<O> {
        self.open_buffer.queue(a).await
    }

    /// Local share of a public value.
    pub fn constant(&self, value: Clear<O>) -> O::Share {
        self.processor.borrow().constant(value)
    }

    pub fn party_id(&self) -> usize {
        self.processor.borrow().party_id()
    }

    /// Number of processed rounds so far.
    pub fn rounds(&self) -> usize {
        self.rounds.get()
    }

    pub fn processor_mut(&mut self) -> &mut Processor<P, O, Prep> {
        self.processor.get_mut()
    }

    pub fn into_processor(self) -> Processor<P, O, Prep> {
        self.processor.into_inner()
    }

    /// Execute given async circuit.
    ///
    /// Fails if processing a round fails, or if the circuit stops making progress without
    /// waiting for a multiplication or opening.
    pub async fn run_circuit<T, S, F>(&self, circuit: F) -> Result<T, ProtocolError>
    where
        S: Future<Output = T>,
        F: FnOnce() -> S,
    {
        let mut future = Box::pin(circuit());

        loop {
            if let Poll::Ready(output) = futures::poll!(future.as_mut()) {
                return Ok(output);
            }

            let mul_requests = self.mul_buffer.take_requests();
            let open_requests = self.open_buffer.take_requests();
            if mul_requests.is_empty() && open_requests.is_empty() {
                return Err(ProtocolError::ProtocolMisuse(
                    "circuit stalled without pending multiplications or openings",
                ));
            }
            trace!(
                round = self.rounds.get(),
                muls = mul_requests.len(),
                opens = open_requests.len(),
                "Processing circuit round"
            );

            let (mul_responses, open_responses) = {
                let mut processor = self.processor.borrow_mut();
                let mul_responses = if mul_requests.is_empty() {
                    Vec::new()
                } else {
                    processor.mul(&mul_requests).await?
                };
                let open_responses = if open_requests.is_empty() {
                    Vec::new()
                } else {
                    processor.open(&open_requests).await?
                };
                (mul_responses, open_responses)
            };

            self.mul_buffer.resolve_all(mul_responses);
            self.open_buffer.resolve_all(open_responses);
            self.rounds.set(self.rounds.get() + 1);
        }
    }
}

/// Buffer for accumulating commands issued by async circuit.
struct RoundCommandBuffer<T, S> {
    requests: RefCell<Vec<T>>,
    responses: RefCell<Vec<Option<S>>>,
    round_index: Cell<usize>,
    first_unpolled_response: Cell<usize>,
}

impl<T, S> RoundCommandBuffer<T, S> {
    fn new() -> Self {
        RoundCommandBuffer {
            requests: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
            round_index: Cell::new(0),
            first_unpolled_response: Cell::new(0),
        }
    }

    /// Queue new command and asynchronously wait for response.
    async fn queue(&self, input: T) -> S {
        let index = self.requests.borrow().len();
        let target_round = self.round_index.get() + 1;
        self.requests.borrow_mut().push(input);

        futures::future::poll_fn(|_| {
            if self.round_index.get() == target_round {
                if self.first_unpolled_response.get() != index {
                    panic!("Circuit execution went out of order");
                }
                self.first_unpolled_response.set(index + 1);
                Poll::Ready(
                    self.responses.borrow_mut()[index]
                        .take()
                        .expect("Future polled twice"),
                )
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Get requests accumulated during last round.
    fn take_requests(&self) -> Vec<T> {
        mem::take(&mut self.requests.borrow_mut())
    }

    /// Resolve all requests issued during last round.
    fn resolve_all(&self, new_responses: impl IntoIterator<Item = S>) {
        let mut responses = self.responses.borrow_mut();

        if self.first_unpolled_response.get() != responses.len() {
            panic!("Some responses from previous round were not processed");
        }

        responses.clear();
        responses.extend(new_responses.into_iter().map(Some));
        self.round_index.set(self.round_index.get() + 1);
        self.first_unpolled_response.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::dealer::{PreprocessingCounts, ShareDealer};
    use crate::fields::Mersenne61;
    use crate::join_circuits;
    use crate::simulation::{setup_spdz, simulate, PartySetup};

    type Fp = Mersenne61;

    #[tokio::test]
    async fn test_concurrent_branches_share_rounds() {
        let counts = PreprocessingCounts {
            triples: 8,
            ..Default::default()
        };
        let (mut dealer, setups) = setup_spdz::<Fp>(3, &counts, &ProtocolConfig::default(), 1);
        let xs: Vec<_> = (1..=4u64).map(|x| dealer.share(Fp::from(x))).collect();
        let setups = RefCell::new(setups.into_iter().map(Some).collect::<Vec<_>>());

        let results = simulate(3, |id, player| {
            let PartySetup {
                opener,
                preprocessing,
            } = setups.borrow_mut()[id].take().unwrap();
            let x: Vec<_> = xs.iter().map(|shares| shares[id]).collect();
            async move {
                let executor = MpcExecutor::new(Processor::new(player, opener, preprocessing));
                let concurrent = executor
                    .run_circuit(|| async {
                        let (p, q) =
                            join_circuits!(executor.mul(x[0], x[1]), executor.mul(x[2], x[3]));
                        executor.open(p + q).await
                    })
                    .await?;
                let concurrent_rounds = executor.rounds();

                let sequential = executor
                    .run_circuit(|| async {
                        let p = executor.mul(x[0], x[1]).await;
                        let q = executor.mul(x[2], x[3]).await;
                        executor.open(p + q).await
                    })
                    .await?;
                let sequential_rounds = executor.rounds() - concurrent_rounds;

                executor.into_processor().check().await?;
                Ok::<_, ProtocolError>((
                    concurrent,
                    concurrent_rounds,
                    sequential,
                    sequential_rounds,
                ))
            }
        })
        .await;

        for result in results {
            assert_eq!(result, Ok((Fp::from(14), 2, Fp::from(14), 3)));
        }
    }

    #[tokio::test]
    async fn test_stalled_circuit_is_misuse() {
        let (_, setups) =
            setup_spdz::<Fp>(2, &PreprocessingCounts::default(), &ProtocolConfig::default(), 2);
        let setups = RefCell::new(setups.into_iter().map(Some).collect::<Vec<_>>());
        let results = simulate(2, |id, player| {
            let PartySetup {
                opener,
                preprocessing,
            } = setups.borrow_mut()[id].take().unwrap();
            async move {
                let executor = MpcExecutor::new(Processor::new(player, opener, preprocessing));
                executor.run_circuit(futures::future::pending::<()>).await
            }
        })
        .await;
        for result in results {
            assert!(matches!(result, Err(ProtocolError::ProtocolMisuse(_))));
        }
    }

    #[tokio::test]
    async fn test_round_failure_aborts_circuit() {
        let (mut dealer, setups) =
            setup_spdz::<Fp>(2, &PreprocessingCounts::default(), &ProtocolConfig::default(), 3);
        let x = dealer.share(Fp::from(3));
        let setups = RefCell::new(setups.into_iter().map(Some).collect::<Vec<_>>());
        let results = simulate(2, |id, player| {
            let PartySetup {
                opener,
                preprocessing,
            } = setups.borrow_mut()[id].take().unwrap();
            let x = x[id];
            async move {
                let executor = MpcExecutor::new(Processor::new(player, opener, preprocessing));
                executor.run_circuit(|| executor.mul(x, x)).await
            }
        })
        .await;
        for result in results {
            assert_eq!(
                result,
                Err(ProtocolError::InsufficientPreprocessing { kind: "triple" })
            );
        }
    }
}
