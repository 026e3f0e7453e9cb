//! Multiplication of shared values with preprocessed triples.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::trace;

use crate::{error::ProtocolError, transport::Player, Multiplier, Opener, Preprocessing, Share};

/// Beaver multiplication, generic over sharing scheme and preprocessing source.
///
/// For `x * y` with triple `(a, b, c)` the masked differences `rho = x - a` and
/// `sigma = y - b` are opened and the product share is `c + rho * b + sigma * a + rho * sigma`,
/// where the public term is added through [`Opener::constant`]. Nothing is verified here, wrong
/// openings or triples are caught by the opener's next check.
pub struct Beaver<S: Share, P> {
    preprocessing: P,
    /// Masked differences waiting for the next exchange.
    masked: Vec<(S, S)>,
    triples: VecDeque<(S, S, S)>,
    /// Opened `(rho, sigma)` pairs, in multiplication order.
    opened: VecDeque<(S::Clear, S::Clear)>,
}

impl<S: Share, P: Preprocessing<S>> Beaver<S, P> {
    pub fn new(preprocessing: P) -> Self {
        Self {
            preprocessing,
            masked: Vec::new(),
            triples: VecDeque::new(),
            opened: VecDeque::new(),
        }
    }

    pub fn preprocessing_mut(&mut self) -> &mut P {
        &mut self.preprocessing
    }

    /// Number of multiplications prepared but not yet finalized.
    pub fn pending(&self) -> usize {
        self.triples.len()
    }
}

#[async_trait(?Send)]
impl<S: Share, P: Preprocessing<S>> Multiplier for Beaver<S, P> {
    type Share = S;

    fn init_mul(&mut self) {
        self.masked.clear();
        self.triples.clear();
        self.opened.clear();
    }

    fn prepare_mul(&mut self, x: S, y: S) -> Result<(), ProtocolError> {
        let (a, b, c) = self.preprocessing.get_triple()?;
        self.masked.push((x - a, y - b));
        self.triples.push_back((a, b, c));
        Ok(())
    }

    async fn exchange<O>(
        &mut self,
        opener: &mut O,
        player: &mut dyn Player,
    ) -> Result<(), ProtocolError>
    where
        O: Opener<Share = S>,
    {
        if self.masked.is_empty() {
            return Ok(());
        }
        trace!(size = self.masked.len(), "Exchanging Beaver masks");
        opener.init_open(2 * self.masked.len());
        for (rho, sigma) in &self.masked {
            opener.prepare_open(rho);
            opener.prepare_open(sigma);
        }
        opener.exchange(player).await?;
        for _ in self.masked.drain(..) {
            let rho = opener.finalize_open()?;
            let sigma = opener.finalize_open()?;
            self.opened.push_back((rho, sigma));
        }
        Ok(())
    }

    fn finalize_mul<O>(&mut self, opener: &O) -> Result<S, ProtocolError>
    where
        O: Opener<Share = S>,
    {
        let (rho, sigma) = self.opened.pop_front().ok_or(ProtocolError::ProtocolMisuse(
            "finalize_mul called without exchanged multiplications",
        ))?;
        let (a, b, c) = self.triples.pop_front().ok_or(ProtocolError::ProtocolMisuse(
            "finalize_mul called without prepared multiplications",
        ))?;
        Ok(c + b * rho + a * sigma + opener.constant(rho * sigma))
    }
}
