//! Batch-oriented driver owning one party's player, opener and multiplier.

use tracing::debug;

use crate::{
    beaver::Beaver,
    codec::{decode_values, encode_values},
    error::ProtocolError,
    transport::Player,
    Multiplier, Opener, Preprocessing, Share,
};

type Clear<O> = <<O as Opener>::Share as Share>::Clear;

/// Everything one party needs to run arithmetic on shared values.
///
/// Every method that communicates costs exactly one round (plus whatever check the opener runs
/// on its own), so callers should batch as much as possible per call.
pub struct Processor<P, O: Opener, Prep> {
    player: P,
    opener: O,
    multiplier: Beaver<O::Share, Prep>,
}

impl<P, O, Prep> Processor<P, O, Prep>
where
    P: Player,
    O: Opener,
    Prep: Preprocessing<O::Share>,
{
    pub fn new(player: P, opener: O, preprocessing: Prep) -> Self {
        Self {
            player,
            opener,
            multiplier: Beaver::new(preprocessing),
        }
    }

    pub fn party_id(&self) -> usize {
        self.player.my_id()
    }

    pub fn num_parties(&self) -> usize {
        self.player.num_players()
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn preprocessing_mut(&mut self) -> &mut Prep {
        self.multiplier.preprocessing_mut()
    }

    /// Local share of a public value.
    pub fn constant(&self, value: Clear<O>) -> O::Share {
        self.opener.constant(value)
    }

    /// Reveal `shares` to all parties.
    pub async fn open(&mut self, shares: &[O::Share]) -> Result<Vec<Clear<O>>, ProtocolError> {
        self.opener.open_batch(shares, &mut self.player).await
    }

    /// Multiply each pair of shares.
    pub async fn mul(
        &mut self,
        pairs: &[(O::Share, O::Share)],
    ) -> Result<Vec<O::Share>, ProtocolError> {
        self.multiplier.init_mul();
        for &(x, y) in pairs {
            self.multiplier.prepare_mul(x, y)?;
        }
        self.multiplier
            .exchange(&mut self.opener, &mut self.player)
            .await?;
        pairs
            .iter()
            .map(|_| self.multiplier.finalize_mul(&self.opener))
            .collect()
    }

    /// Secret-share private inputs of every party.
    ///
    /// Each party masks its own `values` with input masks and broadcasts the differences. The
    /// result holds the shares of every party's inputs, indexed by input owner.
    pub async fn input(
        &mut self,
        values: &[Clear<O>],
    ) -> Result<Vec<Vec<O::Share>>, ProtocolError> {
        let me = self.party_id();
        let mut own_shares = Vec::with_capacity(values.len());
        let mut deltas = Vec::with_capacity(values.len());
        for &value in values {
            let (mask, plain) = self.preprocessing_mut().get_input_mask(me)?;
            let plain = plain.ok_or(ProtocolError::InsufficientPreprocessing {
                kind: "plain input mask",
            })?;
            let delta = value - plain;
            own_shares.push(mask + self.constant(delta));
            deltas.push(delta);
        }

        debug!(party = me, inputs = values.len(), "Sharing inputs");
        let received = self
            .player
            .broadcast_and_receive(encode_values(&deltas))
            .await?;

        let mut shares = vec![Vec::new(); self.num_parties()];
        for (owner, bytes) in received.iter().enumerate() {
            if owner == me {
                continue;
            }
            for delta in decode_values::<Clear<O>>(bytes, None)? {
                let (mask, _) = self.preprocessing_mut().get_input_mask(owner)?;
                shares[owner].push(mask + self.constant(delta));
            }
        }
        shares[me] = own_shares;
        Ok(shares)
    }

    /// Shares of `n` secret random bits.
    pub fn random_bits(&mut self, n: usize) -> Result<Vec<O::Share>, ProtocolError> {
        (0..n).map(|_| self.preprocessing_mut().get_bit()).collect()
    }

    /// Verify everything opened so far.
    pub async fn check(&mut self) -> Result<(), ProtocolError> {
        self.opener.check(&mut self.player).await
    }
}
