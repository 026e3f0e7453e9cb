use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    FutureExt, Sink, SinkExt, Stream, StreamExt, TryFutureExt,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;

/// Error type for channels.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Error while sending message to {0}")]
    Send(usize),
    #[error("Error while receiving message from {0}")]
    Recv(usize),
}

/// Network collaborator of the protocol layer. All payloads are opaque byte buffers.
#[async_trait(?Send)]
pub trait Player {
    /// Number of parties participating in the protocol.
    fn num_players(&self) -> usize;

    /// ID of current party.
    fn my_id(&self) -> usize;

    async fn send_to(&mut self, peer: usize, bytes: Vec<u8>) -> Result<(), TransportError>;

    async fn receive_from(&mut self, peer: usize) -> Result<Vec<u8>, TransportError>;

    /// Send `bytes` to every other party and collect what they sent.
    /// The result is indexed by party ID and contains `bytes` at `my_id()`.
    async fn broadcast_and_receive(&mut self, bytes: Vec<u8>)
        -> Result<Vec<Vec<u8>>, TransportError>;

    /// Send to party `my_id + offset` while receiving from party `my_id - offset` (mod n).
    async fn pass_around(&mut self, bytes: Vec<u8>, offset: usize)
        -> Result<Vec<u8>, TransportError>;
}

/// Wrapper for peer-to-peer connections in multi-party protocol.
pub struct MultipartyTransport<T, Channel> {
    channels: Vec<Option<(SplitSink<Channel, T>, SplitStream<Channel>)>>,
    party_id: usize,
}

impl<T, Channel> MultipartyTransport<T, Channel>
where
    Channel: Stream + Sink<T>,
{
    /// Create wrapper for given list of connections. All channels but party_id should be present.
    pub fn new(channels: impl IntoIterator<Item = Option<Channel>>, party_id: usize) -> Self {
        // We split streams into unidirectional halves. This allows us to
        // asynchronously wait on both receives and sends without bothering borrow checker.
        let channels: Vec<_> = channels.into_iter().map(|x| x.map(|x| x.split())).collect();
        for (j, channel) in channels.iter().enumerate() {
            if j != party_id && channel.is_none() {
                panic!("Channel missing for party {}", j);
            }
        }
        Self { channels, party_id }
    }
}

impl<T, Channel> MultipartyTransport<T, Channel> {
    /// Number of parties participating in multi-party protocol.
    pub fn num_parties(&self) -> usize {
        self.channels.len()
    }

    /// ID of current party.
    pub fn party_id(&self) -> usize {
        self.party_id
    }
}

impl<T, E, Channel> MultipartyTransport<T, Channel>
where
    T: Clone,
    Channel: Stream<Item = Result<T, E>> + Sink<T> + Unpin,
{
    /// Send message to party with given ID.
    pub async fn send(&mut self, other_id: usize, msg: T) -> Result<(), TransportError> {
        if other_id == self.party_id {
            panic!("Cannot send message on loopback");
        }
        let (sink, _) = self.channels[other_id]
            .as_mut()
            .ok_or(TransportError::Send(other_id))?;
        sink.send(msg)
            .await
            .map_err(|_| TransportError::Send(other_id))
    }

    /// Receive message from party with given ID.
    pub async fn receive(&mut self, other_id: usize) -> Result<T, TransportError> {
        if other_id == self.party_id {
            panic!("Cannot receive message on loopback");
        }
        let (_, stream) = self.channels[other_id]
            .as_mut()
            .ok_or(TransportError::Recv(other_id))?;
        match stream.next().await {
            Some(Ok(msg)) => Ok(msg),
            _ => Err(TransportError::Recv(other_id)),
        }
    }

    /// Concurrently send to one party and receive from another (possibly the same) party.
    pub async fn send_and_receive(
        &mut self,
        send_to: usize,
        msg: T,
        receive_from: usize,
    ) -> Result<T, TransportError> {
        if send_to == self.party_id || receive_from == self.party_id {
            panic!("Cannot pass messages on loopback");
        }
        let mut sink = None;
        let mut stream = None;
        for (id, channel) in self.channels.iter_mut().enumerate() {
            if let Some((tx, rx)) = channel.as_mut() {
                if id == send_to {
                    sink = Some(tx);
                }
                if id == receive_from {
                    stream = Some(rx);
                }
            }
        }
        let sink = sink.ok_or(TransportError::Send(send_to))?;
        let stream = stream.ok_or(TransportError::Recv(receive_from))?;

        let send_future = sink
            .send(msg)
            .map_err(move |_| TransportError::Send(send_to));
        let recv_future = stream.next().map(move |raw| match raw {
            Some(Ok(msg)) => Ok(msg),
            _ => Err(TransportError::Recv(receive_from)),
        });
        let (_, received) = futures::future::try_join(send_future, recv_future).await?;
        Ok(received)
    }

    /// Concurrently send and receive messages from all parties.
    pub async fn exchange_with_all(&mut self, msg: T) -> Result<Vec<(usize, T)>, TransportError> {
        futures::future::try_join_all(
            self.channels
                .iter_mut()
                .enumerate()
                .filter(|(id, _)| *id != self.party_id)
                .map(|(id, channel)| {
                    let (sink, stream) = channel.as_mut().ok_or(TransportError::Send(id))?;
                    let send_future = sink
                        .send(msg.clone())
                        .then(move |x| async move { x.map_err(|_| TransportError::Send(id)) });
                    let recv_future = stream.next().then(move |raw| async move {
                        match raw {
                            Some(Ok(msg)) => Ok((id, msg)),
                            _ => Err(TransportError::Recv(id)),
                        }
                    });
                    Ok(futures::future::try_join(send_future, recv_future)
                        .and_then(|(_, received_msg)| async { Ok(received_msg) }))
                })
                .collect::<Result<Vec<_>, TransportError>>()?,
        )
        .await
    }
}

#[async_trait(?Send)]
impl<E, Channel> Player for MultipartyTransport<Vec<u8>, Channel>
where
    Channel: Stream<Item = Result<Vec<u8>, E>> + Sink<Vec<u8>> + Unpin,
{
    fn num_players(&self) -> usize {
        self.num_parties()
    }

    fn my_id(&self) -> usize {
        self.party_id()
    }

    async fn send_to(&mut self, peer: usize, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.send(peer, bytes).await
    }

    async fn receive_from(&mut self, peer: usize) -> Result<Vec<u8>, TransportError> {
        self.receive(peer).await
    }

    async fn broadcast_and_receive(
        &mut self,
        bytes: Vec<u8>,
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        let mut all = vec![Vec::new(); self.num_parties()];
        for (id, msg) in self.exchange_with_all(bytes.clone()).await? {
            all[id] = msg;
        }
        all[self.party_id] = bytes;
        Ok(all)
    }

    async fn pass_around(
        &mut self,
        bytes: Vec<u8>,
        offset: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let n = self.num_parties();
        let send_to = (self.party_id + offset) % n;
        let receive_from = (self.party_id + n - offset % n) % n;
        self.send_and_receive(send_to, bytes, receive_from).await
    }
}

/// Length-framed Bincode-encoded messages channel.
pub type BincodeStreamSink<T, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, T, T, Bincode<T, T>>;

/// Length-framed Bincode-encoded tokio's Duplex stream.
pub type BincodeDuplex<T> = BincodeStreamSink<T, DuplexStream>;

/// Player connected to its peers by in-process duplex pipes.
pub type MockPlayer = MultipartyTransport<Vec<u8>, BincodeDuplex<Vec<u8>>>;

/// Create length-framed Bincode-encoded message channel from AsyncRead/Write.
pub fn wrap_bincode<T, C>(channel: C) -> BincodeStreamSink<T, C>
where
    C: AsyncRead + AsyncWrite,
{
    let length_delimited = tokio_util::codec::Framed::new(channel, LengthDelimitedCodec::new());
    tokio_serde::Framed::new(length_delimited, Bincode::default())
}

/// Create bidirectional Bincode-encoded channel.
pub fn bincode_duplex<T>(max_buf_size: usize) -> (BincodeDuplex<T>, BincodeDuplex<T>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_bincode(a), wrap_bincode(b))
}

/// Create in-process channels for testing multiparty protocols.
pub fn mock_multiparty_channels<T>(
    num_parties: usize,
    max_buf_size: usize,
) -> Vec<MultipartyTransport<T, BincodeDuplex<T>>>
where
    T: Clone + Serialize + DeserializeOwned + Unpin,
{
    let mut matrix: Vec<Vec<_>> = (0..num_parties)
        .map(|_| (0..num_parties).map(|_| None).collect())
        .collect();

    for i in 0..num_parties {
        for j in 0..i {
            let (a, b) = bincode_duplex::<T>(max_buf_size);
            matrix[i][j] = Some(a);
            matrix[j][i] = Some(b);
        }
    }

    matrix
        .into_iter()
        .enumerate()
        .map(|(id, row)| MultipartyTransport::new(row, id))
        .collect()
}

/// Fault injected by [`FaultyPlayer`] into one broadcast.
#[cfg(test)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BroadcastFault {
    /// Deliver, but flip the first byte of every payload received from peers.
    Corrupt,
    /// Fail before sending anything.
    Fail,
}

/// Player that breaks its `target`-th broadcast (counting from zero) and forwards everything
/// else to `inner`.
#[cfg(test)]
pub(crate) struct FaultyPlayer<P> {
    inner: P,
    target: usize,
    fault: BroadcastFault,
    broadcasts: usize,
}

#[cfg(test)]
impl<P: Player> FaultyPlayer<P> {
    pub(crate) fn new(inner: P, target: usize, fault: BroadcastFault) -> Self {
        Self {
            inner,
            target,
            fault,
            broadcasts: 0,
        }
    }
}

#[cfg(test)]
#[async_trait(?Send)]
impl<P: Player> Player for FaultyPlayer<P> {
    fn num_players(&self) -> usize {
        self.inner.num_players()
    }

    fn my_id(&self) -> usize {
        self.inner.my_id()
    }

    async fn send_to(&mut self, peer: usize, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.inner.send_to(peer, bytes).await
    }

    async fn receive_from(&mut self, peer: usize) -> Result<Vec<u8>, TransportError> {
        self.inner.receive_from(peer).await
    }

    async fn broadcast_and_receive(
        &mut self,
        bytes: Vec<u8>,
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        let index = self.broadcasts;
        self.broadcasts += 1;
        if index != self.target {
            return self.inner.broadcast_and_receive(bytes).await;
        }
        let me = self.my_id();
        match self.fault {
            BroadcastFault::Fail => Err(TransportError::Send((me + 1) % self.num_players())),
            BroadcastFault::Corrupt => {
                let mut received = self.inner.broadcast_and_receive(bytes).await?;
                for (id, payload) in received.iter_mut().enumerate() {
                    if id != me {
                        if let Some(first) = payload.first_mut() {
                            *first ^= 1;
                        }
                    }
                }
                Ok(received)
            }
        }
    }

    async fn pass_around(
        &mut self,
        bytes: Vec<u8>,
        offset: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.inner.pass_around(bytes, offset).await
    }
}
