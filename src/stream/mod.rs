//! Primitives to extract and encode binary packets
//! from/to an [`futures::AsyncBufRead`] + [`futures::AsyncWrite`] stream.

use std::collections::VecDeque;

use futures::{AsyncBufReadExt, AsyncWriteExt};
use futures_time::{future::FutureExt, time::Duration};

use crate::{
    wire::{
        trans::{DebugMessage, Disconnect, Ignore, KexInit, Unimplemented},
        Message, Packet,
    },
    Pipe, Result,
};

mod counter;
use counter::IoCounter;

mod transport;
pub use transport::{Transport, TransportPair};

mod keys;
pub use keys::Keys;

/// Re-key after 1GiB of exchanged data as recommended per the RFC.
const REKEY_BYTES_THRESHOLD: usize = 0x40000000;

/// The last message code reserved to the key-exchange methods.
const KEX_LAST_CODE: u8 = 49;

/// The maximum size of an uncompressed payload, per
/// [RFC4253 §6.1](https://datatracker.ietf.org/doc/html/rfc4253#section-6.1).
pub const PACKET_MAX_SIZE: usize = 35000;

/// A wrapper around [`futures::AsyncBufRead`] + [`futures::AsyncWrite`]
/// to interface with to the SSH binary protocol.
pub struct Stream<S> {
    inner: IoCounter<S>,
    timeout: Duration,

    /// The pair of transport algorithms and keys computed from the key exchange.
    transport: TransportPair,

    /// The session identifier derived from the first key exchange.
    session: Option<Vec<u8>>,

    /// Sequence number for the `tx` side.
    txseq: u32,

    /// Sequence number for the `rx` side.
    rxseq: u32,

    /// A packet buffer for the `peek` method.
    buffer: Option<Packet>,

    /// Packets received during a key-exchange, with their sequence numbers,
    /// to be handled once it completes.
    deferred: VecDeque<(u32, Packet)>,
}

impl<S: Pipe> Stream<S> {
    pub(crate) fn new(stream: S, timeout: Duration) -> Self {
        Self {
            inner: IoCounter::new(stream),
            timeout,
            transport: Default::default(),
            session: None,
            txseq: 0,
            rxseq: 0,
            buffer: None,
            deferred: VecDeque::new(),
        }
    }

    /// The underlying stream, for the identification exchange.
    pub(crate) fn inner_mut(&mut self) -> &mut IoCounter<S> {
        &mut self.inner
    }

    /// The session identifier, the exchange hash of the first key-exchange.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session.as_deref()
    }

    /// Record the session identifier, only the first call has an effect.
    pub(crate) fn with_session(&mut self, hash: &[u8]) -> &[u8] {
        self.session.get_or_insert_with(|| hash.to_vec())
    }

    /// Install the transports negotiated by a key-exchange, sequence numbers carry on.
    pub(crate) fn with_transport(&mut self, transport: TransportPair) {
        self.transport = transport;
        self.inner.reset();
    }

    /// The sequence number of the last received packet.
    pub(crate) fn last_rxseq(&self) -> u32 {
        self.rxseq.wrapping_sub(1)
    }

    /// Whether enough data went through the current keys to warrant a re-key.
    pub(crate) fn is_rekeyable(&self) -> bool {
        self.inner.count() > REKEY_BYTES_THRESHOLD
    }

    /// Wait until data is available to be read, or a deferred packet is pending.
    pub async fn fill_buf(&mut self) -> Result<()> {
        if self.buffer.is_none() && self.deferred.is_empty() {
            self.inner.fill_buf().await?;
        }

        Ok(())
    }

    /// Take the oldest packet deferred by a key-exchange, with its sequence number.
    pub(crate) fn undefer(&mut self) -> Option<(u32, Packet)> {
        self.deferred.pop_front()
    }

    /// Whether a packet is immediately available to be read from the peer,
    /// deferred packets excluded.
    pub async fn is_readable(&mut self) -> Result<bool> {
        if self.buffer.is_some() {
            return Ok(true);
        }

        match self
            .inner
            .fill_buf()
            .timeout(Duration::from_micros(1))
            .await
        {
            Ok(buf) => Ok(!buf?.is_empty()),
            Err(_) => Ok(false),
        }
    }

    async fn packet(&mut self) -> Result<Packet> {
        let payload = self
            .transport
            .rx
            .read(&mut self.inner, self.rxseq, PACKET_MAX_SIZE)
            .timeout(self.timeout)
            .await??;
        let packet = Packet { payload };

        tracing::trace!("<-({}) {:?}", self.rxseq, packet.code());

        self.rxseq = self.rxseq.wrapping_add(1);

        Ok(packet)
    }

    /// Receive the next packet without consuming it.
    pub async fn peek(&mut self) -> Result<&Packet> {
        let packet = match self.buffer.take() {
            Some(packet) => packet,
            None => self.packet().await?,
        };

        Ok(self.buffer.insert(packet))
    }

    /// Receive a _packet_ from the peer.
    pub async fn recv(&mut self) -> Result<Packet> {
        match self.buffer.take() {
            Some(packet) => Ok(packet),
            None => self.packet().await,
        }
    }

    /// Receive the next packet of the key-exchange in progress.
    ///
    /// The peer may have sent packets before it noticed our `SSH_MSG_KEXINIT`,
    /// `SSH_MSG_IGNORE`, `SSH_MSG_DEBUG` and `SSH_MSG_UNIMPLEMENTED` are consumed on the spot,
    /// while the other messages out of the key-exchange range are deferred until it completes.
    pub(crate) async fn recv_kex(&mut self) -> Result<Packet> {
        loop {
            let packet = self.recv().await?;

            match packet.code() {
                Some(Disconnect::CODE) => break Ok(packet),
                Some(Ignore::CODE | DebugMessage::CODE | Unimplemented::CODE) => {
                    tracing::debug!(
                        "Consumed transport message {:?} during key-exchange",
                        packet.code()
                    );
                }
                Some(code) if (KexInit::CODE..=KEX_LAST_CODE).contains(&code) => break Ok(packet),
                code => {
                    tracing::debug!("Deferring message {code:?} until the key-exchange completes");

                    self.deferred.push_back((self.last_rxseq(), packet));
                }
            }
        }
    }

    /// Send a _packet_ to the peer, by serializing and encrypting the `message`.
    pub async fn send<T: Message>(&mut self, message: &T) -> Result<()> {
        let packet = Packet::write(message)?;
        let raw = self
            .transport
            .tx
            .seal(&packet.payload, self.txseq, PACKET_MAX_SIZE)?;

        self.inner.write_all(&raw).timeout(self.timeout).await??;
        self.inner.flush().timeout(self.timeout).await??;

        tracing::trace!("({})-> {message:?}", self.txseq);

        self.txseq = self.txseq.wrapping_add(1);

        Ok(())
    }

    /// Close the writing half of the underlying stream.
    pub(crate) async fn close(&mut self) -> Result<()> {
        self.inner.close().timeout(self.timeout).await??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::io::Cursor;

    use super::*;
    use crate::{
        algorithm::{Cipher, Compress, Hmac},
        error::FramingError,
        wire::trans::{Ignore, NewKeys, ServiceRequest},
        Error,
    };

    fn transport() -> Transport {
        let (cipher, hmac) = (Cipher::Aes128Ctr, Hmac::HmacSha256);

        Transport::new(
            cipher,
            hmac,
            Compress::None,
            Keys {
                iv: vec![1; cipher.iv_size()],
                key: vec![2; cipher.key_size()],
                hmac: vec![3; hmac.key_size()],
            },
        )
    }

    fn timeout() -> Duration {
        std::time::Duration::from_secs(1).into()
    }

    async fn exchange(start: u32, count: u32) -> Result<(u32, u32)> {
        let mut wire = Vec::new();

        let mut tx = Stream::new(Cursor::new(&mut wire), timeout());
        tx.txseq = start;
        tx.with_transport(TransportPair {
            rx: Default::default(),
            tx: transport(),
        });
        for idx in 0..count {
            tx.send(&Ignore {
                data: idx.to_be_bytes().to_vec().into(),
            })
            .await?;
        }
        let txseq = tx.txseq;
        drop(tx);

        let mut rx = Stream::new(Cursor::new(wire), timeout());
        rx.rxseq = start;
        rx.with_transport(TransportPair {
            rx: transport(),
            tx: Default::default(),
        });
        for idx in 0..count {
            let Ignore { data } = rx.recv().await?.to::<Ignore>()?;
            assert_eq!(&*data, idx.to_be_bytes());
        }

        Ok((txseq, rx.rxseq))
    }

    #[async_std::test]
    async fn sequence_numbers_are_monotonic() -> Result<()> {
        assert_eq!(exchange(0, 5).await?, (5, 5));

        Ok(())
    }

    #[async_std::test]
    async fn sequence_numbers_wrap() -> Result<()> {
        assert_eq!(exchange(u32::MAX - 1, 4).await?, (2, 2));

        Ok(())
    }

    #[async_std::test]
    async fn desynchronized_sequence_numbers_are_fatal() -> Result<()> {
        let mut wire = Vec::new();

        let mut tx = Stream::new(Cursor::new(&mut wire), timeout());
        tx.with_transport(TransportPair {
            rx: Default::default(),
            tx: transport(),
        });
        tx.send(&Ignore::default()).await?;
        drop(tx);

        let mut rx = Stream::new(Cursor::new(wire), timeout());
        rx.rxseq = 1;
        rx.with_transport(TransportPair {
            rx: transport(),
            tx: Default::default(),
        });

        assert!(matches!(
            rx.recv().await,
            Err(Error::Framing(FramingError::MacMismatch))
        ));

        Ok(())
    }

    #[async_std::test]
    async fn peeked_packets_are_kept() -> Result<()> {
        let mut wire = Vec::new();
        Stream::new(Cursor::new(&mut wire), timeout())
            .send(&Ignore::default())
            .await?;

        let mut rx = Stream::new(Cursor::new(wire), timeout());
        assert!(rx.peek().await?.is::<Ignore>());
        assert!(rx.is_readable().await?);
        assert!(rx.recv().await?.is::<Ignore>());
        assert!(!rx.is_readable().await?);
        assert_eq!(rx.last_rxseq(), 0);

        Ok(())
    }

    #[async_std::test]
    async fn packets_are_deferred_during_key_exchange() -> Result<()> {
        let mut wire = Vec::new();
        let mut tx = Stream::new(Cursor::new(&mut wire), timeout());
        tx.send(&ServiceRequest {
            service_name: "ssh-userauth".into(),
        })
        .await?;
        tx.send(&Ignore::default()).await?;
        tx.send(&NewKeys).await?;
        drop(tx);

        let mut rx = Stream::new(Cursor::new(wire), timeout());
        assert!(rx.recv_kex().await?.is::<NewKeys>());
        assert_eq!(rx.last_rxseq(), 2);

        let (seq, packet) = rx.undefer().expect("a deferred packet");
        assert_eq!(seq, 0);
        assert!(packet.is::<ServiceRequest>());
        assert!(rx.undefer().is_none());

        Ok(())
    }
}
