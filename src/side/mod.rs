//! Session's [`Side`]s, either [`Client`] or [`Server`].

use futures::Future;
use futures_time::{future::FutureExt, time::Duration};

use crate::{
    algorithm::{kex::Ephemeral, Category, Negotiated},
    id::Id,
    stream::{Stream, TransportPair},
    wire::{
        trans::{KexInit, NewKeys},
        Packet,
    },
    Pipe, Result,
};

pub mod client;
use client::Client;

pub mod server;
use server::Server;

mod private {
    pub trait Sealed {}

    impl Sealed for super::Client {}
    impl Sealed for super::Server {}
}

/// Our own and the peer's `SSH_MSG_KEXINIT`, with their raw payloads for the exchange hash.
pub struct KexInits<'k> {
    /// The `SSH_MSG_KEXINIT` we sent.
    pub ours: (&'k KexInit, &'k [u8]),

    /// The `SSH_MSG_KEXINIT` the peer sent.
    pub theirs: (&'k KexInit, &'k [u8]),
}

/// A side of the SSH protocol, either [`Client`] or [`Server`].
pub trait Side: private::Sealed {
    /// Get the [`Id`] for this session.
    fn id(&self) -> &Id;

    /// Get the _timeout_ for this session.
    fn timeout(&self) -> Duration;

    /// Generate a [`KexInit`] message from the config.
    fn kexinit(&self) -> KexInit;

    /// Exchange identification strings with the peer, returning the peer's [`Id`].
    fn identify(&self, stream: &mut impl Pipe) -> impl Future<Output = Result<Id>>;

    /// Send the guessed key-exchange packet following our [`KexInit`], if any.
    fn guess(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinit: &KexInit,
    ) -> impl Future<Output = Result<Option<Ephemeral>>>;

    /// Exchange the keys from the config, with the negotiated algorithms.
    fn exchange(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinits: KexInits<'_>,
        negotiated: &Negotiated,
        guess: Option<Ephemeral>,
        peer_id: &Id,
    ) -> impl Future<Output = Result<TransportPair>>;

    /// Pick the algorithms from both [`KexInit`], in client then server order.
    fn negotiate(&self, ours: &KexInit, theirs: &KexInit) -> Result<Negotiated>;

    /// Perform the key-exchange from this side, `peerkexinit` being
    /// the peer's `SSH_MSG_KEXINIT` when it initiated the exchange.
    fn kex(
        &self,
        stream: &mut Stream<impl Pipe>,
        peer_id: &Id,
        peerkexinit: Option<Packet>,
    ) -> impl Future<Output = Result<()>> {
        async move {
            tracing::debug!("Starting key-exchange procedure");

            let kexinit = self.kexinit();
            let packet = Packet::write(&kexinit)?;
            stream.send(&kexinit).await?;

            let guess = self.guess(stream, &kexinit).await?;

            let peerpacket = match peerkexinit {
                Some(packet) => packet,
                None => stream.recv_kex().await?,
            };
            let peerkexinit = peerpacket.to::<KexInit>()?;

            let negotiated = self.negotiate(&kexinit, &peerkexinit)?;

            tracing::debug!(
                "Negotiated algorithms: {}",
                Category::ALL
                    .into_iter()
                    .filter_map(|category| negotiated
                        .get(category)
                        .map(|name| format!("{category}: `{name}`")))
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let transport = self
                .exchange(
                    stream,
                    KexInits {
                        ours: (&kexinit, &packet.payload),
                        theirs: (&peerkexinit, &peerpacket.payload),
                    },
                    &negotiated,
                    guess,
                    peer_id,
                )
                .await?;

            stream.send(&NewKeys).await?;
            stream.recv_kex().await?.to::<NewKeys>()?;

            tracing::debug!(
                "Key exchange success, negotiated algorithms:\nrx: {:?}\ntx: {:?}",
                transport.rx,
                transport.tx,
            );

            stream.with_transport(transport);

            Ok(())
        }
    }
}

/// Write our identification line, then read the peer's one.
async fn send_then_receive(
    stream: &mut impl Pipe,
    id: &Id,
    timeout: Duration,
    preamble: bool,
) -> Result<Id> {
    id.to_async_writer(stream).timeout(timeout).await??;

    Id::from_async_reader(stream, preamble)
        .timeout(timeout)
        .await?
}

/// Read the peer's identification line, then write ours.
async fn receive_then_send(
    stream: &mut impl Pipe,
    id: &Id,
    timeout: Duration,
    preamble: bool,
) -> Result<Id> {
    let peer = Id::from_async_reader(stream, preamble)
        .timeout(timeout)
        .await??;

    id.to_async_writer(stream).timeout(timeout).await??;

    Ok(peer)
}
