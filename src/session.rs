//! The [`Session`] state machine, handling **key-exchange** and **[`SSH-TRANS`]** layer messages.
//!
//! [`SSH-TRANS`]: https://datatracker.ietf.org/doc/html/rfc4253

use crate::{
    error::HandshakeError,
    id::Id,
    side::Side,
    stream::Stream,
    wire::{
        trans::{
            DebugMessage, Disconnect, DisconnectReason, Ignore, KexInit, KexdhInit, KexdhReply,
            NewKeys, ServiceAccept, ServiceRequest, Unimplemented,
        },
        Message, Packet,
    },
    Error, Pipe, Result,
};

/// Message codes from this value onwards belong to the upper layers.
const UPPER_LAYERS_CODE: u8 = 50;

/// The states of a [`Session`].
///
/// Connecting the underlying stream is up to the caller, so a session starts out [`State::Connected`].
/// It only gets observed from the outside once identification strings have been exchanged,
/// failures up to that point being returned by [`Session::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// The underlying stream is connected.
    Connected,

    /// Identification strings have been exchanged.
    VersionExchanged,

    /// The first key-exchange is running.
    NegotiatingKex,

    /// Keys are in place, packets flow.
    Established,

    /// A subsequent key-exchange is running.
    ReKeying,

    /// A fatal error happened, the stream has been released.
    Errored,

    /// The session has been closed by either side.
    Closed,
}

/// A session wrapping a `stream` to handle **key-exchange** and **[`SSH-TRANS`]** layer messages.
///
/// [`SSH-TRANS`]: https://datatracker.ietf.org/doc/html/rfc4253
pub struct Session<IO, S> {
    stream: Option<Stream<IO>>,
    config: S,

    peer_id: Id,
    state: State,

    /// Sequence number of the last packet handed to the caller.
    seq: u32,
}

impl<IO, S> Session<IO, S>
where
    IO: Pipe,
    S: Side,
{
    /// Create a new [`Session`] from a [`futures::AsyncBufRead`] + [`futures::AsyncWrite`] stream,
    /// and some configuration, performing the identification and first key-exchange.
    pub async fn new(stream: IO, config: S) -> Result<Self> {
        tracing::debug!("Session connected, exchanging identification strings");

        let mut stream = Stream::new(stream, config.timeout());
        let result = config.identify(stream.inner_mut()).await;

        let (mut stream, mut state) = (Some(stream), State::Connected);
        let peer_id = release(&mut stream, &mut state, result).await?;

        tracing::debug!("Session started with peer `{peer_id}`");

        let mut session = Self {
            stream,
            config,
            peer_id,
            state: State::VersionExchanged,
            seq: 0,
        };

        let result = session.handshake().await;
        session.check(result).await?;

        Ok(session)
    }

    async fn handshake(&mut self) -> Result<()> {
        self.config.id().compatible(&self.peer_id)?;

        let Some(ref mut stream) = self.stream else {
            return Err(Error::Disconnected);
        };

        self.state = State::NegotiatingKex;
        self.config.kex(stream, &self.peer_id, None).await?;
        self.state = State::Established;

        tracing::debug!("Session established with peer `{}`", self.peer_id);

        Ok(())
    }

    /// Access the [`Id`] of the connected peer.
    pub fn peer_id(&self) -> &Id {
        &self.peer_id
    }

    /// Access initial exchange hash.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.stream.as_ref().and_then(Stream::session_id)
    }

    /// The current [`State`] of the session.
    pub fn state(&self) -> State {
        self.state
    }

    /// Waits until the [`Session`] becomes readable,
    /// mainly to be used with [`Session::recv`] in [`futures::select`],
    /// since the `recv` method is **not cancel-safe**.
    pub async fn readable(&mut self) -> Result<()> {
        let Some(ref mut stream) = self.stream else {
            return Err(Error::Disconnected);
        };

        stream.fill_buf().await
    }

    /// Receive a _packet_ from the connected peer, handling transport-layer messages
    /// and re-keying on the way.
    ///
    /// # Cancel safety
    /// This method is **not cancel-safe**, if used within a [`futures::select`] call,
    /// some data may be partially received.
    pub async fn recv(&mut self) -> Result<Packet> {
        let result = self.next().await;

        self.check(result).await
    }

    async fn next(&mut self) -> Result<Packet> {
        loop {
            let Some(ref mut stream) = self.stream else {
                break Err(Error::Disconnected);
            };

            let (seq, packet) = match stream.undefer() {
                Some(deferred) => deferred,
                None => {
                    if stream.peek().await?.is::<KexInit>() {
                        let kexinit = stream.recv().await?;
                        self.exchange(Some(kexinit)).await?;

                        continue;
                    }

                    let packet = stream.recv().await?;

                    (stream.last_rxseq(), packet)
                }
            };

            match packet.code() {
                Some(Disconnect::CODE) => {
                    let Disconnect {
                        reason,
                        description,
                        ..
                    } = packet.to::<Disconnect>()?;

                    break Err(Error::PeerDisconnected {
                        reason,
                        description: description.to_string_lossy(),
                    });
                }
                Some(Ignore::CODE) => {
                    let Ignore { data } = packet.to::<Ignore>()?;

                    tracing::debug!("Received an 'ignore' message with length {}", data.len());
                }
                Some(Unimplemented::CODE) => {
                    let Unimplemented { seq } = packet.to::<Unimplemented>()?;

                    tracing::debug!("Received an 'unimplemented' message about packet #{seq}");
                }
                Some(DebugMessage::CODE) => {
                    let DebugMessage { message, .. } = packet.to::<DebugMessage>()?;

                    tracing::debug!("Received a 'debug' message: {}", message.to_string_lossy());
                }
                Some(code @ (NewKeys::CODE | KexdhInit::CODE | KexdhReply::CODE)) => {
                    break Err(HandshakeError::UnexpectedMessage(code).into());
                }
                Some(ServiceRequest::CODE | ServiceAccept::CODE) => {
                    self.seq = seq;

                    break Ok(packet);
                }
                Some(code) if code >= UPPER_LAYERS_CODE => {
                    self.seq = seq;

                    break Ok(packet);
                }
                code => {
                    tracing::debug!(
                        "Answering unrecognized message {code:?} (#{seq}) as unimplemented"
                    );

                    stream.send(&Unimplemented { seq }).await?;
                }
            }
        }
    }

    /// Send a _packet_ to the connected peer.
    pub async fn send(&mut self, message: &impl Message) -> Result<()> {
        let result = self.transmit(message).await;

        self.check(result).await
    }

    async fn transmit(&mut self, message: &impl Message) -> Result<()> {
        let Some(ref mut stream) = self.stream else {
            return Err(Error::Disconnected);
        };

        if stream.is_readable().await? && stream.peek().await?.is::<KexInit>() {
            let kexinit = stream.recv().await?;
            self.exchange(Some(kexinit)).await?;
        } else if stream.is_rekeyable() {
            self.exchange(None).await?;
        }

        let Some(ref mut stream) = self.stream else {
            return Err(Error::Disconnected);
        };

        stream.send(message).await
    }

    /// Initiate a new key-exchange with the peer, the session identifier is kept.
    pub async fn rekey(&mut self) -> Result<()> {
        let result = self.exchange(None).await;

        self.check(result).await
    }

    async fn exchange(&mut self, peerkexinit: Option<Packet>) -> Result<()> {
        let Some(ref mut stream) = self.stream else {
            return Err(Error::Disconnected);
        };

        tracing::debug!(
            "Re-keying with peer `{}`, initiated by {}",
            self.peer_id,
            if peerkexinit.is_some() { "them" } else { "us" }
        );

        self.state = State::ReKeying;
        self.config.kex(stream, &self.peer_id, peerkexinit).await?;
        self.state = State::Established;

        Ok(())
    }

    /// Answer the last received packet as unimplemented, for messages of the upper layers
    /// the caller doesn't handle.
    pub async fn unimplemented(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Disconnected);
        }

        self.send(&Unimplemented { seq: self.seq }).await
    }

    /// Send a _disconnect message_ to the peer and shutdown the session.
    pub async fn disconnect(
        &mut self,
        reason: DisconnectReason,
        description: impl Into<String>,
    ) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Err(Error::Disconnected);
        };
        let description: String = description.into();

        self.state = State::Closed;

        stream
            .send(&Disconnect {
                reason,
                description: description.into(),
                language: Default::default(),
            })
            .await?;
        stream.close().await?;

        tracing::debug!("Disconnected from peer `{}` with `{reason:?}`", self.peer_id);

        Ok(())
    }

    async fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        release(&mut self.stream, &mut self.state, result).await
    }
}

/// Release the stream on fatal errors, after a best-effort disconnect message.
async fn release<IO: Pipe, T>(
    stream: &mut Option<Stream<IO>>,
    state: &mut State,
    result: Result<T>,
) -> Result<T> {
    let Err(err) = &result else {
        return result;
    };

    if let Error::PeerDisconnected {
        reason,
        description,
    } = err
    {
        tracing::warn!("Peer disconnected with `{reason:?}`: {description}");

        *stream = None;
        *state = State::Closed;

        return result;
    }

    if let Some(mut stream) = stream.take() {
        if let Some(reason) = err.reason() {
            tracing::warn!("Session failed, disconnecting with `{reason:?}`: {err}");

            let disconnect = Disconnect {
                reason,
                description: err.to_string().into(),
                language: Default::default(),
            };
            if stream.send(&disconnect).await.is_ok() {
                stream.close().await.ok();
            }
        }

        *state = State::Errored;
    }

    result
}
