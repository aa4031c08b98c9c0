//! Wire format of the protocol: data types, **[`SSH-TRANS`]** messages and packet payloads.
//!
//! [`SSH-TRANS`]: https://datatracker.ietf.org/doc/html/rfc4253

use std::io::Cursor;

use binrw::{
    meta::{ReadEndian, WriteEndian},
    BinRead, BinWrite,
};

use crate::{error::HandshakeError, Error, Result};

pub mod arch;
pub mod trans;

/// A message of the protocol, introduced by its one-byte message code.
pub trait Message:
    for<'r> BinRead<Args<'r> = ()>
    + ReadEndian
    + for<'w> BinWrite<Args<'w> = ()>
    + WriteEndian
    + std::fmt::Debug
{
    /// The `SSH_MSG_*` code of the message.
    const CODE: u8;
}

/// The payload of a binary packet, compressed, encrypted and authenticated
/// by the [`crate::stream::Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The payload bytes, the message code first.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Serialize a `message` into a [`Packet`].
    pub fn write<T: Message>(message: &T) -> Result<Self> {
        let mut buffer = Cursor::new(Vec::new());
        message.write(&mut buffer)?;

        Ok(Self {
            payload: buffer.into_inner(),
        })
    }

    /// The message code of the packet, if any.
    pub fn code(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Whether the packet holds a message of type `T`.
    pub fn is<T: Message>(&self) -> bool {
        self.code() == Some(T::CODE)
    }

    /// Deserialize the packet as a `T` message, a peer's [`trans::Disconnect`]
    /// becoming [`Error::PeerDisconnected`] and any other message
    /// a [`HandshakeError::UnexpectedMessage`].
    pub fn to<T: Message>(&self) -> Result<T> {
        if self.is::<T>() {
            Ok(T::read(&mut Cursor::new(&self.payload))?)
        } else if self.is::<trans::Disconnect>() {
            let trans::Disconnect {
                reason,
                description,
                ..
            } = trans::Disconnect::read(&mut Cursor::new(&self.payload))?;

            Err(Error::PeerDisconnected {
                reason,
                description: description.to_string_lossy(),
            })
        } else {
            Err(HandshakeError::UnexpectedMessage(self.code().unwrap_or_default()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{trans::*, *};

    #[test]
    fn unexpected_messages_are_reported() {
        let packet = Packet::write(&NewKeys).expect("serialization");

        assert!(matches!(
            packet.to::<KexInit>(),
            Err(Error::Handshake(HandshakeError::UnexpectedMessage(21)))
        ));
    }

    #[test]
    fn disconnects_are_surfaced() {
        let packet = Packet::write(&Disconnect {
            reason: DisconnectReason::KeyExchangeFailed,
            description: "no common algorithm".into(),
            language: Default::default(),
        })
        .expect("serialization");

        assert!(matches!(
            packet.to::<KexInit>(),
            Err(Error::PeerDisconnected {
                reason: DisconnectReason::KeyExchangeFailed,
                ..
            })
        ));
    }
}
