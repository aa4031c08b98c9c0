use thiserror::Error;

use crate::{algorithm::Category, wire::trans::DisconnectReason};

/// The error types that can occur when manipulating this crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed identification string.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The handshake went out of order.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Algorithm negotiation failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Key-exchange failed.
    #[error(transparent)]
    Kex(#[from] KexError),

    /// Binary packet framing error.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// Failure of the underlying connection, timeouts included.
    #[error(transparent)]
    Transport(#[from] std::io::Error),

    /// Binary (de)-serialization error of a message body.
    #[error(transparent)]
    Binary(#[from] binrw::Error),

    /// SSH Key error.
    #[error(transparent)]
    Key(#[from] ssh_key::Error),

    /// Error while encrypting or decrypting messages.
    #[error("The cipher ended up in an error")]
    Cipher,

    /// A negotiated or configured algorithm isn't implemented by this crate.
    #[error("Algorithm `{0}` is unsupported")]
    UnsupportedAlgorithm(String),

    /// The peer sent a disconnect message.
    #[error("The peer disconnected with `{reason:?}`: {description}")]
    PeerDisconnected {
        /// Reason code sent by the peer.
        reason: DisconnectReason,

        /// Human-readable description sent by the peer.
        description: String,
    },

    /// The session has been closed.
    #[error("The session has been disconnected")]
    Disconnected,
}

impl Error {
    /// The most specific [`DisconnectReason`] to report to the peer for this error,
    /// `None` when nothing should be sent.
    pub fn reason(&self) -> Option<DisconnectReason> {
        Some(match self {
            Self::Format(_) => DisconnectReason::ProtocolError,
            Self::Handshake(HandshakeError::VersionMismatch { .. }) => {
                DisconnectReason::ProtocolVersionNotSupported
            }
            Self::Handshake(_) | Self::Binary(_) => DisconnectReason::ProtocolError,
            Self::Negotiation(_) | Self::UnsupportedAlgorithm(_) => {
                DisconnectReason::KeyExchangeFailed
            }
            Self::Kex(KexError::InvalidPublicValue) => DisconnectReason::KeyExchangeFailed,
            Self::Kex(_) | Self::Key(_) => DisconnectReason::HostKeyNotVerifiable,
            Self::Framing(FramingError::MacMismatch) => DisconnectReason::MacError,
            Self::Framing(FramingError::Compression) => DisconnectReason::CompressionError,
            Self::Framing(_) | Self::Cipher => DisconnectReason::ProtocolError,
            Self::Transport(_) => DisconnectReason::ConnectionLost,
            Self::PeerDisconnected { .. } | Self::Disconnected => return None,
        })
    }
}

/// Malformed identification string.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// The line exceeds 255 bytes, terminator included.
    #[error("Identification string exceeds 255 bytes")]
    TooLong,

    /// The line contains a NUL byte.
    #[error("Identification string contains a NUL byte")]
    Nul,

    /// The line isn't terminated by exactly one CR LF.
    #[error("Identification string isn't terminated by CR LF")]
    Terminator,

    /// The line doesn't start with `SSH-`, or misses its version fields.
    #[error("Identification string doesn't start with `SSH-<proto>-<software>`")]
    Prefix,

    /// The protocol version isn't `2.0`.
    #[error("Unsupported protocol version in identification string")]
    Version,

    /// The software version is empty, or contains whitespace, `-` or non-printable bytes.
    #[error("Invalid software version in identification string")]
    SoftwareVersion,

    /// The comments are empty, or contain non-printable bytes.
    #[error("Invalid comments in identification string")]
    Comments,

    /// The peer sent too many lines before its identification string.
    #[error("Too many lines preceding the identification string")]
    Preamble,
}

/// The handshake went out of order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The protocol versions don't match or aren't `2.0`.
    #[error("Incompatible protocol versions, ours `{ours}` and theirs `{theirs}`")]
    VersionMismatch {
        /// Our protocol version.
        ours: String,

        /// The peer's protocol version.
        theirs: String,
    },

    /// A message arrived where the protocol forbids it.
    #[error("Unexpected message with code {0}")]
    UnexpectedMessage(u8),
}

/// Algorithm negotiation failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationError {
    /// Both sides advertised disjoint lists for this category.
    #[error("Unable to negotiate a common algorithm for `{0}`")]
    NoCommonAlgorithm(Category),
}

/// Key-exchange failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KexError {
    /// The peer's ephemeral public value is out of range.
    #[error("The peer's ephemeral public value is invalid")]
    InvalidPublicValue,

    /// The signature over the exchange hash didn't verify.
    #[error("The host key signature over the exchange hash is invalid")]
    InvalidSignature,

    /// The host key verification policy refused the key.
    #[error("The host key was rejected")]
    HostKeyRejected,

    /// The host key doesn't match the negotiated host key algorithm.
    #[error("The host key doesn't match the negotiated algorithm")]
    UnknownHostKey,
}

/// Binary packet framing error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// The payload exceeds the maximum packet size.
    #[error("Packet is too large")]
    PacketTooLarge,

    /// Padding is shorter than 4 bytes, or larger than the packet.
    #[error("Packet padding is invalid")]
    InvalidPadding,

    /// The packet integrity check failed.
    #[error("Packet MAC verification failed")]
    MacMismatch,

    /// The declared packet length isn't aligned or exceeds the maximum.
    #[error("Packet length is out of bounds")]
    LengthOutOfBounds,

    /// The payload couldn't be (de)compressed.
    #[error("Packet (de)compression failed")]
    Compression,
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_failures_report_key_exchange_failed() {
        let error = Error::from(NegotiationError::NoCommonAlgorithm(Category::CompressC2S));

        assert_eq!(error.reason(), Some(DisconnectReason::KeyExchangeFailed));
    }

    #[test]
    fn mac_failures_report_mac_error() {
        let error = Error::from(FramingError::MacMismatch);

        assert_eq!(error.reason(), Some(DisconnectReason::MacError));
    }

    #[test]
    fn peer_disconnects_are_not_echoed() {
        let error = Error::PeerDisconnected {
            reason: DisconnectReason::ByApplication,
            description: String::new(),
        };

        assert_eq!(error.reason(), None);
        assert_eq!(Error::Disconnected.reason(), None);
    }
}
