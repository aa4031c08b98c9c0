//! Messages of the **[`SSH-TRANS`]** layer.
//!
//! [`SSH-TRANS`]: https://datatracker.ietf.org/doc/html/rfc4253

use binrw::binrw;
use strum::{AsRefStr, FromRepr};

use super::{
    arch::{Bytes, NameList},
    Message,
};
use crate::algorithm::Category;

/// The `SSH_MSG_DISCONNECT` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 1_u8)]
pub struct Disconnect {
    /// Reason for disconnection.
    pub reason: DisconnectReason,

    /// Description of the reason for disconnection.
    pub description: Bytes,

    /// Language tag.
    pub language: Bytes,
}

/// The `reason` for disconnect in the `SSH_MSG_DISCONNECT` message.
#[binrw]
#[brw(big, repr = u32)]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, FromRepr)]
pub enum DisconnectReason {
    /// `SSH_DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT`.
    HostNotAllowedToConnect = 1,

    /// `SSH_DISCONNECT_PROTOCOL_ERROR`.
    ProtocolError = 2,

    /// `SSH_DISCONNECT_KEY_EXCHANGE_FAILED`.
    KeyExchangeFailed = 3,

    /// `SSH_DISCONNECT_RESERVED`.
    Reserved = 4,

    /// `SSH_DISCONNECT_MAC_ERROR`.
    MacError = 5,

    /// `SSH_DISCONNECT_COMPRESSION_ERROR`.
    CompressionError = 6,

    /// `SSH_DISCONNECT_SERVICE_NOT_AVAILABLE`.
    ServiceNotAvailable = 7,

    /// `SSH_DISCONNECT_PROTOCOL_VERSION_NOT_SUPPORTED`.
    ProtocolVersionNotSupported = 8,

    /// `SSH_DISCONNECT_HOST_KEY_NOT_VERIFIABLE`.
    HostKeyNotVerifiable = 9,

    /// `SSH_DISCONNECT_CONNECTION_LOST`.
    ConnectionLost = 10,

    /// `SSH_DISCONNECT_BY_APPLICATION`.
    ByApplication = 11,

    /// `SSH_DISCONNECT_TOO_MANY_CONNECTIONS`.
    TooManyConnections = 12,

    /// `SSH_DISCONNECT_AUTH_CANCELLED_BY_USER`.
    AuthCancelledByUser = 13,

    /// `SSH_DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE`.
    NoMoreAuthMethodsAvailable = 14,

    /// `SSH_DISCONNECT_ILLEGAL_USER_NAME`.
    IllegalUserName = 15,
}

/// The `SSH_MSG_IGNORE` message.
#[binrw]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[brw(big, magic = 2_u8)]
pub struct Ignore {
    /// A random blob of data to ignore.
    pub data: Bytes,
}

/// The `SSH_MSG_UNIMPLEMENTED` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 3_u8)]
pub struct Unimplemented {
    /// Packet sequence number of the rejected message.
    pub seq: u32,
}

/// The `SSH_MSG_DEBUG` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 4_u8)]
pub struct DebugMessage {
    /// Whether the message should be displayed to the user.
    #[br(map = |byte: u8| byte != 0)]
    #[bw(map = |flag: &bool| u8::from(*flag))]
    pub always_display: bool,

    /// The debug message.
    pub message: Bytes,

    /// Language tag.
    pub language: Bytes,
}

/// The `SSH_MSG_SERVICE_REQUEST` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 5_u8)]
pub struct ServiceRequest {
    /// The service name to request.
    pub service_name: Bytes,
}

/// The `SSH_MSG_SERVICE_ACCEPT` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 6_u8)]
pub struct ServiceAccept {
    /// Service name accepted.
    pub service_name: Bytes,
}

/// The `SSH_MSG_KEXINIT` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 20_u8)]
pub struct KexInit {
    /// The kex-init cookie.
    pub cookie: [u8; 16],

    /// The key-exchange algorithms.
    pub kex_algorithms: NameList,

    /// The server host key algorithms.
    pub server_host_key_algorithms: NameList,

    /// The encryption algorithms from client to server.
    pub encryption_algorithms_client_to_server: NameList,

    /// The encryption algorithms from server to client.
    pub encryption_algorithms_server_to_client: NameList,

    /// The mac algorithms from client to server.
    pub mac_algorithms_client_to_server: NameList,

    /// The mac algorithms from server to client.
    pub mac_algorithms_server_to_client: NameList,

    /// The compression algorithms from client to server.
    pub compression_algorithms_client_to_server: NameList,

    /// The compression algorithms from server to client.
    pub compression_algorithms_server_to_client: NameList,

    /// The languages from client to server.
    pub languages_client_to_server: NameList,

    /// The languages from server to client.
    pub languages_server_to_client: NameList,

    /// Whether a guessed key-exchange packet follows.
    #[br(map = |byte: u8| byte != 0)]
    #[bw(map = |flag: &bool| u8::from(*flag))]
    pub first_kex_packet_follows: bool,

    #[br(temp)]
    #[bw(calc = 0)]
    reserved: u32,
}

impl KexInit {
    /// The advertised list for the `category`.
    pub fn list(&self, category: Category) -> &NameList {
        match category {
            Category::KeyExchange => &self.kex_algorithms,
            Category::ServerHostKey => &self.server_host_key_algorithms,
            Category::EncryptC2S => &self.encryption_algorithms_client_to_server,
            Category::EncryptS2C => &self.encryption_algorithms_server_to_client,
            Category::MacC2S => &self.mac_algorithms_client_to_server,
            Category::MacS2C => &self.mac_algorithms_server_to_client,
            Category::CompressC2S => &self.compression_algorithms_client_to_server,
            Category::CompressS2C => &self.compression_algorithms_server_to_client,
            Category::LangC2S => &self.languages_client_to_server,
            Category::LangS2C => &self.languages_server_to_client,
        }
    }
}

/// The `SSH_MSG_NEWKEYS` message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 21_u8)]
pub struct NewKeys;

/// The `SSH_MSG_KEXDH_INIT` (and `SSH_MSG_KEX_ECDH_INIT`) message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 30_u8)]
pub struct KexdhInit {
    /// The client's ephemeral public value,
    /// an `mpint` for Diffie-Hellman or a `string` for ECDH.
    pub e: Bytes,
}

/// The `SSH_MSG_KEXDH_REPLY` (and `SSH_MSG_KEX_ECDH_REPLY`) message.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 31_u8)]
pub struct KexdhReply {
    /// The server's public host key.
    pub k_s: Bytes,

    /// The server's ephemeral public value,
    /// an `mpint` for Diffie-Hellman or a `string` for ECDH.
    pub f: Bytes,

    /// The signature of the exchange hash.
    pub signature: Bytes,
}

macro_rules! message {
    ($($ty:ty => $code:literal),* $(,)?) => {
        $(
            impl Message for $ty {
                const CODE: u8 = $code;
            }
        )*
    };
}

message! {
    Disconnect => 1,
    Ignore => 2,
    Unimplemented => 3,
    DebugMessage => 4,
    ServiceRequest => 5,
    ServiceAccept => 6,
    KexInit => 20,
    NewKeys => 21,
    KexdhInit => 30,
    KexdhReply => 31,
}

#[cfg(test)]
mod tests {
    use crate::wire::Packet;

    use super::*;

    #[test]
    fn kexinit_layout() {
        let kexinit = KexInit {
            cookie: [0xaa; 16],
            kex_algorithms: NameList::new(["diffie-hellman-group14-sha1"]),
            server_host_key_algorithms: NameList::new(["ssh-ed25519"]),
            encryption_algorithms_client_to_server: NameList::new(["aes128-ctr"]),
            encryption_algorithms_server_to_client: NameList::new(["aes128-ctr"]),
            mac_algorithms_client_to_server: NameList::new(["hmac-sha1"]),
            mac_algorithms_server_to_client: NameList::new(["hmac-sha1"]),
            compression_algorithms_client_to_server: NameList::new(["none"]),
            compression_algorithms_server_to_client: NameList::new(["none"]),
            languages_client_to_server: NameList::default(),
            languages_server_to_client: NameList::default(),
            first_kex_packet_follows: true,
        };

        let packet = Packet::write(&kexinit).expect("serialization");
        let payload = &packet.payload;

        assert_eq!(payload[0], KexInit::CODE);
        assert_eq!(payload[1..17], [0xaa; 16]);
        assert_eq!(payload[17..21], [0, 0, 0, 27]);
        assert_eq!(&payload[21..48], b"diffie-hellman-group14-sha1");
        assert_eq!(payload[payload.len() - 5..], [1, 0, 0, 0, 0]);

        assert_eq!(packet.to::<KexInit>().expect("deserialization"), kexinit);
    }

    #[test]
    fn codes_match_magic() {
        fn code<T: Message>(message: &T) -> u8 {
            Packet::write(message).expect("serialization").payload[0]
        }

        assert_eq!(code(&NewKeys), NewKeys::CODE);
        assert_eq!(code(&Unimplemented { seq: 7 }), Unimplemented::CODE);
        assert_eq!(
            code(&Disconnect {
                reason: DisconnectReason::ByApplication,
                description: "bye".into(),
                language: Default::default(),
            }),
            Disconnect::CODE
        );
    }

    #[test]
    fn disconnect_reason_codes() {
        assert_eq!(DisconnectReason::KeyExchangeFailed as u32, 3);
        assert_eq!(DisconnectReason::IllegalUserName as u32, 15);
        assert_eq!(
            DisconnectReason::from_repr(9),
            Some(DisconnectReason::HostKeyNotVerifiable)
        );
    }
}
