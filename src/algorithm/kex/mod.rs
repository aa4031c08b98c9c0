//! Key-exchange methods, deriving the [`TransportPair`] of a session.

use digest::{Digest, FixedOutputReset};
use signature::SignatureEncoding;
use ssh_key::{PrivateKey, PublicKey, Signature};
use strum::{AsRefStr, EnumString};

use crate::{
    algorithm::{
        key::{sign, verify},
        Category, Cipher, Compress, HostKeyVerifier, Hmac, Key, Negotiated, Verdict,
    },
    error::KexError,
    id::Id,
    stream::{Keys, Stream, Transport, TransportPair},
    wire::trans::{KexdhInit, KexdhReply},
    Pipe, Result,
};

pub mod curve25519;
pub mod dh;
pub mod exchange;

use exchange::Exchange;

/// SSH key-exchange algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Kex {
    /// Curve25519 ECDH with sha-2-256 digest.
    #[strum(serialize = "curve25519-sha256")]
    Curve25519Sha256,

    /// Curve25519 ECDH with sha-2-256 digest (pre-RFC 8731).
    #[strum(serialize = "curve25519-sha256@libssh.org")]
    Curve25519Sha256Libssh,

    /// Diffie-Hellman over the 2048-bit MODP group 14 with sha-2-256 digest.
    #[strum(serialize = "diffie-hellman-group14-sha256")]
    DiffieHellmanGroup14Sha256,

    /// Diffie-Hellman over the 2048-bit MODP group 14 with sha-1 digest.
    #[strum(serialize = "diffie-hellman-group14-sha1")]
    DiffieHellmanGroup14Sha1,

    /// Diffie-Hellman over the 1024-bit Oakley group 2 with sha-1 digest.
    #[strum(serialize = "diffie-hellman-group1-sha1")]
    DiffieHellmanGroup1Sha1,
}

/// One side's ephemeral key pair, for any of the [`Kex`] methods.
pub enum Ephemeral {
    /// A Curve25519 key pair.
    Curve25519(curve25519::Ephemeral),

    /// A Diffie-Hellman key pair.
    Dh(dh::Ephemeral),
}

impl Ephemeral {
    /// The public value, as sent on the wire.
    pub fn public(&self) -> Vec<u8> {
        match self {
            Self::Curve25519(ephemeral) => ephemeral.public(),
            Self::Dh(ephemeral) => ephemeral.public(),
        }
    }

    /// The shared secret with the peer's public value, as the contents of an `mpint`.
    pub fn agree(self, peer: &[u8]) -> Result<zeroize::Zeroizing<Vec<u8>>, KexError> {
        match self {
            Self::Curve25519(ephemeral) => ephemeral.agree(peer),
            Self::Dh(ephemeral) => ephemeral.agree(peer),
        }
    }
}

/// What one side brings to the key-exchange: its identification, its `SSH_MSG_KEXINIT`
/// and the algorithms negotiated for the direction it sends in.
pub struct KexMeta<'k> {
    /// The side's identification.
    pub id: &'k Id,

    /// The payload of the side's `SSH_MSG_KEXINIT`.
    pub kexinit: &'k [u8],

    /// The negotiated encryption algorithm.
    pub cipher: Cipher,

    /// The negotiated integrity algorithm.
    pub hmac: Hmac,

    /// The negotiated compression algorithm.
    pub compress: Compress,
}

impl<'k> KexMeta<'k> {
    /// The client's part, with the _client to server_ algorithms.
    pub fn client(id: &'k Id, kexinit: &'k [u8], negotiated: &Negotiated) -> Result<Self> {
        Ok(Self {
            id,
            kexinit,
            cipher: negotiated.parse(Category::EncryptC2S)?,
            hmac: negotiated.parse(Category::MacC2S)?,
            compress: negotiated.parse(Category::CompressC2S)?,
        })
    }

    /// The server's part, with the _server to client_ algorithms.
    pub fn server(id: &'k Id, kexinit: &'k [u8], negotiated: &Negotiated) -> Result<Self> {
        Ok(Self {
            id,
            kexinit,
            cipher: negotiated.parse(Category::EncryptS2C)?,
            hmac: negotiated.parse(Category::MacS2C)?,
            compress: negotiated.parse(Category::CompressS2C)?,
        })
    }

    fn into_transport(self, keys: Keys) -> Transport {
        Transport::new(self.cipher, self.hmac, self.compress, keys)
    }
}

impl Kex {
    /// Generate a fresh ephemeral key pair for this method.
    pub fn ephemeral(&self) -> Ephemeral {
        match self {
            Self::Curve25519Sha256 | Self::Curve25519Sha256Libssh => {
                Ephemeral::Curve25519(curve25519::Ephemeral::new())
            }
            Self::DiffieHellmanGroup14Sha256 | Self::DiffieHellmanGroup14Sha1 => {
                Ephemeral::Dh(dh::Ephemeral::new(&dh::GROUP14))
            }
            Self::DiffieHellmanGroup1Sha1 => Ephemeral::Dh(dh::Ephemeral::new(&dh::GROUP1)),
        }
    }

    fn is_sha1(&self) -> bool {
        matches!(
            self,
            Self::DiffieHellmanGroup14Sha1 | Self::DiffieHellmanGroup1Sha1
        )
    }

    /// Run the key-exchange as the client, `guess` being the ephemeral key pair
    /// of an already sent guessed `SSH_MSG_KEXDH_INIT`, if any.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn as_client(
        &self,
        stream: &mut Stream<impl Pipe>,
        guess: Option<Ephemeral>,
        key: Key,
        verifier: &dyn HostKeyVerifier,
        client: KexMeta<'_>,
        server: KexMeta<'_>,
    ) -> Result<TransportPair> {
        let ephemeral = match guess {
            Some(ephemeral) => ephemeral,
            None => {
                let ephemeral = self.ephemeral();
                stream
                    .send(&KexdhInit {
                        e: ephemeral.public().into(),
                    })
                    .await?;

                ephemeral
            }
        };

        let (client, server) = if self.is_sha1() {
            as_client::<sha1::Sha1>(stream, ephemeral, key, verifier, client, server).await?
        } else {
            as_client::<sha2::Sha256>(stream, ephemeral, key, verifier, client, server).await?
        };

        Ok(TransportPair {
            tx: client,
            rx: server,
        })
    }

    /// Run the key-exchange as the server, signing with the host `key` for the negotiated `algorithm`.
    pub(crate) async fn as_server(
        &self,
        stream: &mut Stream<impl Pipe>,
        key: &PrivateKey,
        algorithm: Key,
        client: KexMeta<'_>,
        server: KexMeta<'_>,
    ) -> Result<TransportPair> {
        let ephemeral = self.ephemeral();

        let (client, server) = if self.is_sha1() {
            as_server::<sha1::Sha1>(stream, ephemeral, key, algorithm, client, server).await?
        } else {
            as_server::<sha2::Sha256>(stream, ephemeral, key, algorithm, client, server).await?
        };

        Ok(TransportPair {
            tx: server,
            rx: client,
        })
    }
}

/// Whether a host key is usable for the negotiated signature algorithm,
/// any RSA key serving all the `rsa-sha2-*` flavors.
fn is_usable(negotiated: &Key, key: &PublicKey) -> bool {
    match (negotiated, key.algorithm()) {
        (Key::Rsa { .. }, Key::Rsa { .. }) => true,
        (negotiated, algorithm) => *negotiated == algorithm,
    }
}

fn derive<H: Digest + FixedOutputReset>(
    secret: &[u8],
    hash: &[u8],
    session_id: &[u8],
    client: KexMeta<'_>,
    server: KexMeta<'_>,
) -> (Transport, Transport) {
    let keys = Keys::as_client::<H>(secret, hash, session_id, &client.cipher, &client.hmac);
    let client = client.into_transport(keys);

    let keys = Keys::as_server::<H>(secret, hash, session_id, &server.cipher, &server.hmac);
    let server = server.into_transport(keys);

    (client, server)
}

async fn as_client<H: Digest + FixedOutputReset>(
    stream: &mut Stream<impl Pipe>,
    ephemeral: Ephemeral,
    key: Key,
    verifier: &dyn HostKeyVerifier,
    client: KexMeta<'_>,
    server: KexMeta<'_>,
) -> Result<(Transport, Transport)> {
    let e = ephemeral.public();

    let reply: KexdhReply = stream.recv_kex().await?.to()?;
    let secret = ephemeral.agree(&reply.f)?;

    let k_s = PublicKey::from_bytes(&reply.k_s)?;
    if !is_usable(&key, &k_s) {
        return Err(KexError::UnknownHostKey.into());
    }
    if verifier.verify(server.id, &k_s) == Verdict::Reject {
        return Err(KexError::HostKeyRejected.into());
    }

    let (v_c, v_s) = (client.id.to_string(), server.id.to_string());
    let hash = Exchange {
        v_c: v_c.as_bytes(),
        v_s: v_s.as_bytes(),
        i_c: client.kexinit,
        i_s: server.kexinit,
        k_s: &reply.k_s,
        e: &e,
        f: &reply.f,
        k: &secret,
    }
    .hash::<H>();

    let signature =
        Signature::try_from(reply.signature.as_ref()).map_err(|_| KexError::InvalidSignature)?;
    verify(&k_s, &key, &hash, &signature)?;

    let session_id = stream.with_session(&hash).to_vec();

    Ok(derive::<H>(&secret, &hash, &session_id, client, server))
}

async fn as_server<H: Digest + FixedOutputReset>(
    stream: &mut Stream<impl Pipe>,
    ephemeral: Ephemeral,
    key: &PrivateKey,
    algorithm: Key,
    client: KexMeta<'_>,
    server: KexMeta<'_>,
) -> Result<(Transport, Transport)> {
    let init: KexdhInit = stream.recv_kex().await?.to()?;

    let f = ephemeral.public();
    let secret = ephemeral.agree(&init.e)?;

    let k_s = key.public_key().to_bytes()?;

    let (v_c, v_s) = (client.id.to_string(), server.id.to_string());
    let hash = Exchange {
        v_c: v_c.as_bytes(),
        v_s: v_s.as_bytes(),
        i_c: client.kexinit,
        i_s: server.kexinit,
        k_s: &k_s,
        e: &init.e,
        f: &f,
        k: &secret,
    }
    .hash::<H>();

    let signature = sign(key, &algorithm, &hash)?;

    stream
        .send(&KexdhReply {
            k_s: k_s.into(),
            f: f.into(),
            signature: signature.to_vec().into(),
        })
        .await?;

    let session_id = stream.with_session(&hash).to_vec();

    Ok(derive::<H>(&secret, &hash, &session_id, client, server))
}
