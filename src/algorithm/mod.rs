//! Supported algorithms for **compression**, **encryption**, **integrity** and **key-exchange**,
//! the [`Catalog`] of preferences advertised in `SSH_MSG_KEXINIT` and the negotiation between peers.

use std::str::FromStr;

use rand::RngCore;
use strum::{AsRefStr, Display};

use crate::{
    error::NegotiationError,
    wire::{arch::NameList, trans::KexInit},
    Error, Result,
};

mod cipher;
pub use cipher::Cipher;
pub(crate) use cipher::CipherState;

mod compress;
pub use compress::Compress;
pub(crate) use compress::CompressState;

mod hmac;
pub use hmac::Hmac;

pub mod kex;
pub use kex::Kex;

mod key;
pub use key::{AcceptAll, HostKeyVerifier, Key, KnownKeys, TrustOnFirstUse, Verdict};

/// The categories of algorithms negotiated in `SSH_MSG_KEXINIT`, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum Category {
    /// Key-exchange method.
    #[strum(serialize = "kex")]
    KeyExchange,

    /// Server host key signature algorithm.
    #[strum(serialize = "host key")]
    ServerHostKey,

    /// Encryption, client to server.
    #[strum(serialize = "encryption (client to server)")]
    EncryptC2S,

    /// Encryption, server to client.
    #[strum(serialize = "encryption (server to client)")]
    EncryptS2C,

    /// Integrity, client to server.
    #[strum(serialize = "mac (client to server)")]
    MacC2S,

    /// Integrity, server to client.
    #[strum(serialize = "mac (server to client)")]
    MacS2C,

    /// Compression, client to server.
    #[strum(serialize = "compression (client to server)")]
    CompressC2S,

    /// Compression, server to client.
    #[strum(serialize = "compression (server to client)")]
    CompressS2C,

    /// Language tag, client to server.
    #[strum(serialize = "language (client to server)")]
    LangC2S,

    /// Language tag, server to client.
    #[strum(serialize = "language (server to client)")]
    LangS2C,
}

impl Category {
    /// All the categories, in the order of the `SSH_MSG_KEXINIT` name-lists.
    pub const ALL: [Self; 10] = [
        Self::KeyExchange,
        Self::ServerHostKey,
        Self::EncryptC2S,
        Self::EncryptS2C,
        Self::MacC2S,
        Self::MacS2C,
        Self::CompressC2S,
        Self::CompressS2C,
        Self::LangC2S,
        Self::LangS2C,
    ];

    /// Language tags are optional, every other category needs a common algorithm.
    pub fn is_required(self) -> bool {
        !matches!(self, Self::LangC2S | Self::LangS2C)
    }

    fn index(self) -> usize {
        self as usize
    }

    fn supports(self, name: &str) -> bool {
        match self {
            Self::KeyExchange => Kex::from_str(name).is_ok(),
            // `ssh-rsa` signatures are sha-1 based, which the key handling can't produce.
            Self::ServerHostKey => {
                Key::from_str(name).is_ok_and(|key| key != Key::Rsa { hash: None })
            }
            Self::EncryptC2S | Self::EncryptS2C => Cipher::from_str(name).is_ok(),
            Self::MacC2S | Self::MacS2C => Hmac::from_str(name).is_ok(),
            Self::CompressC2S | Self::CompressS2C => Compress::from_str(name).is_ok(),
            Self::LangC2S | Self::LangS2C => true,
        }
    }
}

/// Errors raised while building a [`Catalog`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A required category was left without any algorithm.
    #[error("No algorithm configured for `{0}`")]
    Empty(Category),

    /// The same algorithm appears twice in a category.
    #[error("Algorithm `{name}` is listed twice for `{category}`")]
    Duplicate {
        /// The category of the list.
        category: Category,

        /// The duplicated name.
        name: String,
    },

    /// The algorithm isn't implemented by this crate.
    #[error("Algorithm `{name}` is unsupported for `{category}`")]
    Unsupported {
        /// The category of the list.
        category: Category,

        /// The unknown name.
        name: String,
    },
}

/// The ordered preference lists of algorithms for each [`Category`].
///
/// A catalog is immutable once built, share it between sessions with an [`std::sync::Arc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    lists: [NameList; 10],
}

impl Default for Catalog {
    fn default() -> Self {
        let ciphers = NameList::new([
            Cipher::Aes256Ctr,
            Cipher::Aes192Ctr,
            Cipher::Aes128Ctr,
            Cipher::Aes256Cbc,
            Cipher::Aes192Cbc,
            Cipher::Aes128Cbc,
            Cipher::TDesCbc,
        ]);
        let macs = NameList::new([
            Hmac::HmacSha512,
            Hmac::HmacSha256,
            Hmac::HmacSha1,
            Hmac::HmacSha196,
            Hmac::HmacMd5,
            Hmac::HmacMd596,
        ]);
        let compressions = NameList::new([Compress::None, Compress::Zlib]);

        Self {
            lists: [
                NameList::new([
                    Kex::Curve25519Sha256,
                    Kex::Curve25519Sha256Libssh,
                    Kex::DiffieHellmanGroup14Sha256,
                    Kex::DiffieHellmanGroup14Sha1,
                    Kex::DiffieHellmanGroup1Sha1,
                ]),
                NameList::new([
                    Key::Ed25519,
                    Key::Ecdsa {
                        curve: ssh_key::EcdsaCurve::NistP384,
                    },
                    Key::Ecdsa {
                        curve: ssh_key::EcdsaCurve::NistP256,
                    },
                    Key::Rsa {
                        hash: Some(ssh_key::HashAlg::Sha512),
                    },
                    Key::Rsa {
                        hash: Some(ssh_key::HashAlg::Sha256),
                    },
                    Key::Dsa,
                ]),
                ciphers.clone(),
                ciphers,
                macs.clone(),
                macs,
                compressions.clone(),
                compressions,
                NameList::default(),
                NameList::default(),
            ],
        }
    }
}

impl Catalog {
    /// Replace the preference list of a `category` (both directions are distinct categories),
    /// checking that every name is implemented and appears only once.
    pub fn with<I, S>(mut self, category: Category, names: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = NameList::new(names);

        for (idx, name) in list.iter().enumerate() {
            if !category.supports(name) {
                return Err(CatalogError::Unsupported {
                    category,
                    name: name.into(),
                });
            }
            if list.iter().take(idx).any(|other| other == name) {
                return Err(CatalogError::Duplicate {
                    category,
                    name: name.into(),
                });
            }
        }
        if category.is_required() && list.is_empty() {
            return Err(CatalogError::Empty(category));
        }

        self.lists[category.index()] = list;

        Ok(self)
    }

    /// Replace the preference lists of both directions of a category pair.
    pub fn with_both<I, S>(
        self,
        categories: (Category, Category),
        names: I,
    ) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S> + Clone,
        S: AsRef<str>,
    {
        self.with(categories.0, names.clone())?
            .with(categories.1, names)
    }

    /// The preference list of a `category`, most preferred first.
    pub fn list(&self, category: Category) -> &NameList {
        &self.lists[category.index()]
    }

    /// Build a fresh `SSH_MSG_KEXINIT` advertising this catalog, with a random cookie.
    pub fn kexinit(&self, first_kex_packet_follows: bool) -> KexInit {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        let [kex, key, enc_c2s, enc_s2c, mac_c2s, mac_s2c, comp_c2s, comp_s2c, lang_c2s, lang_s2c] =
            self.lists.clone();

        KexInit {
            cookie,
            kex_algorithms: kex,
            server_host_key_algorithms: key,
            encryption_algorithms_client_to_server: enc_c2s,
            encryption_algorithms_server_to_client: enc_s2c,
            mac_algorithms_client_to_server: mac_c2s,
            mac_algorithms_server_to_client: mac_s2c,
            compression_algorithms_client_to_server: comp_c2s,
            compression_algorithms_server_to_client: comp_s2c,
            languages_client_to_server: lang_c2s,
            languages_server_to_client: lang_s2c,
            first_kex_packet_follows,
        }
    }
}

/// The algorithms picked for each [`Category`] by [`negotiate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    chosen: [Option<String>; 10],
}

impl Negotiated {
    /// The algorithm chosen for a `category`, `None` only for unset language tags.
    pub fn get(&self, category: Category) -> Option<&str> {
        self.chosen[category.index()].as_deref()
    }

    /// Parse the algorithm chosen for a `category` into its implementation.
    pub fn parse<T: FromStr>(&self, category: Category) -> Result<T> {
        let name = self.get(category).unwrap_or_default();

        name.parse()
            .map_err(|_| Error::UnsupportedAlgorithm(name.into()))
    }
}

/// Pick one algorithm per category: the first entry of the **client**'s list
/// that also appears in the **server**'s list.
///
/// Both peers call this with the same arguments and thus reach the same result,
/// whatever their side. Language tags are optional, and resolve to nothing
/// when either side doesn't advertise any.
pub fn negotiate(client: &KexInit, server: &KexInit) -> Result<Negotiated, NegotiationError> {
    let mut chosen: [Option<String>; 10] = Default::default();

    for category in Category::ALL {
        let (ours, theirs) = (client.list(category), server.list(category));

        chosen[category.index()] = match ours.preferred_in(theirs) {
            Some(name) => Some(name.to_owned()),
            None if !category.is_required() && (ours.is_empty() || theirs.is_empty()) => None,
            None => return Err(NegotiationError::NoCommonAlgorithm(category)),
        };
    }

    Ok(Negotiated { chosen })
}

/// Whether the guessed key-exchange packet that followed the client's `SSH_MSG_KEXINIT`
/// was computed for the right algorithms, that is when both peers' first key-exchange
/// and host key preferences agree.
pub fn guessed_right(client: &KexInit, server: &KexInit) -> bool {
    [Category::KeyExchange, Category::ServerHostKey]
        .into_iter()
        .all(|category| {
            client.list(category).first().is_some()
                && client.list(category).first() == server.list(category).first()
        })
}
