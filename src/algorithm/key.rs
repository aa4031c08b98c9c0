use std::fmt::Debug;

use once_cell::sync::OnceCell;
use signature::{SignatureEncoding, Signer, Verifier};
use ssh_key::{HashAlg, PrivateKey, PublicKey, Signature};

#[doc(no_inline)]
pub use ssh_key::Algorithm as Key;

use crate::{error::KexError, id::Id, Result};

/// Sign the `message` with the host `key`, for the negotiated `algorithm`,
/// RSA keys signing with the hash the algorithm names.
pub(crate) fn sign(key: &PrivateKey, algorithm: &Key, message: &[u8]) -> Result<Signature> {
    let signature = match (algorithm, key.key_data().rsa()) {
        (Key::Rsa { hash: Some(HashAlg::Sha256) }, Some(keypair)) => {
            rsa::pkcs1v15::SigningKey::<sha2::Sha256>::try_from(keypair)?
                .try_sign(message)
                .map_err(|_| KexError::InvalidSignature)?
                .to_vec()
        }
        (Key::Rsa { hash: Some(HashAlg::Sha512) }, Some(keypair)) => {
            rsa::pkcs1v15::SigningKey::<sha2::Sha512>::try_from(keypair)?
                .try_sign(message)
                .map_err(|_| KexError::InvalidSignature)?
                .to_vec()
        }
        (Key::Rsa { .. }, _) => return Err(KexError::UnknownHostKey.into()),
        _ => return Ok(Signer::try_sign(key, message).map_err(|_| KexError::InvalidSignature)?),
    };

    Ok(Signature::new(algorithm.clone(), signature)?)
}

/// Verify the `signature` of the `message` by the host `key`,
/// which must have been made with the negotiated `algorithm`.
pub(crate) fn verify(
    key: &PublicKey,
    algorithm: &Key,
    message: &[u8],
    signature: &Signature,
) -> Result<(), KexError> {
    if signature.algorithm() != *algorithm {
        tracing::debug!(
            "Signature made with `{}` where `{algorithm}` was negotiated",
            signature.algorithm()
        );

        return Err(KexError::InvalidSignature);
    }

    Verifier::verify(key, message, signature).map_err(|_| KexError::InvalidSignature)
}

/// The outcome of a [`HostKeyVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Carry on with the key-exchange.
    Accept,

    /// Abort the key-exchange.
    Reject,
}

/// The client's policy to trust the host key presented by a server.
///
/// The signature over the exchange hash is checked by the key-exchange itself,
/// the policy only decides whether this key belongs to this server.
pub trait HostKeyVerifier: Debug + Send + Sync {
    /// Decide on the `key` presented by the server identified as `peer`.
    fn verify(&self, peer: &Id, key: &PublicKey) -> Verdict;
}

/// Accept any host key, suitable only for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl HostKeyVerifier for AcceptAll {
    fn verify(&self, _: &Id, _: &PublicKey) -> Verdict {
        Verdict::Accept
    }
}

/// Accept only the listed host keys.
#[derive(Debug, Default, Clone)]
pub struct KnownKeys(pub Vec<PublicKey>);

impl HostKeyVerifier for KnownKeys {
    fn verify(&self, _: &Id, key: &PublicKey) -> Verdict {
        if self.0.iter().any(|known| known.key_data() == key.key_data()) {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

/// Accept the first host key presented, then only this one.
#[derive(Debug, Default)]
pub struct TrustOnFirstUse(OnceCell<PublicKey>);

impl TrustOnFirstUse {
    /// The trusted key, if any was presented yet.
    pub fn trusted(&self) -> Option<&PublicKey> {
        self.0.get()
    }
}

impl HostKeyVerifier for TrustOnFirstUse {
    fn verify(&self, peer: &Id, key: &PublicKey) -> Verdict {
        let trusted = self.0.get_or_init(|| {
            tracing::debug!("Trusting host key `{}` for `{peer}`", key.algorithm());

            key.clone()
        });

        if trusted.key_data() == key.key_data() {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}
