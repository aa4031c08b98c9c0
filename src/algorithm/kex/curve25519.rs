//! Elliptic-curve Diffie-Hellman over Curve25519,
//! see [RFC8731](https://datatracker.ietf.org/doc/html/rfc8731).

use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::{error::KexError, wire::arch::mpint};

/// One side's ephemeral key pair for a key-exchange.
pub struct Ephemeral {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl Ephemeral {
    /// Generate a fresh key pair.
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);

        Self { secret, public }
    }

    /// The public value, as the contents of a `string`.
    pub fn public(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    /// The shared secret with the peer's public value, as the contents of an `mpint`.
    pub fn agree(self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>, KexError> {
        let peer = <[u8; 32]>::try_from(peer).map_err(|_| KexError::InvalidPublicValue)?;
        let secret = self.secret.diffie_hellman(&PublicKey::from(peer));

        // Low-order points yield an all-zero secret.
        if !secret.was_contributory() {
            return Err(KexError::InvalidPublicValue);
        }

        Ok(Zeroizing::new(mpint(secret.as_bytes())))
    }
}
