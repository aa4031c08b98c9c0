//! Finite-field Diffie-Hellman over the MODP groups of
//! [RFC2409 §6.2](https://datatracker.ietf.org/doc/html/rfc2409#section-6.2) and
//! [RFC3526 §3](https://datatracker.ietf.org/doc/html/rfc3526#section-3).

use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::{
    error::KexError,
    wire::arch::{mpint, mpint_unsigned},
};

/// Private exponents are drawn below `2^512`, twice the strength of the largest digest in use.
const EXPONENT_BITS: u64 = 512;

/// A Diffie-Hellman group, its prime modulus `p` and generator `g`.
#[derive(Debug)]
pub struct Group {
    /// The safe prime modulus.
    pub p: BigUint,

    /// The generator.
    pub g: BigUint,
}

#[allow(clippy::unwrap_used)]
fn group(p: &str) -> Group {
    let hex = p.split_whitespace().collect::<String>();

    Group {
        p: BigUint::parse_bytes(hex.as_bytes(), 16).unwrap(),
        g: BigUint::from(2u32),
    }
}

/// The 1024-bit _Oakley group 2_, used by `diffie-hellman-group1-sha1`.
pub static GROUP1: Lazy<Group> = Lazy::new(|| {
    group(
        "FFFFFFFF FFFFFFFF C90FDAA2 2168C234 C4C6628B 80DC1CD1
         29024E08 8A67CC74 020BBEA6 3B139B22 514A0879 8E3404DD
         EF9519B3 CD3A431B 302B0A6D F25F1437 4FE1356D 6D51C245
         E485B576 625E7EC6 F44C42E9 A637ED6B 0BFF5CB6 F406B7ED
         EE386BFB 5A899FA5 AE9F2411 7C4B1FE6 49286651 ECE65381
         FFFFFFFF FFFFFFFF",
    )
});

/// The 2048-bit _group 14_, used by `diffie-hellman-group14-sha1` and `diffie-hellman-group14-sha256`.
pub static GROUP14: Lazy<Group> = Lazy::new(|| {
    group(
        "FFFFFFFF FFFFFFFF C90FDAA2 2168C234 C4C6628B 80DC1CD1
         29024E08 8A67CC74 020BBEA6 3B139B22 514A0879 8E3404DD
         EF9519B3 CD3A431B 302B0A6D F25F1437 4FE1356D 6D51C245
         E485B576 625E7EC6 F44C42E9 A637ED6B 0BFF5CB6 F406B7ED
         EE386BFB 5A899FA5 AE9F2411 7C4B1FE6 49286651 ECE45B3D
         C2007CB8 A163BF05 98DA4836 1C55D39A 69163FA8 FD24CF5F
         83655D23 DCA3AD96 1C62F356 208552BB 9ED52907 7096966D
         670C354E 4ABC9804 F1746C08 CA18217C 32905E46 2E36CE3B
         E39E772C 180E8603 9B2783A2 EC07A28F B5C55DF0 6F4C52C9
         DE2BCBF6 95581718 3995497C EA956AE5 15D22618 98FA0510
         15728E5A 8AACAA68 FFFFFFFF FFFFFFFF",
    )
});

impl Group {
    /// Draw a private exponent `x` and compute the public value `g^x mod p`.
    pub fn generate(&self, rng: &mut (impl Rng + CryptoRng)) -> (BigUint, BigUint) {
        let x = rng.gen_biguint_range(&BigUint::from(2u32), &(BigUint::from(1u32) << EXPONENT_BITS));
        let e = self.g.modpow(&x, &self.p);

        (x, e)
    }

    /// Compute the shared secret `peer^x mod p`, rejecting peer values outside of `[1, p-1]`.
    pub fn agree(&self, x: &BigUint, peer: &BigUint) -> Result<BigUint, KexError> {
        if *peer < BigUint::from(1u32) || *peer >= self.p {
            return Err(KexError::InvalidPublicValue);
        }

        Ok(peer.modpow(x, &self.p))
    }
}

/// One side's ephemeral key pair for a key-exchange.
pub struct Ephemeral {
    group: &'static Group,
    x: BigUint,
    e: BigUint,
}

impl Ephemeral {
    /// Generate a fresh key pair in the `group`.
    pub fn new(group: &'static Group) -> Self {
        let (x, e) = group.generate(&mut rand::thread_rng());

        Self { group, x, e }
    }

    /// The public value, as the contents of an `mpint`.
    pub fn public(&self) -> Vec<u8> {
        mpint(&self.e.to_bytes_be())
    }

    /// The shared secret with the peer's public value, as the contents of an `mpint`.
    pub fn agree(self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>, KexError> {
        let peer = mpint_unsigned(peer).ok_or(KexError::InvalidPublicValue)?;
        let secret = self
            .group
            .agree(&self.x, &BigUint::from_bytes_be(peer))?;

        Ok(Zeroizing::new(mpint(&secret.to_bytes_be())))
    }
}
