//! The exchange hash `H` binding both peers' transcripts to the shared secret,
//! see [RFC4253 §8](https://datatracker.ietf.org/doc/html/rfc4253#section-8).

use digest::Digest;

/// The fields hashed into `H`, each serialized as a `string`.
#[derive(Debug)]
pub struct Exchange<'e> {
    /// The client's identification string, without CR LF.
    pub v_c: &'e [u8],

    /// The server's identification string, without CR LF.
    pub v_s: &'e [u8],

    /// The payload of the client's `SSH_MSG_KEXINIT`.
    pub i_c: &'e [u8],

    /// The payload of the server's `SSH_MSG_KEXINIT`.
    pub i_s: &'e [u8],

    /// The server's public host key blob.
    pub k_s: &'e [u8],

    /// The client's ephemeral public value.
    pub e: &'e [u8],

    /// The server's ephemeral public value.
    pub f: &'e [u8],

    /// The shared secret, as the contents of an `mpint`.
    pub k: &'e [u8],
}

impl Exchange<'_> {
    /// Compute `H` with the key-exchange's digest.
    pub fn hash<H: Digest>(&self) -> Vec<u8> {
        let mut hasher = H::new();

        for field in [
            self.v_c, self.v_s, self.i_c, self.i_s, self.k_s, self.e, self.f, self.k,
        ] {
            hasher.update((field.len() as u32).to_be_bytes());
            hasher.update(field);
        }

        hasher.finalize().to_vec()
    }
}
