use digest::{Digest, FixedOutputReset};
use securefmt::Debug;
use zeroize::Zeroize;

use crate::algorithm::{Cipher, Hmac};

/// The key material of one direction of the transport.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Keys {
    /// Cipher _initialization vector_.
    #[sensitive]
    pub iv: Vec<u8>,

    /// Cipher _key_.
    #[sensitive]
    pub key: Vec<u8>,

    /// Hmac _key_.
    #[sensitive]
    pub hmac: Vec<u8>,
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.iv.zeroize();
        self.key.zeroize();
        self.hmac.zeroize();
    }
}

impl Keys {
    /// Derive the _client to server_ keys, letters `A`, `C` and `E`.
    pub fn as_client<D: Digest + FixedOutputReset>(
        secret: &[u8],
        hash: &[u8],
        session_id: &[u8],
        cipher: &Cipher,
        hmac: &Hmac,
    ) -> Self {
        Self {
            iv: Self::derive::<D>(secret, hash, b'A', session_id, cipher.iv_size()),
            key: Self::derive::<D>(secret, hash, b'C', session_id, cipher.key_size()),
            hmac: Self::derive::<D>(secret, hash, b'E', session_id, hmac.key_size()),
        }
    }

    /// Derive the _server to client_ keys, letters `B`, `D` and `F`.
    pub fn as_server<D: Digest + FixedOutputReset>(
        secret: &[u8],
        hash: &[u8],
        session_id: &[u8],
        cipher: &Cipher,
        hmac: &Hmac,
    ) -> Self {
        Self {
            iv: Self::derive::<D>(secret, hash, b'B', session_id, cipher.iv_size()),
            key: Self::derive::<D>(secret, hash, b'D', session_id, cipher.key_size()),
            hmac: Self::derive::<D>(secret, hash, b'F', session_id, hmac.key_size()),
        }
    }

    /// `HASH(K || H || kind || session_id)`, extended with `HASH(K || H || K1 || .. || Kn)`
    /// until `size` bytes are available, where `K` is the `mpint` encoded `secret`.
    fn derive<D: Digest + FixedOutputReset>(
        secret: &[u8],
        hash: &[u8],
        kind: u8,
        session_id: &[u8],
        size: usize,
    ) -> Vec<u8> {
        let mut hasher = D::new()
            .chain_update((secret.len() as u32).to_be_bytes())
            .chain_update(secret)
            .chain_update(hash)
            .chain_update([kind])
            .chain_update(session_id);

        let mut key = hasher.finalize_reset().to_vec();

        while key.len() < size {
            hasher = hasher
                .chain_update((secret.len() as u32).to_be_bytes())
                .chain_update(secret)
                .chain_update(hash)
                .chain_update(&key);

            key.extend_from_slice(&hasher.finalize_reset());
        }

        key.truncate(size);

        key
    }
}
