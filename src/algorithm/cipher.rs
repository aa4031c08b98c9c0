use cipher::{
    generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher,
};
use strum::{AsRefStr, EnumString};

use crate::{Error, Result};

/// The lazily-initialized state of a [`Cipher`], boxed to keep the transport
/// independent from the concrete cipher types.
pub type CipherState = Box<dyn std::any::Any + Send + Sync>;

/// SSH cipher algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Cipher {
    /// AES-256 in counter (CTR) mode.
    Aes256Ctr,

    /// AES-192 in counter (CTR) mode.
    Aes192Ctr,

    /// AES-128 in counter (CTR) mode.
    Aes128Ctr,

    /// AES-256 in cipher block chaining (CBC) mode.
    Aes256Cbc,

    /// AES-192 in cipher block chaining (CBC) mode.
    Aes192Cbc,

    /// AES-128 in cipher block chaining (CBC) mode.
    Aes128Cbc,

    /// TripleDES in cipher block chaining (CBC) mode.
    #[strum(serialize = "3des-cbc")]
    TDesCbc,

    /// No cipher algorithm.
    #[default]
    None,
}

fn state<'s, T>(state: &'s mut Option<CipherState>, key: &[u8], iv: &[u8]) -> Result<&'s mut T>
where
    T: KeyIvInit + Send + Sync + 'static,
{
    if state.is_none() {
        let cipher = T::new_from_slices(key, iv).map_err(|_| Error::Cipher)?;
        *state = Some(Box::new(cipher));
    }

    state
        .as_mut()
        .and_then(|state| state.downcast_mut())
        .ok_or(Error::Cipher)
}

fn ctr<C: StreamCipher>(cipher: &mut C, buffer: &mut [u8]) -> Result<()> {
    cipher
        .try_apply_keystream(buffer)
        .map_err(|_| Error::Cipher)
}

fn cbc_encrypt<C: BlockEncryptMut>(cipher: &mut C, buffer: &mut [u8]) -> Result<()> {
    if buffer.len() % C::block_size() != 0 {
        return Err(Error::Cipher);
    }

    for block in buffer.chunks_exact_mut(C::block_size()) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }

    Ok(())
}

fn cbc_decrypt<C: BlockDecryptMut>(cipher: &mut C, buffer: &mut [u8]) -> Result<()> {
    if buffer.len() % C::block_size() != 0 {
        return Err(Error::Cipher);
    }

    for block in buffer.chunks_exact_mut(C::block_size()) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }

    Ok(())
}

impl Cipher {
    /// Encrypt `buffer` in place, which must be a multiple of [`Cipher::block_size`] long;
    /// the chaining state carries over to the next call.
    pub(crate) fn encrypt(
        &self,
        cipher: &mut Option<CipherState>,
        key: &[u8],
        iv: &[u8],
        buffer: &mut [u8],
    ) -> Result<()> {
        match self {
            Self::Aes256Ctr => ctr(state::<ctr::Ctr128BE<aes::Aes256>>(cipher, key, iv)?, buffer),
            Self::Aes192Ctr => ctr(state::<ctr::Ctr128BE<aes::Aes192>>(cipher, key, iv)?, buffer),
            Self::Aes128Ctr => ctr(state::<ctr::Ctr128BE<aes::Aes128>>(cipher, key, iv)?, buffer),
            Self::Aes256Cbc => {
                cbc_encrypt(state::<cbc::Encryptor<aes::Aes256>>(cipher, key, iv)?, buffer)
            }
            Self::Aes192Cbc => {
                cbc_encrypt(state::<cbc::Encryptor<aes::Aes192>>(cipher, key, iv)?, buffer)
            }
            Self::Aes128Cbc => {
                cbc_encrypt(state::<cbc::Encryptor<aes::Aes128>>(cipher, key, iv)?, buffer)
            }
            Self::TDesCbc => {
                cbc_encrypt(state::<cbc::Encryptor<des::TdesEde3>>(cipher, key, iv)?, buffer)
            }
            Self::None => Ok(()),
        }
    }

    /// Decrypt `buffer` in place, which must be a multiple of [`Cipher::block_size`] long;
    /// the chaining state carries over to the next call.
    pub(crate) fn decrypt(
        &self,
        cipher: &mut Option<CipherState>,
        key: &[u8],
        iv: &[u8],
        buffer: &mut [u8],
    ) -> Result<()> {
        match self {
            // Counter mode is symmetric
            Self::Aes256Ctr | Self::Aes192Ctr | Self::Aes128Ctr => {
                self.encrypt(cipher, key, iv, buffer)
            }
            Self::Aes256Cbc => {
                cbc_decrypt(state::<cbc::Decryptor<aes::Aes256>>(cipher, key, iv)?, buffer)
            }
            Self::Aes192Cbc => {
                cbc_decrypt(state::<cbc::Decryptor<aes::Aes192>>(cipher, key, iv)?, buffer)
            }
            Self::Aes128Cbc => {
                cbc_decrypt(state::<cbc::Decryptor<aes::Aes128>>(cipher, key, iv)?, buffer)
            }
            Self::TDesCbc => {
                cbc_decrypt(state::<cbc::Decryptor<des::TdesEde3>>(cipher, key, iv)?, buffer)
            }
            Self::None => Ok(()),
        }
    }

    /// The cipher block size, `8` for [`Cipher::None`].
    pub fn block_size(&self) -> usize {
        match self {
            Self::None | Self::TDesCbc => 8,
            Self::Aes128Cbc
            | Self::Aes192Cbc
            | Self::Aes256Cbc
            | Self::Aes128Ctr
            | Self::Aes192Ctr
            | Self::Aes256Ctr => 16,
        }
    }

    /// The size of the key to derive for this cipher.
    pub fn key_size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Aes128Cbc | Self::Aes128Ctr => 16,
            Self::TDesCbc | Self::Aes192Cbc | Self::Aes192Ctr => 24,
            Self::Aes256Cbc | Self::Aes256Ctr => 32,
        }
    }

    /// The size of the initialization vector to derive for this cipher.
    pub fn iv_size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::TDesCbc => 8,
            Self::Aes128Cbc
            | Self::Aes192Cbc
            | Self::Aes256Cbc
            | Self::Aes128Ctr
            | Self::Aes192Ctr
            | Self::Aes256Ctr => 16,
        }
    }
}
