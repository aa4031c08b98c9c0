use digest::{KeyInit, Mac, OutputSizeUser};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use strum::{AsRefStr, EnumString};

use crate::{error::FramingError, Error, Result};

/// SSH hmac algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Hmac {
    /// HMAC with sha-2-512 digest.
    #[strum(serialize = "hmac-sha2-512")]
    HmacSha512,

    /// HMAC with sha-2-256 digest.
    #[strum(serialize = "hmac-sha2-256")]
    HmacSha256,

    /// HMAC with sha-1 digest.
    HmacSha1,

    /// HMAC with sha-1 digest, truncated to 96 bits.
    #[strum(serialize = "hmac-sha1-96")]
    HmacSha196,

    /// HMAC with md5 digest.
    HmacMd5,

    /// HMAC with md5 digest, truncated to 96 bits.
    #[strum(serialize = "hmac-md5-96")]
    HmacMd596,

    /// No HMAC algorithm.
    #[default]
    None,
}

fn mac<D: Mac + KeyInit>(seq: u32, buf: &[u8], key: &[u8]) -> Result<D> {
    Ok(<D as Mac>::new_from_slice(key)
        .map_err(|_| Error::Cipher)?
        .chain_update(seq.to_be_bytes())
        .chain_update(buf))
}

impl Hmac {
    /// Compute the MAC of `seq || buf`.
    pub(crate) fn sign(&self, seq: u32, buf: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        fn sign<D: Mac + KeyInit>(seq: u32, buf: &[u8], key: &[u8]) -> Result<Vec<u8>> {
            Ok(mac::<D>(seq, buf, key)?.finalize().into_bytes().to_vec())
        }

        let mut tag = match self {
            Self::HmacSha512 => sign::<hmac::Hmac<Sha512>>(seq, buf, key),
            Self::HmacSha256 => sign::<hmac::Hmac<Sha256>>(seq, buf, key),
            Self::HmacSha1 | Self::HmacSha196 => sign::<hmac::Hmac<Sha1>>(seq, buf, key),
            Self::HmacMd5 | Self::HmacMd596 => sign::<hmac::Hmac<Md5>>(seq, buf, key),
            Self::None => Ok(Vec::new()),
        }?;
        tag.truncate(self.size());

        Ok(tag)
    }

    /// Verify the MAC of `seq || buf` against `tag`, in constant time.
    pub(crate) fn verify(&self, seq: u32, buf: &[u8], key: &[u8], tag: &[u8]) -> Result<()> {
        fn verify<D: Mac + KeyInit>(
            seq: u32,
            buf: &[u8],
            key: &[u8],
            tag: &[u8],
            truncated: bool,
        ) -> Result<()> {
            let mac = mac::<D>(seq, buf, key)?;

            let verified = if truncated {
                mac.verify_truncated_left(tag)
            } else {
                mac.verify_slice(tag)
            };

            verified.map_err(|_| FramingError::MacMismatch.into())
        }

        match self {
            Self::HmacSha512 => verify::<hmac::Hmac<Sha512>>(seq, buf, key, tag, false),
            Self::HmacSha256 => verify::<hmac::Hmac<Sha256>>(seq, buf, key, tag, false),
            Self::HmacSha1 => verify::<hmac::Hmac<Sha1>>(seq, buf, key, tag, false),
            Self::HmacSha196 => verify::<hmac::Hmac<Sha1>>(seq, buf, key, tag, true),
            Self::HmacMd5 => verify::<hmac::Hmac<Md5>>(seq, buf, key, tag, false),
            Self::HmacMd596 => verify::<hmac::Hmac<Md5>>(seq, buf, key, tag, true),
            Self::None if tag.is_empty() => Ok(()),
            Self::None => Err(FramingError::MacMismatch.into()),
        }
    }

    /// The size of the MAC appended to each packet.
    pub fn size(&self) -> usize {
        match self {
            Self::HmacSha196 | Self::HmacMd596 => 12,
            _ => self.key_size(),
        }
    }

    /// The size of the key to derive for this MAC, its digest size.
    pub fn key_size(&self) -> usize {
        match self {
            Self::HmacSha512 => Sha512::output_size(),
            Self::HmacSha256 => Sha256::output_size(),
            Self::HmacSha1 | Self::HmacSha196 => Sha1::output_size(),
            Self::HmacMd5 | Self::HmacMd596 => Md5::output_size(),
            Self::None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Hmac::HmacSha512, 64)]
    #[case(Hmac::HmacSha256, 32)]
    #[case(Hmac::HmacSha1, 20)]
    #[case(Hmac::HmacSha196, 12)]
    #[case(Hmac::HmacMd5, 16)]
    #[case(Hmac::HmacMd596, 12)]
    fn sign_then_verify(#[case] hmac: Hmac, #[case] size: usize) -> Result<()> {
        let key = vec![0x0b; hmac.key_size()];
        let tag = hmac.sign(3, b"payload", &key)?;

        assert_eq!(tag.len(), size);
        hmac.verify(3, b"payload", &key, &tag)?;

        assert!(matches!(
            hmac.verify(4, b"payload", &key, &tag),
            Err(Error::Framing(FramingError::MacMismatch))
        ));
        assert!(matches!(
            hmac.verify(3, b"paylaod", &key, &tag),
            Err(Error::Framing(FramingError::MacMismatch))
        ));

        Ok(())
    }

    #[test]
    fn truncated_tags_are_the_leftmost_bytes() -> Result<()> {
        let key = [0x0b; 20];

        let full = Hmac::HmacSha1.sign(0, b"data", &key)?;
        let truncated = Hmac::HmacSha196.sign(0, b"data", &key)?;

        assert_eq!(&full[..12], &truncated[..]);

        Ok(())
    }

    #[test]
    fn names() {
        assert_eq!("hmac-sha2-512".parse(), Ok(Hmac::HmacSha512));
        assert_eq!("hmac-md5-96".parse(), Ok(Hmac::HmacMd596));
        assert_eq!(Hmac::HmacSha1.as_ref(), "hmac-sha1");
        assert_eq!(Hmac::HmacMd5.as_ref(), "hmac-md5");
    }
}
