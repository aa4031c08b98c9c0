use std::{
    collections::VecDeque,
    io::{self, Read, Write},
};

use libflate::{
    non_blocking,
    zlib::{EncodeOptions, Encoder, FlushMode},
};
use strum::{AsRefStr, EnumString};

use crate::{error::FramingError, Result};

/// The compression context of one direction, carried over from packet to packet.
#[derive(Debug)]
pub(crate) enum CompressState {
    Deflate(Encoder<Vec<u8>>),
    Inflate(non_blocking::zlib::Decoder<Pending>),
}

/// Compressed bytes received so far and not yet inflated,
/// running dry until the next packet arrives.
#[derive(Debug, Default)]
pub(crate) struct Pending(VecDeque<u8>);

impl Read for Pending {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0.is_empty() && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        self.0.read(buf)
    }
}

/// SSH compression algorithms.
///
/// The zlib context spans every packet of a direction, each packet ending on a sync flush.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Compress {
    /// zlib compression.
    Zlib,

    /// No compression algorithm.
    #[default]
    None,
}

impl Compress {
    /// Decompress `buf` in the `state` context, refusing to inflate it past `limit` bytes.
    pub(crate) fn decompress(
        &self,
        state: &mut Option<CompressState>,
        buf: Vec<u8>,
        limit: usize,
    ) -> Result<Vec<u8>> {
        match self {
            Self::Zlib => {
                let state = state.get_or_insert_with(|| {
                    CompressState::Inflate(non_blocking::zlib::Decoder::new(Pending::default()))
                });
                let CompressState::Inflate(decoder) = state else {
                    return Err(FramingError::Compression.into());
                };

                decoder.as_inner_mut().0.extend(buf);

                let mut buffer = Vec::new();
                let mut chunk = [0; 4096];
                loop {
                    match decoder.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(size) => buffer.extend_from_slice(&chunk[..size]),
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                        Err(_) => return Err(FramingError::Compression.into()),
                    }

                    if buffer.len() > limit {
                        tracing::debug!("Refusing to inflate a payload past {limit} bytes");

                        return Err(FramingError::Compression.into());
                    }
                }

                Ok(buffer)
            }
            Self::None => Ok(buf),
        }
    }

    /// Compress `buf` in the `state` context, ending on a sync flush.
    pub(crate) fn compress(
        &self,
        state: &mut Option<CompressState>,
        buf: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            Self::Zlib => {
                if state.is_none() {
                    let encoder = Encoder::with_options(
                        Vec::new(),
                        EncodeOptions::new().flush_mode(FlushMode::Sync),
                    )
                    .map_err(|_| FramingError::Compression)?;

                    *state = Some(CompressState::Deflate(encoder));
                }
                let Some(CompressState::Deflate(encoder)) = state else {
                    return Err(FramingError::Compression.into());
                };

                encoder
                    .write_all(buf)
                    .and_then(|_| encoder.flush())
                    .map_err(|_| FramingError::Compression)?;

                Ok(std::mem::take(encoder.as_inner_mut()))
            }
            Self::None => Ok(buf.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn zlib_shrinks_repetitive_payloads() -> Result<()> {
        let (mut tx, mut rx) = (None, None);
        let payload = vec![b'a'; 4096];

        let compressed = Compress::Zlib.compress(&mut tx, &payload)?;
        assert!(compressed.len() < payload.len());
        assert_eq!(
            Compress::Zlib.decompress(&mut rx, compressed, 35000)?,
            payload
        );

        Ok(())
    }

    #[test]
    fn zlib_context_spans_packets() -> Result<()> {
        let (mut tx, mut rx) = (None, None);
        let payload = b"\x5e\x00\x00\x00\x00the very same channel data, over and over".to_vec();

        let first = Compress::Zlib.compress(&mut tx, &payload)?;
        let second = Compress::Zlib.compress(&mut tx, &payload)?;

        assert!(first.starts_with(&[0x78]));
        assert!(first.ends_with(&[0, 0, 0xff, 0xff]));
        assert!(second.ends_with(&[0, 0, 0xff, 0xff]));

        assert_eq!(Compress::Zlib.decompress(&mut rx, first, 35000)?, payload);
        assert_eq!(Compress::Zlib.decompress(&mut rx, second.clone(), 35000)?, payload);

        // The zlib header only comes with the first packet of the stream.
        assert!(Compress::Zlib
            .decompress(&mut None, second, 35000)
            .map_or(true, |inflated| inflated != payload));

        Ok(())
    }

    #[test]
    fn zlib_bombs_are_refused() -> Result<()> {
        let compressed = Compress::Zlib.compress(&mut None, &vec![0; 64 * 1024])?;

        assert!(matches!(
            Compress::Zlib.decompress(&mut None, compressed, 35000),
            Err(Error::Framing(FramingError::Compression))
        ));

        Ok(())
    }

    #[test]
    fn garbage_is_refused() {
        assert!(matches!(
            Compress::Zlib.decompress(&mut None, b"definitely not zlib".to_vec(), 35000),
            Err(Error::Framing(FramingError::Compression))
        ));
    }
}
