use futures::{AsyncRead, AsyncReadExt};
use rand::RngCore;

use crate::{
    algorithm::{Cipher, CipherState, Compress, CompressState, Hmac},
    error::FramingError,
    Result,
};

use super::Keys;

/// Size of the `packet_length` field.
const LENGTH_SIZE: usize = std::mem::size_of::<u32>();

/// Minimum size of the random padding.
const MIN_PADDING: usize = 4;

/// Minimum size of a whole packet, MAC excluded.
const MIN_PACKET: usize = 16;

/// The transports of both directions, from our own point of view.
#[derive(Debug, Default)]
pub struct TransportPair {
    /// The transport of received packets.
    pub rx: Transport,

    /// The transport of sent packets.
    pub tx: Transport,
}

/// The algorithms and keys of one direction of the binary packet protocol,
/// see [RFC4253 §6](https://datatracker.ietf.org/doc/html/rfc4253#section-6).
///
/// The default transport is the unencrypted one, used up until the first `SSH_MSG_NEWKEYS`.
#[derive(Debug, Default)]
pub struct Transport {
    /// Derived key material.
    pub chain: Keys,

    /// Chaining state of the cipher, initialized on first use.
    pub(crate) state: Option<CipherState>,

    /// Compression context, initialized on first use.
    pub(crate) context: Option<CompressState>,

    /// The encryption algorithm.
    pub cipher: Cipher,

    /// The integrity algorithm.
    pub hmac: Hmac,

    /// The compression algorithm.
    pub compress: Compress,
}

impl Transport {
    /// Create a transport from its algorithms and keys.
    pub fn new(cipher: Cipher, hmac: Hmac, compress: Compress, chain: Keys) -> Self {
        Self {
            chain,
            state: None,
            context: None,
            cipher,
            hmac,
            compress,
        }
    }

    /// The alignment of packets, the cipher block size and at least 8 bytes.
    pub fn block_size(&self) -> usize {
        self.cipher.block_size().max(8)
    }

    /// The padding length for a payload of `size` bytes, so that the packet is
    /// aligned, padded with at least 4 bytes and 16 bytes long at least.
    pub fn padding(&self, size: usize) -> Result<u8> {
        let align = self.block_size();
        let unpadded = LENGTH_SIZE + 1 + size;

        let mut padding = align - unpadded % align;
        if padding < MIN_PADDING {
            padding += align;
        }
        if unpadded + padding < MIN_PACKET {
            padding += align;
        }

        u8::try_from(padding).map_err(|_| FramingError::InvalidPadding.into())
    }

    fn max_packet_length(limit: usize) -> usize {
        1 + limit + u8::MAX as usize
    }

    /// Frame the `payload` into a binary packet with the sequence number `seq`:
    /// compressed, padded, authenticated then encrypted.
    ///
    /// The `limit` applies to the uncompressed payload.
    pub fn seal(&mut self, payload: &[u8], seq: u32, limit: usize) -> Result<Vec<u8>> {
        if payload.len() > limit {
            return Err(FramingError::PacketTooLarge.into());
        }

        let payload = self.compress.compress(&mut self.context, payload)?;

        let padding = self.padding(payload.len())?;
        let packet_length = 1 + payload.len() + padding as usize;
        if packet_length > Self::max_packet_length(limit) {
            return Err(FramingError::PacketTooLarge.into());
        }

        let mut buffer = Vec::with_capacity(LENGTH_SIZE + packet_length + self.hmac.size());
        buffer.extend_from_slice(&(packet_length as u32).to_be_bytes());
        buffer.push(padding);
        buffer.extend_from_slice(&payload);

        let start = buffer.len();
        buffer.resize(start + padding as usize, 0);
        rand::thread_rng().fill_bytes(&mut buffer[start..]);

        let mac = self.hmac.sign(seq, &buffer, &self.chain.hmac)?;

        self.cipher
            .encrypt(&mut self.state, &self.chain.key, &self.chain.iv, &mut buffer)?;
        buffer.extend_from_slice(&mac);

        Ok(buffer)
    }

    /// Unframe the binary packet `raw` with the sequence number `seq`, returning its payload.
    ///
    /// The integrity is verified before any field of the packet is interpreted.
    pub fn open(&mut self, raw: &[u8], seq: u32, limit: usize) -> Result<Vec<u8>> {
        let (body, mac) = raw
            .len()
            .checked_sub(self.hmac.size())
            .map(|split| raw.split_at(split))
            .ok_or(FramingError::LengthOutOfBounds)?;

        if body.len() < MIN_PACKET || body.len() % self.block_size() != 0 {
            return Err(FramingError::LengthOutOfBounds.into());
        }

        let mut body = body.to_vec();
        self.cipher
            .decrypt(&mut self.state, &self.chain.key, &self.chain.iv, &mut body)?;

        self.unframe(body, mac, seq, limit)
    }

    /// Read a binary packet with the sequence number `seq` from the `reader`, returning its payload.
    pub async fn read<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
        seq: u32,
        limit: usize,
    ) -> Result<Vec<u8>> {
        let align = self.block_size();

        let mut body = vec![0; align];
        reader.read_exact(&mut body).await?;
        self.cipher
            .decrypt(&mut self.state, &self.chain.key, &self.chain.iv, &mut body)?;

        let packet_length = Self::packet_length(&body)?;
        if packet_length > Self::max_packet_length(limit)
            || (LENGTH_SIZE + packet_length) % align != 0
            || LENGTH_SIZE + packet_length < MIN_PACKET
        {
            return Err(FramingError::LengthOutOfBounds.into());
        }

        body.resize(LENGTH_SIZE + packet_length, 0);
        reader.read_exact(&mut body[align..]).await?;
        self.cipher.decrypt(
            &mut self.state,
            &self.chain.key,
            &self.chain.iv,
            &mut body[align..],
        )?;

        let mut mac = vec![0; self.hmac.size()];
        reader.read_exact(&mut mac).await?;

        self.unframe(body, &mac, seq, limit)
    }

    fn packet_length(body: &[u8]) -> Result<usize> {
        body.get(..LENGTH_SIZE)
            .and_then(|bytes| <[u8; LENGTH_SIZE]>::try_from(bytes).ok())
            .map(|bytes| u32::from_be_bytes(bytes) as usize)
            .ok_or_else(|| FramingError::LengthOutOfBounds.into())
    }

    fn unframe(&mut self, mut body: Vec<u8>, mac: &[u8], seq: u32, limit: usize) -> Result<Vec<u8>> {
        self.hmac.verify(seq, &body, &self.chain.hmac, mac)?;

        let packet_length = Self::packet_length(&body)?;
        if LENGTH_SIZE + packet_length != body.len() || packet_length > Self::max_packet_length(limit) {
            return Err(FramingError::LengthOutOfBounds.into());
        }

        let padding = body[LENGTH_SIZE] as usize;
        if padding < MIN_PADDING || padding + 1 > packet_length {
            return Err(FramingError::InvalidPadding.into());
        }

        body.truncate(LENGTH_SIZE + packet_length - padding);
        body.drain(..LENGTH_SIZE + 1);

        self.compress.decompress(&mut self.context, body, limit)
    }
}
