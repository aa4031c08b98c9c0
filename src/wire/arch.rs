//! Data types of the SSH wire format, see [RFC4251 §5](https://datatracker.ietf.org/doc/html/rfc4251#section-5).

use std::{
    io::{Read, Seek, Write},
    ops::Deref,
};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};

/// A `string` as defined in the SSH protocol, an arbitrary length binary blob
/// prefixed with its `uint32` length.
#[binrw]
#[brw(big)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bytes {
    #[br(temp)]
    #[bw(calc = inner.len() as u32)]
    len: u32,

    #[br(count = len as usize)]
    inner: Vec<u8>,
}

impl Bytes {
    /// Convert the blob into its inner bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.inner
    }

    /// Interpret the blob as UTF-8, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner).into_owned()
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(inner: Vec<u8>) -> Self {
        Self { inner }
    }
}

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        value.to_vec().into()
    }
}

impl From<&str> for Bytes {
    fn from(value: &str) -> Self {
        value.as_bytes().into()
    }
}

impl From<String> for Bytes {
    fn from(value: String) -> Self {
        value.into_bytes().into()
    }
}

/// A `name-list` as defined in the SSH protocol,
/// a comma-separated list of ASCII names in a `string`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NameList(Vec<String>);

impl NameList {
    /// Create a [`NameList`] from an iterator of names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(names.into_iter().map(|s| s.as_ref().to_owned()).collect())
    }

    /// Parse the contents of a `name-list`, without its length prefix.
    pub fn parse(bytes: &[u8]) -> Result<Self, &'static str> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }

        bytes
            .split(|byte| *byte == b',')
            .map(|name| {
                if name.is_empty() {
                    Err("empty name in name-list")
                } else if !name.iter().all(u8::is_ascii_graphic) {
                    Err("non-printable character in name-list")
                } else {
                    Ok(String::from_utf8_lossy(name).into_owned())
                }
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    /// Iterate over the names, in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The most preferred name of the list.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Whether the list contains the `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first name of this list that also appears anywhere in `other`.
    pub fn preferred_in(&self, other: &NameList) -> Option<&str> {
        self.iter().find(|name| other.contains(name))
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.join(",").into_bytes()
    }
}

impl<S: AsRef<str>> FromIterator<S> for NameList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl BinRead for NameList {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let bytes = Bytes::read_options(reader, endian, args)?;

        Self::parse(&bytes).map_err(|message| binrw::Error::AssertFail {
            pos,
            message: message.into(),
        })
    }
}

impl BinWrite for NameList {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        Bytes::from(self.to_bytes()).write_options(writer, endian, args)
    }
}

/// Encode an unsigned big-endian integer as the contents of an `mpint`:
/// leading zeroes stripped and a zero byte prepended when the high bit is set.
pub fn mpint(unsigned: &[u8]) -> Vec<u8> {
    let start = unsigned
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(unsigned.len());
    let digits = &unsigned[start..];

    let mut encoded = Vec::with_capacity(digits.len() + 1);
    if digits.first().is_some_and(|byte| byte & 0x80 != 0) {
        encoded.push(0);
    }
    encoded.extend_from_slice(digits);

    encoded
}

/// Decode the contents of a non-negative `mpint` into unsigned big-endian bytes,
/// returning `None` for negative values.
pub fn mpint_unsigned(encoded: &[u8]) -> Option<&[u8]> {
    match encoded.first() {
        Some(byte) if byte & 0x80 != 0 => None,
        Some(&0) => Some(&encoded[1..]),
        _ => Some(encoded),
    }
}
