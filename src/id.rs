//! The identification string exchanged before any binary packet,
//! see [RFC4253 §4.2](https://datatracker.ietf.org/doc/html/rfc4253#section-4.2).

use std::fmt;

use futures::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{FormatError, HandshakeError},
    Error, Result,
};

/// The only protocol version this crate speaks.
pub const PROTO_VERSION: &str = "2.0";

/// Maximum length of the identification line, CR LF included.
pub const MAX_LENGTH: usize = 255;

/// Maximum amount of lines a server may send before its identification line.
const MAX_PREAMBLE_LINES: usize = 16;

/// An identification string, `SSH-<proto>-<software>[ <comments>]\r\n` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    proto: String,
    software: String,
    comments: Option<String>,
}

impl Id {
    /// Build an identification string for protocol version `2.0`.
    pub fn v2(software: impl Into<String>, comments: Option<&str>) -> Result<Self, FormatError> {
        Self::new(PROTO_VERSION, software, comments)
    }

    /// Build this crate's own identification string for the `side`.
    pub(crate) fn local(side: &str) -> Self {
        Self {
            proto: PROTO_VERSION.into(),
            software: format!("{}@{side}:{}", env!("CARGO_CRATE_NAME"), env!("CARGO_PKG_VERSION")),
            comments: None,
        }
    }

    /// Build an identification string, checking that it would serialize to a valid line.
    pub fn new(
        proto: impl Into<String>,
        software: impl Into<String>,
        comments: Option<&str>,
    ) -> Result<Self, FormatError> {
        let id = Self {
            proto: proto.into(),
            software: software.into(),
            comments: comments.map(Into::into),
        };

        id.check()?;

        Ok(id)
    }

    /// Parse an identification line of any protocol version, CR LF included.
    pub fn parse(line: &[u8]) -> Result<Self, FormatError> {
        if line.len() > MAX_LENGTH {
            return Err(FormatError::TooLong);
        }
        if line.contains(&b'\0') {
            return Err(FormatError::Nul);
        }

        let body = line
            .strip_suffix(b"\r\n")
            .filter(|body| !body.iter().any(|byte| matches!(byte, b'\r' | b'\n')))
            .ok_or(FormatError::Terminator)?;
        let body = std::str::from_utf8(body).map_err(|_| FormatError::Prefix)?;

        let (proto, rest) = body
            .strip_prefix("SSH-")
            .and_then(|rest| rest.split_once('-'))
            .ok_or(FormatError::Prefix)?;
        let (software, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software, Some(comments)),
            None => (rest, None),
        };

        Self::new(proto, software, comments)
    }

    /// Parse an identification line, accepting only protocol version `2.0`.
    pub fn validate(line: &[u8]) -> Result<Self, FormatError> {
        let id = Self::parse(line)?;

        if id.proto == PROTO_VERSION {
            Ok(id)
        } else {
            Err(FormatError::Version)
        }
    }

    fn check(&self) -> Result<(), FormatError> {
        fn token(value: &str) -> bool {
            !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_graphic() && byte != b'-')
        }

        if self.to_string().contains('\0') {
            return Err(FormatError::Nul);
        }
        if !token(&self.proto) {
            return Err(FormatError::Prefix);
        }
        if !token(&self.software) {
            return Err(FormatError::SoftwareVersion);
        }
        if let Some(comments) = &self.comments {
            if comments.is_empty() || !comments.bytes().all(|byte| (0x20..=0x7e).contains(&byte)) {
                return Err(FormatError::Comments);
            }
        }
        if self.to_string().len() + 2 > MAX_LENGTH {
            return Err(FormatError::TooLong);
        }

        Ok(())
    }

    /// The protocol version.
    pub fn proto_version(&self) -> &str {
        &self.proto
    }

    /// The software version.
    pub fn software_version(&self) -> &str {
        &self.software
    }

    /// The optional comments.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// The identification line as sent on the wire, CR LF included.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }

    /// Ensure both identification strings speak the same, supported, protocol version.
    pub fn compatible(&self, peer: &Self) -> Result<(), HandshakeError> {
        if self.proto == peer.proto && peer.proto == PROTO_VERSION {
            Ok(())
        } else {
            Err(HandshakeError::VersionMismatch {
                ours: self.proto.clone(),
                theirs: peer.proto.clone(),
            })
        }
    }

    /// Read an identification line from the `reader`,
    /// skipping the lines preceding it when `preamble` is set.
    pub async fn from_async_reader<R: AsyncBufRead + Unpin>(
        reader: &mut R,
        preamble: bool,
    ) -> Result<Self> {
        for _ in 0..=MAX_PREAMBLE_LINES {
            let mut line = Vec::with_capacity(MAX_LENGTH);
            (&mut *reader)
                .take(MAX_LENGTH as u64)
                .read_until(b'\n', &mut line)
                .await?;

            if !line.ends_with(b"\n") {
                return Err(if line.len() >= MAX_LENGTH {
                    FormatError::TooLong.into()
                } else {
                    Error::Transport(std::io::ErrorKind::UnexpectedEof.into())
                });
            }

            if preamble && !line.starts_with(b"SSH-") {
                tracing::debug!(
                    "Skipping preamble line: {:?}",
                    String::from_utf8_lossy(&line).trim_end()
                );

                continue;
            }

            return Ok(Self::parse(&line)?);
        }

        Err(FormatError::Preamble.into())
    }

    /// Write the identification line to the `writer`.
    pub async fn to_async_writer<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;

        Ok(())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSH-{}-{}", self.proto, self.software)?;

        if let Some(comments) = &self.comments {
            write!(f, " {comments}")?;
        }

        Ok(())
    }
}
