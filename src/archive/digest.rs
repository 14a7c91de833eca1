use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use digest::DynDigest;
use snafu::ResultExt;
use std::str::FromStr;

use strum_macros::Display as EnumDisplay;

use crate::archive::consts::BUF_SIZE;
use crate::archive::error::*;

/// The digest algorithms that appear in package manifests
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, EnumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha512,
}

/// A lowercase hex encoded digest
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct HexDigest(String);

/// A writer that calculates one digest per algorithm of everything that passes through it
pub struct MultiDigestWriter<W: Write> {
    digests: Vec<(DigestAlgorithm, Box<dyn DynDigest>)>,
    inner: W,
}

/// Calculates the digest of the file at `path`, reading it in fixed-size chunks
pub fn digest_file<P: AsRef<Path>>(path: P, algorithm: DigestAlgorithm) -> Result<HexDigest> {
    let path = path.as_ref();
    let mut reader = File::open(path).context(IoReadSnafu { path })?;
    let mut digest = algorithm.new_digest();
    let mut buf = vec![0; BUF_SIZE];

    loop {
        let read = reader.read(&mut buf).context(IoReadSnafu { path })?;
        if read == 0 {
            break;
        }
        digest.update(&buf[..read]);
    }

    Ok(HexDigest::from_bytes(&digest.finalize()))
}

/// Calculates one digest per algorithm in a single read of the file at `path`
pub fn digest_file_multi<P: AsRef<Path>>(
    path: P,
    algorithms: &[DigestAlgorithm],
) -> Result<HashMap<DigestAlgorithm, HexDigest>> {
    let path = path.as_ref();
    let mut reader = File::open(path).context(IoReadSnafu { path })?;
    let mut writer = MultiDigestWriter::new(algorithms, io::sink());
    io::copy(&mut reader, &mut writer).context(IoReadSnafu { path })?;
    Ok(writer.finalize_hex())
}

impl DigestAlgorithm {
    /// The number of hex characters in a digest produced by this algorithm
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    /// Infers the algorithm that produced a hex digest of the given length
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(DigestAlgorithm::Md5),
            128 => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn new_digest(&self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Md5 => Box::new(md5::Md5::default()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(strum::ParseError::VariantNotFound),
        }
    }
}

impl TryFrom<&str> for DigestAlgorithm {
    type Error = Error;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        value
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| Error::UnsupportedAlgorithm {
                value: value.into(),
            })
    }
}

impl HexDigest {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for HexDigest {
    fn from(value: &str) -> Self {
        Self(value.to_ascii_lowercase())
    }
}

impl From<String> for HexDigest {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl Display for HexDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<W: Write> MultiDigestWriter<W> {
    pub fn new(algorithms: &[DigestAlgorithm], inner: W) -> Self {
        Self {
            digests: algorithms.iter().map(|a| (*a, a.new_digest())).collect(),
            inner,
        }
    }

    /// Consumes the writer and returns the hex digest of everything written, keyed by algorithm
    pub fn finalize_hex(self) -> HashMap<DigestAlgorithm, HexDigest> {
        self.digests
            .into_iter()
            .map(|(algorithm, digest)| (algorithm, HexDigest::from_bytes(&digest.finalize())))
            .collect()
    }
}

impl<W: Write> Write for MultiDigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        for (_, digest) in &mut self.digests {
            digest.update(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
