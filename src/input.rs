//! Input documents and their decompression.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use clap::ValueEnum;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use xz2::read::XzDecoder;

use crate::error::{Result, ValidationError};

/// Compression of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Bzip2,
    Gzip,
    Xz,
}

impl Compression {
    /// Compression implied by a file extension, if any
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "xz" => Some(Compression::Xz),
            "bz2" | "bzip2" => Some(Compression::Bzip2),
            "gz" | "gzip" => Some(Compression::Gzip),
            _ => None,
        }
    }

    /// The extension wins over the configured default
    pub fn for_path(path: &Path, default: Compression) -> Self {
        Self::from_extension(path).unwrap_or(default)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::None => "none",
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Bytes(Vec<u8>),
    File {
        path: PathBuf,
        compression: Compression,
    },
}

/// A document to validate: its identity in the report plus where its bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub source: DocumentSource,
}

impl Document {
    pub fn from_bytes(id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            source: DocumentSource::Bytes(bytes.into()),
        }
    }

    /// A file document; the id is the path as given, compression follows the extension
    pub fn from_path(path: impl Into<PathBuf>, default_compression: Compression) -> Self {
        let path = path.into();
        let compression = Compression::for_path(&path, default_compression);
        Self {
            id: path.to_string_lossy().into_owned(),
            source: DocumentSource::File { path, compression },
        }
    }

    /// Read the whole, decompressed document
    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.source {
            DocumentSource::Bytes(bytes) => Ok(bytes.clone()),
            DocumentSource::File { path, compression } => read_file(path, *compression),
        }
    }
}

fn read_file(path: &Path, compression: Compression) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|source| ValidationError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(reader),
        Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
        Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
    };

    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|source| match compression {
            Compression::None => ValidationError::Input {
                path: path.to_path_buf(),
                source,
            },
            _ => ValidationError::Decompression {
                path: path.to_path_buf(),
                compression: compression.to_string(),
                source,
            },
        })?;
    Ok(bytes)
}
