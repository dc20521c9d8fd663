//! Image/index descriptor tree serialized as the archive's `manifest.json`.
//!
//! The wire format keeps image and index records side by side in one
//! struct (`Image` / `ImageIndex`, at most one set). [`ImageOrImageIndexDescriptor::kind`]
//! turns a record into a closed [`DescriptorKind`] and rejects anything else.

use std::collections::BTreeMap;
use std::fmt;

use boxtar_core::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};

/// Media types of layers that registries may refuse to redistribute.
const NON_DISTRIBUTABLE_MEDIA_TYPES: &[&str] = &[
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
    "application/vnd.oci.image.layer.nondistributable.v1.tar",
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip",
    "application/vnd.oci.image.layer.nondistributable.v1.tar+zstd",
];

/// Supported digest algorithms and their hex lengths.
const DIGEST_ALGORITHMS: &[(&str, usize)] = &[("sha256", 64)];

/// Root of the descriptor tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRefDescriptors {
    descriptors: Vec<ImageOrImageIndexDescriptor>,
}

impl ImageRefDescriptors {
    pub fn new(descriptors: Vec<ImageOrImageIndexDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Top-level entries, in order.
    pub fn descriptors(&self) -> &[ImageOrImageIndexDescriptor] {
        &self.descriptors
    }

    /// Canonical serialization written as `manifest.json`.
    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.descriptors)?)
    }

    /// Parse a previously serialized tree.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let descriptors = serde_json::from_slice(data)?;
        Ok(Self { descriptors })
    }
}

/// A top-level entry: an image or an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageOrImageIndexDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_index: Option<ImageIndexDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageDescriptor>,
}

/// Borrowed, closed view of a top-level entry.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorKind<'a> {
    Image(&'a ImageDescriptor),
    Index(&'a ImageIndexDescriptor),
}

impl ImageOrImageIndexDescriptor {
    pub fn from_image(image: ImageDescriptor) -> Self {
        Self {
            image: Some(image),
            image_index: None,
        }
    }

    pub fn from_index(index: ImageIndexDescriptor) -> Self {
        Self {
            image: None,
            image_index: Some(index),
        }
    }

    /// Which variant this record holds.
    ///
    /// A record with neither or both variants set is malformed.
    pub fn kind(&self) -> Result<DescriptorKind<'_>> {
        match (&self.image, &self.image_index) {
            (Some(image), None) => Ok(DescriptorKind::Image(image)),
            (None, Some(index)) => Ok(DescriptorKind::Index(index)),
            (None, None) => Err(ArchiveError::FormatError(
                "Unknown descriptor: neither image nor image index".to_string(),
            )),
            (Some(_), Some(_)) => Err(ArchiveError::FormatError(
                "Ambiguous descriptor: both image and image index set".to_string(),
            )),
        }
    }
}

/// An image index and everything it references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageIndexDescriptor {
    #[serde(default)]
    pub refs: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageDescriptor>,
    #[serde(default)]
    pub indexes: Vec<ImageIndexDescriptor>,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub digest: String,
    /// Raw index JSON
    #[serde(default)]
    pub raw: String,
}

/// A single-platform image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageDescriptor {
    #[serde(default)]
    pub refs: Vec<String>,
    #[serde(default)]
    pub config: ConfigDescriptor,
    #[serde(default)]
    pub manifest: ManifestDescriptor,
    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,
}

/// Image configuration blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigDescriptor {
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub raw: String,
}

/// Image manifest blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestDescriptor {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub raw: String,
}

/// A compressed, content-addressed layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerDescriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default, rename = "DiffID")]
    pub diff_id: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl LayerDescriptor {
    pub fn new(digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
            digest: digest.into(),
            size,
            ..Default::default()
        }
    }

    /// Whether registries are expected to redistribute this layer.
    pub fn is_distributable(&self) -> bool {
        !NON_DISTRIBUTABLE_MEDIA_TYPES.contains(&self.media_type.as_str())
    }

    /// Parsed digest of this layer.
    pub fn parsed_digest(&self) -> Result<Digest> {
        Digest::parse(&self.digest)
    }
}

/// A parsed `algorithm:hex` content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Parse an `algorithm:hex` string.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            ArchiveError::FormatError(format!("Invalid digest '{}': {}", value, reason))
        };

        let (algorithm, hex) = value
            .split_once(':')
            .ok_or_else(|| invalid("expected algorithm:hex"))?;

        if hex.contains(':') {
            return Err(invalid("expected exactly one ':'"));
        }

        let hex_len = DIGEST_ALGORITHMS
            .iter()
            .find(|(name, _)| *name == algorithm)
            .map(|(_, len)| *len)
            .ok_or_else(|| invalid("unsupported algorithm"))?;

        if hex.len() != hex_len {
            return Err(invalid(&format!(
                "expected {} hex characters, found {}",
                hex_len,
                hex.len()
            )));
        }
        if !hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(invalid("found non-hex character"));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Archive entry name: `<algorithm>-<hex>.tar.gz`.
    pub fn archive_name(&self) -> String {
        format!("{}-{}.tar.gz", self.algorithm, self.hex)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}
