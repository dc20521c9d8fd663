//! OCI image layout as an archive source.
//!
//! Reads an OCI image layout directory (`oci-layout`, `index.json`,
//! `blobs/<algorithm>/<hex>`) into a descriptor tree and serves layer blobs
//! straight from disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use boxtar_core::error::{ArchiveError, Result};
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest};

use crate::descriptor::{
    ConfigDescriptor, Digest, ImageDescriptor, ImageIndexDescriptor, ImageOrImageIndexDescriptor,
    ImageRefDescriptors, LayerDescriptor, ManifestDescriptor,
};
use crate::provider::{DescriptorProvider, LayerStream};

const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

const INDEX_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
];

const MANIFEST_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v2+json",
];

/// Descriptor provider backed by an OCI image layout on disk.
#[derive(Debug)]
pub struct OciLayoutProvider {
    root_dir: PathBuf,
    descriptors: ImageRefDescriptors,
}

impl OciLayoutProvider {
    /// Load the layout rooted at `path`.
    ///
    /// Every entry of `index.json` becomes a top-level image or index;
    /// nested indexes are followed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let root_dir = path.as_ref().to_path_buf();
        validate_oci_layout(&root_dir)?;

        let index_path = root_dir.join("index.json");
        let content = std::fs::read_to_string(&index_path).map_err(|e| ArchiveError::OpenError {
            target: index_path.display().to_string(),
            message: e.to_string(),
        })?;
        let index: ImageIndex = serde_json::from_str(&content)
            .map_err(|e| ArchiveError::FormatError(format!("Failed to parse index.json: {}", e)))?;

        let mut nodes = Vec::new();
        for descriptor in index.manifests() {
            let node = match kind_of(descriptor)? {
                BlobKind::Index => {
                    ImageOrImageIndexDescriptor::from_index(load_index(&root_dir, descriptor)?)
                }
                BlobKind::Manifest => {
                    ImageOrImageIndexDescriptor::from_image(load_image(&root_dir, descriptor)?)
                }
            };
            nodes.push(node);
        }

        tracing::debug!(
            layout = %root_dir.display(),
            entries = nodes.len(),
            "Loaded OCI image layout"
        );

        Ok(Self {
            root_dir,
            descriptors: ImageRefDescriptors::new(nodes),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn image_refs(&self) -> &ImageRefDescriptors {
        &self.descriptors
    }
}

#[async_trait]
impl DescriptorProvider for OciLayoutProvider {
    fn as_bytes(&self) -> Result<Vec<u8>> {
        self.descriptors.as_bytes()
    }

    fn descriptors(&self) -> &[ImageOrImageIndexDescriptor] {
        self.descriptors.descriptors()
    }

    async fn open_layer(&self, layer: &LayerDescriptor) -> Result<LayerStream> {
        let digest = layer.parsed_digest()?;
        let path = blob_path(&self.root_dir, &digest);

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArchiveError::LookupError {
                digest: layer.digest.clone(),
            }),
            Err(e) => Err(ArchiveError::OpenError {
                target: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

enum BlobKind {
    Index,
    Manifest,
}

fn kind_of(descriptor: &Descriptor) -> Result<BlobKind> {
    let media_type = descriptor.media_type().to_string();
    if INDEX_MEDIA_TYPES.contains(&media_type.as_str()) {
        Ok(BlobKind::Index)
    } else if MANIFEST_MEDIA_TYPES.contains(&media_type.as_str()) {
        Ok(BlobKind::Manifest)
    } else {
        Err(ArchiveError::FormatError(format!(
            "Unsupported media type '{}' for {}",
            media_type,
            descriptor.digest()
        )))
    }
}

fn load_index(root_dir: &Path, descriptor: &Descriptor) -> Result<ImageIndexDescriptor> {
    let digest = descriptor.digest().to_string();
    let raw = read_blob(root_dir, &digest)?;
    let index: ImageIndex = serde_json::from_str(&raw).map_err(|e| {
        ArchiveError::FormatError(format!("Failed to parse image index {}: {}", digest, e))
    })?;

    let mut images = Vec::new();
    let mut indexes = Vec::new();
    for child in index.manifests() {
        match kind_of(child)? {
            BlobKind::Index => indexes.push(load_index(root_dir, child)?),
            BlobKind::Manifest => images.push(load_image(root_dir, child)?),
        }
    }

    Ok(ImageIndexDescriptor {
        refs: refs_of(descriptor),
        images,
        indexes,
        media_type: descriptor.media_type().to_string(),
        digest,
        raw,
    })
}

fn load_image(root_dir: &Path, descriptor: &Descriptor) -> Result<ImageDescriptor> {
    let digest = descriptor.digest().to_string();
    let raw = read_blob(root_dir, &digest)?;
    let manifest: ImageManifest = serde_json::from_str(&raw).map_err(|e| {
        ArchiveError::FormatError(format!("Failed to parse manifest {}: {}", digest, e))
    })?;

    let config_digest = manifest.config().digest().to_string();
    let config_raw = read_blob(root_dir, &config_digest)?;
    let diff_ids = diff_ids_of(&config_raw);

    let layers = manifest
        .layers()
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            Ok(LayerDescriptor {
                media_type: layer.media_type().to_string(),
                digest: layer.digest().to_string(),
                diff_id: diff_ids.get(i).cloned().unwrap_or_default(),
                size: descriptor_size(layer)?,
                annotations: layer
                    .annotations()
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ImageDescriptor {
        refs: refs_of(descriptor),
        config: ConfigDescriptor {
            digest: config_digest,
            raw: config_raw,
        },
        manifest: ManifestDescriptor {
            media_type: descriptor.media_type().to_string(),
            digest,
            raw,
        },
        layers,
    })
}

fn descriptor_size(descriptor: &Descriptor) -> Result<u64> {
    u64::try_from(descriptor.size()).map_err(|_| {
        ArchiveError::FormatError(format!("Invalid size for {}", descriptor.digest()))
    })
}

fn refs_of(descriptor: &Descriptor) -> Vec<String> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|annotations| annotations.get(REF_NAME_ANNOTATION))
        .map(|name| vec![name.clone()])
        .unwrap_or_default()
}

/// `rootfs.diff_ids` of an image configuration, empty if absent.
fn diff_ids_of(config_raw: &str) -> Vec<String> {
    serde_json::from_str::<serde_json::Value>(config_raw)
        .ok()
        .and_then(|config| {
            config["rootfs"]["diff_ids"].as_array().map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
        })
        .unwrap_or_default()
}

fn read_blob(root_dir: &Path, digest: &str) -> Result<String> {
    let path = blob_path(root_dir, &Digest::parse(digest)?);
    std::fs::read_to_string(&path).map_err(|e| ArchiveError::OpenError {
        target: path.display().to_string(),
        message: e.to_string(),
    })
}

fn blob_path(root_dir: &Path, digest: &Digest) -> PathBuf {
    root_dir
        .join("blobs")
        .join(digest.algorithm())
        .join(digest.hex())
}

/// Validate that the directory contains an OCI layout.
fn validate_oci_layout(root_dir: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json", "blobs"] {
        if !root_dir.join(required).exists() {
            return Err(ArchiveError::OpenError {
                target: root_dir.display().to_string(),
                message: format!("Not a valid OCI layout: missing {}", required),
            });
        }
    }
    Ok(())
}
