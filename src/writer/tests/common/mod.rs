//! Shared fixtures for archive writer tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use boxtar_core::error::{ArchiveError, Result};
use boxtar_core::progress::ProgressLogger;
use boxtar_writer::{
    DescriptorKind, DescriptorProvider, ImageDescriptor, ImageIndexDescriptor,
    ImageOrImageIndexDescriptor, ImageRefDescriptors, LayerDescriptor, LayerStream,
    MemoryDestination, MANIFEST_ENTRY,
};
use parking_lot::Mutex;

/// In-memory descriptor provider.
///
/// Every layer in the tree gets deterministic content of its declared size.
/// Opens are recorded, together with the length of an observed destination
/// at the time of each open.
pub struct StaticProvider {
    refs: ImageRefDescriptors,
    blobs: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    observed: Option<MemoryDestination>,
    opens: Mutex<Vec<String>>,
    observed_lens: Mutex<Vec<usize>>,
}

impl StaticProvider {
    pub fn new(nodes: Vec<ImageOrImageIndexDescriptor>) -> Self {
        let mut blobs = HashMap::new();
        for node in &nodes {
            for layer in layers_of(node) {
                blobs.insert(layer.digest.clone(), blob(&layer.digest, layer.size));
            }
        }

        Self {
            refs: ImageRefDescriptors::new(nodes),
            blobs,
            failing: HashSet::new(),
            observed: None,
            opens: Mutex::new(Vec::new()),
            observed_lens: Mutex::new(Vec::new()),
        }
    }

    /// Opening `digest` fails with a transient I/O error.
    pub fn failing(mut self, digest: &str) -> Self {
        self.failing.insert(digest.to_string());
        self
    }

    /// Opening `digest` fails with `LookupError`.
    pub fn without_blob(mut self, digest: &str) -> Self {
        self.blobs.remove(digest);
        self
    }

    /// Replace the content served for `digest`.
    pub fn with_blob(mut self, digest: &str, content: Vec<u8>) -> Self {
        self.blobs.insert(digest.to_string(), content);
        self
    }

    /// Record the length of `destination` whenever a layer is opened.
    pub fn observing(mut self, destination: &MemoryDestination) -> Self {
        self.observed = Some(destination.clone());
        self
    }

    pub fn blob(&self, digest: &str) -> Vec<u8> {
        self.blobs.get(digest).cloned().unwrap_or_default()
    }

    pub fn opens(&self) -> Vec<String> {
        self.opens.lock().clone()
    }

    pub fn open_count(&self, digest: &str) -> usize {
        self.opens.lock().iter().filter(|d| *d == digest).count()
    }

    pub fn observed_lens(&self) -> Vec<usize> {
        self.observed_lens.lock().clone()
    }
}

#[async_trait]
impl DescriptorProvider for StaticProvider {
    fn as_bytes(&self) -> Result<Vec<u8>> {
        self.refs.as_bytes()
    }

    fn descriptors(&self) -> &[ImageOrImageIndexDescriptor] {
        self.refs.descriptors()
    }

    async fn open_layer(&self, layer: &LayerDescriptor) -> Result<LayerStream> {
        self.opens.lock().push(layer.digest.clone());
        if let Some(destination) = &self.observed {
            self.observed_lens.lock().push(destination.contents().len());
        }

        if self.failing.contains(&layer.digest) {
            return Err(ArchiveError::IoError(std::io::Error::other(format!(
                "connection reset while reading {}",
                layer.digest
            ))));
        }

        let content = self
            .blobs
            .get(&layer.digest)
            .cloned()
            .ok_or_else(|| ArchiveError::LookupError {
                digest: layer.digest.clone(),
            })?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }
}

/// Records every progress notification.
#[derive(Default)]
pub struct RecordingProgress {
    done: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn done(&self) -> Vec<String> {
        self.done.lock().clone()
    }
}

impl ProgressLogger for RecordingProgress {
    fn report_done(&self, name: &str, _elapsed: Duration) {
        self.done.lock().push(name.to_string());
    }
}

/// Deterministic content for a layer.
pub fn blob(digest: &str, size: u64) -> Vec<u8> {
    let seed = digest.bytes().fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    (0..size)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect()
}

pub fn layer(digest: &str, size: u64) -> LayerDescriptor {
    LayerDescriptor::new(digest, size)
}

pub fn image(name: &str, layers: Vec<LayerDescriptor>) -> ImageOrImageIndexDescriptor {
    ImageOrImageIndexDescriptor::from_image(image_descriptor(name, layers))
}

pub fn image_descriptor(name: &str, layers: Vec<LayerDescriptor>) -> ImageDescriptor {
    let mut image = ImageDescriptor {
        refs: vec![name.to_string()],
        layers,
        ..Default::default()
    };
    image.manifest.media_type = "application/vnd.oci.image.manifest.v1+json".to_string();
    image.manifest.raw = format!("{{\"name\":\"{name}\"}}");
    image
}

pub fn index(name: &str, images: Vec<ImageDescriptor>) -> ImageOrImageIndexDescriptor {
    ImageOrImageIndexDescriptor::from_index(ImageIndexDescriptor {
        refs: vec![name.to_string()],
        images,
        media_type: "application/vnd.oci.image.index.v1+json".to_string(),
        ..Default::default()
    })
}

/// Layers of `node`, in traversal order.
pub fn layers_of(node: &ImageOrImageIndexDescriptor) -> Vec<LayerDescriptor> {
    fn walk_index(index: &ImageIndexDescriptor, out: &mut Vec<LayerDescriptor>) {
        for nested in &index.indexes {
            walk_index(nested, out);
        }
        for image in &index.images {
            out.extend(image.layers.iter().cloned());
        }
    }

    let mut out = Vec::new();
    match node.kind() {
        Ok(DescriptorKind::Image(image)) => out.extend(image.layers.iter().cloned()),
        Ok(DescriptorKind::Index(index)) => walk_index(index, &mut out),
        Err(_) => {}
    }
    out
}

/// Entry names and contents of a tar archive.
pub fn read_archive(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (name, content)
        })
        .collect()
}

pub fn names(entries: &[(String, Vec<u8>)]) -> Vec<String> {
    entries.iter().map(|(name, _)| name.clone()).collect()
}

/// Archive entry name of a layer digest.
pub fn entry_name(digest: &str) -> String {
    format!("{}.tar.gz", digest.replacen(':', "-", 1))
}

/// `manifest.json` followed by the entry names of `digests`.
pub fn archive_names(digests: &[&str]) -> Vec<String> {
    std::iter::once(MANIFEST_ENTRY.to_string())
        .chain(digests.iter().map(|digest| entry_name(digest)))
        .collect()
}
