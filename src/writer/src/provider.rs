//! Source of the descriptor tree and layer content.

use async_trait::async_trait;
use boxtar_core::error::Result;
use tokio::io::AsyncRead;

use crate::descriptor::{ImageOrImageIndexDescriptor, LayerDescriptor};

/// Readable stream of a layer's compressed bytes.
pub type LayerStream = Box<dyn AsyncRead + Send + Unpin>;

/// Supplies what goes into an archive.
#[async_trait]
pub trait DescriptorProvider: Send + Sync {
    /// Canonical serialization of the descriptor tree.
    fn as_bytes(&self) -> Result<Vec<u8>>;

    /// Top-level descriptor entries, in order.
    fn descriptors(&self) -> &[ImageOrImageIndexDescriptor];

    /// Open the content of `layer`.
    ///
    /// Fails with `LookupError` when the source does not hold the digest.
    /// May be called several times for the same layer.
    async fn open_layer(&self, layer: &LayerDescriptor) -> Result<LayerStream>;
}
