//! Archive writer.
//!
//! Writes `manifest.json` followed by one entry per distinct included layer,
//! ordered by digest. When the destination is seekable and concurrency above
//! one is configured, layer bodies are first reserved as zero-filled
//! placeholders and then filled in by parallel tasks (see [`crate::fill`]).
//! Otherwise every layer is streamed inline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use boxtar_core::config::WriterConfig;
use boxtar_core::error::{ArchiveError, Result};
use boxtar_core::progress::{ProgressLogger, TracingProgress};
use boxtar_core::throttle::Executor;
use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::descriptor::{DescriptorKind, ImageDescriptor, ImageIndexDescriptor, LayerDescriptor};
use crate::destination::{Destination, DestinationFactory, SeekableSink};
use crate::entry;
use crate::fill::{self, FillContext};
use crate::filter::{LayerFilter, NonDistributableFilter};
use crate::provider::DescriptorProvider;

/// Name of the descriptor tree entry, always first in the archive.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// A layer entry reserved as a placeholder during the sequential pass.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenLayer {
    /// Archive entry name
    pub name: String,
    /// Offset of the entry header in the destination
    pub offset: u64,
    pub layer: LayerDescriptor,
}

/// Writes image descriptors and their layers into a tar archive.
pub struct ArchiveWriter {
    provider: Arc<dyn DescriptorProvider>,
    destination: Arc<dyn DestinationFactory>,
    filter: Arc<dyn LayerFilter>,
    progress: Arc<dyn ProgressLogger>,
    config: WriterConfig,
}

impl ArchiveWriter {
    /// Create a writer.
    ///
    /// Layers are filtered with [`NonDistributableFilter`] according to
    /// `config.include_non_distributable`, and progress goes to `tracing`.
    pub fn new(
        provider: Arc<dyn DescriptorProvider>,
        destination: Arc<dyn DestinationFactory>,
        config: WriterConfig,
    ) -> Self {
        let filter = Arc::new(NonDistributableFilter::new(config.include_non_distributable));
        Self {
            provider,
            destination,
            filter,
            progress: Arc::new(TracingProgress),
            config,
        }
    }

    /// Replace the layer inclusion policy.
    pub fn with_filter(mut self, filter: Arc<dyn LayerFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the progress logger.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressLogger>) -> Self {
        self.progress = progress;
        self
    }

    /// Write the archive.
    ///
    /// Any error leaves the destination incomplete; it must be discarded.
    pub async fn write(&self) -> Result<()> {
        self.config.validate()?;

        let target = self.destination.target();
        let destination = self.destination.open().await?;
        let inflatable = destination.is_seekable() && self.config.concurrency > 1;

        debug!(
            target = %target,
            seekable = destination.is_seekable(),
            inflatable,
            "Opened archive destination"
        );

        let mut sink = Sink::new(destination);

        let manifest = self.provider.as_bytes()?;
        entry::write_entry(
            sink.writer(),
            MANIFEST_ENTRY,
            manifest.len() as u64,
            &mut &manifest[..],
        )
        .await
        .map_err(|e| ArchiveError::write(format!("Writing tar entry '{MANIFEST_ENTRY}'"), e))?;
        debug!(size = manifest.len(), "Wrote manifest entry");

        let layers = self.collect_layers().await?;
        let placeholders = self.write_layers(&mut sink, layers, inflatable).await?;

        sink.finish()
            .await
            .map_err(|e| ArchiveError::write("Finishing archive", e))?;
        debug!(placeholders = placeholders.len(), "Wrote layers sequentially");

        if inflatable {
            let executor = Executor::new(self.config.concurrency, self.config.retry.clone());
            let ctx = FillContext {
                provider: Arc::clone(&self.provider),
                destination: Arc::clone(&self.destination),
                progress: Arc::clone(&self.progress),
            };
            fill::fill_in_layers(ctx, placeholders, &executor).await?;
        }

        info!(target = %target, "Archive written");
        Ok(())
    }

    /// Walk the descriptor tree depth-first and keep the layers the filter accepts.
    async fn collect_layers(&self) -> Result<Vec<LayerDescriptor>> {
        let mut included = Vec::new();

        for node in self.provider.descriptors() {
            let mut candidates = Vec::new();
            match node.kind()? {
                DescriptorKind::Image(image) => collect_image(image, &mut candidates),
                DescriptorKind::Index(index) => collect_index(index, &mut candidates),
            }

            for layer in candidates {
                if self.filter.should_include(layer).await? {
                    included.push(layer.clone());
                }
            }
        }

        Ok(included)
    }

    /// Write one entry per distinct digest, in digest order.
    ///
    /// Returns the placeholders left for the fill pass; empty unless
    /// `inflatable`.
    async fn write_layers(
        &self,
        sink: &mut Sink,
        mut layers: Vec<LayerDescriptor>,
        inflatable: bool,
    ) -> Result<Vec<WrittenLayer>> {
        // Sort layers by digest to have a deterministic archive
        layers.sort_by(|a, b| a.digest.cmp(&b.digest));

        let mut written = HashSet::new();
        let mut placeholders = Vec::new();

        for layer in layers {
            let name = layer.parsed_digest()?.archive_name();

            if !written.insert(name.clone()) {
                continue;
            }

            let offset = sink
                .checkpoint()
                .await
                .map_err(|e| ArchiveError::write(format!("Finding offset of '{name}'"), e))?;

            match offset {
                Some(offset) if inflatable => {
                    entry::write_placeholder(sink.writer(), &name, layer.size)
                        .await
                        .map_err(|e| ArchiveError::write(format!("Writing tar entry '{name}'"), e))?;

                    debug!(name = %name, offset, size = layer.size, "Reserved layer entry");
                    placeholders.push(WrittenLayer {
                        name,
                        offset,
                        layer,
                    });
                }
                _ => {
                    let mut stream = self.provider.open_layer(&layer).await?;
                    let started = Instant::now();

                    entry::write_entry(sink.writer(), &name, layer.size, &mut stream)
                        .await
                        .map_err(|e| ArchiveError::write(format!("Writing tar entry '{name}'"), e))?;

                    self.progress.report_done(&name, started.elapsed());
                }
            }
        }

        Ok(placeholders)
    }
}

fn collect_index<'a>(index: &'a ImageIndexDescriptor, out: &mut Vec<&'a LayerDescriptor>) {
    for nested in &index.indexes {
        collect_index(nested, out);
    }
    for image in &index.images {
        collect_image(image, out);
    }
}

fn collect_image<'a>(image: &'a ImageDescriptor, out: &mut Vec<&'a LayerDescriptor>) {
    out.extend(image.layers.iter());
}

/// Buffered handle used by the sequential pass.
enum Sink {
    Seekable(BufWriter<Box<dyn SeekableSink>>),
    Stream(BufWriter<Box<dyn AsyncWrite + Send + Unpin>>),
}

impl Sink {
    fn new(destination: Destination) -> Self {
        match destination {
            Destination::Seekable(handle) => Sink::Seekable(BufWriter::new(handle)),
            Destination::Stream(handle) => Sink::Stream(BufWriter::new(handle)),
        }
    }

    fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
        match self {
            Sink::Seekable(writer) => writer,
            Sink::Stream(writer) => writer,
        }
    }

    /// Flush buffered entries; report the current offset when seekable.
    async fn checkpoint(&mut self) -> std::io::Result<Option<u64>> {
        match self {
            Sink::Seekable(writer) => {
                writer.flush().await?;
                Ok(Some(writer.get_mut().stream_position().await?))
            }
            Sink::Stream(writer) => {
                writer.flush().await?;
                Ok(None)
            }
        }
    }

    /// Write the end-of-archive marker, flush and close.
    async fn finish(&mut self) -> std::io::Result<()> {
        entry::write_footer(self.writer()).await?;
        let writer = self.writer();
        writer.flush().await?;
        writer.shutdown().await
    }
}
