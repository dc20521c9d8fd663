//! Parallel fill pass.
//!
//! Rewrites placeholder entries with real layer content. Each task opens
//! its own destination handle, seeks to the entry's header offset and writes
//! header, content and padding. Tasks only flush: the end-of-archive marker
//! was written by the sequential pass and must not be repeated mid-archive.

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Instant;

use boxtar_core::error::{ArchiveError, Result};
use boxtar_core::progress::ProgressLogger;
use boxtar_core::throttle::{Executor, Outcome};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::destination::{Destination, DestinationFactory};
use crate::entry;
use crate::provider::DescriptorProvider;
use crate::writer::WrittenLayer;

/// Read-only state shared by all fill tasks.
pub(crate) struct FillContext {
    pub provider: Arc<dyn DescriptorProvider>,
    pub destination: Arc<dyn DestinationFactory>,
    pub progress: Arc<dyn ProgressLogger>,
}

/// Fill in every placeholder, largest first.
///
/// Waits for all tasks, then returns the first failure reported.
pub(crate) async fn fill_in_layers(
    ctx: FillContext,
    mut layers: Vec<WrittenLayer>,
    executor: &Executor,
) -> Result<()> {
    // Prefer larger sizes first
    layers.sort_by(|a, b| {
        b.layer
            .size
            .cmp(&a.layer.size)
            .then_with(|| a.name.cmp(&b.name))
    });

    let total = layers.len();
    let ctx = Arc::new(ctx);
    let mut tasks: JoinSet<Outcome<()>> = JoinSet::new();
    let mut first_error = None;

    for layer in layers {
        let ctx = Arc::clone(&ctx);
        let label = layer.name.clone();
        let layer = Arc::new(layer);

        let spawned = executor
            .spawn(&mut tasks, label, move || {
                let ctx = Arc::clone(&ctx);
                let layer = Arc::clone(&layer);
                async move { fill_in_layer(&ctx, &layer).await }
            })
            .await;

        if let Err(e) = spawned {
            first_error = Some(e);
            break;
        }
    }

    let mut filled = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Outcome {
                result: Ok(()), ..
            }) => filled += 1,
            Ok(Outcome {
                label,
                result: Err(e),
            }) => {
                warn!(layer = %label, error = %e, "Failed to fill in layer");
                first_error.get_or_insert(ArchiveError::FillError {
                    name: label,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                warn!(error = %e, "Fill task did not complete");
                first_error.get_or_insert(ArchiveError::Other(format!(
                    "Fill task did not complete: {e}"
                )));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            debug!(filled, total, "Filled in all layers");
            Ok(())
        }
    }
}

/// Rewrite one placeholder with the real header and content.
async fn fill_in_layer(ctx: &FillContext, layer: &WrittenLayer) -> Result<()> {
    let Destination::Seekable(mut handle) = ctx.destination.open().await? else {
        return Err(ArchiveError::OpenError {
            target: ctx.destination.target(),
            message: "destination is not seekable".to_string(),
        });
    };

    handle
        .seek(SeekFrom::Start(layer.offset))
        .await
        .map_err(|e| ArchiveError::write(format!("Seeking to offset {}", layer.offset), e))?;

    let mut stream = ctx.provider.open_layer(&layer.layer).await?;
    let started = Instant::now();

    let mut writer = BufWriter::new(handle);
    entry::write_entry(&mut writer, &layer.name, layer.layer.size, &mut stream)
        .await
        .map_err(|e| ArchiveError::write(format!("Rewriting tar entry '{}'", layer.name), e))?;
    writer
        .flush()
        .await
        .map_err(|e| ArchiveError::write(format!("Flushing tar entry '{}'", layer.name), e))?;

    ctx.progress.report_done(&layer.name, started.elapsed());
    Ok(())
}
