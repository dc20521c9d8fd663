//! `boxtar save` command - Save the images of an OCI layout to a tar archive.
//!
//! The archive holds a `manifest.json` descriptor tree followed by one entry
//! per distinct layer. Writing to a regular file fills layers in parallel;
//! `-` streams the archive to stdout sequentially.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use boxtar_core::config::WriterConfig;
use boxtar_core::progress::ProgressLogger;
use boxtar_writer::{
    ArchiveWriter, DestinationFactory, FileDestination, OciLayoutProvider, StdoutDestination,
};
use clap::Args;

#[derive(Args)]
pub struct SaveArgs {
    /// OCI image layout directory to read images from
    #[arg(short, long)]
    pub layout: PathBuf,

    /// Output archive path, or "-" for stdout
    #[arg(short, long)]
    pub output: String,

    /// Maximum number of layers written concurrently
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Writer configuration file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Include non-distributable (foreign) layers
    #[arg(long)]
    pub include_non_distributable_layers: bool,
}

impl SaveArgs {
    /// Writer configuration: file values overridden by command-line flags.
    pub fn writer_config(&self) -> boxtar_core::Result<WriterConfig> {
        let mut config = match &self.config {
            Some(path) => WriterConfig::from_file(path)?,
            None => WriterConfig::default(),
        };

        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.include_non_distributable_layers {
            config.include_non_distributable = true;
        }

        config.validate()?;
        Ok(config)
    }

    fn to_stdout(&self) -> bool {
        self.output == "-"
    }
}

pub async fn execute(args: SaveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.writer_config()?;
    let provider = Arc::new(OciLayoutProvider::from_path(&args.layout)?);
    let image_count = provider.image_refs().descriptors().len();

    let destination: Arc<dyn DestinationFactory> = if args.to_stdout() {
        Arc::new(StdoutDestination)
    } else {
        Arc::new(FileDestination::create(&args.output).await?)
    };

    ArchiveWriter::new(provider, destination, config)
        .with_progress(Arc::new(DoneLogger))
        .write()
        .await?;

    if !args.to_stdout() {
        let size = std::fs::metadata(&args.output)
            .map(|m| m.len())
            .unwrap_or(0);

        println!(
            "Saved {} image(s) from {} to {} ({})",
            image_count,
            args.layout.display(),
            args.output,
            crate::output::format_bytes(size)
        );
    }
    Ok(())
}

/// Prints one `done` line per transferred layer to stderr.
struct DoneLogger;

impl ProgressLogger for DoneLogger {
    fn report_done(&self, name: &str, elapsed: Duration) {
        eprintln!("{}", done_line(name, elapsed));
    }
}

fn done_line(name: &str, elapsed: Duration) -> String {
    format!(
        "done: file '{}' ({})",
        name,
        crate::output::format_duration(elapsed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(config: Option<PathBuf>) -> SaveArgs {
        SaveArgs {
            layout: PathBuf::from("/tmp/layout"),
            output: "images.tar".to_string(),
            concurrency: None,
            config,
            include_non_distributable_layers: false,
        }
    }

    #[test]
    fn test_writer_config_defaults() {
        let config = args(None).writer_config().unwrap();
        assert_eq!(config.concurrency, 5);
        assert!(!config.include_non_distributable);
    }

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("boxtar.yaml");
        fs::write(&path, "concurrency: 2\nretry:\n  max_attempts: 7\n").unwrap();

        let mut save = args(Some(path));
        let config = save.writer_config().unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.retry.max_attempts, 7);

        save.concurrency = Some(9);
        save.include_non_distributable_layers = true;
        let config = save.writer_config().unwrap();
        assert_eq!(config.concurrency, 9);
        assert!(config.include_non_distributable);
        assert_eq!(config.retry.max_attempts, 7);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut save = args(None);
        save.concurrency = Some(0);
        assert!(save.writer_config().is_err());
    }

    #[test]
    fn test_done_line() {
        assert_eq!(
            done_line("sha256-aa.tar.gz", Duration::from_millis(1500)),
            "done: file 'sha256-aa.tar.gz' (1.50s)"
        );
    }

    #[tokio::test]
    async fn test_missing_layout() {
        let tmp = TempDir::new().unwrap();
        let save = SaveArgs {
            layout: tmp.path().join("missing"),
            output: tmp.path().join("out.tar").to_string_lossy().to_string(),
            concurrency: Some(2),
            config: None,
            include_non_distributable_layers: false,
        };
        assert!(execute(save).await.is_err());
    }
}
