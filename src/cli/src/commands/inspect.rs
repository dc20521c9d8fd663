//! `boxtar inspect` command - List the entries of an image archive.

use std::io::Read;
use std::path::{Path, PathBuf};

use boxtar_writer::{ImageRefDescriptors, MANIFEST_ENTRY};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Archive to inspect
    pub archive: PathBuf,

    /// Print the manifest.json descriptor tree as JSON instead
    #[arg(long)]
    pub manifest: bool,
}

/// One entry of an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
}

pub async fn execute(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.manifest {
        let descriptors = read_manifest(&args.archive)?;
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    let entries = list_entries(&args.archive)?;
    let mut table = output::new_table(&["NAME", "SIZE"]);
    for entry in &entries {
        table.add_row(vec![entry.name.clone(), output::format_bytes(entry.size)]);
    }
    println!("{table}");
    Ok(())
}

/// Entry names and sizes, in archive order.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>, Box<dyn std::error::Error>> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    let mut archive = tar::Archive::new(file);

    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        entries.push(ArchiveEntry {
            name: entry.path()?.to_string_lossy().to_string(),
            size: entry.header().size()?,
        });
    }
    Ok(entries)
}

/// Parse the `manifest.json` entry of an archive.
pub fn read_manifest(path: &Path) -> Result<ImageRefDescriptors, Box<dyn std::error::Error>> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    let mut archive = tar::Archive::new(file);

    let mut first = archive
        .entries()?
        .next()
        .ok_or_else(|| format!("{} is empty", path.display()))??;
    if first.path()?.to_str() != Some(MANIFEST_ENTRY) {
        return Err(format!("{} does not start with {MANIFEST_ENTRY}", path.display()).into());
    }

    let mut content = Vec::new();
    first.read_to_end(&mut content)?;
    Ok(ImageRefDescriptors::from_bytes(&content)?)
}
