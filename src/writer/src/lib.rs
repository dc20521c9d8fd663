//! Image archive writer.
//!
//! Packs image descriptors and their layer blobs into a single tar archive:
//! a `manifest.json` entry describing the image tree, followed by one entry
//! per distinct layer named `<algorithm>-<hex>.tar.gz`, in digest order.
//! Output is byte-for-byte deterministic for a given descriptor set,
//! independent of the concurrency used to produce it.

pub mod descriptor;
pub mod destination;
pub mod entry;
mod fill;
pub mod filter;
pub mod layout;
pub mod provider;
pub mod writer;

pub use descriptor::{
    ConfigDescriptor, DescriptorKind, Digest, ImageDescriptor, ImageIndexDescriptor,
    ImageOrImageIndexDescriptor, ImageRefDescriptors, LayerDescriptor, ManifestDescriptor,
};
pub use destination::{
    Destination, DestinationFactory, FileDestination, MemoryDestination, SeekableSink,
    StdoutDestination,
};
pub use filter::{IncludeAll, LayerFilter, NonDistributableFilter, SkipDigests};
pub use layout::OciLayoutProvider;
pub use provider::{DescriptorProvider, LayerStream};
pub use writer::{ArchiveWriter, WrittenLayer, MANIFEST_ENTRY};
