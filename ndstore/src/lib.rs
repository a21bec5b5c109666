//! # ndstore
//!
//! Embedded storage cache for N-dimensional imaging datasets.
//!
//! ndstore is a Rust library providing a process-wide registry that maps
//! opaque handles to open or recently-open imaging datasets. Each dataset is
//! described by an N-dimensional coordinate space (time, channel, position,
//! z-slice, ...) and backed by a file on disk, written through a pluggable
//! codec.
//!
//! ## Key Properties
//!
//! - Bounded descriptor cache with soft/hard capacity policies; the only
//!   eviction signal is "is the backing file open right now"
//! - Handle-indexed lifecycle state machine (create / load / close / delete)
//!   with file-existence and duplicate-prevention invariants
//! - Deterministic coordinate-tuple → image-slot indexing
//! - Truncate-and-signal buffer contracts at the query boundary — callers
//!   always learn when a value was cut
//! - Strictly synchronous: no background threads, no timers, no retries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ndstore::DatasetStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = DatasetStore::new();
//!
//! // Create a dataset with 2 time points, 3 channels, 4 z-slices.
//! let handle = store.create("/data/acq.tif", "acq", &[2, 3, 4], "{}")?;
//!
//! store.configure_dimension(&handle, 1, "Channel", "channel")?;
//! store.add_image(&handle, &[0u8; 64], 8, 8, 8, &[0, 1, 2], r#"{"exposure_ms":10}"#)?;
//!
//! store.close(&handle)?;
//!
//! // Later: rediscover and reload.
//! let mut found = Vec::new();
//! store.list("/data", 1024, 4096, &mut found)?;
//! let handle = store.load(&found[0], "acq")?;
//! assert_eq!(store.number_of_dimensions(&handle)?, 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`DatasetStore`] — Top-level handle; lifecycle controller and query surface
//! - [`DescriptorCache`] — Handle registry with bounded capacity and eviction
//! - [`DatasetDescriptor`] — In-memory record for one dataset
//! - [`FrameCodec`] / [`DatasetFile`] — Seam to the on-disk container format
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`store`] — Dataset lifecycle, configuration, image queries
//! - [`cache`] — Handle registry and descriptor cache
//! - [`dataset`] — Dimension metadata and dataset descriptors
//! - [`codec`] — Codec traits and the flat-file reference codec
//! - [`key`] — Canonical coordinate keys
//! - [`discover`] — Recursive dataset discovery
//! - [`error`] — Error types

pub mod cache;
pub mod codec;
pub mod dataset;
pub mod discover;
pub mod error;
pub mod key;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use cache::{CachePolicy, DescriptorCache, DEFAULT_CAPACITY, MAX_HANDLE_LEN};
pub use codec::{DatasetFile, DatasetHeader, FlatFileCodec, FrameCodec, FrameTags};
pub use dataset::{DatasetDescriptor, DimensionInfo, FileState};
pub use discover::{list_datasets, SUPPORTED_EXTENSIONS};
pub use error::{Result, StorageError};
pub use key::image_key;
pub use store::DatasetStore;
