//! Dataset lifecycle controller and query surface.
//!
//! This module provides the top-level API that ties all components together.
//! The [`DatasetStore`] owns the descriptor cache and the codec, and drives
//! every dataset through its lifecycle: created or loaded into the `Open`
//! state, mutated through configuration and image insertion, released by
//! `close`, and destroyed by `delete` or shutdown.
//!
//! # Design
//!
//! The store acts as the central coordinator:
//! - Owns the [`DescriptorCache`] (handle registry, capacity, eviction)
//! - Talks to the codec for all backing-file I/O
//! - Enforces lifecycle preconditions (file existence, duplicate prevention)
//! - Applies the truncate-and-signal buffer contract at the query boundary
//!
//! Every operation is synchronous and blocks for the full duration of its
//! filesystem interaction; a failed operation leaves no partial registry
//! mutation behind.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use ndstore::DatasetStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = DatasetStore::new();
//!
//! // Create a rank-3 dataset: 2 time points, 3 channels, 4 z-slices.
//! let handle = store.create("/data/acq.tif", "acq", &[2, 3, 4], r#"{"sample":"beads"}"#)?;
//!
//! store.configure_dimension(&handle, 1, "Channel", "channel")?;
//! store.configure_coordinate(&handle, 1, 0, "DAPI")?;
//!
//! let pixels = vec![0u8; 512 * 512 * 2];
//! store.add_image(&handle, &pixels, 512, 512, 16, &[0, 0, 0], r#"{"exposure_ms":10}"#)?;
//!
//! let mut meta = [0u8; 256];
//! let n = store.get_image_meta(&handle, &[0, 0, 0], &mut meta)?;
//! println!("{}", std::str::from_utf8(&meta[..n])?);
//!
//! store.close(&handle)?;
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::cache::DescriptorCache;
use crate::codec::{DatasetHeader, FlatFileCodec, FrameCodec, FrameTags};
use crate::dataset::DatasetDescriptor;
use crate::discover;
use crate::error::{Result, StorageError};
use crate::key::image_key;

/// Top-level handle registry and lifecycle controller for imaging datasets.
///
/// # Thread Safety
///
/// The store is designed for single-threaded access patterns: every
/// lifecycle-mutating operation takes `&mut self`, so the borrow checker
/// enforces the one-mutator-at-a-time discipline. External synchronization
/// must be provided if used across multiple threads.
#[derive(Debug)]
pub struct DatasetStore {
    /// Handle registry and bounded descriptor cache.
    cache: DescriptorCache,
    /// Codec for all backing-file I/O.
    codec: Box<dyn FrameCodec>,
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStore {
    /// Creates a store with the default cache limits and the flat-file codec.
    pub fn new() -> Self {
        Self::with_config(DescriptorCache::new(), Box::new(FlatFileCodec))
    }

    /// Creates a store over an explicit cache configuration and codec.
    pub fn with_config(cache: DescriptorCache, codec: Box<dyn FrameCodec>) -> Self {
        Self { cache, codec }
    }

    /// Creates a new dataset and registers it in the `Open` state.
    ///
    /// The capacity check (and eviction pass, if needed) runs before any
    /// file is touched, so a rejected create leaves no trace. The backing
    /// file must not already exist.
    ///
    /// # Arguments
    ///
    /// * `path` - Backing file path (must not exist yet)
    /// * `name` - Dataset display name
    /// * `shape` - Axis sizes; the rank is `shape.len()` and must be > 0
    /// * `summary_meta` - Free-form summary metadata blob
    ///
    /// # Returns
    ///
    /// The opaque handle string identifying the new registry entry.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an empty path or zero rank.
    /// - [`StorageError::DuplicateEntry`] if a file already exists at `path`.
    /// - [`StorageError::OutOfCapacity`] if the cache is full under the
    ///   hard-limit policy, or the backing file could not be allocated.
    pub fn create(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
        shape: &[usize],
        summary_meta: &str,
    ) -> Result<String> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StorageError::invalid_input("dataset path must not be empty"));
        }
        if shape.is_empty() {
            return Err(StorageError::invalid_input(
                "dataset rank must be greater than zero",
            ));
        }

        self.cache.ensure_capacity()?;

        if path.exists() {
            return Err(StorageError::DuplicateEntry {
                entry: path.display().to_string(),
            });
        }

        let mut file = self.codec.open_for_write(path).map_err(|e| {
            StorageError::OutOfCapacity {
                reason: format!("failed to create backing file '{}': {e}", path.display()),
            }
        })?;
        let header = DatasetHeader {
            name: name.to_string(),
            shape: shape.to_vec(),
            summary_meta: summary_meta.to_string(),
        };
        if let Err(e) = file.write_header(&header) {
            // Don't leave a half-written file behind a failed create.
            let _ = fs::remove_file(path);
            return Err(StorageError::internal_io(
                format!("failed to write dataset header '{}'", path.display()),
                e,
            ));
        }

        let mut descriptor = DatasetDescriptor::new(path, name, shape, summary_meta);
        descriptor.set_open(file);
        let handle = self.cache.insert(descriptor)?;
        debug!(handle, path = %path.display(), rank = shape.len(), "dataset created");
        Ok(handle)
    }

    /// Loads an existing dataset from disk and registers it in the `Open`
    /// state.
    ///
    /// The codec's header and frame directory are walked to reconstruct
    /// rank, axis sizes, the image index, and metadata. Reconstruction is
    /// best-effort: a legacy file without a self-describing header gets its
    /// shape derived from the frame coordinate tags, and a file with no
    /// usable tags at all loads as a rank-0 descriptor with an empty index.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] if the file is missing or unreadable.
    /// - [`StorageError::OutOfCapacity`] if the cache is full under the
    ///   hard-limit policy.
    pub fn load(&mut self, path: impl AsRef<Path>, name: &str) -> Result<String> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StorageError::invalid_input("dataset path must not be empty"));
        }
        if !path.exists() {
            return Err(StorageError::invalid_input(format!(
                "no dataset file at '{}'",
                path.display()
            )));
        }

        self.cache.ensure_capacity()?;

        let file = self.codec.open_for_read(path).map_err(|e| {
            StorageError::invalid_input(format!(
                "cannot read dataset '{}': {e}",
                path.display()
            ))
        })?;

        let (dataset_name, shape, summary_meta) = match file.header() {
            Some(header) => {
                let display_name = if name.is_empty() { &header.name } else { name };
                (
                    display_name.to_string(),
                    header.shape.clone(),
                    header.summary_meta.clone(),
                )
            }
            None => (
                name.to_string(),
                derive_shape(file.frames()),
                String::new(),
            ),
        };

        let mut descriptor = DatasetDescriptor::new(path, &dataset_name, &shape, &summary_meta);
        for (slot, tags) in file.frames().iter().enumerate() {
            if !tuple_in_bounds(&tags.coordinates, &shape) {
                // Legacy frame that disagrees with the reconstructed shape.
                trace!(slot, "skipping out-of-shape frame during load");
                continue;
            }
            let key = image_key(&tags.coordinates);
            if descriptor.has_image(&key) {
                continue;
            }
            let slot = u32::try_from(slot)
                .map_err(|_| StorageError::internal("frame directory too large"))?;
            descriptor.record_image(key, slot, tags.image_meta.clone());
        }
        descriptor.set_open(file);

        let images = descriptor.image_count();
        let handle = self.cache.insert(descriptor)?;
        debug!(handle, path = %path.display(), rank = shape.len(), images, "dataset loaded");
        Ok(handle)
    }

    /// Closes a dataset's backing file.
    ///
    /// The codec resource is released and the summary metadata blob is
    /// discarded; the image index and dimension structure remain queryable.
    /// Closing an already-closed dataset is a no-op success.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle.
    /// - [`StorageError::Internal`] if the codec fails to release the file.
    pub fn close(&mut self, handle: &str) -> Result<()> {
        let descriptor = self.entry_mut(handle)?;
        if let Some(file) = descriptor.take_resource() {
            descriptor.discard_summary_meta();
            let path = descriptor.path().to_path_buf();
            file.close().map_err(|e| {
                StorageError::internal_io(format!("failed to close '{}'", path.display()), e)
            })?;
            debug!(handle, path = %path.display(), "dataset closed");
        }
        Ok(())
    }

    /// Deletes a dataset: closes it if open, removes the backing file from
    /// disk, and evicts the descriptor from the registry.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle.
    /// - [`StorageError::MissingData`] if the backing file is already gone
    ///   (the descriptor stays registered).
    /// - [`StorageError::Internal`] if the filesystem removal fails.
    pub fn delete(&mut self, handle: &str) -> Result<()> {
        let descriptor = self.entry_mut(handle)?;
        let path = descriptor.path().to_path_buf();
        if !path.exists() {
            return Err(StorageError::MissingData {
                path: path.display().to_string(),
            });
        }

        if let Some(file) = descriptor.take_resource() {
            file.close().map_err(|e| {
                StorageError::internal_io(format!("failed to close '{}'", path.display()), e)
            })?;
        }
        fs::remove_file(&path).map_err(|e| {
            StorageError::internal_io(format!("failed to remove '{}'", path.display()), e)
        })?;
        self.cache.remove(handle);
        debug!(handle, path = %path.display(), "dataset deleted");
        Ok(())
    }

    /// Closes every open dataset and clears the registry.
    ///
    /// Always succeeds and may be called repeatedly; codec failures during
    /// the final close are not surfaced.
    pub fn shutdown(&mut self) {
        let descriptors = self.cache.take_all();
        let count = descriptors.len();
        for mut descriptor in descriptors {
            if let Some(file) = descriptor.take_resource() {
                if let Err(e) = file.close() {
                    debug!(
                        path = %descriptor.path().display(),
                        error = %e,
                        "close failed during shutdown"
                    );
                }
            }
        }
        debug!(count, "storage cache cleared");
    }

    /// Overwrites the name and physical meaning of one axis.
    ///
    /// The axis's coordinate slot count is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] on an unknown handle or an
    /// out-of-range dimension index.
    pub fn configure_dimension(
        &mut self,
        handle: &str,
        dimension: usize,
        name: &str,
        meaning: &str,
    ) -> Result<()> {
        let descriptor = self.entry_mut(handle)?;
        let rank = descriptor.rank();
        if !descriptor.set_dimension(dimension, name, meaning) {
            return Err(dimension_out_of_range(dimension, rank));
        }
        Ok(())
    }

    /// Overwrites the display name of one coordinate slot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] on an unknown handle or an
    /// out-of-range dimension/coordinate index.
    pub fn configure_coordinate(
        &mut self,
        handle: &str,
        dimension: usize,
        coordinate: usize,
        name: &str,
    ) -> Result<()> {
        let descriptor = self.entry_mut(handle)?;
        let axis_size = match descriptor.dimension(dimension) {
            Some(axis) => axis.size(),
            None => return Err(dimension_out_of_range(dimension, descriptor.rank())),
        };
        if !descriptor.set_coordinate(dimension, coordinate, name) {
            return Err(StorageError::invalid_input(format!(
                "coordinate index {coordinate} out of range (axis size {axis_size})"
            )));
        }
        Ok(())
    }

    /// Returns the dataset's rank.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] on an unknown handle.
    pub fn number_of_dimensions(&self, handle: &str) -> Result<usize> {
        Ok(self.entry(handle)?.rank())
    }

    /// Copies an axis's name and meaning into the caller's buffers.
    ///
    /// Returns the byte counts written as `(name_len, meaning_len)`. A
    /// stored value longer than its buffer is truncated to the buffer and
    /// signaled, never silently cut.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle or index.
    /// - [`StorageError::SequenceTooLarge`] if either value was truncated
    ///   (the prefixes are still delivered).
    pub fn get_dimension(
        &self,
        handle: &str,
        dimension: usize,
        name_buf: &mut [u8],
        meaning_buf: &mut [u8],
    ) -> Result<(usize, usize)> {
        let descriptor = self.entry(handle)?;
        let axis = descriptor
            .dimension(dimension)
            .ok_or_else(|| dimension_out_of_range(dimension, descriptor.rank()))?;
        // Copy both before reporting truncation so the caller always gets
        // every prefix that fits.
        let name_res = copy_into(&axis.name, name_buf);
        let meaning_res = copy_into(&axis.meaning, meaning_buf);
        Ok((name_res?, meaning_res?))
    }

    /// Copies a coordinate slot's display name into the caller's buffer,
    /// returning the byte count written.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle or index.
    /// - [`StorageError::SequenceTooLarge`] if the name was truncated.
    pub fn get_coordinate(
        &self,
        handle: &str,
        dimension: usize,
        coordinate: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let descriptor = self.entry(handle)?;
        let axis = descriptor
            .dimension(dimension)
            .ok_or_else(|| dimension_out_of_range(dimension, descriptor.rank()))?;
        let name = axis.coordinate_name(coordinate).ok_or_else(|| {
            StorageError::invalid_input(format!(
                "coordinate index {coordinate} out of range (axis size {})",
                axis.size()
            ))
        })?;
        copy_into(name, buf)
    }

    /// Appends an image at the given coordinates.
    ///
    /// The coordinate tuple length must equal the dataset rank and every
    /// component must be inside its axis. Pixel persistence is delegated to
    /// the codec; the image metadata blob is indexed in memory under the
    /// canonical coordinate key.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle, an
    ///   out-of-bounds tuple, or a closed dataset.
    /// - [`StorageError::DuplicateEntry`] if an image is already indexed at
    ///   these coordinates.
    /// - [`StorageError::Internal`] if the codec append fails.
    #[allow(clippy::too_many_arguments)] // mirrors the host shell's call surface
    pub fn add_image(
        &mut self,
        handle: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
        bit_depth: u32,
        coordinates: &[usize],
        image_meta: &str,
    ) -> Result<()> {
        let descriptor = self.entry_mut(handle)?;
        check_tuple(descriptor, coordinates)?;

        let key = image_key(coordinates);
        if descriptor.has_image(&key) {
            return Err(StorageError::DuplicateEntry { entry: key });
        }

        let Some(file) = descriptor.resource_mut() else {
            return Err(StorageError::invalid_input("dataset is not open"));
        };
        let tags = FrameTags {
            coordinates: coordinates.to_vec(),
            width,
            height,
            bit_depth,
            image_meta: image_meta.to_string(),
        };
        let slot = file
            .append_frame(pixels, &tags)
            .map_err(|e| StorageError::internal_io("failed to append frame", e))?;
        descriptor.record_image(key, slot, image_meta.to_string());
        trace!(handle, slot, "image added");
        Ok(())
    }

    /// Copies the dataset's summary metadata into the caller's buffer,
    /// returning the byte count written.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle.
    /// - [`StorageError::SequenceTooLarge`] if the stored blob is longer
    ///   than the buffer (the prefix is still delivered).
    pub fn get_summary_meta(&self, handle: &str, buf: &mut [u8]) -> Result<usize> {
        let descriptor = self.entry(handle)?;
        copy_into(descriptor.summary_meta(), buf)
    }

    /// Copies the metadata of the image at the given coordinates into the
    /// caller's buffer, returning the byte count written.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle or a
    ///   coordinate tuple with no indexed image.
    /// - [`StorageError::SequenceTooLarge`] if the blob was truncated.
    pub fn get_image_meta(
        &self,
        handle: &str,
        coordinates: &[usize],
        buf: &mut [u8],
    ) -> Result<usize> {
        let descriptor = self.entry(handle)?;
        let key = image_key(coordinates);
        let slot = descriptor
            .image_slot(&key)
            .ok_or_else(|| no_image_at(&key))?;
        let meta = descriptor
            .image_meta_at(slot)
            .ok_or_else(|| StorageError::internal(format!("image index slot {slot} has no metadata")))?;
        copy_into(meta, buf)
    }

    /// Reads back the pixel data of the image at the given coordinates.
    ///
    /// An unknown coordinate tuple yields an error, never a partial buffer.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] on an unknown handle, an unindexed
    ///   tuple, or a closed dataset.
    /// - [`StorageError::Internal`] if the codec read fails.
    pub fn get_image(&mut self, handle: &str, coordinates: &[usize]) -> Result<Vec<u8>> {
        let descriptor = self.entry_mut(handle)?;
        let key = image_key(coordinates);
        let slot = descriptor
            .image_slot(&key)
            .ok_or_else(|| no_image_at(&key))?;
        let Some(file) = descriptor.resource_mut() else {
            return Err(StorageError::invalid_input("dataset is not open"));
        };
        file.read_frame(slot)
            .map_err(|e| StorageError::internal_io("failed to read frame", e))
    }

    /// Recursively lists dataset files under `path`.
    ///
    /// See [`discover::list_datasets`] for the contract.
    ///
    /// # Errors
    ///
    /// Propagates [`discover::list_datasets`] errors.
    pub fn list(
        &self,
        path: impl AsRef<Path>,
        max_items: usize,
        max_item_length: usize,
        out: &mut Vec<String>,
    ) -> Result<()> {
        discover::list_datasets(path, max_items, max_item_length, out)
    }

    /// Borrows the descriptor registered under `handle`.
    ///
    /// The borrow is scoped to the calling expression; no reference into
    /// the registry outlives a single call.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] on an unknown handle.
    pub fn descriptor(&self, handle: &str) -> Result<&DatasetDescriptor> {
        self.entry(handle)
    }

    /// Returns the underlying cache (for inspection in tests and tools).
    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    fn entry(&self, handle: &str) -> Result<&DatasetDescriptor> {
        self.cache
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))
    }

    fn entry_mut(&mut self, handle: &str) -> Result<&mut DatasetDescriptor> {
        self.cache
            .get_mut(handle)
            .ok_or_else(|| unknown_handle(handle))
    }
}

/// Copies `value` into `buf`, returning the byte count written.
///
/// A value longer than the buffer is truncated to the buffer and signaled
/// with [`StorageError::SequenceTooLarge`]; the prefix is delivered either
/// way.
fn copy_into(value: &str, buf: &mut [u8]) -> Result<usize> {
    let bytes = value.as_bytes();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    if bytes.len() > buf.len() {
        Err(StorageError::SequenceTooLarge {
            copied: n,
            total: bytes.len(),
        })
    } else {
        Ok(n)
    }
}

/// Validates a coordinate tuple against a descriptor's rank and axis sizes.
fn check_tuple(descriptor: &DatasetDescriptor, coordinates: &[usize]) -> Result<()> {
    if coordinates.len() != descriptor.rank() {
        return Err(StorageError::invalid_input(format!(
            "coordinate tuple has {} components, dataset rank is {}",
            coordinates.len(),
            descriptor.rank()
        )));
    }
    for (index, (&coordinate, axis)) in coordinates
        .iter()
        .zip(descriptor.dimensions())
        .enumerate()
    {
        if coordinate >= axis.size() {
            return Err(StorageError::invalid_input(format!(
                "coordinate {coordinate} out of range for dimension {index} (size {})",
                axis.size()
            )));
        }
    }
    Ok(())
}

/// Returns `true` if the tuple matches `shape` in rank and bounds.
fn tuple_in_bounds(coordinates: &[usize], shape: &[usize]) -> bool {
    coordinates.len() == shape.len()
        && coordinates.iter().zip(shape).all(|(&c, &size)| c < size)
}

/// Derives axis sizes from frame coordinate tags (`max(coordinate) + 1`).
fn derive_shape(frames: &[FrameTags]) -> Vec<usize> {
    let mut shape: Vec<usize> = Vec::new();
    for tags in frames {
        if tags.coordinates.len() > shape.len() {
            shape.resize(tags.coordinates.len(), 0);
        }
        for (axis, &coordinate) in tags.coordinates.iter().enumerate() {
            shape[axis] = shape[axis].max(coordinate + 1);
        }
    }
    shape
}

fn unknown_handle(handle: &str) -> StorageError {
    StorageError::invalid_input(format!("unknown handle '{handle}'"))
}

fn no_image_at(key: &str) -> StorageError {
    StorageError::invalid_input(format!("no image at coordinates [{key}]"))
}

fn dimension_out_of_range(dimension: usize, rank: usize) -> StorageError {
    StorageError::invalid_input(format!(
        "dimension index {dimension} out of range (rank {rank})"
    ))
}
