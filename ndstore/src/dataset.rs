//! In-memory dataset records: dimension metadata and descriptors.
//!
//! A [`DatasetDescriptor`] is the registry's record for one dataset: its
//! path, display name, free-form summary metadata, ordered dimension
//! metadata, sparse coordinate-key → slot image index, and open/closed file
//! state. Rank and axis sizes are fixed when the descriptor is built; only
//! axis and coordinate-slot names change afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::codec::DatasetFile;

/// One axis of a dataset.
///
/// The coordinate slot count is the axis size and is immutable after
/// creation; individual slots may be given display names later.
#[derive(Debug)]
pub struct DimensionInfo {
    /// Axis display name (e.g. `"Channel"`).
    pub name: String,
    /// Physical meaning of the axis (e.g. `"channel"`, `"time"`, `"z"`).
    pub meaning: String,
    /// Display names for each coordinate slot, initially empty strings.
    coordinates: Vec<String>,
}

impl DimensionInfo {
    /// Creates an unnamed axis with `size` coordinate slots.
    fn new(size: usize) -> Self {
        Self {
            name: String::new(),
            meaning: String::new(),
            coordinates: vec![String::new(); size],
        }
    }

    /// Returns the axis size (number of coordinate slots).
    pub fn size(&self) -> usize {
        self.coordinates.len()
    }

    /// Returns the display name of coordinate slot `index`, if in bounds.
    pub fn coordinate_name(&self, index: usize) -> Option<&str> {
        self.coordinates.get(index).map(String::as_str)
    }

    /// Overwrites the display name of coordinate slot `index`.
    ///
    /// Returns `false` if `index` is out of bounds.
    pub(crate) fn set_coordinate_name(&mut self, index: usize, name: &str) -> bool {
        match self.coordinates.get_mut(index) {
            Some(slot) => {
                name.clone_into(slot);
                true
            }
            None => false,
        }
    }
}

/// Open/closed file state of a dataset.
///
/// The codec resource and the "is open" flag are one value, so they can
/// never be observed inconsistently.
pub enum FileState {
    /// The backing file is open; the codec resource lives here.
    Open(Box<dyn DatasetFile>),
    /// The backing file has been released.
    Closed,
}

impl FileState {
    /// Returns `true` for [`FileState::Open`].
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

impl fmt::Debug for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(_) => f.write_str("Open"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// The in-memory record for one dataset.
#[derive(Debug)]
pub struct DatasetDescriptor {
    /// Absolute path of the backing file.
    path: PathBuf,
    /// Dataset display name.
    name: String,
    /// Free-form summary metadata blob; discarded when the dataset closes.
    summary_meta: String,
    /// Ordered axes; length is the dataset rank, fixed at creation.
    dimensions: Vec<DimensionInfo>,
    /// Sparse index from coordinate key to image slot id.
    image_index: HashMap<String, u32>,
    /// Per-image metadata blobs, parallel to slot ids.
    image_meta: Vec<String>,
    /// Open/closed file state.
    state: FileState,
}

impl DatasetDescriptor {
    /// Builds a closed descriptor with `shape.len()` axes of the given sizes.
    pub(crate) fn new(path: &Path, name: &str, shape: &[usize], summary_meta: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            summary_meta: summary_meta.to_string(),
            dimensions: shape.iter().map(|&size| DimensionInfo::new(size)).collect(),
            image_index: HashMap::new(),
            image_meta: Vec::new(),
            state: FileState::Closed,
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the dataset display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the summary metadata blob (empty once the dataset is closed).
    pub fn summary_meta(&self) -> &str {
        &self.summary_meta
    }

    /// Returns the number of dimensions, fixed at creation.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Returns the ordered axes.
    pub fn dimensions(&self) -> &[DimensionInfo] {
        &self.dimensions
    }

    /// Returns the axis at `index`, if in bounds.
    pub fn dimension(&self, index: usize) -> Option<&DimensionInfo> {
        self.dimensions.get(index)
    }

    /// Returns `true` while the backing file is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Returns the number of indexed images.
    pub fn image_count(&self) -> usize {
        self.image_index.len()
    }

    /// Attaches an open codec resource.
    pub(crate) fn set_open(&mut self, file: Box<dyn DatasetFile>) {
        self.state = FileState::Open(file);
    }

    /// Detaches the codec resource, leaving the descriptor closed.
    pub(crate) fn take_resource(&mut self) -> Option<Box<dyn DatasetFile>> {
        match std::mem::replace(&mut self.state, FileState::Closed) {
            FileState::Open(file) => Some(file),
            FileState::Closed => None,
        }
    }

    /// Borrows the open codec resource, if any.
    pub(crate) fn resource_mut(&mut self) -> Option<&mut dyn DatasetFile> {
        match &mut self.state {
            FileState::Open(file) => Some(file.as_mut()),
            FileState::Closed => None,
        }
    }

    /// Drops the summary metadata blob (on close).
    pub(crate) fn discard_summary_meta(&mut self) {
        self.summary_meta.clear();
    }

    /// Overwrites the name and meaning of axis `index`.
    ///
    /// Returns `false` if `index` is out of bounds. The slot count of the
    /// axis is untouched.
    pub(crate) fn set_dimension(&mut self, index: usize, name: &str, meaning: &str) -> bool {
        match self.dimensions.get_mut(index) {
            Some(dim) => {
                name.clone_into(&mut dim.name);
                meaning.clone_into(&mut dim.meaning);
                true
            }
            None => false,
        }
    }

    /// Overwrites the display name of one coordinate slot.
    ///
    /// Returns `false` if either index is out of bounds.
    pub(crate) fn set_coordinate(&mut self, dim: usize, coord: usize, name: &str) -> bool {
        match self.dimensions.get_mut(dim) {
            Some(axis) => axis.set_coordinate_name(coord, name),
            None => false,
        }
    }

    /// Returns `true` if an image is indexed under `key`.
    pub(crate) fn has_image(&self, key: &str) -> bool {
        self.image_index.contains_key(key)
    }

    /// Returns the slot id indexed under `key`.
    pub(crate) fn image_slot(&self, key: &str) -> Option<u32> {
        self.image_index.get(key).copied()
    }

    /// Records `key → slot` and stores the image metadata blob at `slot`.
    pub(crate) fn record_image(&mut self, key: String, slot: u32, meta: String) {
        let slot_index = slot as usize;
        if slot_index >= self.image_meta.len() {
            self.image_meta.resize(slot_index + 1, String::new());
        }
        self.image_meta[slot_index] = meta;
        self.image_index.insert(key, slot);
    }

    /// Returns the metadata blob stored at `slot`.
    pub(crate) fn image_meta_at(&self, slot: u32) -> Option<&str> {
        self.image_meta.get(slot as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank3() -> DatasetDescriptor {
        DatasetDescriptor::new(Path::new("/data/set.tif"), "set", &[2, 3, 4], "{}")
    }

    #[test]
    fn test_shape_fixed_at_creation() {
        let desc = rank3();
        assert_eq!(desc.rank(), 3);
        let sizes: Vec<usize> = desc.dimensions().iter().map(DimensionInfo::size).collect();
        assert_eq!(sizes, vec![2, 3, 4]);
        assert!(!desc.is_open());
    }

    #[test]
    fn test_dimension_and_coordinate_naming() {
        let mut desc = rank3();
        assert!(desc.set_dimension(1, "Channel", "channel"));
        assert!(!desc.set_dimension(3, "Nope", "nope"));

        assert!(desc.set_coordinate(1, 2, "DAPI"));
        assert!(!desc.set_coordinate(1, 3, "FITC"));
        assert!(!desc.set_coordinate(5, 0, "FITC"));

        let dim = desc.dimension(1).unwrap();
        assert_eq!(dim.name, "Channel");
        assert_eq!(dim.meaning, "channel");
        assert_eq!(dim.coordinate_name(2), Some("DAPI"));
        // Renaming never changes the slot count.
        assert_eq!(dim.size(), 3);
    }

    #[test]
    fn test_image_index_parallel_to_slots() {
        let mut desc = rank3();
        desc.record_image("0_0_0".to_string(), 0, "m0".to_string());
        desc.record_image("1_2_3".to_string(), 1, "m1".to_string());

        assert_eq!(desc.image_count(), 2);
        assert_eq!(desc.image_slot("1_2_3"), Some(1));
        assert_eq!(desc.image_meta_at(1), Some("m1"));
        assert_eq!(desc.image_slot("0_1_0"), None);
    }

    #[test]
    fn test_take_resource_on_closed_is_none() {
        let mut desc = rank3();
        assert!(desc.take_resource().is_none());
        assert!(desc.resource_mut().is_none());
    }
}
