//! Codec seam between the storage engine and the on-disk container format.
//!
//! The engine never encodes pixels itself; it talks to a [`FrameCodec`] that
//! can open a dataset file for write or read, and to the [`DatasetFile`]
//! resource the codec hands back. A production deployment would implement
//! these traits over a BigTIFF or Zarr writer; [`FlatFileCodec`] is the
//! reference container used by the engine's defaults and tests.
//!
//! # Flat file format
//!
//! ```text
//! [0..4)    Magic bytes "NDST"
//! [4..8)    Format version (u32 LE)
//! [8..)     Sequence of blocks: kind (u8), payload length (u32 LE), payload
//!           kind 1: dataset header, JSON
//!           kind 2: frame — tag length (u32 LE), tag JSON, raw pixel bytes
//! ```
//!
//! Reading is deliberately forgiving: a file with foreign magic or a
//! truncated tail yields whatever header and frames could be recovered, so
//! that loading a legacy dataset degrades to an incomplete descriptor
//! instead of an error.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Magic bytes identifying an ndstore flat dataset file.
const FLATFILE_MAGIC: [u8; 4] = *b"NDST";

/// Current flat file format version.
const FLATFILE_VERSION: u32 = 1;

/// Block kind for the dataset header.
const BLOCK_HEADER: u8 = 1;

/// Block kind for an image frame.
const BLOCK_FRAME: u8 = 2;

/// Self-describing dataset summary stored at the front of a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHeader {
    /// Dataset display name.
    pub name: String,
    /// Axis sizes, one per dimension.
    pub shape: Vec<usize>,
    /// Free-form summary metadata blob (e.g. JSON).
    pub summary_meta: String,
}

/// Per-frame tags stored alongside the pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTags {
    /// Coordinate tuple locating the frame in the dataset's space.
    pub coordinates: Vec<usize>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bits per pixel.
    pub bit_depth: u32,
    /// Free-form per-image metadata blob.
    pub image_meta: String,
}

/// Factory for dataset file resources.
///
/// The engine holds exactly one codec and routes all file I/O through it.
pub trait FrameCodec: fmt::Debug {
    /// Creates a fresh dataset file at `path` and opens it for writing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created (including when a
    /// file already exists at `path`).
    fn open_for_write(&self, path: &Path) -> io::Result<Box<dyn DatasetFile>>;

    /// Opens an existing dataset file at `path` and enumerates its contents.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or scanned.
    fn open_for_read(&self, path: &Path) -> io::Result<Box<dyn DatasetFile>>;
}

/// An open dataset file resource.
///
/// Exactly one of these exists per open descriptor; it is owned by the
/// descriptor's file state and released on close.
pub trait DatasetFile {
    /// Writes the self-describing dataset header.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the header cannot be serialized or written.
    fn write_header(&mut self, header: &DatasetHeader) -> io::Result<()>;

    /// Returns the dataset header, if the file carries one.
    fn header(&self) -> Option<&DatasetHeader>;

    /// Appends a frame and returns the slot id it was stored under.
    ///
    /// Slot ids are dense and assigned in append order, starting at 0.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the frame cannot be written.
    fn append_frame(&mut self, pixels: &[u8], tags: &FrameTags) -> io::Result<u32>;

    /// Reads back the pixel data of the frame stored at `slot`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the slot is unknown or the read fails.
    fn read_frame(&mut self, slot: u32) -> io::Result<Vec<u8>>;

    /// Enumerates the tags of every frame in the file, in slot order.
    fn frames(&self) -> &[FrameTags];

    /// Releases the resource, flushing any pending writes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the final flush fails.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Reference codec producing [flat dataset files](self#flat-file-format).
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatFileCodec;

impl FrameCodec for FlatFileCodec {
    fn open_for_write(&self, path: &Path) -> io::Result<Box<dyn DatasetFile>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&FLATFILE_MAGIC)?;
        file.write_all(&FLATFILE_VERSION.to_le_bytes())?;
        Ok(Box::new(FlatFile {
            file,
            path: path.to_path_buf(),
            header: None,
            frames: Vec::new(),
            pixel_spans: Vec::new(),
        }))
    }

    fn open_for_read(&self, path: &Path) -> io::Result<Box<dyn DatasetFile>> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mut flat = FlatFile {
            file,
            path: path.to_path_buf(),
            header: None,
            frames: Vec::new(),
            pixel_spans: Vec::new(),
        };
        flat.scan()?;
        Ok(Box::new(flat))
    }
}

/// An open flat dataset file.
struct FlatFile {
    /// The underlying file handle.
    file: File,
    /// Path on disk (for error reporting).
    path: PathBuf,
    /// Header block, once written or recovered.
    header: Option<DatasetHeader>,
    /// Frame tags in slot order.
    frames: Vec<FrameTags>,
    /// Byte span (offset, length) of each frame's pixel data, in slot order.
    pixel_spans: Vec<(u64, u64)>,
}

impl FlatFile {
    /// Scans an existing file, recovering the header and frame directory.
    ///
    /// Foreign magic or a truncated tail ends the scan without error; the
    /// caller sees whatever was recoverable up to that point.
    fn scan(&mut self) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        let mut magic = [0u8; 4];
        let mut version = [0u8; 4];
        if len < 8 {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut magic)?;
        self.file.read_exact(&mut version)?;
        if magic != FLATFILE_MAGIC || u32::from_le_bytes(version) != FLATFILE_VERSION {
            return Ok(());
        }

        let mut pos = 8u64;
        while pos + 5 <= len {
            self.file.seek(SeekFrom::Start(pos))?;
            let mut kind = [0u8; 1];
            let mut block_len = [0u8; 4];
            self.file.read_exact(&mut kind)?;
            self.file.read_exact(&mut block_len)?;
            let block_len = u64::from(u32::from_le_bytes(block_len));
            let payload_start = pos + 5;
            if payload_start + block_len > len {
                // Truncated tail, likely an interrupted write. Keep what we have.
                break;
            }
            match kind[0] {
                BLOCK_HEADER => {
                    let mut payload = vec![0u8; usize::try_from(block_len).map_err(oversized)?];
                    self.file.read_exact(&mut payload)?;
                    if let Ok(header) = serde_json::from_slice(&payload) {
                        self.header = Some(header);
                    }
                }
                BLOCK_FRAME => {
                    if block_len < 4 {
                        break;
                    }
                    let mut tag_len = [0u8; 4];
                    self.file.read_exact(&mut tag_len)?;
                    let tag_len = u64::from(u32::from_le_bytes(tag_len));
                    if 4 + tag_len > block_len {
                        break;
                    }
                    let mut tag_buf = vec![0u8; usize::try_from(tag_len).map_err(oversized)?];
                    self.file.read_exact(&mut tag_buf)?;
                    let Ok(tags) = serde_json::from_slice::<FrameTags>(&tag_buf) else {
                        break;
                    };
                    let pixel_offset = payload_start + 4 + tag_len;
                    let pixel_len = block_len - 4 - tag_len;
                    self.frames.push(tags);
                    self.pixel_spans.push((pixel_offset, pixel_len));
                }
                _ => break,
            }
            pos = payload_start + block_len;
        }
        Ok(())
    }

    /// Appends one block at the end of the file; returns the payload offset.
    fn append_block(&mut self, kind: u8, payload: &[&[u8]]) -> io::Result<u64> {
        let total: usize = payload.iter().map(|p| p.len()).sum();
        let block_len = u32::try_from(total).map_err(oversized)?;
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&[kind])?;
        self.file.write_all(&block_len.to_le_bytes())?;
        for part in payload {
            self.file.write_all(part)?;
        }
        Ok(offset + 5)
    }
}

/// Maps an out-of-range length conversion to an I/O error.
fn oversized<E>(_: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "block length out of range")
}

impl DatasetFile for FlatFile {
    fn write_header(&mut self, header: &DatasetHeader) -> io::Result<()> {
        let payload = serde_json::to_vec(header)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.append_block(BLOCK_HEADER, &[&payload])?;
        self.header = Some(header.clone());
        Ok(())
    }

    fn header(&self) -> Option<&DatasetHeader> {
        self.header.as_ref()
    }

    fn append_frame(&mut self, pixels: &[u8], tags: &FrameTags) -> io::Result<u32> {
        let tag_json = serde_json::to_vec(tags)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tag_len = u32::try_from(tag_json.len()).map_err(oversized)?;
        let payload_offset =
            self.append_block(BLOCK_FRAME, &[&tag_len.to_le_bytes(), &tag_json, pixels])?;

        let slot = u32::try_from(self.frames.len()).map_err(oversized)?;
        self.frames.push(tags.clone());
        self.pixel_spans
            .push((payload_offset + 4 + u64::from(tag_len), pixels.len() as u64));
        Ok(slot)
    }

    fn read_frame(&mut self, slot: u32) -> io::Result<Vec<u8>> {
        let (offset, len) = *self
            .pixel_spans
            .get(slot as usize)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no frame at slot {slot} in '{}'", self.path.display()),
                )
            })?;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut pixels = vec![0u8; usize::try_from(len).map_err(oversized)?];
        self.file.read_exact(&mut pixels)?;
        Ok(pixels)
    }

    fn frames(&self) -> &[FrameTags] {
        &self.frames
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tags(coords: &[usize], meta: &str) -> FrameTags {
        FrameTags {
            coordinates: coords.to_vec(),
            width: 4,
            height: 2,
            bit_depth: 8,
            image_meta: meta.to_string(),
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("set.tif");
        let codec = FlatFileCodec;

        let mut file = codec.open_for_write(&path).unwrap();
        file.write_header(&DatasetHeader {
            name: "set".to_string(),
            shape: vec![2, 3],
            summary_meta: "{}".to_string(),
        })
        .unwrap();
        let s0 = file.append_frame(&[1, 2, 3, 4], &tags(&[0, 0], "a")).unwrap();
        let s1 = file.append_frame(&[5, 6], &tags(&[1, 2], "b")).unwrap();
        assert_eq!((s0, s1), (0, 1));
        file.close().unwrap();

        let mut file = codec.open_for_read(&path).unwrap();
        let header = file.header().unwrap();
        assert_eq!(header.name, "set");
        assert_eq!(header.shape, vec![2, 3]);
        assert_eq!(file.frames().len(), 2);
        assert_eq!(file.frames()[1].coordinates, vec![1, 2]);
        assert_eq!(file.frames()[1].image_meta, "b");
        assert_eq!(file.read_frame(0).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(file.read_frame(1).unwrap(), vec![5, 6]);
        assert!(file.read_frame(2).is_err());
    }

    #[test]
    fn test_open_for_write_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("set.tif");
        fs::write(&path, b"occupied").unwrap();
        assert!(FlatFileCodec.open_for_write(&path).is_err());
    }

    #[test]
    fn test_foreign_magic_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.tif");
        fs::write(&path, b"II*\0 not an ndstore file").unwrap();

        let file = FlatFileCodec.open_for_read(&path).unwrap();
        assert!(file.header().is_none());
        assert!(file.frames().is_empty());
    }

    #[test]
    fn test_truncated_tail_keeps_complete_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("set.tif");

        let mut file = FlatFileCodec.open_for_write(&path).unwrap();
        file.append_frame(&[9, 9], &tags(&[0], "kept")).unwrap();
        file.close().unwrap();

        // Simulate an interrupted append: a frame block header with no body.
        let mut raw = fs::read(&path).unwrap();
        raw.extend_from_slice(&[BLOCK_FRAME]);
        raw.extend_from_slice(&1000u32.to_le_bytes());
        fs::write(&path, raw).unwrap();

        let mut file = FlatFileCodec.open_for_read(&path).unwrap();
        assert_eq!(file.frames().len(), 1);
        assert_eq!(file.read_frame(0).unwrap(), vec![9, 9]);
    }
}
