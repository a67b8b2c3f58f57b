use std::fs::File;
use std::io::{self, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use tracing::debug;

use crate::{Error, Result};

/// Byte size of the DISCO file header: three little-endian `i32`.
pub const DISCO_HEADER_BYTES: usize = 12;

/// Header of a DISCO descriptor data file.
///
/// The body follows immediately: `ndata * ndim` little-endian `f32`
/// values in row-major order, no padding, no trailer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiscoHeader {
    /// Number of vectors.
    pub ndata: i32,
    /// Number of elements of each vector.
    pub ndim: i32,
    /// Descriptor ID.
    pub descrid: i32,
}

impl DiscoHeader {
    pub fn read_from(bytes: &[u8]) -> Option<DiscoHeader> {
        if bytes.len() < DISCO_HEADER_BYTES {
            return None;
        }
        Some(DiscoHeader {
            ndata: LittleEndian::read_i32(&bytes[0..]),
            ndim: LittleEndian::read_i32(&bytes[4..]),
            descrid: LittleEndian::read_i32(&bytes[8..]),
        })
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.ndata)?;
        writer.write_i32::<LittleEndian>(self.ndim)?;
        writer.write_i32::<LittleEndian>(self.descrid)
    }
}

/// A DISCO descriptor file mapped read-only into memory.
pub struct DiscoFile {
    path: PathBuf,
    header: DiscoHeader,
    mmap: Mmap,
}

impl DiscoFile {
    /// Opens and maps `path`, validating the header against the file
    /// length.
    pub fn open(path: impl AsRef<Path>) -> Result<DiscoFile> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // safety: the file is mapped read-only and DISCO files are
        // produced once then never rewritten in place.
        let mmap = unsafe { Mmap::map(&file)? };

        let invalid = |reason: &str| Error::InvalidDiscoHeader {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let header = DiscoHeader::read_from(&mmap)
            .ok_or_else(|| invalid("file is shorter than the 12-byte header"))?;

        if header.ndata < 0 || header.ndim <= 0 {
            return Err(invalid(&format!(
                "nonsensical counts ndata={} ndim={}",
                header.ndata, header.ndim
            )));
        }

        let body = header.ndata as usize * header.ndim as usize * size_of::<f32>();
        if mmap.len() < DISCO_HEADER_BYTES + body {
            return Err(invalid(&format!(
                "body holds {} bytes but the header announces {}",
                mmap.len() - DISCO_HEADER_BYTES,
                body
            )));
        }

        debug!(
            path = %path.display(),
            len = mmap.len(),
            ndata = header.ndata,
            ndim = header.ndim,
            descrid = header.descrid,
            "mapped DISCO file"
        );

        Ok(DiscoFile { path, header, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> DiscoHeader {
        self.header
    }

    pub fn ndata(&self) -> usize {
        self.header.ndata as usize
    }

    pub fn ndim(&self) -> usize {
        self.header.ndim as usize
    }

    /// All vectors as one row-major slice.
    ///
    /// The body starts 12 bytes into a page-aligned mapping, so the
    /// cast can never be misaligned.
    pub fn data(&self) -> &[f32] {
        let body = &self.mmap[DISCO_HEADER_BYTES..]
            [..self.ndata() * self.ndim() * size_of::<f32>()];
        bytemuck::cast_slice(body)
    }

    /// Writes the first `nvec` vectors of this file behind an adjusted
    /// header. Returns the number of bytes written.
    pub fn write_truncated<W: Write>(&self, nvec: usize, mut writer: W) -> Result<usize> {
        let nvec = nvec.min(self.ndata());
        let header = DiscoHeader { ndata: nvec as i32, ..self.header };
        header.write_to(&mut writer)?;

        let body = &self.data()[..nvec * self.ndim()];
        let bytes: &[u8] = bytemuck::cast_slice(body);
        writer.write_all(bytes)?;

        Ok(DISCO_HEADER_BYTES + bytes.len())
    }
}
