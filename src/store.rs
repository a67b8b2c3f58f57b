use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::disco::DiscoFile;
use crate::{Error, ObjectId, Result};

/// One read-only block of row vectors, either a memory-mapped DISCO
/// file or an in-memory array.
pub enum Block {
    Mapped(DiscoFile),
    Owned { name: String, data: Vec<f32>, nobj: usize },
}

impl Block {
    fn nobj(&self) -> usize {
        match self {
            Block::Mapped(file) => file.ndata(),
            Block::Owned { nobj, .. } => *nobj,
        }
    }

    fn name(&self) -> &str {
        match self {
            Block::Mapped(file) => file.path().to_str().unwrap_or("<non-utf8 path>"),
            Block::Owned { name, .. } => name,
        }
    }

    fn data(&self) -> &[f32] {
        match self {
            Block::Mapped(file) => file.data(),
            Block::Owned { data, .. } => data,
        }
    }
}

/// A read-only collection of data blocks sharing one vector dimension
/// and descriptor ID.
///
/// The store owns its mappings but never copies vector data; indexes
/// built over it only hold [`ObjectId`]s.
pub struct ObjectStore {
    dim: usize,
    descrid: i32,
    blocks: Vec<Block>,
}

impl ObjectStore {
    pub fn new(dim: usize, descrid: i32) -> ObjectStore {
        ObjectStore { dim, descrid, blocks: Vec::new() }
    }

    /// Maps a DISCO file and appends it as the next block. The first
    /// appended block may also be used to fix `dim`/`descrid` through
    /// [`ObjectStore::from_files`]; any later mismatch is rejected
    /// without touching the store.
    pub fn map_file(&mut self, path: impl AsRef<Path>) -> Result<u32> {
        let file = DiscoFile::open(path)?;
        let header = file.header();

        if header.ndim as usize != self.dim || header.descrid != self.descrid {
            return Err(Error::IncompatibleBlock {
                path: file.path().display().to_string(),
                expected_dim: self.dim as u32,
                received_dim: header.ndim as u32,
                expected_descr: self.descrid,
                received_descr: header.descrid,
            });
        }

        self.blocks.push(Block::Mapped(file));
        Ok(self.blocks.len() as u32 - 1)
    }

    /// Opens all `paths` as one store; the first file fixes the
    /// dimension and descriptor ID.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<ObjectStore> {
        let mut paths = paths.iter();
        let first = match paths.next() {
            Some(first) => DiscoFile::open(first)?,
            None => return Ok(ObjectStore::new(0, 0)),
        };

        let mut store = ObjectStore::new(first.ndim(), first.header().descrid);
        store.blocks.push(Block::Mapped(first));
        for path in paths {
            store.map_file(path)?;
        }

        debug!(
            blocks = store.num_blocks(),
            objects = store.num_objects_total(),
            dim = store.dim,
            "opened object store"
        );
        Ok(store)
    }

    /// Appends an in-memory block of `data.len() / dim` vectors.
    pub fn push_vectors(&mut self, name: impl Into<String>, data: Vec<f32>) -> Result<u32> {
        if self.dim == 0 || data.len() % self.dim != 0 {
            return Err(Error::InvalidVecDimension {
                expected: self.dim,
                received: data.len(),
            });
        }

        let nobj = data.len() / self.dim;
        self.blocks.push(Block::Owned { name: name.into(), data, nobj });
        Ok(self.blocks.len() as u32 - 1)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn descrid(&self) -> i32 {
        self.descrid
    }

    pub fn num_objects(&self, base: u32) -> usize {
        self.blocks[base as usize].nobj()
    }

    /// Total object count over all blocks.
    pub fn num_objects_total(&self) -> usize {
        self.blocks.iter().map(Block::nobj).sum()
    }

    pub fn filename(&self, base: u32) -> &str {
        self.blocks[base as usize].name()
    }

    /// The `dim` contiguous floats of one object, valid for the
    /// lifetime of the store.
    pub fn row(&self, obj: ObjectId) -> &[f32] {
        let start = obj.index as usize * self.dim;
        &self.blocks[obj.base as usize].data()[start..start + self.dim]
    }

    /// All objects in block order, the order the tree permutation is
    /// initialised in.
    pub fn iter_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            (0..block.nobj() as u32).map(move |i| ObjectId::new(b as u32, i))
        })
    }
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("dim", &self.dim)
            .field("descrid", &self.descrid)
            .field("blocks", &self.blocks.iter().map(Block::name).collect::<Vec<_>>())
            .finish()
    }
}
