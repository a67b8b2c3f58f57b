//! Similarity search over externally-owned audio descriptor data.
//!
//! Two index structures share the same object model (data blocks of
//! fixed-dimension `f32` row vectors, objects addressed by
//! [`ObjectId`]):
//!
//! - [`KdTree`]: a k-dimensional binary search tree with weighted
//!   Euclidean distance and configurable space decomposition, answering
//!   exact k-NN queries with early pruning.
//! - [`Mif`]: a metric inverted file, an approximate index over an
//!   arbitrary metric space given by a caller-supplied [`Metric`],
//!   persistable to LMDB through [`MifDb`].

mod bpf;
mod compression;
mod db;
mod disco;
mod distance;
mod error;
mod kdtree;
mod mif;
mod object;
mod store;

#[cfg(test)]
mod tests;

pub use bpf::Bpf;
pub use compression::{Compressor, Deflate, Identity};
pub use db::{BinEntry, FileEntry, MifDb, MifDbReader, MifDbWriter, MifMetadata};
pub use disco::{DiscoFile, DiscoHeader, DISCO_HEADER_BYTES};
pub use distance::{DiscoEuclidean, KlsDivergence, Metric};
pub use error::Error;
pub use kdtree::{Decomposition, KdTree, Node, Pivot, TreeProfile};
pub use mif::{Bin, Mif, MifParams, MifProfile, PostingList};
pub use object::ObjectId;
pub use store::{Block, ObjectStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Persistence format version, stored in the index metadata record.
pub const MIF_VERSION: u32 = 8;
