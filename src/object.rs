use std::fmt;
use std::mem::size_of;

use byteorder::{ByteOrder, LittleEndian};

/// Identifies one data vector: the number of its data block and its row
/// inside that block.
///
/// /!\ This must stay exactly 8 bytes without padding: posting-list
/// blobs are raw arrays of this layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectId {
    /// The data block this object lives in.
    pub base: u32,
    /// The row inside the block.
    pub index: u32,
}

impl ObjectId {
    pub const fn new(base: u32, index: u32) -> Self {
        Self { base, index }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut output = [0; 8];
        LittleEndian::write_u32(&mut output[..4], self.base);
        LittleEndian::write_u32(&mut output[4..], self.index);
        output
    }

    pub fn from_bytes(bytes: &[u8]) -> (Self, &[u8]) {
        let base = LittleEndian::read_u32(bytes);
        let index = LittleEndian::read_u32(&bytes[size_of::<u32>()..]);

        (Self { base, index }, &bytes[2 * size_of::<u32>()..])
    }
}

impl fmt::Display for ObjectId {
    /// The `base.index` notation of the query-result file format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.index)
    }
}
