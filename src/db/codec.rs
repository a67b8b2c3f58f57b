use std::borrow::Cow;
use std::ffi::CStr;
use std::mem::size_of;

use byteorder::{BigEndian, ByteOrder};
use heed::BoxedError;

use crate::ObjectId;

/// The index-parameter record, stored once under the metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MifMetadata {
    /// Persistence format version.
    pub version: u32,
    /// Seconds since the epoch at dump time.
    pub created_at: u64,
    /// Name the index was stored under.
    pub name: String,
    pub numref: u32,
    pub ki: u32,
    pub ndim: u32,
    pub descrid: i32,
    /// Whether posting-list blobs went through deflate.
    pub compressed: bool,
}

pub enum MetadataCodec {}

impl<'a> heed::BytesEncode<'a> for MetadataCodec {
    type EItem = MifMetadata;

    fn bytes_encode(item: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        let MifMetadata { version, created_at, name, numref, ki, ndim, descrid, compressed } =
            item;
        debug_assert!(!name.as_bytes().iter().any(|&b| b == 0));

        let mut output = Vec::with_capacity(name.len() + 1 + 4 * size_of::<u32>() + 13);
        output.extend_from_slice(name.as_bytes());
        output.push(0);
        output.extend_from_slice(&version.to_be_bytes());
        output.extend_from_slice(&created_at.to_be_bytes());
        output.extend_from_slice(&numref.to_be_bytes());
        output.extend_from_slice(&ki.to_be_bytes());
        output.extend_from_slice(&ndim.to_be_bytes());
        output.extend_from_slice(&descrid.to_be_bytes());
        output.push(u8::from(*compressed));

        Ok(Cow::Owned(output))
    }
}

impl<'a> heed::BytesDecode<'a> for MetadataCodec {
    type DItem = MifMetadata;

    fn bytes_decode(bytes: &'a [u8]) -> Result<Self::DItem, BoxedError> {
        let name = CStr::from_bytes_until_nul(bytes)?.to_str()?.to_string();
        let bytes = &bytes[name.len() + 1..];
        let version = BigEndian::read_u32(bytes);
        let bytes = &bytes[size_of::<u32>()..];
        let created_at = BigEndian::read_u64(bytes);
        let bytes = &bytes[size_of::<u64>()..];
        let numref = BigEndian::read_u32(bytes);
        let bytes = &bytes[size_of::<u32>()..];
        let ki = BigEndian::read_u32(bytes);
        let bytes = &bytes[size_of::<u32>()..];
        let ndim = BigEndian::read_u32(bytes);
        let bytes = &bytes[size_of::<u32>()..];
        let descrid = BigEndian::read_i32(bytes);
        let bytes = &bytes[size_of::<i32>()..];
        let compressed = bytes[0] != 0;

        Ok(MifMetadata { version, created_at, name, numref, ki, ndim, descrid, compressed })
    }
}

/// One data-file record: object count and origin filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry<'a> {
    pub numobj: u32,
    pub filename: Cow<'a, str>,
}

pub enum FileEntryCodec {}

impl<'a> heed::BytesEncode<'a> for FileEntryCodec {
    type EItem = FileEntry<'a>;

    fn bytes_encode(item: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        let mut output = Vec::with_capacity(size_of::<u32>() + item.filename.len());
        output.extend_from_slice(&item.numobj.to_be_bytes());
        output.extend_from_slice(item.filename.as_bytes());

        Ok(Cow::Owned(output))
    }
}

impl<'a> heed::BytesDecode<'a> for FileEntryCodec {
    type DItem = FileEntry<'a>;

    fn bytes_decode(bytes: &'a [u8]) -> Result<Self::DItem, BoxedError> {
        let numobj = BigEndian::read_u32(bytes);
        let filename = std::str::from_utf8(&bytes[size_of::<u32>()..])?;

        Ok(FileEntry { numobj, filename: Cow::Borrowed(filename) })
    }
}

pub enum RefObjCodec {}

impl<'a> heed::BytesEncode<'a> for RefObjCodec {
    type EItem = ObjectId;

    fn bytes_encode(item: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        Ok(Cow::Owned(item.to_bytes().to_vec()))
    }
}

impl heed::BytesDecode<'_> for RefObjCodec {
    type DItem = ObjectId;

    fn bytes_decode(bytes: &[u8]) -> Result<Self::DItem, BoxedError> {
        let (obj, _) = ObjectId::from_bytes(bytes);
        Ok(obj)
    }
}

/// One stored posting-list bin: the entry count and the (possibly
/// deflated) blob of little-endian (base, index) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinEntry<'a> {
    pub size: u32,
    pub blob: Cow<'a, [u8]>,
}

pub enum BinEntryCodec {}

impl<'a> heed::BytesEncode<'a> for BinEntryCodec {
    type EItem = BinEntry<'a>;

    fn bytes_encode(item: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        let mut output = Vec::with_capacity(size_of::<u32>() + item.blob.len());
        output.extend_from_slice(&item.size.to_be_bytes());
        output.extend_from_slice(&item.blob);

        Ok(Cow::Owned(output))
    }
}

impl<'a> heed::BytesDecode<'a> for BinEntryCodec {
    type DItem = BinEntry<'a>;

    fn bytes_decode(bytes: &'a [u8]) -> Result<Self::DItem, BoxedError> {
        let size = BigEndian::read_u32(bytes);
        Ok(BinEntry { size, blob: Cow::Borrowed(&bytes[size_of::<u32>()..]) })
    }
}

#[cfg(test)]
mod test {
    use heed::{BytesDecode, BytesEncode};

    use super::*;

    #[test]
    fn metadata_codec() {
        let metadata = MifMetadata {
            version: 8,
            created_at: 1_264_982_400,
            name: "testindex".to_string(),
            numref: 632,
            ki: 158,
            ndim: 40,
            descrid: 2,
            compressed: true,
        };

        let encoded = MetadataCodec::bytes_encode(&metadata).unwrap();
        let decoded = MetadataCodec::bytes_decode(&encoded).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn file_entry_codec() {
        let entry = FileEntry { numobj: 1000, filename: Cow::Borrowed("data/frames.disco") };
        let encoded = FileEntryCodec::bytes_encode(&entry).unwrap();
        let decoded = FileEntryCodec::bytes_decode(&encoded).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn bin_entry_codec() {
        let blob: Vec<u8> =
            [ObjectId::new(0, 3), ObjectId::new(1, 7)].iter().flat_map(|o| o.to_bytes()).collect();
        let entry = BinEntry { size: 2, blob: Cow::Borrowed(&blob) };
        let encoded = BinEntryCodec::bytes_encode(&entry).unwrap();
        let decoded = BinEntryCodec::bytes_decode(&encoded).unwrap();
        assert_eq!(decoded, entry);
    }
}
