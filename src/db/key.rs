use std::borrow::Cow;
use std::mem::size_of;

use byteorder::{BigEndian, ByteOrder};
use heed::BoxedError;

/// What a database key addresses.
///
/// /!\ Changing the values of the enum is DB-breaking /!\
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyMode {
    /// The single index-parameter record.
    Metadata = 0,
    /// One data-file record per block.
    File = 1,
    /// One reference-object record per sampled object.
    Ref = 2,
    /// One posting-list bin per (reference, rank) pair.
    Bin = 3,
}

impl TryFrom<u8> for KeyMode {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            v if v == KeyMode::Metadata as u8 => Ok(KeyMode::Metadata),
            v if v == KeyMode::File as u8 => Ok(KeyMode::File),
            v if v == KeyMode::Ref as u8 => Ok(KeyMode::Ref),
            v if v == KeyMode::Bin as u8 => Ok(KeyMode::Bin),
            v => Err(format!("Could not convert {v} as a `KeyMode`.")),
        }
    }
}

/// A key of the index database.
///
/// /!\ This must fit on exactly 9 bytes without padding: the mode
/// discriminates the record kind and the big-endian pair keeps records
/// of one kind enumerable in (a, b) order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key {
    pub mode: KeyMode,
    pub a: u32,
    pub b: u32,
}

impl Key {
    pub const fn metadata() -> Self {
        Self { mode: KeyMode::Metadata, a: 0, b: 0 }
    }

    pub const fn file(index: u32) -> Self {
        Self { mode: KeyMode::File, a: index, b: 0 }
    }

    pub const fn refobj(index: u32) -> Self {
        Self { mode: KeyMode::Ref, a: index, b: 0 }
    }

    pub const fn bin(refobj: u32, bin: u32) -> Self {
        Self { mode: KeyMode::Bin, a: refobj, b: bin }
    }

    pub fn to_bytes(&self) -> [u8; 9] {
        let mut output = [0; 9];
        output[0] = self.mode as u8;
        BigEndian::write_u32(&mut output[1..5], self.a);
        BigEndian::write_u32(&mut output[5..], self.b);
        output
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Key, BoxedError> {
        let mode = KeyMode::try_from(bytes[0])?;
        let a = BigEndian::read_u32(&bytes[1..]);
        let b = BigEndian::read_u32(&bytes[1 + size_of::<u32>()..]);

        Ok(Key { mode, a, b })
    }
}

pub enum KeyCodec {}

impl<'a> heed::BytesEncode<'a> for KeyCodec {
    type EItem = Key;

    fn bytes_encode(key: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        Ok(Cow::Owned(key.to_bytes().to_vec()))
    }
}

impl heed::BytesDecode<'_> for KeyCodec {
    type DItem = Key;

    fn bytes_decode(bytes: &[u8]) -> Result<Self::DItem, BoxedError> {
        Key::from_bytes(bytes)
    }
}

/// Addresses all the keys of one mode for prefix iteration.
#[derive(Debug, Copy, Clone)]
pub struct Prefix {
    mode: KeyMode,
}

impl Prefix {
    pub const fn new(mode: KeyMode) -> Self {
        Self { mode }
    }
}

pub enum PrefixCodec {}

impl<'a> heed::BytesEncode<'a> for PrefixCodec {
    type EItem = Prefix;

    fn bytes_encode(prefix: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        Ok(Cow::Owned(vec![prefix.mode as u8]))
    }
}
