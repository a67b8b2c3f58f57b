use std::borrow::Cow;
use std::mem::size_of;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn, Unspecified, WithTls};
use tracing::debug;

use crate::compression::{Compressor, Deflate, Identity};
use crate::distance::Metric;
use crate::{Error, Mif, MifParams, ObjectId, Result, MIF_VERSION};

mod codec;
mod key;

pub use codec::{BinEntry, FileEntry, MifMetadata};
use codec::{BinEntryCodec, FileEntryCodec, MetadataCodec, RefObjCodec};
use key::{Key, KeyCodec, KeyMode, Prefix, PrefixCodec};

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// The LMDB-backed persistent storage of a metric inverted file.
///
/// One environment holds one index: the parameter record, the
/// data-file records, the reference objects and the posting-list bins,
/// each under its own [`KeyMode`] prefix.
pub struct MifDb {
    env: Env,
    database: Database<KeyCodec, Unspecified>,
}

impl MifDb {
    /// Opens (creating if needed) the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<MifDb> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: impl AsRef<Path>, map_size: usize) -> Result<MifDb> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        // safety: the environment directory is only opened once per
        // process by the tools using this adapter.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).open(path)? };

        let mut wtxn = env.write_txn()?;
        let database = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;

        debug!(path = %path.display(), "opened index database");
        Ok(MifDb { env, database })
    }

    /// Begins a write transaction wrapping `compressor` around every
    /// posting-list blob.
    pub fn writer<C: Compressor>(&self, compressor: C) -> Result<MifDbWriter<'_, C>> {
        let wtxn = self.env.write_txn()?;
        Ok(MifDbWriter { database: self.database, wtxn, compressor })
    }

    /// Begins a read transaction; fails with
    /// [`Error::MissingMetadata`] when no index was stored.
    pub fn reader(&self) -> Result<MifDbReader<'_>> {
        let rtxn = self.env.read_txn()?;
        let metadata = match self
            .database
            .remap_data_type::<MetadataCodec>()
            .get(&rtxn, &Key::metadata())?
        {
            Some(metadata) => metadata,
            None => return Err(Error::MissingMetadata),
        };

        Ok(MifDbReader { database: self.database, rtxn, metadata })
    }
}

/// A write transaction over the index database. Nothing is visible to
/// readers before [`MifDbWriter::commit`].
pub struct MifDbWriter<'t, C> {
    database: Database<KeyCodec, Unspecified>,
    wtxn: RwTxn<'t>,
    compressor: C,
}

impl<C: Compressor> MifDbWriter<'_, C> {
    /// Drops any previously stored index.
    pub fn clear(&mut self) -> Result<()> {
        self.database.clear(&mut self.wtxn)?;
        Ok(())
    }

    pub fn write_params(&mut self, metadata: &MifMetadata) -> Result<()> {
        self.database
            .remap_data_type::<MetadataCodec>()
            .put(&mut self.wtxn, &Key::metadata(), metadata)?;
        Ok(())
    }

    pub fn write_file(&mut self, index: u32, filename: &str, numobj: u32) -> Result<()> {
        let entry = FileEntry { numobj, filename: Cow::Borrowed(filename) };
        self.database
            .remap_data_type::<FileEntryCodec>()
            .put(&mut self.wtxn, &Key::file(index), &entry)?;
        Ok(())
    }

    pub fn write_ref(&mut self, index: u32, obj: ObjectId) -> Result<()> {
        self.database
            .remap_data_type::<RefObjCodec>()
            .put(&mut self.wtxn, &Key::refobj(index), &obj)?;
        Ok(())
    }

    /// Serialises one bin as little-endian (base, index) pairs,
    /// passing the blob through the compressor.
    pub fn write_bin(&mut self, refobj: u32, bin: u32, objs: &[ObjectId]) -> Result<()> {
        let mut raw = Vec::with_capacity(objs.len() * size_of::<ObjectId>());
        for obj in objs {
            raw.extend_from_slice(&obj.to_bytes());
        }

        let blob = self.compressor.compress(&raw)?;
        let entry = BinEntry { size: objs.len() as u32, blob: Cow::Owned(blob) };
        self.database
            .remap_data_type::<BinEntryCodec>()
            .put(&mut self.wtxn, &Key::bin(refobj, bin), &entry)?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        Ok(self.wtxn.commit()?)
    }
}

/// A read transaction over the index database with the parameter
/// record already loaded.
pub struct MifDbReader<'t> {
    database: Database<KeyCodec, Unspecified>,
    rtxn: RoTxn<'t, WithTls>,
    metadata: MifMetadata,
}

impl MifDbReader<'_> {
    pub fn metadata(&self) -> &MifMetadata {
        &self.metadata
    }

    /// All data-file records as (index, filename, numobj), in index
    /// order.
    pub fn files(&self) -> Result<Vec<(u32, String, u32)>> {
        let mut files = Vec::new();
        let iter = self
            .database
            .remap_types::<PrefixCodec, FileEntryCodec>()
            .prefix_iter(&self.rtxn, &Prefix::new(KeyMode::File))?
            .remap_key_type::<KeyCodec>();

        for result in iter {
            let (key, entry) = result?;
            files.push((key.a, entry.filename.into_owned(), entry.numobj));
        }
        Ok(files)
    }

    /// All reference objects as (index, object), in index order.
    pub fn refs(&self) -> Result<Vec<(u32, ObjectId)>> {
        let mut refs = Vec::new();
        let iter = self
            .database
            .remap_types::<PrefixCodec, RefObjCodec>()
            .prefix_iter(&self.rtxn, &Prefix::new(KeyMode::Ref))?
            .remap_key_type::<KeyCodec>();

        for result in iter {
            let (key, obj) = result?;
            refs.push((key.a, obj));
        }
        Ok(refs)
    }

    /// Enumerates every stored bin as (refobj, bin, objects, stored
    /// byte size), decompressing the blobs when the index was written
    /// compressed.
    pub fn bins(&self, mut f: impl FnMut(u32, u32, Vec<ObjectId>, usize)) -> Result<()> {
        let iter = self
            .database
            .remap_types::<PrefixCodec, BinEntryCodec>()
            .prefix_iter(&self.rtxn, &Prefix::new(KeyMode::Bin))?
            .remap_key_type::<KeyCodec>();

        for result in iter {
            let (key, entry) = result?;
            let expected = entry.size as usize * size_of::<ObjectId>();
            let stored_bytes = entry.blob.len();

            let raw = if self.metadata.compressed {
                Deflate.decompress(&entry.blob, expected)?
            } else {
                Identity.decompress(&entry.blob, expected)?
            };

            let objs = raw
                .chunks_exact(size_of::<ObjectId>())
                .map(|chunk| ObjectId::from_bytes(chunk).0)
                .collect();
            f(key.a, key.b, objs, stored_bytes);
        }
        Ok(())
    }
}

impl<'s, D: Metric> Mif<'s, D> {
    /// Dumps the whole index: parameters, data-file records,
    /// reference objects and posting-list bins, in one transaction.
    pub fn dump<C: Compressor>(&self, db: &MifDb, name: &str, compressor: C) -> Result<()> {
        let compressed = !compressor.is_identity();
        let mut writer = db.writer(compressor)?;
        writer.clear()?;

        let created_at =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        writer.write_params(&MifMetadata {
            version: MIF_VERSION,
            created_at,
            name: name.to_string(),
            numref: self.numref as u32,
            ki: self.ki as u32,
            ndim: self.store.dim() as u32,
            descrid: self.store.descrid(),
            compressed,
        })?;

        for base in 0..self.store.num_blocks() as u32 {
            writer.write_file(base, self.store.filename(base), self.store.num_objects(base) as u32)?;
        }

        for (index, &obj) in self.refobj.iter().enumerate() {
            writer.write_ref(index as u32, obj)?;
        }

        for (refidx, pl) in self.pls.iter().enumerate() {
            for bin in 0..pl.num_bins() {
                writer.write_bin(refidx as u32, bin as u32, pl.bin(bin).objects())?;
            }
        }

        writer.commit()
    }

    /// Rebuilds an index from storage over an already opened store.
    /// The store must carry the dimension and descriptor the index was
    /// built for; extra blocks (a query file) may follow the indexed
    /// ones.
    pub fn load(store: &'s crate::ObjectStore, metric: D, db: &MifDb) -> Result<Mif<'s, D>> {
        let reader = db.reader()?;
        let metadata = reader.metadata().clone();

        if metadata.ndim as usize != store.dim() || metadata.descrid != store.descrid() {
            return Err(Error::IncompatibleBlock {
                path: "<object store>".to_string(),
                expected_dim: metadata.ndim,
                received_dim: store.dim() as u32,
                expected_descr: metadata.descrid,
                received_descr: store.descrid(),
            });
        }

        let params =
            MifParams { numref: metadata.numref as usize, ki: metadata.ki as usize };
        let mut mif = Mif::new(store, metric, params)?;
        mif.numobj = reader.files()?.iter().map(|(_, _, numobj)| *numobj as usize).sum();

        mif.refobj = vec![ObjectId::new(0, 0); mif.numref];
        for (index, obj) in reader.refs()? {
            mif.refobj[index as usize] = obj;
        }

        let pls = &mut mif.pls;
        reader.bins(|refidx, bin, objs, stored_bytes| {
            pls[refidx as usize].bin_mut(bin as usize).set_loaded(objs, stored_bytes);
        })?;

        debug!(
            numref = mif.numref,
            ki = mif.ki,
            numobj = mif.num_objects(),
            "loaded index from database"
        );
        Ok(mif)
    }
}
