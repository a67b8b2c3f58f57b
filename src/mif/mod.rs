use std::fmt;

use crate::distance::Metric;
use crate::{Error, ObjectId, ObjectStore, Result};

mod build;
mod hash;
mod posting;
mod query;

#[cfg(test)]
pub(crate) use build::choose_k_from_n;
pub(crate) use hash::ObjectHash;
pub use posting::{Bin, PostingList};

/// Build parameters of a metric inverted file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MifParams {
    /// Number of reference objects.
    pub numref: usize,
    /// Number of reference objects each data object is indexed under.
    pub ki: usize,
}

impl MifParams {
    /// The recommended parameters for `m` objects:
    /// `numref = 2·√m` and `ki = numref/4`.
    pub fn defaults_for(m: usize) -> MifParams {
        let numref = (2.0 * (m as f64).sqrt()).floor() as usize;
        MifParams { numref: numref.max(1), ki: (numref / 4).max(1) }
    }
}

/// Counters of internal operations, purely observational.
#[derive(Debug, Default, Clone, Copy)]
pub struct MifProfile {
    /// Object to object distance calculations.
    pub o2o: usize,
    /// Searches performed.
    pub searches: usize,
    /// Posting lists accessed.
    pub placcess: usize,
    /// Posting list bins accessed.
    pub plbinaccess: usize,
    /// Index entries accessed in posting list bins.
    pub indexaccess: usize,
    /// (Compressed) bytes accessed above.
    pub indexaccess_bytes: usize,
    /// Hashed objects used for searching.
    pub numhashobj: usize,
    /// Hashed objects allocated for searching.
    pub numhashalloc: usize,
    /// Hash table slots allocated for searching.
    pub numhashbin: usize,
}

impl MifProfile {
    pub fn clear(&mut self) {
        *self = MifProfile::default();
    }
}

impl fmt::Display for MifProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "object to object distances: {}", self.o2o)?;
        writeln!(f, "searches performed:         {}", self.searches)?;
        writeln!(f, "posting lists accessed:     {}", self.placcess)?;
        writeln!(f, "posting list bins accessed: {}", self.plbinaccess)?;
        writeln!(f, "index entries accessed:     {}", self.indexaccess)?;
        writeln!(f, "index bytes accessed:       {}", self.indexaccess_bytes)?;
        writeln!(f, "hashed objects used:        {}", self.numhashobj)?;
        writeln!(f, "hashed objects allocated:   {}", self.numhashalloc)?;
        write!(f, "hash slots allocated:       {}", self.numhashbin)
    }
}

/// A metric inverted file: an approximate similarity index over the
/// objects of a store, anchored on `numref` randomly sampled reference
/// objects.
///
/// Only reference identities and posting lists are held; the objects
/// themselves stay in the caller-owned store. Distances go through the
/// caller-supplied [`Metric`], bound to the store at construction.
pub struct Mif<'s, D: Metric> {
    pub(crate) store: &'s ObjectStore,
    pub(crate) metric: D,

    pub(crate) numref: usize,
    pub(crate) ki: usize,
    /// Number of reference objects consulted per query.
    pub(crate) ks: usize,
    /// Maximum position difference for posting-list lookup.
    pub(crate) mpd: usize,

    /// Number of indexed objects, fixed at build or load time.
    pub(crate) numobj: usize,
    pub(crate) refobj: Vec<ObjectId>,
    pub(crate) pls: Vec<PostingList>,
    pub(crate) hash: ObjectHash,
    pub(crate) profile: MifProfile,
}

impl<'s, D: Metric> Mif<'s, D> {
    /// Creates an empty index over `store` with `params`, binding the
    /// metric to the store. `ki` is clamped to `numref`.
    pub fn new(store: &'s ObjectStore, mut metric: D, params: MifParams) -> Result<Mif<'s, D>> {
        metric.bind(store)?;

        let numref = params.numref;
        let ki = params.ki.min(numref);

        Ok(Mif {
            store,
            metric,
            numref,
            ki,
            ks: 0,
            mpd: 0,
            numobj: 0,
            refobj: Vec::with_capacity(numref),
            pls: (0..numref).map(|_| PostingList::new(ki, ki)).collect(),
            hash: ObjectHash::new(),
            profile: MifProfile::default(),
        })
    }

    /// Sets the query parameters; both must stay within `ki`.
    pub fn set_search_params(&mut self, ks: usize, mpd: usize) -> Result<()> {
        if ks > self.ki || mpd > self.ki {
            return Err(Error::UnmatchingParameters { ks, mpd, ki: self.ki });
        }
        self.ks = ks;
        self.mpd = mpd;
        Ok(())
    }

    pub fn store(&self) -> &'s ObjectStore {
        self.store
    }

    pub fn numref(&self) -> usize {
        self.numref
    }

    pub fn ki(&self) -> usize {
        self.ki
    }

    pub fn ks(&self) -> usize {
        self.ks
    }

    pub fn mpd(&self) -> usize {
        self.mpd
    }

    /// Total number of indexed objects.
    pub fn num_objects(&self) -> usize {
        self.numobj
    }

    pub fn reference_objects(&self) -> &[ObjectId] {
        &self.refobj
    }

    pub fn posting_list(&self, refidx: usize) -> &PostingList {
        &self.pls[refidx]
    }

    pub fn profile(&self) -> &MifProfile {
        &self.profile
    }

    pub fn profile_clear(&mut self) {
        self.profile.clear();
    }
}

impl<D: Metric> fmt::Display for Mif<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MIF index:")?;
        writeln!(f, "numobj = {}", self.num_objects())?;
        writeln!(f, "numref = {}", self.numref)?;
        writeln!(f, "ki     = {}", self.ki)?;
        writeln!(f, "ks     = {}", self.ks)?;
        writeln!(f, "mpd    = {}", self.mpd)?;
        let entries: usize = self.pls.iter().map(PostingList::size).sum();
        write!(f, "posting list entries = {entries}")
    }
}
