use crate::ObjectId;

/// One rank slot of a posting list: the objects for which the owning
/// reference object is their (rank+1)-th closest reference.
#[derive(Debug, Default, Clone)]
pub struct Bin {
    objs: Vec<ObjectId>,
    /// Byte size of the stored blob this bin was loaded from, kept for
    /// the accessed-bytes profiling of queries. Zero for bins that
    /// never went through storage.
    stored_bytes: usize,
}

impl Bin {
    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    pub fn objects(&self) -> &[ObjectId] {
        &self.objs
    }

    /// Capacity in objects or, after a load from storage, bytes of the
    /// stored blob divided by the object size.
    pub fn alloc(&self) -> usize {
        if self.stored_bytes != 0 {
            self.stored_bytes / std::mem::size_of::<ObjectId>()
        } else {
            self.objs.capacity()
        }
    }

    pub(crate) fn stored_bytes(&self) -> usize {
        if self.stored_bytes != 0 {
            self.stored_bytes
        } else {
            self.objs.len() * std::mem::size_of::<ObjectId>()
        }
    }

    pub(crate) fn set_loaded(&mut self, objs: Vec<ObjectId>, stored_bytes: usize) {
        self.objs = objs;
        self.stored_bytes = stored_bytes;
    }
}

/// The posting list of one reference object: `ki` bins indexed by rank
/// position.
#[derive(Debug, Default, Clone)]
pub struct PostingList {
    bins: Vec<Bin>,
}

impl PostingList {
    /// Allocates `ki` bins with room for `capacity_per_bin` objects
    /// each.
    pub fn new(ki: usize, capacity_per_bin: usize) -> PostingList {
        let bins = (0..ki)
            .map(|_| Bin { objs: Vec::with_capacity(capacity_per_bin), stored_bytes: 0 })
            .collect();
        PostingList { bins }
    }

    /// Appends an object to the bin of rank position `rank`, growing
    /// it as needed.
    pub fn append(&mut self, obj: ObjectId, rank: usize) {
        self.bins[rank].objs.push(obj);
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin(&self, rank: usize) -> &Bin {
        &self.bins[rank]
    }

    pub(crate) fn bin_mut(&mut self, rank: usize) -> &mut Bin {
        &mut self.bins[rank]
    }

    /// The objects of one rank position, in bin order.
    pub fn iter(&self, rank: usize) -> impl Iterator<Item = ObjectId> + '_ {
        self.bins[rank].objs.iter().copied()
    }

    /// Total number of objects over all bins.
    pub fn size(&self) -> usize {
        self.bins.iter().map(Bin::len).sum()
    }

    /// Sorts every bin by (base, index) to improve the
    /// compressibility of the stored blobs.
    pub(crate) fn sort_bins(&mut self) {
        for bin in &mut self.bins {
            bin.objs.sort_unstable();
        }
    }
}
