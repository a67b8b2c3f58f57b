use rand::Rng;
use tracing::{debug, warn};

use crate::distance::Metric;
use crate::{Mif, ObjectId};

/// Generates `k` distinct random indices out of `0..n`, sorted
/// ascending: draw `k` values mod `n`, sort, resample duplicates until
/// none remain.
pub(crate) fn choose_k_from_n<R: Rng>(rng: &mut R, k: usize, n: usize) -> Vec<usize> {
    if k >= n {
        warn!(k, n, "illegal parameters for choose k from n");
        return (0..k).map(|i| i % n).collect();
    }

    let mut sample: Vec<usize> = (0..k).map(|_| rng.gen_range(0..n)).collect();

    loop {
        sample.sort_unstable();

        let mut doubles = 0;
        for i in 1..k {
            if sample[i - 1] == sample[i] {
                sample[i] = rng.gen_range(0..n);
                doubles += 1;
            }
        }

        if doubles == 0 {
            return sample;
        }
        debug!(k, n, doubles, "resampling duplicate reference indices");
    }
}

impl<'s, D: Metric> Mif<'s, D> {
    /// Bulk loads the whole store into the index: samples the
    /// reference objects, then distributes every object into the
    /// posting lists of its `ki` closest references at their rank
    /// positions.
    ///
    /// The random source drives reference sampling only; the same
    /// seed, data and parameters reproduce the index exactly.
    pub fn build<R: Rng>(&mut self, rng: &mut R) {
        let numobj = self.store.num_objects_total();

        if numobj == 0 {
            warn!("store is empty, nothing to index");
            return;
        }
        if self.numref == 0 || self.ki == 0 {
            warn!(numref = self.numref, ki = self.ki, "nothing to index with");
            return;
        }

        self.numobj = numobj;
        self.sample_references(rng, numobj);
        self.index_objects();

        // sort posting lists so the stored blobs compress better
        for pl in &mut self.pls {
            pl.sort_bins();
        }

        debug!(
            numobj,
            numref = self.numref,
            ki = self.ki,
            distances = self.profile.o2o,
            "built index"
        );
    }

    /// Chooses the reference objects: `numref` distinct flat indices,
    /// mapped back to (base, index) pairs through the cumulative block
    /// sizes.
    fn sample_references<R: Rng>(&mut self, rng: &mut R, numobj: usize) {
        let mut running = 0;
        let cumobj: Vec<usize> = (0..self.store.num_blocks() as u32)
            .map(|b| {
                running += self.store.num_objects(b);
                running
            })
            .collect();

        self.refobj.clear();
        for flat in choose_k_from_n(rng, self.numref, numobj) {
            let base = cumobj.partition_point(|&cum| cum <= flat);
            let before = if base == 0 { 0 } else { cumobj[base - 1] };
            self.refobj.push(ObjectId::new(base as u32, (flat - before) as u32));
        }
    }

    /// Finds, for every object, its `ki` closest reference objects by
    /// sorted insertion and appends the object to the rank-matching
    /// bins.
    fn index_objects(&mut self) {
        let ki = self.ki;
        let mut dist = vec![f32::INFINITY; ki];
        let mut indx = vec![0usize; ki];

        for obj in self.store.iter_ids() {
            dist.fill(f32::INFINITY);
            let mut kmax = 0;

            for r in 0..self.numref {
                let d = self.metric.distance(self.store, self.refobj[r], obj);
                self.profile.o2o += 1;

                if d <= dist[kmax] {
                    let mut pos = kmax;

                    if kmax < ki - 1 {
                        dist[kmax + 1] = dist[kmax];
                        indx[kmax + 1] = indx[kmax];
                        kmax += 1;
                    }

                    while pos > 0 && d < dist[pos - 1] {
                        dist[pos] = dist[pos - 1];
                        indx[pos] = indx[pos - 1];
                        pos -= 1;
                    }

                    indx[pos] = r;
                    dist[pos] = d;
                }
            }

            // indx now lists the ki closest references by distance
            for (rank, &r) in indx.iter().enumerate().take(kmax + 1) {
                self.pls[r].append(obj, rank);
            }
        }
    }
}
