use tracing::{debug, warn};

use crate::distance::Metric;
use crate::{Mif, ObjectId};

impl<'s, D: Metric> Mif<'s, D> {
    /// Returns the approximate `k` nearest neighbours of `query` with
    /// their accumulated rank-difference scores, smallest first.
    ///
    /// The query object addresses the store like any other object; a
    /// query file is typically appended to the store as an extra
    /// block. `ks` reference objects are consulted and their posting
    /// list bins scanned within a rank window of ±`mpd`; candidates
    /// accumulate `|query rank − stored rank|` and the `k` smallest
    /// accumulators win, ties resolved in first-seen order.
    pub fn search_knn(&mut self, query: ObjectId, k: usize) -> Vec<(ObjectId, u32)> {
        if self.refobj.is_empty() {
            warn!("index is empty, was it built?");
            return Vec::new();
        }

        let k = k.max(1);
        let ks = match self.ks {
            0 => {
                warn!("search parameters not set, consulting all ki references");
                self.ki
            }
            ks => ks,
        };

        // 1. the ks nearest reference objects and their ordering
        let ranked = self.rank_references(query, ks);

        // 2. accumulate rank differences over the posting-list bins
        //    within the position window
        self.hash.clear();
        for (j, &(r, _)) in ranked.iter().enumerate() {
            self.profile.placcess += 1;
            let pl = &self.pls[r];

            let lo = j.saturating_sub(self.mpd);
            let hi = (self.ki - 1).min(j + self.mpd);

            for stored_rank in lo..=hi {
                let bin = pl.bin(stored_rank);
                self.profile.plbinaccess += 1;
                self.profile.indexaccess += bin.len();
                self.profile.indexaccess_bytes += bin.stored_bytes();

                let contribution = j.abs_diff(stored_rank) as u32;
                for &obj in bin.objects() {
                    self.hash.add(obj, contribution);
                }
            }
        }

        self.profile.searches += 1;
        self.profile.numhashobj += self.hash.len();
        self.profile.numhashalloc = self.profile.numhashalloc.max(self.hash.num_cells_allocated());
        self.profile.numhashbin = self.profile.numhashbin.max(self.hash.num_slots());

        // 3. extract the k smallest accumulators; iterating the cells
        //    in first-seen order with a strict comparison keeps ties
        //    stable
        let mut dist = vec![u32::MAX; k];
        let mut best = vec![ObjectId::new(0, 0); k];
        let mut kmax = 0;

        for (obj, score) in self.hash.iter() {
            if score < dist[kmax] {
                let mut pos = kmax;

                if kmax < k - 1 {
                    dist[kmax + 1] = dist[kmax];
                    best[kmax + 1] = best[kmax];
                    kmax += 1;
                }

                while pos > 0 && score < dist[pos - 1] {
                    dist[pos] = dist[pos - 1];
                    best[pos] = best[pos - 1];
                    pos -= 1;
                }

                best[pos] = obj;
                dist[pos] = score;
            }
        }

        let found: Vec<(ObjectId, u32)> =
            best.into_iter().zip(dist).filter(|&(_, d)| d != u32::MAX).collect();

        debug!(query = %query, k, found = found.len(), "mif query");
        found
    }

    /// Distances from `query` to all reference objects, reduced to the
    /// `ks` closest by sorted insertion. Returns (reference index,
    /// distance) pairs in rank order.
    fn rank_references(&mut self, query: ObjectId, ks: usize) -> Vec<(usize, f32)> {
        let mut dist = vec![f32::INFINITY; ks];
        let mut indx = vec![0usize; ks];
        let mut kmax = 0;
        let mut found = 0usize;

        for r in 0..self.numref {
            let d = self.metric.distance(self.store, self.refobj[r], query);
            self.profile.o2o += 1;

            if d <= dist[kmax] {
                let mut pos = kmax;

                if kmax < ks - 1 {
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
                found += 1;
            }
        }

        let found = found.min(ks);
        indx.into_iter().zip(dist).take(found).collect()
    }
}
