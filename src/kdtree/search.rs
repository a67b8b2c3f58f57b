use crate::ObjectId;

use super::KdTree;

#[derive(Debug, Copy, Clone)]
pub(crate) struct StackElem {
    /// Node number in the implicit-heap layout.
    pub node: usize,
    /// Squared lower bound of the distances reachable below the node.
    pub dist: f32,
}

/// The LIFO the best-first search runs on, kept preallocated on the
/// tree so deep trees never touch the system stack.
#[derive(Debug, Default)]
pub(crate) struct SearchStack {
    buffer: Vec<StackElem>,
}

impl SearchStack {
    pub fn new() -> SearchStack {
        SearchStack::default()
    }

    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.buffer.capacity() {
            self.buffer.reserve(capacity.saturating_sub(self.buffer.len()));
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn push(&mut self, node: usize, dist: f32) {
        self.buffer.push(StackElem { node, dist });
    }

    pub fn pop(&mut self) -> Option<StackElem> {
        self.buffer.pop()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

/// Index of the first maximum of `array`.
fn max_arr(array: &[f32]) -> usize {
    let mut index = 0;
    let mut max = array[0];

    for (i, &x) in array.iter().enumerate().skip(1) {
        if x > max {
            index = i;
            max = x;
        }
    }

    index
}

impl<'s> KdTree<'s> {
    /// Returns the `k` nearest neighbours of `x` with their squared
    /// (weighted) Euclidean distances.
    ///
    /// `r > 0` restricts results to squared distances at or below `r`,
    /// so fewer than `k` neighbours may come back. With the sort flag
    /// on, results are ordered by ascending distance, ties preserving
    /// encounter order.
    pub fn search_knn(
        &mut self,
        x: &[f32],
        k: usize,
        r: f32,
        use_sigma: bool,
    ) -> Vec<(ObjectId, f32)> {
        if self.ndatatot == 0 {
            return Vec::new();
        }

        let k = k.max(1);
        let leaves_start = self.ninner;
        let sentinel = if r > 0.0 { r } else { f32::INFINITY };

        let mut dist = vec![sentinel; k];
        let mut indx = vec![ObjectId::new(0, 0); k];
        let mut kmax = 0;
        let mut nfilled = 0;

        let mut stack = std::mem::take(&mut self.stack);
        stack.clear();
        stack.push(0, 0.0);

        while let Some(cur) = stack.pop() {
            if stack.len() + 1 > self.profile.max_stack {
                self.profile.max_stack = stack.len() + 1;
            }

            // elimination rule
            if cur.dist > dist[kmax] {
                continue;
            }

            if cur.node >= leaves_start {
                // leaf node: search through the vectors linearly
                let node = self.nodes[cur.node];

                for i in node.start..node.start + node.size {
                    let v = self.vector_at(i);
                    let dxx = if use_sigma {
                        self.weighted_euclidean(x, v)
                    } else {
                        self.euclidean(x, v)
                    };

                    // strict against a filled worst slot, so ties keep
                    // the first-encountered object; while slots remain
                    // the radius bound stays inclusive
                    if dxx < dist[kmax] || (nfilled < k && dxx <= sentinel) {
                        if k == 1 {
                            indx[0] = self.object_at(i);
                            dist[0] = dxx;
                            nfilled = 1;
                        } else if self.sort {
                            let mut pos = kmax;

                            if kmax < k - 1 {
                                // first move or override the sentinel
                                dist[kmax + 1] = dist[kmax];
                                indx[kmax + 1] = indx[kmax];
                                kmax += 1;
                            }

                            // insert into the sorted list of distances
                            while pos > 0 && dxx < dist[pos - 1] {
                                dist[pos] = dist[pos - 1];
                                indx[pos] = indx[pos - 1];
                                pos -= 1;
                            }

                            indx[pos] = self.object_at(i);
                            dist[pos] = dxx;
                            if nfilled < k {
                                nfilled += 1;
                            }
                        } else {
                            // fill the next free slot before evicting
                            // the worst one
                            let pos = if nfilled < k { nfilled } else { kmax };
                            indx[pos] = self.object_at(i);
                            dist[pos] = dxx;
                            if nfilled < k {
                                nfilled += 1;
                            }
                            kmax = max_arr(&dist);
                        }
                    }
                }
            } else {
                // inner node: push both children, carrying the lower
                // bound through to the nearer one
                let d = self.dist_to_node(cur.node, x, use_sigma);

                if d < 0.0 {
                    stack.push(2 * cur.node + 2, cur.dist.max(d * d));
                    stack.push(2 * cur.node + 1, cur.dist);
                } else {
                    stack.push(2 * cur.node + 1, cur.dist.max(d * d));
                    stack.push(2 * cur.node + 2, cur.dist);
                }
            }
        }

        self.stack = stack;

        // trailing slots never filled under the radius keep their
        // sentinel distance and are not returned
        let found: Vec<(ObjectId, f32)> = indx.into_iter().zip(dist).take(nfilled).collect();

        self.profile.searches += 1;
        self.profile.neighbours += found.len();

        found
    }

    /// Squared Euclidean distance, optionally warped per dimension.
    fn euclidean(&mut self, x: &[f32], v: &[f32]) -> f32 {
        self.profile.v2v += 1;
        let mut sum = 0.0;
        for j in 0..self.ndim {
            let diff = self.warp_diff(j, v[j] - x[j]);
            sum += diff * diff;
        }
        sum
    }

    /// Squared weighted Euclidean distance over the non-zero sigma
    /// dimensions, optionally warped.
    fn weighted_euclidean(&mut self, x: &[f32], v: &[f32]) -> f32 {
        self.profile.v2v += 1;
        let mut sum = 0.0;
        for pos in 0..self.sigma_nnz.len() {
            let j = self.sigma_nnz[pos];
            let diff = self.warp_diff(j, v[j] - x[j]) / self.sigma[j];
            sum += diff * diff;
        }
        sum
    }
}
