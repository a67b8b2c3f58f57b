use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use super::{Decomposition, KdTree, Node, Pivot};

impl<'s> KdTree<'s> {
    /// Builds the tree by decomposing every inner node level by level
    /// and partitioning the object-index permutation in place.
    ///
    /// With `use_sigma` the split dimensions cycle through the
    /// non-zero-sigma list and node distances are weighted.
    pub fn build(&mut self, use_sigma: bool) {
        if self.ndatatot == 0 {
            warn!("tree is empty, nothing to build");
            return;
        }
        if self.ndim == 0 {
            warn!("tree has 0 dimensions, can't build");
            return;
        }
        if self.height == 0 || (1usize << (self.height - 1)) > self.ndatatot {
            warn!(
                height = self.height,
                ndata = self.ndatatot,
                "can't build this tree, try a smaller height"
            );
            return;
        }

        for level in 0..self.height - 1 {
            let nstart = (1usize << level) - 1;
            let nend = (1usize << (level + 1)) - 1;

            for n in nstart..nend {
                let node = self.nodes[n];

                let left_size = if node.size == 0 {
                    // empty node passed down from a singleton parent
                    0
                } else if self.decompose_node(n, level, use_sigma) {
                    self.partition(n, use_sigma)
                } else {
                    // degenerate node: all points on the split plane,
                    // halve the range instead
                    debug!(node = n, level, "degenerate node, splitting at the middle");
                    (node.size + 1) / 2
                };

                debug_assert!(2 * n + 2 < self.nnodes);
                self.nodes[2 * n + 1] =
                    Node { start: node.start, size: left_size, ..Node::default() };
                self.nodes[2 * n + 2] = Node {
                    start: node.start + left_size,
                    size: node.size - left_size,
                    ..Node::default()
                };
            }
        }
    }

    /// Chooses the split dimension and computes the pivot and split
    /// plane of node `n`. Returns false when the node is degenerate,
    /// i.e. no candidate dimension distinguishes any two objects.
    fn decompose_node(&mut self, n: usize, level: usize, use_sigma: bool) -> bool {
        self.profile.mean += 1;

        let mut nice_node = false;
        let mut split_dim = 0;

        // cycle through candidate dimensions starting at the level,
        // trying each at most once
        if use_sigma && !self.sigma_nnz.is_empty() {
            for i in 0..self.sigma_nnz.len() {
                split_dim = self.sigma_nnz[(level + i) % self.sigma_nnz.len()];
                if self.check_node(n, split_dim) {
                    nice_node = true;
                    break;
                }
            }
        } else {
            for i in 0..self.ndim {
                split_dim = (level + i) % self.ndim;
                if self.check_node(n, split_dim) {
                    nice_node = true;
                    break;
                }
            }
        }

        self.nodes[n].split_dim = split_dim;
        if !nice_node {
            warn!(
                node = n,
                level, split_dim, "can't find non-degenerate dimension to split node"
            );
        }

        let dim = match self.decomposition {
            Decomposition::Orthogonal => Some(split_dim),
            Decomposition::Hyperplane => None,
        };
        match self.pivot {
            Pivot::Mean => self.compute_mean(n, dim),
            Pivot::Middle => self.compute_middle(n, dim),
            Pivot::Median => self.compute_median(n, dim),
        }

        self.compute_splitplane(n);

        nice_node
    }

    /// Whether any two objects of node `n` differ on dimension `dim`.
    fn check_node(&self, n: usize, dim: usize) -> bool {
        let node = self.nodes[n];
        let mut min = self.vector_at(node.start)[dim];
        let mut max = min;

        for i in node.start + 1..=node.end() {
            let x = self.vector_at(i)[dim];
            min = min.min(x);
            max = max.max(x);
        }

        max != min
    }

    /// Mean pivot over one dimension or, with `dim == None`, all of
    /// them.
    fn compute_mean(&mut self, n: usize, dim: Option<usize>) {
        let node = self.nodes[n];
        let dims = dim.map_or(0..self.ndim, |d| d..d + 1);

        for j in dims {
            let mut sum = 0.0;
            for i in node.start..=node.end() {
                sum += self.vector_at(i)[j];
            }
            self.means[n * self.ndim + j] = sum / node.size as f32;
        }
    }

    /// Midpoint pivot between min and max.
    fn compute_middle(&mut self, n: usize, dim: Option<usize>) {
        let node = self.nodes[n];
        let dims = dim.map_or(0..self.ndim, |d| d..d + 1);

        for j in dims {
            let mut min = self.vector_at(node.start)[j];
            let mut max = min;
            for i in node.start..=node.end() {
                let x = self.vector_at(i)[j];
                min = min.min(x);
                max = max.max(x);
            }
            self.means[n * self.ndim + j] = (max + min) / 2.0;
        }
    }

    /// Lower-median pivot, selected on a scratch copy of the node
    /// values.
    fn compute_median(&mut self, n: usize, dim: Option<usize>) {
        let node = self.nodes[n];
        let dims = dim.map_or(0..self.ndim, |d| d..d + 1);

        let mut scratch = Vec::with_capacity(node.size);
        for j in dims {
            scratch.clear();
            scratch.extend((node.start..=node.end()).map(|i| OrderedFloat(self.vector_at(i)[j])));
            let mid = (node.size - 1) / 2;
            let (_, median, _) = scratch.select_nth_unstable(mid);
            self.means[n * self.ndim + j] = median.0;
        }
    }

    /// Creates the node-splitting hyperplane. The split vector is the
    /// unit vector of the split dimension; in orthogonal mode it stays
    /// implicit.
    fn compute_splitplane(&mut self, n: usize) {
        self.profile.hyperplane += 1;

        if self.decomposition == Decomposition::Hyperplane {
            let split_dim = self.nodes[n].split_dim;
            let row = n * self.ndim;
            self.splits[row..row + self.ndim].fill(0.0);
            self.splits[row + split_dim] = 1.0;
        }

        self.nodes[n].split_norm = 1.0;
    }

    /// Two-pointer sweep moving every object with a non-positive
    /// signed distance to the split plane to the left of the range.
    /// Only permutation entries are swapped, never data. Returns the
    /// size of the left part.
    fn partition(&mut self, n: usize, use_sigma: bool) -> usize {
        let node = self.nodes[n];
        let (start, end) = (node.start, node.end());
        let mut i = start;
        let mut j = end;

        loop {
            while i <= j && self.dist_at_to_node(i, n, use_sigma) <= 0.0 {
                i += 1;
            }
            while j > i && self.dist_at_to_node(j, n, use_sigma) > 0.0 {
                j -= 1;
            }
            if i < j {
                self.dataindex.swap(i, j);
            } else {
                break;
            }
        }

        i - start
    }

    fn dist_at_to_node(&mut self, pos: usize, n: usize, use_sigma: bool) -> f32 {
        let x = self.vector_at(pos);
        self.dist_to_node(n, x, use_sigma)
    }

    /// Signed distance from a vector to the split plane of node `n`.
    pub(crate) fn dist_to_node(&mut self, n: usize, x: &[f32], use_sigma: bool) -> f32 {
        self.profile.v2n += 1;
        let node = self.nodes[n];
        let row = n * self.ndim;

        match self.decomposition {
            Decomposition::Orthogonal => {
                let j = node.split_dim;
                let diff = self.warp_diff(j, x[j] - self.means[row + j]);
                if use_sigma {
                    if self.sigma[j] != 0.0 {
                        diff / self.sigma[j]
                    } else {
                        0.0
                    }
                } else {
                    diff
                }
            }
            Decomposition::Hyperplane => {
                let mut dot = 0.0;
                if use_sigma {
                    for pos in 0..self.sigma_nnz.len() {
                        let j = self.sigma_nnz[pos];
                        let diff = self.warp_diff(j, x[j] - self.means[row + j]);
                        dot += diff / self.sigma[j] * self.splits[row + j];
                    }
                } else {
                    for j in 0..self.ndim {
                        let diff = self.warp_diff(j, x[j] - self.means[row + j]);
                        dot += diff * self.splits[row + j];
                    }
                }
                dot / node.split_norm
            }
        }
    }

    /// Applies the warping function of dimension `j` to a coordinate
    /// difference, when one is installed.
    pub(crate) fn warp_diff(&self, j: usize, diff: f32) -> f32 {
        match &self.warps[j] {
            Some(bpf) => bpf.interpolate(diff),
            None => diff,
        }
    }
}
