use std::fmt;

use tracing::debug;

use crate::bpf::Bpf;
use crate::{ObjectId, ObjectStore};

mod build;
mod search;

pub(crate) use search::SearchStack;

/// How the data space is split at each tree level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Decomposition {
    /// Split orthogonal to one dimension (fastest tree building).
    #[default]
    Orthogonal,
    /// Split by an axis-orthogonal hyperplane carrying an explicit
    /// normal vector.
    Hyperplane,
}

/// How the pivot a node is split at is computed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Pivot {
    /// Mean of the values on the split dimension(s).
    #[default]
    Mean,
    /// Midpoint between min and max.
    Middle,
    /// True median, for a well-balanced tree.
    Median,
}

/// One node of the tree. Nodes only address ranges of the object-index
/// permutation; vector data is never moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Node {
    /// Index of the first permutation entry of this node.
    pub start: usize,
    /// Number of objects in this node.
    pub size: usize,
    /// Dimension the node is split along.
    pub split_dim: usize,
    /// Spatial length of the split vector.
    pub split_norm: f32,
}

impl Node {
    /// Index of the last permutation entry. Only meaningful when
    /// `size > 0`.
    pub fn end(&self) -> usize {
        self.start + self.size - 1
    }
}

/// Counters of internal operations, purely observational.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeProfile {
    /// Vector to vector distances.
    pub v2v: usize,
    /// Vector to node distances.
    pub v2n: usize,
    /// Pivot vector calculations.
    pub mean: usize,
    /// Split plane calculations.
    pub hyperplane: usize,
    /// Searches performed.
    pub searches: usize,
    /// Neighbours found.
    pub neighbours: usize,
    /// Highest search stack size.
    pub max_stack: usize,
}

impl TreeProfile {
    pub fn clear(&mut self) {
        *self = TreeProfile::default();
    }
}

impl fmt::Display for TreeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vector to vector distances: {}", self.v2v)?;
        writeln!(f, "vector to node distances:   {}", self.v2n)?;
        writeln!(f, "pivot vector calculations:  {}", self.mean)?;
        writeln!(f, "split plane calculations:   {}", self.hyperplane)?;
        writeln!(f, "searches performed:         {}", self.searches)?;
        writeln!(f, "neighbours found:           {}", self.neighbours)?;
        write!(f, "highest stack size:         {}", self.max_stack)
    }
}

/// A k-dimensional binary search tree over the union of the data
/// blocks of an [`ObjectStore`].
///
/// Call sequence:
/// 1. [`KdTree::new`] over a store,
/// 2. set parameters ([`set_decomposition`], [`set_pivot`],
///    [`set_sort`], [`set_given_height`]),
/// 3. [`set_data`], which plans heights and returns the node count,
/// 4. [`init_nodes`], optionally handing back recycled buffers,
/// 5. optionally [`set_sigma`] and [`set_warp`],
/// 6. [`build`],
/// 7. query with [`search_knn`].
///
/// [`set_decomposition`]: KdTree::set_decomposition
/// [`set_pivot`]: KdTree::set_pivot
/// [`set_sort`]: KdTree::set_sort
/// [`set_given_height`]: KdTree::set_given_height
/// [`set_data`]: KdTree::set_data
/// [`init_nodes`]: KdTree::init_nodes
/// [`set_sigma`]: KdTree::set_sigma
/// [`set_warp`]: KdTree::set_warp
/// [`build`]: KdTree::build
/// [`search_knn`]: KdTree::search_knn
pub struct KdTree<'s> {
    pub(crate) store: &'s ObjectStore,
    pub(crate) decomposition: Decomposition,
    pub(crate) pivot: Pivot,
    pub(crate) sort: bool,
    given_height: i32,

    pub(crate) ndim: usize,
    pub(crate) ndatatot: usize,
    pub(crate) height: usize,
    max_height: usize,
    pub(crate) nnodes: usize,
    pub(crate) ninner: usize,

    /// The object-index permutation, the only mutable state after
    /// build.
    pub(crate) dataindex: Vec<ObjectId>,
    pub(crate) nodes: Vec<Node>,
    /// Mean vectors of the inner nodes, `ninner` rows of `ndim`.
    pub(crate) means: Vec<f32>,
    /// Split normal vectors, `ninner` rows of `ndim`; empty in
    /// orthogonal mode.
    pub(crate) splits: Vec<f32>,

    /// 1/weight per dimension, 0 meaning: ignore this dimension.
    pub(crate) sigma: Vec<f32>,
    /// Indices of the non-zero sigma dimensions.
    pub(crate) sigma_nnz: Vec<usize>,
    /// Optional per-dimension warping of coordinate differences.
    pub(crate) warps: Vec<Option<Bpf>>,

    pub(crate) stack: SearchStack,
    pub(crate) profile: TreeProfile,
}

impl<'s> KdTree<'s> {
    pub fn new(store: &'s ObjectStore) -> KdTree<'s> {
        let ndim = store.dim();
        KdTree {
            store,
            decomposition: Decomposition::default(),
            pivot: Pivot::default(),
            sort: true,
            // -1 gives fewer comparisons than -2
            given_height: -1,
            ndim,
            ndatatot: 0,
            height: 0,
            max_height: 0,
            nnodes: 0,
            ninner: 0,
            dataindex: Vec::new(),
            nodes: Vec::new(),
            means: Vec::new(),
            splits: Vec::new(),
            sigma: vec![1.0; ndim],
            sigma_nnz: (0..ndim).collect(),
            warps: (0..ndim).map(|_| None).collect(),
            stack: SearchStack::new(),
            profile: TreeProfile::default(),
        }
    }

    pub fn set_decomposition(&mut self, mode: Decomposition) {
        self.decomposition = mode;
    }

    pub fn set_pivot(&mut self, mode: Pivot) {
        self.pivot = mode;
    }

    /// Whether search results are kept sorted by distance.
    pub fn set_sort(&mut self, sort: bool) {
        self.sort = sort;
    }

    /// Positive values give the tree height directly; zero or negative
    /// values are added to the maximal height. The height is clamped
    /// to `[1, ⌊log2 M⌋]` by [`KdTree::set_data`].
    pub fn set_given_height(&mut self, height: i32) {
        self.given_height = height;
    }

    /// Plans the tree over the current store content: computes the
    /// clamped height, sizes the permutation and the search stack, and
    /// fills the permutation with all objects in block order.
    ///
    /// Returns the number of nodes the tree will build.
    pub fn set_data(&mut self) -> usize {
        self.ndim = self.store.dim();
        self.ndatatot = self.store.num_objects_total();

        if self.ndatatot == 0 {
            self.max_height = 0;
            self.height = 0;
            self.nnodes = 0;
            self.ninner = 0;
            self.dataindex.clear();
            return 0;
        }

        self.max_height = self.ndatatot.ilog2() as usize;
        let height = match self.given_height {
            h if h > 0 => h as i64,
            h => self.max_height as i64 + h as i64,
        };
        // minimum of one node still allows a linear search
        self.height = height.clamp(1, self.max_height.max(1) as i64) as usize;

        self.nnodes = (1 << self.height) - 1;
        self.ninner = (1 << (self.height - 1)) - 1;

        self.dataindex.clear();
        self.dataindex.extend(self.store.iter_ids());

        // heuristic margin of 4 times the height
        self.stack.grow(4 * self.height);

        if self.sigma.len() != self.ndim {
            self.sigma = vec![1.0; self.ndim];
            self.sigma_nnz = (0..self.ndim).collect();
        }
        if self.warps.len() != self.ndim {
            self.warps = (0..self.ndim).map(|_| None).collect();
        }

        debug!(
            ndata = self.ndatatot,
            ndim = self.ndim,
            height = self.height,
            max_height = self.max_height,
            nnodes = self.nnodes,
            "planned tree"
        );

        self.nnodes
    }

    /// Attaches node, mean and split storage, either recycled buffers
    /// or freshly allocated ones, and installs the root node over the
    /// whole permutation.
    pub fn init_nodes(
        &mut self,
        nodes: Option<Vec<Node>>,
        means: Option<Vec<f32>>,
        splits: Option<Vec<f32>>,
    ) {
        self.nodes = nodes.unwrap_or_default();
        self.nodes.clear();
        self.nodes.resize(self.nnodes, Node::default());

        self.means = means.unwrap_or_default();
        self.means.clear();
        self.means.resize(self.ninner * self.ndim, 0.0);

        self.splits = splits.unwrap_or_default();
        self.splits.clear();
        if self.decomposition == Decomposition::Hyperplane {
            self.splits.resize(self.ninner * self.ndim, 0.0);
        }

        if self.nnodes > 0 {
            self.nodes[0] = Node { start: 0, size: self.ndatatot, ..Node::default() };
        }
    }

    /// Sets the per-dimension weight vector and recomputes the
    /// non-zero index list. The weight is 1/σ; σ = 0 disables a
    /// dimension.
    pub fn set_sigma(&mut self, sigma: Vec<f32>) {
        self.sigma_nnz = sigma
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != 0.0)
            .map(|(j, _)| j)
            .collect();
        self.sigma = sigma;
    }

    /// Installs or removes the warping function of one dimension.
    pub fn set_warp(&mut self, dim: usize, warp: Option<Bpf>) {
        self.warps[dim] = warp;
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_nodes(&self) -> usize {
        self.nnodes
    }

    pub fn num_inner_nodes(&self) -> usize {
        self.ninner
    }

    pub fn num_objects(&self) -> usize {
        self.ndatatot
    }

    pub fn profile(&self) -> &TreeProfile {
        &self.profile
    }

    pub fn profile_clear(&mut self) {
        self.profile.clear();
    }

    /// The node at position `n` of the implicit-heap layout.
    pub fn node(&self, n: usize) -> Node {
        self.nodes[n]
    }

    /// The object-index permutation, in node order after a build.
    pub fn permutation(&self) -> &[ObjectId] {
        &self.dataindex
    }

    /// The pivot vector of inner node `n`.
    pub fn node_mean(&self, n: usize) -> &[f32] {
        self.mean_row(n)
    }

    /// The object at permutation position `i`.
    pub(crate) fn object_at(&self, i: usize) -> ObjectId {
        self.dataindex[i]
    }

    /// The data vector at permutation position `i`.
    pub(crate) fn vector_at(&self, i: usize) -> &'s [f32] {
        self.store.row(self.dataindex[i])
    }

    pub(crate) fn mean_row(&self, node: usize) -> &[f32] {
        &self.means[node * self.ndim..(node + 1) * self.ndim]
    }
}

impl fmt::Display for KdTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tree info:")?;
        writeln!(f, "ndim        = {}", self.ndim)?;
        writeln!(f, "ndata       = {}", self.ndatatot)?;
        writeln!(f, "maxheight   = {}", self.max_height)?;
        writeln!(f, "givenheight = {}", self.given_height)?;
        writeln!(f, "height      = {}", self.height)?;
        writeln!(f, "nnodes      = {}", self.nnodes)?;
        writeln!(f, "inner nodes = {}", self.ninner)?;
        writeln!(f, "sort mode   = {}", self.sort)?;
        writeln!(f, "decomposition = {:?}", self.decomposition)?;
        write!(f, "pivot         = {:?}", self.pivot)
    }
}
