use tracing::debug;

use crate::{ObjectId, ObjectStore, Result};

/// A pluggable distance over store objects.
///
/// The metric inverted file only ever compares objects through this
/// trait; it is the whole contract between the index and the data. A
/// metric may hold private precomputed state, set up by [`Metric::bind`]
/// when the index is attached to a store and released on drop.
///
/// Implementations should be symmetric and zero on identity; neither is
/// enforced. Methods take `&mut self` so scratch buffers survive across
/// the Θ(M·numref) calls of a build.
pub trait Metric {
    /// Called once when binding the metric to an object store.
    fn bind(&mut self, _store: &ObjectStore) -> Result<()> {
        Ok(())
    }

    /// A non-negative scalar distance between two objects.
    fn distance(&mut self, store: &ObjectStore, a: ObjectId, b: ObjectId) -> f32;
}

/// Euclidean distance over whole DISCO rows.
#[derive(Debug, Clone, Default)]
pub struct DiscoEuclidean;

impl Metric for DiscoEuclidean {
    fn distance(&mut self, store: &ObjectStore, a: ObjectId, b: ObjectId) -> f32 {
        let va = store.row(a);
        let vb = store.row(b);
        va.iter().zip(vb).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
    }
}

/// Symmetrised Kullback-Leibler divergence over DISCO frames that hold
/// a mean vector followed by two N×N covariance blocks.
///
/// The frame layout skips the leading time value, so for dimension
/// `ndim` the model size is `N = (−1 + √(1 + 8(ndim−1)))/4`; the
/// covariance blocks start at offsets `r1 = N` and `r2 = N² + N`.
#[derive(Debug, Clone, Default)]
pub struct KlsDivergence {
    n: usize,
    r1: usize,
    r2: usize,
    diff: Vec<f32>,
}

impl Metric for KlsDivergence {
    fn bind(&mut self, store: &ObjectStore) -> Result<()> {
        let ndim = store.dim() as f64;
        self.n = ((-1.0 + (1.0 + 8.0 * (ndim - 1.0)).sqrt()) / 4.0) as usize;
        self.r1 = self.n;
        self.r2 = self.n * self.n + self.n;
        self.diff = vec![0.0; self.n];

        debug!(n = self.n, ndim = store.dim(), "bound KLS metric");
        Ok(())
    }

    fn distance(&mut self, store: &ObjectStore, a: ObjectId, b: ObjectId) -> f32 {
        let n = self.n;
        // first element of each frame is the time tag
        let v1 = &store.row(a)[1..];
        let v2 = &store.row(b)[1..];

        for i in 0..n {
            self.diff[i] = v1[i] - v2[i];
        }

        let mut t1 = 0.0f64;
        let mut t2 = 0.0f64;
        let mut s1 = 0.0f64;
        let mut s2 = 0.0f64;

        for i in 0..n {
            let mut tmp1 = 0.0f64;
            let mut tmp2 = 0.0f64;

            for j in 0..n {
                t1 += f64::from(v2[j + i * n + self.r2]) * f64::from(v1[i + j * n + self.r1]);
                t2 += f64::from(v2[j + i * n + self.r1]) * f64::from(v1[i + j * n + self.r2]);

                tmp1 += f64::from(v2[i + j * n + self.r2]) * f64::from(self.diff[j]);
                tmp2 += f64::from(v1[i + j * n + self.r2]) * f64::from(self.diff[j]);
            }

            s1 += tmp1 * f64::from(self.diff[i]) - 1.0;
            s2 += tmp2 * f64::from(self.diff[i]) - 1.0;
        }

        let dist = (s1 + s2 + t1 + t2) / 4.0;
        dist.max(0.0) as f32
    }
}
