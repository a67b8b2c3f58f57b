use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ObjectStore;

mod db;
mod kdtree;

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

/// An in-memory store of one block per entry of `blocks`, each a flat
/// row-major array of `dim` columns.
pub fn store_from_rows(dim: usize, descrid: i32, blocks: &[&[f32]]) -> ObjectStore {
    let mut store = ObjectStore::new(dim, descrid);
    for (i, block) in blocks.iter().enumerate() {
        store.push_vectors(format!("block{i}"), block.to_vec()).unwrap();
    }
    store
}

/// `n` unit vectors on a ring in ℝ².
pub fn ring_store(n: usize) -> ObjectStore {
    let data: Vec<f32> = (0..n)
        .flat_map(|i| {
            let angle = TAU * i as f32 / n as f32;
            [angle.cos(), angle.sin()]
        })
        .collect();

    let mut store = ObjectStore::new(2, 0);
    store.push_vectors("ring", data).unwrap();
    store
}

/// Angular distance between two ring positions out of `n`.
pub fn ring_distance(a: usize, b: usize, n: usize) -> usize {
    let diff = a.abs_diff(b);
    diff.min(n - diff)
}
