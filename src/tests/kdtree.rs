use proptest::collection::vec;
use proptest::prelude::*;

use super::store_from_rows;
use crate::{Bpf, Decomposition, KdTree, ObjectId, Pivot};

fn build_tree<'s>(
    store: &'s crate::ObjectStore,
    decomposition: Decomposition,
    pivot: Pivot,
    given_height: i32,
    use_sigma: bool,
) -> KdTree<'s> {
    let mut tree = KdTree::new(store);
    tree.set_decomposition(decomposition);
    tree.set_pivot(pivot);
    tree.set_given_height(given_height);
    tree.set_data();
    tree.init_nodes(None, None, None);
    tree.build(use_sigma);
    tree
}

#[test]
fn trivial_tree_single_object() {
    let store = store_from_rows(1, 0, &[&[3.14]]);
    let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);

    assert_eq!(tree.height(), 1);
    assert_eq!(tree.num_nodes(), 1);

    let found = tree.search_knn(&[3.14], 1, 0.0, false);
    assert_eq!(found, vec![(ObjectId::new(0, 0), 0.0)]);
}

#[test]
fn balanced_orthogonal_tree_on_corners() {
    // the four corners of the unit square, twice
    let corners: Vec<f32> = [[0., 0.], [0., 1.], [1., 0.], [1., 1.]]
        .iter()
        .cycle()
        .take(8)
        .flatten()
        .copied()
        .collect();
    let store = store_from_rows(2, 0, &[&corners]);
    let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, 3, false);

    assert_eq!(tree.height(), 3);
    assert_eq!(tree.num_nodes(), 7);
    assert_eq!(tree.num_inner_nodes(), 3);

    let found = tree.search_knn(&[0.1, 0.1], 3, 0.0, false);
    assert_eq!(found.len(), 3);

    // both (0, 0) objects first, then one of the distance-0.82 corners
    let ids: Vec<u32> = found.iter().map(|(obj, _)| obj.index).collect();
    assert!(ids[..2].contains(&0) && ids[..2].contains(&4));
    assert!((found[0].1 - 0.02).abs() < 1e-6);
    assert!((found[1].1 - 0.02).abs() < 1e-6);
    assert!((found[2].1 - 0.82).abs() < 1e-6);
}

#[test]
fn weighted_search_ignores_zero_sigma_dimension() {
    let rows: &[f32] = &[
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 10.0, 0.0, //
        0.0, 0.0, 100.0,
    ];
    let store = store_from_rows(3, 0, &[rows]);

    let mut tree = KdTree::new(&store);
    tree.set_data();
    tree.init_nodes(None, None, None);
    tree.set_sigma(vec![1.0, 1.0, 0.0]);
    tree.build(true);

    let found = tree.search_knn(&[0.0, 0.0, 0.0], 4, 0.0, true);
    let dists: Vec<f32> = found.iter().map(|&(_, d)| d).collect();
    assert_eq!(dists, vec![0.0, 0.0, 1.0, 100.0]);

    // objects 0 and 3 tie at zero, object 2 pays the full dim-1 gap
    let ids: Vec<u32> = found.iter().map(|(obj, _)| obj.index).collect();
    assert!(ids[..2].contains(&0) && ids[..2].contains(&3));
    assert_eq!(ids[2], 1);
    assert_eq!(ids[3], 2);
}

#[test]
fn search_on_empty_tree_finds_nothing() {
    let store = store_from_rows(2, 0, &[]);
    let mut tree = KdTree::new(&store);
    tree.set_data();
    tree.init_nodes(None, None, None);
    tree.build(false);

    assert!(tree.search_knn(&[0.0, 0.0], 5, 0.0, false).is_empty());
}

#[test]
fn height_is_clamped_to_the_data() {
    let store = store_from_rows(1, 0, &[&[0.0, 1.0, 2.0, 3.0]]);
    let mut tree = KdTree::new(&store);
    tree.set_given_height(10);
    let nnodes = tree.set_data();

    // ⌊log2 4⌋ = 2 levels at most
    assert_eq!(tree.height(), 2);
    assert_eq!(nnodes, 3);
}

#[test]
fn radius_restricts_results() {
    let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let store = store_from_rows(1, 0, &[&values]);
    let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);

    // squared radius 6.0 keeps values 0, 1, 2 around the query 0.5
    let found = tree.search_knn(&[0.5], 10, 6.0, false);
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|&(_, d)| d <= 6.0));
    assert!(found.windows(2).all(|w| w[0].1 <= w[1].1));

    // the radius is inclusive: value 3 sits at exactly (3 - 0.5)²
    let found = tree.search_knn(&[0.5], 10, 6.25, false);
    assert_eq!(found.len(), 4);
    assert_eq!(found[3], (ObjectId::new(0, 3), 6.25));
}

#[test]
fn unsorted_mode_finds_the_same_objects() {
    let values: Vec<f32> = (0..32).map(|i| (i as f32 * 7.3) % 11.0).collect();
    let store = store_from_rows(1, 0, &[&values]);

    let mut sorted = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);
    let mut unsorted = KdTree::new(&store);
    unsorted.set_sort(false);
    unsorted.set_data();
    unsorted.init_nodes(None, None, None);
    unsorted.build(false);

    let query = [4.2];
    let mut a = sorted.search_knn(&query, 5, 0.0, false);
    let mut b = unsorted.search_knn(&query, 5, 0.0, false);
    a.sort_by_key(|&(obj, _)| obj);
    b.sort_by_key(|&(obj, _)| obj);
    assert_eq!(a, b);
}

#[test]
fn multi_block_search_spans_all_blocks() {
    let store = store_from_rows(1, 0, &[&[0.0, 1.0], &[2.0, 3.0], &[4.0]]);
    let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);

    let found = tree.search_knn(&[2.1], 2, 0.0, false);
    assert_eq!(found[0].0, ObjectId::new(1, 0));
    assert_eq!(found[1].0, ObjectId::new(1, 1));
}

#[test]
fn warping_reshapes_distances() {
    let store = store_from_rows(1, 0, &[&[0.0, 2.0]]);
    let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);

    // doubles every coordinate difference over the covered domain
    let warp = Bpf::new(vec![(-10.0, -20.0), (10.0, 20.0)]).unwrap();
    tree.set_warp(0, Some(warp));

    let found = tree.search_knn(&[1.0], 2, 0.0, false);
    let dists: Vec<f32> = found.iter().map(|&(_, d)| d).collect();
    // |diff| = 1 each side, warped to 2, squared to 4
    assert_eq!(dists, vec![4.0, 4.0]);
}

#[test]
fn profile_counts_operations() {
    let values: Vec<f32> = (0..64).map(|i| i as f32).collect();
    let store = store_from_rows(1, 0, &[&values]);
    let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);

    tree.profile_clear();
    tree.search_knn(&[31.5], 4, 0.0, false);
    let profile = tree.profile();
    assert_eq!(profile.searches, 1);
    assert_eq!(profile.neighbours, 4);
    assert!(profile.v2v > 0);
    assert!(profile.max_stack > 0);
}

#[test]
fn tree_info_display() {
    let corners: Vec<f32> =
        [[0., 0.], [0., 1.], [1., 0.], [1., 1.]].iter().cycle().take(8).flatten().copied().collect();
    let store = store_from_rows(2, 0, &[&corners]);
    let tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, 3, false);

    insta::assert_snapshot!(tree.to_string(), @r###"
    Tree info:
    ndim        = 2
    ndata       = 8
    maxheight   = 3
    givenheight = 3
    height      = 3
    nnodes      = 7
    inner nodes = 3
    sort mode   = true
    decomposition = Orthogonal
    pivot         = Mean
    "###);
}

fn exhaustive_weighted(
    store: &crate::ObjectStore,
    query: &[f32],
    sigma: Option<&[f32]>,
) -> Vec<f32> {
    let mut dists = Vec::new();
    for obj in store.iter_ids() {
        let v = store.row(obj);
        let mut sum = 0.0f32;
        match sigma {
            Some(sigma) => {
                for j in 0..store.dim() {
                    if sigma[j] != 0.0 {
                        let diff = (v[j] - query[j]) / sigma[j];
                        sum += diff * diff;
                    }
                }
            }
            None => {
                for j in 0..store.dim() {
                    let diff = v[j] - query[j];
                    sum += diff * diff;
                }
            }
        }
        dists.push(sum);
    }
    dists.sort_by(f32::total_cmp);
    dists
}

proptest! {
    /// Node sizes add up and the root spans everything, whatever the
    /// configuration.
    #[test]
    fn sizes_are_consistent(
        dim in 1usize..4,
        rows in vec(vec(-100.0f32..100.0, 1..4), 1..48),
        hyperplane in any::<bool>(),
        pivot in 0u8..3,
        given_height in -2i32..5,
    ) {
        let data: Vec<f32> = rows.iter().flat_map(|r| {
            r.iter().cycle().take(dim).copied().collect::<Vec<_>>()
        }).collect();
        let store = store_from_rows(dim, 0, &[&data]);

        let decomposition =
            if hyperplane { Decomposition::Hyperplane } else { Decomposition::Orthogonal };
        let pivot = match pivot {
            0 => Pivot::Mean,
            1 => Pivot::Middle,
            _ => Pivot::Median,
        };
        let tree = build_tree(&store, decomposition, pivot, given_height, false);

        let m = rows.len();
        prop_assert_eq!(tree.node(0).size, m);
        for n in 0..tree.num_inner_nodes() {
            let node = tree.node(n);
            let left = tree.node(2 * n + 1);
            let right = tree.node(2 * n + 2);
            prop_assert_eq!(node.size, left.size + right.size);
            prop_assert_eq!(left.start, node.start);
            prop_assert_eq!(right.start, node.start + left.size);
        }
    }

    /// Orthogonal splits put every left object at or below the pivot
    /// and every right object above it, unless the node is degenerate
    /// on its split dimension.
    #[test]
    fn orthogonal_split_sides(
        rows in vec(vec(-50.0f32..50.0, 2), 2..40),
        pivot in 0u8..2,
    ) {
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        let store = store_from_rows(2, 0, &[&data]);
        let pivot = if pivot == 0 { Pivot::Mean } else { Pivot::Middle };
        let tree = build_tree(&store, Decomposition::Orthogonal, pivot, 0, false);

        for n in 0..tree.num_inner_nodes() {
            let node = tree.node(n);
            if node.size == 0 {
                continue;
            }

            let dim = node.split_dim;
            let values: Vec<f32> = (node.start..node.start + node.size)
                .map(|i| store.row(tree.permutation()[i])[dim])
                .collect();
            let degenerate = values.iter().all(|&x| x == values[0]);
            if degenerate {
                continue;
            }

            let pivot_value = tree.node_mean(n)[dim];
            let left = tree.node(2 * n + 1);
            for i in left.start..left.start + left.size {
                prop_assert!(store.row(tree.permutation()[i])[dim] <= pivot_value);
            }
            let right = tree.node(2 * n + 2);
            for i in right.start..right.start + right.size {
                prop_assert!(store.row(tree.permutation()[i])[dim] > pivot_value);
            }
        }
    }

    /// A full-size search returns the same distances as exhaustive
    /// comparison against every object.
    #[test]
    fn full_search_matches_exhaustive(
        rows in vec(vec(-20.0f32..20.0, 3), 1..32),
        query in vec(-20.0f32..20.0, 3),
        sigma in vec(0.0f32..3.0, 3),
        hyperplane in any::<bool>(),
    ) {
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        let store = store_from_rows(3, 0, &[&data]);
        let m = rows.len();

        let decomposition =
            if hyperplane { Decomposition::Hyperplane } else { Decomposition::Orthogonal };

        // unweighted
        let mut tree = build_tree(&store, decomposition, Pivot::Mean, -1, false);
        let mut found: Vec<f32> =
            tree.search_knn(&query, m, 0.0, false).iter().map(|&(_, d)| d).collect();
        found.sort_by(f32::total_cmp);
        prop_assert_eq!(&found, &exhaustive_weighted(&store, &query, None));

        // weighted, possibly with disabled dimensions
        let mut tree = KdTree::new(&store);
        tree.set_data();
        tree.init_nodes(None, None, None);
        tree.set_sigma(sigma.clone());
        tree.build(true);
        if sigma.iter().any(|&s| s != 0.0) {
            let mut found: Vec<f32> =
                tree.search_knn(&query, m, 0.0, true).iter().map(|&(_, d)| d).collect();
            found.sort_by(f32::total_cmp);
            prop_assert_eq!(&found, &exhaustive_weighted(&store, &query, Some(&sigma)));
        }
    }

    /// Sorted searches return ascending distances and at most k
    /// results.
    #[test]
    fn search_results_are_sorted_and_bounded(
        rows in vec(vec(-10.0f32..10.0, 2), 1..40),
        query in vec(-10.0f32..10.0, 2),
        k in 1usize..8,
        r in 0.0f32..50.0,
    ) {
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        let store = store_from_rows(2, 0, &[&data]);
        let mut tree = build_tree(&store, Decomposition::Orthogonal, Pivot::Mean, -1, false);

        let found = tree.search_knn(&query, k, r, false);
        prop_assert!(found.len() <= k);
        prop_assert!(found.windows(2).all(|w| w[0].1 <= w[1].1));
        if r > 0.0 {
            prop_assert!(found.iter().all(|&(_, d)| d <= r));
        }
    }
}
