use super::{ring_store, rng};
use crate::{
    Deflate, DiscoEuclidean, Error, Identity, Mif, MifDb, MifParams, ObjectId, MIF_VERSION,
};

const TEST_MAP_SIZE: usize = 64 * 1024 * 1024;

fn build_ring_index(store: &crate::ObjectStore) -> Mif<'_, DiscoEuclidean> {
    let mut index =
        Mif::new(store, DiscoEuclidean, MifParams { numref: 20, ki: 5 }).unwrap();
    index.build(&mut rng());
    index
}

#[test]
fn reader_without_index_reports_missing_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let db = MifDb::open_with_map_size(dir.path().join("index"), TEST_MAP_SIZE).unwrap();

    assert!(matches!(db.reader(), Err(Error::MissingMetadata)));
}

#[test]
fn round_trip_preserves_the_index() {
    let store = ring_store(100);
    let index = build_ring_index(&store);

    let dir = tempfile::tempdir().unwrap();
    let db = MifDb::open_with_map_size(dir.path().join("index"), TEST_MAP_SIZE).unwrap();
    index.dump(&db, "ring-index", Identity).unwrap();

    let reader = db.reader().unwrap();
    let metadata = reader.metadata();
    assert_eq!(metadata.version, MIF_VERSION);
    assert_eq!(metadata.name, "ring-index");
    assert_eq!(metadata.numref, 20);
    assert_eq!(metadata.ki, 5);
    assert_eq!(metadata.ndim, 2);
    assert_eq!(metadata.descrid, 0);
    assert!(!metadata.compressed);

    assert_eq!(reader.files().unwrap(), vec![(0, "block0".to_string(), 100)]);

    let refs = reader.refs().unwrap();
    assert_eq!(refs.len(), 20);
    for (i, obj) in refs {
        assert_eq!(obj, index.reference_objects()[i as usize]);
    }
    drop(reader);

    let loaded = Mif::load(&store, DiscoEuclidean, &db).unwrap();
    assert_eq!(loaded.numref(), index.numref());
    assert_eq!(loaded.ki(), index.ki());
    assert_eq!(loaded.num_objects(), 100);
    assert_eq!(loaded.reference_objects(), index.reference_objects());

    for r in 0..20 {
        for bin in 0..5 {
            assert_eq!(
                loaded.posting_list(r).bin(bin).objects(),
                index.posting_list(r).bin(bin).objects(),
                "bin ({r}, {bin}) differs after the round trip"
            );
        }
    }
}

#[test]
fn compressed_round_trip_preserves_bin_contents() {
    let store = ring_store(100);
    let index = build_ring_index(&store);

    let dir = tempfile::tempdir().unwrap();
    let db = MifDb::open_with_map_size(dir.path().join("index"), TEST_MAP_SIZE).unwrap();
    index.dump(&db, "ring-index", Deflate).unwrap();

    {
        let reader = db.reader().unwrap();
        assert!(reader.metadata().compressed);
    }

    let loaded = Mif::load(&store, DiscoEuclidean, &db).unwrap();
    for r in 0..20 {
        for bin in 0..5 {
            let original = index.posting_list(r).bin(bin);
            let restored = loaded.posting_list(r).bin(bin);
            assert_eq!(original.objects(), restored.objects());
            // the stored blob size survives in the alloc field
            if !restored.is_empty() {
                assert!(restored.alloc() > 0);
            }
        }
    }
}

#[test]
fn identical_queries_after_reload() {
    let store = ring_store(100);
    let mut index = build_ring_index(&store);
    index.set_search_params(10, 3).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let db = MifDb::open_with_map_size(dir.path().join("index"), TEST_MAP_SIZE).unwrap();
    index.dump(&db, "ring-index", Deflate).unwrap();

    let mut loaded = Mif::load(&store, DiscoEuclidean, &db).unwrap();
    loaded.set_search_params(10, 3).unwrap();

    for i in [0u32, 17, 42, 99] {
        let query = ObjectId::new(0, i);
        assert_eq!(index.search_knn(query, 10), loaded.search_knn(query, 10));
    }
}

#[test]
fn load_rejects_an_incompatible_store() {
    let store = ring_store(64);
    let index = build_ring_index(&store);

    let dir = tempfile::tempdir().unwrap();
    let db = MifDb::open_with_map_size(dir.path().join("index"), TEST_MAP_SIZE).unwrap();
    index.dump(&db, "ring-index", Identity).unwrap();

    let other = super::store_from_rows(3, 7, &[&[0.0, 0.0, 0.0]]);
    assert!(matches!(
        Mif::load(&other, DiscoEuclidean, &db),
        Err(Error::IncompatibleBlock { .. })
    ));
}

#[test]
fn dump_overwrites_a_previous_index() {
    let store = ring_store(100);
    let index = build_ring_index(&store);

    let small_store = ring_store(36);
    let mut small = Mif::new(&small_store, DiscoEuclidean, MifParams { numref: 12, ki: 3 }).unwrap();
    small.build(&mut rng());

    let dir = tempfile::tempdir().unwrap();
    let db = MifDb::open_with_map_size(dir.path().join("index"), TEST_MAP_SIZE).unwrap();
    index.dump(&db, "big", Identity).unwrap();
    small.dump(&db, "small", Identity).unwrap();

    let reader = db.reader().unwrap();
    assert_eq!(reader.metadata().name, "small");
    assert_eq!(reader.metadata().numref, 12);
    assert_eq!(reader.refs().unwrap().len(), 12);

    let mut bins = 0;
    reader.bins(|_, _, _, _| bins += 1).unwrap();
    assert_eq!(bins, 12 * 3);
}
