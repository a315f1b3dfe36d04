use crate::Bitmap256;

#[test]
fn test_set_get() {
    let mut bm = Bitmap256::new();
    assert!(bm.is_empty());
    for i in 0..=255u8 {
        assert!(!bm.get(i));
        bm.set(i, true);
        assert!(bm.get(i));
        assert_eq!(bm.count(), i as u32 + 1);
    }
    assert!(bm.is_full());
}

#[test]
fn test_union_intersect_subtract() {
    let evens: Bitmap256 = (0u8..=254).step_by(2).collect();
    let odds: Bitmap256 = (1u8..=255).step_by(2).collect();

    let mut all = evens.clone();
    all.union(&odds);
    assert!(all.is_full());

    let mut none = evens.clone();
    none.intersect(&odds);
    assert!(none.is_empty());

    let mut still_evens = all.clone();
    still_evens.subtract(&odds);
    assert_eq!(still_evens, evens);
}

#[test]
fn test_is_superset_of_shrinks_only() {
    let full = {
        let mut bm = Bitmap256::new();
        bm.set_all();
        bm
    };
    let mut partial = Bitmap256::new();
    partial.set(3, true);
    partial.set(7, true);

    assert!(full.is_superset_of(&partial));
    assert!(!partial.is_superset_of(&full));

    let mut smaller = partial.clone();
    smaller.set(7, false);
    assert!(partial.is_superset_of(&smaller));
    assert!(!smaller.is_superset_of(&partial));
}

#[test]
fn test_iter_matches_set_bits() {
    let ids = [0u8, 1, 64, 130, 255];
    let bm: Bitmap256 = ids.iter().copied().collect();
    let collected: Vec<u8> = bm.iter().collect();
    assert_eq!(collected, ids.to_vec());
}
