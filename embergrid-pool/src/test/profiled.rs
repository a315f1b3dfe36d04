use test_log::test;

use crate::ProfiledPool;

#[test]
fn test_stats_track_hits_and_misses() {
    let pool: ProfiledPool<Vec<u8>> = ProfiledPool::new(4, Vec::new);

    let a = pool.acquire();
    let b = pool.acquire();
    assert_eq!(pool.stats().misses, 2);
    assert_eq!(pool.stats().hits, 0);

    pool.release(a);
    let _c = pool.acquire();
    let stats = pool.stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 1);

    pool.release(b);
}

#[test]
fn test_high_water_tracks_peak_outstanding() {
    let pool: ProfiledPool<u64> = ProfiledPool::new(4, || 0);

    let a = pool.acquire();
    let b = pool.acquire();
    let c = pool.acquire();
    assert_eq!(pool.stats().high_water, 3);

    pool.release(a);
    pool.release(b);
    let _d = pool.acquire();
    assert_eq!(
        pool.stats().high_water,
        3,
        "high water should remain at the historical peak"
    );

    pool.release(c);
}
