//! End-to-end behavior of databases over real files on disk.

mod common;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use elevdb::post::DTED_NULL;
use elevdb::{
    AccessMode, DatabaseBuilder, ElevationDatabase, GeoPoint, GeoidModel, GridGeoid,
};
use tempfile::TempDir;

use common::{gradient, write_dted, write_srtm, DtedFixture, DTED_HEADER_LEN};

/// Undulation rising 1 m per degree of longitude east of 0° and 0.5 m per
/// degree of latitude north of -90°.
fn sloped_geoid() -> GridGeoid {
    let mut values = Vec::new();
    for row in 0..3 {
        let lat = 90.0 - row as f64 * 90.0;
        for col in 0..5 {
            let lon = col as f64 * 90.0;
            values.push((lat + 90.0) * 0.5 + lon);
        }
    }
    GridGeoid::new("sloped", (-90.0, 90.0, 0.0, 360.0), (90.0, 90.0), values).unwrap()
}

fn dted_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_dted(dir.path(), "w081/n27.dt1", &DtedFixture::new(27, -81, 11).with_posts(gradient));
    dir
}

#[test]
fn scenario_a_dted_root() {
    let dir = dted_root();
    let db = DatabaseBuilder::new(dir.path()).open_dted().unwrap();

    let height = db.height_above_msl(&GeoPoint::new(27.5, -80.5));
    assert!(height.is_finite());
    assert_relative_eq!(height, 505.0);

    // Between posts: row 4.5, col 5.5.
    assert_relative_eq!(
        db.height_above_msl(&GeoPoint::new(27.55, -80.45)),
        455.5,
        epsilon = 1e-9
    );

    let far = GeoPoint::new(50.0, 50.0);
    assert!(db.height_above_msl(&far).is_nan());
    assert!(!db.point_has_coverage(&far));
    assert!(db.point_has_coverage(&GeoPoint::new(27.5, -80.5)));
}

#[test]
fn scenario_b_srtm3_accuracy() {
    let dir = TempDir::new().unwrap();
    write_srtm(dir.path(), "N27W081.hgt", 1201, |row, col| ((row + col) % 500) as i16);
    let db = DatabaseBuilder::new(dir.path()).open_srtm().unwrap();

    let accuracy = db.accuracy_info(&GeoPoint::new(27.5, -80.5)).unwrap();
    assert_eq!(accuracy.surface_name, "SRTM3");
    assert_eq!(accuracy.ce90, 20.0);
    assert_eq!(accuracy.le90, 16.0);

    assert!(db.accuracy_info(&GeoPoint::new(50.0, 50.0)).is_none());
}

#[test]
fn scenario_c_eviction_and_reopen() {
    let dir = TempDir::new().unwrap();
    write_dted(dir.path(), "w081/n27.dt1", &DtedFixture::new(27, -81, 11).with_posts(gradient));
    write_dted(
        dir.path(),
        "w081/n28.dt1",
        &DtedFixture::new(28, -81, 11).with_posts(|r, c| (1000 + r * 10 + c) as i16),
    );
    let db = DatabaseBuilder::new(dir.path())
        .max_open_cells(1)
        .open_dted()
        .unwrap();

    let first = GeoPoint::new(27.33, -80.71);
    let second = GeoPoint::new(28.5, -80.5);

    let before = db.height_above_msl(&first);
    assert!(!before.is_nan());
    let first_handler = db.cache().get_or_create(&first).unwrap();
    assert!(first_handler.is_open());

    assert_relative_eq!(db.height_above_msl(&second), 1055.0);
    assert!(!first_handler.is_open());
    assert_eq!(db.cache().open_cell_count(), 1);

    let after = db.height_above_msl(&first);
    assert_eq!(before.to_bits(), after.to_bits());
    assert_eq!(db.cache().open_cell_count(), 1);
    assert!(db.cache_stats().eviction_count >= 2);
}

#[test]
fn determinism_and_ellipsoid_identity() {
    let dir = dted_root();
    let geoid = Arc::new(sloped_geoid());
    let db = DatabaseBuilder::new(dir.path())
        .geoid(geoid.clone())
        .open_dted()
        .unwrap();

    for i in 0..50 {
        let point = GeoPoint::new(27.0 + i as f64 * 0.019, -81.0 + i as f64 * 0.013);
        let msl = db.height_above_msl(&point);
        assert!(!msl.is_nan());
        for _ in 0..3 {
            assert_eq!(db.height_above_msl(&point).to_bits(), msl.to_bits());
        }

        let hae = db.height_above_ellipsoid(&point);
        assert_relative_eq!(
            hae - geoid.offset_from_ellipsoid(&point),
            msl,
            epsilon = 1e-9
        );
        assert!((hae - msl).abs() > 1.0);
    }
}

#[test]
fn interpolation_around_null_post() {
    let dir = TempDir::new().unwrap();
    write_dted(
        dir.path(),
        "w081/n27.dt1",
        &DtedFixture::new(27, -81, 11).with_posts(|row, col| match (row, col) {
            (5, 5) => DTED_NULL,
            _ => gradient(row, col),
        }),
    );
    let db = DatabaseBuilder::new(dir.path()).open_dted().unwrap();

    // Centered between posts (4,4), (4,5), (5,4) and the NULL (5,5).
    let height = db.height_above_msl(&GeoPoint::new(27.55, -80.55));
    assert_relative_eq!(height, (404.0 + 405.0 + 504.0) / 3.0, epsilon = 1e-9);

    // Exactly on the NULL post there is nothing to interpolate.
    assert!(db.height_above_msl(&GeoPoint::new(27.5, -80.5)).is_nan());
    // Exactly on a neighbor returns it unchanged.
    assert_eq!(db.height_above_msl(&GeoPoint::new(27.6, -80.6)), 404.0);
}

#[test]
fn streamed_and_mapped_agree() {
    let dir = dted_root();
    let mapped = DatabaseBuilder::new(dir.path()).open_dted().unwrap();
    let streamed = DatabaseBuilder::new(dir.path())
        .access_mode(AccessMode::Streamed)
        .open_dted()
        .unwrap();

    for i in 0..20 {
        let point = GeoPoint::new(27.02 + i as f64 * 0.047, -80.98 + i as f64 * 0.041);
        assert_eq!(
            mapped.height_above_msl(&point).to_bits(),
            streamed.height_above_msl(&point).to_bits()
        );
    }
}

#[test]
fn concurrent_queries_agree() {
    let dir = TempDir::new().unwrap();
    for lat in 0..2 {
        for lon in 0..2 {
            write_srtm(
                dir.path(),
                &elevdb::filename::srtm_filename_for_tile(lat, lon),
                121,
                |row, col| (row * 3 + col * 7) as i16,
            );
        }
    }
    let points: Vec<GeoPoint> = (0..64)
        .map(|i| GeoPoint::new(0.01 + (i % 8) as f64 * 0.247, 0.02 + (i / 8) as f64 * 0.243))
        .collect();

    let reference = DatabaseBuilder::new(dir.path()).open_srtm().unwrap();
    let expected: Vec<f64> = points.iter().map(|p| reference.height_above_msl(p)).collect();
    assert!(expected.iter().all(|h| !h.is_nan()));

    // Room for every tile: no eviction, so every answer must match.
    let db = Arc::new(
        DatabaseBuilder::new(dir.path())
            .max_open_cells(4)
            .open_srtm()
            .unwrap(),
    );
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let db = Arc::clone(&db);
            let points = points.clone();
            let expected = expected.clone();
            thread::spawn(move || {
                for round in 0..20 {
                    for (i, point) in points.iter().enumerate().skip((t + round) % 5) {
                        assert_eq!(db.height_above_msl(point).to_bits(), expected[i].to_bits());
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = db.cache_stats();
    assert_eq!(stats.miss_count, 4);
    assert!(db.cache().open_cell_count() <= 4);
}

#[test]
fn concurrent_eviction_keeps_bound() {
    let dir = TempDir::new().unwrap();
    for lat in 0..2 {
        for lon in 0..2 {
            write_srtm(
                dir.path(),
                &elevdb::filename::srtm_filename_for_tile(lat, lon),
                61,
                |row, col| (row + col) as i16,
            );
        }
    }
    let db = Arc::new(
        DatabaseBuilder::new(dir.path())
            .max_open_cells(2)
            .open_srtm()
            .unwrap(),
    );
    let expected = |p: &GeoPoint| {
        let row = ((p.lat.floor() + 1.0 - p.lat) * 60.0).round();
        let col = ((p.lon - p.lon.floor()) * 60.0).round();
        row + col
    };

    let done = Arc::new(AtomicBool::new(false));
    let monitor = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut peak = 0;
            while !done.load(Ordering::SeqCst) {
                peak = peak.max(db.cache().open_cell_count());
                thread::yield_now();
            }
            peak
        })
    };

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..400 {
                    let k = (i * 7 + t) % 4;
                    // On-post points so the value is exact.
                    let point = GeoPoint::new(
                        (k / 2) as f64 + ((i % 59) + 1) as f64 / 60.0,
                        (k % 2) as f64 + ((t * 3 + i) % 59 + 1) as f64 / 60.0,
                    );
                    assert_eq!(db.height_above_msl(&point), expected(&point), "at {point:?}");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(monitor.join().unwrap() <= 2);

    let stats = db.cache_stats();
    assert!(stats.entry_count <= 2);
    assert!(db.cache().open_cell_count() <= 2);
    assert!(stats.eviction_count > 0);
}

#[test]
fn single_slot_thrash_never_loses_coverage() {
    let dir = TempDir::new().unwrap();
    for lat in 0..2 {
        for lon in 0..2 {
            write_srtm(
                dir.path(),
                &elevdb::filename::srtm_filename_for_tile(lat, lon),
                11,
                |_, _| 5,
            );
        }
    }
    let db = Arc::new(
        DatabaseBuilder::new(dir.path())
            .max_open_cells(1)
            .open_srtm()
            .unwrap(),
    );

    let done = Arc::new(AtomicBool::new(false));
    let monitor = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut peak = 0;
            while !done.load(Ordering::SeqCst) {
                peak = peak.max(db.cache().open_cell_count());
                thread::yield_now();
            }
            peak
        })
    };

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut voids = 0;
                for i in 0..2000 {
                    let k = (i + t) % 4;
                    let center = GeoPoint::new((k / 2) as f64 + 0.5, (k % 2) as f64 + 0.5);
                    let height = db.height_above_msl(&center);
                    if height.is_nan() {
                        voids += 1;
                    } else {
                        assert_eq!(height, 5.0);
                    }
                }
                voids
            })
        })
        .collect();
    let voids: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    done.store(true, Ordering::SeqCst);

    assert_eq!(voids, 0, "covered points reported as void");
    assert!(monitor.join().unwrap() <= 1);
}

#[test]
fn missing_cells_are_remembered() {
    let dir = TempDir::new().unwrap();
    write_srtm(dir.path(), "N10E010.hgt", 3, |_, _| 7);
    let db = DatabaseBuilder::new(dir.path())
        .negative_cache_ttl(Duration::from_secs(60))
        .open_srtm()
        .unwrap();

    let missing = GeoPoint::new(11.5, 10.5);
    assert!(db.height_above_msl(&missing).is_nan());
    assert!(db.height_above_msl(&missing).is_nan());
    let stats = db.cache_stats();
    assert_eq!(stats.miss_count, 1);
    assert_eq!(stats.negative_hit_count, 1);

    // The tile appears, but the failure is still remembered.
    write_srtm(dir.path(), "N11E010.hgt", 3, |_, _| 9);
    assert!(db.height_above_msl(&missing).is_nan());
    assert_eq!(db.cache_stats().miss_count, 1);

    db.cache().clear();
    assert_relative_eq!(db.height_above_msl(&missing), 9.0);
}

#[test]
fn negative_cache_disabled() {
    let dir = TempDir::new().unwrap();
    write_srtm(dir.path(), "N10E010.hgt", 3, |_, _| 7);
    let db = DatabaseBuilder::new(dir.path())
        .negative_cache_ttl(Duration::ZERO)
        .open_srtm()
        .unwrap();

    let missing = GeoPoint::new(11.5, 10.5);
    assert!(db.height_above_msl(&missing).is_nan());
    write_srtm(dir.path(), "N11E010.hgt", 3, |_, _| 9);
    assert_relative_eq!(db.height_above_msl(&missing), 9.0);
    assert_eq!(db.cache_stats().negative_hit_count, 0);
}

#[test]
fn negative_entries_expire() {
    let dir = TempDir::new().unwrap();
    write_srtm(dir.path(), "N10E010.hgt", 3, |_, _| 7);
    let db = DatabaseBuilder::new(dir.path())
        .negative_cache_ttl(Duration::from_millis(100))
        .open_srtm()
        .unwrap();

    let missing = GeoPoint::new(11.5, 10.5);
    assert!(db.height_above_msl(&missing).is_nan());
    write_srtm(dir.path(), "N11E010.hgt", 3, |_, _| 9);

    thread::sleep(Duration::from_millis(400));
    assert_relative_eq!(db.height_above_msl(&missing), 9.0);
}

#[test]
fn corrupt_cell_degrades_only_its_region() {
    let dir = TempDir::new().unwrap();
    let fixture = DtedFixture::new(27, -81, 11).with_posts(gradient);
    let bad = write_dted(dir.path(), "w081/n27.dt1", &fixture);
    write_dted(dir.path(), "w081/n28.dt1", &DtedFixture::new(28, -81, 11).with_posts(gradient));

    // Flip one post byte in the fourth record.
    let mut bytes = fs::read(&bad).unwrap();
    bytes[DTED_HEADER_LEN + 3 * fixture.record_size() + 10] ^= 0x01;
    fs::write(&bad, &bytes).unwrap();

    let db = DatabaseBuilder::new(dir.path()).open_dted().unwrap();

    let in_bad = GeoPoint::new(27.5, -80.5);
    assert!(db.height_above_msl(&in_bad).is_nan());
    assert!(!db.point_has_coverage(&in_bad));
    assert!(db.accuracy_info(&in_bad).is_none());

    let in_good = GeoPoint::new(28.5, -80.5);
    assert_relative_eq!(db.height_above_msl(&in_good), 505.0);
    assert!(db.point_has_coverage(&in_good));

    // Without verification the damaged cell still opens.
    let unchecked = DatabaseBuilder::new(dir.path())
        .verify_checksums(false)
        .open_dted()
        .unwrap();
    assert!(!unchecked.height_above_msl(&in_bad).is_nan());
}

#[test]
fn truncated_srtm_tile_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_srtm(dir.path(), "N10E010.hgt", 3, |_, _| 7);
    fs::write(dir.path().join("N10E011.hgt"), vec![0u8; 17]).unwrap();
    let db = DatabaseBuilder::new(dir.path()).open_srtm().unwrap();

    assert!(db.height_above_msl(&GeoPoint::new(10.5, 11.5)).is_nan());
    assert_relative_eq!(db.height_above_msl(&GeoPoint::new(10.5, 10.5)), 7.0);
}

#[test]
fn missing_root_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let result = DatabaseBuilder::new(dir.path().join("nope")).open_dted();
    assert_eq!(
        result.unwrap_err().category(),
        elevdb::ErrorCategory::Configuration
    );
}
