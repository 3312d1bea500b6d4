use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

use conjunction_assessment::{screen_asset, ScreeningConfig};
use orbital_mechanics::tle::{synthesize_element_set, SyntheticElements};
use orbital_mechanics::CatalogSnapshot;

fn screening_benchmark(c: &mut Criterion) {
    let epoch = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    let primary = synthesize_element_set(&SyntheticElements {
        catalog_number: 90000,
        name: "PRIMARY".into(),
        epoch,
        inclination_deg: 51.6,
        raan_deg: 0.0,
        eccentricity: 0.001,
        arg_perigee_deg: 0.0,
        mean_anomaly_deg: 0.0,
        mean_motion_rev_day: 15.2,
    })
    .unwrap();

    // 64 secondaries spread over mean anomaly and RAAN, all sharing the
    // primary's altitude band so nothing is filtered before the coarse scan.
    let catalog = CatalogSnapshot::from_element_sets((1..=64).map(|i| {
        synthesize_element_set(&SyntheticElements {
            catalog_number: 90000 + i,
            name: format!("TARGET-{i}"),
            epoch,
            inclination_deg: 51.6,
            raan_deg: (i as f64 * 23.0) % 360.0,
            eccentricity: 0.001,
            arg_perigee_deg: 0.0,
            mean_anomaly_deg: (i as f64 * 47.0) % 360.0,
            mean_motion_rev_day: 15.2,
        })
        .unwrap()
    }));

    let config = ScreeningConfig {
        time_window_days: 0.25,
        distance_threshold_km: 5.0,
        asset_radius_m: 1.0,
    };

    c.bench_function("screen_64_objects_6h", |b| {
        b.iter(|| screen_asset(&primary, &catalog, epoch, &config, |_, _, _| {}))
    });
}

criterion_group!(benches, screening_benchmark);
criterion_main!(benches);
