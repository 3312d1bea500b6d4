//! End-to-end screening scenarios against an in-memory store.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use conjunction_assessment::ThreatLevel;
use orbital_mechanics::tle::{format_tle_lines, sma_from_mean_motion, SyntheticElements};
use orbital_mechanics::RAD_TO_DEG;
use sentinel_service::store::{AlertStatus, EventFilter};
use sentinel_service::{
    wait_for_job, AddAssetRequest, EventStore, JobStatus, SentinelService,
};

const PRIMARY_NORAD: u32 = 70001;
const SECONDARY_NORAD: u32 = 70002;
const MEAN_MOTION: f64 = 15.2;

fn service() -> SentinelService {
    SentinelService::new(EventStore::open_in_memory().expect("in-memory store"), 2)
}

fn tle_block(catalog_number: u32, name: &str, mean_anomaly_deg: f64, mean_motion: f64) -> String {
    let (line1, line2) = format_tle_lines(&SyntheticElements {
        catalog_number,
        name: name.to_string(),
        epoch: Utc::now(),
        inclination_deg: 51.6,
        raan_deg: 120.0,
        eccentricity: 0.001,
        arg_perigee_deg: 0.0,
        mean_anomaly_deg,
        mean_motion_rev_day: mean_motion,
    });
    format!("{name}\n{line1}\n{line2}\n")
}

fn along_track_offset_deg(arc_km: f64) -> f64 {
    arc_km / sma_from_mean_motion(MEAN_MOTION) * RAD_TO_DEG
}

async fn screen_and_wait(
    service: &SentinelService,
    asset_id: i64,
    window_days: f64,
    threshold_km: f64,
) -> sentinel_service::store::JobRecord {
    let jobs = service
        .run_screening(&[asset_id], window_days, threshold_km)
        .await
        .expect("dispatch screening");
    wait_for_job(service.store(), jobs[0], Duration::from_secs(120))
        .await
        .expect("job row")
}

#[tokio::test(flavor = "multi_thread")]
async fn screening_with_only_the_primary_fails_as_empty_catalog() {
    let service = service();
    service.load_catalog_text(&tle_block(PRIMARY_NORAD, "LONELY", 0.0, MEAN_MOTION));

    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            ..Default::default()
        })
        .unwrap();

    let job = screen_and_wait(&service, asset.id, 1.0, 5.0).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.started_at.is_some(), "job must pass through RUNNING");
    assert!(
        job.result_note.as_deref().unwrap_or("").contains("empty catalog"),
        "note: {:?}",
        job.result_note
    );
    assert!(service.job_results(job.id).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn leo_primary_against_geo_object_completes_empty() {
    let service = service();
    let mut text = tle_block(PRIMARY_NORAD, "LEO-PRIMARY", 0.0, MEAN_MOTION);
    text.push_str(&tle_block(80001, "GEO-BIRD", 0.0, 1.0027));
    service.load_catalog_text(&text);

    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            ..Default::default()
        })
        .unwrap();

    let job = screen_and_wait(&service, asset.id, 1.0, 5.0).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.conjunctions_found, 0);
    assert!(
        job.result_note.as_deref().unwrap_or("").contains("no candidates"),
        "note: {:?}",
        job.result_note
    );
    assert!(service.job_results(job.id).unwrap().is_empty());
    assert!(service.list_alerts(Some(asset.id), None).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_along_track_miss_is_low_threat() {
    let service = service();
    let mut text = tle_block(PRIMARY_NORAD, "PRIMARY", 0.0, MEAN_MOTION);
    text.push_str(&tle_block(
        SECONDARY_NORAD,
        "NEIGHBOR",
        along_track_offset_deg(50.0),
        MEAN_MOTION,
    ));
    service.load_catalog_text(&text);

    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            ..Default::default()
        })
        .unwrap();

    let job = screen_and_wait(&service, asset.id, 1.0, 100.0).await;
    assert_eq!(job.status, JobStatus::Completed, "note {:?}", job.result_note);
    assert_eq!(job.conjunctions_found, 1);
    assert_eq!(job.progress, 1.0);

    let events = service.job_results(job.id).unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.secondary_norad_id, SECONDARY_NORAD);
    assert!(
        (event.miss_distance_m - 50_000.0).abs() < 500.0,
        "miss {}",
        event.miss_distance_m
    );
    assert!(event.collision_probability.unwrap() < 1e-5);
    assert_eq!(event.threat_level, ThreatLevel::Low);

    // A 100-sigma miss raises nothing.
    assert!(service.list_alerts(Some(asset.id), None).unwrap().is_empty());

    // The stored uncertainty block carries all six sigmas.
    let detail = service.conjunction_detail(event.id).unwrap();
    assert!(detail.uncertainty.primary_sigma_in_track_m.unwrap() >= 500.0);
    assert!(detail.uncertainty.secondary_sigma_in_track_m.unwrap() >= 800.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn direct_pass_after_clear_miss_raises_escalation_alert() {
    let service = service();
    let mut text = tle_block(PRIMARY_NORAD, "PRIMARY", 0.0, MEAN_MOTION);
    text.push_str(&tle_block(
        SECONDARY_NORAD,
        "THREAT",
        along_track_offset_deg(50.0),
        MEAN_MOTION,
    ));
    service.load_catalog_text(&text);

    // A larger hard body keeps the direct-pass Pc above the MODERATE line.
    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            hard_body_radius_m: Some(5.0),
            ..Default::default()
        })
        .unwrap();

    let first = screen_and_wait(&service, asset.id, 0.2, 100.0).await;
    assert_eq!(first.status, JobStatus::Completed);
    let first_events = service.job_results(first.id).unwrap();
    assert_eq!(first_events.len(), 1);
    assert_eq!(first_events[0].threat_level, ThreatLevel::Low);
    assert!(service.list_alerts(Some(asset.id), None).unwrap().is_empty());

    // Shift the secondary onto a direct pass and rescreen.
    service.load_catalog_text(&tle_block(
        SECONDARY_NORAD,
        "THREAT",
        along_track_offset_deg(0.1),
        MEAN_MOTION,
    ));

    let second = screen_and_wait(&service, asset.id, 0.2, 100.0).await;
    assert_eq!(second.status, JobStatus::Completed);
    let second_events = service.job_results(second.id).unwrap();
    assert_eq!(second_events.len(), 1);
    let pc = second_events[0].collision_probability.unwrap();
    assert!(pc > 1e-5, "direct pass Pc {pc}");
    assert!(second_events[0].threat_level > ThreatLevel::Low);

    let alerts = service.list_alerts(Some(asset.id), None).unwrap();
    let escalations: Vec<_> = alerts
        .iter()
        .filter(|a| a.reason.as_deref() == Some("escalation"))
        .collect();
    assert_eq!(escalations.len(), 1, "alerts: {alerts:?}");
    assert_eq!(escalations[0].conjunction_id, Some(second_events[0].id));
    assert!(escalations[0].message.contains("ESCALATION"));

    // Operator walk: NEW -> ACKNOWLEDGED.
    let acked = service.acknowledge_alert(escalations[0].id).unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert!(acked.acknowledged_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn maneuver_planning_persists_sorted_options() {
    let service = service();
    let offset = along_track_offset_deg(0.05); // ~50 m
    let mut text = tle_block(PRIMARY_NORAD, "PRIMARY", 0.0, MEAN_MOTION);
    text.push_str(&tle_block(SECONDARY_NORAD, "THREAT", offset, MEAN_MOTION));
    service.load_catalog_text(&text);

    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            hard_body_radius_m: Some(5.0),
            maneuverable: true,
            delta_v_budget_ms: Some(20.0),
            ..Default::default()
        })
        .unwrap();

    // Store an event directly with a TCA far enough out that every burn
    // timing stays in the future.
    let job = service.store().create_job(asset.id, 1.0, 25.0).unwrap();
    let snapshot_tca = Utc::now() + ChronoDuration::hours(12);
    let candidate = screening_candidate_fixture(snapshot_tca);
    let ids = service
        .store()
        .insert_events_for_job(job.id, asset.id, &[candidate])
        .unwrap();
    let event_id = ids[0];

    let options = service.compute_maneuvers(event_id, None).unwrap();
    assert_eq!(options.len(), 9, "3 directions x 3 timings");
    for pair in options.windows(2) {
        assert!(pair[0].delta_v_ms <= pair[1].delta_v_ms);
    }
    for opt in &options {
        let pc = opt.new_collision_probability.unwrap();
        assert!(pc <= 1e-5 || (opt.delta_v_ms - 5.0).abs() < 1e-9);
        assert!(opt.delta_v_ms <= 20.0, "within budget");
        assert!(opt.fuel_cost_pct.unwrap() <= 100.0);
    }

    // Options are persisted and visible through the detail view.
    let detail = service.conjunction_detail(event_id).unwrap();
    assert_eq!(detail.maneuver_options.len(), 9);

    // An in-track option at a late timing clears the target cheaply.
    let cheap = detail
        .maneuver_options
        .iter()
        .find(|o| o.direction == "in_track" && o.timing_before_tca_orbits >= 1.0)
        .expect("in-track option");
    assert!(cheap.new_collision_probability.unwrap() < 1e-5);
    assert!(cheap.delta_v_ms < 0.5);
}

#[tokio::test(flavor = "multi_thread")]
async fn monte_carlo_cross_check_runs_on_stored_events() {
    let service = service();
    let mut text = tle_block(PRIMARY_NORAD, "PRIMARY", 0.0, MEAN_MOTION);
    text.push_str(&tle_block(
        SECONDARY_NORAD,
        "NEIGHBOR",
        along_track_offset_deg(50.0),
        MEAN_MOTION,
    ));
    service.load_catalog_text(&text);

    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            ..Default::default()
        })
        .unwrap();
    let job = screen_and_wait(&service, asset.id, 0.2, 100.0).await;
    assert_eq!(job.status, JobStatus::Completed);
    let events = service.job_results(job.id).unwrap();

    let mc = service.monte_carlo(events[0].id, 2000, Some(7)).unwrap();
    assert_eq!(mc.n_samples, 2000);
    // A 50 km miss never samples inside a few meters of hard body.
    assert_eq!(mc.n_collisions, 0);
    assert!(mc.confidence_interval.0 <= mc.collision_probability);
    assert!(mc.collision_probability <= mc.confidence_interval.1);
    assert!(mc.distances.p50 > 40_000.0, "median {}", mc.distances.p50);

    // Same seed, same draw.
    let again = service.monte_carlo(events[0].id, 2000, Some(7)).unwrap();
    assert_eq!(again.distances.mean, mc.distances.mean);
}

#[tokio::test(flavor = "multi_thread")]
async fn conjunction_listing_filters_by_threat() {
    let service = service();
    let mut text = tle_block(PRIMARY_NORAD, "PRIMARY", 0.0, MEAN_MOTION);
    text.push_str(&tle_block(
        SECONDARY_NORAD,
        "NEIGHBOR",
        along_track_offset_deg(50.0),
        MEAN_MOTION,
    ));
    service.load_catalog_text(&text);
    let asset = service
        .add_asset(&AddAssetRequest {
            catalog_number: Some(PRIMARY_NORAD),
            ..Default::default()
        })
        .unwrap();
    let job = screen_and_wait(&service, asset.id, 0.2, 100.0).await;
    assert_eq!(job.status, JobStatus::Completed);

    let all = service.list_conjunctions(&EventFilter::default()).unwrap();
    assert_eq!(all.len(), 1);

    let low_only = service
        .list_conjunctions(&EventFilter {
            threat_level: Some(ThreatLevel::Low),
            asset_id: Some(asset.id),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(low_only.len(), 1);

    let critical_only = service
        .list_conjunctions(&EventFilter {
            threat_level: Some(ThreatLevel::Critical),
            ..Default::default()
        })
        .unwrap();
    assert!(critical_only.is_empty());
}

/// A synthetic candidate for the maneuver test: geometry does not need to
/// match the catalog, only the TCA and identities do.
fn screening_candidate_fixture(
    tca: chrono::DateTime<Utc>,
) -> conjunction_assessment::ConjunctionCandidate {
    use conjunction_assessment::uncertainty::RicSigmas;
    use nalgebra::Vector3;
    use orbital_mechanics::tle::synthesize_element_set;

    let secondary = synthesize_element_set(&SyntheticElements {
        catalog_number: SECONDARY_NORAD,
        name: "THREAT".into(),
        epoch: Utc::now(),
        inclination_deg: 51.6,
        raan_deg: 120.0,
        eccentricity: 0.001,
        arg_perigee_deg: 0.0,
        mean_anomaly_deg: along_track_offset_deg(0.05),
        mean_motion_rev_day: MEAN_MOTION,
    })
    .expect("synthesize secondary");

    let sigmas = RicSigmas {
        radial_m: 200.0,
        in_track_m: 500.0,
        cross_track_m: 200.0,
    };
    conjunction_assessment::ConjunctionCandidate {
        secondary,
        tca,
        miss_distance_m: 50.0,
        radial_m: 5.0,
        in_track_m: 49.0,
        cross_track_m: 8.0,
        relative_velocity_km_s: 0.05,
        collision_probability: 2e-3,
        combined_hard_body_radius_m: 6.0,
        threat_level: ThreatLevel::Critical,
        primary_sigmas: sigmas,
        secondary_sigmas: sigmas,
        primary_position_eci: Vector3::new(6871.0, 0.0, 0.0),
        primary_velocity_eci: Vector3::new(0.0, 7.6, 0.0),
        secondary_position_eci: Vector3::new(6871.0, 0.05, 0.0),
        secondary_velocity_eci: Vector3::new(0.0, 7.6, 0.0),
    }
}
