use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orbital_mechanics::tle::{format_tle_lines, SyntheticElements};
use orbital_mechanics::RAD_TO_DEG;
use sentinel_service::{
    wait_for_job, AddAssetRequest, EventStore, JobStatus, SentinelService,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sentinel_service=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path = std::env::var("SENTINEL_DB_PATH").unwrap_or_else(|_| "sentinel.db".to_string());
    let pool_size = std::env::var("SENTINEL_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4usize);

    let mut args = std::env::args().skip(1);
    let tle_path = args.next();
    let requested_norad: Option<u32> = args.next().and_then(|v| v.parse().ok());

    let store = EventStore::open(&db_path).with_context(|| format!("opening {db_path}"))?;
    let service = SentinelService::new(store, pool_size);
    tracing::info!("   Event store: {} (pool size {})", db_path, pool_size);

    // ---- Load the catalog ----
    match &tle_path {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            let merged = service.load_catalog_text(&text);
            tracing::info!("   Loaded {} element sets from {}", merged, path);
        }
        None => {
            let merged = service.load_catalog_text(&demo_catalog());
            tracing::info!("   No TLE file given - generated {} demo element sets", merged);
        }
    }

    if service.catalog_len() == 0 {
        anyhow::bail!("catalog is empty, nothing to screen");
    }

    // ---- Register the protected asset ----
    let primary_norad = requested_norad.unwrap_or(70001);
    let asset = match service.add_asset(&AddAssetRequest {
        catalog_number: Some(primary_norad),
        hard_body_radius_m: Some(3.0),
        maneuverable: true,
        delta_v_budget_ms: Some(20.0),
        ..Default::default()
    }) {
        Ok(asset) => asset,
        // Re-runs against a persistent store find the asset already there.
        Err(sentinel_service::ServiceError::InvalidInput(_)) => service
            .list_assets()?
            .into_iter()
            .find(|a| a.norad_id == primary_norad)
            .context("asset exists but could not be loaded")?,
        Err(e) => return Err(e.into()),
    };
    tracing::info!("   Protected asset: {} (NORAD {})", asset.name, asset.norad_id);

    // ---- Screen and wait ----
    let jobs = service.run_screening(&[asset.id], 1.0, 25.0).await?;
    let job_id = jobs[0];
    tracing::info!("   Screening job {} dispatched", job_id);

    let job = wait_for_job(service.store(), job_id, Duration::from_secs(300)).await?;
    match job.status {
        JobStatus::Completed => tracing::info!(
            "   Job complete: {} conjunctions over {} candidates{}",
            job.conjunctions_found,
            job.candidates_found,
            job.result_note
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default(),
        ),
        status => {
            anyhow::bail!(
                "screening job ended {status:?}: {}",
                job.result_note.unwrap_or_default()
            )
        }
    }

    // ---- Report events, alerts, maneuvers ----
    for event in service.job_results(job_id)? {
        tracing::info!(
            "   {} vs NORAD {}: miss {:.0} m, Pc {:.2e}, TCA {}",
            event.threat_level,
            event.secondary_norad_id,
            event.miss_distance_m,
            event.collision_probability.unwrap_or(0.0),
            event.tca,
        );

        if event.collision_probability.unwrap_or(0.0) > 1e-5 {
            let options = service.compute_maneuvers(event.id, None)?;
            for opt in options.iter().take(3) {
                tracing::info!(
                    "      option {}: {} {:.4} m/s at {:.1} orbits before TCA -> Pc {:.2e}",
                    opt.label,
                    opt.direction,
                    opt.delta_v_ms,
                    opt.timing_before_tca_orbits,
                    opt.new_collision_probability.unwrap_or(0.0),
                );
            }
        }
    }

    for alert in service.list_alerts(Some(asset.id), None)? {
        tracing::info!("   ALERT [{}] {}", alert.threat_level, alert.message);
    }

    // Full detail of the top event on stdout for piping into other tools.
    if let Some(event) = service.job_results(job_id)?.first() {
        let detail = service.conjunction_detail(event.id)?;
        println!("{}", serde_json::to_string_pretty(&detail)?);
    }

    Ok(())
}

/// A small self-contained demo catalog: one LEO primary and a handful of
/// neighbors, one of them on a close along-track offset.
fn demo_catalog() -> String {
    let epoch = Utc::now() - ChronoDuration::hours(2);
    let mean_motion = 15.2;
    let sma = orbital_mechanics::tle::sma_from_mean_motion(mean_motion);
    let offset_deg = |arc_km: f64| arc_km / sma * RAD_TO_DEG;

    let objects = [
        (70001, "SENTINEL-DEMO-1", 0.0, 120.0),
        (70002, "SENTINEL-DEMO-2", offset_deg(8.0), 120.0),
        (70003, "SENTINEL-DEMO-3", offset_deg(400.0), 120.0),
        (70004, "SENTINEL-DEMO-4", 180.0, 120.0),
        (70005, "SENTINEL-DEMO-5", 90.0, 300.0),
    ];

    let mut text = String::new();
    for (catalog_number, name, mean_anomaly_deg, raan_deg) in objects {
        let (line1, line2) = format_tle_lines(&SyntheticElements {
            catalog_number,
            name: name.to_string(),
            epoch,
            inclination_deg: 51.6,
            raan_deg,
            eccentricity: 0.001,
            arg_perigee_deg: 0.0,
            mean_anomaly_deg,
            mean_motion_rev_day: mean_motion,
        });
        text.push_str(name);
        text.push('\n');
        text.push_str(&line1);
        text.push('\n');
        text.push_str(&line2);
        text.push('\n');
    }
    text
}
