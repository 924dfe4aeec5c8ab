//! Track synthetic cells through a generated microscopy video
//!
//! Run with `RUST_LOG=debug` to see per-frame detail. An optional first
//! argument names a JSON/TOML/YAML configuration file.

use cytotrack_core::AnalysisConfig;
use cytotrack_vision::{CellAnalyzer, TrackState};
use ndarray::{s, Array3};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Three cells: one drifting, one stationary that vanishes for two frames,
/// and one that appears halfway through
fn synthetic_video(frames: usize) -> Array3<u16> {
    let mut video = Array3::from_elem((frames, 128, 128), 300u16);
    for t in 0..frames {
        video.slice_mut(s![t, 10..30, 10 + t..30 + t]).fill(3000);
        if !(6..8).contains(&t) {
            video.slice_mut(s![t, 70..95, 70..95]).fill(2800);
        }
        if t >= frames / 2 {
            video.slice_mut(s![t, 100..118, 20..38]).fill(3200);
        }
    }
    video
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    config.apply_env()?;
    config.detection.padding = config.detection.padding.max(4);

    let analyzer = CellAnalyzer::new(config)?;
    let video = synthetic_video(16);
    let report = analyzer.analyze(video.view().into_dyn())?;

    info!("Cells per frame: {:?}", report.counts());
    info!("Largest frame count: {}", report.max_count);
    for issue in &report.issues {
        info!("Issue: {}", issue);
    }

    for track in report.tracks.iter() {
        let state = match track.state {
            TrackState::Active => "active".to_string(),
            TrackState::Missing(k) => format!("missing for {} frames", k),
            TrackState::Finished => "finished".to_string(),
        };
        info!(
            "Track {}: frames {:?}..={:?}, {} observations, {} patches, {}",
            track.id,
            track.first_frame(),
            track.last_seen_frame(),
            track.len(),
            report.track_patches(track.id).len(),
            state
        );
    }

    println!("{}", report.to_json()?);
    Ok(())
}
