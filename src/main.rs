//! Oceanwaves headless demo
//!
//! Runs a few frames of a Phillips-spectrum ocean and a shoreline particle
//! fan, printing sampled heights and particle counts.
//!
//! Usage: `oceanwaves [settings.json]`

use glam::Vec2;

use oceanwaves::particles::Rect;
use oceanwaves::{
    ConfigError, ParticleSettings, PhillipsSpectrum, SpectrumId, WaterParams, WaveParticle, WavesParticleSystem,
    WavesSettings, WeightedProfile, WindWaves,
};

const FRAMES: usize = 10;
const FRAME_TIME: f32 = 1.0 / 30.0;

#[cfg(not(target_arch = "wasm32"))]
fn run(settings: WavesSettings) -> Result<(), ConfigError> {
    let params = WaterParams {
        seed: 42,
        directionality: 0.5,
        ..WaterParams::default()
    };
    let mut water = WindWaves::new(settings, params)?;
    water.set_profiles(vec![WeightedProfile::new(SpectrumId(1), PhillipsSpectrum::new(100.0, 10.0), 1.0)]);
    log::info!(
        "Tile size {:.1} m, wind {:.1} m/s, max height {:.2} m",
        water.tile_size(),
        water.wind_speed(),
        water.resolver().max_vertical_displacement()
    );

    let mut particles = WavesParticleSystem::new(ParticleSettings {
        prewarm_time: 2.0,
        ..ParticleSettings::default()
    })?;
    particles.set_visible_rects(vec![Rect::new(-50.0, -50.0, 100.0, 100.0)]);
    let crest = WaveParticle::new(Vec2::new(0.0, -20.0), Vec2::Y, 0.4, 0.5);
    if !particles.spawn_with_clones(crest, 8, 2.0) {
        log::warn!("No room for the particle fan");
    }

    println!("\n frame   time    height(0,0)   particles   stress");
    for frame in 0..FRAMES {
        let time = frame as f32 * FRAME_TIME;
        water.update(time);
        particles.update(FRAME_TIME);
        println!(
            "{:6} {:6.3} {:13.5} {:11} {:8.2}",
            frame,
            time,
            water.height_at(0.0, 0.0, 0.0, 1.0, time),
            particles.particle_count(),
            particles.stress()
        );
    }

    let shoreline = water.resolver().select_shoreline_waves(4, 0.0, 45.0);
    println!("\nShoreline waves facing the wind: {}", shoreline.len());
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Oceanwaves demo starting...");

    let settings = match std::env::args().nth(1) {
        Some(path) => match WavesSettings::load_json(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => WavesSettings::from_quality(oceanwaves::QualityLevel::Medium),
    };

    if let Err(e) = run(settings) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // Library-only on wasm
}
