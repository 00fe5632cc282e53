use std::time::Instant;

use log::info;
use particle_life_core::{Simulation, SimulationSettings};

const DEFAULT_TICKS: u64 = 600;
const REPORT_EVERY: u64 = 60;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let settings_path = args
        .next()
        .unwrap_or_else(|| SimulationSettings::SETTINGS_FILE.to_string());
    let ticks = match args.next() {
        Some(arg) => arg.parse::<u64>()?,
        None => DEFAULT_TICKS,
    };

    let settings = SimulationSettings::load(&settings_path)?;
    let mut simulation = Simulation::from_settings(settings)?;

    let start = Instant::now();
    let mut last_report = Instant::now();
    for _ in 0..ticks {
        simulation.advance();

        if simulation.tick() % REPORT_EVERY == 0 {
            let elapsed = last_report.elapsed().as_secs_f64();
            let occupancy = simulation.grid().occupancy();
            info!(
                "tick {}: mean speed {:.3}, {} occupied cells (max {}, mean {:.1}), {:.1} ticks/s",
                simulation.tick(),
                simulation.mean_speed(),
                occupancy.occupied_cells,
                occupancy.max_bucket,
                occupancy.mean_bucket,
                REPORT_EVERY as f64 / elapsed.max(f64::EPSILON)
            );
            last_report = Instant::now();
        }
    }

    simulation.check_grid_consistency()?;
    info!(
        "ran {} ticks in {:.2}s, type counts {:?}",
        simulation.tick(),
        start.elapsed().as_secs_f64(),
        simulation.type_counts()
    );
    Ok(())
}
