use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, SimulationError};
use crate::particle::Position;
use crate::physics::rules::RuleGeneratorKind;
use crate::physics::setters::{Placement, TypeDistribution};

/// Upper bound on the number of particle types.
pub const MAX_TYPES: usize = 16;

/// Upper bound on `cols * rows` of the spatial grid.
pub const MAX_GRID_CELLS: usize = 1 << 22;

/// What happens to a coordinate that leaves the simulation bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Reset the offending axis to the middle of the domain.
    #[default]
    Recenter,
    /// Pin the offending axis to the nearest edge.
    Clamp,
}

impl BoundaryPolicy {
    /// Bring `position` back inside `[0, width] x [0, height]`, axis by axis.
    /// Coordinates exactly on an edge are inside.
    pub fn apply(self, position: &mut Position, (width, height): (f64, f64)) {
        for (axis, extent) in [(0, width), (1, height)] {
            let coord = position[axis];
            if (0.0..=extent).contains(&coord) {
                continue;
            }
            position[axis] = match self {
                Self::Recenter => extent / 2.0,
                Self::Clamp if coord.is_nan() => extent / 2.0,
                Self::Clamp => coord.clamp(0.0, extent),
            };
        }
    }
}

/// Parameters of the force model and integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Interaction cutoff radius; also the grid cell size
    pub cutoff_radius: f64,
    /// Velocity multiplier applied once per tick, in (0, 1)
    pub friction: f64,
    /// Width of the universal repulsion core as a fraction of the cutoff, in (0, 1)
    pub beta: f64,
    /// Extra multiplier on the summed force
    pub force: f64,
    /// Time step used by `Simulation::advance`
    pub dt: f64,
    pub boundary: BoundaryPolicy,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            cutoff_radius: 80.0,
            friction: 0.85,
            beta: 0.3,
            force: 1.0,
            dt: 0.016,
            boundary: BoundaryPolicy::Recenter,
        }
    }
}

impl PhysicsSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.cutoff_radius.is_finite() || self.cutoff_radius <= 0.0 {
            return Err(SimulationError::config(
                "cutoff_radius must be finite and > 0",
            ));
        }
        if !(self.friction > 0.0 && self.friction < 1.0) {
            return Err(SimulationError::config("friction must lie in (0, 1)"));
        }
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(SimulationError::config("beta must lie in (0, 1)"));
        }
        if !self.force.is_finite() {
            return Err(SimulationError::config("force must be finite"));
        }
        if !self.dt.is_finite() || self.dt < 0.0 {
            return Err(SimulationError::config("dt must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Everything needed to start a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub particle_count: usize,
    pub type_count: usize,
    /// Simulation extent as (width, height)
    pub bounds: (f64, f64),
    /// Seed for placement and rule generation; `None` draws one from the OS
    pub seed: Option<u64>,
    pub distribution: TypeDistribution,
    pub placement: Placement,
    pub rule_generator: RuleGeneratorKind,
    pub physics: PhysicsSettings,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            particle_count: 1000,
            type_count: 4,
            bounds: (800.0, 800.0),
            seed: None,
            distribution: TypeDistribution::Random,
            placement: Placement::Uniform,
            rule_generator: RuleGeneratorKind::Random,
            physics: PhysicsSettings::default(),
        }
    }
}

impl SimulationSettings {
    pub const SETTINGS_FILE: &'static str = "settings.toml";

    /// Loads settings from `path`, or returns default settings if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            Self::from_toml_str(&contents)
        } else {
            log::info!("{} not found, using default settings", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: SimulationSettings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.particle_count == 0 {
            return Err(SimulationError::config("particle_count must be > 0"));
        }
        if self.type_count == 0 || self.type_count > MAX_TYPES {
            return Err(SimulationError::config(format!(
                "type_count must lie in 1..={MAX_TYPES}"
            )));
        }
        let (width, height) = self.bounds;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(SimulationError::config(
                "bounds must be finite and > 0 on both axes",
            ));
        }
        self.physics.validate()?;
        let cutoff = self.physics.cutoff_radius;
        let cells = (width / cutoff).ceil().max(1.0) * (height / cutoff).ceil().max(1.0);
        if cells > MAX_GRID_CELLS as f64 {
            return Err(SimulationError::config(format!(
                "bounds / cutoff_radius gives too many grid cells ({cells:.0} > {MAX_GRID_CELLS})"
            )));
        }
        self.distribution
            .validate(self.particle_count, self.type_count)
    }
}
