use std::f64::consts::TAU;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::particle::Position;

pub trait PositionSetter: Send + Sync {
    /// Pick a starting position inside `[0, width] x [0, height]`.
    fn set_position(
        &self,
        position: &mut Position,
        type_id: usize,
        n_types: usize,
        bounds: (f64, f64),
        rng: &mut dyn RngCore,
    );
}

/// Named placements selectable from the settings file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Uniform,
    Center,
    Ring,
    RainbowRing,
}

impl Placement {
    pub fn setter(self) -> Box<dyn PositionSetter> {
        match self {
            Self::Uniform => Box::new(UniformPositionSetter),
            Self::Center => Box::new(CenterPositionSetter),
            Self::Ring => Box::new(RingPositionSetter),
            Self::RainbowRing => Box::new(RainbowRingPositionSetter),
        }
    }
}

pub struct UniformPositionSetter;

impl PositionSetter for UniformPositionSetter {
    fn set_position(
        &self,
        position: &mut Position,
        _type_id: usize,
        _n_types: usize,
        (width, height): (f64, f64),
        rng: &mut dyn RngCore,
    ) {
        position.x = rng.gen_range(0.0..=width);
        position.y = rng.gen_range(0.0..=height);
    }
}

/// Uniform over the middle 60% of each axis.
pub struct CenterPositionSetter;

impl PositionSetter for CenterPositionSetter {
    fn set_position(
        &self,
        position: &mut Position,
        _type_id: usize,
        _n_types: usize,
        (width, height): (f64, f64),
        rng: &mut dyn RngCore,
    ) {
        let scale = 0.6;
        position.x = width * (0.5 + rng.gen_range(-0.5..0.5) * scale);
        position.y = height * (0.5 + rng.gen_range(-0.5..0.5) * scale);
    }
}

pub struct RingPositionSetter;

impl PositionSetter for RingPositionSetter {
    fn set_position(
        &self,
        position: &mut Position,
        _type_id: usize,
        _n_types: usize,
        bounds: (f64, f64),
        rng: &mut dyn RngCore,
    ) {
        let angle = rng.gen_range(0.0..TAU);
        place_on_ring(position, angle, bounds, rng);
    }
}

/// Ring where each type occupies its own arc.
pub struct RainbowRingPositionSetter;

impl PositionSetter for RainbowRingPositionSetter {
    fn set_position(
        &self,
        position: &mut Position,
        type_id: usize,
        n_types: usize,
        bounds: (f64, f64),
        rng: &mut dyn RngCore,
    ) {
        let n_types = n_types.max(1) as f64;
        let angle = (0.3 * rng.gen_range(-1.0..1.0) + type_id as f64) / n_types * TAU;
        place_on_ring(position, angle, bounds, rng);
    }
}

fn place_on_ring(
    position: &mut Position,
    angle: f64,
    (width, height): (f64, f64),
    rng: &mut dyn RngCore,
) {
    let radius = (0.35 + 0.01 * rng.gen_range(-1.0..1.0)) * width.min(height);
    position.x = (width / 2.0 + angle.cos() * radius).clamp(0.0, width);
    position.y = (height / 2.0 + angle.sin() * radius).clamp(0.0, height);
}

/// How particle types are assigned at start-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDistribution {
    /// Each particle draws its type uniformly at random.
    #[default]
    Random,
    /// Types share the population as evenly as possible, lower ids taking the remainder.
    Equal,
    /// Exact number of particles per type; must sum to the particle count.
    Counts(Vec<usize>),
    /// Relative odds per type.
    Weights(Vec<f64>),
}

impl TypeDistribution {
    pub fn validate(&self, particle_count: usize, type_count: usize) -> Result<()> {
        if type_count == 0 {
            return Err(SimulationError::config("type_count must be > 0"));
        }
        match self {
            Self::Random | Self::Equal => Ok(()),
            Self::Counts(counts) => {
                if counts.len() != type_count {
                    return Err(SimulationError::config(format!(
                        "distribution lists {} type counts for {type_count} types",
                        counts.len()
                    )));
                }
                let total: usize = counts.iter().sum();
                if total != particle_count {
                    return Err(SimulationError::config(format!(
                        "distribution counts sum to {total}, particle_count is {particle_count}"
                    )));
                }
                Ok(())
            }
            Self::Weights(weights) => {
                if weights.len() != type_count {
                    return Err(SimulationError::config(format!(
                        "distribution lists {} weights for {type_count} types",
                        weights.len()
                    )));
                }
                WeightedIndex::<f64>::new(weights)
                    .map(|_| ())
                    .map_err(|e| SimulationError::config(format!("distribution weights: {e}")))
            }
        }
    }

    /// Produce one type id per particle.
    pub fn assign(
        &self,
        particle_count: usize,
        type_count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>> {
        self.validate(particle_count, type_count)?;
        let types = match self {
            Self::Random => (0..particle_count)
                .map(|_| rng.gen_range(0..type_count))
                .collect(),
            Self::Equal => {
                let per_type = particle_count / type_count;
                let remainder = particle_count % type_count;
                let counts: Vec<usize> = (0..type_count)
                    .map(|i| per_type + usize::from(i < remainder))
                    .collect();
                expand_counts(&counts)
            }
            Self::Counts(counts) => expand_counts(counts),
            Self::Weights(weights) => {
                let index = WeightedIndex::<f64>::new(weights)
                    .map_err(|e| SimulationError::config(format!("distribution weights: {e}")))?;
                (0..particle_count).map(|_| index.sample(rng)).collect()
            }
        };
        Ok(types)
    }
}

fn expand_counts(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .enumerate()
        .flat_map(|(type_id, &count)| std::iter::repeat(type_id).take(count))
        .collect()
}
