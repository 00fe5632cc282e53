//! Deterministic 2-D particle life.
//!
//! Typed point particles attract or repel each other through a per-type-pair
//! [`RuleTable`]. Neighbour search goes through a uniform [`SpatialGrid`]
//! whose cell size equals the interaction cutoff, and the grid is maintained
//! incrementally as particles move between cells.

pub mod app_settings;
pub mod error;
pub mod particle;
pub mod physics;

pub use app_settings::{BoundaryPolicy, PhysicsSettings, SimulationSettings};
pub use error::{Result, SimulationError};
pub use particle::{Force, Particle, Position, Velocity};
pub use physics::force::{interaction_strength, ForceEvaluator};
pub use physics::grid::{CellIndex, SpatialGrid};
pub use physics::rules::{RuleGenerator, RuleGeneratorKind, RuleTable};
pub use physics::setters::{Placement, PositionSetter, TypeDistribution};
pub use physics::{PhysicsSnapshot, Simulation};
