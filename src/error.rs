use thiserror::Error;

use crate::physics::grid::CellIndex;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors surfaced by the simulation core.
///
/// Nothing inside a tick produces one of these; they come from configuration,
/// explicit rule table replacement and the grid consistency audit.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A configuration value cannot be used (e.g. non-positive cutoff radius).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A rule table whose size does not match the configured type count.
    #[error("rule table has {actual} types, simulation expects {expected}")]
    RuleTableMismatch { expected: usize, actual: usize },

    /// A particle is not stored in the bucket its position maps to.
    #[error("particle {index} belongs in cell {expected:?} but grid has it in {found:?}")]
    GridInconsistency {
        index: usize,
        expected: CellIndex,
        found: Option<CellIndex>,
    },

    /// The grid holds a different number of references than there are particles.
    #[error("grid stores {stored} references for {particles} particles")]
    GridReferenceCount { stored: usize, particles: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SimulationError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
