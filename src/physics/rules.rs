use log::debug;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Square table of interaction coefficients, indexed by (acting type, other type).
///
/// The table is asymmetric: `get(a, b)` is how strongly type `a` is pulled
/// towards (positive) or pushed away from (negative) type `b`, and need not
/// equal `get(b, a)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    data: Vec<Vec<f64>>,
    size: usize,
}

impl RuleTable {
    /// Coefficient for pairs that were never set, including pairs outside the table.
    pub const DEFAULT_COEFFICIENT: f64 = 0.0;

    pub fn new(size: usize) -> Self {
        Self {
            data: vec![vec![Self::DEFAULT_COEFFICIENT; size]; size],
            size,
        }
    }

    /// Build a table from explicit rows. Every row must have one entry per type.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let size = rows.len();
        if let Some(bad) = rows.iter().position(|row| row.len() != size) {
            return Err(SimulationError::config(format!(
                "rule table row {bad} has {} entries, expected {size}",
                rows[bad].len()
            )));
        }
        Ok(Self { data: rows, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.data
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(Self::DEFAULT_COEFFICIENT)
    }

    pub fn set(&mut self, a: usize, b: usize, value: f64) {
        match self.data.get_mut(a).and_then(|row| row.get_mut(b)) {
            Some(slot) => *slot = value,
            None => debug!(
                "ignoring rule ({a}, {b}) = {value} outside a {0}x{0} table",
                self.size
            ),
        }
    }

    pub fn randomize(&mut self, rng: &mut dyn RngCore) {
        self.data.iter_mut().for_each(|row| {
            row.iter_mut().for_each(|val| {
                *val = rng.gen_range(-1.0..1.0);
            });
        });
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.iter().map(Vec::as_slice)
    }
}

pub trait RuleGenerator: Send + Sync {
    fn generate(&self, size: usize, rng: &mut dyn RngCore) -> RuleTable;
}

/// Named generators selectable from the settings file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGeneratorKind {
    #[default]
    Random,
    Symmetric,
    Chains,
    Snakes,
    Zero,
}

impl RuleGeneratorKind {
    pub fn generator(self) -> Box<dyn RuleGenerator> {
        match self {
            Self::Random => Box::new(RandomRules),
            Self::Symmetric => Box::new(SymmetricRules),
            Self::Chains => Box::new(ChainRules),
            Self::Snakes => Box::new(SnakeRules),
            Self::Zero => Box::new(ZeroRules),
        }
    }
}

pub struct RandomRules;

impl RuleGenerator for RandomRules {
    fn generate(&self, size: usize, rng: &mut dyn RngCore) -> RuleTable {
        let mut table = RuleTable::new(size);
        table.randomize(rng);
        table
    }
}

pub struct SymmetricRules;

impl RuleGenerator for SymmetricRules {
    fn generate(&self, size: usize, rng: &mut dyn RngCore) -> RuleTable {
        let mut table = RandomRules.generate(size, rng);
        // Mirror the lower triangle onto the upper one
        for i in 0..size {
            for j in i..size {
                let value = table.get(j, i);
                table.set(i, j, value);
            }
        }
        table
    }
}

/// Every type attracts itself and its two ring neighbours and repels the rest.
pub struct ChainRules;

impl RuleGenerator for ChainRules {
    fn generate(&self, size: usize, _rng: &mut dyn RngCore) -> RuleTable {
        let mut table = RuleTable::new(size);
        for i in 0..size {
            for j in 0..size {
                let linked = j == i || j == (i + 1) % size || j == (i + size - 1) % size;
                table.set(i, j, if linked { 1.0 } else { -1.0 });
            }
        }
        table
    }
}

pub struct SnakeRules;

impl RuleGenerator for SnakeRules {
    fn generate(&self, size: usize, _rng: &mut dyn RngCore) -> RuleTable {
        let mut table = RuleTable::new(size);
        for i in 0..size {
            table.set(i, i, 1.0);
            table.set(i, (i + 1) % size, 0.2);
        }
        table
    }
}

pub struct ZeroRules;

impl RuleGenerator for ZeroRules {
    fn generate(&self, size: usize, _rng: &mut dyn RngCore) -> RuleTable {
        RuleTable::new(size)
    }
}
