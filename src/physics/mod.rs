pub mod force;
pub mod grid;
pub mod rules;
pub mod setters;

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::app_settings::{SimulationSettings, MAX_TYPES};
use crate::error::{Result, SimulationError};
use crate::particle::{Force, Particle, Position, Velocity};

use self::force::ForceEvaluator;
use self::grid::{CellIndex, SpatialGrid};
use self::rules::{RuleGenerator, RuleTable};
use self::setters::TypeDistribution;

/// Read-only copy of the particle state, laid out per attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsSnapshot {
    pub positions: Vec<Position>,
    pub velocities: Vec<Velocity>,
    pub types: Vec<usize>,
    pub particle_count: usize,
    pub type_count: Vec<usize>,
}

/// A fixed population of typed particles stepped one tick at a time.
///
/// Each tick runs three phases in order:
/// 1. forces from the start-of-tick positions, then damped velocity update;
/// 2. position integration and boundary recovery;
/// 3. re-homing of every particle whose grid cell changed.
///
/// Between ticks the grid holds every particle exactly once, in the cell its
/// position maps to.
pub struct Simulation {
    particles: Vec<Particle>,
    rules: RuleTable,
    grid: SpatialGrid,
    /// Cell each particle is currently filed under in `grid`
    cells: Vec<CellIndex>,
    settings: SimulationSettings,
    evaluator: ForceEvaluator,
    rule_generator: Box<dyn RuleGenerator>,
    rng: StdRng,
    force_buffer: Vec<Force>,
    tick: u64,
}

impl Simulation {
    /// Build a simulation from settings alone: rules come from the configured
    /// generator and types from the configured distribution.
    pub fn from_settings(settings: SimulationSettings) -> Result<Self> {
        settings.validate()?;
        let mut rng = Self::seeded_rng(settings.seed);
        let rules = settings
            .rule_generator
            .generator()
            .generate(settings.type_count, &mut rng);
        let distribution = settings.distribution.clone();
        Self::build(settings, &distribution, rules, rng)
    }

    /// Place `particle_count` particles at random with types drawn from
    /// `distribution`, interacting through `rules`.
    pub fn new(
        settings: SimulationSettings,
        distribution: &TypeDistribution,
        rules: RuleTable,
    ) -> Result<Self> {
        settings.validate()?;
        let rng = Self::seeded_rng(settings.seed);
        Self::build(settings, distribution, rules, rng)
    }

    /// Start from an explicit population. `particle_count` and `distribution`
    /// in the settings are replaced by what the particles themselves describe.
    pub fn with_particles(
        mut settings: SimulationSettings,
        particles: Vec<Particle>,
        rules: RuleTable,
    ) -> Result<Self> {
        if settings.type_count == 0 || settings.type_count > MAX_TYPES {
            return Err(SimulationError::config(format!(
                "type_count must lie in 1..={MAX_TYPES}"
            )));
        }
        let (width, height) = settings.bounds;
        let mut counts = vec![0; settings.type_count];
        for (i, p) in particles.iter().enumerate() {
            match counts.get_mut(p.type_id) {
                Some(count) => *count += 1,
                None => {
                    return Err(SimulationError::config(format!(
                        "particle {i} has type {} but type_count is {}",
                        p.type_id, settings.type_count
                    )))
                }
            }
            let inside = (0.0..=width).contains(&p.position.x)
                && (0.0..=height).contains(&p.position.y);
            if !inside {
                return Err(SimulationError::config(format!(
                    "particle {i} at ({}, {}) lies outside the bounds",
                    p.position.x, p.position.y
                )));
            }
        }
        settings.particle_count = particles.len();
        settings.distribution = TypeDistribution::Counts(counts);
        settings.validate()?;
        let rng = Self::seeded_rng(settings.seed);
        Self::assemble(settings, particles, rules, rng)
    }

    fn seeded_rng(seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn build(
        settings: SimulationSettings,
        distribution: &TypeDistribution,
        rules: RuleTable,
        mut rng: StdRng,
    ) -> Result<Self> {
        let types = distribution.assign(settings.particle_count, settings.type_count, &mut rng)?;
        let setter = settings.placement.setter();
        let particles: Vec<Particle> = types
            .into_iter()
            .map(|type_id| {
                let mut position = Position::zeros();
                setter.set_position(
                    &mut position,
                    type_id,
                    settings.type_count,
                    settings.bounds,
                    &mut rng,
                );
                Particle::new(type_id, position)
            })
            .collect();
        Self::assemble(settings, particles, rules, rng)
    }

    fn assemble(
        settings: SimulationSettings,
        particles: Vec<Particle>,
        rules: RuleTable,
        rng: StdRng,
    ) -> Result<Self> {
        if rules.size() != settings.type_count {
            return Err(SimulationError::RuleTableMismatch {
                expected: settings.type_count,
                actual: rules.size(),
            });
        }

        let (width, height) = settings.bounds;
        let physics = &settings.physics;
        let mut grid = SpatialGrid::new(width, height, physics.cutoff_radius);
        grid.rebuild(&particles);
        let cells = particles
            .iter()
            .map(|p| grid.cell_index_of(&p.position))
            .collect();

        info!(
            "simulation ready: {} particles, {} types, {}x{} grid of {} cells",
            particles.len(),
            settings.type_count,
            grid.cols(),
            grid.rows(),
            physics.cutoff_radius
        );

        Ok(Self {
            force_buffer: vec![Force::zeros(); particles.len()],
            evaluator: ForceEvaluator::new(physics.cutoff_radius, physics.beta),
            rule_generator: settings.rule_generator.generator(),
            particles,
            rules,
            grid,
            cells,
            settings,
            rng,
            tick: 0,
        })
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance one tick using the configured time step.
    pub fn advance(&mut self) {
        self.step(self.settings.physics.dt);
    }

    /// Advance one tick of length `dt`.
    pub fn step(&mut self, dt: f64) {
        if !dt.is_finite() || dt < 0.0 {
            warn!("ignoring step with invalid dt {dt}");
            return;
        }
        self.accumulate_forces();
        self.apply_forces(dt);
        self.integrate(dt);
        self.rehome();
        self.tick += 1;
    }

    /// Phase 1a: fill the force buffer from start-of-tick positions only.
    fn accumulate_forces(&mut self) {
        let scale = self.settings.physics.cutoff_radius * self.settings.physics.force;
        let particles = &self.particles;
        let grid = &self.grid;
        let rules = &self.rules;
        let evaluator = self.evaluator;
        let force_on = |i: usize| {
            let cell = grid.cell_index_of(&particles[i].position);
            evaluator.force_on(i, particles, rules, grid.neighbors_of(cell)) * scale
        };

        self.force_buffer.resize(particles.len(), Force::zeros());

        #[cfg(feature = "parallel")]
        {
            let chunk_size = (particles.len() / num_cpus::get()).max(1);
            self.force_buffer
                .par_chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| {
                    let start = chunk_idx * chunk_size;
                    for (offset, force) in chunk.iter_mut().enumerate() {
                        *force = force_on(start + offset);
                    }
                });
        }

        #[cfg(not(feature = "parallel"))]
        for (i, force) in self.force_buffer.iter_mut().enumerate() {
            *force = force_on(i);
        }
    }

    /// Phase 1b: damp, then accelerate.
    fn apply_forces(&mut self, dt: f64) {
        let friction = self.settings.physics.friction;
        let update = |(particle, force): (&mut Particle, &Force)| {
            particle.velocity *= friction;
            particle.velocity += *force * dt;
        };

        #[cfg(feature = "parallel")]
        self.particles
            .par_iter_mut()
            .zip(self.force_buffer.par_iter())
            .for_each(update);

        #[cfg(not(feature = "parallel"))]
        self.particles
            .iter_mut()
            .zip(self.force_buffer.iter())
            .for_each(update);
    }

    /// Phase 2: move, then bring escaped coordinates back inside.
    fn integrate(&mut self, dt: f64) {
        let bounds = self.settings.bounds;
        let boundary = self.settings.physics.boundary;
        let update = |particle: &mut Particle| {
            particle.position += particle.velocity * dt;
            boundary.apply(&mut particle.position, bounds);
        };

        #[cfg(feature = "parallel")]
        self.particles.par_iter_mut().for_each(update);

        #[cfg(not(feature = "parallel"))]
        self.particles.iter_mut().for_each(update);
    }

    /// Phase 3: move bucket entries for particles that changed cell.
    fn rehome(&mut self) {
        let mut migrated = 0usize;
        for (index, particle) in self.particles.iter().enumerate() {
            let new_cell = self.grid.cell_index_of(&particle.position);
            let old_cell = self.cells[index];
            if new_cell == old_cell {
                continue;
            }

            let stale = self.grid.relocate(index, old_cell, new_cell);
            debug_assert!(
                stale.is_none(),
                "particle {index} missing from cell {old_cell:?}"
            );
            if let Some(stale) = stale {
                warn!(
                    "particle {index} was not in cell {old_cell:?} ({stale} stale entries dropped), re-filing under {new_cell:?}"
                );
            }
            self.cells[index] = new_cell;
            migrated += 1;
        }
        trace!("tick {}: re-homed {migrated} particles", self.tick);
    }

    /// Replace the rule table with a fresh one from the configured generator.
    pub fn regenerate_rules(&mut self) {
        self.rules = self
            .rule_generator
            .generate(self.settings.type_count, &mut self.rng);
        info!(
            "regenerated {0}x{0} rule table at tick {1}",
            self.rules.size(),
            self.tick
        );
    }

    pub fn regenerate_rules_with(&mut self, generator: &dyn RuleGenerator) {
        self.rules = generator.generate(self.settings.type_count, &mut self.rng);
        debug!("rule table replaced at tick {}", self.tick);
    }

    pub fn set_rules(&mut self, rules: RuleTable) -> Result<()> {
        if rules.size() != self.settings.type_count {
            return Err(SimulationError::RuleTableMismatch {
                expected: self.settings.type_count,
                actual: rules.size(),
            });
        }
        self.rules = rules;
        Ok(())
    }

    /// Re-place every particle with the configured placement and zero its velocity.
    pub fn scatter(&mut self) {
        let setter = self.settings.placement.setter();
        let type_count = self.settings.type_count;
        let bounds = self.settings.bounds;
        for particle in &mut self.particles {
            setter.set_position(
                &mut particle.position,
                particle.type_id,
                type_count,
                bounds,
                &mut self.rng,
            );
            particle.velocity = Velocity::zeros();
        }
        self.grid.rebuild(&self.particles);
        for (cell, particle) in self.cells.iter_mut().zip(&self.particles) {
            *cell = self.grid.cell_index_of(&particle.position);
        }
    }

    pub fn type_counts(&self) -> Vec<usize> {
        let mut type_count = vec![0; self.settings.type_count];
        for particle in &self.particles {
            if let Some(count) = type_count.get_mut(particle.type_id) {
                *count += 1;
            }
        }
        type_count
    }

    pub fn take_snapshot(&self) -> PhysicsSnapshot {
        PhysicsSnapshot {
            positions: self.particles.iter().map(|p| p.position).collect(),
            velocities: self.particles.iter().map(|p| p.velocity).collect(),
            types: self.particles.iter().map(|p| p.type_id).collect(),
            particle_count: self.particles.len(),
            type_count: self.type_counts(),
        }
    }

    /// Mean particle speed, used by the driver's progress log.
    pub fn mean_speed(&self) -> f64 {
        let total: f64 = self.particles.iter().map(|p| p.velocity.norm()).sum();
        total / self.particles.len().max(1) as f64
    }

    /// Audit the grid: every particle filed exactly once, in the cell its position maps to.
    pub fn check_grid_consistency(&self) -> Result<()> {
        for (index, particle) in self.particles.iter().enumerate() {
            let expected = self.grid.cell_index_of(&particle.position);
            if !self.grid.bucket(expected).contains(&index) {
                return Err(SimulationError::GridInconsistency {
                    index,
                    expected,
                    found: self.grid.locate(index),
                });
            }
        }
        let stored = self.grid.len();
        if stored != self.particles.len() {
            return Err(SimulationError::GridReferenceCount {
                stored,
                particles: self.particles.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_settings::{BoundaryPolicy, PhysicsSettings};

    const CUTOFF: f64 = 10.0;

    fn settings(bounds: (f64, f64)) -> SimulationSettings {
        SimulationSettings {
            type_count: 1,
            bounds,
            seed: Some(1),
            physics: PhysicsSettings {
                cutoff_radius: CUTOFF,
                dt: 0.1,
                ..PhysicsSettings::default()
            },
            ..SimulationSettings::default()
        }
    }

    fn uniform_rules(coefficient: f64) -> RuleTable {
        let mut rules = RuleTable::new(1);
        rules.set(0, 0, coefficient);
        rules
    }

    fn pair(separation: f64, coefficient: f64) -> Simulation {
        let particles = vec![
            Particle::new(0, Position::new(50.0, 50.0)),
            Particle::new(0, Position::new(50.0 + separation, 50.0)),
        ];
        Simulation::with_particles(settings((100.0, 100.0)), particles, uniform_rules(coefficient))
            .unwrap()
    }

    #[test]
    fn mid_range_pair_attracts() {
        let mut sim = pair(0.5 * CUTOFF, 1.0);
        sim.advance();
        let [a, b] = sim.particles() else {
            panic!("expected two particles");
        };
        assert!(a.velocity.x > 0.0, "left particle should move right");
        assert!(b.velocity.x < 0.0, "right particle should move left");
        assert_eq!(a.velocity.y, 0.0);
    }

    #[test]
    fn hard_core_repels_for_any_rule_sign() {
        for coefficient in [1.0, 0.0, -1.0] {
            let mut sim = pair(0.1 * CUTOFF, coefficient);
            sim.advance();
            let particles = sim.particles();
            assert!(particles[0].velocity.x < 0.0);
            assert!(particles[1].velocity.x > 0.0);
        }
    }

    #[test]
    fn first_tick_velocity_is_scaled_force() {
        let mut sim = pair(0.5 * CUTOFF, 1.0);
        let dt = 0.1;
        sim.step(dt);
        let strength = force::interaction_strength(0.5, 1.0, 0.3);
        let expected = strength * CUTOFF * dt;
        assert!((sim.particles()[0].velocity.x - expected).abs() < 1e-12);
    }

    #[test]
    fn escaping_particle_is_recentred() {
        let (width, height) = (100.0, 80.0);
        let particles =
            vec![Particle::new(0, Position::new(width - 0.001, 20.0))
                .with_velocity(Velocity::new(5.0, 0.0))];
        let mut sim =
            Simulation::with_particles(settings((width, height)), particles, uniform_rules(0.0))
                .unwrap();
        sim.step(1.0);
        let p = &sim.particles()[0];
        assert_eq!(p.position.x, width / 2.0);
        assert_eq!(p.position.y, 20.0);
        sim.check_grid_consistency().unwrap();
    }

    #[test]
    fn clamp_policy_keeps_particle_on_the_edge() {
        let mut s = settings((100.0, 80.0));
        s.physics.boundary = BoundaryPolicy::Clamp;
        let particles = vec![
            Particle::new(0, Position::new(99.0, 1.0)).with_velocity(Velocity::new(50.0, -50.0))
        ];
        let mut sim = Simulation::with_particles(s, particles, uniform_rules(0.0)).unwrap();
        sim.step(1.0);
        assert_eq!(sim.particles()[0].position, Position::new(100.0, 0.0));
        sim.check_grid_consistency().unwrap();
    }

    #[test]
    fn migrating_particle_changes_bucket() {
        let particles =
            vec![Particle::new(0, Position::new(9.5, 5.0)).with_velocity(Velocity::new(10.0, 0.0))];
        let mut sim =
            Simulation::with_particles(settings((100.0, 100.0)), particles, uniform_rules(0.0))
                .unwrap();
        assert_eq!(sim.grid().locate(0), Some(CellIndex::new(0, 0)));
        sim.step(0.5);
        assert_eq!(sim.grid().locate(0), Some(CellIndex::new(0, 1)));
        assert_eq!(sim.grid().len(), 1);
    }

    #[test]
    fn grid_stays_consistent_and_population_is_conserved() {
        let s = SimulationSettings {
            particle_count: 400,
            bounds: (300.0, 200.0),
            seed: Some(42),
            physics: PhysicsSettings {
                cutoff_radius: 25.0,
                dt: 0.05,
                ..PhysicsSettings::default()
            },
            ..SimulationSettings::default()
        };
        let mut sim = Simulation::from_settings(s).unwrap();
        let counts = sim.type_counts();
        for _ in 0..60 {
            sim.advance();
            sim.check_grid_consistency().unwrap();
        }
        assert_eq!(sim.particles().len(), 400);
        assert_eq!(sim.grid().len(), 400);
        assert_eq!(sim.type_counts(), counts);
        assert_eq!(sim.tick(), 60);
    }

    #[test]
    fn invalid_configuration_fails_at_construction() {
        let mut s = settings((100.0, 100.0));
        s.physics.cutoff_radius = 0.0;
        assert!(matches!(
            Simulation::from_settings(s),
            Err(SimulationError::InvalidConfig(_))
        ));

        let s = SimulationSettings {
            particle_count: 0,
            ..SimulationSettings::default()
        };
        assert!(Simulation::from_settings(s).is_err());
    }

    #[test]
    fn explicit_particles_are_checked() {
        let outside = vec![Particle::new(0, Position::new(120.0, 5.0))];
        assert!(Simulation::with_particles(
            settings((100.0, 100.0)),
            outside,
            uniform_rules(0.0)
        )
        .is_err());

        let bad_type = vec![Particle::new(3, Position::new(10.0, 5.0))];
        assert!(Simulation::with_particles(
            settings((100.0, 100.0)),
            bad_type,
            uniform_rules(0.0)
        )
        .is_err());
    }

    #[test]
    fn rule_table_size_must_match_type_count() {
        let s = SimulationSettings {
            particle_count: 10,
            seed: Some(3),
            ..SimulationSettings::default()
        };
        let err = Simulation::new(s.clone(), &TypeDistribution::Equal, RuleTable::new(2))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SimulationError::RuleTableMismatch {
                expected: 4,
                actual: 2
            }
        ));

        let mut sim = Simulation::new(s, &TypeDistribution::Equal, RuleTable::new(4)).unwrap();
        assert!(sim.set_rules(RuleTable::new(3)).is_err());
        assert!(sim.set_rules(RuleTable::new(4)).is_ok());
    }

    #[test]
    fn regenerate_rules_replaces_the_table() {
        let s = SimulationSettings {
            particle_count: 10,
            seed: Some(8),
            ..SimulationSettings::default()
        };
        let mut sim = Simulation::new(s, &TypeDistribution::Random, RuleTable::new(4)).unwrap();
        assert_eq!(sim.rules(), &RuleTable::new(4));
        sim.regenerate_rules();
        assert_eq!(sim.rules().size(), 4);
        assert_ne!(sim.rules(), &RuleTable::new(4));

        sim.regenerate_rules_with(&rules::ZeroRules);
        assert_eq!(sim.rules(), &RuleTable::new(4));
    }

    #[test]
    fn scatter_rebuilds_the_grid() {
        let s = SimulationSettings {
            particle_count: 50,
            seed: Some(4),
            ..SimulationSettings::default()
        };
        let mut sim = Simulation::from_settings(s).unwrap();
        for _ in 0..5 {
            sim.advance();
        }
        sim.scatter();
        assert!(sim.particles().iter().all(|p| p.velocity == Velocity::zeros()));
        sim.check_grid_consistency().unwrap();
    }

    #[test]
    fn non_finite_dt_is_ignored() {
        let mut sim = pair(0.5 * CUTOFF, 1.0);
        let before = sim.take_snapshot();
        sim.step(f64::NAN);
        assert_eq!(sim.take_snapshot(), before);
        assert_eq!(sim.tick(), 0);
    }

    #[test]
    fn negative_dt_is_ignored() {
        let mut sim = pair(0.5 * CUTOFF, 1.0);
        let before = sim.take_snapshot();
        sim.step(-0.05);
        assert_eq!(sim.take_snapshot(), before);
        assert_eq!(sim.tick(), 0);
    }

    #[test]
    fn duplicate_reference_is_reported_as_a_count_mismatch() {
        let mut sim = pair(0.5 * CUTOFF, 1.0);
        let elsewhere = CellIndex::new(sim.grid.rows() - 1, sim.grid.cols() - 1);
        assert_ne!(elsewhere, sim.cells[0]);
        sim.grid.insert(elsewhere, 0);

        match sim.check_grid_consistency() {
            Err(SimulationError::GridReferenceCount { stored, particles }) => {
                assert_eq!((stored, particles), (3, 2));
            }
            other => panic!("expected a reference count error, got {other:?}"),
        }
    }

    #[test]
    fn misfiled_particle_is_refiled_under_its_cell() {
        let mut sim = pair(0.5 * CUTOFF, 1.0);
        let home = sim.cells[0];
        let wrong = CellIndex::new(sim.grid.rows() - 1, sim.grid.cols() - 1);
        assert!(sim.grid.remove(home, 0));
        sim.grid.insert(wrong, 0);
        assert!(matches!(
            sim.check_grid_consistency(),
            Err(SimulationError::GridInconsistency { index: 0, .. })
        ));

        let target = sim.grid.cell_index_of(&sim.particles[0].position);
        assert_eq!(sim.grid.relocate(0, home, target), Some(1));
        sim.check_grid_consistency().unwrap();
    }
}
