use crate::particle::{Force, Particle};
use crate::physics::rules::RuleTable;

/// Separations at or below this are treated as coincident and skipped.
pub const MIN_DISTANCE: f64 = 1e-9;

/// Signed interaction strength at normalised distance `d = distance / cutoff`.
///
/// Below `beta` every pair repels, ramping linearly from -1 at contact to 0
/// at `beta`. Between `beta` and 1 the strength is a tent scaled by the rule
/// coefficient, peaking at `(1 + beta) / 2`. From 1 onwards it is zero.
pub fn interaction_strength(d: f64, coefficient: f64, beta: f64) -> f64 {
    if d < beta {
        d / beta - 1.0
    } else if d < 1.0 {
        coefficient * (1.0 - (2.0 * d - 1.0 - beta).abs() / (1.0 - beta))
    } else {
        0.0
    }
}

/// Accumulates the pairwise forces acting on one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceEvaluator {
    pub cutoff: f64,
    pub beta: f64,
}

impl ForceEvaluator {
    pub fn new(cutoff: f64, beta: f64) -> Self {
        Self { cutoff, beta }
    }

    /// Sum of unit-direction forces on `particles[index]` from `candidates`.
    ///
    /// Candidates are arena indices; the particle itself is recognised by
    /// index, never by position. The result is not yet scaled by the cutoff.
    pub fn force_on<I>(
        &self,
        index: usize,
        particles: &[Particle],
        rules: &RuleTable,
        candidates: I,
    ) -> Force
    where
        I: IntoIterator<Item = usize>,
    {
        let mut total = Force::zeros();
        let Some(particle) = particles.get(index) else {
            return total;
        };

        for j in candidates {
            if j == index {
                continue;
            }
            let Some(other) = particles.get(j) else {
                continue;
            };

            let delta = other.position - particle.position;
            let distance = delta.norm();
            if distance <= MIN_DISTANCE || distance >= self.cutoff {
                continue;
            }

            let coefficient = rules.get(particle.type_id, other.type_id);
            let strength = interaction_strength(distance / self.cutoff, coefficient, self.beta);
            total += delta * (strength / distance);
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Position;

    const BETA: f64 = 0.3;

    #[test]
    fn continuous_at_beta_and_zero_at_cutoff() {
        for coefficient in [-1.0, -0.4, 0.0, 0.6, 1.0] {
            let below = interaction_strength(BETA - 1e-12, coefficient, BETA);
            let at = interaction_strength(BETA, coefficient, BETA);
            assert!((below - at).abs() < 1e-9, "jump at beta for {coefficient}");
            assert_eq!(interaction_strength(1.0, coefficient, BETA), 0.0);
            assert_eq!(interaction_strength(1.7, coefficient, BETA), 0.0);
        }
    }

    #[test]
    fn hard_core_repels_regardless_of_coefficient() {
        assert_eq!(interaction_strength(0.0, 1.0, BETA), -1.0);
        for coefficient in [-1.0, 0.0, 1.0] {
            assert!(interaction_strength(0.1, coefficient, BETA) < 0.0);
        }
    }

    #[test]
    fn tent_peaks_at_coefficient() {
        let peak = (1.0 + BETA) / 2.0;
        assert!((interaction_strength(peak, 0.8, BETA) - 0.8).abs() < 1e-12);
        assert!((interaction_strength(peak, -0.5, BETA) + 0.5).abs() < 1e-12);
        assert!(interaction_strength(0.5, 1.0, BETA) > 0.0);
    }

    fn pair(separation: f64) -> Vec<Particle> {
        vec![
            Particle::new(0, Position::new(50.0, 50.0)),
            Particle::new(0, Position::new(50.0 + separation, 50.0)),
        ]
    }

    #[test]
    fn attraction_points_at_the_other_particle() {
        let evaluator = ForceEvaluator::new(10.0, BETA);
        let mut rules = RuleTable::new(1);
        rules.set(0, 0, 1.0);
        let particles = pair(5.0);

        let force = evaluator.force_on(0, &particles, &rules, [0, 1]);
        assert!(force.x > 0.0);
        assert_eq!(force.y, 0.0);
    }

    #[test]
    fn particle_never_pushes_itself() {
        let evaluator = ForceEvaluator::new(10.0, BETA);
        let rules = RuleTable::new(1);
        let particles = pair(5.0);
        assert_eq!(
            evaluator.force_on(0, &particles, &rules, [0, 0, 0]),
            Force::zeros()
        );
    }

    #[test]
    fn coincident_particles_are_skipped() {
        let evaluator = ForceEvaluator::new(10.0, BETA);
        let rules = RuleTable::new(1);
        let particles = pair(0.0);
        assert_eq!(
            evaluator.force_on(1, &particles, &rules, [0, 1]),
            Force::zeros()
        );
    }

    #[test]
    fn beyond_cutoff_and_unknown_indices_contribute_nothing() {
        let evaluator = ForceEvaluator::new(10.0, BETA);
        let mut rules = RuleTable::new(1);
        rules.set(0, 0, 1.0);
        let particles = pair(10.0);
        assert_eq!(
            evaluator.force_on(0, &particles, &rules, [1, 17]),
            Force::zeros()
        );
        assert_eq!(
            evaluator.force_on(17, &particles, &rules, [0, 1]),
            Force::zeros()
        );
    }

    #[test]
    fn rule_lookup_uses_acting_type_first() {
        let evaluator = ForceEvaluator::new(10.0, BETA);
        let mut rules = RuleTable::new(2);
        rules.set(0, 1, 1.0);
        rules.set(1, 0, -1.0);
        let particles = vec![
            Particle::new(0, Position::new(10.0, 10.0)),
            Particle::new(1, Position::new(10.0, 16.0)),
        ];
        // Type 0 chases type 1 while type 1 flees type 0
        let on_zero = evaluator.force_on(0, &particles, &rules, [1]);
        let on_one = evaluator.force_on(1, &particles, &rules, [0]);
        assert!(on_zero.y > 0.0);
        assert!(on_one.y > 0.0);
    }
}
