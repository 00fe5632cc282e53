use nalgebra::Vector2;

pub type Position = Vector2<f64>;
pub type Velocity = Vector2<f64>;
pub type Force = Vector2<f64>;

/// A typed point particle. The simulation owns these in a single arena;
/// everything else refers to a particle by its index in that arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Position,
    pub velocity: Velocity,
    pub type_id: usize,
}

impl Particle {
    pub fn new(type_id: usize, position: Position) -> Self {
        Self {
            position,
            velocity: Velocity::zeros(),
            type_id,
        }
    }

    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }
}
