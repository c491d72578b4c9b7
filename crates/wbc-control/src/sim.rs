//! Spring-damper contact used to close the force loop without hardware.
//!
//! The commanded joint velocity is integrated into a joint angle.  Past the
//! contact angle `theta0` (along `direction`) the environment pushes back
//! with `k·φ + d·φ̇ + m·φ̈`; before it the torque is zero.

#[derive(Debug, Clone)]
pub struct ContactSimulation {
    theta: f64,
    theta0: f64,
    direction: f64,
    period: f64,
    stiffness: f64,
    damping: f64,
    mass: f64,
    last_velocity: f64,
}

impl ContactSimulation {
    /// Joint starting at `theta`, touching at `theta0` when moving along the
    /// sign of `direction`.
    pub fn new(theta: f64, theta0: f64, direction: f64, period: f64) -> Self {
        Self {
            theta,
            theta0,
            direction: direction.signum(),
            period,
            stiffness: 100.0,
            damping: 10.0,
            mass: 0.0,
            last_velocity: 0.0,
        }
    }

    pub fn with_stiffness(mut self, k: f64) -> Self {
        self.stiffness = k;
        self
    }

    pub fn with_damping(mut self, d: f64) -> Self {
        self.damping = d;
        self
    }

    pub fn with_mass(mut self, m: f64) -> Self {
        self.mass = m;
        self
    }

    pub fn position(&self) -> f64 {
        self.theta
    }

    /// Integrate `velocity` over one period and return the contact torque.
    pub fn step(&mut self, velocity: f64) -> f64 {
        self.theta += velocity * self.period;
        let phi = (self.theta - self.theta0) * self.direction;
        let accel = (velocity - self.last_velocity) / self.period;
        self.last_velocity = velocity;
        if phi < 0.0 {
            return 0.0;
        }
        let phi_dot = velocity * self.direction;
        let phi_ddot = accel * self.direction;
        self.direction * (self.stiffness * phi + self.damping * phi_dot + self.mass * phi_ddot)
    }
}
