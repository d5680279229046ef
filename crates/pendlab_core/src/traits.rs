use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the simulation numerics.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order system over a flat phase vector.
///
/// The dynamics engine packs a mechanism's state as `[q, qdot]` and exposes
/// it through this trait so integrators stay independent of the physics.
pub trait PhaseSystem<T: Scalar> {
    /// Length of the phase vector.
    fn phase_dim(&self) -> usize;

    /// Evaluates the phase derivative at time `t`.
    /// y: current phase vector
    /// out: buffer to write dy/dt into (length `phase_dim()`)
    fn derivative(&self, t: T, y: &[T], out: &mut [T]);
}

/// A fixed-step explicit integrator.
pub trait FixedStep<T: Scalar> {
    /// Advances `phase` by one step of size dt.
    /// t: current time (updated after the step)
    fn step(&mut self, system: &impl PhaseSystem<T>, t: &mut T, phase: &mut [T], dt: T);
}
