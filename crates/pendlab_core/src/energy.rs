//! Mechanical energy diagnostics.
//!
//! Kinetic energy goes through the backend's mass matrix
//! (`½·qdotᵀ·M(q)·qdot`), so it is consistent with whichever strategy is
//! integrating the motion. Potential energy is measured against the fixed
//! pivot as datum, so a chain hanging at rest sits at its minimum.

use crate::backend::DynamicsBackend;
use crate::model::{ModelSpec, State};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Energy bundle reported by the engine's diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub kinetic: f64,
    pub potential: f64,
    pub total: f64,
}

/// ½·qdotᵀ·M(q)·qdot through the backend's mass matrix.
pub fn kinetic_energy(backend: &dyn DynamicsBackend, q: &[f64], qdot: &[f64]) -> f64 {
    let m = backend.mass_matrix(q);
    let v = DVector::from_column_slice(qdot);
    0.5 * v.dot(&(&m * &v))
}

/// Gravitational potential energy, pivot datum: `Σ m_i · g · y_com_i`.
pub fn potential_energy(model: &ModelSpec, q: &[f64]) -> f64 {
    let g = model.gravity();
    let mut pe = 0.0;
    let mut joint_y = 0.0;
    for (i, seg) in model.segments().iter().enumerate() {
        let com_y = joint_y - seg.com_offset * q[i].cos();
        pe += seg.mass * g * com_y;
        joint_y -= seg.length * q[i].cos();
    }
    pe
}

/// Kinetic + potential at `state`.
pub fn total_energy(model: &ModelSpec, backend: &dyn DynamicsBackend, state: &State) -> Energy {
    let kinetic = kinetic_energy(backend, &state.q, &state.qdot);
    let potential = potential_energy(model, &state.q);
    Energy {
        kinetic,
        potential,
        total: kinetic + potential,
    }
}
