//! Physics backend abstraction.
//!
//! A backend turns a joint-space state into joint accelerations by forming
//! the equations of motion `M(q)·qdd = tau − bias(q, qdot)` and solving the
//! dense system. Two interchangeable strategies implement it: the
//! closed-form analytic backend (chains of exactly 2 or 3) and the generic
//! recursive rigid-body backend (any length). Both must agree numerically
//! for the same model and state.

use crate::closed_form::ClosedFormBackend;
use crate::model::ModelSpec;
use crate::rigid_body::RigidBodyBackend;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mass matrices with a determinant below this are treated as degenerate.
/// Only physically degenerate configurations get here (e.g. a link carrying
/// all of its mass at the pivot with no rotational inertia); callers should
/// treat it as a configuration bug, not a transient fault.
pub const MASS_MATRIX_DET_EPSILON: f64 = 1e-12;

/// The mass matrix was not well-conditioned at the requested configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("mass matrix is singular (determinant {determinant:e})")]
pub struct SingularityError {
    pub determinant: f64,
}

/// Strategy for evaluating the equations of motion.
///
/// `bias_forces` returns the Coriolis/centrifugal + gravity vector as a
/// direct function value. Implementations must not rely on a shared internal
/// buffer being mutated as a side effect of some other call; that pattern
/// silently returns stale data the moment call order changes.
pub trait DynamicsBackend {
    /// Number of joints this backend was built for.
    fn dof(&self) -> usize;

    /// Configuration-dependent joint-space mass matrix M(q).
    fn mass_matrix(&self, q: &[f64]) -> DMatrix<f64>;

    /// Velocity-product and gravity torques at (q, qdot), accelerations
    /// held at zero.
    fn bias_forces(&self, q: &[f64], qdot: &[f64]) -> DVector<f64>;

    /// Joint accelerations under the applied torques `tau`.
    fn accelerations(
        &self,
        q: &[f64],
        qdot: &[f64],
        tau: &[f64],
    ) -> Result<DVector<f64>, SingularityError>;
}

/// Solves M·x = rhs with an explicit conditioning check, shared by both
/// backends so the singularity policy lives in one place.
pub(crate) fn solve_joint_space(
    m: &DMatrix<f64>,
    rhs: DVector<f64>,
) -> Result<DVector<f64>, SingularityError> {
    let determinant = m.determinant();
    if !determinant.is_finite() || determinant.abs() < MASS_MATRIX_DET_EPSILON {
        return Err(SingularityError { determinant });
    }
    m.clone()
        .lu()
        .solve(&rhs)
        .ok_or(SingularityError { determinant })
}

/// Which backend strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Hardcoded analytic equations, chains of exactly 2 or 3 links.
    ClosedForm,
    /// Recursive Newton-Euler-style evaluation, any chain length.
    RigidBody,
}

/// The requested backend cannot serve the given model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("closed-form backend supports 2 or 3 links, model has {dof}")]
    UnsupportedChainLength { dof: usize },
}

impl BackendKind {
    /// Builds a backend of this kind for `model`.
    pub fn create(self, model: &ModelSpec) -> Result<Box<dyn DynamicsBackend>, BackendError> {
        let backend: Box<dyn DynamicsBackend> = match self {
            BackendKind::ClosedForm => Box::new(ClosedFormBackend::new(model)?),
            BackendKind::RigidBody => Box::new(RigidBodyBackend::new(model)),
        };
        tracing::info!(kind = ?self, dof = model.dof(), "backend created");
        Ok(backend)
    }
}
