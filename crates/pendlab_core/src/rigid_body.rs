//! Generic rigid-body backend: recursive evaluation over the descriptor.
//!
//! Works for any chain length by walking the segments instead of baking the
//! equations in. The chain is planar with absolute angles, so kinematics
//! reduce to 2-D vectors: with `u(θ)` the unit vector along a link and
//! `u'`, `u''` its angle derivatives, joint origins, center-of-mass
//! velocities and velocity-product accelerations accumulate root-to-tip, and
//! per-segment inertial forces project back tip-to-root into generalized
//! coordinates.
//!
//! The bias pass runs with accelerations held at zero and returns its result
//! directly; the mass matrix is composed from per-segment contributions
//! (translational `m·r_a·r_b·cos(θ_a−θ_b)` plus the rotational inertia on
//! the diagonal).

use crate::backend::{solve_joint_space, DynamicsBackend, SingularityError};
use crate::model::ModelSpec;
use nalgebra::{DMatrix, DVector, Vector2};

/// dθ derivative of the link direction `u(θ) = (sin θ, −cos θ)`: the
/// direction a point on the link moves when the link rotates.
fn u_prime(theta: f64) -> Vector2<f64> {
    Vector2::new(theta.cos(), theta.sin())
}

/// Second dθ derivative of `u`: the centripetal direction.
fn u_second(theta: f64) -> Vector2<f64> {
    Vector2::new(-theta.sin(), theta.cos())
}

/// Descriptor-driven backend for serial chains of any length.
pub struct RigidBodyBackend {
    model: ModelSpec,
}

impl RigidBodyBackend {
    pub(crate) fn new(model: &ModelSpec) -> Self {
        Self {
            model: model.clone(),
        }
    }

    /// Moment arm of coordinate `k` on segment `i`'s center of mass.
    fn arm(&self, i: usize, k: usize) -> f64 {
        let s = self.model.segments();
        if k < i {
            s[k].length
        } else if k == i {
            s[i].com_offset
        } else {
            0.0
        }
    }
}

impl DynamicsBackend for RigidBodyBackend {
    fn dof(&self) -> usize {
        self.model.dof()
    }

    fn mass_matrix(&self, q: &[f64]) -> DMatrix<f64> {
        let n = self.model.dof();
        let s = self.model.segments();
        let mut m = DMatrix::zeros(n, n);

        // Each segment contributes its translational coupling to every pair
        // of ancestor coordinates and its own rotational inertia.
        for i in 0..n {
            m[(i, i)] += s[i].inertia_com;
            for a in 0..=i {
                let ra = self.arm(i, a);
                for b in 0..=i {
                    m[(a, b)] += s[i].mass * ra * self.arm(i, b) * (q[a] - q[b]).cos();
                }
            }
        }
        m
    }

    fn bias_forces(&self, q: &[f64], qdot: &[f64]) -> DVector<f64> {
        let n = self.model.dof();
        let s = self.model.segments();
        let gravity = Vector2::new(0.0, -self.model.gravity());

        // Forward pass: joint-origin accelerations with qddot = 0, then each
        // segment's inertial force m·(a_com − g).
        let mut forces = vec![Vector2::zeros(); n];
        let mut a_joint = Vector2::zeros();
        for i in 0..n {
            let a_com = a_joint + u_second(q[i]) * (s[i].com_offset * qdot[i] * qdot[i]);
            forces[i] = (a_com - gravity) * s[i].mass;
            a_joint += u_second(q[i]) * (s[i].length * qdot[i] * qdot[i]);
        }

        // Backward pass: accumulate distal forces toward the root and
        // project onto each coordinate's motion direction. No rotational
        // term appears because link angular accelerations are zero here.
        let mut bias = DVector::zeros(n);
        let mut distal = Vector2::zeros();
        for k in (0..n).rev() {
            let through_joint = forces[k] * s[k].com_offset + distal * s[k].length;
            bias[k] = u_prime(q[k]).dot(&through_joint);
            distal += forces[k];
        }
        bias
    }

    fn accelerations(
        &self,
        q: &[f64],
        qdot: &[f64],
        tau: &[f64],
    ) -> Result<DVector<f64>, SingularityError> {
        let m = self.mass_matrix(q);
        let bias = self.bias_forces(q, qdot);
        let rhs = DVector::from_fn(self.model.dof(), |i, _| tau[i] - bias[i]);
        solve_joint_space(&m, rhs)
    }
}
