//! Closed-form equations of motion for two- and three-link chains.
//!
//! The expressions below come from the planar Lagrangian of a serial chain
//! in absolute angles, derived offline (see the coefficient notes); nothing
//! symbolic runs at simulation time. For link i with mass m, length l, com
//! offset c, and com inertia I, the equations of motion take the form
//!
//! ```text
//! M[i][j] = a_i                      (i == j)
//! M[i][j] = k_ij · cos(θ_i − θ_j)    (i != j)
//! bias_i  = Σ_j k_ij · sin(θ_i − θ_j) · θdot_j² + g_i · sin(θ_i)
//! ```
//!
//! with configuration-independent coefficients
//!
//! ```text
//! a_i  = I_i + m_i c_i² + (Σ masses distal of i) · l_i²
//! k_ij = l_i · (m_j c_j + (Σ masses distal of j) · l_j)    (i < j, k_ji = k_ij)
//! g_i  = g · (m_i c_i + (Σ masses distal of i) · l_i)
//! ```
//!
//! The coefficients are computed once at backend construction and cached;
//! each call is then trigonometry plus a 2×2 or 3×3 solve.

use crate::backend::{BackendError, DynamicsBackend, SingularityError, MASS_MATRIX_DET_EPSILON};
use crate::model::ModelSpec;
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Vector2, Vector3};

/// Cached coefficients for a two-link chain.
#[derive(Debug, Clone, Copy)]
struct TwoLink {
    a1: f64,
    a2: f64,
    k12: f64,
    g1: f64,
    g2: f64,
}

/// Cached coefficients for a three-link chain.
#[derive(Debug, Clone, Copy)]
struct ThreeLink {
    a1: f64,
    a2: f64,
    a3: f64,
    k12: f64,
    k13: f64,
    k23: f64,
    g1: f64,
    g2: f64,
    g3: f64,
}

#[derive(Debug, Clone, Copy)]
enum Equations {
    Two(TwoLink),
    Three(ThreeLink),
}

/// Analytic backend for chains of exactly two or three links.
pub struct ClosedFormBackend {
    eq: Equations,
}

impl ClosedFormBackend {
    pub(crate) fn new(model: &ModelSpec) -> Result<Self, BackendError> {
        let s = model.segments();
        let g = model.gravity();

        // a_i, k_ij, g_i per the module derivation.
        let diag = |i: usize| {
            let tail = if i + 1 < s.len() {
                model.tail_mass(i + 1)
            } else {
                0.0
            };
            s[i].inertia_pivot + tail * s[i].length * s[i].length
        };
        let coupling = |i: usize, j: usize| {
            let tail = if j + 1 < s.len() {
                model.tail_mass(j + 1)
            } else {
                0.0
            };
            s[i].length * (s[j].mass * s[j].com_offset + tail * s[j].length)
        };
        let grav = |i: usize| {
            let tail = if i + 1 < s.len() {
                model.tail_mass(i + 1)
            } else {
                0.0
            };
            g * (s[i].mass * s[i].com_offset + tail * s[i].length)
        };

        let eq = match s.len() {
            2 => Equations::Two(TwoLink {
                a1: diag(0),
                a2: diag(1),
                k12: coupling(0, 1),
                g1: grav(0),
                g2: grav(1),
            }),
            3 => Equations::Three(ThreeLink {
                a1: diag(0),
                a2: diag(1),
                a3: diag(2),
                k12: coupling(0, 1),
                k13: coupling(0, 2),
                k23: coupling(1, 2),
                g1: grav(0),
                g2: grav(1),
                g3: grav(2),
            }),
            dof => return Err(BackendError::UnsupportedChainLength { dof }),
        };
        Ok(Self { eq })
    }

    fn mass_matrix_2(c: &TwoLink, q: &[f64]) -> Matrix2<f64> {
        let c12 = (q[0] - q[1]).cos();
        Matrix2::new(c.a1, c.k12 * c12, c.k12 * c12, c.a2)
    }

    fn bias_2(c: &TwoLink, q: &[f64], qdot: &[f64]) -> Vector2<f64> {
        let s12 = (q[0] - q[1]).sin();
        Vector2::new(
            c.k12 * s12 * qdot[1] * qdot[1] + c.g1 * q[0].sin(),
            -c.k12 * s12 * qdot[0] * qdot[0] + c.g2 * q[1].sin(),
        )
    }

    fn mass_matrix_3(c: &ThreeLink, q: &[f64]) -> Matrix3<f64> {
        let c12 = (q[0] - q[1]).cos();
        let c13 = (q[0] - q[2]).cos();
        let c23 = (q[1] - q[2]).cos();
        Matrix3::new(
            c.a1,
            c.k12 * c12,
            c.k13 * c13,
            c.k12 * c12,
            c.a2,
            c.k23 * c23,
            c.k13 * c13,
            c.k23 * c23,
            c.a3,
        )
    }

    fn bias_3(c: &ThreeLink, q: &[f64], qdot: &[f64]) -> Vector3<f64> {
        let s12 = (q[0] - q[1]).sin();
        let s13 = (q[0] - q[2]).sin();
        let s23 = (q[1] - q[2]).sin();
        let w1 = qdot[0] * qdot[0];
        let w2 = qdot[1] * qdot[1];
        let w3 = qdot[2] * qdot[2];
        Vector3::new(
            c.k12 * s12 * w2 + c.k13 * s13 * w3 + c.g1 * q[0].sin(),
            -c.k12 * s12 * w1 + c.k23 * s23 * w3 + c.g2 * q[1].sin(),
            -c.k13 * s13 * w1 - c.k23 * s23 * w2 + c.g3 * q[2].sin(),
        )
    }
}

impl DynamicsBackend for ClosedFormBackend {
    fn dof(&self) -> usize {
        match self.eq {
            Equations::Two(_) => 2,
            Equations::Three(_) => 3,
        }
    }

    fn mass_matrix(&self, q: &[f64]) -> DMatrix<f64> {
        match &self.eq {
            Equations::Two(c) => {
                let m = Self::mass_matrix_2(c, q);
                DMatrix::from_iterator(2, 2, m.iter().copied())
            }
            Equations::Three(c) => {
                let m = Self::mass_matrix_3(c, q);
                DMatrix::from_iterator(3, 3, m.iter().copied())
            }
        }
    }

    fn bias_forces(&self, q: &[f64], qdot: &[f64]) -> DVector<f64> {
        match &self.eq {
            Equations::Two(c) => DVector::from_column_slice(Self::bias_2(c, q, qdot).as_slice()),
            Equations::Three(c) => {
                DVector::from_column_slice(Self::bias_3(c, q, qdot).as_slice())
            }
        }
    }

    fn accelerations(
        &self,
        q: &[f64],
        qdot: &[f64],
        tau: &[f64],
    ) -> Result<DVector<f64>, SingularityError> {
        match &self.eq {
            Equations::Two(c) => {
                let m = Self::mass_matrix_2(c, q);
                let determinant = m.determinant();
                if !determinant.is_finite() || determinant.abs() < MASS_MATRIX_DET_EPSILON {
                    return Err(SingularityError { determinant });
                }
                let bias = Self::bias_2(c, q, qdot);
                let rhs = Vector2::new(tau[0] - bias[0], tau[1] - bias[1]);
                let qdd = m
                    .lu()
                    .solve(&rhs)
                    .ok_or(SingularityError { determinant })?;
                Ok(DVector::from_column_slice(qdd.as_slice()))
            }
            Equations::Three(c) => {
                let m = Self::mass_matrix_3(c, q);
                let determinant = m.determinant();
                if !determinant.is_finite() || determinant.abs() < MASS_MATRIX_DET_EPSILON {
                    return Err(SingularityError { determinant });
                }
                let bias = Self::bias_3(c, q, qdot);
                let rhs =
                    Vector3::new(tau[0] - bias[0], tau[1] - bias[1], tau[2] - bias[2]);
                let qdd = m
                    .lu()
                    .solve(&rhs)
                    .ok_or(SingularityError { determinant })?;
                Ok(DVector::from_column_slice(qdd.as_slice()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmentParams;

    fn double_rod() -> ModelSpec {
        ModelSpec::build(vec![
            SegmentParams::uniform_rod(1.0, 1.0),
            SegmentParams::uniform_rod(1.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn hanging_at_rest_has_zero_acceleration() {
        let model = double_rod();
        let backend = ClosedFormBackend::new(&model).unwrap();
        let qdd = backend
            .accelerations(&[0.0, 0.0], &[0.0, 0.0], &[0.0, 0.0])
            .unwrap();
        assert!(qdd[0].abs() < 1e-12);
        assert!(qdd[1].abs() < 1e-12);
    }

    #[test]
    fn displaced_chain_swings_back() {
        let model = double_rod();
        let backend = ClosedFormBackend::new(&model).unwrap();
        let qdd = backend
            .accelerations(&[0.3, 0.3], &[0.0, 0.0], &[0.0, 0.0])
            .unwrap();
        // Gravity pulls the root link back toward the vertical. (The second
        // link's sign is configuration-dependent: its falling pivot can drag
        // it forward.)
        assert!(qdd[0] < 0.0);
    }

    #[test]
    fn mass_matrix_is_symmetric_with_positive_diagonal() {
        let model = ModelSpec::build(vec![
            SegmentParams::uniform_rod(1.2, 0.9),
            SegmentParams::uniform_rod(0.7, 1.1),
            SegmentParams::uniform_rod(0.4, 0.6),
        ])
        .unwrap();
        let backend = ClosedFormBackend::new(&model).unwrap();
        let m = backend.mass_matrix(&[0.4, -0.2, 1.1]);
        for i in 0..3 {
            assert!(m[(i, i)] > 0.0);
            for j in 0..3 {
                assert!((m[(i, j)] - m[(j, i)]).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn point_mass_double_pendulum_matches_textbook_coefficients() {
        // Point masses at the link tips: c = l, I_com = 0.
        let (m1, m2, l1, l2) = (2.0, 1.0, 0.8, 0.5);
        let model = ModelSpec::build(vec![
            SegmentParams {
                mass: m1,
                length: l1,
                com_offset: l1,
                inertia_com: 0.0,
            },
            SegmentParams {
                mass: m2,
                length: l2,
                com_offset: l2,
                inertia_com: 0.0,
            },
        ])
        .unwrap();
        let backend = ClosedFormBackend::new(&model).unwrap();

        let q = [0.7, -0.4];
        let m = backend.mass_matrix(&q);
        assert!((m[(0, 0)] - (m1 + m2) * l1 * l1).abs() < 1e-12);
        assert!((m[(1, 1)] - m2 * l2 * l2).abs() < 1e-12);
        assert!((m[(0, 1)] - m2 * l1 * l2 * (q[0] - q[1]).cos()).abs() < 1e-12);
    }

    #[test]
    fn degenerate_configuration_reports_singularity() {
        // All mass concentrated at the second pivot with no rotational
        // inertia: passes validation but is physically degenerate.
        let model = ModelSpec::build(vec![
            SegmentParams::uniform_rod(1.0, 1.0),
            SegmentParams {
                mass: 1.0,
                length: 1.0,
                com_offset: 0.0,
                inertia_com: 0.0,
            },
        ])
        .unwrap();
        let backend = ClosedFormBackend::new(&model).unwrap();
        let err = backend
            .accelerations(&[0.1, 0.2], &[0.0, 0.0], &[0.0, 0.0])
            .unwrap_err();
        assert!(err.determinant.abs() < MASS_MATRIX_DET_EPSILON);
    }
}
