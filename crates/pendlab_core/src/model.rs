//! Chain descriptor: segments, validation, and cached derived constants.
//!
//! A model is an ordered root-to-tip sequence of rigid links, each joined to
//! its predecessor by a revolute joint; the root hangs from a fixed pivot.
//! Angles are absolute, measured from the downward vertical. All derived
//! physical constants are computed once here, at build time, and stored as
//! plain values — the stepping loop never recomputes them.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard gravity, m/s².
pub const GRAVITY_M_S2: f64 = 9.81;

/// User-facing physical description of one rigid link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentParams {
    /// Mass, kg.
    pub mass: f64,
    /// Link length from proximal to distal joint, m.
    pub length: f64,
    /// Distance of the center of mass from the proximal joint, m.
    pub com_offset: f64,
    /// Moment of inertia about the segment's own center of mass, kg·m².
    pub inertia_com: f64,
}

impl SegmentParams {
    /// A uniform thin rod: com at the middle, I = m·l²/12.
    pub fn uniform_rod(mass: f64, length: f64) -> Self {
        Self {
            mass,
            length,
            com_offset: length / 2.0,
            inertia_com: mass * length * length / 12.0,
        }
    }
}

/// A validated link with its derived constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub mass: f64,
    pub length: f64,
    pub com_offset: f64,
    pub inertia_com: f64,
    /// Inertia about the proximal joint (parallel-axis), cached at build.
    pub inertia_pivot: f64,
}

/// Why a segment sequence was rejected. Always names the first offending
/// segment (root is index 0).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("model must contain at least one segment")]
    EmptyChain,
    #[error("segment {index}: {name} must be finite")]
    NonFiniteParameter { index: usize, name: &'static str },
    #[error("segment {index}: mass must be strictly positive, got {value}")]
    NonPositiveMass { index: usize, value: f64 },
    #[error("segment {index}: length must be strictly positive, got {value}")]
    NonPositiveLength { index: usize, value: f64 },
    #[error("segment {index}: com_offset must lie in [0, length], got {value}")]
    ComOffsetOutOfRange { index: usize, value: f64 },
    #[error("segment {index}: inertia_com must be non-negative, got {value}")]
    NegativeInertia { index: usize, value: f64 },
    #[error("gravity must be finite and non-negative, got {value}")]
    InvalidGravity { value: f64 },
}

/// Immutable description of a serial chain. Built once, then shared
/// read-only with backends, the engine, and export/visualization layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    segments: Vec<Segment>,
    gravity: f64,
}

impl ModelSpec {
    /// Validates and builds a chain under standard gravity.
    pub fn build(params: Vec<SegmentParams>) -> Result<Self, ValidationError> {
        Self::build_with_gravity(params, GRAVITY_M_S2)
    }

    /// Validates and builds a chain with an explicit gravity magnitude.
    pub fn build_with_gravity(
        params: Vec<SegmentParams>,
        gravity: f64,
    ) -> Result<Self, ValidationError> {
        if params.is_empty() {
            return Err(ValidationError::EmptyChain);
        }
        if !gravity.is_finite() || gravity < 0.0 {
            return Err(ValidationError::InvalidGravity { value: gravity });
        }

        let mut segments = Vec::with_capacity(params.len());
        for (index, p) in params.iter().enumerate() {
            for (value, name) in [
                (p.mass, "mass"),
                (p.length, "length"),
                (p.com_offset, "com_offset"),
                (p.inertia_com, "inertia_com"),
            ] {
                if !value.is_finite() {
                    return Err(ValidationError::NonFiniteParameter { index, name });
                }
            }
            if p.mass <= 0.0 {
                return Err(ValidationError::NonPositiveMass {
                    index,
                    value: p.mass,
                });
            }
            if p.length <= 0.0 {
                return Err(ValidationError::NonPositiveLength {
                    index,
                    value: p.length,
                });
            }
            if p.com_offset < 0.0 || p.com_offset > p.length {
                return Err(ValidationError::ComOffsetOutOfRange {
                    index,
                    value: p.com_offset,
                });
            }
            if p.inertia_com < 0.0 {
                return Err(ValidationError::NegativeInertia {
                    index,
                    value: p.inertia_com,
                });
            }

            segments.push(Segment {
                mass: p.mass,
                length: p.length,
                com_offset: p.com_offset,
                inertia_com: p.inertia_com,
                inertia_pivot: p.inertia_com + p.mass * p.com_offset * p.com_offset,
            });
        }

        tracing::debug!(dof = segments.len(), gravity, "model built");
        Ok(Self { segments, gravity })
    }

    /// Number of joints (= number of segments).
    pub fn dof(&self) -> usize {
        self.segments.len()
    }

    /// Segments, root to tip.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    /// Sum of the masses of segment `from` and everything distal to it.
    /// The closed-form coefficients and the gravity moments are built from
    /// these tail sums.
    pub fn tail_mass(&self, from: usize) -> f64 {
        self.segments[from..].iter().map(|s| s.mass).sum()
    }

    /// World-frame joint positions at angles `q`: the fixed pivot first
    /// (origin), then each distal joint, the chain tip last. Read-only
    /// convenience for visualization and export layers.
    pub fn joint_positions(&self, q: &[f64]) -> Vec<Vector2<f64>> {
        let mut points = Vec::with_capacity(self.segments.len() + 1);
        let mut p = Vector2::zeros();
        points.push(p);
        for (seg, &theta) in self.segments.iter().zip(q) {
            p += Vector2::new(theta.sin(), -theta.cos()) * seg.length;
            points.push(p);
        }
        points
    }
}

/// Generalized coordinates of a chain: absolute link angles (rad, zero
/// hanging straight down) and angular velocities (rad/s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub q: Vec<f64>,
    pub qdot: Vec<f64>,
}

impl State {
    pub fn new(q: Vec<f64>, qdot: Vec<f64>) -> Self {
        Self { q, qdot }
    }

    /// Everything hanging at rest.
    pub fn at_rest(dof: usize) -> Self {
        Self {
            q: vec![0.0; dof],
            qdot: vec![0.0; dof],
        }
    }

    pub fn dof(&self) -> usize {
        self.q.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_valid_chain() {
        let model = ModelSpec::build(vec![
            SegmentParams::uniform_rod(1.0, 1.0),
            SegmentParams::uniform_rod(0.5, 0.8),
        ])
        .expect("valid chain should build");

        assert_eq!(model.dof(), 2);
        assert_eq!(model.gravity(), GRAVITY_M_S2);
        assert!((model.tail_mass(0) - 1.5).abs() < 1e-15);
        assert!((model.tail_mass(1) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn pivot_inertia_uses_parallel_axis() {
        let model = ModelSpec::build(vec![SegmentParams::uniform_rod(3.0, 2.0)]).unwrap();
        let seg = model.segments()[0];
        // I_pivot = m l²/12 + m (l/2)² = m l²/3
        assert!((seg.inertia_pivot - 3.0 * 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_length_segment_is_rejected_with_its_index() {
        let err = ModelSpec::build(vec![
            SegmentParams::uniform_rod(1.0, 1.0),
            SegmentParams {
                mass: 1.0,
                length: 0.0,
                com_offset: 0.0,
                inertia_com: 0.1,
            },
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonPositiveLength {
                index: 1,
                value: 0.0
            }
        );
    }

    #[test]
    fn joint_positions_walk_the_chain() {
        let model = ModelSpec::build(vec![
            SegmentParams::uniform_rod(1.0, 1.0),
            SegmentParams::uniform_rod(1.0, 0.5),
        ])
        .unwrap();

        // Hanging straight down.
        let points = model.joint_positions(&[0.0, 0.0]);
        assert_eq!(points.len(), 3);
        assert!((points[1] - Vector2::new(0.0, -1.0)).norm() < 1e-15);
        assert!((points[2] - Vector2::new(0.0, -1.5)).norm() < 1e-15);

        // First link horizontal, second hanging from its tip.
        let points = model.joint_positions(&[std::f64::consts::FRAC_PI_2, 0.0]);
        assert!((points[1] - Vector2::new(1.0, 0.0)).norm() < 1e-12);
        assert!((points[2] - Vector2::new(1.0, -0.5)).norm() < 1e-12);
    }

    #[test]
    fn rejects_bad_parameters() {
        let rod = SegmentParams::uniform_rod(1.0, 1.0);

        let err = ModelSpec::build(vec![]).unwrap_err();
        assert_eq!(err, ValidationError::EmptyChain);

        let err = ModelSpec::build(vec![SegmentParams { mass: -1.0, ..rod }]).unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveMass { index: 0, .. }));

        let err = ModelSpec::build(vec![SegmentParams {
            com_offset: 2.0,
            ..rod
        }])
        .unwrap_err();
        assert!(matches!(err, ValidationError::ComOffsetOutOfRange { .. }));

        let err = ModelSpec::build(vec![SegmentParams {
            inertia_com: -0.1,
            ..rod
        }])
        .unwrap_err();
        assert!(matches!(err, ValidationError::NegativeInertia { .. }));

        let err = ModelSpec::build(vec![SegmentParams {
            mass: f64::NAN,
            ..rod
        }])
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NonFiniteParameter { name: "mass", .. }
        ));

        let err = ModelSpec::build_with_gravity(vec![rod], f64::INFINITY).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidGravity { .. }));
    }
}
