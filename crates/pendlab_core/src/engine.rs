//! The dynamics engine: forcing evaluation, backend dispatch, integration.
//!
//! One engine owns one (model, backend, state) triple and is stepped
//! synchronously from a single control thread; there is no internal
//! concurrency and no state across calls beyond what is documented here.
//! Each `step` is a closed transaction: it either commits the new state and
//! clock, or — on a singular configuration — leaves both exactly as they
//! were and propagates the error.
//!
//! Independent engines share nothing and may run in parallel freely.

use crate::backend::{BackendError, BackendKind, DynamicsBackend, SingularityError};
use crate::energy::{self, Energy};
use crate::expr::{CompileError, ExprContext};
use crate::forcing::ForcingSpec;
use crate::integrators::{Rk4, SemiImplicitEuler};
use crate::model::{ModelSpec, State};
use crate::traits::{FixedStep, PhaseSystem};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thiserror::Error;

/// Which fixed-step integrator advances the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorKind {
    /// 4th-order Runge-Kutta (default).
    Rk4,
    /// Semi-implicit Euler: cheaper, first-order.
    SemiImplicitEuler,
}

/// Engine construction failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("state has {got} joint(s), model has {expected}")]
    StateDimension { expected: usize, got: usize },
}

/// Forcing submission failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForcingError {
    #[error("joint index {joint} out of range for {dof} joint(s)")]
    JointOutOfRange { joint: usize, dof: usize },
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// A step failed. State and clock are unchanged when this is returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    #[error("time step must be positive and finite, got {dt}")]
    InvalidTimeStep { dt: f64 },
    #[error(transparent)]
    Singular(#[from] SingularityError),
}

/// A forcing expression failed to evaluate this step; its joint received
/// zero torque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcingWarning {
    pub joint: usize,
    pub detail: String,
}

/// Everything a step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// State after the step.
    pub state: State,
    /// Torques actually applied at each joint, fallbacks included.
    pub applied_torques: Vec<f64>,
    /// Per-joint forcing fallbacks, empty when every expression evaluated.
    pub warnings: Vec<ForcingWarning>,
    /// Mechanical energy at the new state, when diagnostics are enabled.
    pub energy: Option<Energy>,
}

/// Adapts (backend, torques) to the integrator's phase-system seam.
///
/// `PhaseSystem::derivative` cannot return an error, so a backend failure is
/// parked in the `RefCell` and re-raised by the engine once the integrator
/// returns. After a fault the derivative outputs zeros; the step is
/// discarded anyway.
struct ChainFlow<'a> {
    backend: &'a dyn DynamicsBackend,
    tau: &'a [f64],
    fault: RefCell<Option<SingularityError>>,
}

impl PhaseSystem<f64> for ChainFlow<'_> {
    fn phase_dim(&self) -> usize {
        self.tau.len() * 2
    }

    fn derivative(&self, _t: f64, y: &[f64], out: &mut [f64]) {
        let n = self.tau.len();
        if self.fault.borrow().is_some() {
            out.fill(0.0);
            return;
        }
        let (q, qdot) = y.split_at(n);
        out[..n].copy_from_slice(qdot);
        match self.backend.accelerations(q, qdot, self.tau) {
            Ok(qdd) => {
                for i in 0..n {
                    out[n + i] = qdd[i];
                }
            }
            Err(err) => {
                *self.fault.borrow_mut() = Some(err);
                out.fill(0.0);
            }
        }
    }
}

/// Steps a chained-pendulum simulation forward in time.
pub struct DynamicsEngine {
    model: ModelSpec,
    backend: Box<dyn DynamicsBackend>,
    ctx: ExprContext,
    forcing: Vec<ForcingSpec>,
    state: State,
    time: f64,
    integrator: IntegratorKind,
    energy_diagnostics: bool,
    rk4: Rk4<f64>,
    euler: SemiImplicitEuler<f64>,
    // Reused per step: phase scratch, expression bindings, VM stack.
    phase: Vec<f64>,
    bindings: Vec<f64>,
    eval_stack: Vec<f64>,
}

impl DynamicsEngine {
    /// Builds an engine at t = 0 with no forcing.
    ///
    /// The expression variables available to forcing functions are `t` plus
    /// `theta1..thetaN` and `omega1..omegaN` (1-based, root to tip).
    pub fn new(
        model: ModelSpec,
        backend: BackendKind,
        initial: State,
    ) -> Result<Self, EngineError> {
        let dof = model.dof();
        Self::check_dimensions(dof, &initial)?;
        let backend = backend.create(&model)?;

        let mut names = vec!["t".to_string()];
        names.extend((1..=dof).map(|i| format!("theta{i}")));
        names.extend((1..=dof).map(|i| format!("omega{i}")));
        let ctx = ExprContext::new(names);

        Ok(Self {
            model,
            backend,
            ctx,
            forcing: vec![ForcingSpec::none(); dof],
            state: initial,
            time: 0.0,
            integrator: IntegratorKind::Rk4,
            energy_diagnostics: true,
            rk4: Rk4::new(dof * 2),
            euler: SemiImplicitEuler::new(dof * 2),
            phase: vec![0.0; dof * 2],
            bindings: vec![0.0; 1 + dof * 2],
            eval_stack: Vec::with_capacity(16),
        })
    }

    fn check_dimensions(dof: usize, state: &State) -> Result<(), EngineError> {
        if state.q.len() != dof {
            return Err(EngineError::StateDimension {
                expected: dof,
                got: state.q.len(),
            });
        }
        if state.qdot.len() != dof {
            return Err(EngineError::StateDimension {
                expected: dof,
                got: state.qdot.len(),
            });
        }
        Ok(())
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Current state, copied out.
    pub fn state(&self) -> State {
        self.state.clone()
    }

    /// Simulated time, s.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_integrator(&mut self, integrator: IntegratorKind) {
        self.integrator = integrator;
    }

    pub fn set_energy_diagnostics(&mut self, enabled: bool) {
        self.energy_diagnostics = enabled;
    }

    /// The expression context forcing functions are compiled against.
    pub fn expr_context(&self) -> &ExprContext {
        &self.ctx
    }

    /// Forcing bookkeeping for one joint (compile counter, active text).
    pub fn forcing(&self, joint: usize) -> Option<&ForcingSpec> {
        self.forcing.get(joint)
    }

    /// Submits forcing expression text for a joint. Compilation happens
    /// here, outside the step path, and only when the text changed.
    pub fn set_forcing(&mut self, joint: usize, text: &str) -> Result<(), ForcingError> {
        let dof = self.model.dof();
        let spec = self
            .forcing
            .get_mut(joint)
            .ok_or(ForcingError::JointOutOfRange { joint, dof })?;
        spec.set_expression(&self.ctx, text)?;
        Ok(())
    }

    /// Removes a joint's forcing.
    pub fn clear_forcing(&mut self, joint: usize) -> Result<(), ForcingError> {
        let dof = self.model.dof();
        self.forcing
            .get_mut(joint)
            .ok_or(ForcingError::JointOutOfRange { joint, dof })?
            .clear();
        Ok(())
    }

    /// Re-seeds the trajectory and rewinds the clock to zero. Forcing
    /// expressions stay compiled.
    pub fn reset(&mut self, state: State) -> Result<(), EngineError> {
        Self::check_dimensions(self.model.dof(), &state)?;
        self.state = state;
        self.time = 0.0;
        Ok(())
    }

    /// Mass matrix at the current configuration (inspection).
    pub fn mass_matrix(&self) -> DMatrix<f64> {
        self.backend.mass_matrix(&self.state.q)
    }

    /// Bias forces at the current state (inspection).
    pub fn bias_forces(&self) -> DVector<f64> {
        self.backend.bias_forces(&self.state.q, &self.state.qdot)
    }

    /// Mechanical energy at the current state.
    pub fn energy(&self) -> Energy {
        energy::total_energy(&self.model, self.backend.as_ref(), &self.state)
    }

    /// Advances the simulation by `dt`.
    ///
    /// Forcing expressions are evaluated once at the step's start time and
    /// the resulting torques held across integrator stages. An expression
    /// that fails to evaluate contributes zero torque for this step only and
    /// is reported in the outcome's warnings. A singular mass matrix aborts
    /// the step with state and clock untouched.
    pub fn step(&mut self, dt: f64) -> Result<StepOutcome, StepError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(StepError::InvalidTimeStep { dt });
        }
        let n = self.model.dof();

        // Forcing torques from the shared sandbox.
        self.bindings[0] = self.time;
        self.bindings[1..=n].copy_from_slice(&self.state.q);
        self.bindings[n + 1..].copy_from_slice(&self.state.qdot);

        let mut tau = vec![0.0; n];
        let mut warnings = Vec::new();
        for (joint, spec) in self.forcing.iter().enumerate() {
            if let Some(compiled) = spec.compiled() {
                match compiled.eval_with(&self.bindings, &mut self.eval_stack) {
                    Ok(value) => tau[joint] = value,
                    Err(err) => {
                        tracing::warn!(
                            joint,
                            error = %err,
                            "forcing evaluation failed, applying zero torque this step"
                        );
                        warnings.push(ForcingWarning {
                            joint,
                            detail: err.to_string(),
                        });
                    }
                }
            }
        }

        // Integrate on scratch; commit only on success.
        self.phase[..n].copy_from_slice(&self.state.q);
        self.phase[n..].copy_from_slice(&self.state.qdot);
        let flow = ChainFlow {
            backend: self.backend.as_ref(),
            tau: &tau,
            fault: RefCell::new(None),
        };
        let mut t = self.time;
        match self.integrator {
            IntegratorKind::Rk4 => self.rk4.step(&flow, &mut t, &mut self.phase, dt),
            IntegratorKind::SemiImplicitEuler => {
                self.euler.step(&flow, &mut t, &mut self.phase, dt)
            }
        }
        if let Some(err) = flow.fault.into_inner() {
            return Err(StepError::Singular(err));
        }

        self.state.q.copy_from_slice(&self.phase[..n]);
        self.state.qdot.copy_from_slice(&self.phase[n..]);
        self.time = t;

        let energy = self
            .energy_diagnostics
            .then(|| energy::total_energy(&self.model, self.backend.as_ref(), &self.state));

        Ok(StepOutcome {
            state: self.state.clone(),
            applied_torques: tau,
            warnings,
            energy,
        })
    }
}
