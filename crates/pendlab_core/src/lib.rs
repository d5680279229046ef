//! The `pendlab_core` crate is the dynamics engine behind the chained
//! pendulum simulator: multibody physics for serial chains of rigid links,
//! numerical integration, and a sandboxed evaluator for user-supplied
//! forcing functions.
//!
//! Key components:
//! - **Model**: validated immutable chain descriptor with derived constants
//!   cached at build time (`model`).
//! - **Backends**: interchangeable equation-of-motion strategies — analytic
//!   closed-form for 2/3 links, recursive rigid-body for any length
//!   (`backend`, `closed_form`, `rigid_body`).
//! - **Expression sandbox**: a restricted-grammar compiler and stack VM for
//!   forcing functions; dangerous constructs are unrepresentable, not
//!   filtered (`expr`, `forcing`).
//! - **Engine**: per-step orchestration — forcing evaluation, acceleration,
//!   fixed-step integration, energy diagnostics (`engine`, `integrators`,
//!   `energy`).

pub mod backend;
pub mod closed_form;
pub mod energy;
pub mod engine;
pub mod expr;
pub mod forcing;
pub mod integrators;
pub mod model;
pub mod rigid_body;
pub mod traits;

pub use backend::{BackendError, BackendKind, DynamicsBackend, SingularityError};
pub use energy::Energy;
pub use engine::{
    DynamicsEngine, EngineError, ForcingError, ForcingWarning, IntegratorKind, StepError,
    StepOutcome,
};
pub use expr::{CompileError, CompiledExpr, EvalError, ExprContext};
pub use forcing::ForcingSpec;
pub use model::{ModelSpec, SegmentParams, State, ValidationError, GRAVITY_M_S2};
