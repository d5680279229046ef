//! Per-joint forcing functions: compile-on-change caching over the sandbox.
//!
//! Expression text is compiled exactly once per distinct submission; the
//! compiled program is reused on every step until the text actually changes.
//! Submitting text that fails to compile leaves the previously accepted
//! forcing in place, so a half-typed expression never knocks out a running
//! simulation.

use crate::expr::{CompileError, CompiledExpr, ExprContext};

/// Optional forcing for one joint.
#[derive(Debug, Clone, Default)]
pub struct ForcingSpec {
    text: Option<String>,
    compiled: Option<CompiledExpr>,
    compilations: u64,
}

impl ForcingSpec {
    /// No forcing: the joint torque is zero.
    pub fn none() -> Self {
        Self::default()
    }

    /// Submits new expression text.
    ///
    /// Recompiles only when `text` differs from the current text; unchanged
    /// text is a no-op cache hit. On a compile error the previous
    /// expression (if any) stays active and the error is returned to the
    /// caller immediately.
    pub fn set_expression(&mut self, ctx: &ExprContext, text: &str) -> Result<(), CompileError> {
        if self.text.as_deref() == Some(text) {
            return Ok(());
        }
        let compiled = ctx.compile(text)?;
        tracing::info!(expression = text, "forcing expression compiled");
        self.text = Some(text.to_string());
        self.compiled = Some(compiled);
        self.compilations += 1;
        Ok(())
    }

    /// Removes the forcing; the joint torque returns to zero.
    pub fn clear(&mut self) {
        self.text = None;
        self.compiled = None;
    }

    /// The active expression text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The active compiled expression, if any.
    pub fn compiled(&self) -> Option<&CompiledExpr> {
        self.compiled.as_ref()
    }

    /// How many times the sandbox compiler has actually run for this joint.
    /// Diagnostic for the compile-on-change discipline.
    pub fn compilations(&self) -> u64 {
        self.compilations
    }
}
