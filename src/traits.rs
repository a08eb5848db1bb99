//! Core traits for the optimizer family.

use crate::Result;

/// Configuration trait for optimizer hyperparameters.
pub trait OptimConfig: Clone + Send + Sync {
    /// Validate the configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> Result<()>;
}

/// A stateful gradient-descent procedure over caller-owned parameters.
///
/// One call to [`step`](Optimizer::step) performs a full synchronous pass
/// over every parameter group: it reads the gradient currently stored on
/// each parameter, updates per-parameter optimizer state, and writes the
/// new parameter value back through the shared handle. The optimizer never
/// triggers gradient computation itself; the caller runs backpropagation
/// and populates gradients before stepping.
///
/// A failing step aborts immediately. Parameters updated earlier in the
/// same pass stay updated; there is no rollback.
pub trait Optimizer {
    /// Perform a single optimization step.
    ///
    /// # Errors
    ///
    /// Returns an error if a gradient has the wrong shape or a tensor
    /// operation fails.
    fn step(&mut self) -> Result<()>;

    /// Re-evaluate the loss through `closure`, then perform a step.
    ///
    /// The closure must recompute and return the loss after the caller has
    /// zeroed gradients and re-run backpropagation. Its result is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the closure or the step fails.
    fn step_with_closure<F>(&mut self, closure: F) -> Result<f32>
    where
        F: FnOnce() -> Result<f32>,
        Self: Sized,
    {
        let loss = closure()?;
        self.step()?;
        Ok(loss)
    }

    /// Current base learning rate.
    fn learning_rate(&self) -> f64;

    /// Set the base learning rate (scheduler hook).
    fn set_learning_rate(&mut self, lr: f64);

    /// Clear the gradient on every parameter this optimizer manages.
    fn zero_grad(&mut self);
}
