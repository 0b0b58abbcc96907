//! Unified error type for network construction, power flow, and LOPF.
//!
//! [`GridSimError`] gives every layer (topology analysis, the power-flow
//! engines, the LOPF model builder) one error representation, so callers can
//! match on error kind without caring which module raised it.

use thiserror::Error;

/// Unified error type for all gridsim operations.
#[derive(Error, Debug)]
pub enum GridSimError {
    /// Unknown dispatch type, unknown DC-OPF formulation, out-of-range tolerance.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A passive branch endpoint bus that does not exist, or endpoints with
    /// mismatched `current_type`.
    #[error("topology error: {0}")]
    Topology(String),

    /// The LP solver returned a non-optimal status. Result series are left
    /// untouched.
    #[error("LP solver returned non-optimal status {status} (termination: {termination})")]
    InfeasibleSolver { status: String, termination: String },

    /// Newton-Raphson did not reach tolerance within the iteration cap.
    #[error("Newton-Raphson did not converge after {iterations} iterations (residual {residual})")]
    NumericalDivergence { iterations: usize, residual: f64 },

    /// AC flow requested on a DC sub-network, a variable generator missing
    /// `p_max_pu`, or any other unhandled dispatch/branch variant.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// I/O errors surfaced while reading auxiliary data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for wrapping lower-level errors at a boundary.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for `Result<T, GridSimError>`.
pub type GridSimResult<T> = Result<T, GridSimError>;

impl From<anyhow::Error> for GridSimError {
    fn from(err: anyhow::Error) -> Self {
        GridSimError::Other(err.to_string())
    }
}

impl From<String> for GridSimError {
    fn from(s: String) -> Self {
        GridSimError::Other(s)
    }
}

impl From<&str> for GridSimError {
    fn from(s: &str) -> Self {
        GridSimError::Other(s.to_string())
    }
}
