//! Algebra-engine collaborator.
//!
//! ## Protocol
//!
//! Resolution data is produced by an external computer-algebra engine
//! and crosses the boundary as printed text: a ring printout, the
//! blow-up payload fields (ambient factor, birational map, center,
//! cone, divisors, Jacobian, last map, focus), and the intersection
//! lattice rows. The [`AlgebraEngine`] trait carries that traffic;
//! [`loader::load_chart`] turns the raw payloads into [`Chart`]s via
//! the expression parsers in [`crate::symbolic`].
//!
//! [`Chart`]: crate::types::Chart

pub mod loader;
pub mod scripted;

pub use loader::{load_chart, LoadError};
pub use scripted::ScriptedEngine;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Library of chart-construction procedures, loaded before any chart
/// request.
pub const CHART_LIBRARY: &str = "Chart_loading.lib";

/// Library of lattice-construction procedures.
pub const LATTICE_LIBRARY: &str = "intersectionLattice.lib";

/// File name of a numbered chart inside a resolution directory.
pub fn chart_file_name(number: u64) -> String {
    format!("Chart{number}.ssi")
}

/// Parent directory of a resolution directory, with trailing slash.
/// A path without a separator resolves to the working directory.
pub fn parent_directory(directory: &str) -> String {
    let trimmed = directory.strip_suffix('/').unwrap_or(directory);
    match trimmed.rfind('/') {
        Some(index) => trimmed[..=index].to_string(),
        None => "./".to_string(),
    }
}

/// Failure of an engine request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected or could not evaluate a request.
    #[error("engine evaluation failed: {reason}")]
    Eval {
        /// The engine's account of the failure.
        reason: String,
    },
}

impl EngineError {
    /// Convenience constructor for evaluation failures.
    pub fn eval(reason: impl Into<String>) -> Self {
        EngineError::Eval {
            reason: reason.into(),
        }
    }
}

/// Raw chart payload, field for field as the engine prints it.
///
/// Every field is unparsed text. An empty `jacobian` or `last_map`
/// means the engine run did not define the value, which is the normal
/// state for a root chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPayload {
    /// Ring printout carrying `coefficients` and `names` attributes.
    pub ring: String,
    /// Ambient-space equations; the single line `0` means affine.
    pub ambient_factor: String,
    /// Birational map entries, one expression per root variable.
    pub birational_map: String,
    /// Center of the last blow-up.
    pub center: String,
    /// Cone inequalities as a `[k]:`-keyed list of side pairs.
    pub cone: String,
    /// Exceptional divisor groups, one printout per divisor.
    pub divisors: Vec<String>,
    /// Jacobian determinant expression, possibly empty.
    pub jacobian: String,
    /// Map from the immediate parent chart, possibly empty.
    pub last_map: String,
    /// Focus conditions.
    pub focus: String,
}

/// Raw intersection-lattice payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatticePayload {
    /// Vertex membership rows, one flag per divisor.
    pub vertices: String,
    /// Irreducible-component rows.
    pub components: String,
    /// Covering-edge rows as 1-based vertex index pairs.
    pub edges: String,
    /// Divisor polynomials as a `_[k]=` keyed ideal printout.
    pub divisors: String,
}

/// Request/response interface to the external algebra engine.
///
/// Implementations are stateful: libraries stay loaded across requests
/// and evaluation happens in one long-running session, so every method
/// takes `&mut self`.
pub trait AlgebraEngine {
    /// Loads a procedure library by path.
    fn load_library(&mut self, path: &str) -> Result<(), EngineError>;

    /// Runs the chart-construction procedure for `number` against the
    /// resolution files in `directory` and collects the printouts.
    fn chart_payload(
        &mut self,
        number: u64,
        directory: &str,
    ) -> Result<ChartPayload, EngineError>;

    /// Runs the lattice-construction procedure for `number`.
    fn lattice_payload(
        &mut self,
        number: u64,
        directory: &str,
    ) -> Result<LatticePayload, EngineError>;

    /// Evaluates a scratch expression and returns the printed result.
    fn eval(&mut self, expression: &str) -> Result<String, EngineError>;
}
