//! Optional toric-geometry counting backend.

use crate::symbolic::{Poly, Var};

/// Outcome of delegating a count to the toric backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToricOutcome {
    /// Exact count, a polynomial in the field-size symbol.
    Counted(Poly),
    /// The backend does not handle systems of this shape.
    CannotCount,
    /// The backend attempted the count and failed.
    Failed(String),
}

/// Counts points on subvarieties of an algebraic torus.
///
/// The backend is an optional capability: a counter built without one
/// skips straight to the next fallback. `CannotCount` and `Failed` both
/// fall through; `Failed` is additionally logged.
pub trait ToricCounter {
    /// Counts the solutions of `system` inside affine space with the
    /// given coordinates.
    fn count(&mut self, variables: &[Var], system: &[Poly]) -> ToricOutcome;
}

/// Scripted backend replaying a fixed list of outcomes, for tests and
/// offline runs. Every call pops the front outcome; an exhausted script
/// answers `CannotCount`.
#[derive(Debug, Default)]
pub struct ScriptedToric {
    script: std::collections::VecDeque<ToricOutcome>,
    calls: usize,
}

impl ScriptedToric {
    /// Queues outcomes to replay in order.
    pub fn new(script: impl IntoIterator<Item = ToricOutcome>) -> Self {
        ScriptedToric {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Number of times the backend was consulted.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ToricCounter for ScriptedToric {
    fn count(&mut self, _variables: &[Var], _system: &[Poly]) -> ToricOutcome {
        self.calls += 1;
        self.script.pop_front().unwrap_or(ToricOutcome::CannotCount)
    }
}
