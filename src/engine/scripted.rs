//! In-memory engine double.

use std::collections::BTreeMap;

use super::{AlgebraEngine, ChartPayload, EngineError, LatticePayload};

/// Canned algebra engine for tests and offline runs.
///
/// Payloads are registered per directory and chart number; every
/// request is recorded in order. Anything not scripted comes back as an
/// evaluation error, which is also what a live engine reports for a
/// missing chart file.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    charts: BTreeMap<(String, u64), ChartPayload>,
    lattices: BTreeMap<(String, u64), LatticePayload>,
    replies: BTreeMap<String, String>,
    requests: Vec<String>,
}

impl ScriptedEngine {
    /// An engine with nothing scripted.
    pub fn new() -> Self {
        ScriptedEngine::default()
    }

    /// Registers the chart payload served for `number` in `directory`.
    pub fn with_chart(mut self, directory: &str, number: u64, payload: ChartPayload) -> Self {
        self.charts.insert((directory.to_string(), number), payload);
        self
    }

    /// Registers the lattice payload served for `number` in `directory`.
    pub fn with_lattice(mut self, directory: &str, number: u64, payload: LatticePayload) -> Self {
        self.lattices.insert((directory.to_string(), number), payload);
        self
    }

    /// Registers the printed reply for a scratch expression.
    pub fn with_reply(mut self, expression: &str, reply: &str) -> Self {
        self.replies
            .insert(expression.to_string(), reply.to_string());
        self
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl AlgebraEngine for ScriptedEngine {
    fn load_library(&mut self, path: &str) -> Result<(), EngineError> {
        self.requests.push(format!("lib {path}"));
        Ok(())
    }

    fn chart_payload(
        &mut self,
        number: u64,
        directory: &str,
    ) -> Result<ChartPayload, EngineError> {
        self.requests.push(format!("chart {number} {directory}"));
        self.charts
            .get(&(directory.to_string(), number))
            .cloned()
            .ok_or_else(|| {
                EngineError::eval(format!(
                    "cannot read `{}` under `{directory}`",
                    super::chart_file_name(number)
                ))
            })
    }

    fn lattice_payload(
        &mut self,
        number: u64,
        directory: &str,
    ) -> Result<LatticePayload, EngineError> {
        self.requests.push(format!("lattice {number} {directory}"));
        self.lattices
            .get(&(directory.to_string(), number))
            .cloned()
            .ok_or_else(|| {
                EngineError::eval(format!(
                    "no lattice payload scripted for {number} in `{directory}`"
                ))
            })
    }

    fn eval(&mut self, expression: &str) -> Result<String, EngineError> {
        self.requests.push(format!("eval {expression}"));
        self.replies.get(expression).cloned().ok_or_else(|| {
            EngineError::eval(format!("no reply scripted for `{expression}`"))
        })
    }
}
