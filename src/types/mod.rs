//! Core types of the chart pipeline: identifiers, charts, intersection
//! lattices, and integrands.

pub mod chart;
pub mod id;
pub mod integrand;
pub mod lattice;

pub use chart::{ring_printout, Chart, ConeCondition, QuasiMonomial};
pub use id::ChartId;
pub use integrand::{Integrand, IntegrandError, TermExponents};
pub use lattice::{IntersectionLattice, LatticeError, Vertex};
