// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Dynamics
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Evolving states, pluggable transition rules, and order-parameter
//! extractors.
//!
//! Architecture:
//!   - State: ensemble / complex matrix / scalar payload + bookkeeping
//!   - Spectral: cyclic Jacobi eigensolver, Hermitian embedding, floor
//!     clamping and coherence filtering
//!   - Transition: sine-map ensembles, toroidal winding, modular flow,
//!     circulant recursion, mirror map
//!   - Extractor: variance ratio, top-k spectral weight, harmonic
//!     spectral weight, identity

pub mod extractor;
pub mod matrix;
pub mod params;
pub mod rng;
pub mod spectral;
pub mod state;
pub mod transition;

pub use extractor::{Extract, Extractor, ExtractorKind};
pub use matrix::ComplexMatrix;
pub use rng::SeededRng;
pub use spectral::{HermitianEigen, SymmetricEigen};
pub use state::{Ensemble, Payload, Shape, State};
pub use transition::{Evolve, NormPolicy, StepDiagnostics, Transition};
