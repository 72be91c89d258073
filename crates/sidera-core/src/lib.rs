//! Stellar template construction from echelle spectra.
//!
//! Combines many radial-velocity-corrected observations of one
//! sub-instrument into a single reference spectrum: a median flux per
//! pixel, a combined uncertainty, and a validity mask, all on the
//! wavelength grid of the observation with the smallest barycentric
//! correction. Order-level interpolation fans out across worker threads
//! while the coordinator enforces a per-observation barrier.

pub mod access;
pub mod build;
pub mod common;
pub mod domain;
pub mod numerics;
pub mod shift;
pub mod template;

pub use access::{ObservationPredicate, OrderData, SpectralSource, Verdict};
pub use build::TemplateBuilder;
pub use common::config::TemplateConfig;
pub use domain::{
    AccessError, GridShape, ObservationId, ObservationSummary, RejectedObservation,
    RejectionReason, TemplateError, TemplateResult,
};
pub use shift::{DopplerShift, RadialVelocityShift};
pub use template::{OrderQuality, StellarTemplate};
