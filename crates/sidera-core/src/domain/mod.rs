pub mod errors;

pub use errors::{AccessError, TemplateError, TemplateResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable identifier of one instrument exposure within a data set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObservationId(pub u32);

impl Display for ObservationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dimensions of the 2-D spectral grid shared by every observation of one
/// sub-instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub orders: usize,
    pub pixels: usize,
}

/// Per-observation facts the selection stage works from.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSummary {
    pub id: ObservationId,
    /// Stellar radial velocity used to align this observation, km/s.
    pub rv_kms: f64,
    /// Barycentric Earth radial velocity of the exposure, km/s.
    pub berv_kms: f64,
}

/// Why an observation did not contribute to the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Rejected by the user-supplied selection conditions.
    Condition(String),
    /// Accepted during selection but failed to load at dispatch time.
    LoadFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedObservation {
    pub id: ObservationId,
    pub reason: RejectionReason,
}

/// Coordinator phases, used for logging and failure context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    Selecting,
    Dispatching,
    Reducing,
    Done,
    Failed,
}

impl BuildPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Selecting => "SELECTING",
            Self::Dispatching => "DISPATCHING",
            Self::Reducing => "REDUCING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for BuildPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}
