use super::ObservationId;

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Failure taxonomy of a template build.
///
/// Per-observation problems never appear here: they are absorbed during
/// dispatch and recorded as rejections on the finished template. Everything
/// in this enum aborts the build after cleanup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{available} eligible observations, {required} required")]
    InsufficientData { available: usize, required: usize },
    #[error("worker {worker} aborted the build: {detail}")]
    WorkerFatal { worker: usize, detail: String },
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TemplateError {
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::InsufficientData { .. } => "InsufficientDataError",
            Self::WorkerFatal { .. } => "WorkerFatalError",
            Self::Access(_) => "AccessError",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// Errors surfaced by the data-access collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("observation {observation} failed to load: {detail}")]
    FrameLoad {
        observation: ObservationId,
        detail: String,
    },
    #[error("order {order} of observation {observation} is unusable")]
    UnusableOrder {
        observation: ObservationId,
        order: usize,
    },
    #[error("interpolation failed for observation {observation}, order {order}: {detail}")]
    Interpolation {
        observation: ObservationId,
        order: usize,
        detail: String,
    },
    #[error("corrupt data for observation {observation}: {detail}")]
    Corrupt {
        observation: ObservationId,
        detail: String,
    },
}

impl AccessError {
    /// Recoverable errors reject one observation or one order; everything
    /// else aborts the whole build.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameLoad { .. } | Self::UnusableOrder { .. })
    }
}
