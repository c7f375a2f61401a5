//! Vesting computation engine: pure per-day math, full-window projection,
//! and the off-thread projector used by interactive callers.

pub mod math;
pub mod projector;
pub mod timeline;
pub mod types;

pub use math::{compute_metrics, current_day};
pub use projector::{
    PendingProjection, ProjectionReply, ProjectionRequest, SupersedeToken, TimelineProjector,
};
pub use timeline::{project, Timeline, TimelineEntry};
pub use types::{
    GlobalState, ProjectConfig, SimulationOverrides, UserClaim, VestingMetrics, VestingParameters,
};
