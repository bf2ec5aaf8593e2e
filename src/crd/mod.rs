//! Custom Resource Definitions for the Racecourse operator

mod racecourse;
mod types;

pub use racecourse::{Racecourse, RacecourseSpec, RacecourseStatus};
pub use types::{
    Condition, ConditionStatus, ImageSpec, IngressSpec, PullPolicy, RacecoursePhase,
    WalletServiceSpec,
};
