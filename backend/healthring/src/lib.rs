//! Health ring: scheduled TCP/HTTP checks per member with a bounded
//! result history.

pub mod check;
pub mod history;
pub mod ring;

pub use check::{evaluate, expand_url, HealthCheck};
pub use history::{CheckResult, HealthHistory};
pub use ring::{HealthRing, HealthRingOptions, MemberStatus};
