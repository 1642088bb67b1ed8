pub mod appointment;
pub mod document;
pub mod enums;
pub mod filters;
pub mod share_link;
pub mod user;

pub use appointment::*;
pub use document::*;
pub use filters::*;
pub use share_link::*;
pub use user::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Truncate to the millisecond precision the store keeps.
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Current time as it will read back from the store.
pub fn stored_now() -> DateTime<Utc> {
    to_storage_precision(Utc::now())
}
