//! `keepsake-delivery`: the delivery cadence & release engine.
//!
//! # Overview
//!
//! Two producers decide *what* to release; one executor decides *how*.
//!
//! | Producer                            | Trigger source      | Feeds the executor with |
//! |-------------------------------------|---------------------|-------------------------|
//! | [`posthumous::PosthumousRelease`]   | verified life event | release-now or later    |
//! | [`sweep::ScheduledSweep`]           | periodic tick       | release-now only        |
//!
//! The [`executor::ReleaseExecutor`] issues tokens, dispatches notifications
//! and advances message status with guarded (compare-and-swap) writes, so any
//! run can be repeated after a crash without double-sending a `sent` message.
//! Within one process the executor also refuses to release a message that is
//! already being released, so overlapping sweeps notify its recipients once.

pub mod batch;
pub mod cadence;
pub mod error;
pub mod executor;
pub mod posthumous;
pub mod sweep;
pub mod template;
pub mod token;
pub mod types;

pub use cadence::{Cadence, CadenceRule, Period, SortOrder};
pub use error::{DeliveryError, Result, TokenError};
pub use executor::ReleaseExecutor;
pub use posthumous::{PosthumousRelease, ReleasePlan};
pub use sweep::ScheduledSweep;
pub use token::{IssuedToken, RedeemedMessage, TokenIssuer};
pub use types::{Disposition, ReleaseOutcome, ReleaseSummary, SkipReason, WorkItem};
