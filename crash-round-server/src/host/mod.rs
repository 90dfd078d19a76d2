//! Host Layer
//!
//! Everything with side effects: the wall clock, the state file and the
//! log. This layer is **non-deterministic** - all round logic runs through
//! `game/`.

pub mod store;
pub mod presenter;
pub mod driver;

pub use store::{JsonStore, Restored, RoundStore, StoreError};
pub use presenter::{Frame, Presenter, RecentCrash, RecordingPresenter, TracingPresenter};
pub use driver::{DriverError, RoundDriver, RoundHandle};
