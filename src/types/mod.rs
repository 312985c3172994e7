//! Data model shared by the registry, the collaborators and the orchestrator.
//!
//! [`stage`] holds the state machine, [`progress`] the live snapshot that
//! pollers read, [`record`] the collected units, and [`result`] the final
//! value handed back to the submitter.

pub mod analysis;
pub mod progress;
pub mod record;
pub mod report;
pub mod result;
pub mod stage;

pub use analysis::*;
pub use progress::*;
pub use record::*;
pub use report::*;
pub use result::*;
pub use stage::*;
