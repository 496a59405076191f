//! Join attempts and the state machine that drives them

pub mod attempt;
pub mod cancel;
pub mod driver;

pub use attempt::{JoinAttempt, JoinReport, JoinState};
pub use cancel::{cancel_pair, AttemptControls, CancelHandle, CancelSignal};
pub use driver::JoinDriver;
