// xorshift-recover Core Library
//
// Recovers the internal state of a 128-bit xorshift generator from partial,
// timing-derived observations of its outputs, and tracks the recovered
// state forward.

pub mod app_config;
pub mod error;
pub mod gf2;
pub mod observation;
pub mod predict;
pub mod recovery;
pub mod reident;
pub mod simulate;
pub mod xorshift;

pub use error::{RecoveryError, Result};
pub use observation::BlinkObservation;
pub use recovery::{Recovered, RecoverySettings, StateRecovery};
pub use reident::{CancelFlag, Reidentified, Reidentifier, SearchBounds};
pub use xorshift::Xorshift;
