pub mod error;
pub mod migrate;
pub mod restore;
pub mod settings;
pub mod supervisor;
pub mod synth;
pub mod util;

pub use error::{Error, Result};

/// How a recoverable pipeline stage ended. Nothing before the supervisor is
/// allowed to abort startup, so stages report instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Everything the stage attempted succeeded.
    Completed,
    /// The stage ran but some best-effort operations failed; state may be partial.
    Degraded,
    /// The stage had nothing to do (missing backup, gate said no, etc.).
    Skipped,
}

impl Outcome {
    pub fn merge(self, other: Outcome) -> Outcome {
        use Outcome::*;
        match (self, other) {
            (Degraded, _) | (_, Degraded) => Degraded,
            (Completed, _) | (_, Completed) => Completed,
            (Skipped, Skipped) => Skipped,
        }
    }
}
