use thiserror::Error;

/// Errors returned by the public API of this crate.
///
/// Cancellation is never represented here: a cancelled run simply returns
/// with `finished() == false` and can be resumed by calling `run*` again.
#[derive(Debug, Error)]
pub enum CongruenceError {
    #[error("invalid presentation: {0}")]
    InvalidInput(String),

    #[error("strategy inapplicable: {0}")]
    StrategyInapplicable(String),

    #[error("enumeration would not terminate: presentation is obviously infinite")]
    WouldNotTerminate,

    #[error("incompatible congruence kind: {0}")]
    IncompatibleKind(String),

    #[error("settings that affect the presentation cannot be changed once a run has started")]
    NotReconfigurable,

    #[error("internal capacity exceeded: {0}")]
    CapacityExceeded(String),
}

pub type Result<T> = std::result::Result<T, CongruenceError>;
