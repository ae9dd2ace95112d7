use thiserror::Error;

/// Errors reported by trainers and the rating store.
///
/// Unknown entities at prediction time are deliberately *not* an error;
/// every predictor degrades to a documented fallback value instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A hyperparameter combination that cannot be trained, detected when
    /// `train()` is invoked.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A rating-store removal required an index that was never enabled,
    /// so the remaining indices cannot be kept consistent.
    #[error("data storage is out of sync: {0}")]
    IndexOutOfSync(String),
}

pub type Result<T> = std::result::Result<T, Error>;
