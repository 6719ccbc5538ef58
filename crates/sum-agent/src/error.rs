/// Errors surfaced by the agent binary itself: configuration problems and
/// whatever the manager returns once it is running. Everything that can go
/// wrong inside the core is wrapped rather than re-declared here, per the
/// ambient stack's "compose by wrapping, not a god-enum" rule.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] sum_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
