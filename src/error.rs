use thiserror::Error;

/// The error returned by lookups that require the key to be present.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("key not found")]
pub struct KeyError;
