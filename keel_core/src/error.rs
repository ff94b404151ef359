use crate::variant::DatumType;
use thiserror::Error;

/// Errors raised by the container and reflection layers.
///
/// Allocation failure is not represented here; the containers treat it as
/// fatal and abort through [`std::alloc::handle_alloc_error`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Index past the end of a container, or element access on an empty one.
    #[error("index {index} out of range for container of size {size}")]
    OutOfRange { index: usize, size: usize },

    /// A `[first, last)` range given with `first > last`.
    #[error("invalid range: first ({first}) is past last ({last})")]
    InvalidRange { first: usize, last: usize },

    /// Typed access against a variant container holding a different alternative.
    #[error("container holds {actual}, not {requested}")]
    InvalidType {
        requested: DatumType,
        actual: DatumType,
    },

    /// A mutation that would reallocate memory the container does not own.
    #[error("operation would resize external storage: {0}")]
    ExternalStorage(&'static str),

    /// Key lookup against a map that does not contain it.
    #[error("key not present in map")]
    MissingKey,

    /// An attribute name the reflection layer will not accept.
    #[error("invalid attribute name {0:?}")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn out_of_range(index: usize, size: usize) -> Self {
        Error::OutOfRange { index, size }
    }
}
