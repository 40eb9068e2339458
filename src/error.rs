//! Construction-time error type for battery and dispatch models.

use thiserror::Error;

/// Errors raised while building models, before any timestep runs.
///
/// The per-step simulation never fails; every degenerate numeric case is
/// clamped inside the component that produces it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A lookup table had no usable rows.
    #[error("{table} table has no usable rows")]
    EmptyTable { table: &'static str },

    /// A physical or control parameter is outside its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The dispatch schedule or profile table is inconsistent.
    #[error("invalid dispatch schedule: {0}")]
    Schedule(String),

    /// A forecast or input series cannot cover the requested horizon.
    #[error("series `{name}` has {len} values, need at least {needed}")]
    SeriesTooShort {
        name: &'static str,
        len: usize,
        needed: usize,
    },
}

impl ModelError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for model construction results.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;
