use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised while building or maintaining particle topology.
///
/// Every variant is fatal for the run: they indicate an integration bug or an exhausted
/// resource, never a condition the caller is expected to retry.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("body '{body}': {reason}")]
    InvalidBody { body: String, reason: String },

    #[error("relation '{relation}': {reason}")]
    InvalidRelation { relation: String, reason: String },

    #[error("relation '{relation}' is total-Lagrangian, its configuration can not be rebuilt")]
    TotalLagrangianRebuild { relation: String },

    #[error("search depth must be positive, got {depth} for relation '{relation}'")]
    NonPositiveSearchDepth { relation: String, depth: i32 },

    #[error("body '{body}': field '{field}' has length {found}, expected {expected}")]
    FieldLengthMismatch {
        body: String,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("body '{body}': no field named '{field}'")]
    UnknownField { body: String, field: String },

    #[error("body '{body}': field '{field}' is already registered")]
    DuplicateField { body: String, field: String },

    #[error("body '{body}': all {bound} buffer slots are in use")]
    BufferExhausted { body: String, bound: usize },

    #[error("body '{body}': particle index {index} is not a real particle (total real particles {total_real})")]
    NotARealParticle {
        body: String,
        index: usize,
        total_real: usize,
    },

    #[error("no body with id {0}")]
    UnknownBody(usize),

    #[error("no relation with id {0}")]
    UnknownRelation(usize),

    #[error("failed to allocate {what}: {source}")]
    Allocation {
        what: &'static str,
        #[source]
        source: std::collections::TryReserveError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration")]
    Yaml(#[from] serde_yaml::Error),
}
