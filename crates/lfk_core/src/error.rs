use thiserror::Error;

#[derive(Debug, Error)]
pub enum LfkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid relation {parent_table} -> {child_table}: {reason}")]
    InvalidDefinition {
        parent_table: String,
        child_table: String,
        reason: String,
    },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LfkError {
    /// Configuration problems surface before any batch work starts; everything
    /// else is a runtime failure the scheduler may retry.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidDefinition { .. })
    }
}
