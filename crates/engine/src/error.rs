//! Error types for framework registration

/// Error type for framework storage operations
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// `init_framework` was called a second time
    #[error("Framework already initialized")]
    AlreadyInitialized,
}
