/// Error type for opaque detection and recognition backends.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;
