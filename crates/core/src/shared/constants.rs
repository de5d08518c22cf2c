pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp", "pgm"];

/// Frames the capture ring holds before the oldest unread frame is dropped.
pub const DEFAULT_FRAME_CAPACITY: usize = 32;

/// Canonical training/recognition image size (width x height).
pub const CANONICAL_WIDTH: u32 = 150;
pub const CANONICAL_HEIGHT: u32 = 200;

/// Pyramid scale step between detection passes.
pub const DEFAULT_SCALE_STEP: f64 = 1.16;

/// Label returned when the best match scores below the match threshold.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Minimum Pearson correlation between a face and a learned template for
/// the face to be attributed to that template's identity.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// How long worker loops block on a single wait before re-checking for stop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Upper bound on joining both worker threads during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;
