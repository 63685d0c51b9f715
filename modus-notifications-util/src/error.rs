use thiserror::Error;

/// Failure to turn an inline image payload into a cached file.
///
/// Always non-fatal to notification delivery; callers fall back to the
/// app icon or the default icon.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("image data truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("unsupported channel count {0}")]
    UnsupportedChannels(i32),
    #[error("malformed image payload: {0}")]
    Payload(String),
    #[error("resize failed: {0}")]
    Resize(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed inbound payload; no record is created.
    #[error("invalid notification payload: {0}")]
    Validation(String),
    /// Action key not declared by the notification; the record is untouched.
    #[error("action {key:?} is not declared by notification {id}")]
    InvalidAction { id: u32, key: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Close or action referencing an id that is already gone. Expected in
    /// races with the source; logged rather than surfaced.
    #[error("no active notification with id {0}")]
    NotFound(u32),
}
