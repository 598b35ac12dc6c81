use crate::Reading;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The line was not a well-formed measurement object.
    #[error("malformed measurement line: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one framed line into a reading.
///
/// Blank or whitespace-only lines are a quiet no-op (`Ok(None)`). Unknown
/// keys are ignored for forward compatibility; missing keys or mistyped
/// values are `Malformed`. Every failure is a recoverable per-message
/// condition and must not stop the stream.
pub fn decode_line(line: &str) -> Result<Option<Reading>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let reading = serde_json::from_str(line)?;
    Ok(Some(reading))
}
