pub type SandtraceResult<T> = Result<T, SandtraceError>;

#[derive(thiserror::Error, Debug)]
pub enum SandtraceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SandtraceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SandtraceError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            SandtraceError::browser("x")
                .to_string()
                .contains("browser error:")
        );
        assert!(
            SandtraceError::capture("x")
                .to_string()
                .contains("capture error:")
        );
        assert!(
            SandtraceError::encode("x")
                .to_string()
                .contains("encode error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SandtraceError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
