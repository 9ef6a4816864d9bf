/// Crate-wide result alias.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Error taxonomy for the compositing/encoding pipeline.
///
/// - `Config`: bad item/project data, detected at validation time.
/// - `Resource`: a per-item acquisition failure (missing file, decoder
///   unavailable). Absorbed at the scheduler boundary.
/// - `Pipeline`: encoder/mux/disk failures. Fatal to the whole export.
/// - `Transform`: the container post-process could not parse the
///   finalized file.
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("container transform error: {0}")]
    Transform(String),

    #[error("export cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ForgeError::config("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(
            ForgeError::resource("x")
                .to_string()
                .contains("resource error:")
        );
        assert!(
            ForgeError::pipeline("x")
                .to_string()
                .contains("pipeline error:")
        );
        assert!(
            ForgeError::transform("x")
                .to_string()
                .contains("container transform error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ForgeError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
