use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loader error: {0}")]
    Build(#[from] webimg_engine::BuildError),

    #[error("Encode error: {0}")]
    Codec(#[from] webimg_engine::CodecError),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("{0} of {1} image(s) failed to load")]
    Failed(usize, usize),
}
