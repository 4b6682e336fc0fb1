pub type Result<M> = std::result::Result<M, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("frame size does not match tracker size")]
    ImageSizeChanged,
    #[error("no frame arrived within {0:?}")]
    FirstFrameTimeout(std::time::Duration),
    #[error("hysteresis exit threshold must exceed enter threshold")]
    BadHysteresis,
    #[error("IoError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("other error: {msg}")]
    OtherError { msg: String },
}
