use thiserror::Error;

pub type DecoderResult<T, E = DecoderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("no configuration provided")]
    NoConfig,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("segmentation call without prototype masks")]
    MissingPrototypes,
    #[error(transparent)]
    Tensor(#[from] sightline_tensor::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
