use poem::http::StatusCode;
use thiserror::Error;

use crate::storage::ResolveError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Blob container name is not configured, cannot form absolute URL for image.")]
    Configuration,

    #[error("An error occurred while generating the SAS URL for the image: {0}")]
    Resolution(String),

    #[error("An error occurred while fetching images from the store: {0:#}")]
    Store(anyhow::Error),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),

    #[error("{0} is not supported yet.")]
    Unimplemented(&'static str),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Configuration | Self::Resolution(_) | Self::Store(_) | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// A stable identifier for the kind of failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ImageService.ValidationError",
            Self::NotFound(_) => "ImageService.NotFound",
            Self::Configuration => "ImageService.ConfigurationError",
            Self::Resolution(_) => "image.SasUrlGenerationError",
            Self::Store(_) => "ImageRepository.Error",
            Self::Unexpected(_) => "ImageService.Exception",
            Self::Unimplemented(_) => "ImageService.NotImplemented",
        }
    }
}

impl From<ResolveError> for ServiceError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Configuration { .. } => Self::Configuration,
            ResolveError::Backend { message, .. } => Self::Resolution(message),
        }
    }
}
