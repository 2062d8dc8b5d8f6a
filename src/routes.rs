use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use poem::http::StatusCode;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use uuid::Uuid;

use crate::config::Environment;
use crate::controller::ImageController;
use crate::error::ServiceError;
use crate::models::{ImageCreate, ImageDisplay};

#[derive(Object, Debug)]
pub struct ErrorBody {
    /// The HTTP status of the response.
    status: u16,

    /// A stable identifier for the kind of failure.
    code: String,

    message: String,

    /// The full error chain, only present in development mode.
    detail: Option<String>,
}

#[derive(ApiResponse)]
pub enum FetchImageResponse {
    /// The image was found and its path resolved.
    #[oai(status = 200)]
    Ok(Json<ImageDisplay>),

    /// The given id was invalid.
    #[oai(status = 400)]
    BadRequest(Json<ErrorBody>),

    /// No image exists with the given id.
    #[oai(status = 404)]
    NotFound(Json<ErrorBody>),

    /// The server failed to fetch or resolve the image.
    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
}

#[derive(ApiResponse)]
pub enum ListImagesResponse {
    /// Every image that could be resolved.
    #[oai(status = 200)]
    Ok(Json<Vec<ImageDisplay>>),

    /// No images exist, or none could be resolved.
    #[oai(status = 404)]
    NotFound(Json<ErrorBody>),

    /// The server failed to fetch the images.
    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
}

#[derive(ApiResponse)]
pub enum BatchImagesResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<ImageDisplay>>),

    /// Batch lookups are declared but not supported yet.
    #[oai(status = 501)]
    NotImplemented(Json<ErrorBody>),

    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
}

#[derive(ApiResponse)]
pub enum CreateImageResponse {
    #[oai(status = 201)]
    Created(Json<ImageDisplay>),

    /// Image creation is declared but not supported yet.
    #[oai(status = 501)]
    NotImplemented(Json<ErrorBody>),

    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
}

pub struct ImageApi {
    controller: Arc<ImageController>,
    environment: Environment,
}

impl ImageApi {
    pub fn new(controller: Arc<ImageController>, environment: Environment) -> Self {
        Self {
            controller,
            environment,
        }
    }

    fn error_body(&self, err: &ServiceError) -> Json<ErrorBody> {
        let status = err.status();
        let development = self.environment.is_development();

        let message = match err {
            ServiceError::Unexpected(_) if !development => {
                "An unexpected error occurred.".to_string()
            },
            other => other.to_string(),
        };

        Json(ErrorBody {
            status: status.as_u16(),
            code: err.code().to_string(),
            message,
            detail: development.then(|| format!("{:?}", err)),
        })
    }

    /// Runs a controller operation on its own task so a panic inside it
    /// becomes an `Unexpected` error rather than a dropped connection.
    async fn guarded<T, F>(&self, operation: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        match tokio::spawn(operation).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!("Image operation panicked: {}", &message);
                Err(ServiceError::Unexpected(message))
            },
            Err(e) => Err(ServiceError::Unexpected(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[OpenApi]
impl ImageApi {
    /// Get All Images
    ///
    /// Lists every image, skipping any whose path can't be resolved.
    #[oai(path = "/image/all", method = "get")]
    pub async fn list_images(&self) -> ListImagesResponse {
        let controller = self.controller.clone();
        let result = self
            .guarded(async move { controller.list_all().await })
            .await;

        match result {
            Ok(images) if images.is_empty() => {
                let err = ServiceError::NotFound("No images found.".to_string());
                ListImagesResponse::NotFound(self.error_body(&err))
            },
            Ok(images) => ListImagesResponse::Ok(Json(images)),
            Err(e) if e.status() == StatusCode::NOT_FOUND => {
                ListImagesResponse::NotFound(self.error_body(&e))
            },
            Err(e) => ListImagesResponse::InternalError(self.error_body(&e)),
        }
    }

    /// Get Image by Guid
    ///
    /// Fetches a single image, resolving its path into a signed URL when
    /// it lives in blob storage.
    #[oai(path = "/image/:id", method = "get")]
    pub async fn get_image(&self, id: Path<Uuid>) -> FetchImageResponse {
        let controller = self.controller.clone();
        let id = id.0;
        let result = self
            .guarded(async move { controller.get_by_id(id).await })
            .await;

        match result {
            Ok(image) => FetchImageResponse::Ok(Json(image)),
            Err(e) if e.status() == StatusCode::BAD_REQUEST => {
                FetchImageResponse::BadRequest(self.error_body(&e))
            },
            Err(e) if e.status() == StatusCode::NOT_FOUND => {
                FetchImageResponse::NotFound(self.error_body(&e))
            },
            Err(e) => FetchImageResponse::InternalError(self.error_body(&e)),
        }
    }

    /// Get Images by Guids
    ///
    /// Not supported yet.
    #[oai(path = "/image/batch", method = "post")]
    pub async fn get_images(&self, ids: Json<Vec<Uuid>>) -> BatchImagesResponse {
        let controller = self.controller.clone();
        let result = self
            .guarded(async move { controller.get_by_ids(&ids.0).await })
            .await;

        match result {
            Ok(images) => BatchImagesResponse::Ok(Json(images)),
            Err(e) if e.status() == StatusCode::NOT_IMPLEMENTED => {
                BatchImagesResponse::NotImplemented(self.error_body(&e))
            },
            Err(e) => BatchImagesResponse::InternalError(self.error_body(&e)),
        }
    }

    /// Create Image
    ///
    /// Not supported yet.
    #[oai(path = "/image", method = "post")]
    pub async fn create_image(&self, payload: Json<ImageCreate>) -> CreateImageResponse {
        let controller = self.controller.clone();
        let result = self
            .guarded(async move { controller.create(payload.0).await })
            .await;

        match result {
            Ok(image) => CreateImageResponse::Created(Json(image)),
            Err(e) if e.status() == StatusCode::NOT_IMPLEMENTED => {
                CreateImageResponse::NotImplemented(self.error_body(&e))
            },
            Err(e) => CreateImageResponse::InternalError(self.error_body(&e)),
        }
    }
}

