use std::sync::Arc;

use futures::{future, StreamExt};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Image, ImageCreate, ImageDisplay};
use crate::repository::{ImageFilter, ImageRepository};
use crate::storage::{PathResolver, ResolveError};

/// Serves image records with their paths resolved into fetchable URLs.
pub struct ImageController {
    repository: Arc<dyn ImageRepository>,
    resolver: PathResolver,
    container_name: Option<String>,
    max_concurrency: usize,
}

impl ImageController {
    pub fn new(
        repository: Arc<dyn ImageRepository>,
        resolver: PathResolver,
        container_name: Option<String>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            repository,
            resolver,
            container_name,
            max_concurrency: max_concurrency.max(1),
        }
    }

    async fn to_display(&self, image: Image) -> Result<ImageDisplay, ResolveError> {
        let display = ImageDisplay::from(image);
        let path = self
            .resolver
            .resolve(&display.path, self.container_name.as_deref())
            .await?;

        Ok(display.with_path(path))
    }

    /// Fetches every image.
    ///
    /// Images whose path can't be resolved are logged and left out rather
    /// than failing the whole listing. The store's order is kept.
    pub async fn list_all(&self) -> Result<Vec<ImageDisplay>, ServiceError> {
        info!("Retrieving all images.");

        let images = self
            .repository
            .get_all(ImageFilter::All)
            .await
            .map_err(|e| {
                error!("Failed to fetch images from the repository: {:#}", e);
                ServiceError::Store(e)
            })?;

        let total = images.len();
        let resolved: Vec<ImageDisplay> = futures::stream::iter(images)
            .map(|image| async move {
                let (id, path) = (image.id, image.path.clone());
                match self.to_display(image).await {
                    Ok(display) => Some(display),
                    Err(e) => {
                        error!("Skipping image {} with path {:?}: {}", id, path, e);
                        None
                    },
                }
            })
            .buffered(self.max_concurrency)
            .filter_map(future::ready)
            .collect()
            .await;

        info!("Successfully fetched {} of {} images.", resolved.len(), total);
        Ok(resolved)
    }

    /// Fetches a single image.
    ///
    /// Unlike `list_all`, a path that can't be resolved fails the request.
    pub async fn get_by_id(&self, id: Uuid) -> Result<ImageDisplay, ServiceError> {
        if id.is_nil() {
            return Err(ServiceError::Validation("Invalid Guid provided.".to_string()));
        }

        info!("Retrieving image with ID: {}", id);

        let image = self
            .repository
            .get(ImageFilter::Id(id))
            .await
            .map_err(|e| {
                warn!("Error fetching image with ID: {} from repository: {:#}", id, e);
                ServiceError::Store(e)
            })?
            .ok_or_else(|| {
                warn!("Image with ID: {} not found.", id);
                ServiceError::NotFound(format!("Image with ID {} not found.", id))
            })?;

        let display = self.to_display(image).await.map_err(|e| {
            error!("Error resolving path for image ID: {}: {}", id, e);
            ServiceError::from(e)
        })?;

        info!("Successfully fetched image with ID: {}", id);
        Ok(display)
    }

    // TODO: batch lookups need a repository filter over a set of ids before this can be served.
    pub async fn get_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ImageDisplay>, ServiceError> {
        warn!("Batch lookup of {} images requested but is not implemented.", ids.len());
        Err(ServiceError::Unimplemented("Fetching images by ids"))
    }

    pub async fn create(&self, payload: ImageCreate) -> Result<ImageDisplay, ServiceError> {
        warn!("Image creation requested for {:?} but is not implemented.", payload.name);
        Err(ServiceError::Unimplemented("Creating images"))
    }
}
