use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use poem_openapi::Object;
use serde::Deserialize;
use uuid::Uuid;

/// A single row of the `images` table.
///
/// Ids are persisted as their hyphenated string form so the same
/// schema works across every supported SQL backend.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageEntity {
    pub id: String,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub alt_text: String,
}

impl TryFrom<ImageEntity> for Image {
    type Error = anyhow::Error;

    fn try_from(entity: ImageEntity) -> Result<Self, Self::Error> {
        let id = Uuid::from_str(&entity.id)
            .map_err(|e| anyhow!("image row has an invalid id {:?}: {}", entity.id, e))?;

        Ok(Self {
            id,
            name: entity.name,
            path: entity.path,
            description: entity.description,
            created_at: entity.created_at,
            alt_text: entity.alt_text,
        })
    }
}

/// The image metadata record as the rest of the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Image {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub name: String,

    /// Either an absolute URL or a blob name relative to the
    /// configured container.
    pub path: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    pub alt_text: String,
}

#[derive(Object, Debug, Clone, PartialEq, Eq)]
#[oai(rename_all = "camelCase")]
pub struct ImageDisplay {
    /// The unique id of the image.
    pub id: Uuid,

    /// A short label for the image.
    pub name: String,

    /// A URL the image can be fetched from.
    ///
    /// Images held in blob storage are returned as a time limited
    /// signed URL.
    pub path: String,

    pub description: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// Accessibility text describing the image.
    pub alt_text: String,
}

impl From<Image> for ImageDisplay {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            name: image.name,
            path: image.path,
            description: image.description,
            created_at: image.created_at,
            alt_text: image.alt_text,
        }
    }
}

impl ImageDisplay {
    #[inline]
    pub fn with_path(self, path: String) -> Self {
        Self { path, ..self }
    }
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ImageCreate {
    #[oai(validator(max_length = 75))]
    pub name: String,

    /// The intended blob name within the container.
    #[oai(validator(max_length = 250))]
    pub path: String,

    pub description: Option<String>,

    #[oai(validator(max_length = 250))]
    pub alt_text: String,
}
