use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result};

/// Metadata of a committed image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    /// Laptop the image belongs to.
    pub laptop_id: String,
    /// File type tag, such as `.jpg`.
    pub image_type: String,
    /// Location of the image file.
    pub path: PathBuf,
    /// Size of the image in bytes.
    pub size: u64,
}

/// Image store writing one file per image under a root directory.
///
/// Files are named `<image id><image type>`. An image is written to a
/// temporary file first and renamed into place, so a reader either sees
/// the whole image or no file at all.
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
    images: RwLock<HashMap<String, ImageInfo>>,
}

impl ImageStore {
    /// Creates a store rooted at `root`. The directory is created on the
    /// first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            images: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the directory images are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists `data` as a new image of `laptop_id` and returns its ID.
    pub async fn save(&self, laptop_id: &str, image_type: &str, data: &[u8]) -> Result<String> {
        validate_image_type(image_type)?;

        let image_id = Uuid::new_v4().to_string();
        let path = self.root.join(format!("{image_id}{image_type}"));
        let partial = self.root.join(format!(".{image_id}.part"));

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&partial, data).await?;
        if let Err(err) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }

        debug!(image_id = %image_id, path = %path.display(), "image file written");

        let info = ImageInfo {
            laptop_id: laptop_id.to_string(),
            image_type: image_type.to_string(),
            path,
            size: data.len() as u64,
        };
        self.images.write().await.insert(image_id.clone(), info);

        info!(image_id = %image_id, laptop_id, size = data.len(), "image saved");
        Ok(image_id)
    }

    /// Returns the metadata of a saved image.
    pub async fn find(&self, image_id: &str) -> Option<ImageInfo> {
        self.images.read().await.get(image_id).cloned()
    }

    /// Returns the number of saved images.
    pub async fn count(&self) -> usize {
        self.images.read().await.len()
    }
}

/// Accepts an empty type or an extension such as `.png`.
pub(crate) fn validate_image_type(image_type: &str) -> Result<()> {
    if image_type.is_empty() {
        return Ok(());
    }

    let valid = image_type.len() <= 16
        && image_type.starts_with('.')
        && image_type[1..].chars().all(|c| c.is_ascii_alphanumeric())
        && image_type.len() > 1;

    if !valid {
        return Err(Error::InvalidArgument(format!(
            "image type {image_type:?} is not a file extension"
        )));
    }

    Ok(())
}
