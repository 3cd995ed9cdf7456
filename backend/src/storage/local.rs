use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tomato_shared::ImageKind;

use super::{ImageStore, StorageError, validate_filename, validate_image_size};

/// Keeps originals and annotated images in two directories on local disk.
#[derive(Clone)]
pub struct LocalImageStore {
    upload_dir: PathBuf,
    annotated_dir: PathBuf,
}

impl LocalImageStore {
    pub async fn new(upload_dir: PathBuf, annotated_dir: PathBuf) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&upload_dir).await?;
        tokio::fs::create_dir_all(&annotated_dir).await?;
        log::info!(
            "Storing images under {} and {}",
            upload_dir.display(),
            annotated_dir.display()
        );
        Ok(Self {
            upload_dir,
            annotated_dir,
        })
    }

    fn path_for(&self, kind: ImageKind, filename: &str) -> Result<PathBuf, StorageError> {
        validate_filename(filename)?;
        let dir = match kind {
            ImageKind::Original => &self.upload_dir,
            ImageKind::Annotated => &self.annotated_dir,
        };
        Ok(dir.join(filename))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(
        &self,
        kind: ImageKind,
        filename: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        validate_image_size(&data)?;
        let path = self.path_for(kind, filename)?;
        tokio::fs::write(&path, data).await?;
        log::debug!("Wrote {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, kind: ImageKind, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(kind, filename)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(root: &std::path::Path) -> LocalImageStore {
        LocalImageStore::new(root.join("uploads"), root.join("uploads/annotated"))
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn put_then_get_round_trips_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let path = store
            .put(ImageKind::Original, "a.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert!(path.ends_with("uploads/a.jpg"));
        store
            .put(ImageKind::Annotated, "a.jpg", vec![9], "image/jpeg")
            .await
            .unwrap();

        assert_eq!(store.get(ImageKind::Original, "a.jpg").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.get(ImageKind::Annotated, "a.jpg").await.unwrap(), vec![9]);
    }

    #[actix_web::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        assert!(matches!(
            store.get(ImageKind::Original, "nope.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn traversal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        assert!(matches!(
            store.get(ImageKind::Annotated, "../a.jpg").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            store
                .put(ImageKind::Original, "x/../../y.jpg", vec![0], "image/jpeg")
                .await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
