use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tomato_shared::ImageKind;

use super::{ImageStore, StorageError, validate_filename, validate_image_size};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        log::info!("Storing images in S3 bucket {}", bucket_name);
        Self {
            client,
            bucket_name,
        }
    }

    pub fn generate_s3_key(kind: ImageKind, filename: &str) -> Result<String, StorageError> {
        validate_filename(filename)?;
        Ok(match kind {
            ImageKind::Original => format!("uploads/{}", filename),
            ImageKind::Annotated => format!("uploads/annotated/{}", filename),
        })
    }

    pub async fn upload_image(
        &self,
        image_data: Vec<u8>,
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), StorageError> {
        validate_image_size(&image_data)?;

        let body = ByteStream::from(image_data);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }

    pub async fn get_image(&self, s3_key: &str) -> Result<Vec<u8>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service_err) if service_err.is_no_such_key() => {
                    StorageError::NotFound(s3_key.to_string())
                }
                _ => StorageError::S3(e.to_string()),
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }
}

#[async_trait]
impl ImageStore for S3Service {
    async fn put(
        &self,
        kind: ImageKind,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = Self::generate_s3_key(kind, filename)?;
        self.upload_image(data, &key, content_type).await?;
        log::debug!("Uploaded s3://{}/{}", self.bucket_name, key);
        Ok(format!("s3://{}/{}", self.bucket_name, key))
    }

    async fn get(&self, kind: ImageKind, filename: &str) -> Result<Vec<u8>, StorageError> {
        let key = Self::generate_s3_key(kind, filename)?;
        self.get_image(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_by_kind() {
        assert_eq!(
            S3Service::generate_s3_key(ImageKind::Original, "a.jpg").unwrap(),
            "uploads/a.jpg"
        );
        assert_eq!(
            S3Service::generate_s3_key(ImageKind::Annotated, "a_annotated.jpg").unwrap(),
            "uploads/annotated/a_annotated.jpg"
        );
        assert!(S3Service::generate_s3_key(ImageKind::Original, "../a.jpg").is_err());
    }
}
