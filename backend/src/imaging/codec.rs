use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use uuid::Uuid;

const FALLBACK_EXTENSION: &str = "jpg";
const STORABLE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Could not decode image: {0}")]
    Decode(image::ImageError),
    #[error("Could not encode image as {format:?}: {source}")]
    Encode {
        format: ImageFormat,
        source: image::ImageError,
    },
}

pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, CodecError> {
    let image = image::load_from_memory(bytes).map_err(CodecError::Decode)?;
    Ok(image.to_rgb8())
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(|source| CodecError::Encode { format, source })?;
    Ok(buffer.into_inner())
}

pub fn to_data_uri(image: &RgbImage) -> Result<String, CodecError> {
    let jpeg = encode(image, ImageFormat::Jpeg)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}

/// Lowercased extension of `filename` when it names a format we can write,
/// otherwise `jpg`.
pub fn storage_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| STORABLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

pub fn format_for(filename: &str) -> ImageFormat {
    ImageFormat::from_path(filename).unwrap_or(ImageFormat::Jpeg)
}

pub fn content_type_for(filename: &str) -> &'static str {
    ImageFormat::from_path(filename)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

pub fn unique_filename(original: &str) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), storage_extension(original))
}

pub fn annotated_filename(saved: &str) -> String {
    let path = Path::new(saved);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    format!("{}_annotated.{}", stem, storage_extension(saved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn extension_is_kept_lowercased_or_defaults_to_jpg() {
        assert_eq!(storage_extension("IMG_0042.PNG"), "png");
        assert_eq!(storage_extension("photo.jpeg"), "jpeg");
        assert_eq!(storage_extension("no_extension"), "jpg");
        assert_eq!(storage_extension("notes.txt"), "jpg");
        assert_eq!(storage_extension(""), "jpg");
    }

    #[test]
    fn generated_names_are_unique_and_paired() {
        let a = unique_filename("tomatoes.png");
        let b = unique_filename("tomatoes.png");
        assert_ne!(a, b);
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), 32 + 4);

        let stem = a.trim_end_matches(".png");
        assert_eq!(annotated_filename(&a), format!("{}_annotated.png", stem));
        assert_eq!(annotated_filename("abc"), "abc_annotated.jpg");
    }

    #[test]
    fn png_bytes_decode_to_the_same_pixels() {
        let image = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 80, 7]));
        let bytes = encode(&image, ImageFormat::Png).unwrap();
        assert_eq!(decode_rgb(&bytes).unwrap(), image);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_rgb(b"not an image"),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn data_uri_is_jpeg() {
        let uri = to_data_uri(&RgbImage::new(4, 4)).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }
}
