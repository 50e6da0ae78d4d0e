use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to create {path:?}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("image request for {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("image request for {url} returned {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("failed to read image body from {url}: {reason}")]
    Body { url: String, reason: String },
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("{width}x{height} scaled by {multiplier} overflows")]
    Dimensions {
        width: u32,
        height: u32,
        multiplier: u32,
    },
    #[error("unsupported output type: {kind} (JPEG output requires a file)")]
    UnsupportedTarget { kind: &'static str },
    #[error("failed to encode JPEG: {0}")]
    Encode(image::ImageError),
    #[error("failed to write image: {0}")]
    Write(#[from] std::io::Error),
    #[error("image task failed: {0}")]
    Task(String),
}

// ── Encode targets ───────────────────────────────────────────────────────────

/// A destination the JPEG encoder may be pointed at.
///
/// Only targets that hand out a writable file handle are accepted; everything
/// else is refused with [`TransformError::UnsupportedTarget`].
pub trait EncodeTarget {
    fn kind(&self) -> &'static str;

    fn file_handle(&mut self) -> Option<&mut File> {
        None
    }
}

impl EncodeTarget for File {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn file_handle(&mut self) -> Option<&mut File> {
        Some(self)
    }
}

impl EncodeTarget for Vec<u8> {
    fn kind(&self) -> &'static str {
        "in-memory buffer"
    }
}

impl<T> EncodeTarget for Cursor<T> {
    fn kind(&self) -> &'static str {
        "cursor"
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Downloads `image_url`, scales it by `multiplier` and writes it to `dest` as JPEG.
///
/// `dest` is created (or truncated) before any network activity, so a failed
/// download leaves an empty file behind. Returns the written dimensions.
pub async fn download_image(
    client: &reqwest::Client,
    image_url: &str,
    dest: &Path,
    multiplier: u32,
) -> Result<(u32, u32), TransformError> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|source| TransformError::Create {
            path: dest.to_path_buf(),
            source,
        })?
        .into_std()
        .await;

    let response = client
        .get(image_url)
        .send()
        .await
        .map_err(|e| TransformError::Request {
            url: image_url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransformError::Status {
            url: image_url.to_string(),
            status,
        });
    }

    let bytes = response.bytes().await.map_err(|e| TransformError::Body {
        url: image_url.to_string(),
        reason: e.to_string(),
    })?;
    debug!("received {} bytes from {}", bytes.len(), image_url);

    // Decoding and encoding are CPU-bound.
    tokio::task::spawn_blocking(move || -> Result<(u32, u32), TransformError> {
        let image = image::load_from_memory(&bytes).map_err(TransformError::Decode)?;
        let resized = upscale(&image, multiplier)?;
        encode_jpeg(&mut file, &resized)?;
        Ok((resized.width(), resized.height()))
    })
    .await
    .map_err(|e| TransformError::Task(e.to_string()))?
}

/// Nearest-neighbour resize to exactly `multiplier` times each dimension.
pub fn upscale(image: &DynamicImage, multiplier: u32) -> Result<DynamicImage, TransformError> {
    let (width, height) = (image.width(), image.height());
    let overflow = || TransformError::Dimensions {
        width,
        height,
        multiplier,
    };
    let target_width = width.checked_mul(multiplier).ok_or_else(overflow)?;
    let target_height = height.checked_mul(multiplier).ok_or_else(overflow)?;
    Ok(image.resize_exact(target_width, target_height, FilterType::Nearest))
}

/// Encodes `image` as JPEG at the encoder's default quality.
pub fn encode_jpeg<T>(target: &mut T, image: &DynamicImage) -> Result<(), TransformError>
where
    T: EncodeTarget + ?Sized,
{
    let kind = target.kind();
    let file = target
        .file_handle()
        .ok_or(TransformError::UnsupportedTarget { kind })?;

    let rgb = image.to_rgb8();
    let mut writer = BufWriter::new(file);
    JpegEncoder::new(&mut writer)
        .encode_image(&rgb)
        .map_err(TransformError::Encode)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn checkerboard(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn upscale_doubles_both_dimensions() {
        let resized = upscale(&checkerboard(3, 5), 2).unwrap();
        assert_eq!((resized.width(), resized.height()), (6, 10));

        let rgb = resized.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), rgb.get_pixel(1, 1));
        assert_eq!(rgb.get_pixel(2, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn upscale_reports_overflow() {
        let err = upscale(&checkerboard(2, 1), u32::MAX).unwrap_err();
        assert!(matches!(err, TransformError::Dimensions { width: 2, .. }));
    }

    #[test]
    fn encode_refuses_in_memory_buffer() {
        let mut buf: Vec<u8> = Vec::new();
        let err = encode_jpeg(&mut buf, &checkerboard(2, 2)).unwrap_err();
        assert!(matches!(
            err,
            TransformError::UnsupportedTarget {
                kind: "in-memory buffer"
            }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_refuses_cursor() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = encode_jpeg(&mut cursor, &checkerboard(2, 2)).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedTarget { kind: "cursor" }));
    }

    #[test]
    fn encode_writes_jpeg_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let mut file = File::create(&path).unwrap();
        encode_jpeg(&mut file, &checkerboard(4, 4)).unwrap();
        drop(file);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[tokio::test]
    async fn download_upscales_and_saves_jpeg() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/strip.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(png_bytes(&checkerboard(4, 3)))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("2012-02-22.jpg");
        let url = format!("{}/strip.png", server.url());
        let dims = download_image(&reqwest::Client::new(), &url, &dest, 2)
            .await
            .unwrap();
        assert_eq!(dims, (8, 6));

        let saved = image::open(&dest).unwrap();
        assert_eq!((saved.width(), saved.height()), (8, 6));
    }

    #[tokio::test]
    async fn create_failure_skips_the_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/strip.png")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("out.jpg");
        let url = format!("{}/strip.png", server.url());
        let err = download_image(&reqwest::Client::new(), &url, &dest, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Create { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_leaves_empty_file() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/strip.png")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.jpg");
        let url = format!("{}/strip.png", server.url());
        let err = download_image(&reqwest::Client::new(), &url, &dest, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Status { .. }));
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/strip.png")
            .with_status(200)
            .with_body("definitely not an image")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/strip.png", server.url());
        let err = download_image(&reqwest::Client::new(), &url, &dir.path().join("x.jpg"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }
}
