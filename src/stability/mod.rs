pub mod rest_client;

use crate::{
    error::{PipelineError, Result},
    models::{Answer, ArtifactKind, FinishReason, GenerationParameters},
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};
use std::io::{Seek, Write};

pub use rest_client::StabilityClient;

/// Lazily produced sequence of answers from one generation call.
pub type AnswerStream = BoxStream<'static, Result<Answer>>;

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParameters)
        -> Result<AnswerStream>;

    fn name(&self) -> &str;
}

/// An image payload decoded in memory, remembering the format it arrived in.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

impl DecodedImage {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(PipelineError::ImageError(
                "image artifact has an empty payload".into(),
            ));
        }
        let format = image::guess_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self { image, format })
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// Encodes in the native format at maximum quality.
    pub fn encode_into<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        match self.format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(self.image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, 100))?;
            }
            format => self.image.write_to(writer, format)?,
        }
        Ok(())
    }
}

/// Outcome of walking a generation response.
#[derive(Debug)]
pub enum Extraction {
    Image(DecodedImage),
    Filtered,
    NotFound,
}

impl Extraction {
    pub fn into_image(self) -> Result<DecodedImage> {
        match self {
            Extraction::Image(image) => Ok(image),
            Extraction::Filtered => Err(PipelineError::ContentFiltered),
            Extraction::NotFound => Err(PipelineError::NoImageProduced),
        }
    }
}

/// Walks every answer and artifact. A filtered artifact stops the walk; among
/// image artifacts the last one wins.
pub async fn extract_image(mut answers: AnswerStream) -> Result<Extraction> {
    let mut found = None;

    while let Some(answer) = answers.next().await {
        for artifact in answer?.artifacts {
            if artifact.finish_reason == FinishReason::Filtered {
                log::warn!("Generation rejected by safety filter");
                return Ok(Extraction::Filtered);
            }
            if artifact.kind == ArtifactKind::Image {
                if found.is_some() {
                    log::debug!("Replacing earlier image artifact with a later one");
                }
                let bytes = artifact.binary;
                let decoded =
                    tokio::task::spawn_blocking(move || DecodedImage::decode(&bytes)).await??;
                found = Some(decoded);
            }
        }
    }

    Ok(match found {
        Some(image) => Extraction::Image(image),
        None => Extraction::NotFound,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::Artifact;
    use futures::stream;

    fn pixel(image: &DecodedImage) -> [u8; 3] {
        image.image.to_rgb8().get_pixel(0, 0).0
    }

    #[tokio::test]
    async fn test_single_image_is_extracted() {
        let answers = answer_stream(vec![Answer::new(vec![Artifact::image(png_bytes([
            10, 20, 30,
        ]))])]);

        let image = extract_image(answers).await.unwrap().into_image().unwrap();
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(pixel(&image), [10, 20, 30]);
    }

    #[tokio::test]
    async fn test_last_image_wins() {
        let answers = answer_stream(vec![
            Answer::new(vec![Artifact::image(png_bytes([255, 0, 0]))]),
            Answer::new(vec![Artifact::image(png_bytes([0, 0, 255]))]),
        ]);

        let image = extract_image(answers).await.unwrap().into_image().unwrap();
        assert_eq!(pixel(&image), [0, 0, 255]);
    }

    #[tokio::test]
    async fn test_filter_stops_the_walk() {
        // The corrupt payload after the filtered artifact must never be decoded.
        let answers = answer_stream(vec![Answer::new(vec![
            Artifact::image(png_bytes([1, 2, 3])),
            Artifact::filtered(),
            Artifact::image(b"not an image".to_vec()),
        ])]);

        let extraction = extract_image(answers).await.unwrap();
        assert!(matches!(extraction, Extraction::Filtered));
        assert!(matches!(
            extraction.into_image(),
            Err(PipelineError::ContentFiltered)
        ));
    }

    #[tokio::test]
    async fn test_no_artifacts_is_not_found() {
        let answers = answer_stream(vec![Answer::default(), Answer::default()]);
        let extraction = extract_image(answers).await.unwrap();
        assert!(matches!(extraction, Extraction::NotFound));
        assert!(matches!(
            extraction.into_image(),
            Err(PipelineError::NoImageProduced)
        ));
    }

    #[tokio::test]
    async fn test_non_image_artifacts_are_ignored() {
        let mut other = Artifact::image(b"{\"text\":\"hi\"}".to_vec());
        other.kind = ArtifactKind::Other;
        let answers = answer_stream(vec![Answer::new(vec![other])]);

        assert!(matches!(
            extract_image(answers).await.unwrap(),
            Extraction::NotFound
        ));
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let answers: AnswerStream = stream::iter(vec![Err(PipelineError::GenerationError(
            "connection reset".into(),
        ))])
        .boxed();

        assert!(matches!(
            extract_image(answers).await,
            Err(PipelineError::GenerationError(_))
        ));
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        assert!(matches!(
            DecodedImage::decode(&[]),
            Err(PipelineError::ImageError(_))
        ));
    }

    #[test]
    fn test_encode_keeps_native_format() {
        let image = DecodedImage::decode(&png_bytes([7, 8, 9])).unwrap();
        assert_eq!(image.extension(), "png");
        assert_eq!(image.mime_type(), "image/png");

        let mut out = std::io::Cursor::new(Vec::new());
        image.encode_into(&mut out).unwrap();
        let reread = DecodedImage::decode(&out.into_inner()).unwrap();
        assert_eq!(reread.format, ImageFormat::Png);
        assert_eq!(pixel(&reread), [7, 8, 9]);
    }
}
