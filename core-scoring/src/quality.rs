// =====================================================================================
// File: core-scoring/src/quality.rs
// Description: Per-image quality scoring: blur, brightness, contrast, resolution
// =====================================================================================

use std::sync::Arc;
use tracing::debug;

use crate::capabilities::{DecodedImage, ImageDecoder};
use crate::config::QualityConfig;
use crate::imaging;
use crate::media::{MediaLoader, MediaSource};
use crate::types::ImageQualityResult;

/// Evaluates blur, lighting, contrast, and resolution for evidence images
pub struct QualityAnalyzer {
    loader: Arc<MediaLoader>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    config: QualityConfig,
}

impl QualityAnalyzer {
    pub fn new(
        loader: Arc<MediaLoader>,
        decoder: Option<Arc<dyn ImageDecoder>>,
        config: QualityConfig,
    ) -> Self {
        Self {
            loader,
            decoder,
            config,
        }
    }

    pub fn analyze_batch<S: MediaSource>(&self, images: &[S]) -> Vec<ImageQualityResult> {
        images
            .iter()
            .map(|image| match self.loader.load_bytes(image) {
                Ok(payload) => self.analyze_single(image.media_id(), &payload),
                Err(err) => Self::failed_result(image.media_id(), err.to_string()),
            })
            .collect()
    }

    fn analyze_single(&self, image_id: &str, payload: &[u8]) -> ImageQualityResult {
        let Some(decoder) = &self.decoder else {
            return self.neutral_result(image_id);
        };

        let decoded = match decoder.decode(image_id, payload) {
            Ok(decoded) => decoded,
            Err(err) => return Self::failed_result(image_id, err.to_string()),
        };
        let DecodedImage { gray, width, height } = decoded;

        let blur_variance = imaging::laplacian_variance(&gray);
        let brightness = imaging::mean_intensity(&gray);
        let contrast = imaging::intensity_stddev(&gray);
        let resolution_ok = width >= self.config.min_width && height >= self.config.min_height;

        let mut flags: Vec<String> = Vec::new();

        let blur_score = if blur_variance < self.config.blur_variance_threshold {
            flags.push("blurry".to_string());
            (blur_variance / self.config.blur_variance_threshold).max(0.0)
        } else {
            1.0
        };

        let brightness_score = self.normalize_brightness(brightness, &mut flags);

        let contrast_score = if contrast < self.config.contrast_threshold {
            flags.push("low_contrast".to_string());
            (contrast / self.config.contrast_threshold).max(0.0)
        } else {
            1.0
        };

        let resolution_score = if resolution_ok {
            1.0
        } else {
            flags.push("low_resolution".to_string());
            0.0
        };

        let quality_score =
            (blur_score + brightness_score + contrast_score + resolution_score) / 4.0;
        let officer_review_flag = quality_score < self.config.officer_review_quality_threshold;
        let reason_if_fail = if flags.is_empty() {
            None
        } else {
            Some(flags.join(", "))
        };

        debug!(image_id, quality_score, ?flags, "Image quality computed");

        ImageQualityResult {
            image_id: image_id.to_string(),
            quality_score: round3(quality_score),
            blur_variance: round2(blur_variance),
            brightness: round2(brightness),
            contrast: round2(contrast),
            resolution_ok,
            flags,
            officer_review_flag,
            reason_if_fail,
        }
    }

    fn normalize_brightness(&self, brightness: f64, flags: &mut Vec<String>) -> f64 {
        let low = self.config.brightness_dark_threshold;
        let high = self.config.brightness_bright_threshold;
        if brightness <= low {
            flags.push("too_dark".to_string());
            return (brightness / low.max(1.0)).max(0.0);
        }
        if brightness >= high {
            flags.push("too_bright".to_string());
            return (1.0 - (brightness - high) / (255.0 - high).max(1.0)).max(0.0);
        }
        1.0
    }

    fn neutral_result(&self, image_id: &str) -> ImageQualityResult {
        ImageQualityResult {
            image_id: image_id.to_string(),
            quality_score: 0.5,
            blur_variance: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            resolution_ok: true,
            // Downstream dashboards key on this flag name
            flags: vec!["opencv_missing".to_string()],
            officer_review_flag: true,
            reason_if_fail: Some("image decoder unavailable; defaulting to neutral score".into()),
        }
    }

    fn failed_result(image_id: &str, reason: String) -> ImageQualityResult {
        ImageQualityResult {
            image_id: image_id.to_string(),
            quality_score: 0.0,
            blur_variance: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            resolution_ok: false,
            flags: Vec::new(),
            officer_review_flag: false,
            reason_if_fail: Some(reason),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DefaultImageDecoder;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    fn encode_base64(gray: GrayImage) -> String {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(gray)
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .unwrap();
        BASE64.encode(buffer.into_inner())
    }

    fn evidence(id: &str, base64_data: Option<String>) -> crate::types::EvidenceImage {
        crate::types::EvidenceImage {
            id: id.to_string(),
            url: None,
            file_path: None,
            base64_data,
            mime_type: None,
            declared_asset_type: None,
            timestamp: None,
        }
    }

    fn analyzer(decoder: Option<Arc<dyn ImageDecoder>>) -> QualityAnalyzer {
        QualityAnalyzer::new(
            Arc::new(MediaLoader::default()),
            decoder,
            QualityConfig::default(),
        )
    }

    /// Bright, textured frame at full resolution; passes every check
    fn clear_image() -> GrayImage {
        GrayImage::from_fn(640, 480, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Luma([150])
            } else {
                Luma([210])
            }
        })
    }

    #[test]
    fn test_clear_image_passes_all_checks() {
        let service = analyzer(Some(Arc::new(DefaultImageDecoder)));
        let image = evidence("img-clear", Some(encode_base64(clear_image())));

        let result = &service.analyze_batch(&[image])[0];

        assert!(result.quality_score >= 0.9, "score {}", result.quality_score);
        assert!(result.flags.is_empty());
        assert!(!result.officer_review_flag);
        assert!(result.resolution_ok);
        assert!(result.reason_if_fail.is_none());
    }

    #[test]
    fn test_dark_uniform_image_is_flagged() {
        let service = analyzer(Some(Arc::new(DefaultImageDecoder)));
        let dark = GrayImage::from_pixel(640, 480, Luma([20]));
        let image = evidence("img-dark", Some(encode_base64(dark)));

        let result = &service.analyze_batch(&[image])[0];

        assert!(result.flags.contains(&"too_dark".to_string()));
        assert!(result.flags.contains(&"low_contrast".to_string()));
        assert!(result.flags.contains(&"blurry".to_string()));
        assert!(result.officer_review_flag);
        assert!(result.quality_score < 0.8);
    }

    #[test]
    fn test_low_resolution_zeroes_resolution_score() {
        let service = analyzer(Some(Arc::new(DefaultImageDecoder)));
        let small = GrayImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([150])
            } else {
                Luma([210])
            }
        });
        let image = evidence("img-small", Some(encode_base64(small)));

        let result = &service.analyze_batch(&[image])[0];

        assert!(!result.resolution_ok);
        assert!(result.flags.contains(&"low_resolution".to_string()));
    }

    #[test]
    fn test_missing_decoder_yields_neutral_score() {
        let service = analyzer(None);
        let image = evidence("img-1", Some(encode_base64(clear_image())));

        let result = &service.analyze_batch(&[image])[0];

        assert_eq!(result.quality_score, 0.5);
        assert!(result.flags.contains(&"opencv_missing".to_string()));
        assert!(result.officer_review_flag);
    }

    #[test]
    fn test_missing_payload_scores_zero() {
        let service = analyzer(Some(Arc::new(DefaultImageDecoder)));
        let image = evidence("img-empty", None);

        let result = &service.analyze_batch(&[image])[0];

        assert_eq!(result.quality_score, 0.0);
        assert!(result
            .reason_if_fail
            .as_deref()
            .unwrap()
            .contains("no media payload"));
    }

    #[test]
    fn test_undecodable_payload_scores_zero() {
        let service = analyzer(Some(Arc::new(DefaultImageDecoder)));
        let image = evidence("img-bad", Some(BASE64.encode(b"not an image")));

        let result = &service.analyze_batch(&[image])[0];

        assert_eq!(result.quality_score, 0.0);
        assert!(result.reason_if_fail.is_some());
    }
}
