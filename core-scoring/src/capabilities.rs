// =====================================================================================
// File: core-scoring/src/capabilities.rs
// Description: Capability traits for optional heavy dependencies (image decoding,
//              detection models, OCR providers, perceptual hashing, text boxes).
//              Fallback behavior is selected at pipeline construction.
// =====================================================================================

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ScoringError, ScoringResult};
use crate::imaging;
use crate::types::Detection;

/// A decoded frame with its original dimensions
#[derive(Debug)]
pub struct DecodedImage {
    pub gray: GrayImage,
    pub width: u32,
    pub height: u32,
}

/// Decodes raw payload bytes into a grayscale frame
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, evidence_id: &str, bytes: &[u8]) -> ScoringResult<DecodedImage>;
}

/// Default decoder backed by the `image` crate
pub struct DefaultImageDecoder;

impl ImageDecoder for DefaultImageDecoder {
    fn decode(&self, evidence_id: &str, bytes: &[u8]) -> ScoringResult<DecodedImage> {
        let decoded = image::load_from_memory(bytes).map_err(|err| {
            ScoringError::decode_error(evidence_id, &format!("failed to decode image: {err}"))
        })?;
        let gray = decoded.to_luma8();
        let (width, height) = gray.dimensions();
        Ok(DecodedImage { gray, width, height })
    }
}

/// Object detection model over raw image bytes
pub trait DetectionModel: Send + Sync {
    fn detect(
        &self,
        bytes: &[u8],
        confidence_threshold: f64,
        iou_threshold: f64,
    ) -> ScoringResult<Vec<Detection>>;
}

/// Extracts document text and an average confidence from raw bytes
pub trait OcrProvider: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> ScoringResult<(String, f64)>;
}

/// REST OCR provider (Vision-style annotate endpoint, API-key auth)
pub struct RestOcrProvider {
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl RestOcrProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_secs,
        }
    }
}

impl OcrProvider for RestOcrProvider {
    // Runs on a blocking worker; the client is scoped to the single call
    fn extract_text(&self, bytes: &[u8]) -> ScoringResult<(String, f64)> {
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": BASE64.encode(bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }]
            }]
        });
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|err| ScoringError::external_service_error("ocr", &err.to_string()))?;
        let response = client
            .post(format!("{}?key={}", self.endpoint, self.api_key))
            .json(&body)
            .send()
            .map_err(|err| ScoringError::external_service_error("ocr", &err.to_string()))?;
        if !response.status().is_success() {
            return Err(ScoringError::external_service_error(
                "ocr".to_string(),
                format!("provider returned {}", response.status()),
            ));
        }
        let payload: serde_json::Value = response
            .json()
            .map_err(|err| ScoringError::external_service_error("ocr", &err.to_string()))?;

        let annotation = &payload["responses"][0]["fullTextAnnotation"];
        let text = annotation["text"].as_str().unwrap_or_default().to_string();
        let confidence = annotation["pages"]
            .as_array()
            .and_then(|pages| {
                let values: Vec<f64> = pages
                    .iter()
                    .filter_map(|page| page["confidence"].as_f64())
                    .collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            })
            .unwrap_or(0.8);
        Ok((text, confidence))
    }
}

/// Produces the hex form of a 64-bit perceptual hash for raw image bytes
pub trait PerceptualHasher: Send + Sync {
    fn hash_hex(&self, evidence_id: &str, bytes: &[u8]) -> ScoringResult<String>;
}

/// Default DCT-based pHash over the `image` crate
pub struct DctHasher;

impl PerceptualHasher for DctHasher {
    fn hash_hex(&self, evidence_id: &str, bytes: &[u8]) -> ScoringResult<String> {
        let decoded = image::load_from_memory(bytes).map_err(|err| {
            ScoringError::decode_error(evidence_id, &format!("failed to decode image: {err}"))
        })?;
        Ok(imaging::hash_to_hex(imaging::phash(&decoded.to_luma8())))
    }
}

/// A positioned text token reported by a text-box extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub conf: f64,
}

/// Extracts full text plus positioned boxes for the forensic layer
pub trait TextBoxExtractor: Send + Sync {
    fn extract_boxes(&self, bytes: &[u8]) -> ScoringResult<(String, Vec<TextBox>)>;
}

/// The optional capabilities available to one pipeline instance. Absent
/// entries select each analyzer's documented fallback.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    pub decoder: Option<Arc<dyn ImageDecoder>>,
    pub detection_model: Option<Arc<dyn DetectionModel>>,
    pub ocr_provider: Option<Arc<dyn OcrProvider>>,
    pub hasher: Option<Arc<dyn PerceptualHasher>>,
    pub text_extractor: Option<Arc<dyn TextBoxExtractor>>,
}

impl CapabilitySet {
    /// The standard local set: decoder and hasher from the `image` crate,
    /// no detection model, OCR provider, or forensic text extractor
    pub fn standard() -> Self {
        Self {
            decoder: Some(Arc::new(DefaultImageDecoder)),
            detection_model: None,
            ocr_provider: None,
            hasher: Some(Arc::new(DctHasher)),
            text_extractor: None,
        }
    }

    /// Availability map reported by the health endpoint
    pub fn availability(&self) -> HashMap<String, bool> {
        HashMap::from([
            ("image_decoder".to_string(), self.decoder.is_some()),
            ("detection_model".to_string(), self.detection_model.is_some()),
            ("ocr_provider".to_string(), self.ocr_provider.is_some()),
            ("perceptual_hasher".to_string(), self.hasher.is_some()),
            ("text_extractor".to_string(), self.text_extractor.is_some()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    pub(crate) fn encode_png(gray: &GrayImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(gray.clone())
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_default_decoder_round_trip() {
        let gray = GrayImage::from_pixel(40, 30, Luma([180]));
        let bytes = encode_png(&gray);

        let decoded = DefaultImageDecoder.decode("img-1", &bytes).unwrap();
        assert_eq!(decoded.width, 40);
        assert_eq!(decoded.height, 30);
        assert_eq!(decoded.gray.get_pixel(0, 0)[0], 180);
    }

    #[test]
    fn test_default_decoder_rejects_garbage() {
        let err = DefaultImageDecoder.decode("img-1", b"not an image").unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_dct_hasher_stable_across_payloads() {
        let gray = GrayImage::from_fn(64, 64, |x, y| Luma([((x * y) % 255) as u8]));
        let bytes = encode_png(&gray);
        let first = DctHasher.hash_hex("img-1", &bytes).unwrap();
        let second = DctHasher.hash_hex("img-1", &bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
    }

    #[test]
    fn test_standard_capability_availability() {
        let availability = CapabilitySet::standard().availability();
        assert_eq!(availability["image_decoder"], true);
        assert_eq!(availability["perceptual_hasher"], true);
        assert_eq!(availability["detection_model"], false);
        assert_eq!(availability["ocr_provider"], false);
    }
}
