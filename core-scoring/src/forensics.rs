// =====================================================================================
// File: core-scoring/src/forensics.rs
// Description: Heuristic invoice forgery detection: EXIF traces, blur and spectral
//              signals, formatting variance, and arithmetic consistency
// =====================================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::capabilities::{ImageDecoder, TextBox, TextBoxExtractor};
use crate::config::ForensicConfig;
use crate::imaging;
use crate::media::{MediaLoader, MediaSource};
use crate::types::{
    ArithmeticFindings, BlurFindings, EvidenceDocument, ExifFindings, ForensicDetails,
    ForensicLabel, ForensicResult,
};

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}[-/]\d{2}[-/]\d{2}").unwrap());
static DMY_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{2}[-/]\d{2}[-/]\d{4}").unwrap());
static WORDY_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]{3,9}\s+\d{1,2},\s*\d{4}").unwrap());
static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\d{1,3}(?:,\d{3})*|\d+)(?:\.\d{1,2})?").unwrap());

const EDITOR_MARKERS: [&str; 3] = ["photoshop", "gimp", "editor"];
const SECTION_KEYWORDS: [&str; 7] = [
    "total", "subtotal", "tax", "gst", "merchant", "invoice", "date",
];
const MAX_PLAUSIBLE_AMOUNT: f64 = 10_000_000.0;
const MAX_SUBSET_SIZE: usize = 5;

#[derive(Debug, Default)]
struct FormattingFindings {
    font_variation_score: f64,
    alignment_variation: f64,
    missing_sections: Vec<String>,
}

/// Detects forged or tampered invoice images
pub struct ForensicAnalyzer {
    loader: Arc<MediaLoader>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    text_extractor: Option<Arc<dyn TextBoxExtractor>>,
    config: ForensicConfig,
}

impl ForensicAnalyzer {
    pub fn new(
        loader: Arc<MediaLoader>,
        decoder: Option<Arc<dyn ImageDecoder>>,
        text_extractor: Option<Arc<dyn TextBoxExtractor>>,
        config: ForensicConfig,
    ) -> Self {
        Self {
            loader,
            decoder,
            text_extractor,
            config,
        }
    }

    pub fn analyze_documents(&self, documents: &[EvidenceDocument]) -> Vec<ForensicResult> {
        documents
            .iter()
            .map(|doc| match self.loader.load_bytes(doc) {
                Ok(payload) => self.analyze_invoice(&doc.id, &payload),
                Err(err) => ForensicResult {
                    doc_id: doc.id.clone(),
                    label: ForensicLabel::Genuine,
                    forensic_score: 0.0,
                    reasons: Vec::new(),
                    details: ForensicDetails {
                        error: Some(err.to_string()),
                        ..ForensicDetails::default()
                    },
                },
            })
            .collect()
    }

    fn analyze_invoice(&self, doc_id: &str, payload: &[u8]) -> ForensicResult {
        // Text first: the formatting, arithmetic, and EXIF-date signals all
        // read from it. A missing extractor degrades only those signals.
        let (ocr_text, boxes) = match &self.text_extractor {
            Some(extractor) => extractor
                .extract_boxes(payload)
                .unwrap_or_else(|_| (String::new(), Vec::new())),
            None => (String::new(), Vec::new()),
        };

        let exif = self.check_exif(payload, &ocr_text);
        let formatting = Self::check_formatting(&boxes);
        let arithmetic =
            Self::check_arithmetic(&ocr_text, self.config.arithmetic_tolerance_pct);

        let mut decode_error = None;
        let blur = match &self.decoder {
            Some(decoder) => match decoder.decode(doc_id, payload) {
                Ok(decoded) => Some(BlurFindings {
                    lap_var: imaging::laplacian_variance(&decoded.gray),
                    high_low_ratio: imaging::high_low_frequency_ratio(&decoded.gray),
                }),
                Err(err) => {
                    decode_error = Some(err.to_string());
                    None
                }
            },
            None => None,
        };

        let mut score = 0.0;
        let mut reasons: Vec<String> = Vec::new();
        let points = &self.config.points;

        if let Some(software) = &exif.exif_software {
            let lowered = software.to_lowercase();
            if EDITOR_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                score += points.edited_software;
                reasons.push(format!("EXIF software indicates editing: {software}"));
            }
        }

        if exif.date_mismatch {
            score += points.exif_date_mismatch;
            reasons.push("EXIF date mismatch with printed transaction date".to_string());
        }

        if let Some(blur) = &blur {
            if blur.lap_var < self.config.blur_variance_cutoff {
                score += points.blurry;
                reasons.push(format!(
                    "Image looks blurry (laplacian variance {:.1})",
                    blur.lap_var
                ));
            }
            if blur.high_low_ratio < self.config.high_frequency_ratio_cutoff {
                score += points.low_high_frequency;
                reasons.push("Low high-frequency content (possible upscaling)".to_string());
            }
        }

        if formatting.font_variation_score > self.config.font_variation_cutoff {
            score += points.font_variation;
            reasons.push(format!(
                "High font size variance ({:.2})",
                formatting.font_variation_score
            ));
        }

        if formatting.alignment_variation > self.config.alignment_cutoff_px {
            score += points.alignment_variation;
            reasons.push("Significant alignment variation".to_string());
        }

        if formatting.missing_sections.len() >= self.config.missing_sections_minimum {
            score += points.missing_sections;
            reasons.push(format!(
                "Missing sections: {:?}",
                formatting.missing_sections
            ));
        }

        if !arithmetic.found_total_match && arithmetic.amount_count >= 3 {
            score += points.arithmetic_mismatch;
            reasons.push("Arithmetic mismatch (items sum != total)".to_string());
        }

        let normalized = (score / self.config.score_divisor).min(1.0);
        let label = if normalized >= self.config.forged_threshold {
            ForensicLabel::Forged
        } else if normalized >= self.config.suspicious_threshold {
            ForensicLabel::Suspicious
        } else {
            ForensicLabel::Genuine
        };

        debug!(doc_id, normalized, ?label, "Forensic analysis done");

        ForensicResult {
            doc_id: doc_id.to_string(),
            label,
            forensic_score: normalized,
            reasons,
            details: ForensicDetails {
                exif,
                blur: blur.unwrap_or_default(),
                arithmetic,
                error: decode_error,
            },
        }
    }

    /// EXIF software trace plus original-datetime vs printed-date comparison
    fn check_exif(&self, payload: &[u8], ocr_text: &str) -> ExifFindings {
        let mut findings = ExifFindings::default();

        let mut cursor = Cursor::new(payload);
        if let Ok(data) = exif::Reader::new().read_from_container(&mut cursor) {
            if let Some(field) = data.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) {
                findings.exif_present = true;
                findings.exif_datetime = Some(field.display_value().to_string());
            }
            if let Some(field) = data.get_field(exif::Tag::Software, exif::In::PRIMARY) {
                findings.exif_present = true;
                findings.exif_software = Some(
                    field
                        .display_value()
                        .to_string()
                        .trim_matches('"')
                        .trim()
                        .to_string(),
                );
            }
        }

        let printed_date = Self::find_printed_date(ocr_text);
        if let (Some(exif_dt), Some(found)) = (&findings.exif_datetime, printed_date) {
            if let (Some(exif_date), Some(found_date)) =
                (Self::exif_date_part(exif_dt), Self::normalize_printed_date(&found))
            {
                if exif_date != found_date {
                    findings.date_mismatch = true;
                }
            }
        }

        findings
    }

    fn find_printed_date(text: &str) -> Option<String> {
        for pattern in [&*ISO_DATE_RE, &*DMY_DATE_RE, &*WORDY_DATE_RE] {
            if let Some(found) = pattern.find(text) {
                return Some(found.as_str().to_string());
            }
        }
        None
    }

    /// Date portion of an EXIF datetime, dashes for separators
    fn exif_date_part(datetime: &str) -> Option<String> {
        let date = datetime.split_whitespace().next()?;
        Some(date.replace(':', "-").replace('/', "-"))
    }

    /// Normalize a printed date to Y-m-d; month-name forms are not comparable
    fn normalize_printed_date(found: &str) -> Option<String> {
        let dashed = found.replace('/', "-");
        let parts: Vec<&str> = dashed.split('-').collect();
        if parts.len() != 3 {
            return None;
        }
        if parts[0].len() == 4 {
            Some(dashed)
        } else {
            Some(format!("{}-{}-{}", parts[2], parts[1], parts[0]))
        }
    }

    /// Font-height variance, row alignment spread, and missing invoice sections
    fn check_formatting(boxes: &[TextBox]) -> FormattingFindings {
        if boxes.is_empty() {
            return FormattingFindings {
                font_variation_score: 1.0,
                alignment_variation: 1.0,
                missing_sections: vec!["merchant".to_string(), "total".to_string()],
            };
        }

        let heights: Vec<f64> = boxes.iter().map(|b| b.height as f64).collect();
        let font_variation_score = if heights.len() >= 2 {
            let mean = heights.iter().sum::<f64>() / heights.len() as f64;
            let std = (heights.iter().map(|h| (h - mean).powi(2)).sum::<f64>()
                / heights.len() as f64)
                .sqrt();
            std / (mean + 1e-8)
        } else {
            0.0
        };

        let mut rows: std::collections::BTreeMap<i64, Vec<f64>> = std::collections::BTreeMap::new();
        for text_box in boxes {
            rows.entry(text_box.top / 8)
                .or_default()
                .push(text_box.left as f64);
        }
        let row_stddevs: Vec<f64> = rows
            .values()
            .filter(|lefts| lefts.len() > 1)
            .map(|lefts| {
                let mean = lefts.iter().sum::<f64>() / lefts.len() as f64;
                (lefts.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lefts.len() as f64).sqrt()
            })
            .collect();
        let alignment_variation = if row_stddevs.is_empty() {
            0.0
        } else {
            row_stddevs.iter().sum::<f64>() / row_stddevs.len() as f64
        };

        let full_text = boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let missing_sections = SECTION_KEYWORDS
            .iter()
            .filter(|keyword| !full_text.contains(**keyword))
            .map(|keyword| keyword.to_string())
            .collect();

        FormattingFindings {
            font_variation_score,
            alignment_variation,
            missing_sections,
        }
    }

    /// Do the detected amounts admit a subset summing to the printed total?
    fn check_arithmetic(ocr_text: &str, tolerance_pct: f64) -> ArithmeticFindings {
        let cleaned = ocr_text.replace('O', "0");
        let mut amounts: Vec<f64> = AMOUNT_RE
            .find_iter(&cleaned)
            .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            .filter(|v| *v > 0.0 && *v < MAX_PLAUSIBLE_AMOUNT)
            .collect();
        amounts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut findings = ArithmeticFindings {
            found_total_match: false,
            best_total: None,
            amount_count: amounts.len(),
        };
        let Some(&printed_total) = amounts.last() else {
            return findings;
        };

        let items = &amounts[..amounts.len() - 1];
        let sum_items: f64 = items.iter().sum();
        let within =
            |candidate: f64| (candidate - printed_total).abs() / (printed_total + 1e-8) < tolerance_pct;

        if sum_items > 0.0 && within(sum_items) {
            findings.found_total_match = true;
            findings.best_total = Some(printed_total);
            return findings;
        }

        let best = Self::subset_sum_match(items, &within);
        findings.found_total_match = best.is_some();
        findings.best_total = Some(best.unwrap_or(printed_total));
        findings
    }

    /// First subset of size ≤ MAX_SUBSET_SIZE whose sum lands within tolerance.
    /// The size cap bounds worst-case work on amount-heavy documents.
    fn subset_sum_match<F: Fn(f64) -> bool>(items: &[f64], within: &F) -> Option<f64> {
        fn search<F: Fn(f64) -> bool>(
            items: &[f64],
            start: usize,
            remaining: usize,
            acc: f64,
            within: &F,
        ) -> Option<f64> {
            if remaining == 0 {
                return within(acc).then_some(acc);
            }
            for index in start..items.len() {
                if let Some(hit) = search(items, index + 1, remaining - 1, acc + items[index], within)
                {
                    return Some(hit);
                }
            }
            None
        }

        for size in 1..=MAX_SUBSET_SIZE.min(items.len()) {
            if let Some(hit) = search(items, 0, size, 0.0, within) {
                return Some(hit);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DefaultImageDecoder;
    use crate::error::ScoringResult;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    struct FixedExtractor {
        text: String,
        boxes: Vec<TextBox>,
    }

    impl TextBoxExtractor for FixedExtractor {
        fn extract_boxes(&self, _: &[u8]) -> ScoringResult<(String, Vec<TextBox>)> {
            Ok((self.text.clone(), self.boxes.clone()))
        }
    }

    fn text_box(text: &str, left: i64, top: i64, height: i64) -> TextBox {
        TextBox {
            text: text.to_string(),
            left,
            top,
            width: 40,
            height,
            conf: 0.9,
        }
    }

    fn boxes_from_words(words: &[&str]) -> Vec<TextBox> {
        words
            .iter()
            .enumerate()
            .map(|(i, word)| text_box(word, (i as i64) * 50, 0, 12))
            .collect()
    }

    fn analyzer(extractor: Option<Arc<dyn TextBoxExtractor>>) -> ForensicAnalyzer {
        ForensicAnalyzer::new(
            Arc::new(MediaLoader::default()),
            Some(Arc::new(DefaultImageDecoder)),
            extractor,
            ForensicConfig::default(),
        )
    }

    fn document(payload: &[u8]) -> EvidenceDocument {
        EvidenceDocument {
            id: "doc-1".to_string(),
            url: None,
            file_path: None,
            base64_data: Some(BASE64.encode(payload)),
            mime_type: None,
            declared_asset_type: None,
            document_type: None,
            timestamp: None,
        }
    }

    fn sharp_invoice_png() -> Vec<u8> {
        use image::{DynamicImage, GrayImage, Luma};
        let gray = GrayImage::from_fn(256, 256, |x, y| {
            if (x / 3 + y / 3) % 2 == 0 {
                Luma([40])
            } else {
                Luma([220])
            }
        });
        let mut buffer = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(gray)
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_missing_sections_raise_score() {
        let words = ["Some", "random", "receipt", "text"];
        let extractor = FixedExtractor {
            text: words.join(" "),
            boxes: boxes_from_words(&words),
        };
        let service = analyzer(Some(Arc::new(extractor)));

        let result = &service.analyze_documents(&[document(&sharp_invoice_png())])[0];

        // All seven section keywords are absent
        assert!(result
            .reasons
            .iter()
            .any(|reason| reason.starts_with("Missing sections")));
        assert!(result.forensic_score > 0.0);
    }

    #[test]
    fn test_complete_invoice_text_is_genuine() {
        let words = [
            "Merchant:", "Kisan", "World", "Invoice", "No", "INV-1", "Date", "05/01/2025",
            "Subtotal", "450000", "Tax", "GST", "50000", "Total", "500000",
        ];
        let extractor = FixedExtractor {
            text: words.join(" "),
            boxes: words
                .iter()
                .enumerate()
                .map(|(i, word)| text_box(word, ((i % 5) as i64) * 50, ((i / 5) as i64) * 40, 12))
                .collect(),
        };
        let service = analyzer(Some(Arc::new(extractor)));

        let result = &service.analyze_documents(&[document(&sharp_invoice_png())])[0];

        assert_eq!(result.label, ForensicLabel::Genuine);
        // 450000 + 50000 equals the printed total exactly
        assert!(result.details.arithmetic.found_total_match);
    }

    #[test]
    fn test_arithmetic_mismatch_detected() {
        let words = [
            "merchant", "invoice", "date", "total", "subtotal", "tax", "gst", "100", "250",
            "300", "999",
        ];
        let extractor = FixedExtractor {
            text: words.join(" "),
            boxes: boxes_from_words(&words),
        };
        let service = analyzer(Some(Arc::new(extractor)));

        let result = &service.analyze_documents(&[document(&sharp_invoice_png())])[0];

        assert!(!result.details.arithmetic.found_total_match);
        assert!(result
            .reasons
            .iter()
            .any(|reason| reason.starts_with("Arithmetic mismatch")));
    }

    #[test]
    fn test_subset_sum_accepts_partial_items() {
        // 100 + 250 + 649 = 999; extra noise amounts do not break the match
        let findings =
            ForensicAnalyzer::check_arithmetic("merchant 100 55 250 649 total 999", 0.03);
        assert!(findings.found_total_match);
    }

    #[test]
    fn test_missing_extractor_degrades_formatting_signals() {
        let service = analyzer(None);
        let result = &service.analyze_documents(&[document(&sharp_invoice_png())])[0];

        // Empty boxes force font variation to 1.0, which exceeds the cutoff,
        // but two missing sections stay under the minimum of three
        assert!(result
            .reasons
            .iter()
            .any(|reason| reason.starts_with("High font size variance")));
        assert!(!result
            .reasons
            .iter()
            .any(|reason| reason.starts_with("Missing sections")));
        assert_eq!(result.label, ForensicLabel::Genuine);
    }

    #[test]
    fn test_load_failure_yields_neutral_result() {
        let service = analyzer(None);
        let mut doc = document(b"x");
        doc.base64_data = None;

        let result = &service.analyze_documents(&[doc])[0];
        assert_eq!(result.forensic_score, 0.0);
        assert!(result.details.error.is_some());
    }

    #[test]
    fn test_printed_date_normalization() {
        assert_eq!(
            ForensicAnalyzer::normalize_printed_date("05/01/2025").as_deref(),
            Some("2025-01-05")
        );
        assert_eq!(
            ForensicAnalyzer::normalize_printed_date("2025-01-05").as_deref(),
            Some("2025-01-05")
        );
        assert_eq!(ForensicAnalyzer::normalize_printed_date("January 5, 2025"), None);
    }

    #[test]
    fn test_exif_date_part() {
        assert_eq!(
            ForensicAnalyzer::exif_date_part("2025:01:05 10:30:00").as_deref(),
            Some("2025-01-05")
        );
        assert_eq!(
            ForensicAnalyzer::exif_date_part("2025-01-05 10:30:00").as_deref(),
            Some("2025-01-05")
        );
    }
}
