// =====================================================================================
// File: core-scoring/src/ocr.rs
// Description: Document OCR extraction, invoice field parsing, and cross-checks
//              against declared metadata
// =====================================================================================

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::capabilities::OcrProvider;
use crate::config::OcrConfig;
use crate::media::{MediaLoader, MediaSource};
use crate::types::{CrosscheckOutcome, EvidenceDocument, OcrResult, ParsedInvoiceFields};

static VENDOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Vendor\s*:?\s*(.+)").unwrap());
static CURRENCY_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:INR|Rs\.?|₹)\s*([0-9,]+\.?[0-9]*)").unwrap());
static TOTAL_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Total\s*:?\s*([0-9,]+\.?[0-9]*)").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}").unwrap());

/// Handles OCR extraction and business-field cross-checking
pub struct OcrProcessor {
    loader: Arc<MediaLoader>,
    provider: Option<Arc<dyn OcrProvider>>,
    config: OcrConfig,
}

impl OcrProcessor {
    pub fn new(
        loader: Arc<MediaLoader>,
        provider: Option<Arc<dyn OcrProvider>>,
        config: OcrConfig,
    ) -> Self {
        Self {
            loader,
            provider,
            config,
        }
    }

    pub fn process_documents(
        &self,
        documents: &[EvidenceDocument],
        declared_vendor: Option<&str>,
        declared_amount: Option<f64>,
        declared_date: Option<NaiveDateTime>,
    ) -> Vec<OcrResult> {
        documents
            .iter()
            .map(|doc| match self.loader.load_bytes(doc) {
                Ok(payload) => self.process_single(
                    &doc.id,
                    &payload,
                    declared_vendor,
                    declared_amount,
                    declared_date,
                ),
                Err(err) => OcrResult {
                    doc_id: doc.id.clone(),
                    raw_text: String::new(),
                    ocr_confidence: 0.0,
                    parsed_fields: ParsedInvoiceFields::default(),
                    crosscheck_results: CrosscheckOutcome {
                        error: Some(err.to_string()),
                        ..CrosscheckOutcome::default()
                    },
                    penalties: HashMap::from([(
                        "load_failure".to_string(),
                        self.config.amount_penalty,
                    )]),
                    match_score: 0.0,
                },
            })
            .collect()
    }

    fn process_single(
        &self,
        doc_id: &str,
        payload: &[u8],
        declared_vendor: Option<&str>,
        declared_amount: Option<f64>,
        declared_date: Option<NaiveDateTime>,
    ) -> OcrResult {
        let (text, confidence) = match &self.provider {
            Some(provider) => match provider.extract_text(payload) {
                Ok((text, confidence)) if !text.is_empty() => (text, confidence),
                Ok(_) => (String::new(), 0.5),
                Err(err) => {
                    warn!(doc_id, %err, "OCR provider failed, degrading to empty text");
                    (String::new(), 0.5)
                }
            },
            None => (String::new(), 0.5),
        };

        let parsed_fields = Self::parse_fields(&text);
        let (penalties, crosscheck_results) = self.crosscheck(
            &parsed_fields,
            declared_vendor,
            declared_amount,
            declared_date,
            confidence,
        );

        let max_penalty = self.config.max_penalty();
        let match_score = if max_penalty > 0.0 {
            (1.0 - penalties.values().sum::<f64>() / max_penalty).max(0.0)
        } else {
            1.0
        };

        OcrResult {
            doc_id: doc_id.to_string(),
            raw_text: text,
            ocr_confidence: round3(confidence),
            parsed_fields,
            crosscheck_results,
            penalties,
            match_score: round3(match_score),
        }
    }

    fn parse_fields(text: &str) -> ParsedInvoiceFields {
        ParsedInvoiceFields {
            vendor: Self::extract_vendor(text),
            amount: Self::extract_amount(text),
            date: DATE_RE.find(text).map(|m| m.as_str().to_string()),
        }
    }

    fn extract_vendor(text: &str) -> Option<String> {
        VENDOR_RE
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
    }

    fn extract_amount(text: &str) -> Option<f64> {
        let captured = CURRENCY_AMOUNT_RE
            .captures(text)
            .or_else(|| TOTAL_AMOUNT_RE.captures(text))?;
        captured[1].replace(',', "").parse::<f64>().ok()
    }

    pub(crate) fn crosscheck(
        &self,
        parsed: &ParsedInvoiceFields,
        declared_vendor: Option<&str>,
        declared_amount: Option<f64>,
        declared_date: Option<NaiveDateTime>,
        confidence: f64,
    ) -> (HashMap<String, f64>, CrosscheckOutcome) {
        let mut penalties: HashMap<String, f64> = HashMap::new();

        let mut vendor_match = false;
        if let (Some(parsed_vendor), Some(declared)) = (&parsed.vendor, declared_vendor) {
            vendor_match = parsed_vendor
                .to_lowercase()
                .contains(&declared.to_lowercase());
        }
        if declared_vendor.is_some() && !vendor_match {
            penalties.insert("vendor_mismatch".to_string(), self.config.vendor_penalty);
        }

        let mut amount_match = false;
        if let (Some(parsed_amount), Some(declared)) = (parsed.amount, declared_amount) {
            if declared != 0.0 {
                let diff = (parsed_amount - declared).abs();
                amount_match = diff <= self.config.amount_tolerance_pct * declared;
            }
        }
        if declared_amount.is_some() && !amount_match {
            penalties.insert("amount_mismatch".to_string(), self.config.amount_penalty);
        }

        // A missing date on either side leaves the check satisfied
        let mut date_match = true;
        let parsed_date = Self::normalize_date(parsed.date.as_deref());
        if let (Some(declared), Some(parsed_date)) = (declared_date, parsed_date) {
            let delta_days = (parsed_date - declared).num_days().abs();
            date_match = delta_days <= self.config.date_tolerance_days;
        }
        if declared_date.is_some() && !date_match {
            penalties.insert("date_mismatch".to_string(), self.config.date_penalty);
        }

        if confidence < self.config.provider_confidence_threshold {
            penalties.insert(
                "low_confidence".to_string(),
                self.config.low_confidence_penalty,
            );
        }

        let crosscheck = CrosscheckOutcome {
            vendor_match,
            amount_match,
            date_match,
            declared_vendor: declared_vendor.map(str::to_string),
            declared_amount,
            declared_date: declared_date.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            error: None,
        };

        (penalties, crosscheck)
    }

    fn normalize_date(value: Option<&str>) -> Option<NaiveDateTime> {
        let value = value?;
        for format in ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return date.and_hms_opt(0, 0, 0);
            }
        }
        None
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
