// =====================================================================================
// File: core-scoring/src/verification.rs
// Description: Verification port: invoice lookup against the GST registry and
//              sanctioned-asset lookup against the bank core system
// =====================================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// GSTIN structure: 2-digit state code, 5 letters, 4 digits, letter, entity
/// char, literal Z, check char
static GSTIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").unwrap());

/// Outcome of a GSTIN structure validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GstinStructure {
    pub valid: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Invoice record held by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredInvoice {
    pub vendor: String,
    pub amount: f64,
    pub date: String,
    #[serde(default)]
    pub gstin: Option<String>,
}

/// Invoice lookup outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceVerification {
    pub verified: bool,
    pub reason: String,
    #[serde(default)]
    pub registered_data: Option<RegisteredInvoice>,
    #[serde(default)]
    pub structure_check: Option<GstinStructure>,
}

/// A sanctioned loan record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionRecord {
    pub allowed_asset: String,
    #[serde(default)]
    pub sanctioned_amount: Option<f64>,
}

/// Sanctioned-asset lookup outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionVerification {
    #[serde(rename = "match")]
    pub matched: bool,
    pub reason: String,
    #[serde(default)]
    pub sanction_details: Option<SanctionRecord>,
}

/// Combined verification summary attached to the score response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub gst_verified: bool,
    pub gst_details: InvoiceVerification,
    pub bank_match: bool,
    pub bank_details: SanctionVerification,
}

/// External verification port. Implementations never error into the pipeline;
/// failures are reported as unverified results with a reason.
pub trait VerificationClient: Send + Sync {
    fn verify_invoice(
        &self,
        invoice_number: Option<&str>,
        gstin: Option<&str>,
    ) -> InvoiceVerification;

    fn verify_sanction(&self, applicant_id: &str, declared_asset: Option<&str>)
        -> SanctionVerification;
}

/// In-memory registry implementation of the verification port. Carries its own
/// invoice and sanction tables; useful for development and tests, and as the
/// reference semantics for a gateway-backed client.
pub struct RegistryVerificationClient {
    invoices: HashMap<String, RegisteredInvoice>,
    sanctions: HashMap<String, SanctionRecord>,
    state_codes: HashMap<&'static str, &'static str>,
}

impl RegistryVerificationClient {
    pub fn new(
        invoices: HashMap<String, RegisteredInvoice>,
        sanctions: HashMap<String, SanctionRecord>,
    ) -> Self {
        Self {
            invoices,
            sanctions,
            state_codes: Self::state_codes(),
        }
    }

    /// A small seeded registry for local development
    pub fn with_seed_registry() -> Self {
        let invoice = |vendor: &str, amount: f64, date: &str, gstin: Option<&str>| {
            RegisteredInvoice {
                vendor: vendor.to_string(),
                amount,
                date: date.to_string(),
                gstin: gstin.map(str::to_string),
            }
        };
        let invoices = HashMap::from([
            (
                "INV-2025-001".to_string(),
                invoice("Jaipur Gems", 872660.59, "2025-04-26", Some("33VNUIM2761E1ZX")),
            ),
            (
                "INV-2025-002".to_string(),
                invoice("Warangal Rice", 308783.01, "2025-03-24", Some("37WLZNU4271Q1ZQ")),
            ),
            (
                "INV-2025-003".to_string(),
                invoice("Chennai Electronics", 150682.66, "2025-03-27", Some("29BFBRJ8715S1ZE")),
            ),
            (
                "INV-2025-008".to_string(),
                invoice("Trichy Engineering", 845050.60, "2025-02-03", Some("36MJUSO4964W1ZA")),
            ),
            (
                "INV-2025-015".to_string(),
                invoice("Indore Cotton", 561786.90, "2025-03-07", Some("07GVMGI8717H1Z0")),
            ),
            // Unregistered vendor: invoice on file but no GSTIN
            (
                "INV-2025-021".to_string(),
                invoice("Village Traders", 98000.0, "2025-01-12", None),
            ),
        ]);
        let sanctions = HashMap::from([
            (
                "APP-1001".to_string(),
                SanctionRecord {
                    allowed_asset: "tractor".to_string(),
                    sanctioned_amount: Some(550000.0),
                },
            ),
            (
                "APP-1002".to_string(),
                SanctionRecord {
                    allowed_asset: "dairy equipment".to_string(),
                    sanctioned_amount: Some(300000.0),
                },
            ),
            (
                "APP-1003".to_string(),
                SanctionRecord {
                    allowed_asset: "harvester".to_string(),
                    sanctioned_amount: Some(900000.0),
                },
            ),
        ]);
        Self::new(invoices, sanctions)
    }

    fn state_codes() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("36", "Telangana"),
            ("37", "Andhra Pradesh"),
            ("29", "Karnataka"),
            ("27", "Maharashtra"),
            ("33", "Tamil Nadu"),
            ("07", "Delhi"),
            ("09", "Uttar Pradesh"),
            ("19", "West Bengal"),
            ("32", "Kerala"),
            ("08", "Rajasthan"),
            ("24", "Gujarat"),
            ("03", "Punjab"),
            ("06", "Haryana"),
        ])
    }

    /// Length, regex, and state-code validation for a GSTIN
    pub fn validate_gstin_structure(&self, gstin: &str) -> GstinStructure {
        if gstin.len() != 15 {
            return GstinStructure {
                valid: false,
                state: None,
                error: Some("Invalid Length (Must be 15 chars)".to_string()),
            };
        }
        if !GSTIN_RE.is_match(gstin) {
            return GstinStructure {
                valid: false,
                state: None,
                error: Some("Invalid Format (Regex mismatch)".to_string()),
            };
        }
        let state_code = &gstin[..2];
        match self.state_codes.get(state_code) {
            Some(state) => GstinStructure {
                valid: true,
                state: Some(state.to_string()),
                error: None,
            },
            None => GstinStructure {
                valid: false,
                state: None,
                error: Some(format!("Invalid State Code '{state_code}'")),
            },
        }
    }
}

impl VerificationClient for RegistryVerificationClient {
    fn verify_invoice(
        &self,
        invoice_number: Option<&str>,
        gstin: Option<&str>,
    ) -> InvoiceVerification {
        let mut structure_check = None;
        if let Some(gstin) = gstin {
            let check = self.validate_gstin_structure(gstin);
            if !check.valid {
                let error = check.error.clone().unwrap_or_default();
                return InvoiceVerification {
                    verified: false,
                    reason: format!("Invalid GSTIN: {error}"),
                    registered_data: None,
                    structure_check: Some(check),
                };
            }
            structure_check = Some(check);
        }

        let Some(invoice_number) = invoice_number else {
            return InvoiceVerification {
                verified: false,
                reason: "No Invoice Number extracted".to_string(),
                registered_data: None,
                structure_check,
            };
        };

        let key = invoice_number.trim().to_uppercase();
        let Some(record) = self.invoices.get(&key) else {
            return InvoiceVerification {
                verified: false,
                reason: format!("Invoice {key} NOT found in GST registry"),
                registered_data: None,
                structure_check,
            };
        };

        let Some(registered_gstin) = &record.gstin else {
            return InvoiceVerification {
                verified: false,
                reason: "Invoice found, but vendor is NOT GST registered (no GSTIN)".to_string(),
                registered_data: Some(record.clone()),
                structure_check,
            };
        };

        if let Some(declared) = gstin {
            if declared != registered_gstin {
                return InvoiceVerification {
                    verified: false,
                    reason: format!("Invoice found but GSTIN mismatch! Expected {registered_gstin}"),
                    registered_data: Some(record.clone()),
                    structure_check,
                };
            }
        }

        InvoiceVerification {
            verified: true,
            reason: "Matched with GSTN records".to_string(),
            registered_data: Some(record.clone()),
            structure_check,
        }
    }

    fn verify_sanction(
        &self,
        applicant_id: &str,
        declared_asset: Option<&str>,
    ) -> SanctionVerification {
        let Some(record) = self.sanctions.get(applicant_id) else {
            return SanctionVerification {
                matched: false,
                reason: "Applicant has no active loan sanctions".to_string(),
                sanction_details: None,
            };
        };

        let expected = record.allowed_asset.to_lowercase();
        let actual = declared_asset.unwrap_or_default().to_lowercase();

        // Plain containment either way; an absent declared asset is contained
        // in every sanctioned asset and therefore matches
        if actual.contains(&expected) || expected.contains(&actual) {
            SanctionVerification {
                matched: true,
                reason: "Matches sanction advice".to_string(),
                sanction_details: Some(record.clone()),
            }
        } else {
            SanctionVerification {
                matched: false,
                reason: format!(
                    "Sanction deviation: approved for '{expected}', but bought '{actual}'"
                ),
                sanction_details: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RegistryVerificationClient {
        RegistryVerificationClient::with_seed_registry()
    }

    #[test]
    fn test_gstin_structure_validation() {
        let service = client();

        let valid = service.validate_gstin_structure("36MJUSO4964W1ZA");
        assert!(valid.valid, "{:?}", valid.error);
        assert_eq!(valid.state.as_deref(), Some("Telangana"));

        assert!(!service.validate_gstin_structure("too-short").valid);
        assert!(!service.validate_gstin_structure("99MJUSO4964W1ZA").valid);
        assert!(!service.validate_gstin_structure("36mjuso4964w1za").valid);
    }

    #[test]
    fn test_known_invoice_verifies() {
        let result = client().verify_invoice(Some("inv-2025-001"), None);
        assert!(result.verified);
        assert_eq!(result.registered_data.unwrap().vendor, "Jaipur Gems");
    }

    #[test]
    fn test_unknown_invoice_rejected() {
        let result = client().verify_invoice(Some("INV-9999-999"), None);
        assert!(!result.verified);
        assert!(result.reason.contains("NOT found"));
    }

    #[test]
    fn test_missing_invoice_number_rejected() {
        let result = client().verify_invoice(None, None);
        assert!(!result.verified);
        assert_eq!(result.reason, "No Invoice Number extracted");
    }

    #[test]
    fn test_unregistered_vendor_flagged() {
        let result = client().verify_invoice(Some("INV-2025-021"), None);
        assert!(!result.verified);
        assert!(result.reason.contains("NOT GST registered"));
        assert!(result.registered_data.is_some());
    }

    #[test]
    fn test_gstin_mismatch_rejected() {
        let result = client().verify_invoice(Some("INV-2025-001"), Some("36MJUSO4964W1ZA"));
        assert!(!result.verified);
        assert!(result.reason.contains("GSTIN mismatch"));
    }

    #[test]
    fn test_invalid_gstin_short_circuits() {
        let result = client().verify_invoice(Some("INV-2025-001"), Some("bogus"));
        assert!(!result.verified);
        assert!(result.reason.starts_with("Invalid GSTIN"));
        assert!(!result.structure_check.unwrap().valid);
    }

    #[test]
    fn test_sanction_containment_matches() {
        let service = client();

        let exact = service.verify_sanction("APP-1001", Some("tractor"));
        assert!(exact.matched);

        // Containment works in both directions
        let qualified = service.verify_sanction("APP-1001", Some("Mahindra Tractor"));
        assert!(qualified.matched);
    }

    #[test]
    fn test_missing_declared_asset_matches_sanction() {
        let result = client().verify_sanction("APP-1001", None);
        assert!(result.matched);
        assert!(result.sanction_details.is_some());
    }

    #[test]
    fn test_sanction_deviation_rejected() {
        let result = client().verify_sanction("APP-1001", Some("sports car"));
        assert!(!result.matched);
        assert!(result.reason.contains("Sanction deviation"));
    }

    #[test]
    fn test_unknown_applicant_has_no_sanctions() {
        let result = client().verify_sanction("APP-0000", Some("tractor"));
        assert!(!result.matched);
        assert!(result.reason.contains("no active loan sanctions"));
    }
}
