// =====================================================================================
// File: core-scoring/src/duplicates.rs
// Description: Cross-case duplicate detection via perceptual hashing against the
//              applicant's recorded history
// =====================================================================================

use std::sync::Arc;
use tracing::debug;

use crate::capabilities::PerceptualHasher;
use crate::config::DuplicateConfig;
use crate::error::ScoringResult;
use crate::imaging;
use crate::media::{MediaLoader, MediaSource};
use crate::state::StateStore;
use crate::types::DuplicateResult;

/// Detects duplicate media by Hamming distance over 64-bit perceptual hashes
pub struct DuplicateDetector {
    loader: Arc<MediaLoader>,
    hasher: Option<Arc<dyn PerceptualHasher>>,
    state: Arc<StateStore>,
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(
        loader: Arc<MediaLoader>,
        hasher: Option<Arc<dyn PerceptualHasher>>,
        state: Arc<StateStore>,
        config: DuplicateConfig,
    ) -> Self {
        Self {
            loader,
            hasher,
            state,
            config,
        }
    }

    pub fn evaluate<S: MediaSource>(
        &self,
        items: &[S],
        applicant_id: &str,
        case_id: &str,
    ) -> ScoringResult<Vec<DuplicateResult>> {
        items
            .iter()
            .map(|item| self.evaluate_single(item, applicant_id, case_id))
            .collect()
    }

    fn evaluate_single<S: MediaSource>(
        &self,
        item: &S,
        applicant_id: &str,
        case_id: &str,
    ) -> ScoringResult<DuplicateResult> {
        let evidence_id = item.media_id();

        let Some(hasher) = &self.hasher else {
            return Ok(Self::degraded(evidence_id, "perceptual hasher unavailable"));
        };

        let hash = match self
            .loader
            .load_bytes(item)
            .and_then(|payload| hasher.hash_hex(evidence_id, &payload))
        {
            Ok(hash) => hash,
            Err(err) => return Ok(Self::degraded(evidence_id, &err.to_string())),
        };

        let prior = self.state.list_hashes(applicant_id);
        // Sorted for a deterministic winner when two priors tie on distance
        let mut records: Vec<_> = prior.into_iter().collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));

        let mut duplicate_found = false;
        let mut min_distance = 64u32;
        let mut closest_case: Option<String> = None;
        for (_, record) in &records {
            let distance = imaging::hamming_distance_hex(&hash, &record.hash);
            if distance <= self.config.hash_distance_threshold && distance < min_distance {
                duplicate_found = true;
                min_distance = distance;
                closest_case = Some(record.case_id.clone());
            }
        }

        // Record after comparing, so a same-case resubmission is not matched
        // against itself but remains visible to later cases
        self.state
            .record_hash(applicant_id, evidence_id, &hash, case_id)?;

        debug!(evidence_id, duplicate_found, min_distance, "Duplicate check done");

        Ok(DuplicateResult {
            evidence_id: evidence_id.to_string(),
            duplicate_found,
            hash_distance: if duplicate_found { min_distance } else { 0 },
            reference_case_id: closest_case,
            penalty_points: if duplicate_found {
                self.config.duplicate_penalty_points
            } else {
                0.0
            },
        })
    }

    fn degraded(evidence_id: &str, reason: &str) -> DuplicateResult {
        DuplicateResult {
            evidence_id: evidence_id.to_string(),
            duplicate_found: false,
            hash_distance: 0,
            reference_case_id: Some(reason.to_string()),
            penalty_points: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DctHasher;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    fn base64_image(seed: u32) -> String {
        let gray = GrayImage::from_fn(64, 64, |x, y| Luma([((x * seed + y) % 255) as u8]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(gray)
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .unwrap();
        BASE64.encode(buffer.into_inner())
    }

    fn evidence(id: &str, payload: String) -> crate::types::EvidenceImage {
        crate::types::EvidenceImage {
            id: id.to_string(),
            url: None,
            file_path: None,
            base64_data: Some(payload),
            mime_type: None,
            declared_asset_type: None,
            timestamp: None,
        }
    }

    fn detector(dir: &tempfile::TempDir, hasher: Option<Arc<dyn PerceptualHasher>>) -> DuplicateDetector {
        DuplicateDetector::new(
            Arc::new(MediaLoader::default()),
            hasher,
            Arc::new(StateStore::open(dir.path().join("state.json"))),
            DuplicateConfig::default(),
        )
    }

    #[test]
    fn test_reused_image_flags_second_case() {
        let dir = tempfile::tempdir().unwrap();
        let service = detector(&dir, Some(Arc::new(DctHasher)));
        let payload = base64_image(7);

        let first = service
            .evaluate(&[evidence("img-a", payload.clone())], "app-1", "case-1")
            .unwrap();
        assert!(!first[0].duplicate_found);
        assert_eq!(first[0].penalty_points, 0.0);

        let second = service
            .evaluate(&[evidence("img-b", payload)], "app-1", "case-2")
            .unwrap();
        assert!(second[0].duplicate_found);
        assert_eq!(second[0].hash_distance, 0);
        assert_eq!(second[0].reference_case_id.as_deref(), Some("case-1"));
        assert_eq!(
            second[0].penalty_points,
            DuplicateConfig::default().duplicate_penalty_points
        );
    }

    #[test]
    fn test_distinct_applicants_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let service = detector(&dir, Some(Arc::new(DctHasher)));
        let payload = base64_image(7);

        service
            .evaluate(&[evidence("img-a", payload.clone())], "app-1", "case-1")
            .unwrap();
        let other = service
            .evaluate(&[evidence("img-b", payload)], "app-2", "case-2")
            .unwrap();
        assert!(!other[0].duplicate_found);
    }

    #[test]
    fn test_distance_at_threshold_counts_as_duplicate() {
        struct ScriptedHasher;
        impl PerceptualHasher for ScriptedHasher {
            fn hash_hex(&self, evidence_id: &str, _: &[u8]) -> ScoringResult<String> {
                // Second hash differs from the first in exactly five bits
                Ok(match evidence_id {
                    "img-a" => "0000000000000000".to_string(),
                    _ => "000000000000001f".to_string(),
                })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let service = detector(&dir, Some(Arc::new(ScriptedHasher)));
        let payload = base64_image(1);

        service
            .evaluate(&[evidence("img-a", payload.clone())], "app-1", "case-1")
            .unwrap();
        let second = service
            .evaluate(&[evidence("img-b", payload)], "app-1", "case-2")
            .unwrap();

        assert!(second[0].duplicate_found);
        assert_eq!(second[0].hash_distance, 5);
    }

    #[test]
    fn test_missing_hasher_degrades_and_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = detector(&dir, None);
        let payload = base64_image(3);

        let result = service
            .evaluate(&[evidence("img-a", payload)], "app-1", "case-1")
            .unwrap();
        assert!(!result[0].duplicate_found);
        assert_eq!(result[0].hash_distance, 0);

        let store = StateStore::open(dir.path().join("state.json"));
        assert!(store.list_hashes("app-1").is_empty());
    }

    #[test]
    fn test_state_file_contains_both_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let service = detector(&dir, Some(Arc::new(DctHasher)));
        let payload = base64_image(9);

        service
            .evaluate(&[evidence("img-a", payload.clone())], "app-1", "case-1")
            .unwrap();
        service
            .evaluate(&[evidence("img-b", payload)], "app-1", "case-2")
            .unwrap();

        let store = StateStore::open(dir.path().join("state.json"));
        let hashes = store.list_hashes("app-1");
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes["img-a"].hash, hashes["img-b"].hash);
    }
}
