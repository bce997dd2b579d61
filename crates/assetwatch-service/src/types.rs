//! Domain and wire types shared between the caching layer, the upstream
//! client, and the HTTP surface.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::caching::{CacheEntry, CacheError};

/// Identifier of a tracked asset (a device in the inventory).
pub type AssetId = u32;

/// Identifier of a single component installed on an asset.
pub type ComponentId = u32;

/// The cached value for one asset: its full component listing.
///
/// Lists are shared via `Arc` so cache reads are cheap and mutation rewrites
/// go through `Arc::make_mut`, leaving concurrent readers on the old list.
pub type ComponentsList = Arc<Vec<AssetComponent>>;

/// The kind of inventory unit a component represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentType {
    OperatingSystem,
    Software,
    Hardware,
    Firmware,
}

/// A single installed software/hardware/firmware/OS unit on a tracked asset.
///
/// The `matching_*` fields are transient state of the matching workflow. They
/// exist only in the cached view; the upstream does not necessarily persist
/// them, which is why they are all defaulted during deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetComponent {
    pub component_id: ComponentId,
    pub asset_id: AssetId,
    pub component_type: ComponentType,
    pub vendor: Option<String>,
    pub product: String,
    pub version: Option<String>,
    /// `None` means the component has not been matched to a CPE yet.
    pub cpe_full_string: Option<String>,
    #[serde(default)]
    pub matching_in_progress: bool,
    #[serde(default)]
    pub matching_method: Option<MatchMethod>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tracked asset as returned by the upstream device list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub asset_id: AssetId,
    pub hostname: String,
    pub ip_address: String,
    pub asset_type: String,
    pub owner_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One card of the dashboard statistics panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatCard {
    pub label: String,
    pub value: String,
    pub description: String,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// How a component's CPE string was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Automatic,
    AiAssisted,
    Existing,
    Manual,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Automatic => "automatic",
            MatchMethod::AiAssisted => "ai_assisted",
            MatchMethod::Existing => "existing",
            MatchMethod::Manual => "manual",
        }
    }
}

/// A ranked CPE suggestion for a component the matcher could not confidently
/// resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpeCandidate {
    pub cpe_name: String,
    pub title: Option<String>,
    pub vendor: Option<String>,
    pub version: Option<String>,
    /// Match quality in `0.0..=1.0`.
    pub match_score: f64,
}

/// Raw response of the upstream `/cpe/match` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MatchMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpe_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub needs_manual_review: bool,
    #[serde(default)]
    pub candidates: Vec<CpeCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MatchResponse {
    /// Interprets the wire response as a [`MatchOutcome`].
    ///
    /// Candidates are re-sorted descending by score; the upstream already
    /// orders them, but sorting here makes the output deterministic.
    pub fn into_outcome(self) -> CacheEntry<MatchOutcome> {
        if self.success {
            let method = self
                .method
                .ok_or_else(|| CacheError::Malformed("match response without method".into()))?;
            let cpe_string = self.cpe_string.ok_or_else(|| {
                CacheError::Malformed("successful match response without cpe_string".into())
            })?;
            return Ok(MatchOutcome::Resolved {
                method,
                cpe_string,
                confidence_score: self.confidence_score,
            });
        }

        if self.needs_manual_review && !self.candidates.is_empty() {
            let mut candidates = self.candidates;
            candidates.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
            return Ok(MatchOutcome::NeedsReview {
                candidates,
                message: self.message,
            });
        }

        Ok(MatchOutcome::Unmatched {
            message: self.message,
        })
    }
}

/// The result of one run of the matching workflow.
///
/// `NeedsReview` is a successful outcome that requires human follow-up; it is
/// deliberately not an error so callers can tell it apart from actual
/// matching failures.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The upstream resolved the component to a CPE without human help.
    Resolved {
        method: MatchMethod,
        cpe_string: String,
        confidence_score: Option<f64>,
    },
    /// No confident match; a human has to pick one of the ranked candidates.
    NeedsReview {
        candidates: Vec<CpeCandidate>,
        message: Option<String>,
    },
    /// Matching ran but produced neither a CPE nor candidates.
    Unmatched { message: Option<String> },
}

impl MatchOutcome {
    /// Short tag for metrics and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            MatchOutcome::Resolved { .. } => "resolved",
            MatchOutcome::NeedsReview { .. } => "needs_review",
            MatchOutcome::Unmatched { .. } => "unmatched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_response_resolved() {
        let json = r#"{
            "success": true,
            "message": "CPE matching completed successfully",
            "component_id": 101,
            "cpe_string": "cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*",
            "method": "automatic",
            "confidence_score": 0.8
        }"#;
        let response: MatchResponse = serde_json::from_str(json).unwrap();
        let outcome = response.into_outcome().unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Resolved {
                method: MatchMethod::Automatic,
                cpe_string: "cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*".into(),
                confidence_score: Some(0.8),
            }
        );
    }

    #[test]
    fn test_match_response_needs_review_sorts_candidates() {
        let json = r#"{
            "success": false,
            "needs_manual_review": true,
            "candidates": [
                {"cpe_name": "cpe:2.3:a:x:y:1", "match_score": 0.4},
                {"cpe_name": "cpe:2.3:a:x:y:2", "match_score": 0.9}
            ]
        }"#;
        let response: MatchResponse = serde_json::from_str(json).unwrap();
        match response.into_outcome().unwrap() {
            MatchOutcome::NeedsReview { candidates, .. } => {
                assert_eq!(candidates[0].cpe_name, "cpe:2.3:a:x:y:2");
                assert_eq!(candidates[1].cpe_name, "cpe:2.3:a:x:y:1");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_match_response_missing_cpe_is_malformed() {
        let response = MatchResponse {
            success: true,
            method: Some(MatchMethod::Automatic),
            cpe_string: None,
            confidence_score: None,
            needs_manual_review: false,
            candidates: vec![],
            message: None,
        };
        assert!(matches!(
            response.into_outcome(),
            Err(CacheError::Malformed(_))
        ));
    }

    #[test]
    fn test_match_method_wire_format() {
        assert_eq!(
            serde_json::to_string(&MatchMethod::AiAssisted).unwrap(),
            r#""ai_assisted""#
        );
    }
}
