//! Subscription criteria evaluated against release fingerprints.

use acquira_core::Subscription;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{Fingerprint, normalize_title};
use crate::similarity::similarity;

/// Criteria a fingerprint must satisfy to match wanted content.
///
/// All present criteria must pass; absent criteria are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MatchCriteria {
    /// Desired content title; fuzzy-matched after normalization.
    pub title: String,
    /// Exact release year required, when set.
    pub year: Option<i32>,
    /// Qualities of which at least one must be present, when non-empty.
    pub qualities: Vec<String>,
}

impl MatchCriteria {
    /// Build criteria from a subscription row.
    #[must_use]
    pub fn from_subscription(subscription: &Subscription) -> Self {
        Self {
            title: subscription.content_name.clone(),
            year: subscription.year,
            qualities: subscription.qualities.clone(),
        }
    }

    /// Evaluate the criteria against a fingerprint.
    #[must_use]
    pub fn evaluate(&self, fingerprint: &Fingerprint, threshold: f64) -> MatchDecision {
        let wanted = normalize_title(&self.title);
        let score = similarity(&wanted, &fingerprint.title);
        if score < threshold {
            return MatchDecision::Rejected {
                reason: format!(
                    "title similarity {score:.2} below threshold {threshold:.2} for '{wanted}'"
                ),
            };
        }

        if let Some(wanted_year) = self.year
            && fingerprint.year != Some(wanted_year)
        {
            return MatchDecision::Rejected {
                reason: format!(
                    "year mismatch: wanted {wanted_year}, release has {}",
                    fingerprint
                        .year
                        .map_or_else(|| "none".to_string(), |year| year.to_string())
                ),
            };
        }

        if !self.qualities.is_empty()
            && !self
                .qualities
                .iter()
                .any(|quality| fingerprint.has_quality(quality))
        {
            return MatchDecision::Rejected {
                reason: format!("no requested quality present (wanted {:?})", self.qualities),
            };
        }

        MatchDecision::Matched { similarity: score }
    }
}

/// Outcome of evaluating criteria against a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// Every present criterion passed.
    Matched {
        /// Title similarity score that cleared the threshold.
        similarity: f64,
    },
    /// At least one criterion failed.
    Rejected {
        /// Human-readable reason recorded on the feed item.
        reason: String,
    },
}

impl MatchDecision {
    /// Whether the decision is a match.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}
