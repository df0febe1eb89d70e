//! Pure matching decision for an ingested item: subscriptions first, then
//! rule predicates, all independent of the store.

use acquira_core::{DownloadRule, RuleAction, Subscription};
use acquira_match::{Fingerprint, MatchCriteria, MatchDecision, first_matching_rule};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of evaluating an item against subscriptions and rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDecision {
    /// Create a pipeline run and acquire the release.
    Download {
        /// Subscription the item matched.
        subscription_id: Uuid,
    },
    /// Emit a notification event only.
    Notify {
        /// Subscription the item matched.
        subscription_id: Uuid,
        /// Rule that selected the notify action.
        rule_id: Uuid,
    },
    /// Drop the item despite the subscription match.
    Skip {
        /// Subscription the item matched.
        subscription_id: Uuid,
        /// Rule that selected the skip action.
        rule_id: Uuid,
    },
    /// No subscription matched, or criteria failed.
    Rejected {
        /// Reason recorded on the feed item.
        reason: String,
    },
}

/// Evaluate a fingerprinted item against the account's subscriptions and
/// rules.
///
/// Subscriptions are tried in order; the first whose criteria pass wins.
/// The matched account's rules then choose the action, defaulting to
/// auto-download when no rule matches.
#[must_use]
pub fn decide(
    fingerprint: &Fingerprint,
    sample: &Value,
    subscriptions: &[Subscription],
    rules: &[DownloadRule],
    threshold: f64,
) -> ItemDecision {
    if subscriptions.iter().all(|sub| !sub.enabled) {
        return ItemDecision::Rejected {
            reason: "no enabled subscriptions".to_string(),
        };
    }

    let mut last_reason = String::new();
    for subscription in subscriptions.iter().filter(|sub| sub.enabled) {
        let criteria = MatchCriteria::from_subscription(subscription);
        match criteria.evaluate(fingerprint, threshold) {
            MatchDecision::Matched { .. } => {
                let account_rules: Vec<DownloadRule> = rules
                    .iter()
                    .filter(|rule| rule.account_id == subscription.account_id)
                    .cloned()
                    .collect();
                return match first_matching_rule(&account_rules, sample) {
                    Some(rule) => match rule.action {
                        RuleAction::AutoDownload => ItemDecision::Download {
                            subscription_id: subscription.id,
                        },
                        RuleAction::Notify => ItemDecision::Notify {
                            subscription_id: subscription.id,
                            rule_id: rule.id,
                        },
                        RuleAction::Skip => ItemDecision::Skip {
                            subscription_id: subscription.id,
                            rule_id: rule.id,
                        },
                    },
                    None => ItemDecision::Download {
                        subscription_id: subscription.id,
                    },
                };
            }
            MatchDecision::Rejected { reason } => last_reason = reason,
        }
    }

    ItemDecision::Rejected {
        reason: if last_reason.is_empty() {
            "no enabled subscriptions".to_string()
        } else {
            last_reason
        },
    }
}
