//! Campaign attribution — hierarchical rollup of ledger records by
//! `utm_campaign`, then by `(source, medium)`, content, and term.

use leadpulse_core::types::{LeadStatus, LedgerRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket for records with no campaign, or the literal "undefined" a broken
/// tracker emits.
pub const ORGANIC_BUCKET: &str = "Organic/Direct";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: u64,
    pub paid_count: u64,
    pub paid_revenue: f64,
}

impl GroupStats {
    fn absorb(&mut self, record: &LedgerRecord) {
        self.count += 1;
        if record.status == LeadStatus::Paid {
            self.paid_count += 1;
            self.paid_revenue += record.amount;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMediumStats {
    pub source: String,
    pub medium: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedStats {
    pub value: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRollup {
    pub campaign: String,
    #[serde(flatten)]
    pub stats: GroupStats,
    pub source_media: Vec<SourceMediumStats>,
    pub contents: Vec<KeyedStats>,
    pub terms: Vec<KeyedStats>,
}

fn campaign_bucket(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("undefined") {
        ORGANIC_BUCKET.to_string()
    } else {
        trimmed.to_string()
    }
}

fn or_unknown(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sub-groups sort by paid count descending; paid revenue, then the key,
/// break ties deterministically.
fn sorted_keyed(groups: BTreeMap<String, GroupStats>) -> Vec<KeyedStats> {
    let mut out: Vec<KeyedStats> = groups
        .into_iter()
        .map(|(value, stats)| KeyedStats { value, stats })
        .collect();
    out.sort_by(|a, b| {
        b.stats
            .paid_count
            .cmp(&a.stats.paid_count)
            .then(
                b.stats
                    .paid_revenue
                    .partial_cmp(&a.stats.paid_revenue)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.value.cmp(&b.value))
    });
    out
}

/// Roll paid and unpaid records up by campaign. Campaigns order by total paid
/// revenue, descending.
pub fn attribute(records: &[LedgerRecord]) -> Vec<CampaignRollup> {
    struct Accumulator {
        stats: GroupStats,
        source_media: BTreeMap<(String, String), GroupStats>,
        contents: BTreeMap<String, GroupStats>,
        terms: BTreeMap<String, GroupStats>,
    }

    let mut campaigns: BTreeMap<String, Accumulator> = BTreeMap::new();

    for record in records {
        let acc = campaigns
            .entry(campaign_bucket(&record.utm_campaign))
            .or_insert_with(|| Accumulator {
                stats: GroupStats::default(),
                source_media: BTreeMap::new(),
                contents: BTreeMap::new(),
                terms: BTreeMap::new(),
            });

        acc.stats.absorb(record);
        acc.source_media
            .entry((or_unknown(&record.utm_source), or_unknown(&record.utm_medium)))
            .or_default()
            .absorb(record);
        if !record.utm_content.trim().is_empty() {
            acc.contents
                .entry(record.utm_content.trim().to_string())
                .or_default()
                .absorb(record);
        }
        if !record.utm_term.trim().is_empty() {
            acc.terms
                .entry(record.utm_term.trim().to_string())
                .or_default()
                .absorb(record);
        }
    }

    let mut rollups: Vec<CampaignRollup> = campaigns
        .into_iter()
        .map(|(campaign, acc)| {
            let mut source_media: Vec<SourceMediumStats> = acc
                .source_media
                .into_iter()
                .map(|((source, medium), stats)| SourceMediumStats {
                    source,
                    medium,
                    stats,
                })
                .collect();
            source_media.sort_by(|a, b| {
                b.stats
                    .paid_count
                    .cmp(&a.stats.paid_count)
                    .then(
                        b.stats
                            .paid_revenue
                            .partial_cmp(&a.stats.paid_revenue)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
                    .then(a.source.cmp(&b.source))
                    .then(a.medium.cmp(&b.medium))
            });

            CampaignRollup {
                campaign,
                stats: acc.stats,
                source_media,
                contents: sorted_keyed(acc.contents),
                terms: sorted_keyed(acc.terms),
            }
        })
        .collect();

    rollups.sort_by(|a, b| {
        b.stats
            .paid_revenue
            .partial_cmp(&a.stats.paid_revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.stats.count.cmp(&a.stats.count))
            .then(a.campaign.cmp(&b.campaign))
    });
    rollups
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpulse_core::types::PaymentMethod;

    fn record(
        status: LeadStatus,
        amount: f64,
        campaign: &str,
        source: &str,
        medium: &str,
    ) -> LedgerRecord {
        LedgerRecord {
            timestamp: Some("2024-03-01T10:00:00Z".parse().unwrap()),
            inquiry_id: "A1".to_string(),
            transaction_id: String::new(),
            status,
            payment_method: PaymentMethod::Card,
            amount,
            final_amount: amount,
            course: "PMP".to_string(),
            normalized_course: "PMP".to_string(),
            language: "fr".to_string(),
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            utm_source: source.to_string(),
            utm_medium: medium.to_string(),
            utm_campaign: campaign.to_string(),
            utm_content: String::new(),
            utm_term: String::new(),
        }
    }

    #[test]
    fn test_missing_campaigns_merge_into_organic_bucket() {
        let records = vec![
            record(LeadStatus::Pending, 0.0, "", "facebook", "cpc"),
            record(LeadStatus::Pending, 0.0, "undefined", "", ""),
            record(LeadStatus::Paid, 900.0, "spring", "google", "cpc"),
            record(LeadStatus::Paid, 100.0, "spring", "google", "cpc"),
        ];
        let rollups = attribute(&records);
        assert_eq!(rollups.len(), 2);

        let organic = rollups
            .iter()
            .find(|r| r.campaign == ORGANIC_BUCKET)
            .unwrap();
        assert_eq!(organic.stats.count, 2);
        assert_eq!(organic.stats.paid_count, 0);
    }

    #[test]
    fn test_campaigns_order_by_paid_revenue_desc() {
        let records = vec![
            record(LeadStatus::Paid, 100.0, "small", "google", "cpc"),
            record(LeadStatus::Paid, 500.0, "big", "google", "cpc"),
            record(LeadStatus::Pending, 9999.0, "small", "google", "cpc"),
        ];
        let rollups = attribute(&records);
        assert_eq!(rollups[0].campaign, "big");
        assert_eq!(rollups[1].campaign, "small");
    }

    #[test]
    fn test_source_medium_breakdown_within_campaign() {
        let records = vec![
            record(LeadStatus::Paid, 100.0, "spring", "google", "cpc"),
            record(LeadStatus::Paid, 200.0, "spring", "google", "cpc"),
            record(LeadStatus::Paid, 50.0, "spring", "facebook", "social"),
            record(LeadStatus::Pending, 0.0, "spring", "", ""),
        ];
        let rollups = attribute(&records);
        assert_eq!(rollups.len(), 1);
        let spring = &rollups[0];
        assert_eq!(spring.stats.count, 4);
        assert_eq!(spring.stats.paid_count, 3);
        assert_eq!(spring.stats.paid_revenue, 350.0);

        assert_eq!(spring.source_media.len(), 3);
        // Ordered by paid count.
        assert_eq!(spring.source_media[0].source, "google");
        assert_eq!(spring.source_media[0].stats.paid_count, 2);
        assert_eq!(spring.source_media[1].source, "facebook");
        // Missing source/medium fall into the unknown bucket.
        assert_eq!(spring.source_media[2].source, "unknown");
        assert_eq!(spring.source_media[2].medium, "unknown");
    }

    #[test]
    fn test_content_and_term_groups_skip_empty_values() {
        let mut with_content = record(LeadStatus::Paid, 100.0, "spring", "google", "cpc");
        with_content.utm_content = "banner_a".to_string();
        with_content.utm_term = "pmp casablanca".to_string();
        let without = record(LeadStatus::Paid, 50.0, "spring", "google", "cpc");

        let rollups = attribute(&[with_content, without]);
        assert_eq!(rollups[0].contents.len(), 1);
        assert_eq!(rollups[0].contents[0].value, "banner_a");
        assert_eq!(rollups[0].contents[0].stats.count, 1);
        assert_eq!(rollups[0].terms.len(), 1);
    }
}
