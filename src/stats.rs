use crate::models::{DetailCount, LabelCount, StatsResponse};
use crate::snapshot::ListSnapshot;
use std::collections::BTreeMap;

const TOP_LABELS: usize = 5;
const MISSING_DETAIL: &str = "N/A";

pub fn build_stats(snapshot: &ListSnapshot) -> StatsResponse {
    let mut labels: BTreeMap<&str, usize> = BTreeMap::new();
    let mut details: BTreeMap<&str, usize> = BTreeMap::new();

    for report in snapshot {
        *labels.entry(report.label.as_str()).or_default() += 1;
        let detail = report.detail.as_deref().unwrap_or(MISSING_DETAIL);
        *details.entry(detail).or_default() += 1;
    }

    let mut top_labels: Vec<LabelCount> = labels
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    // Stable sort keeps the map's alphabetical order among equal counts.
    top_labels.sort_by(|a, b| b.count.cmp(&a.count));
    top_labels.truncate(TOP_LABELS);

    let detail_counts = details
        .into_iter()
        .map(|(detail, count)| DetailCount {
            detail: detail.to_string(),
            count,
        })
        .collect();

    StatsResponse {
        total: snapshot.len(),
        top_labels,
        detail_counts,
    }
}
