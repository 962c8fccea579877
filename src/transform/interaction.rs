use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sources::InteractionData;

/// One reported interaction between two or more of the requested drugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionPair {
    pub participants: Vec<String>,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub description: String,
}

impl InteractionPair {
    /// `"aspirin + warfarin: Increased bleeding risk."`
    pub fn summary(&self) -> String {
        let names = self.labels.join(" + ");
        if self.description.is_empty() {
            names
        } else {
            format!("{names}: {}", self.description)
        }
    }
}

fn clean_severity(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("n/a") {
        None
    } else {
        Some(v.to_string())
    }
}

/// Flattens grouped interaction data into pairs, in encounter order.
///
/// Pairs that mention a code outside `requested` (or that carry fewer than two concepts) are
/// skipped. Codes without an entry in `labels` are displayed as the raw code.
pub fn flatten_pairs(
    data: &InteractionData,
    requested: &[String],
    labels: &BTreeMap<String, String>,
) -> Vec<InteractionPair> {
    data.pairs()
        .filter_map(|pair| {
            let participants: Vec<String> = pair
                .interaction_concept
                .iter()
                .map(|c| c.min_concept_item.rxcui.trim().to_string())
                .collect();
            if participants.len() < 2
                || participants
                    .iter()
                    .any(|code| code.is_empty() || !requested.contains(code))
            {
                return None;
            }

            let labels = participants
                .iter()
                .map(|code| labels.get(code).cloned().unwrap_or_else(|| code.clone()))
                .collect();
            Some(InteractionPair {
                participants,
                labels,
                severity: clean_severity(pair.severity.as_deref()),
                description: pair
                    .description
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}
