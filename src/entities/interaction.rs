use std::collections::{BTreeMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MedSafeError;
use crate::sources::{InteractionData, InteractionSource, Terminology};
use crate::transform::interaction::{InteractionPair, flatten_pairs};

const LABEL_CONCURRENCY: usize = 4;

/// Interaction data for a set of codes together with a display label for every code it mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionReport {
    pub rxcuis: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub data: InteractionData,
}

impl InteractionReport {
    pub fn pairs(&self) -> Vec<InteractionPair> {
        flatten_pairs(&self.data, &self.rxcuis, &self.labels)
    }

    pub fn has_interactions(&self) -> bool {
        !self.data.is_empty()
    }
}

fn dedup_codes(codes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.to_string()))
        .map(str::to_string)
        .collect()
}

async fn label_or_code(terminology: &dyn Terminology, code: String) -> (String, String) {
    let label = match terminology.label(&code).await {
        Ok(Some(label)) => label,
        Ok(None) => code.clone(),
        Err(err) => {
            warn!(rxcui = %code, error = %err, "label lookup failed; using the code");
            code.clone()
        }
    };
    (code, label)
}

/// Fetches grouped interactions for `codes` in one upstream call and labels every code involved.
///
/// `known_labels` seeds the label map (typically from name resolution); any requested or
/// referenced code without a seeded label is looked up, falling back to the raw code. An
/// empty result is a valid "no known interactions" answer.
///
/// # Errors
///
/// Returns `InvalidArgument` when fewer than two distinct codes are given, and the upstream
/// error when the interaction lookup itself fails.
pub async fn aggregate(
    terminology: &dyn Terminology,
    source: &dyn InteractionSource,
    codes: &[String],
    known_labels: &BTreeMap<String, String>,
) -> Result<InteractionReport, MedSafeError> {
    let rxcuis = dedup_codes(codes);
    if rxcuis.len() < 2 {
        return Err(MedSafeError::InvalidArgument(
            "At least two distinct drug codes are required to check interactions".into(),
        ));
    }

    let data = source.interactions(&rxcuis).await?;

    let mut labels: BTreeMap<String, String> = BTreeMap::new();
    let mut missing = Vec::new();
    let mut all_codes = rxcuis.clone();
    all_codes.extend(data.referenced_codes());
    for code in all_codes {
        if labels.contains_key(&code) || missing.contains(&code) {
            continue;
        }
        match known_labels.get(&code) {
            Some(label) if !label.trim().is_empty() => {
                labels.insert(code, label.clone());
            }
            _ => missing.push(code),
        }
    }

    let fetched: Vec<(String, String)> = stream::iter(missing)
        .map(|code| label_or_code(terminology, code))
        .buffered(LABEL_CONCURRENCY)
        .collect()
        .await;
    labels.extend(fetched);

    Ok(InteractionReport {
        rxcuis,
        labels,
        data,
    })
}
