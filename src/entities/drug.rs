use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MedSafeError;
use crate::sources::Terminology;

/// A free-text name mapped to a vocabulary code and its preferred display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDrug {
    pub query: String,
    pub rxcui: String,
    pub label: String,
}

/// Resolves one name through the best approximate match.
///
/// `Ok(None)` means the vocabulary had no candidate. Upstream failures of the match itself are
/// returned as errors; a failed label lookup falls back to the candidate's own name, then to
/// the query text, so a resolved drug always carries a non-empty label.
pub async fn resolve_name(
    terminology: &dyn Terminology,
    name: &str,
) -> Result<Option<ResolvedDrug>, MedSafeError> {
    let query = name.trim();
    if query.is_empty() {
        return Ok(None);
    }

    let Some(candidate) = terminology.approximate_match(query).await? else {
        debug!(query, "no approximate match");
        return Ok(None);
    };
    let rxcui = candidate.rxcui.trim().to_string();
    if rxcui.is_empty() {
        return Ok(None);
    }

    let label = match terminology.label(&rxcui).await {
        Ok(Some(label)) => Some(label),
        Ok(None) => None,
        Err(err) => {
            warn!(rxcui = %rxcui, error = %err, "label lookup failed");
            None
        }
    };
    let label = label
        .or(candidate.name)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| query.to_string());

    Ok(Some(ResolvedDrug {
        query: query.to_string(),
        rxcui,
        label,
    }))
}

/// Resolves a single name or reports it as not found.
pub async fn resolve_required(
    terminology: &dyn Terminology,
    name: &str,
) -> Result<ResolvedDrug, MedSafeError> {
    let query = name.trim();
    if query.is_empty() {
        return Err(MedSafeError::InvalidArgument("Drug name is required".into()));
    }
    resolve_name(terminology, query)
        .await?
        .ok_or_else(|| MedSafeError::NotFound {
            entity: "drug".into(),
            id: query.to_string(),
            suggestion: "Check the spelling or try the generic ingredient name.".into(),
        })
}

/// Resolves each name independently and keeps the first occurrence of every code.
///
/// Names that do not resolve, or whose lookup fails, are dropped. Up to `concurrency`
/// lookups run at once; results are still taken in input order, so which duplicate wins
/// never depends on completion order.
pub async fn resolve_many<S: AsRef<str>>(
    terminology: &dyn Terminology,
    names: &[S],
    concurrency: usize,
) -> Vec<ResolvedDrug> {
    let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
    let resolved: Vec<Option<ResolvedDrug>> = stream::iter(names)
        .map(|name| resolve_or_drop(terminology, name))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    dedup_by_code(resolved.into_iter().flatten())
}

async fn resolve_or_drop(terminology: &dyn Terminology, name: String) -> Option<ResolvedDrug> {
    match resolve_name(terminology, &name).await {
        Ok(found) => found,
        Err(err) => {
            warn!(query = %name, error = %err, "dropping name after failed lookup");
            None
        }
    }
}

pub(crate) fn dedup_by_code(drugs: impl IntoIterator<Item = ResolvedDrug>) -> Vec<ResolvedDrug> {
    let mut seen = HashSet::new();
    drugs
        .into_iter()
        .filter(|d| seen.insert(d.rxcui.clone()))
        .collect()
}
