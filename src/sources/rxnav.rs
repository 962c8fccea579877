use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::MedSafeError;
use crate::sources::rate_limit::RXNAV_PACE;
use crate::sources::{InteractionSource, Terminology};

const RXNAV_API: &str = "rxnav";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);
const HEAVY_TIMEOUT: Duration = Duration::from_secs(20);

/// Term types whose related lookups are large enough to deserve the longer timeout.
const PRODUCT_TERM_TYPES: [&str; 4] = ["SCD", "SBD", "GPCK", "BPCK"];

fn de_null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

pub struct RxNavClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: String,
}

impl RxNavClient {
    pub fn new(base: impl Into<String>) -> Result<Self, MedSafeError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: base.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        crate::sources::join_endpoint(&self.base, path)
    }
}

#[async_trait]
impl Terminology for RxNavClient {
    async fn approximate_match(
        &self,
        term: &str,
    ) -> Result<Option<ApproximateCandidate>, MedSafeError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(None);
        }

        let url = self.endpoint("approximateTerm.json");
        let resp: ApproximateTermResponse = crate::sources::send_json(
            RXNAV_API,
            self.client
                .get(&url)
                .query(&[("term", term), ("maxEntries", "1")])
                .timeout(LOOKUP_TIMEOUT)
                .with_extension(RXNAV_PACE),
        )
        .await?;

        Ok(resp
            .approximate_group
            .and_then(|g| g.candidate.into_iter().next())
            .filter(|c| !c.rxcui.trim().is_empty()))
    }

    async fn label(&self, rxcui: &str) -> Result<Option<String>, MedSafeError> {
        let url = self.endpoint(&format!("rxcui/{}/properties.json", rxcui.trim()));
        let resp = self
            .client
            .get(&url)
            .timeout(LOOKUP_TIMEOUT)
            .with_extension(RXNAV_PACE)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let bytes = crate::sources::read_capped(resp, RXNAV_API).await?;
        let parsed: PropertiesResponse =
            serde_json::from_slice(&bytes).map_err(|source| MedSafeError::ApiJson {
                api: RXNAV_API.to_string(),
                source,
            })?;
        Ok(parsed
            .properties
            .and_then(|p| p.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()))
    }

    async fn related(
        &self,
        rxcui: &str,
        term_types: &[&str],
    ) -> Result<Vec<RelatedConcept>, MedSafeError> {
        if term_types.is_empty() {
            return Err(MedSafeError::InvalidArgument(
                "At least one term type is required for a related lookup".into(),
            ));
        }

        let timeout = if term_types.iter().any(|t| PRODUCT_TERM_TYPES.contains(t)) {
            HEAVY_TIMEOUT
        } else {
            LOOKUP_TIMEOUT
        };
        let url = self.endpoint(&format!("rxcui/{}/related.json", rxcui.trim()));
        let tty = term_types.join(" ");
        let resp: RelatedResponse = crate::sources::send_json(
            RXNAV_API,
            self.client
                .get(&url)
                .query(&[("tty", tty.as_str())])
                .timeout(timeout)
                .with_extension(RXNAV_PACE),
        )
        .await?;

        Ok(resp
            .related_group
            .map(|g| {
                g.concept_group
                    .into_iter()
                    .flat_map(|group| group.concept_properties)
                    .filter(|c| !c.rxcui.trim().is_empty())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl InteractionSource for RxNavClient {
    async fn interactions(&self, rxcuis: &[String]) -> Result<InteractionData, MedSafeError> {
        if rxcuis.len() < 2 {
            return Ok(InteractionData::default());
        }

        let url = self.endpoint("interaction/list.json");
        let joined = rxcuis.join(" ");
        crate::sources::send_json(
            RXNAV_API,
            self.client
                .get(&url)
                .query(&[("rxcuis", joined.as_str())])
                .timeout(HEAVY_TIMEOUT)
                .with_extension(RXNAV_PACE),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproximateTermResponse {
    #[serde(default)]
    approximate_group: Option<ApproximateGroup>,
}

#[derive(Debug, Deserialize)]
struct ApproximateGroup {
    #[serde(default, deserialize_with = "de_null_as_empty")]
    candidate: Vec<ApproximateCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApproximateCandidate {
    #[serde(default)]
    pub rxcui: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PropertiesResponse {
    #[serde(default)]
    properties: Option<ConceptProperties>,
}

#[derive(Debug, Deserialize)]
struct ConceptProperties {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedResponse {
    #[serde(default)]
    related_group: Option<RelatedGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedGroup {
    #[serde(default, deserialize_with = "de_null_as_empty")]
    concept_group: Vec<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConceptGroup {
    #[serde(default, deserialize_with = "de_null_as_empty")]
    concept_properties: Vec<RelatedConcept>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelatedConcept {
    #[serde(default)]
    pub rxcui: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
}

/// Grouped interaction data, kept in the upstream nesting
/// (source group → interaction type → pair → concepts).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionData {
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub full_interaction_type_group: Vec<InteractionTypeGroup>,
    /// Upstream fields that are passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionTypeGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_disclaimer: Option<String>,
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub full_interaction_type: Vec<FullInteractionType>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullInteractionType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub interaction_pair: Vec<RawInteractionPair>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInteractionPair {
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub interaction_concept: Vec<InteractionConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionConcept {
    #[serde(default)]
    pub min_concept_item: MinConceptItem,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MinConceptItem {
    #[serde(default)]
    pub rxcui: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InteractionData {
    pub fn is_empty(&self) -> bool {
        self.pairs().next().is_none()
    }

    pub(crate) fn pairs(&self) -> impl Iterator<Item = &RawInteractionPair> {
        self.full_interaction_type_group
            .iter()
            .flat_map(|g| g.full_interaction_type.iter())
            .flat_map(|t| t.interaction_pair.iter())
    }

    /// Every non-empty code mentioned anywhere in the data, first-seen order.
    pub fn referenced_codes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pairs()
            .flat_map(|p| p.interaction_concept.iter())
            .map(|c| c.min_concept_item.rxcui.trim())
            .filter(|code| !code.is_empty())
            .filter(|code| seen.insert(code.to_string()))
            .map(str::to_string)
            .collect()
    }
}
