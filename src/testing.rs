//! In-memory stand-ins for the upstream capabilities.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::MedSafeError;
use crate::sources::rxnav::{
    FullInteractionType, InteractionConcept, InteractionTypeGroup, MinConceptItem,
    RawInteractionPair,
};
use crate::sources::{
    ApproximateCandidate, GenerationParams, InteractionData, InteractionSource, RelatedConcept,
    Terminology, TextGenerator,
};

fn upstream(message: &str) -> MedSafeError {
    MedSafeError::Api {
        api: "fake".to_string(),
        message: message.to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeTerminology {
    /// Lower-cased term → rxcui.
    terms: HashMap<String, String>,
    failing_terms: Vec<String>,
    delays: HashMap<String, Duration>,
    labels: HashMap<String, String>,
    failing_labels: Vec<String>,
    related: HashMap<(String, String), Vec<RelatedConcept>>,
    pub match_calls: AtomicUsize,
}

impl FakeTerminology {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn drug(mut self, term: &str, rxcui: &str, label: &str) -> Self {
        self.terms.insert(term.to_ascii_lowercase(), rxcui.to_string());
        self.labels.insert(rxcui.to_string(), label.to_string());
        self
    }

    pub(crate) fn alias(mut self, term: &str, rxcui: &str) -> Self {
        self.terms.insert(term.to_ascii_lowercase(), rxcui.to_string());
        self
    }

    pub(crate) fn failing_term(mut self, term: &str) -> Self {
        self.failing_terms.push(term.to_ascii_lowercase());
        self
    }

    /// Holds the approximate match for `term` back by `millis`.
    pub(crate) fn slow_term(mut self, term: &str, millis: u64) -> Self {
        self.delays
            .insert(term.to_ascii_lowercase(), Duration::from_millis(millis));
        self
    }

    pub(crate) fn failing_label(mut self, rxcui: &str) -> Self {
        self.failing_labels.push(rxcui.to_string());
        self
    }

    /// Registers the concepts returned for `rxcui` when `term_types` is requested.
    pub(crate) fn related_to(
        mut self,
        rxcui: &str,
        term_types: &[&str],
        concepts: &[(&str, &str)],
    ) -> Self {
        self.related.insert(
            (rxcui.to_string(), term_types.join(" ")),
            concepts
                .iter()
                .map(|(code, name)| RelatedConcept {
                    rxcui: code.to_string(),
                    name: name.to_string(),
                    tty: None,
                })
                .collect(),
        );
        self
    }

    pub(crate) fn match_calls(&self) -> usize {
        self.match_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Terminology for FakeTerminology {
    async fn approximate_match(
        &self,
        term: &str,
    ) -> Result<Option<ApproximateCandidate>, MedSafeError> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        let key = term.trim().to_ascii_lowercase();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_terms.contains(&key) {
            return Err(upstream("approximate match failed"));
        }
        Ok(self.terms.get(&key).map(|rxcui| ApproximateCandidate {
            rxcui: rxcui.clone(),
            name: None,
        }))
    }

    async fn label(&self, rxcui: &str) -> Result<Option<String>, MedSafeError> {
        if self.failing_labels.iter().any(|c| c == rxcui) {
            return Err(upstream("label lookup failed"));
        }
        Ok(self.labels.get(rxcui).cloned())
    }

    async fn related(
        &self,
        rxcui: &str,
        term_types: &[&str],
    ) -> Result<Vec<RelatedConcept>, MedSafeError> {
        Ok(self
            .related
            .get(&(rxcui.to_string(), term_types.join(" ")))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct FakeInteractions {
    data: Option<InteractionData>,
    fail: bool,
    pub requests: Mutex<Vec<Vec<String>>>,
}

impl FakeInteractions {
    pub(crate) fn returning(data: InteractionData) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl InteractionSource for FakeInteractions {
    async fn interactions(&self, rxcuis: &[String]) -> Result<InteractionData, MedSafeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(rxcuis.to_vec());
        }
        if self.fail {
            return Err(upstream("interaction lookup failed"));
        }
        Ok(self.data.clone().unwrap_or_default())
    }
}

pub(crate) enum FakeGenerator {
    Reply(String),
    Fail,
}

pub(crate) struct RecordingGenerator {
    pub behavior: FakeGenerator,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            behavior: FakeGenerator::Reply(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            behavior: FakeGenerator::Fail,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompt_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, MedSafeError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match &self.behavior {
            FakeGenerator::Reply(text) => Ok(text.clone()),
            FakeGenerator::Fail => Err(upstream("generation timed out")),
        }
    }
}

/// One source group holding one pair per `(codes, description)` entry.
pub(crate) fn interaction_data(pairs: Vec<(Vec<&str>, &str)>) -> InteractionData {
    InteractionData {
        full_interaction_type_group: vec![InteractionTypeGroup {
            source_name: Some("DrugBank".to_string()),
            full_interaction_type: pairs
                .iter()
                .map(|(codes, description)| FullInteractionType {
                    interaction_pair: vec![RawInteractionPair {
                        interaction_concept: codes
                            .iter()
                            .map(|code| InteractionConcept {
                                min_concept_item: MinConceptItem {
                                    rxcui: code.to_string(),
                                    ..Default::default()
                                },
                                ..Default::default()
                            })
                            .collect(),
                        severity: Some("high".to_string()),
                        description: Some(description.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}
