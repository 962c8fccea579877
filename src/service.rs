//! The application facade shared by the HTTP server and the CLI.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, ExtractLimits};
use crate::entities::alternative::{Alternatives, find_alternatives};
use crate::entities::chat::{self, ChatTurn};
use crate::entities::drug::{ResolvedDrug, resolve_many};
use crate::entities::extract::extract_drugs;
use crate::entities::history::{HistoryRecord, SessionHistory};
use crate::entities::interaction::{InteractionReport, aggregate};
use crate::error::MedSafeError;
use crate::sources::{
    HuggingFaceClient, InteractionSource, RxNavClient, Terminology, TextGenerator,
};

/// Owns the upstream capabilities and the session history.
pub struct MedSafe {
    terminology: Arc<dyn Terminology>,
    interactions: Arc<dyn InteractionSource>,
    generator: Option<Arc<dyn TextGenerator>>,
    history: SessionHistory,
    limits: ExtractLimits,
}

impl MedSafe {
    pub fn new(
        terminology: Arc<dyn Terminology>,
        interactions: Arc<dyn InteractionSource>,
        generator: Option<Arc<dyn TextGenerator>>,
        history: SessionHistory,
        limits: ExtractLimits,
    ) -> Self {
        Self {
            terminology,
            interactions,
            generator,
            history,
            limits,
        }
    }

    /// Wires the RxNav and Hugging Face clients described by `config`.
    ///
    /// A missing generation token is not an error: chat then answers with the help message.
    pub fn from_config(config: &Config) -> Result<Self, MedSafeError> {
        let rxnav = Arc::new(RxNavClient::new(config.rxnav_base.clone())?);
        let generator: Option<Arc<dyn TextGenerator>> = match config.hf_token.as_deref() {
            Some(token) => Some(Arc::new(HuggingFaceClient::new(
                config.hf_base.clone(),
                config.model_id.clone(),
                Some(token),
            )?)),
            None => {
                info!("HF_API_TOKEN not set; chat will answer with the built-in help text");
                None
            }
        };
        Ok(Self::new(
            rxnav.clone(),
            rxnav,
            generator,
            SessionHistory::new(config.history_capacity),
            config.extract,
        ))
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    fn generator(&self) -> Option<&dyn TextGenerator> {
        self.generator.as_deref()
    }

    /// Resolves `drugs`, checks them for interactions and records the check in the history.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for fewer than two non-blank names (no lookups are made), `NotFound`
    /// when fewer than two names resolve, and the upstream error when the interaction lookup
    /// fails.
    pub async fn check_interactions(
        &self,
        drugs: &[String],
    ) -> Result<InteractionReport, MedSafeError> {
        let names: Vec<String> = drugs
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        if names.len() < 2 {
            return Err(MedSafeError::InvalidArgument(
                "Please provide at least two drug names.".into(),
            ));
        }

        let resolved = resolve_many(self.terminology.as_ref(), &names, self.limits.concurrency).await;
        if resolved.len() < 2 {
            return Err(MedSafeError::NotFound {
                entity: "drugs".into(),
                id: names.join(", "),
                suggestion: "At least two names must match the drug vocabulary.".into(),
            });
        }

        let codes: Vec<String> = resolved.iter().map(|d| d.rxcui.clone()).collect();
        let known: BTreeMap<String, String> = resolved
            .iter()
            .map(|d| (d.rxcui.clone(), d.label.clone()))
            .collect();
        let report = aggregate(
            self.terminology.as_ref(),
            self.interactions.as_ref(),
            &codes,
            &known,
        )
        .await?;

        self.history
            .add_record(HistoryRecord::interaction_check(&names, &report));
        Ok(report)
    }

    pub async fn alternatives(&self, drug: &str) -> Result<Alternatives, MedSafeError> {
        find_alternatives(self.terminology.as_ref(), drug).await
    }

    pub async fn extract(&self, text: &str) -> Vec<ResolvedDrug> {
        extract_drugs(self.terminology.as_ref(), text, &self.limits).await
    }

    pub async fn chat(&self, message: &str) -> ChatTurn {
        chat::reply(self.generator(), message).await
    }

    pub async fn chat_session(&self, session: &mut chat::ChatSession, message: &str) -> ChatTurn {
        session.send(self.generator(), message).await
    }

    pub async fn summarize(&self, data: &str) -> Result<String, MedSafeError> {
        if data.trim().is_empty() {
            return Err(MedSafeError::InvalidArgument(
                "Interaction data to summarize is required.".into(),
            ));
        }
        Ok(chat::summarize_interactions(self.generator(), data).await)
    }

    pub async fn explain_alternatives(
        &self,
        drug: &str,
        options: &[String],
    ) -> Result<String, MedSafeError> {
        if drug.trim().is_empty() {
            return Err(MedSafeError::InvalidArgument("Drug name is required.".into()));
        }
        Ok(chat::explain_alternatives(self.generator(), drug, options).await)
    }
}
