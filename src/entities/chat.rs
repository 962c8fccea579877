//! Chat gateway: refuses medical-advice questions, answers app-usage questions.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sources::{GenerationParams, TextGenerator};

pub const SAFETY_REFUSAL: &str = "I can't help with medical questions such as dosing, \
symptoms, side effects or whether a medicine is right for you. This demo is educational only \
and is not medical advice. Please ask a pharmacist, doctor or other licensed clinician.";

pub const HELP_MESSAGE: &str = "I can help you use MedSafe. Use Interactions to check two or \
more drug names against each other, Extract to find drug names in prescription text, \
Alternatives to list products that share the same active ingredient, and History to export \
your latest interaction checks. Results are educational only.";

pub const SUMMARY_FALLBACK: &str = "A plain-language summary is not available right now. \
Review the interaction descriptions directly and discuss them with a pharmacist or doctor.";

pub const EXPLANATION_FALLBACK: &str = "An explanation is not available right now. The listed \
products share the same active ingredient and may differ in strength, dose form or brand; a \
pharmacist can explain which differences matter.";

const SYSTEM_INSTRUCTION: &str = "You are the help assistant for MedSafe, an educational drug \
interaction demo. Only answer questions about how to use the app (checking interactions, \
extracting drug names from text, finding same-ingredient alternatives, exporting history). If \
the user asks a medical question, refuse and tell them to consult a licensed clinician. Keep \
answers short.";

/// Longest user text, in characters, placed into a generation prompt.
const MAX_PROMPT_INPUT_CHARS: usize = 1000;

/// Lower-case fragments that mark a message as seeking medical advice.
const MEDICAL_KEYWORDS: &[&str] = &[
    "can i take",
    "should i take",
    "is it safe",
    "safe to take",
    "dose",
    "dosage",
    "dosing",
    "overdose",
    "how much should",
    "how much can",
    "how much of",
    "how many mg",
    "side effect",
    "contraindicat",
    "symptom",
    "diagnos",
    "prescribe",
    "treatment for",
    "treat my",
    "pregnan",
    "breastfeed",
    "nursing",
    "my child",
    "my baby",
    "infant",
    "toddler",
    "elderly",
    "allergic",
    "allergy",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Refuse,
    Respond,
}

pub fn classify(message: &str) -> Route {
    let lower = message.to_lowercase();
    if MEDICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Route::Refuse
    } else {
        Route::Respond
    }
}

fn bounded(text: &str) -> &str {
    match text.char_indices().nth(MAX_PROMPT_INPUT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn chat_prompt(message: &str) -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\nUser: {}\nAssistant:",
        bounded(message.trim())
    )
}

/// Runs `prompt` through the generator, or returns `fallback` when there is no generator or
/// the call fails for any reason.
pub(crate) async fn generate_or(
    generator: Option<&dyn TextGenerator>,
    prompt: &str,
    params: &GenerationParams,
    fallback: &str,
) -> String {
    let Some(generator) = generator else {
        debug!("no generation credential configured; using fallback text");
        return fallback.to_string();
    };
    match generator.generate(prompt, params).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => fallback.to_string(),
        Err(err) => {
            warn!(error = %err, "text generation failed; using fallback text");
            fallback.to_string()
        }
    }
}

/// Answers one chat message. Never fails: medical questions get [`SAFETY_REFUSAL`] without
/// touching the generator, and every generation problem degrades to [`HELP_MESSAGE`].
pub async fn reply(generator: Option<&dyn TextGenerator>, message: &str) -> ChatTurn {
    let content = match classify(message) {
        Route::Refuse => SAFETY_REFUSAL.to_string(),
        Route::Respond => {
            generate_or(
                generator,
                &chat_prompt(message),
                &GenerationParams::chat(),
                HELP_MESSAGE,
            )
            .await
        }
    };
    ChatTurn::assistant(content)
}

/// Plain-language summary of raw interaction data.
pub async fn summarize_interactions(generator: Option<&dyn TextGenerator>, data: &str) -> String {
    let prompt = format!(
        "Summarize the following drug interaction data in plain, patient-friendly language. \
         Do not give dosing advice.\n\n{}",
        bounded(data.trim())
    );
    generate_or(
        generator,
        &prompt,
        &GenerationParams::explanation(),
        SUMMARY_FALLBACK,
    )
    .await
}

/// Plain-language explanation of why same-ingredient alternatives might be considered.
pub async fn explain_alternatives(
    generator: Option<&dyn TextGenerator>,
    drug: &str,
    options: &[String],
) -> String {
    let listed = options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    let prompt = format!(
        "The drug '{}' has the following same-ingredient alternatives: {}.\n\
         Explain in simple terms why these alternatives might be considered, including any \
         differences in form, strength or brand. Do not recommend one over another.",
        bounded(drug.trim()),
        bounded(&listed)
    );
    generate_or(
        generator,
        &prompt,
        &GenerationParams::explanation(),
        EXPLANATION_FALLBACK,
    )
    .await
}

/// A transcript of alternating user and assistant turns for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    pub turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub async fn send(
        &mut self,
        generator: Option<&dyn TextGenerator>,
        message: &str,
    ) -> ChatTurn {
        self.turns.push(ChatTurn::user(message));
        let answer = reply(generator, message).await;
        self.turns.push(answer.clone());
        answer
    }
}
