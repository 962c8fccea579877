use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MedSafeError;
use crate::sources::TextGenerator;
use crate::sources::rate_limit::HUGGINGFACE_PACE;

const HF_API: &str = "huggingface";
const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl GenerationParams {
    /// Short, low-temperature answers for the chat gateway.
    pub fn chat() -> Self {
        Self {
            max_new_tokens: 200,
            temperature: 0.3,
        }
    }

    /// Longer plain-language explanations.
    pub fn explanation() -> Self {
        Self {
            max_new_tokens: 400,
            temperature: 0.7,
        }
    }
}

pub struct HuggingFaceClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: String,
    model_id: String,
    token: String,
}

impl HuggingFaceClient {
    pub fn new(
        base: impl Into<String>,
        model_id: impl Into<String>,
        token: Option<&str>,
    ) -> Result<Self, MedSafeError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MedSafeError::ApiKeyRequired {
                api: HF_API.to_string(),
                env_var: crate::config::HF_TOKEN_ENV.to_string(),
            })?;
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: base.into(),
            model_id: model_id.into(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        crate::sources::join_endpoint(&self.base, &self.model_id)
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: Option<String>,
}

#[async_trait]
impl TextGenerator for HuggingFaceClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, MedSafeError> {
        let body = InferenceRequest {
            inputs: prompt,
            parameters: InferenceParameters {
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                return_full_text: false,
            },
        };

        let rows: Vec<GeneratedText> = crate::sources::send_json(
            HF_API,
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.token)
                .json(&body)
                .timeout(GENERATION_TIMEOUT)
                .with_extension(HUGGINGFACE_PACE),
        )
        .await?;

        rows.into_iter()
            .next()
            .and_then(|row| row.generated_text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| MedSafeError::Api {
                api: HF_API.to_string(),
                message: "Response did not contain generated text".into(),
            })
    }
}
