//! Runtime configuration assembled from environment variables.

use crate::error::MedSafeError;

pub(crate) const RXNAV_BASE: &str = "https://rxnav.nlm.nih.gov/REST";
pub(crate) const RXNAV_BASE_ENV: &str = "MEDSAFE_RXNAV_BASE";
pub(crate) const HF_BASE: &str = "https://api-inference.huggingface.co/models";
pub(crate) const HF_BASE_ENV: &str = "MEDSAFE_HF_BASE";
pub(crate) const HF_TOKEN_ENV: &str = "HF_API_TOKEN";
pub(crate) const MODEL_ID_ENV: &str = "IBM_MODEL_ID";
pub(crate) const HISTORY_CAPACITY_ENV: &str = "MEDSAFE_HISTORY_CAPACITY";

const DEFAULT_MODEL_ID: &str = "ibm-granite/granite-13b-chat-v2";
pub const DEFAULT_HISTORY_CAPACITY: usize = 25;

/// Bounds applied by the candidate extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Longest phrase, in tokens, generated from the input text.
    pub max_phrase_len: usize,
    /// Number of candidate phrases sent for resolution.
    pub candidate_cap: usize,
    /// Number of resolved drugs returned.
    pub result_limit: usize,
    /// In-flight resolutions. Results are still reported in candidate order.
    pub concurrency: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_phrase_len: 3,
            candidate_cap: 200,
            result_limit: 20,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rxnav_base: String,
    pub hf_base: String,
    pub hf_token: Option<String>,
    pub model_id: String,
    pub history_capacity: usize,
    pub extract: ExtractLimits,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `MEDSAFE_HISTORY_CAPACITY` is set but is not a positive integer.
    pub fn from_env() -> Result<Self, MedSafeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, MedSafeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let history_capacity = match get(HISTORY_CAPACITY_ENV) {
            None => DEFAULT_HISTORY_CAPACITY,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(MedSafeError::InvalidArgument(format!(
                        "{HISTORY_CAPACITY_ENV} must be a positive integer, got '{raw}'"
                    )));
                }
            },
        };

        Ok(Self {
            rxnav_base: get(RXNAV_BASE_ENV).unwrap_or_else(|| RXNAV_BASE.to_string()),
            hf_base: get(HF_BASE_ENV).unwrap_or_else(|| HF_BASE.to_string()),
            hf_token: get(HF_TOKEN_ENV),
            model_id: get(MODEL_ID_ENV).unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            history_capacity,
            extract: ExtractLimits::default(),
        })
    }
}
