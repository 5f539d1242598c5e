//! Prompting and retrying around the completion client

use super::client::{AiError, CompletionClient};
use super::parse::{parse_nationality_response, FIELD_CONFIDENCE, FIELD_IS_TARGET, FIELD_NAME};
use crate::normalize::normalize;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::types::NationalityResult;
use std::fmt::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Build the classification prompt.
///
/// With both fields present the model is told to trust the birthplace when
/// the two disagree.
pub fn build_prompt(declared: &str, birthplace: Option<&str>) -> String {
    let declared = normalize(declared);
    let birthplace = birthplace.map(normalize).filter(|b| !b.is_empty());

    let mut prompt = String::from(
        "Analiza la siguiente nacionalidad y responde con un JSON valido:\n\n",
    );
    if !declared.is_empty() || birthplace.is_none() {
        let _ = writeln!(prompt, "Nacionalidad: \"{}\"", declared);
    }
    if let Some(place) = &birthplace {
        let _ = writeln!(prompt, "Lugar de nacimiento: \"{}\"", place);
        if !declared.is_empty() {
            prompt.push_str(
                "Si la nacionalidad y el lugar de nacimiento se contradicen, \
                 prioriza el lugar de nacimiento.\n",
            );
        }
    }
    let _ = write!(
        prompt,
        "\nFormato:\n{{\n  \"{}\": true/false,\n  \"{}\": \"...\",\n  \"{}\": \"alta/media/baja\"\n}}\n\nSolo responde el JSON, sin texto adicional.",
        FIELD_IS_TARGET, FIELD_NAME, FIELD_CONFIDENCE
    );
    prompt
}

/// Generative fallback tier for nationality classification.
pub struct AiResolver {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl AiResolver {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ask the model, retrying timeouts and connection failures.
    ///
    /// Malformed answers never fail (see `parse_nationality_response`); an
    /// error means the service could not be reached in time or refused the
    /// request.
    pub async fn resolve(
        &self,
        declared: &str,
        birthplace: Option<&str>,
    ) -> Result<NationalityResult, AiError> {
        let prompt = build_prompt(declared, birthplace);
        let client = &self.client;
        let cancel = &self.cancel;
        let prompt_ref = prompt.as_str();

        let raw = self
            .retry
            .run(self.sleeper.as_ref(), "completion request", |attempt| async move {
                debug!(attempt, "querying completion service");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(AiError::Cancelled),
                    result = client.generate(prompt_ref) => result,
                }
            })
            .await?;

        let result = parse_nationality_response(&raw, declared);
        debug!(
            declared = %declared,
            normalized = %result.normalized_name,
            confidence = %result.confidence,
            "completion service classified nationality"
        );
        Ok(result)
    }
}
