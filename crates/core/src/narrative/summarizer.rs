//! Learned summarization backend with lazy, failure-sticky acquisition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::SummaryConfig;
use crate::errors::SummaryError;

/// Decoding knobs passed to the backend per request.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeSettings {
    pub min_length: usize,
    pub max_length: usize,
    pub no_repeat_ngram: usize,
    pub sampling: bool,
    pub top_p: f64,
    pub temperature: f64,
    pub num_beams: usize,
}

/// A ready-to-use summarization capability.
#[async_trait]
pub trait SummaryModel: Send + Sync + std::fmt::Debug {
    async fn summarize(&self, text: &str, decode: &DecodeSettings)
        -> Result<String, SummaryError>;
}

/// Opens a connection to a summarization model, optionally authenticated.
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn connect(
        &self,
        credential: Option<&SecretString>,
    ) -> Result<Arc<dyn SummaryModel>, SummaryError>;
}

enum ModelSlot {
    Untried,
    Ready(Arc<dyn SummaryModel>),
    Failed(String),
}

/// Process-wide cache around model acquisition.
///
/// Acquisition tries anonymous access first, then the configured
/// credential, and commits to the first success. A double failure is
/// sticky: later calls return the recorded reason without retrying. The
/// mutex is held across the whole attempt so concurrent first callers
/// trigger a single acquisition.
pub struct ModelCache {
    source: Box<dyn ModelSource>,
    credential: Option<SecretString>,
    slot: Mutex<ModelSlot>,
}

impl ModelCache {
    pub fn new(source: Box<dyn ModelSource>, credential: Option<SecretString>) -> Self {
        Self { source, credential, slot: Mutex::new(ModelSlot::Untried) }
    }

    pub async fn acquire(&self) -> Result<Arc<dyn SummaryModel>, SummaryError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            ModelSlot::Ready(model) => return Ok(model.clone()),
            ModelSlot::Failed(reason) => {
                return Err(SummaryError::Acquisition(reason.clone()));
            }
            ModelSlot::Untried => {}
        }

        let outcome = match self.source.connect(None).await {
            Ok(model) => Ok(model),
            Err(anonymous_error) => match &self.credential {
                Some(credential) => {
                    warn!(error = %anonymous_error, "anonymous model load failed, retrying with credential");
                    self.source.connect(Some(credential)).await.map_err(|credential_error| {
                        format!(
                            "anonymous load failed: {anonymous_error}; credential load failed: {credential_error}"
                        )
                    })
                }
                None => Err(format!("anonymous load failed: {anonymous_error}")),
            },
        };

        match outcome {
            Ok(model) => {
                info!("summarization model acquired");
                *slot = ModelSlot::Ready(model.clone());
                Ok(model)
            }
            Err(reason) => {
                warn!(reason = %reason, "summarization model unavailable; failure is sticky");
                *slot = ModelSlot::Failed(reason.clone());
                Err(SummaryError::Acquisition(reason))
            }
        }
    }
}

/// Hosted inference endpoint speaking the `{inputs, parameters, options}`
/// summarization protocol.
pub struct HostedModelSource {
    config: SummaryConfig,
}

impl HostedModelSource {
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelSource for HostedModelSource {
    async fn connect(
        &self,
        credential: Option<&SecretString>,
    ) -> Result<Arc<dyn SummaryModel>, SummaryError> {
        let model = HostedSummaryModel::open(&self.config, credential)?;
        model.probe().await?;
        Ok(Arc::new(model))
    }
}

#[derive(Debug)]
struct HostedSummaryModel {
    http: reqwest::Client,
    url: String,
    bearer: Option<String>,
}

impl HostedSummaryModel {
    fn open(
        config: &SummaryConfig,
        credential: Option<&SecretString>,
    ) -> Result<Self, SummaryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| SummaryError::Acquisition(error.to_string()))?;
        let url = format!(
            "{}/models/{}",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            http,
            url,
            bearer: credential
                .map(|secret| format!("Bearer {}", secret.expose_secret())),
        })
    }

    /// Availability check: open models answer anonymously, gated ones
    /// return 401/403 until a credential is supplied.
    async fn probe(&self) -> Result<(), SummaryError> {
        let mut request = self.http.get(&self.url);
        if let Some(bearer) = &self.bearer {
            request = request.header(reqwest::header::AUTHORIZATION, bearer.clone());
        }
        request
            .send()
            .await
            .map_err(|error| SummaryError::Acquisition(error.to_string()))?
            .error_for_status()
            .map(|_| ())
            .map_err(|error| SummaryError::Acquisition(error.to_string()))
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
    options: InferenceOptions,
}

#[derive(Serialize)]
struct InferenceParameters {
    min_length: usize,
    max_length: usize,
    no_repeat_ngram_size: usize,
    do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_return_sequences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_beams: Option<usize>,
}

#[derive(Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
struct InferencePayload {
    summary_text: String,
}

#[async_trait]
impl SummaryModel for HostedSummaryModel {
    async fn summarize(
        &self,
        text: &str,
        decode: &DecodeSettings,
    ) -> Result<String, SummaryError> {
        let parameters = if decode.sampling {
            InferenceParameters {
                min_length: decode.min_length,
                max_length: decode.max_length,
                no_repeat_ngram_size: decode.no_repeat_ngram,
                do_sample: true,
                top_p: Some(decode.top_p),
                temperature: Some(decode.temperature),
                num_return_sequences: Some(1),
                num_beams: None,
            }
        } else {
            InferenceParameters {
                min_length: decode.min_length,
                max_length: decode.max_length,
                no_repeat_ngram_size: decode.no_repeat_ngram,
                do_sample: false,
                top_p: None,
                temperature: None,
                num_return_sequences: None,
                num_beams: Some(decode.num_beams),
            }
        };

        let mut request = self.http.post(&self.url).json(&InferenceRequest {
            inputs: text,
            parameters,
            options: InferenceOptions { wait_for_model: true },
        });
        if let Some(bearer) = &self.bearer {
            request = request.header(reqwest::header::AUTHORIZATION, bearer.clone());
        }

        let payload: Vec<InferencePayload> = request
            .send()
            .await
            .map_err(|error| SummaryError::Request(error.to_string()))?
            .error_for_status()
            .map_err(|error| SummaryError::Request(error.to_string()))?
            .json()
            .await
            .map_err(|error| SummaryError::Request(error.to_string()))?;

        let summary = payload
            .into_iter()
            .next()
            .map(|entry| entry.summary_text.trim().to_string())
            .unwrap_or_default();
        if summary.is_empty() {
            return Err(SummaryError::EmptyCompletion);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use crate::errors::SummaryError;

    use super::{DecodeSettings, ModelCache, ModelSource, SummaryModel};

    #[derive(Debug)]
    struct EchoModel;

    #[async_trait]
    impl SummaryModel for EchoModel {
        async fn summarize(
            &self,
            text: &str,
            _decode: &DecodeSettings,
        ) -> Result<String, SummaryError> {
            Ok(text.to_string())
        }
    }

    /// Scripted source with per-stage outcomes and attempt counters.
    struct ScriptedSource {
        anonymous_ok: bool,
        credential_ok: bool,
        anonymous_attempts: AtomicUsize,
        credential_attempts: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(anonymous_ok: bool, credential_ok: bool) -> Self {
            Self {
                anonymous_ok,
                credential_ok,
                anonymous_attempts: AtomicUsize::new(0),
                credential_attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelSource for ScriptedSource {
        async fn connect(
            &self,
            credential: Option<&SecretString>,
        ) -> Result<Arc<dyn SummaryModel>, SummaryError> {
            let allowed = match credential {
                None => {
                    self.anonymous_attempts.fetch_add(1, Ordering::SeqCst);
                    self.anonymous_ok
                }
                Some(_) => {
                    self.credential_attempts.fetch_add(1, Ordering::SeqCst);
                    self.credential_ok
                }
            };
            if allowed {
                Ok(Arc::new(EchoModel))
            } else {
                Err(SummaryError::Acquisition("denied".to_string()))
            }
        }
    }

    fn token() -> Option<SecretString> {
        Some(String::from("hf-test-token").into())
    }

    #[tokio::test]
    async fn anonymous_success_never_spends_the_credential() {
        let source = Arc::new(ScriptedSource::new(true, true));
        let cache = ModelCache::new(Box::new(SharedSource(source.clone())), token());

        cache.acquire().await.expect("acquire");
        cache.acquire().await.expect("second acquire is cached");

        assert_eq!(source.anonymous_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(source.credential_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn credential_is_tried_after_anonymous_failure() {
        let source = Arc::new(ScriptedSource::new(false, true));
        let cache = ModelCache::new(Box::new(SharedSource(source.clone())), token());

        cache.acquire().await.expect("credentialed acquire");
        assert_eq!(source.anonymous_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(source.credential_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn double_failure_is_sticky() {
        let source = Arc::new(ScriptedSource::new(false, false));
        let cache = ModelCache::new(Box::new(SharedSource(source.clone())), token());

        for _ in 0..3 {
            let error = cache.acquire().await.expect_err("unavailable");
            assert!(matches!(error, SummaryError::Acquisition(_)));
        }

        // Only the first call attempted anything.
        assert_eq!(source.anonymous_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(source.credential_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_credential_skips_the_credential_stage() {
        let source = Arc::new(ScriptedSource::new(false, true));
        let cache = ModelCache::new(Box::new(SharedSource(source.clone())), None);

        cache.acquire().await.expect_err("unavailable");
        assert_eq!(source.credential_attempts.load(Ordering::SeqCst), 0);
    }

    /// Box-able wrapper so tests can keep a handle on the counters.
    struct SharedSource(Arc<ScriptedSource>);

    #[async_trait]
    impl ModelSource for SharedSource {
        async fn connect(
            &self,
            credential: Option<&SecretString>,
        ) -> Result<Arc<dyn SummaryModel>, SummaryError> {
            self.0.connect(credential).await
        }
    }
}
