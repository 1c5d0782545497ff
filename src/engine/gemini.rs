use super::backend::{BackendError, CampaignPlanner, ReportBackend, ReportRequest};
use super::prompts;
use crate::matrix::{
    self, AudienceAvatar, NarrativeAngle, PayloadBatch, StrategyMatrix, ViralPayload,
};
use crate::model::BackendConfig;
use crate::subjects::Subject;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

/// The matrix call samples hotter than report stages.
const MATRIX_TEMPERATURE: f32 = 0.8;

/// Report backend talking to the Gemini `generateContent` REST endpoint.
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    thinking_budget: u32,
}

impl GeminiBackend {
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("a Gemini API key is required (set GEMINI_API_KEY or pass --offline)")?
            .to_string();
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            thinking_budget: cfg.thinking_budget,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body(&self, request: &ReportRequest<'_>) -> Value {
        let mut contents: Vec<Value> = request
            .context
            .iter()
            .map(|text| json!({ "role": "user", "parts": [{ "text": text }] }))
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": prompts::report_request(request.command) }]
        }));

        let instruction =
            prompts::system_instruction(request.role, request.subject, request.command);
        json!({
            "systemInstruction": { "parts": [{ "text": instruction }] },
            "contents": contents,
            "generationConfig": {
                "temperature": self.temperature,
                "thinkingConfig": { "thinkingBudget": self.thinking_budget }
            }
        })
    }

    /// Body for a single-prompt call whose reply must be JSON matching `schema`.
    fn structured_body(&self, prompt: &str, schema: Value, temperature: f32) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        })
    }

    /// POST a `generateContent` body and return the non-blank candidate text.
    async fn call(&self, body: &Value) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;
        let payload = serde_json::from_str::<Value>(&raw);

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: parse_error_message(status.as_u16(), payload.as_ref().ok()),
            });
        }

        let payload = payload.map_err(|err| BackendError::Malformed(err.to_string()))?;
        let text = extract_report_text(&payload)
            .ok_or_else(|| BackendError::Malformed("response has no candidates".into()))?;
        if text.trim().is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(text)
    }

    async fn structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: Value,
        temperature: f32,
    ) -> Result<T, BackendError> {
        let text = self
            .call(&self.structured_body(prompt, schema, temperature))
            .await?;
        serde_json::from_str(strip_code_fence(&text))
            .map_err(|err| BackendError::Malformed(err.to_string()))
    }
}

/// Drop a ```json fence some models wrap structured replies in.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Concatenate the text parts of the first candidate.
fn extract_report_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

fn parse_error_message(status: u16, payload: Option<&Value>) -> String {
    payload
        .and_then(|p| p.get("error"))
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Gemini request failed with status {status}"))
}

#[async_trait]
impl ReportBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ReportRequest<'_>) -> Result<String, BackendError> {
        let body = self.request_body(&request);
        debug!(role = %request.role, model = %self.model, "sending report request");
        self.call(&body).await
    }
}

#[async_trait]
impl CampaignPlanner for GeminiBackend {
    fn label(&self) -> &str {
        &self.model
    }

    async fn strategy_matrix(
        &self,
        subject: &Subject,
        intent: &str,
    ) -> Result<StrategyMatrix, BackendError> {
        debug!(subject = %subject.id, model = %self.model, "requesting strategy matrix");
        let matrix: StrategyMatrix = self
            .structured(
                &prompts::matrix_request(subject, intent),
                matrix::matrix_schema(),
                MATRIX_TEMPERATURE,
            )
            .await?;
        if matrix.is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(matrix)
    }

    async fn viral_payloads(
        &self,
        subject: &Subject,
        avatar: &AudienceAvatar,
        angle: &NarrativeAngle,
    ) -> Result<Vec<ViralPayload>, BackendError> {
        debug!(
            subject = %subject.id,
            avatar = %avatar.name,
            angle = %angle.name,
            "requesting payloads"
        );
        let batch: PayloadBatch = self
            .structured(
                &prompts::payload_request(subject, avatar, angle),
                matrix::payload_schema(),
                self.temperature,
            )
            .await?;
        if batch.payloads.is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(batch.payloads)
    }
}
