/// Structured-generation classification.
///
/// Candidates are rendered as a numbered list into a prompt, and a text-generation backend
/// is asked for a JSON object matching `SelectionResponse`. Anything that goes wrong
/// (transport, non-JSON output, schema mismatch, index out of range) falls back to the
/// first candidate with a fixed confidence and warning.
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::classifier::{CandidateSet, ClassificationDecision, Classifier, ClassifyOutcome};
use classify_common::openai::{
    ChatCompletionRequest, Message, OpenAiClient, OpenAiClientError, ResponseFormat,
};

pub const FALLBACK_CONFIDENCE: f64 = 0.5;
pub const FALLBACK_WARNING: &str = "Fallback due to error.";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SCHEMA_NAME: &str = "classification_result";

/// The object the generation backend must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectionResponse {
    /// an integer representing the chosen candidate's number (0-indexed)
    pub selected_index: i64,
    /// a float between 0 and 1 indicating your confidence level in this classification
    pub confidence: f64,
    /// a string containing a warning message if the classification is ambiguous, or an empty string if not
    #[serde(default)]
    pub warning: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Client(#[from] OpenAiClientError),

    #[error("generation returned no content")]
    EmptyResponse,

    #[error("generation output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Produces a JSON value for a prompt, guided by a JSON Schema.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
enum SelectionError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("response does not match the selection schema: {0}")]
    Schema(serde_json::Error),

    #[error("selected_index {index} is outside 0..{len}")]
    OutOfRange { index: i64, len: usize },
}

pub struct LlmClassifier {
    generator: Arc<dyn TextGenerator>,
    schema: Value,
    format_instructions: String,
}

impl LlmClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        let mut schema = schemars::schema_for!(SelectionResponse).to_value();
        require_all_properties(&mut schema);
        let format_instructions = format_instructions(&schema);
        Self {
            generator,
            schema,
            format_instructions,
        }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn render_prompt(&self, line_item: &str, candidates: &CandidateSet<'_>) -> String {
        format!(
            "You are a classification expert. Given the following invoice line item:\n\n\
             Line item: \"{line_item}\"\n\n\
             And the following candidate categories:\n\
             {}\n\n\
             Please select the candidate category that best matches the invoice line item.\n\
             {}",
            render_candidates(candidates),
            self.format_instructions
        )
    }

    async fn select(
        &self,
        line_item: &str,
        candidates: &CandidateSet<'_>,
    ) -> Result<ClassificationDecision, SelectionError> {
        let prompt = self.render_prompt(line_item, candidates);
        let raw = self.generator.generate(&prompt, &self.schema).await?;
        let response: SelectionResponse =
            serde_json::from_value(raw).map_err(SelectionError::Schema)?;

        let index = checked_index(response.selected_index, candidates.len())?;
        let category = candidates.get(index).ok_or(SelectionError::OutOfRange {
            index: response.selected_index,
            len: candidates.len(),
        })?;
        Ok(ClassificationDecision::new(
            category,
            response.confidence,
            Some(response.warning),
        ))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, query: &str, candidates: &CandidateSet<'_>) -> ClassifyOutcome {
        match self.select(query, candidates).await {
            Ok(decision) => {
                debug!(
                    category = %decision.category,
                    confidence = decision.confidence,
                    "generation selected candidate"
                );
                ClassifyOutcome::Decided(decision)
            }
            Err(e) => {
                warn!(error = %e, "classification by generation failed, falling back to first candidate");
                ClassifyOutcome::Decided(ClassificationDecision::new(
                    candidates.first(),
                    FALLBACK_CONFIDENCE,
                    Some(FALLBACK_WARNING.to_string()),
                ))
            }
        }
    }
}

/// Valid positions are `0..len`; `len` itself is out of range.
fn checked_index(index: i64, len: usize) -> Result<usize, SelectionError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(SelectionError::OutOfRange { index, len })
}

/// One line per candidate, numbered from 1.
pub fn render_candidates(candidates: &CandidateSet<'_>) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, (_, c))| {
            format!(
                "{}. Code: {}, Name: {}, Description: {}",
                i + 1,
                c.code(),
                c.name(),
                c.description_or_name()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mark every property as required; `#[serde(default)]` fields are otherwise left optional.
fn require_all_properties(schema: &mut Value) {
    let Some(names) = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.keys().cloned().map(Value::String).collect())
    else {
        return;
    };
    schema["required"] = Value::Array(names);
}

fn format_instructions(schema: &Value) -> String {
    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
         Here is the output schema:\n```\n{schema}\n```"
    )
}

/// `TextGenerator` over an OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerator {
    client: Arc<OpenAiClient>,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<OpenAiClient>, model: &str, temperature: f32) -> Self {
        Self {
            client,
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, GenerationError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            temperature: Some(self.temperature),
            max_tokens: None,
            response_format: Some(ResponseFormat::json_schema(SCHEMA_NAME, schema.clone())),
        };
        let response = self.client.chat_completions(&request, None).await?;
        if let Some(usage) = &response.usage {
            debug!(
                id = response.id.as_deref().unwrap_or(""),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "generation usage"
            );
        }
        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)?;
        Ok(serde_json::from_str(strip_code_fence(content))?)
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
