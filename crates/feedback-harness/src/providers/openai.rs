//! OpenAI chat and embedding providers.

use feedback_harness_core::models::{ChatMessage, Role, ToolCallRequest};
use feedback_harness_core::provider::{ChatModel, Completion, Embedder, TokenUsage, ToolSpec};
use feedback_harness_core::{HarnessError, Result};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{http_client, send_json_with_retry};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Per-million-token USD prices for cost estimation. Models outside
/// this table report zero cost rather than a guess.
fn price_per_million(model: &str) -> Option<(f64, f64)> {
    if model.starts_with("gpt-4o-mini") {
        Some((0.15, 0.60))
    } else if model.starts_with("gpt-4o") {
        Some((2.50, 10.00))
    } else {
        None
    }
}

fn api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| HarnessError::MissingCredential("OPENAI_API_KEY".to_string()))
}

/// Chat completions with tool calling.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f64,
    max_retries: u32,
}

impl OpenAiChat {
    /// Fails fast when `OPENAI_API_KEY` is not set.
    pub fn new(model: &str, temperature: f64, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key: api_key()?,
            model: model.to_string(),
            temperature,
            max_retries,
        })
    }

    fn render_message(message: &ChatMessage) -> Value {
        match message.role {
            Role::System => json!({"role": "system", "content": message.content}),
            Role::User => json!({"role": "user", "content": message.content}),
            Role::Assistant => {
                if message.tool_calls.is_empty() {
                    json!({"role": "assistant", "content": message.content})
                } else {
                    let calls: Vec<Value> = message
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {"name": call.name, "arguments": call.arguments},
                            })
                        })
                        .collect();
                    json!({
                        "role": "assistant",
                        "content": message.content,
                        "tool_calls": calls,
                    })
                }
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id,
                "content": message.content,
            }),
        }
    }

    fn render_tool(spec: &ToolSpec) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": spec.name,
                "description": spec.description,
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "The search query"},
                    },
                    "required": ["query"],
                },
            },
        })
    }

    fn parse_completion(&self, body: Value) -> Result<Completion> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| {
                HarnessError::MalformedResponse(format!("chat response without choices: {body}"))
            })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
            for call in calls {
                let id = call.get("id").and_then(|v| v.as_str());
                let function = call.get("function");
                let name = function.and_then(|f| f.get("name")).and_then(|v| v.as_str());
                let arguments = function
                    .and_then(|f| f.get("arguments"))
                    .and_then(|v| v.as_str());
                match (id, name, arguments) {
                    (Some(id), Some(name), Some(arguments)) => tool_calls.push(ToolCallRequest {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    }),
                    _ => {
                        // Unparseable tool-call syntax: surface the raw
                        // text so the loop can fall back to it.
                        return Err(HarnessError::MalformedResponse(content));
                    }
                }
            }
        }

        let usage = body.get("usage").map(|usage| {
            let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            let completion = usage
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let cost_usd = price_per_million(&self.model)
                .map(|(input, output)| {
                    (prompt as f64 * input + completion as f64 * output) / 1_000_000.0
                })
                .unwrap_or(0.0);
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                cost_usd,
            }
        });

        let message = if tool_calls.is_empty() {
            ChatMessage::assistant(content)
        } else {
            ChatMessage::assistant_with_tools(content, tool_calls)
        };
        Ok(Completion { message, usage })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion> {
        let rendered: Vec<Value> = messages.iter().map(Self::render_message).collect();
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": rendered,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(Self::render_tool).collect());
        }

        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion");
        let request = self
            .client
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body);
        let response = send_json_with_retry(request, self.max_retries, "OpenAI chat").await?;
        self.parse_completion(response)
    }
}

/// Batched embeddings via `POST /v1/embeddings`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(model: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key: api_key()?,
            model: model.to_string(),
            max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({"model": self.model, "input": texts});
        let request = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&body);
        let response =
            send_json_with_retry(request, self.max_retries, "OpenAI embeddings").await?;

        let data = response.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
            HarnessError::MalformedResponse("embeddings response missing data array".to_string())
        })?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let vector = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| {
                    HarnessError::MalformedResponse(
                        "embeddings response item missing embedding".to_string(),
                    )
                })?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            embeddings.push(vector);
        }
        Ok(embeddings)
    }
}
