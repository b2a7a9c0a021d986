//! Backend for the Gemini API.
//!
//! Endpoint: `POST {base}/v1beta/models/{model}:generateContent`.
//! Auth: `x-goog-api-key` header. Structured stages send
//! `responseMimeType: application/json` plus a `responseSchema`; tools map to
//! `{"google_search": {}}` and `{"code_execution": {}}`.

use super::{Backend, LlmRequest, LlmResponse, Tool};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Default public endpoint of the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Backend for Google's Gemini `generateContent` API.
///
/// The API key is handed in explicitly; nothing is read from or written to
/// the process environment.
///
/// ```
/// use leftover_chef::backend::GeminiBackend;
///
/// let backend = GeminiBackend::new("AIza-example");
/// assert!(format!("{:?}", backend).contains("***"));
/// ```
#[derive(Clone)]
pub struct GeminiBackend {
    api_key: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = match self.api_key.get(..4) {
            Some(prefix) if self.api_key.len() > 8 => format!("{}***", prefix),
            _ => "***".to_string(),
        };
        f.debug_struct("GeminiBackend")
            .field("api_key", &redacted)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    fn endpoint(base_url: &str, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        )
    }

    /// Build the request body for `:generateContent`.
    fn build_body(request: &LlmRequest) -> Value {
        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.config.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = request.config.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(ref schema) = request.response_schema {
            generation_config.insert("responseMimeType".into(), json!("application/json"));
            generation_config.insert("responseSchema".into(), schema.clone());
        }

        let mut body = json!({
            "contents": [
                { "role": "user", "parts": [{ "text": request.prompt }] }
            ],
        });
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        if let Some(ref sys) = request.system_instruction {
            if !sys.is_empty() {
                body["systemInstruction"] = json!({ "parts": [{ "text": sys }] });
            }
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| match tool {
                    Tool::GoogleSearch => json!({ "google_search": {} }),
                    Tool::CodeExecution => json!({ "code_execution": {} }),
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }

    /// Concatenate the text parts of the first candidate.
    ///
    /// With code execution enabled the model may answer only with an
    /// execution result; that output is used when no text part exists.
    fn extract_text(json_resp: &Value) -> String {
        let parts = json_resp
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array);
        let Some(parts) = parts else {
            return String::new();
        };

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect();
        if !text.is_empty() {
            return text;
        }

        parts
            .iter()
            .filter_map(|p| p.pointer("/codeExecutionResult/output").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        if let Some(v) = json_resp.get("usageMetadata") {
            meta.insert("usage".into(), v.clone());
        }
        if let Some(v) = json_resp.get("modelVersion") {
            meta.insert("model".into(), v.clone());
        }
        if let Some(v) = json_resp.pointer("/candidates/0/finishReason") {
            meta.insert("finish_reason".into(), v.clone());
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
    }

    fn build_http_request(&self, client: &Client, url: &str, body: &Value) -> reqwest::RequestBuilder {
        client
            .post(url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(body)
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = Self::endpoint(base_url, &request.model);
        let body = Self::build_body(request);

        let resp = self.build_http_request(client, &url, &body).send().await?;
        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body: text,
                retry_after,
            });
        }

        let json_resp: Value = resp.json().await?;
        let text = Self::extract_text(&json_resp);
        if text.is_empty() {
            let reason = json_resp
                .pointer("/promptFeedback/blockReason")
                .or_else(|| json_resp.pointer("/candidates/0/finishReason"))
                .and_then(Value::as_str)
                .unwrap_or("no content");
            return Err(PipelineError::StageFailed {
                stage: request.stage.clone(),
                message: format!("model returned an empty reply ({})", reason),
            });
        }

        Ok(LlmResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationConfig;
    use crate::schema::OutputSchema;

    fn test_request() -> LlmRequest {
        LlmRequest {
            stage: "RecipeThinker".into(),
            model: "gemini-2.5-flash-lite".into(),
            system_instruction: Some("Find a healthy recipe.".into()),
            prompt: "Use this user input as a list of leftovers: eggs".into(),
            config: GenerationConfig::default(),
            tools: Vec::new(),
            response_schema: None,
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            GeminiBackend::endpoint("https://generativelanguage.googleapis.com/", "gemini-2.5-flash-lite"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
    }

    #[test]
    fn test_body_text_stage() {
        let body = GeminiBackend::build_body(&test_request());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "Use this user input as a list of leftovers: eggs"
        );
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Find a healthy recipe."
        );
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_body_sampling_only_when_set() {
        let mut request = test_request();
        request.config = GenerationConfig::default().with_max_tokens(512);
        let body = GeminiBackend::build_body(&request);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
        assert!(body["generationConfig"].get("temperature").is_none());

        request.config = request.config.with_temperature(0.2);
        let body = GeminiBackend::build_body(&request);
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
    }

    #[test]
    fn test_body_tools() {
        let mut request = test_request();
        request.tools = vec![Tool::GoogleSearch, Tool::CodeExecution];
        let body = GeminiBackend::build_body(&request);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools[0].get("google_search").is_some());
        assert!(tools[1].get("code_execution").is_some());
    }

    #[test]
    fn test_body_structured_stage() {
        let mut request = test_request();
        request.response_schema = Some(OutputSchema::ShoppingList.response_schema());
        let body = GeminiBackend::build_body(&request);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body["generationConfig"].get("temperature").is_none());
        assert_eq!(
            body["generationConfig"]["responseSchema"]["properties"]["items"]["type"],
            "ARRAY"
        );
    }

    #[test]
    fn test_body_empty_system_instruction_omitted() {
        let mut request = test_request();
        request.system_instruction = Some(String::new());
        let body = GeminiBackend::build_body(&request);
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"items\":" }, { "text": " []}" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "totalTokenCount": 12 }
        });
        assert_eq!(GeminiBackend::extract_text(&resp), "{\"items\": []}");
        let meta = GeminiBackend::extract_metadata(&resp).unwrap();
        assert_eq!(meta["finish_reason"], "STOP");
        assert_eq!(meta["usage"]["totalTokenCount"], 12);
    }

    #[test]
    fn test_extract_text_falls_back_to_code_result() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [
                    { "executableCode": { "language": "PYTHON", "code": "print(1)" } },
                    { "codeExecutionResult": { "outcome": "OUTCOME_OK", "output": "1\n" } }
                ] }
            }]
        });
        assert_eq!(GeminiBackend::extract_text(&resp), "1\n");
    }

    #[test]
    fn test_extract_text_no_candidates() {
        assert_eq!(GeminiBackend::extract_text(&json!({})), "");
    }

    #[test]
    fn test_auth_header() {
        let backend = GeminiBackend::new("AIza-secret-key");
        let req = backend
            .build_http_request(&Client::new(), "https://example.test/v1beta", &json!({}))
            .build()
            .expect("build request");
        assert_eq!(req.headers().get("x-goog-api-key").unwrap(), "AIza-secret-key");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let debug = format!("{:?}", GeminiBackend::new("AIza1234567890"));
        assert!(!debug.contains("1234567890"));
        assert!(debug.contains("AIza***"));
        assert_eq!(
            format!("{:?}", GeminiBackend::new("short")),
            "GeminiBackend { api_key: \"***\" }"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            GeminiBackend::parse_retry_after(" 30 "),
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(GeminiBackend::parse_retry_after("soon"), None);
    }
}
