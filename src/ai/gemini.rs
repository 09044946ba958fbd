//! Google Gemini `generateContent` backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_structured_response, response_schema, SolveRequest, Solver, SYSTEM_INSTRUCTION, TEMPERATURE};
use crate::error::SolveError;
use crate::state::MathResponse;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiContent,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    // Thought signatures and other parts we never read.
    Other(Value),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(request: &SolveRequest) -> GeminiRequest {
        let mut parts = Vec::new();

        // File goes first so the prompt can refer to it.
        if let Some(file) = &request.attachment {
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: file.mime_type.clone(),
                    data: file.data.clone(),
                },
            });
        }
        parts.push(GeminiPart::Text {
            text: request.prompt.clone(),
        });

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: gemini_schema(response_schema()),
                temperature: TEMPERATURE,
            },
        }
    }

    fn response_text(body: &str) -> Result<String, SolveError> {
        let response: GeminiResponse = serde_json::from_str(body)
            .map_err(|e| SolveError::ResponseShape(format!("unreadable body: {e}")))?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| SolveError::ResponseShape("no candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| match part {
                GeminiPart::Text { text } => Some(text),
                _ => None,
            })
            .collect();

        Ok(text)
    }
}

#[async_trait]
impl Solver for GeminiClient {
    async fn solve(&self, request: &SolveRequest) -> Result<MathResponse, SolveError> {
        let api_key = request
            .credential
            .as_deref()
            .ok_or(SolveError::CredentialMissing)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&Self::build_request(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(SolveError::Request(format!("Gemini API error {}: {}", status, message)));
        }

        parse_structured_response(&Self::response_text(&body)?)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Gemini expects upper-case OpenAPI type names ("OBJECT", "STRING").
fn gemini_schema(mut schema: Value) -> Value {
    match &mut schema {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if key == "type" {
                    if let Value::String(s) = value {
                        *s = s.to_uppercase();
                    }
                } else {
                    *value = gemini_schema(value.take());
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                *item = gemini_schema(item.take());
            }
        }
        _ => {}
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::EncodedAttachment;
    use crate::config::Credential;
    use serde_json::json;

    #[test]
    fn test_request_puts_file_before_prompt() {
        let request = SolveRequest::new(
            "",
            Some(EncodedAttachment {
                data: "aGVsbG8=".to_string(),
                mime_type: "image/png".to_string(),
                file_name: "bai.png".to_string(),
                size_bytes: 5,
            }),
            Credential::Present("key".to_string()),
        );

        let body = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "aGVsbG8=");
        assert_eq!(parts[1]["text"], crate::ai::FALLBACK_PROMPT);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["properties"]["hint"]["type"],
            "STRING"
        );
        assert!(body["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_text_only_request_has_single_part() {
        let request = SolveRequest::new("1+1?", None, Credential::Absent);
        let body = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["parts"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_response_text_joins_text_parts() {
        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "{\"theory\":\"t\","}, {"text": "\"hint\":\"h\",\"solution\":\"s\"}"}]
                },
                "finishReason": "STOP"
            }]
        })
        .to_string();

        let text = GeminiClient::response_text(&body).unwrap();
        let data = parse_structured_response(&text).unwrap();
        assert_eq!(data.solution, "s");
    }

    #[test]
    fn test_no_candidates_is_shape_error() {
        let err = GeminiClient::response_text(r#"{"candidates":[]}"#).unwrap_err();
        assert!(matches!(err, SolveError::ResponseShape(_)));
    }

    #[tokio::test]
    async fn test_absent_credential_fails_without_network() {
        // Unroutable base URL: the credential check must come first.
        let client = GeminiClient::new("http://127.0.0.1:9", "gemini-2.5-flash");
        let request = SolveRequest::new("x", None, Credential::Absent);
        let err = client.solve(&request).await.unwrap_err();
        assert!(matches!(err, SolveError::CredentialMissing));
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new("https://generativelanguage.googleapis.com/", "gemini-2.5-flash");
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
