use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_structured_response, response_schema, SolveRequest, Solver, SYSTEM_INSTRUCTION, TEMPERATURE};
use crate::error::SolveError;
use crate::state::MathResponse;

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
    format: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Local Ollama backend. Needs no credential; only image attachments can be
/// sent since `/api/generate` has no document input.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn build_request(&self, request: &SolveRequest) -> Result<OllamaRequest, SolveError> {
        let images = match &request.attachment {
            Some(file) if file.is_image() => vec![file.data.clone()],
            Some(file) => {
                return Err(SolveError::UnsupportedAttachment(format!(
                    "{} ({}) cannot be sent to Ollama",
                    file.file_name, file.mime_type
                )))
            }
            None => Vec::new(),
        };

        Ok(OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: SYSTEM_INSTRUCTION.to_string(),
            stream: false,
            format: response_schema(),
            images,
            options: OllamaOptions {
                temperature: TEMPERATURE,
            },
        })
    }

    pub async fn list_models(&self) -> Result<Vec<String>, SolveError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SolveError::Request(format!("Failed to list models: {}", response.status())));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

#[async_trait]
impl Solver for OllamaClient {
    async fn solve(&self, request: &SolveRequest) -> Result<MathResponse, SolveError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = self.build_request(request)?;

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(SolveError::Request(format!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        parse_structured_response(&ollama_response.response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::EncodedAttachment;
    use crate::config::Credential;

    fn attachment(mime: &str) -> EncodedAttachment {
        EncodedAttachment {
            data: "AAAA".to_string(),
            mime_type: mime.to_string(),
            file_name: "file".to_string(),
            size_bytes: 3,
        }
    }

    #[test]
    fn test_image_goes_into_images_field() {
        let client = OllamaClient::new("http://localhost:11434/", "llava");
        let request = SolveRequest::new("", Some(attachment("image/jpeg")), Credential::Absent);

        let body = serde_json::to_value(client.build_request(&request).unwrap()).unwrap();
        assert_eq!(body["images"], serde_json::json!(["AAAA"]));
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"]["required"][1], "hint");
        assert_eq!(body["model"], "llava");
    }

    #[test]
    fn test_text_only_omits_images() {
        let client = OllamaClient::new("http://localhost:11434", "gemma3:latest");
        let request = SolveRequest::new("2+2", None, Credential::Absent);

        let body = serde_json::to_value(client.build_request(&request).unwrap()).unwrap();
        assert!(body.get("images").is_none());
    }

    #[test]
    fn test_pdf_is_unsupported() {
        let client = OllamaClient::new("http://localhost:11434", "gemma3:latest");
        let request = SolveRequest::new("", Some(attachment("application/pdf")), Credential::Absent);

        assert!(matches!(
            client.build_request(&request),
            Err(SolveError::UnsupportedAttachment(_))
        ));
    }
}
