pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::attachment::EncodedAttachment;
use crate::config::{Credential, Settings};
use crate::error::SolveError;
use crate::provider::Provider;
use crate::state::MathResponse;

/// Sent instead of the user's text when only a file was given.
pub const FALLBACK_PROMPT: &str = "Hãy giải bài toán trong hình/tài liệu này. Nếu không thấy bài toán cụ thể, hãy tóm tắt nội dung toán học chính.";

pub const SYSTEM_INSTRUCTION: &str = "Bạn là 'ĐM Bài tập về nhà', trợ lý AI giúp học sinh học Toán. \
Hãy giải bài tập một cách sư phạm, dễ hiểu và luôn trả lời bằng tiếng Việt. \
Mọi công thức toán học phải viết bằng LaTeX, đặt trong cặp dấu $ (ví dụ $x^2 + 2x + 1 = 0$). \
Chỉ trả về một đối tượng JSON hợp lệ với ba trường theory, hint và solution.";

pub const TEMPERATURE: f32 = 0.2;

/// One solve call: the prompt, the optional file, and the credential the
/// controller was configured with.
#[derive(Debug, Clone)]
pub struct SolveRequest {
    pub prompt: String,
    pub attachment: Option<EncodedAttachment>,
    pub credential: Credential,
}

impl SolveRequest {
    /// Build a request, substituting `FALLBACK_PROMPT` for blank text.
    pub fn new(text: &str, attachment: Option<EncodedAttachment>, credential: Credential) -> Self {
        let prompt = if text.trim().is_empty() {
            FALLBACK_PROMPT.to_string()
        } else {
            text.to_string()
        };

        Self {
            prompt,
            attachment,
            credential,
        }
    }
}

/// A backend that turns a question into a structured tutoring answer.
#[async_trait]
pub trait Solver: Send + Sync {
    async fn solve(&self, request: &SolveRequest) -> Result<MathResponse, SolveError>;

    /// Label for the header, e.g. "gemini-2.5-flash".
    fn model_id(&self) -> &str;
}

/// Build the solver for the resolved settings.
pub fn build_solver(settings: &Settings) -> Arc<dyn Solver> {
    match settings.provider {
        Provider::Gemini => Arc::new(GeminiClient::new(&settings.base_url, &settings.model)),
        Provider::Ollama => Arc::new(OllamaClient::new(&settings.base_url, &settings.model)),
    }
}

/// JSON schema for the structured answer, shared by both backends.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "theory": {
                "type": "string",
                "description": "Nhắc lại kiến thức, định lý, công thức liên quan cần để giải bài. Dùng LaTeX cho công thức."
            },
            "hint": {
                "type": "string",
                "description": "Hướng dẫn ngắn gọn các bước tiếp cận, không đi vào tính toán chi tiết."
            },
            "solution": {
                "type": "string",
                "description": "Lời giải chi tiết từng bước, có phép tính và kết quả cuối cùng. Dùng LaTeX cho công thức."
            }
        },
        "required": ["theory", "hint", "solution"]
    })
}

#[derive(Deserialize)]
struct RawResponse {
    theory: Option<String>,
    hint: Option<String>,
    solution: Option<String>,
}

/// Parse model output into a `MathResponse`. Empty text, invalid JSON or a
/// missing field are all shape errors.
pub fn parse_structured_response(text: &str) -> Result<MathResponse, SolveError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(SolveError::ResponseShape("empty response".to_string()));
    }

    let raw: RawResponse = serde_json::from_str(body)
        .map_err(|e| SolveError::ResponseShape(format!("invalid JSON: {e}")))?;

    let field = |value: Option<String>, name: &str| {
        value.ok_or_else(|| SolveError::ResponseShape(format!("missing field `{name}`")))
    };

    Ok(MathResponse {
        theory: field(raw.theory, "theory")?,
        hint: field(raw.hint, "hint")?,
        solution: field(raw.solution, "solution")?,
    })
}

// Local models sometimes wrap JSON in ```json fences despite the format flag.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
