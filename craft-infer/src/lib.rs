use async_trait::async_trait;
use craft_types::{SourceImage, StageKind};
use serde_json::Value;
use thiserror::Error;

pub mod http;
pub use http::HttpGenerationService;

pub mod fixture;
pub use fixture::StaticGenerationService;

/// Name of the wrapping field whose string content carries the stage output.
pub const RESPONSE_FIELD: &str = "response";

/// One call into the Generation Service.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub stage: StageKind,
    pub payload: Value,
    pub image: Option<SourceImage>,
}

impl GenerationRequest {
    pub fn new(stage: StageKind, payload: Value) -> Self {
        Self {
            stage,
            payload,
            image: None,
        }
    }

    pub fn with_image(mut self, image: SourceImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation transport error: {0}")]
    Transport(String),
    #[error("generation service returned status {0}")]
    Status(u16),
    #[error("{stage}: empty response")]
    Empty { stage: StageKind },
    #[error("{stage}: response is not text")]
    NotText { stage: StageKind },
    #[error("{stage}: response is not a JSON object with a \"response\" string: {detail}")]
    MissingField { stage: StageKind, detail: String },
    #[error("{stage}: \"response\" field is not valid JSON: {detail}")]
    InvalidPayload { stage: StageKind, detail: String },
    #[error("{stage}: no fixture configured")]
    NoFixture { stage: StageKind },
}

/// Opaque generative backend: structured payload in, parsed JSON out.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, req: GenerationRequest) -> Result<Value, GenerationError>;
}

/// Parse a raw service response: an outer JSON object whose `response` field holds the
/// stage output as a JSON string.
pub fn unwrap_response(stage: StageKind, raw: &[u8]) -> Result<Value, GenerationError> {
    let text = std::str::from_utf8(raw).map_err(|_| GenerationError::NotText { stage })?;
    if text.trim().is_empty() {
        return Err(GenerationError::Empty { stage });
    }
    let outer: Value = serde_json::from_str(text).map_err(|e| GenerationError::MissingField {
        stage,
        detail: e.to_string(),
    })?;
    let inner = outer
        .get(RESPONSE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| GenerationError::MissingField {
            stage,
            detail: format!("got {}", truncate(text, 120)),
        })?;
    serde_json::from_str(strip_code_fence(inner)).map_err(|e| GenerationError::InvalidPayload {
        stage,
        detail: format!("{e}: {}", truncate(inner, 120)),
    })
}

/// Models sometimes wrap JSON in a Markdown fence.
fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
