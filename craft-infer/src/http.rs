use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info};

use crate::{unwrap_response, GenerationError, GenerationRequest, GenerationService};

/// Generation Service reached over HTTP.
///
/// Each call is a multipart POST to `{base_url}/generate` carrying the stage name, the JSON
/// payload and the optional image. The response body is the raw wrapped text.
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerationService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, req: GenerationRequest) -> Result<Value, GenerationError> {
        let url = format!("{}/generate", self.base_url.trim_end_matches('/'));
        let stage = req.stage;

        let mut form = Form::new()
            .text("stage", stage.as_str())
            .text("payload", req.payload.to_string());
        if let Some(image) = req.image {
            let part = Part::bytes(image.bytes)
                .file_name(format!("image.{}", image.kind.extension()))
                .mime_str(image.kind.mime())
                .map_err(|e| GenerationError::Transport(e.to_string()))?;
            form = form.part("image", part);
        }

        info!(%stage, %url, "[generation] request");
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("HTTP error: {e}")))?;

        if !resp.status().is_success() {
            return Err(GenerationError::Status(resp.status().as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| GenerationError::Transport(format!("body error: {e}")))?;
        debug!(%stage, len = body.len(), "[generation] response received");
        unwrap_response(stage, &body)
    }
}
