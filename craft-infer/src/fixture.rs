use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use craft_types::StageKind;
use serde_json::Value;

use crate::{GenerationError, GenerationRequest, GenerationService};

/// Canned outputs per stage. Stands in for the real service in stub mode and in tests.
pub struct StaticGenerationService {
    outputs: HashMap<StageKind, Value>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl StaticGenerationService {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, stage: StageKind, output: Value) -> Self {
        self.outputs.insert(stage, output);
        self
    }

    /// Load a JSON object keyed by stage name, e.g. `{"parts_detection": [...]}`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(path)?;
        let raw: HashMap<String, Value> = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut outputs = HashMap::new();
        for (name, value) in raw {
            let stage = StageKind::from_name(&name).ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown stage {name:?} in fixtures"),
                )
            })?;
            outputs.insert(stage, value);
        }
        Ok(Self {
            outputs,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Requests seen so far, in call order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, stage: StageKind) -> usize {
        self.calls().iter().filter(|r| r.stage == stage).count()
    }
}

impl Default for StaticGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for StaticGenerationService {
    async fn generate(&self, req: GenerationRequest) -> Result<Value, GenerationError> {
        let stage = req.stage;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(req);
        }
        self.outputs
            .get(&stage)
            .cloned()
            .ok_or(GenerationError::NoFixture { stage })
    }
}
