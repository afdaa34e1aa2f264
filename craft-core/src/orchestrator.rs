use std::sync::Arc;

use craft_mesh::export_wireframe;
use craft_sched::{PipelineTask, TaskQueue};
use craft_store::{artifact_exists, artifact_key, image_key, read_artifact, BlobStore};
use craft_types::{
    ArtifactKind, AssemblyStep, FabricationStep, ImageKind, JoinPolicy, Part, PartIndex,
    PartName, PartSummary, PlacedPart, PlanId, PlanState,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::readiness::ReadinessGate;
use crate::PipelineError;

/// Body of a single assembly-step read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssemblyProcedure {
    pub step: u32,
    pub description: String,
    /// Wireframe export of the parts in place by this step.
    pub model: String,
}

/// Request-facing side of the pipeline. Reads never wait for background work; they enqueue
/// downstream stages whose inputs are present and return what storage holds right now.
pub struct PipelineOrchestrator {
    store: Arc<dyn BlobStore>,
    queue: Arc<dyn TaskQueue>,
    gate: ReadinessGate,
    join: JoinPolicy,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<dyn BlobStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            gate: ReadinessGate::new(store.clone()),
            store,
            queue,
            join: JoinPolicy::default(),
        }
    }

    pub fn with_join_policy(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn parse_plan(raw: &str) -> Result<PlanId, PipelineError> {
        raw.parse()
            .map_err(|_| PipelineError::InvalidPlanId(raw.to_string()))
    }

    /// Work out the image type from a file name and/or declared MIME type.
    pub fn image_kind(
        file_name: Option<&str>,
        mime: Option<&str>,
    ) -> Result<ImageKind, PipelineError> {
        let by_ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .and_then(|(_, ext)| ImageKind::from_extension(ext));
        by_ext
            .or_else(|| mime.and_then(ImageKind::from_mime))
            .ok_or_else(|| {
                PipelineError::UnsupportedImage(
                    file_name.or(mime).unwrap_or("unnamed upload").to_string(),
                )
            })
    }

    /// Store the photograph under a fresh plan and schedule part detection.
    pub async fn submit_image(
        &self,
        bytes: Vec<u8>,
        kind: ImageKind,
    ) -> Result<PlanId, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::UnsupportedImage("empty upload".into()));
        }
        let plan = PlanId::new();
        let key = image_key(plan, kind.extension());
        self.store.write_bytes(&key, bytes, kind.mime()).await?;
        info!(plan_id = %plan, key = %key, "[upload] image stored");
        self.trigger(PipelineTask::DetectParts(plan)).await;
        Ok(plan)
    }

    /// Parts summary. Schedules placement when no parts3d exists yet.
    pub async fn parts_list(&self, plan: PlanId) -> Result<Vec<PartSummary>, PipelineError> {
        let parts: Vec<Part> = self.require(plan, ArtifactKind::PartsList).await?;
        self.require_image(plan).await?;
        if !artifact_exists(self.store.as_ref(), plan, ArtifactKind::Parts3d).await? {
            self.trigger(PipelineTask::EstimatePlacement(plan)).await;
        }
        Ok(PartSummary::from_parts(&parts))
    }

    /// Whole-model wireframe. (Re-)schedules both manual stages.
    pub async fn model(&self, plan: PlanId) -> Result<String, PipelineError> {
        self.require::<Vec<Part>>(plan, ArtifactKind::PartsList).await?;
        let placed: Vec<PlacedPart> = self.require(plan, ArtifactKind::Parts3d).await?;
        self.require_image(plan).await?;
        let text = export_wireframe(&placed);
        self.trigger(PipelineTask::FabricationManual(plan)).await;
        self.trigger(PipelineTask::AssemblyManual(plan)).await;
        Ok(text)
    }

    pub async fn parts_manual(&self, plan: PlanId) -> Result<Vec<FabricationStep>, PipelineError> {
        let steps = self.require(plan, ArtifactKind::PartsManual).await?;
        self.trigger_render(plan).await;
        Ok(steps)
    }

    pub async fn assembly_step_count(&self, plan: PlanId) -> Result<usize, PipelineError> {
        let steps: Vec<AssemblyStep> = self.require(plan, ArtifactKind::AssemblyManual).await?;
        Ok(steps.len())
    }

    /// One assembly step with the geometry of the parts it has placed so far.
    pub async fn assembly_step(
        &self,
        plan: PlanId,
        procedure: i64,
    ) -> Result<AssemblyProcedure, PipelineError> {
        if procedure < 1 {
            return Err(PipelineError::InvalidProcedure(procedure));
        }
        let steps: Vec<AssemblyStep> = self.require(plan, ArtifactKind::AssemblyManual).await?;
        let step = usize::try_from(procedure - 1)
            .ok()
            .and_then(|i| steps.get(i))
            .ok_or(PipelineError::ProcedureOutOfRange {
                requested: procedure,
                count: steps.len(),
            })?;
        let number = procedure as u32;

        let placed: Vec<PlacedPart> = self.require(plan, ArtifactKind::Parts3d).await?;
        let index = PartIndex::new(&placed)?;
        let used = index.select(
            step.parts_already_used.iter().map(PartName::as_str),
            self.join,
        )?;
        if used.is_empty() {
            return Err(PipelineError::NoGeometry(number));
        }
        let model = export_wireframe(used);
        self.trigger_render(plan).await;
        Ok(AssemblyProcedure {
            step: number,
            description: step.description.clone(),
            model,
        })
    }

    pub async fn document(&self, plan: PlanId) -> Result<Vec<u8>, PipelineError> {
        let key = artifact_key(plan, ArtifactKind::DesignDocument);
        self.store
            .read_bytes(&key)
            .await?
            .ok_or_else(|| not_ready(plan, ArtifactKind::DesignDocument.file_name()))
    }

    pub async fn is_ready(&self, plan: PlanId, kind: ArtifactKind) -> Result<bool, PipelineError> {
        self.gate.is_ready(plan, kind).await
    }

    pub async fn state(&self, plan: PlanId) -> Result<PlanState, PipelineError> {
        self.gate.state(plan).await
    }

    async fn require<T: DeserializeOwned>(
        &self,
        plan: PlanId,
        kind: ArtifactKind,
    ) -> Result<T, PipelineError> {
        match read_artifact(self.store.as_ref(), plan, kind).await? {
            Some(v) => Ok(v),
            None => {
                warn!(plan_id = %plan, artifact = %kind, "[read] artifact not found");
                Err(not_ready(plan, kind.file_name()))
            }
        }
    }

    async fn require_image(&self, plan: PlanId) -> Result<(), PipelineError> {
        if self.gate.image_present(plan).await? {
            Ok(())
        } else {
            warn!(plan_id = %plan, "[read] image not found");
            Err(not_ready(plan, "image"))
        }
    }

    /// Schedule rendering when both manuals exist. Like submission, a failed check only warns.
    async fn trigger_render(&self, plan: PlanId) {
        let both = async {
            Ok::<_, PipelineError>(
                self.gate.is_ready(plan, ArtifactKind::PartsManual).await?
                    && self.gate.is_ready(plan, ArtifactKind::AssemblyManual).await?,
            )
        };
        match both.await {
            Ok(true) => self.trigger(PipelineTask::RenderDocument(plan)).await,
            Ok(false) => {}
            Err(e) => warn!(plan_id = %plan, error = %e, "[trigger] could not check manuals"),
        }
    }

    /// Submission failures never fail the read that caused them.
    async fn trigger(&self, task: PipelineTask) {
        match self.queue.submit(task).await {
            Ok(()) => info!(task = %task, "[trigger] scheduled"),
            Err(e) => warn!(task = %task, error = %e, "[trigger] could not schedule"),
        }
    }
}

fn not_ready(plan: PlanId, what: &str) -> PipelineError {
    PipelineError::NotReady {
        plan,
        what: what.to_string(),
    }
}
