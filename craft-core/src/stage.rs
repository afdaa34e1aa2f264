use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use craft_infer::{GenerationRequest, GenerationService};
use craft_manual::{ManualAssembler, ManualError};
use craft_sched::{PipelineTask, TaskExecutor};
use craft_store::{artifact_exists, find_image, read_artifact, write_artifact, BlobStore};
use craft_types::{
    ArtifactKind, AssemblyStep, FabricationStep, JoinPolicy, Part, PartIndex, PartName,
    PlacedPart, PlanId, SourceImage, StageKind,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::PipelineError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StageInput {
    Image,
    Artifact(ArtifactKind),
}

/// A generation stage: what it reads and the single artifact it writes.
#[derive(Clone, Copy, Debug)]
pub struct Stage {
    pub kind: StageKind,
    pub inputs: &'static [StageInput],
    pub output: ArtifactKind,
}

pub const STAGES: [Stage; 4] = [
    Stage {
        kind: StageKind::PartsDetection,
        inputs: &[StageInput::Image],
        output: ArtifactKind::PartsList,
    },
    Stage {
        kind: StageKind::PartsPlacement,
        inputs: &[StageInput::Image, StageInput::Artifact(ArtifactKind::PartsList)],
        output: ArtifactKind::Parts3d,
    },
    Stage {
        kind: StageKind::FabricationManual,
        inputs: &[
            StageInput::Artifact(ArtifactKind::PartsList),
            StageInput::Artifact(ArtifactKind::Parts3d),
        ],
        output: ArtifactKind::PartsManual,
    },
    Stage {
        kind: StageKind::AssemblyManual,
        inputs: &[StageInput::Image, StageInput::Artifact(ArtifactKind::Parts3d)],
        output: ArtifactKind::AssemblyManual,
    },
];

impl Stage {
    pub fn of(kind: StageKind) -> &'static Stage {
        match kind {
            StageKind::PartsDetection => &STAGES[0],
            StageKind::PartsPlacement => &STAGES[1],
            StageKind::FabricationManual => &STAGES[2],
            StageKind::AssemblyManual => &STAGES[3],
        }
    }
}

/// Placement only needs geometry-relevant attributes, so material is left out.
#[derive(Serialize)]
struct PlacementPart<'a> {
    name: &'a PartName,
    shape: &'a str,
    adjacent: &'a [PartName],
    size: &'a BTreeMap<String, f64>,
    shape_note: &'a str,
}

impl<'a> From<&'a Part> for PlacementPart<'a> {
    fn from(p: &'a Part) -> Self {
        Self {
            name: &p.name,
            shape: &p.shape,
            adjacent: &p.adjacent,
            size: &p.size,
            shape_note: &p.shape_note,
        }
    }
}

/// Executes pipeline tasks against the store and the Generation Service.
pub struct StageRunner {
    store: Arc<dyn BlobStore>,
    generator: Arc<dyn GenerationService>,
    manuals: Arc<ManualAssembler>,
    join: JoinPolicy,
}

impl StageRunner {
    pub fn new(
        store: Arc<dyn BlobStore>,
        generator: Arc<dyn GenerationService>,
        manuals: Arc<ManualAssembler>,
    ) -> Self {
        Self {
            store,
            generator,
            manuals,
            join: JoinPolicy::default(),
        }
    }

    pub fn with_join_policy(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    /// Image → parts list.
    pub async fn detect_parts(&self, plan: PlanId) -> Result<Vec<Part>, PipelineError> {
        let stage = Stage::of(StageKind::PartsDetection);
        self.check_inputs(stage, plan).await?;
        info!(plan_id = %plan, "[parts_list] detection start");
        let image = self.image(stage.kind, plan).await?;

        let req = GenerationRequest::new(stage.kind, json!({})).with_image(image);
        let parts: Vec<Part> = self.generate(req).await?;

        let index = PartIndex::new(&parts)?;
        index.check_known(
            parts.iter().flat_map(|p| p.adjacent.iter().map(PartName::as_str)),
            self.join,
        )?;
        self.store_output(stage, plan, &parts).await?;
        Ok(parts)
    }

    /// Image + parts list → parts with meshes.
    pub async fn estimate_placement(&self, plan: PlanId) -> Result<Vec<PlacedPart>, PipelineError> {
        let stage = Stage::of(StageKind::PartsPlacement);
        self.check_inputs(stage, plan).await?;
        info!(plan_id = %plan, "[parts3d] estimation start");
        let image = self.image(stage.kind, plan).await?;
        let parts: Vec<Part> = self.input(stage.kind, plan, ArtifactKind::PartsList).await?;

        let payload: Vec<PlacementPart> = parts.iter().map(PlacementPart::from).collect();
        let req = GenerationRequest::new(stage.kind, json!({ "parts_list": payload }))
            .with_image(image);
        let mut placed: Vec<PlacedPart> = self.generate(req).await?;

        for part in &placed {
            part.mesh.validate(&part.name)?;
        }
        PartIndex::new(&placed)?;
        let list = PartIndex::new(&parts)?;
        list.check_known(placed.iter().map(|p| p.name.as_str()), self.join)?;
        placed.retain(|p| list.contains(p.name.as_str()));

        self.store_output(stage, plan, &placed).await?;
        Ok(placed)
    }

    /// Parts list + parts3d → per-part fabrication steps.
    pub async fn fabrication_manual(
        &self,
        plan: PlanId,
    ) -> Result<Vec<FabricationStep>, PipelineError> {
        let stage = Stage::of(StageKind::FabricationManual);
        self.check_inputs(stage, plan).await?;
        info!(plan_id = %plan, "[parts_manual] generating");
        let parts: Vec<Part> = self.input(stage.kind, plan, ArtifactKind::PartsList).await?;
        let mut placed: Vec<PlacedPart> = self.input(stage.kind, plan, ArtifactKind::Parts3d).await?;

        let list = PartIndex::new(&parts)?;
        list.check_known(placed.iter().map(|p| p.name.as_str()), self.join)?;
        for part in &mut placed {
            if let Some(info) = list.get(part.name.as_str()) {
                part.material = Some(info.material.clone());
                part.shape_note = Some(info.shape_note.clone());
            }
        }

        let req = GenerationRequest::new(stage.kind, json!({ "parts3d": placed }));
        let steps: Vec<FabricationStep> = self.generate(req).await?;

        let index = PartIndex::new(&placed)?;
        index.check_known(steps.iter().flat_map(|s| s.group_names()), self.join)?;
        self.store_output(stage, plan, &steps).await?;
        Ok(steps)
    }

    /// Image + parts3d → ordered assembly steps.
    pub async fn assembly_manual(&self, plan: PlanId) -> Result<Vec<AssemblyStep>, PipelineError> {
        let stage = Stage::of(StageKind::AssemblyManual);
        self.check_inputs(stage, plan).await?;
        info!(plan_id = %plan, "[assembly_manual] generating");
        let image = self.image(stage.kind, plan).await?;
        let placed: Vec<PlacedPart> = self.input(stage.kind, plan, ArtifactKind::Parts3d).await?;

        let req = GenerationRequest::new(stage.kind, json!({ "parts3d": placed }))
            .with_image(image);
        let steps: Vec<AssemblyStep> = self.generate(req).await?;

        AssemblyStep::check_sequence(&steps)?;
        let loose = AssemblyStep::non_cumulative_steps(&steps);
        if !loose.is_empty() {
            warn!(plan_id = %plan, steps = ?loose, "[assembly_manual] parts_already_used shrinks between steps");
        }
        let index = PartIndex::new(&placed)?;
        index.check_known(
            steps
                .iter()
                .flat_map(|s| s.parts_already_used.iter().map(PartName::as_str)),
            self.join,
        )?;
        self.store_output(stage, plan, &steps).await?;
        Ok(steps)
    }

    /// Render and store the design document. `None` when a manual is still missing.
    pub async fn render_document(&self, plan: PlanId) -> Result<Option<usize>, PipelineError> {
        match self.manuals.assemble(plan).await {
            Ok(len) => Ok(Some(len)),
            Err(ManualError::MissingArtifact(kind)) => {
                info!(plan_id = %plan, missing = %kind, "[manual_pdf] inputs not ready, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_inputs(&self, stage: &Stage, plan: PlanId) -> Result<(), PipelineError> {
        for input in stage.inputs {
            let present = match *input {
                StageInput::Image => find_image(self.store.as_ref(), plan).await?.is_some(),
                StageInput::Artifact(kind) => artifact_exists(self.store.as_ref(), plan, kind).await?,
            };
            if !present {
                return Err(PipelineError::MissingInput {
                    stage: stage.kind,
                    input: match *input {
                        StageInput::Image => "image".to_string(),
                        StageInput::Artifact(kind) => kind.to_string(),
                    },
                });
            }
        }
        Ok(())
    }

    async fn image(&self, stage: StageKind, plan: PlanId) -> Result<SourceImage, PipelineError> {
        let missing = || PipelineError::MissingInput {
            stage,
            input: "image".into(),
        };
        let (key, kind) = find_image(self.store.as_ref(), plan)
            .await?
            .ok_or_else(missing)?;
        let bytes = self.store.read_bytes(&key).await?.ok_or_else(missing)?;
        Ok(SourceImage { bytes, kind })
    }

    async fn input<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        plan: PlanId,
        kind: ArtifactKind,
    ) -> Result<T, PipelineError> {
        read_artifact(self.store.as_ref(), plan, kind)
            .await?
            .ok_or_else(|| PipelineError::MissingInput {
                stage,
                input: kind.to_string(),
            })
    }

    async fn generate<T: DeserializeOwned>(&self, req: GenerationRequest) -> Result<T, PipelineError> {
        let stage = req.stage;
        let value = self.generator.generate(req).await?;
        serde_json::from_value(value).map_err(|e| PipelineError::InvalidOutput {
            stage,
            detail: e.to_string(),
        })
    }

    async fn store_output<T: Serialize + Sync>(
        &self,
        stage: &Stage,
        plan: PlanId,
        value: &T,
    ) -> Result<(), PipelineError> {
        write_artifact(self.store.as_ref(), plan, stage.output, value).await?;
        info!(plan_id = %plan, artifact = %stage.output, "[{}] stored", stage.kind);
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for StageRunner {
    async fn execute(&self, task: PipelineTask) -> anyhow::Result<()> {
        match task {
            PipelineTask::DetectParts(plan) => {
                self.detect_parts(plan).await?;
            }
            PipelineTask::EstimatePlacement(plan) => {
                self.estimate_placement(plan).await?;
                // Assembly steps follow directly from the fresh geometry.
                self.assembly_manual(plan).await?;
            }
            PipelineTask::FabricationManual(plan) => {
                self.fabrication_manual(plan).await?;
            }
            PipelineTask::AssemblyManual(plan) => {
                self.assembly_manual(plan).await?;
            }
            PipelineTask::RenderDocument(plan) => {
                self.render_document(plan).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_table_is_keyed_by_kind() {
        for kind in StageKind::ALL {
            assert_eq!(Stage::of(kind).kind, kind);
        }
        assert_eq!(Stage::of(StageKind::PartsPlacement).output, ArtifactKind::Parts3d);
        assert!(Stage::of(StageKind::AssemblyManual)
            .inputs
            .contains(&StageInput::Image));
    }

    #[test]
    fn placement_payload_omits_material() {
        let part: Part = serde_json::from_value(json!({
            "name": "天板",
            "shape": "board",
            "material": "oak",
            "size": {"thickness": 2.0, "width": 40.0, "length": 80.0},
        }))
        .unwrap();
        let v = serde_json::to_value(PlacementPart::from(&part)).unwrap();
        assert!(v.get("material").is_none());
        assert_eq!(v["name"], "天板");
        assert_eq!(v["size"]["width"], 40.0);
    }
}
