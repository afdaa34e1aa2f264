use std::sync::Arc;

use async_trait::async_trait;
use craft_core::{PipelineError, PipelineOrchestrator, StageRunner};
use craft_infer::StaticGenerationService;
use craft_manual::{DocumentRenderer, ManualAssembler, ManualDocument, ManualError, ScratchDir};
use craft_mesh::PreviewOptions;
use craft_sched::{drain, InMemoryTaskQueue, PipelineTask};
use craft_store::{artifact_key, BlobStore, InMemoryBlobStore};
use craft_types::{
    ArtifactKind, ImageKind, JoinPolicy, Mesh, PartName, PlacedPart, PlanId, PlanState, StageKind,
};
use serde_json::{json, Value};

struct FakePdf;

#[async_trait]
impl DocumentRenderer for FakePdf {
    async fn render(
        &self,
        doc: &ManualDocument,
        _scratch: &mut ScratchDir,
    ) -> Result<Vec<u8>, ManualError> {
        Ok(format!("%PDF {} steps", doc.steps.len()).into_bytes())
    }
}

struct Harness {
    store: Arc<InMemoryBlobStore>,
    queue: Arc<InMemoryTaskQueue>,
    generator: Arc<StaticGenerationService>,
    runner: StageRunner,
    orch: PipelineOrchestrator,
    _scratch: tempfile::TempDir,
}

fn leg(name: &str, x: f64) -> PlacedPart {
    PlacedPart::new(
        PartName::new(name).unwrap(),
        "box",
        Mesh::cuboid([x, 0.0, 0.0], [4.0, 4.0, 40.0]),
    )
}

fn parts_list() -> Value {
    json!([
        {"name": "leg1", "shape": "box", "adjacent": ["leg2"], "material": "pine",
         "size": {"width": 4.0, "depth": 4.0, "height": 40.0}, "shape_note": "dowel"},
        {"name": "leg2", "shape": "box", "adjacent": ["leg1"], "material": "pine",
         "size": {"width": 4.0, "depth": 4.0, "height": 40.0}, "shape_note": "dowel"}
    ])
}

fn full_service() -> StaticGenerationService {
    StaticGenerationService::new()
        .with_output(StageKind::PartsDetection, parts_list())
        .with_output(
            StageKind::PartsPlacement,
            serde_json::to_value(vec![leg("leg1", 10.0), leg("leg2", 30.0)]).unwrap(),
        )
        .with_output(
            StageKind::FabricationManual,
            json!([{"part_name": "leg1,leg2", "description": "Cut both legs to 40cm."}]),
        )
        .with_output(
            StageKind::AssemblyManual,
            json!([
                {"step": 1, "description": "Stand leg1.", "parts_already_used": ["leg1"]},
                {"step": 2, "description": "Add leg2.", "parts_already_used": ["leg1", "leg2"]}
            ]),
        )
}

fn harness(service: StaticGenerationService) -> Harness {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryBlobStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new());
    let generator = Arc::new(service);
    let manuals = Arc::new(
        ManualAssembler::new(store.clone(), Arc::new(FakePdf), scratch.path()).with_preview(
            PreviewOptions {
                size: 48,
                ..PreviewOptions::default()
            },
        ),
    );
    let runner = StageRunner::new(store.clone(), generator.clone(), manuals);
    let orch = PipelineOrchestrator::new(store.clone(), queue.clone());
    Harness {
        store,
        queue,
        generator,
        runner,
        orch,
        _scratch: scratch,
    }
}

impl Harness {
    async fn settle(&self) -> usize {
        drain(self.queue.as_ref(), &self.runner).await
    }

    async fn submit(&self) -> PlanId {
        self.orch
            .submit_image(vec![0x89, b'P', b'N', b'G'], ImageKind::Png)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn photo_to_document() {
    let h = harness(full_service());
    let plan = h.submit().await;
    assert_eq!(h.queue.pending().await, vec![PipelineTask::DetectParts(plan)]);
    assert_eq!(h.orch.state(plan).await.unwrap(), PlanState::PartsListPending);

    h.settle().await;
    assert_eq!(h.orch.state(plan).await.unwrap(), PlanState::PartsListReady);

    let summary = h.orch.parts_list(plan).await.unwrap();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[1].part_id, 2);
    assert_eq!(summary[1].part_name.as_str(), "leg2");
    assert_eq!(
        h.queue.pending().await,
        vec![PipelineTask::EstimatePlacement(plan)]
    );

    // placement runs the assembly manual as its continuation
    h.settle().await;
    assert!(h.orch.is_ready(plan, ArtifactKind::Parts3d).await.unwrap());
    assert!(h.orch.is_ready(plan, ArtifactKind::AssemblyManual).await.unwrap());
    assert_eq!(h.orch.state(plan).await.unwrap(), PlanState::ManualsPending);

    let model = h.orch.model(plan).await.unwrap();
    let lines: Vec<&str> = model.lines().collect();
    assert_eq!(lines[0], "g leg1");
    assert_eq!(lines[1], "v 10 0 0");
    assert_eq!(lines[15], "g leg2");
    assert_eq!(
        h.queue.pending().await,
        vec![
            PipelineTask::FabricationManual(plan),
            PipelineTask::AssemblyManual(plan)
        ]
    );
    h.settle().await;
    assert_eq!(h.orch.state(plan).await.unwrap(), PlanState::ManualsReady);

    let fabrication = h.orch.parts_manual(plan).await.unwrap();
    assert_eq!(fabrication[0].part_name, "leg1,leg2");
    assert_eq!(
        h.queue.pending().await,
        vec![PipelineTask::RenderDocument(plan)]
    );

    assert_eq!(h.orch.assembly_step_count(plan).await.unwrap(), 2);
    let first = h.orch.assembly_step(plan, 1).await.unwrap();
    assert_eq!(first.step, 1);
    assert_eq!(first.description, "Stand leg1.");
    assert!(first.model.starts_with("g leg1\n"));
    assert!(!first.model.contains("g leg2"));

    h.settle().await;
    assert_eq!(h.orch.state(plan).await.unwrap(), PlanState::DocumentReady);
    assert_eq!(h.orch.document(plan).await.unwrap(), b"%PDF 2 steps".to_vec());
}

#[tokio::test]
async fn stage_payloads_follow_the_join() {
    let h = harness(full_service());
    let plan = h.submit().await;
    h.settle().await;
    h.orch.parts_list(plan).await.unwrap();
    h.settle().await;
    h.orch.model(plan).await.unwrap();
    h.settle().await;

    let calls = h.generator.calls();
    let placement = calls
        .iter()
        .find(|c| c.stage == StageKind::PartsPlacement)
        .unwrap();
    assert!(placement.image.is_some());
    assert!(placement.payload["parts_list"][0].get("material").is_none());
    assert_eq!(placement.payload["parts_list"][0]["shape_note"], "dowel");

    let fabrication = calls
        .iter()
        .find(|c| c.stage == StageKind::FabricationManual)
        .unwrap();
    assert!(fabrication.image.is_none());
    assert_eq!(fabrication.payload["parts3d"][1]["material"], "pine");

    let assembly = calls
        .iter()
        .find(|c| c.stage == StageKind::AssemblyManual)
        .unwrap();
    assert_eq!(assembly.image.as_ref().unwrap().kind, ImageKind::Png);
    assert!(assembly.payload["parts3d"][0]["vertices"].is_array());
}

#[tokio::test]
async fn placement_rerun_overwrites_the_same_key() {
    let h = harness(full_service());
    let plan = h.submit().await;
    h.settle().await;

    h.runner.estimate_placement(plan).await.unwrap();
    let keys = h.store.keys().await;
    let parts3d = artifact_key(plan, ArtifactKind::Parts3d);
    assert!(keys.contains(&parts3d));
    let first = h.store.read_bytes(&parts3d).await.unwrap();
    h.runner.estimate_placement(plan).await.unwrap();
    assert_eq!(h.store.keys().await, keys);
    assert_eq!(h.store.read_bytes(&parts3d).await.unwrap(), first);

    // parts3d exists now, so reading the list schedules nothing
    h.orch.parts_list(plan).await.unwrap();
    assert!(h.queue.pending().await.is_empty());
}

#[tokio::test]
async fn failed_stage_leaves_plan_waiting() {
    let service = StaticGenerationService::new().with_output(StageKind::PartsDetection, parts_list());
    let h = harness(service);
    let plan = h.submit().await;
    h.settle().await;

    // the read itself succeeds even though the background stage will fail
    h.orch.parts_list(plan).await.unwrap();
    assert_eq!(h.settle().await, 1);
    assert!(!h.orch.is_ready(plan, ArtifactKind::Parts3d).await.unwrap());
    assert_eq!(h.orch.state(plan).await.unwrap(), PlanState::PartsListReady);

    // no retry on its own; the next read re-triggers
    assert!(h.queue.pending().await.is_empty());
    h.orch.parts_list(plan).await.unwrap();
    assert_eq!(h.queue.pending().await.len(), 1);
}

#[tokio::test]
async fn gapped_assembly_steps_are_not_stored() {
    let service = full_service().with_output(
        StageKind::AssemblyManual,
        json!([
            {"step": 1, "description": "a", "parts_already_used": ["leg1"]},
            {"step": 3, "description": "b", "parts_already_used": ["leg1", "leg2"]}
        ]),
    );
    let h = harness(service);
    let plan = h.submit().await;
    h.settle().await;
    h.runner.estimate_placement(plan).await.unwrap();

    let err = h.runner.assembly_manual(plan).await.unwrap_err();
    assert!(matches!(err, PipelineError::Steps(_)));
    assert!(!h.orch.is_ready(plan, ArtifactKind::AssemblyManual).await.unwrap());
}

#[tokio::test]
async fn orphan_names_follow_the_join_policy() {
    let service = full_service().with_output(
        StageKind::FabricationManual,
        json!([{"part_name": "leg1,shelf", "description": "x"}]),
    );
    let h = harness(service);
    let plan = h.submit().await;
    h.settle().await;
    h.runner.estimate_placement(plan).await.unwrap();

    // permissive: stored, orphan only logged
    h.runner.fabrication_manual(plan).await.unwrap();
    assert!(h.orch.is_ready(plan, ArtifactKind::PartsManual).await.unwrap());

    let strict = StageRunner::new(
        h.store.clone(),
        h.generator.clone(),
        Arc::new(ManualAssembler::new(
            h.store.clone(),
            Arc::new(FakePdf),
            std::env::temp_dir(),
        )),
    )
    .with_join_policy(JoinPolicy::Strict);
    let err = strict.fabrication_manual(plan).await.unwrap_err();
    assert!(matches!(err, PipelineError::Join(_)));
}

#[tokio::test]
async fn document_waits_for_both_manuals() {
    let h = harness(full_service());
    let plan = h.submit().await;
    h.settle().await;
    h.runner.estimate_placement(plan).await.unwrap();
    h.runner.fabrication_manual(plan).await.unwrap();

    // assembly manual missing: nothing rendered, nothing written
    assert_eq!(h.runner.render_document(plan).await.unwrap(), None);
    assert!(!h.orch.is_ready(plan, ArtifactKind::DesignDocument).await.unwrap());

    h.orch.parts_manual(plan).await.unwrap();
    assert!(h.queue.pending().await.is_empty());
}
