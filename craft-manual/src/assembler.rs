use std::path::PathBuf;
use std::sync::Arc;

use craft_mesh::PreviewOptions;
use craft_store::{read_artifact, BlobStore};
use craft_types::{ArtifactKind, AssemblyStep, FabricationStep, JoinPolicy, PlacedPart, PlanId};
use tracing::{info, warn};

use crate::document::{ManualDocument, ManualLabels, PartsSection, StepSection};
use crate::images::{render_images, ManualImages};
use crate::renderer::DocumentRenderer;
use crate::scratch::ScratchDir;
use crate::ManualError;

/// The three artifacts a manual is built from.
#[derive(Clone, Debug, Default)]
pub struct ManualInputs {
    pub parts3d: Vec<PlacedPart>,
    pub fabrication: Vec<FabricationStep>,
    pub assembly: Vec<AssemblyStep>,
}

impl ManualInputs {
    /// Read all inputs for a plan. Any absent artifact fails the whole load.
    pub async fn load(store: &dyn BlobStore, plan: PlanId) -> Result<Self, ManualError> {
        let parts3d = read_artifact(store, plan, ArtifactKind::Parts3d)
            .await?
            .ok_or(ManualError::MissingArtifact(ArtifactKind::Parts3d))?;
        let fabrication = read_artifact(store, plan, ArtifactKind::PartsManual)
            .await?
            .ok_or(ManualError::MissingArtifact(ArtifactKind::PartsManual))?;
        let assembly = read_artifact(store, plan, ArtifactKind::AssemblyManual)
            .await?
            .ok_or(ManualError::MissingArtifact(ArtifactKind::AssemblyManual))?;
        Ok(Self {
            parts3d,
            fabrication,
            assembly,
        })
    }
}

pub struct ManualAssembler {
    store: Arc<dyn BlobStore>,
    renderer: Arc<dyn DocumentRenderer>,
    scratch_root: PathBuf,
    preview: PreviewOptions,
    labels: ManualLabels,
    join: JoinPolicy,
}

impl ManualAssembler {
    pub fn new(
        store: Arc<dyn BlobStore>,
        renderer: Arc<dyn DocumentRenderer>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            renderer,
            scratch_root: scratch_root.into(),
            preview: PreviewOptions::default(),
            labels: ManualLabels::default(),
            join: JoinPolicy::default(),
        }
    }

    pub fn with_preview(mut self, preview: PreviewOptions) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_labels(mut self, labels: ManualLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_join_policy(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    /// Build the design document for a plan and store it, replacing any previous one.
    ///
    /// Nothing is written unless every input exists and rendering succeeds.
    pub async fn assemble(&self, plan: PlanId) -> Result<usize, ManualError> {
        let inputs = ManualInputs::load(self.store.as_ref(), plan).await?;
        let bytes = self.build(&plan.to_string(), &inputs).await?;
        let len = bytes.len();
        let kind = ArtifactKind::DesignDocument;
        self.store
            .write_bytes(&craft_store::artifact_key(plan, kind), bytes, kind.content_type())
            .await?;
        info!(plan_id = %plan, bytes = len, "[manual_pdf] design document stored");
        Ok(len)
    }

    /// Render a manual from in-memory inputs. Scratch files are removed whatever the outcome.
    pub async fn build(&self, label: &str, inputs: &ManualInputs) -> Result<Vec<u8>, ManualError> {
        let images = {
            let job = inputs.clone();
            let preview = self.preview.clone();
            let join = self.join;
            tokio::task::spawn_blocking(move || {
                render_images(&job.parts3d, &job.fabrication, &job.assembly, &preview, join)
            })
            .await
            .map_err(|e| ManualError::Task(e.to_string()))??
        };
        info!(
            label,
            groups = images.groups.len(),
            steps = images.steps.len(),
            "[manual_pdf] preview images rendered"
        );

        let mut scratch = ScratchDir::create(&self.scratch_root, label).await?;
        let result = self.render_in(&mut scratch, &images).await;
        let failed = scratch.cleanup().await;
        if failed > 0 {
            warn!(label, failed, "[manual_pdf] some scratch files were not removed");
        }
        result
    }

    async fn render_in(
        &self,
        scratch: &mut ScratchDir,
        images: &ManualImages,
    ) -> Result<Vec<u8>, ManualError> {
        scratch
            .write(&images.complete.file_name, &images.complete.png)
            .await?;
        for (_, _, image) in &images.groups {
            scratch.write(&image.file_name, &image.png).await?;
        }
        for (_, image) in &images.steps {
            scratch.write(&image.file_name, &image.png).await?;
        }

        let doc = self.compose(images);
        self.renderer.render(&doc, scratch).await
    }

    fn compose(&self, images: &ManualImages) -> ManualDocument {
        ManualDocument {
            labels: self.labels.clone(),
            complete_image: images.complete.file_name.clone(),
            parts: images
                .groups
                .iter()
                .map(|(key, description, image)| PartsSection {
                    heading: key.clone(),
                    image: image.file_name.clone(),
                    description: description.clone(),
                })
                .collect(),
            steps: images
                .steps
                .iter()
                .map(|(step, image)| StepSection {
                    step: step.step,
                    description: step.description.clone(),
                    image: image.file_name.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use craft_store::{artifact_key, write_artifact, InMemoryBlobStore};
    use craft_types::{Mesh, PartName};

    use super::*;

    /// Records the HTML and the scratch listing seen at render time.
    #[derive(Default)]
    struct RecordingRenderer {
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl DocumentRenderer for RecordingRenderer {
        async fn render(
            &self,
            doc: &ManualDocument,
            scratch: &mut ScratchDir,
        ) -> Result<Vec<u8>, ManualError> {
            let mut files: Vec<String> = std::fs::read_dir(scratch.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            files.sort();
            self.seen.lock().unwrap().push((doc.to_html(), files));
            Ok(b"%PDF-1.7 fake".to_vec())
        }
    }

    fn leg(name: &str, x: f64) -> PlacedPart {
        PlacedPart::new(
            PartName::new(name).unwrap(),
            "box",
            Mesh::cuboid([x, 0.0, 0.0], [4.0, 4.0, 40.0]),
        )
    }

    fn names(list: &[&str]) -> Vec<PartName> {
        list.iter().map(|n| PartName::new(*n).unwrap()).collect()
    }

    async fn seed(store: &InMemoryBlobStore, plan: PlanId, with_assembly: bool) {
        let parts = vec![leg("脚1", 0.0), leg("脚2", 30.0), leg("脚3", 60.0)];
        let fabrication = vec![FabricationStep {
            part_name: "脚1,脚2".into(),
            description: "Cut to 40cm.".into(),
        }];
        let assembly = vec![
            AssemblyStep {
                step: 1,
                description: "Stand the legs.".into(),
                parts_already_used: names(&["脚1", "脚2"]),
            },
            AssemblyStep {
                step: 2,
                description: "Add the third.".into(),
                parts_already_used: names(&["脚1", "脚2", "脚3"]),
            },
        ];
        write_artifact(store, plan, ArtifactKind::Parts3d, &parts).await.unwrap();
        write_artifact(store, plan, ArtifactKind::PartsManual, &fabrication)
            .await
            .unwrap();
        if with_assembly {
            write_artifact(store, plan, ArtifactKind::AssemblyManual, &assembly)
                .await
                .unwrap();
        }
    }

    fn assembler(
        store: Arc<InMemoryBlobStore>,
        renderer: Arc<RecordingRenderer>,
        root: &std::path::Path,
    ) -> ManualAssembler {
        ManualAssembler::new(store, renderer, root).with_preview(PreviewOptions {
            size: 64,
            ..PreviewOptions::default()
        })
    }

    #[tokio::test]
    async fn stores_document_and_removes_scratch() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryBlobStore::new());
        let renderer = Arc::new(RecordingRenderer::default());
        let plan = PlanId::new();
        seed(&store, plan, true).await;

        let len = assembler(store.clone(), renderer.clone(), root.path())
            .assemble(plan)
            .await
            .unwrap();
        assert_eq!(len, 13);

        let stored = store
            .read_bytes(&artifact_key(plan, ArtifactKind::DesignDocument))
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some(&b"%PDF-1.7 fake"[..]));

        let seen = renderer.seen.lock().unwrap();
        let (html, files) = &seen[0];
        assert_eq!(
            files,
            &["complete.png", "parts_1.png", "step_1.png", "step_2.png"]
        );
        assert!(html.contains("<h3>脚1,脚2</h3>\n<img src=\"parts_1.png\""));
        assert!(html.contains("<h3>Step 2</h3>\n<p>Add the third.</p>"));

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_assembly_manual_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryBlobStore::new());
        let renderer = Arc::new(RecordingRenderer::default());
        let plan = PlanId::new();
        seed(&store, plan, false).await;

        let err = assembler(store.clone(), renderer.clone(), root.path())
            .assemble(plan)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManualError::MissingArtifact(ArtifactKind::AssemblyManual)
        ));
        assert!(!store
            .exists(&artifact_key(plan, ArtifactKind::DesignDocument))
            .await
            .unwrap());
        assert!(renderer.seen.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    struct FailingRenderer;

    #[async_trait]
    impl DocumentRenderer for FailingRenderer {
        async fn render(
            &self,
            _doc: &ManualDocument,
            _scratch: &mut ScratchDir,
        ) -> Result<Vec<u8>, ManualError> {
            Err(ManualError::Renderer("boom".into()))
        }
    }

    #[tokio::test]
    async fn renderer_failure_cleans_up_and_stores_nothing() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryBlobStore::new());
        let plan = PlanId::new();
        seed(&store, plan, true).await;

        let err = ManualAssembler::new(store.clone(), Arc::new(FailingRenderer), root.path())
            .with_preview(PreviewOptions {
                size: 32,
                ..PreviewOptions::default()
            })
            .assemble(plan)
            .await
            .unwrap_err();
        assert!(matches!(err, ManualError::Renderer(_)));
        assert!(!store
            .exists(&artifact_key(plan, ArtifactKind::DesignDocument))
            .await
            .unwrap());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
