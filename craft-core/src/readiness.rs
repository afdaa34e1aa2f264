use std::collections::BTreeSet;
use std::sync::Arc;

use craft_store::{artifact_exists, find_image, BlobStore};
use craft_types::{plan_state, ArtifactKind, PlanId, PlanState};

use crate::PipelineError;

/// Poll-side view of a plan. Every answer is read from the store at call time.
#[derive(Clone)]
pub struct ReadinessGate {
    store: Arc<dyn BlobStore>,
}

impl ReadinessGate {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub async fn is_ready(&self, plan: PlanId, kind: ArtifactKind) -> Result<bool, PipelineError> {
        Ok(artifact_exists(self.store.as_ref(), plan, kind).await?)
    }

    pub async fn image_present(&self, plan: PlanId) -> Result<bool, PipelineError> {
        Ok(find_image(self.store.as_ref(), plan).await?.is_some())
    }

    pub async fn present(&self, plan: PlanId) -> Result<BTreeSet<ArtifactKind>, PipelineError> {
        let mut found = BTreeSet::new();
        for kind in ArtifactKind::ALL {
            if self.is_ready(plan, kind).await? {
                found.insert(kind);
            }
        }
        Ok(found)
    }

    pub async fn state(&self, plan: PlanId) -> Result<PlanState, PipelineError> {
        let image = self.image_present(plan).await?;
        let present = self.present(plan).await?;
        Ok(plan_state(image, &present))
    }
}
