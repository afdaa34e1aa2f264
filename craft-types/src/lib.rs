use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod geometry;
pub mod join;
pub mod part;

pub use geometry::{Bounds, GeometryError};
pub use join::{JoinError, JoinPolicy, Named, PartIndex};
pub use part::{
    AssemblyStep, Face, FabricationStep, Mesh, Part, PartName, PartSummary, PlacedPart, StepError,
    Vertex,
};

/// Identifier of one end-to-end build package.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

#[derive(Debug, Error)]
#[error("plan id is not a UUID: {0}")]
pub struct InvalidPlanId(pub String);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for PlanId {
    type Err = InvalidPlanId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(PlanId)
            .map_err(|_| InvalidPlanId(s.to_string()))
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Image encodings accepted on submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Lookup order used when the stored extension is unknown.
    pub const PROBE_EXTENSIONS: [(&'static str, ImageKind); 3] = [
        ("jpg", ImageKind::Jpeg),
        ("jpeg", ImageKind::Jpeg),
        ("png", ImageKind::Png),
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// Submitted photograph plus its declared encoding.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

/// Named, plan-scoped objects in the blob store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PartsList,
    Parts3d,
    PartsManual,
    AssemblyManual,
    DesignDocument,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::PartsList,
        ArtifactKind::Parts3d,
        ArtifactKind::PartsManual,
        ArtifactKind::AssemblyManual,
        ArtifactKind::DesignDocument,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::PartsList => "parts_list.json",
            ArtifactKind::Parts3d => "parts3d.json",
            ArtifactKind::PartsManual => "parts_manual.json",
            ArtifactKind::AssemblyManual => "assembly_manual.json",
            ArtifactKind::DesignDocument => "design_document.pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::DesignDocument => "application/pdf",
            _ => "application/json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::PartsList => "parts_list",
            ArtifactKind::Parts3d => "parts3d",
            ArtifactKind::PartsManual => "parts_manual",
            ArtifactKind::AssemblyManual => "assembly_manual",
            ArtifactKind::DesignDocument => "design_document",
        };
        f.write_str(name)
    }
}

/// The generation stages that go through the Generation Service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    PartsDetection,
    PartsPlacement,
    FabricationManual,
    AssemblyManual,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::PartsDetection,
        StageKind::PartsPlacement,
        StageKind::FabricationManual,
        StageKind::AssemblyManual,
    ];

    pub fn from_name(name: &str) -> Option<StageKind> {
        StageKind::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::PartsDetection => "parts_detection",
            StageKind::PartsPlacement => "parts_placement",
            StageKind::FabricationManual => "fabrication_manual",
            StageKind::AssemblyManual => "assembly_manual",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed progress of a plan, inferred from which artifacts exist.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    NoImage,
    PartsListPending,
    PartsListReady,
    Parts3dReady,
    ManualsPending,
    ManualsReady,
    DocumentReady,
}

/// Infer the plan state from the set of present artifacts.
///
/// Never cached: storage is the only source of truth, and several processes may serve the
/// same plan.
pub fn plan_state(image_present: bool, artifacts: &BTreeSet<ArtifactKind>) -> PlanState {
    let has = |k: ArtifactKind| artifacts.contains(&k);

    if has(ArtifactKind::DesignDocument) {
        return PlanState::DocumentReady;
    }
    let manuals = [ArtifactKind::PartsManual, ArtifactKind::AssemblyManual]
        .into_iter()
        .filter(|k| has(*k))
        .count();
    if has(ArtifactKind::Parts3d) || manuals > 0 {
        return match manuals {
            0 => PlanState::Parts3dReady,
            1 => PlanState::ManualsPending,
            _ => PlanState::ManualsReady,
        };
    }
    if has(ArtifactKind::PartsList) {
        return PlanState::PartsListReady;
    }
    if image_present {
        PlanState::PartsListPending
    } else {
        PlanState::NoImage
    }
}
