//! Build-manual assembly: preview images for the whole object, each fabrication group and each
//! assembly step, a structured document tying them to the descriptions, and a pluggable
//! renderer that turns the document into the final printable artifact.

use std::path::PathBuf;

use craft_mesh::RenderError;
use craft_store::StoreError;
use craft_types::{ArtifactKind, JoinError};
use thiserror::Error;

pub mod assembler;
pub mod document;
pub mod images;
pub mod renderer;
pub mod scratch;

pub use assembler::{ManualAssembler, ManualInputs};
pub use document::{ManualDocument, ManualLabels, PartsSection, StepSection};
pub use images::{render_images, ManualImages, RenderedImage};
pub use renderer::{CommandRenderer, DocumentRenderer};
pub use scratch::ScratchDir;

#[derive(Debug, Error)]
pub enum ManualError {
    #[error("{0} is not available yet")]
    MissingArtifact(ArtifactKind),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error("scratch file {path:?}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document renderer failed: {0}")]
    Renderer(String),
    #[error("image task aborted: {0}")]
    Task(String),
}
