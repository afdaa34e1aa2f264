//! Turning placed parts into something a person can look at: a wavefront-style wireframe
//! text export and a rasterized PNG preview.

use craft_types::GeometryError;
use thiserror::Error;

mod canvas;
mod glyphs;
pub mod raster;
pub mod wireframe;

pub use raster::{render_preview, render_scene, triangulate, PreviewOptions};
pub use wireframe::{export_wireframe, parse_wireframe, WireframeError, WireframeGroup};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
