use craft_mesh::{render_preview, PreviewOptions};
use craft_types::{AssemblyStep, FabricationStep, JoinPolicy, PartIndex, PlacedPart};
use tracing::debug;

use crate::ManualError;

pub const COMPLETE_IMAGE: &str = "complete.png";

#[derive(Clone, Debug)]
pub struct RenderedImage {
    pub file_name: String,
    pub png: Vec<u8>,
}

/// Every preview a manual needs.
#[derive(Clone, Debug)]
pub struct ManualImages {
    pub complete: RenderedImage,
    /// Distinct fabrication groups that matched at least one part: group key, final
    /// description, image. First-occurrence order.
    pub groups: Vec<(String, String, RenderedImage)>,
    /// Assembly steps in step-number order.
    pub steps: Vec<(AssemblyStep, RenderedImage)>,
}

/// Render the full model, one image per fabrication group and one per assembly step.
///
/// Duplicate group keys collapse into one entry whose description is the last one seen.
/// Groups that select no parts are dropped.
pub fn render_images(
    parts3d: &[PlacedPart],
    fabrication: &[FabricationStep],
    assembly: &[AssemblyStep],
    opts: &PreviewOptions,
    policy: JoinPolicy,
) -> Result<ManualImages, ManualError> {
    let index = PartIndex::new(parts3d)?;

    let complete = RenderedImage {
        file_name: COMPLETE_IMAGE.to_string(),
        png: render_preview(parts3d, opts)?,
    };

    let mut grouped: Vec<(String, String)> = Vec::new();
    for entry in fabrication {
        let key = entry.group_key();
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = entry.description.clone(),
            None => grouped.push((key, entry.description.clone())),
        }
    }

    let mut groups = Vec::new();
    for (key, description) in grouped {
        let selected = index.select(key.split(','), policy)?;
        if selected.is_empty() {
            debug!(group = %key, "[manual] group matches no parts, skipping");
            continue;
        }
        let image = RenderedImage {
            file_name: format!("parts_{}.png", groups.len() + 1),
            png: render_preview(selected, opts)?,
        };
        groups.push((key, description, image));
    }

    let mut ordered = assembly.to_vec();
    ordered.sort_by_key(|s| s.step);
    let mut steps = Vec::with_capacity(ordered.len());
    for step in ordered {
        let selected = index.select(
            step.parts_already_used.iter().map(|p| p.as_str()),
            policy,
        )?;
        let image = RenderedImage {
            file_name: format!("step_{}.png", step.step),
            png: render_preview(selected, opts)?,
        };
        steps.push((step, image));
    }

    Ok(ManualImages {
        complete,
        groups,
        steps,
    })
}
