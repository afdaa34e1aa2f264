use craft_types::geometry::{normalized, Bounds};
use craft_types::PlacedPart;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use nalgebra::{Isometry3, Point3, Vector3};
use tracing::debug;

use crate::canvas::{Canvas, Rgb};
use crate::RenderError;

/// Per-part surface colors, cycled in input order.
const PALETTE: [Rgb; 10] = [
    [0x63, 0x6E, 0xFA],
    [0xEF, 0x55, 0x3B],
    [0x00, 0xCC, 0x96],
    [0xAB, 0x63, 0xFA],
    [0xFF, 0xA1, 0x5A],
    [0x19, 0xD3, 0xF3],
    [0xFF, 0x66, 0x92],
    [0xB6, 0xE8, 0x80],
    [0xFF, 0x97, 0xFF],
    [0xFE, 0xCB, 0x52],
];

const BACKGROUND: Rgb = [255, 255, 255];
const AXIS: Rgb = [0x44, 0x44, 0x44];
const MARGIN: f32 = 0.14;
const MAX_TICKS: usize = 20;

#[derive(Clone, Debug)]
pub struct PreviewOptions {
    /// Output is `size` x `size` pixels.
    pub size: u32,
    pub opacity: f32,
    /// Labels for the x, y and z axes.
    pub axis_labels: [String; 3],
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            size: 700,
            opacity: 0.5,
            axis_labels: [
                "WIDTH (CM)".to_string(),
                "DEPTH (CM)".to_string(),
                "HEIGHT (CM)".to_string(),
            ],
        }
    }
}

/// Split a face into triangles: triangles as-is, quads along the `v0-v2` diagonal.
///
/// Other arities yield nothing.
pub fn triangulate(face: &[u32]) -> Vec<[u32; 3]> {
    match *face {
        [a, b, c] => vec![[a, b, c]],
        [a, b, c, d] => vec![[a, b, c], [a, c, d]],
        _ => Vec::new(),
    }
}

/// Render parts to PNG bytes.
pub fn render_preview<'a>(
    parts: impl IntoIterator<Item = &'a PlacedPart>,
    opts: &PreviewOptions,
) -> Result<Vec<u8>, RenderError> {
    let image = render_scene(parts, opts)?;
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(out)
}

struct Projector {
    view: Isometry3<f64>,
    scale: f64,
    offset: (f64, f64),
    size: f64,
}

impl Projector {
    /// Orthographic view from the (+x, +y, +z) octant, z up, equal scale on every axis,
    /// fitted so the scene box fills the canvas minus a margin.
    fn fit(extent: Vector3<f64>, size: u32) -> Self {
        let center = Point3::from(extent * 0.5);
        let reach = extent.norm().max(1.0);
        let eye = center + Vector3::new(1.25, 1.25, 1.25).normalize() * reach * 2.0;
        let view = Isometry3::look_at_rh(&eye, &center, &Vector3::z());

        let mut lo = (f64::MAX, f64::MAX);
        let mut hi = (f64::MIN, f64::MIN);
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { 0.0 } else { extent.x },
                if i & 2 == 0 { 0.0 } else { extent.y },
                if i & 4 == 0 { 0.0 } else { extent.z },
            );
            let p = view * corner;
            lo = (lo.0.min(p.x), lo.1.min(p.y));
            hi = (hi.0.max(p.x), hi.1.max(p.y));
        }

        let size_f = size as f64;
        let usable = size_f * (1.0 - 2.0 * MARGIN as f64);
        let span = (hi.0 - lo.0).max(hi.1 - lo.1).max(f64::EPSILON);
        let scale = usable / span;
        let offset = (
            (size_f - (hi.0 - lo.0) * scale) / 2.0 - lo.0 * scale,
            (size_f - (hi.1 - lo.1) * scale) / 2.0 - lo.1 * scale,
        );
        Self {
            view,
            scale,
            offset,
            size: size_f,
        }
    }

    /// Screen position plus distance from the camera.
    fn project(&self, p: &Point3<f64>) -> ((f32, f32), f64) {
        let v = self.view * p;
        let x = v.x * self.scale + self.offset.0;
        let y = self.size - (v.y * self.scale + self.offset.1);
        ((x as f32, y as f32), -v.z)
    }
}

struct Triangle {
    screen: [(f32, f32); 3],
    depth: f64,
    color: Rgb,
}

/// Rasterize parts into an image: normalized coordinates, one translucent surface per part,
/// labelled axes. An empty subset gives an axes-only scene.
pub fn render_scene<'a>(
    parts: impl IntoIterator<Item = &'a PlacedPart>,
    opts: &PreviewOptions,
) -> Result<RgbaImage, RenderError> {
    let subset: Vec<&PlacedPart> = parts.into_iter().collect();
    for part in &subset {
        part.mesh.validate(&part.name)?;
    }
    let scene = normalized(&subset);
    let extent = Bounds::of(scene.iter())
        .map(|b| b.max.coords)
        .unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
    let projector = Projector::fit(extent, opts.size);
    let light = Vector3::new(0.3, 0.5, 1.0).normalize();

    let mut triangles = Vec::new();
    for (i, part) in scene.iter().enumerate() {
        let base = PALETTE[i % PALETTE.len()];
        let points: Vec<Point3<f64>> = part.mesh.vertices.iter().map(|v| v.position()).collect();
        for face in &part.mesh.faces {
            for [a, b, c] in triangulate(&face.vertices) {
                let (pa, pb, pc) = (points[a as usize], points[b as usize], points[c as usize]);
                let normal = (pb - pa).cross(&(pc - pa));
                let Some(normal) = normal.try_normalize(1e-12) else {
                    continue;
                };
                let shade = 0.6 + 0.4 * normal.dot(&light).abs();
                let color = base.map(|ch| (ch as f64 * shade).round().min(255.0) as u8);
                let (sa, da) = projector.project(&pa);
                let (sb, db) = projector.project(&pb);
                let (sc, dc) = projector.project(&pc);
                triangles.push(Triangle {
                    screen: [sa, sb, sc],
                    depth: (da + db + dc) / 3.0,
                    color,
                });
            }
        }
    }
    // Painter's order: farthest first.
    triangles.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    debug!(
        parts = scene.len(),
        triangles = triangles.len(),
        "[preview] rasterizing"
    );

    let mut canvas = Canvas::new(opts.size, BACKGROUND);
    draw_axes(&mut canvas, &projector, extent, &opts.axis_labels);
    for t in &triangles {
        canvas.fill_triangle(t.screen, t.color, opts.opacity);
    }
    Ok(canvas.image)
}

fn draw_axes(canvas: &mut Canvas, projector: &Projector, extent: Vector3<f64>, labels: &[String; 3]) {
    let scale = (projector.size / 350.0).round().max(1.0) as u32;
    let origin = Point3::origin();
    let (o, _) = projector.project(&origin);

    for axis in 0..3 {
        let mut dir = Vector3::<f64>::zeros();
        dir[axis] = 1.0;
        let length = extent[axis];
        let (end, _) = projector.project(&(origin + dir * length));
        canvas.line(o, end, AXIS, 1.0);

        let step = tick_step(length);
        let mut t = step;
        for _ in 0..MAX_TICKS {
            if t > length + step * 1e-6 {
                break;
            }
            let (at, _) = projector.project(&(origin + dir * t));
            canvas.line((at.0 - 2.0, at.1), (at.0 + 2.0, at.1), AXIS, 1.0);
            canvas.text((at.0 + 4.0, at.1 - 3.0 * scale as f32), &format_tick(t), AXIS, scale);
            t += step;
        }

        let (label_at, _) = projector.project(&(origin + dir * (length + step * 0.6)));
        let label = &labels[axis];
        let w = Canvas::text_width(label, scale);
        let h = Canvas::text_height(scale);
        let x = (label_at.0 - w / 2.0).clamp(2.0, (projector.size as f32 - w - 2.0).max(2.0));
        let y = (label_at.1 - h / 2.0).clamp(2.0, (projector.size as f32 - h - 2.0).max(2.0));
        canvas.text((x, y), label, AXIS, scale);
    }
}

/// 1, 2 or 5 times a power of ten, giving roughly five ticks.
fn tick_step(length: f64) -> f64 {
    if length <= 0.0 || !length.is_finite() {
        return 1.0;
    }
    let raw = length / 5.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let norm = raw / magnitude;
    let nice = if norm < 1.5 {
        1.0
    } else if norm < 3.5 {
        2.0
    } else if norm < 7.5 {
        5.0
    } else {
        10.0
    };
    let step = nice * magnitude;
    // Subnormal extents underflow to a zero step.
    if !(step.is_finite() && step > 0.0) {
        return 1.0;
    }
    step
}

fn format_tick(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
