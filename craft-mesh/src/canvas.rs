use image::{Rgba, RgbaImage};

use crate::glyphs;

pub type Rgb = [u8; 3];

/// Square RGBA canvas with straight-alpha blending.
pub struct Canvas {
    pub image: RgbaImage,
}

impl Canvas {
    pub fn new(size: u32, background: Rgb) -> Self {
        let [r, g, b] = background;
        Self {
            image: RgbaImage::from_pixel(size, size, Rgba([r, g, b, 255])),
        }
    }

    pub fn blend(&mut self, x: i64, y: i64, color: Rgb, alpha: f32) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        let px = self.image.get_pixel_mut(x as u32, y as u32);
        let a = alpha.clamp(0.0, 1.0);
        for c in 0..3 {
            let dst = px.0[c] as f32;
            px.0[c] = (dst + (color[c] as f32 - dst) * a).round() as u8;
        }
    }

    /// Fill a screen-space triangle; pixel centers inside (either winding) are covered.
    pub fn fill_triangle(&mut self, tri: [(f32, f32); 3], color: Rgb, alpha: f32) {
        let [a, b, c] = tri;
        let area = edge(a, b, c);
        if area.abs() < 1e-6 {
            return;
        }
        let w = self.image.width() as f32;
        let h = self.image.height() as f32;
        let min_x = a.0.min(b.0).min(c.0).floor().max(0.0) as i64;
        let max_x = a.0.max(b.0).max(c.0).ceil().min(w - 1.0) as i64;
        let min_y = a.1.min(b.1).min(c.1).floor().max(0.0) as i64;
        let max_y = a.1.max(b.1).max(c.1).ceil().min(h - 1.0) as i64;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    self.blend(x, y, color, alpha);
                }
            }
        }
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb, alpha: f32) {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i64;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = (from.0 + dx * t).round() as i64;
            let y = (from.1 + dy * t).round() as i64;
            self.blend(x, y, color, alpha);
        }
    }

    /// Draw text with its top-left corner at `origin`. Unknown glyphs leave a gap.
    pub fn text(&mut self, origin: (f32, f32), text: &str, color: Rgb, scale: u32) {
        let (ox, oy) = (origin.0.round() as i64, origin.1.round() as i64);
        let advance = ((glyphs::WIDTH + 1) * scale) as i64;
        for (i, ch) in text.chars().enumerate() {
            let Some(rows) = glyphs::glyph(ch) else {
                continue;
            };
            let gx = ox + i as i64 * advance;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..glyphs::WIDTH {
                    if bits & (1 << (glyphs::WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let x = gx + (col * scale + sx) as i64;
                            let y = oy + (row as u32 * scale + sy) as i64;
                            self.blend(x, y, color, 1.0);
                        }
                    }
                }
            }
        }
    }

    pub fn text_width(text: &str, scale: u32) -> f32 {
        (text.chars().count() as u32 * (glyphs::WIDTH + 1) * scale) as f32
    }

    pub fn text_height(scale: u32) -> f32 {
        (glyphs::HEIGHT * scale) as f32
    }
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb = [255, 255, 255];

    #[test]
    fn triangle_covers_its_interior_in_both_windings() {
        for tri in [
            [(10.0, 10.0), (50.0, 10.0), (10.0, 50.0)],
            [(10.0, 10.0), (10.0, 50.0), (50.0, 10.0)],
        ] {
            let mut c = Canvas::new(64, WHITE);
            c.fill_triangle(tri, [0, 0, 0], 1.0);
            assert_eq!(c.image.get_pixel(15, 15).0, [0, 0, 0, 255]);
            assert_eq!(c.image.get_pixel(60, 60).0, [255, 255, 255, 255]);
        }
    }

    #[test]
    fn half_alpha_blends_towards_color() {
        let mut c = Canvas::new(4, WHITE);
        c.blend(1, 1, [0, 0, 0], 0.5);
        assert_eq!(c.image.get_pixel(1, 1).0[0], 128);
        // out of bounds is ignored
        c.blend(-1, 9, [0, 0, 0], 1.0);
    }
}
