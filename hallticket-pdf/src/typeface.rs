// hallticket-pdf: TrueType text rasterisation onto RGBA surfaces

use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use std::path::Path;

use crate::error::{AppError, Result};

/// DejaVu Sans, used whenever no font file is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

pub struct Typeface {
    font: Font<'static>,
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Typeface").field("glyphs", &self.font.glyph_count()).finish()
    }
}

impl Typeface {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::Config(format!("font {}: {}", path.display(), e)))?;
        Self::from_bytes(bytes)
            .map_err(|_| AppError::Config(format!("font {}: not a usable TrueType file", path.display())))
    }

    pub fn bundled() -> Result<Self> {
        Font::try_from_bytes(BUNDLED_FONT)
            .map(|font| Self { font })
            .ok_or_else(|| AppError::Config("bundled font could not be parsed".into()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Font::try_from_vec(bytes)
            .map(|font| Self { font })
            .ok_or_else(|| AppError::Config("font data could not be parsed".into()))
    }

    pub fn text_width(&self, text: &str, px: f32) -> f32 {
        let scale = Scale::uniform(px);
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .fold(0.0, f32::max)
    }

    /// Draws `text` with its top edge at `top`, alpha-blended over the surface.
    pub fn draw(&self, img: &mut RgbaImage, text: &str, px: f32, left: f32, top: f32, color: Rgba<u8>) {
        let scale = Scale::uniform(px);
        let baseline = top + self.font.v_metrics(scale).ascent;
        let (width, height) = img.dimensions();

        for glyph in self.font.layout(text, scale, point(left, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let x = gx as i32 + bb.min.x;
                let y = gy as i32 + bb.min.y;
                if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
                    return;
                }
                let a = coverage.clamp(0.0, 1.0);
                if a == 0.0 {
                    return;
                }
                let dst = img.get_pixel_mut(x as u32, y as u32);
                let inv = 1.0 - a;
                for c in 0..3 {
                    dst.0[c] = (color.0[c] as f32 * a + dst.0[c] as f32 * inv) as u8;
                }
                dst.0[3] = 255;
            });
        }
    }
}
