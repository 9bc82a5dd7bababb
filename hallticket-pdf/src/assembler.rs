// hallticket-pdf: lays rendered tickets out as the pages of one PDF

use printpdf::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::compositor::RenderedPage;
use crate::error::{AppError, Result};

const MM_PER_INCH: f32 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Physical size of one page, derived from its image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub width_mm: f32,
    pub height_mm: f32,
    pub orientation: Orientation,
}

impl PageGeometry {
    pub fn for_image(pixel_width: u32, pixel_height: u32, dpi: f32) -> Self {
        let orientation = if pixel_width > pixel_height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        Self {
            pixel_width,
            pixel_height,
            width_mm: pixel_width as f32 * MM_PER_INCH / dpi,
            height_mm: pixel_height as f32 * MM_PER_INCH / dpi,
            orientation,
        }
    }
}

#[derive(Debug)]
pub struct AssembledDocument {
    pub pages: Vec<PageGeometry>,
    pub bytes: Vec<u8>,
}

impl AssembledDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&self.bytes)?;
        writer.flush()?;
        Ok(())
    }
}

/// `<className>.pdf`, with characters that would escape the directory replaced.
pub fn document_file_name(class_name: &str) -> String {
    let cleaned: String = class_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let stem = cleaned.trim_matches('.');
    if stem.is_empty() {
        "hall-tickets.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

pub fn output_path(dir: &Path, class_name: &str) -> PathBuf {
    dir.join(document_file_name(class_name))
}

/// Builds one page per rendered ticket, in the given order. Every page takes the
/// size and orientation of its own image and the image fills it exactly.
///
/// A ticket whose JPEG cannot be decoded fails the whole document.
pub fn assemble(pages: &[RenderedPage], title: &str, dpi: f32) -> Result<AssembledDocument> {
    let Some(first) = pages.first() else {
        return Err(AppError::Assembly("no pages to assemble".into()));
    };

    let first_geometry = PageGeometry::for_image(first.pixel_width, first.pixel_height, dpi);
    let (doc, page1, layer1) = PdfDocument::new(
        title,
        Mm(first_geometry.width_mm),
        Mm(first_geometry.height_mm),
        "Layer 1",
    );

    let mut geometries = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        let geometry = PageGeometry::for_image(page.pixel_width, page.pixel_height, dpi);
        let layer = if index == 0 {
            doc.get_page(page1).get_layer(layer1)
        } else {
            let (page_idx, layer_idx) = doc.add_page(
                Mm(geometry.width_mm),
                Mm(geometry.height_mm),
                "Layer 1",
            );
            doc.get_page(page_idx).get_layer(layer_idx)
        };
        embed_page_image(&layer, page, dpi)
            .map_err(|e| AppError::Assembly(format!("page {} ({}): {}", index + 1, page.label, e)))?;
        log::debug!("Added page {} ({}x{} px)", index + 1, page.pixel_width, page.pixel_height);
        geometries.push(geometry);
    }

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| AppError::Pdf(e.to_string()))?;

    Ok(AssembledDocument { pages: geometries, bytes })
}

fn embed_page_image(layer: &PdfLayerReference, page: &RenderedPage, dpi: f32) -> Result<()> {
    let decoded = ::image::load_from_memory_with_format(&page.image_bytes, ::image::ImageFormat::Jpeg)
        .map_err(|e| AppError::Image(e.to_string()))?;
    let rgb_image = decoded.to_rgb8();
    let (width, height) = rgb_image.dimensions();
    if (width, height) != (page.pixel_width, page.pixel_height) {
        return Err(AppError::Image(format!(
            "image is {}x{} but page expects {}x{}",
            width, height, page.pixel_width, page.pixel_height
        )));
    }

    let image = Image::from(ImageXObject {
        width: Px(width as usize),
        height: Px(height as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: rgb_image.into_raw(),
        image_filter: None,
        clipping_bbox: None,
        smask: None,
    });

    // At this DPI the image's physical size equals the page's
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(0.0)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );

    Ok(())
}
