// hallticket-pdf: paints one student's hall ticket over the background template

use base64::Engine;
use chrono::FixedOffset;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::api::HallTicketBackend;
use crate::cancel::CancelToken;
use crate::config::TemplateLayout;
use crate::error::{AppError, Result};
use crate::layout::{layout_ticket, DrawOp, LayoutContext, Rect, PHOTO_BACKING};
use crate::model::HallTicketRecord;
use crate::typeface::Typeface;

/// JPEG quality of rendered tickets
pub const JPEG_QUALITY: u8 = 95;

/// Width of table rules and borders, in pixels
const RULE_WIDTH: f32 = 2.0;

/// How often a photo wait re-checks for cancellation
const PHOTO_POLL: Duration = Duration::from_millis(25);

// ============================================================================
// Inputs and outputs
// ============================================================================

/// The shared template every ticket in a batch is drawn on. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct BackgroundTemplate {
    image: RgbaImage,
}

impl BackgroundTemplate {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| AppError::Image(format!("background template: {}", e)))?;
        Ok(Self { image: image.to_rgba8() })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// One finished ticket, JPEG encoded at the template's pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// Register number of the student on the ticket
    pub label: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub image_bytes: Vec<u8>,
}

impl RenderedPage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image_bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.to_base64())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhotoUnavailable {
    Missing,
    Fetch(String),
    Decode(String),
    TimedOut(Duration),
    Cancelled,
}

impl std::fmt::Display for PhotoUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhotoUnavailable::Missing => write!(f, "no photo on record"),
            PhotoUnavailable::Fetch(e) => write!(f, "fetch failed: {}", e),
            PhotoUnavailable::Decode(e) => write!(f, "not an image: {}", e),
            PhotoUnavailable::TimedOut(after) => write!(f, "timed out after {}ms", after.as_millis()),
            PhotoUnavailable::Cancelled => write!(f, "batch cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PhotoOutcome {
    Loaded(RgbaImage),
    Unavailable(PhotoUnavailable),
}

impl PhotoOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, PhotoOutcome::Loaded(_))
    }
}

// ============================================================================
// Photo loading
// ============================================================================

/// Fetches and decodes a student photo on a helper thread, giving up after
/// `timeout` or as soon as `cancel` fires. Never fails: every problem becomes
/// `PhotoOutcome::Unavailable`.
pub fn load_photo(
    backend: &Arc<dyn HallTicketBackend>,
    url: Option<&str>,
    timeout: Duration,
    cancel: &CancelToken,
) -> PhotoOutcome {
    let Some(url) = url else {
        return PhotoOutcome::Unavailable(PhotoUnavailable::Missing);
    };

    let (tx, rx) = mpsc::channel();
    let worker_backend = Arc::clone(backend);
    let worker_url = url.to_string();
    thread::spawn(move || {
        let outcome = match worker_backend.photo(&worker_url) {
            Ok(bytes) => match image::load_from_memory(&bytes) {
                Ok(img) => PhotoOutcome::Loaded(img.to_rgba8()),
                Err(e) => PhotoOutcome::Unavailable(PhotoUnavailable::Decode(e.to_string())),
            },
            Err(e) => PhotoOutcome::Unavailable(PhotoUnavailable::Fetch(e.to_string())),
        };
        // Receiver is gone if the wait already gave up
        let _ = tx.send(outcome);
    });

    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return PhotoOutcome::Unavailable(PhotoUnavailable::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PhotoOutcome::Unavailable(PhotoUnavailable::TimedOut(timeout));
        }
        match rx.recv_timeout(remaining.min(PHOTO_POLL)) {
            Ok(outcome) => return outcome,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return PhotoOutcome::Unavailable(PhotoUnavailable::Fetch("photo loader exited".into()))
            }
        }
    }
}

// ============================================================================
// Compositor
// ============================================================================

pub struct Compositor<'a> {
    pub layout: &'a TemplateLayout,
    pub font: &'a Typeface,
    pub utc_offset: FixedOffset,
}

impl Compositor<'_> {
    /// Draws `record` over `background` and encodes the result.
    pub fn compose(
        &self,
        record: &HallTicketRecord,
        exam_name: &str,
        background: &BackgroundTemplate,
        photo: &PhotoOutcome,
    ) -> Result<RenderedPage> {
        let (width, height) = background.dimensions();
        let ctx = LayoutContext {
            layout: self.layout,
            font: self.font,
            utc_offset: self.utc_offset,
        };
        let ticket = layout_ticket(&ctx, record, exam_name, width, height);

        let mut surface = background.image.clone();
        for op in &ticket.ops {
            match op {
                DrawOp::Text { text, left, top, size, color, .. } => {
                    self.font.draw(&mut surface, text, *size, *left, *top, *color)
                }
                DrawOp::Fill { rect, color } => fill_rect(&mut surface, *rect, *color),
                DrawOp::Stroke { rect, color } => stroke_rect(&mut surface, *rect, *color),
                DrawOp::Line { from, to, color } => draw_rule(&mut surface, *from, *to, *color),
                DrawOp::Photo { backing, frame } => {
                    if let PhotoOutcome::Loaded(img) = photo {
                        fill_rect(&mut surface, *backing, PHOTO_BACKING);
                        let fitted = imageops::resize(
                            img,
                            frame.w.max(1.0) as u32,
                            frame.h.max(1.0) as u32,
                            FilterType::Triangle,
                        );
                        imageops::overlay(&mut surface, &fitted, frame.x as i64, frame.y as i64);
                    }
                }
            }
        }

        let image_bytes = encode_jpeg(surface)?;
        Ok(RenderedPage {
            label: record.register_no().to_string(),
            pixel_width: width,
            pixel_height: height,
            image_bytes,
        })
    }
}

fn encode_jpeg(surface: RgbaImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(surface).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| AppError::Render(format!("JPEG encoding failed: {}", e)))?;
    Ok(bytes)
}

// ============================================================================
// Drawing Utilities
// ============================================================================

fn fill_rect(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
    let (width, height) = img.dimensions();
    let x0 = rect.x.round().max(0.0) as u32;
    let y0 = rect.y.round().max(0.0) as u32;
    let x1 = ((rect.x + rect.w).round().max(0.0) as u32).min(width);
    let y1 = ((rect.y + rect.h).round().max(0.0) as u32).min(height);
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

fn stroke_rect(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
    let (l, t, r, b) = (rect.x, rect.y, rect.x + rect.w, rect.bottom());
    draw_rule(img, (l, t), (r, t), color);
    draw_rule(img, (l, b), (r, b), color);
    draw_rule(img, (l, t), (l, b), color);
    draw_rule(img, (r, t), (r, b), color);
}

/// Horizontal or vertical rule centred on the given line.
fn draw_rule(img: &mut RgbaImage, from: (f32, f32), to: (f32, f32), color: Rgba<u8>) {
    let half = RULE_WIDTH / 2.0;
    let rect = Rect {
        x: from.0.min(to.0) - half,
        y: from.1.min(to.1) - half,
        w: (to.0 - from.0).abs() + RULE_WIDTH,
        h: (to.1 - from.1).abs() + RULE_WIDTH,
    };
    fill_rect(img, rect, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BulkDownload, ClassRecord};
    use image::Rgb;

    const PAPER: Rgba<u8> = Rgba([200, 200, 200, 255]);

    struct PhotoOnly {
        delay: Duration,
        bytes: std::result::Result<Vec<u8>, String>,
    }

    impl HallTicketBackend for PhotoOnly {
        fn classes(&self) -> Result<Vec<ClassRecord>> {
            Ok(Vec::new())
        }
        fn bulk_download(&self, _class_id: &str) -> Result<BulkDownload> {
            Ok(BulkDownload::default())
        }
        fn background(&self) -> Result<Vec<u8>> {
            Err(AppError::NotFound("background".into()))
        }
        fn photo(&self, _url: &str) -> Result<Vec<u8>> {
            thread::sleep(self.delay);
            self.bytes.clone().map_err(AppError::Network)
        }
    }

    fn png_bytes(color: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(12, 12, color);
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn backend(delay_ms: u64, bytes: std::result::Result<Vec<u8>, String>) -> Arc<dyn HallTicketBackend> {
        Arc::new(PhotoOnly { delay: Duration::from_millis(delay_ms), bytes })
    }

    fn compositor<'a>(layout: &'a TemplateLayout, font: &'a Typeface) -> Compositor<'a> {
        Compositor {
            layout,
            font,
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    fn record() -> HallTicketRecord {
        HallTicketRecord {
            register_no: Some("REG-7".into()),
            student_name: Some("Ravi".into()),
            ..HallTicketRecord::default()
        }
    }

    fn decode(page: &RenderedPage) -> image::RgbImage {
        image::load_from_memory(&page.image_bytes).unwrap().to_rgb8()
    }

    #[test]
    fn page_without_photo_keeps_template_size() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let background = BackgroundTemplate::from_image(RgbaImage::from_pixel(400, 600, PAPER));
        let photo = PhotoOutcome::Unavailable(PhotoUnavailable::Missing);

        let page = compositor(&layout, &face).compose(&record(), "Term 1", &background, &photo).unwrap();

        assert_eq!(page.label, "REG-7");
        assert_eq!((page.pixel_width, page.pixel_height), (400, 600));
        assert_eq!(decode(&page).dimensions(), (400, 600));
        assert!(page.data_url().starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn loaded_photo_is_drawn_in_its_frame() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let background = BackgroundTemplate::from_image(RgbaImage::from_pixel(400, 600, PAPER));
        let photo = PhotoOutcome::Loaded(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));

        let page = compositor(&layout, &face).compose(&record(), "Term 1", &background, &photo).unwrap();

        let cx = 400 - layout.photo_right_margin - layout.photo_width / 2;
        let cy = (600.0 * layout.photo_top_ratio) as u32 + layout.photo_height / 2;
        let Rgb([r, g, b]) = *decode(&page).get_pixel(cx, cy);
        assert!(r > 200 && g < 60 && b < 60, "expected red photo, got {r},{g},{b}");
    }

    #[test]
    fn header_row_is_dark() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let background = BackgroundTemplate::from_image(RgbaImage::from_pixel(400, 600, PAPER));
        let photo = PhotoOutcome::Unavailable(PhotoUnavailable::Missing);
        let ctx = LayoutContext { layout: &layout, font: &face, utc_offset: FixedOffset::east_opt(0).unwrap() };
        let header = layout_ticket(&ctx, &record(), "Term 1", 400, 600)
            .ops
            .into_iter()
            .find_map(|op| match op {
                DrawOp::Fill { rect, .. } => Some(rect),
                _ => None,
            })
            .unwrap();

        let page = compositor(&layout, &face).compose(&record(), "Term 1", &background, &photo).unwrap();
        // Above the header labels, clear of the border rule
        let Rgb([r, _, _]) = *decode(&page).get_pixel(
            (header.x + header.w / 3.0) as u32,
            (header.y + 5.0) as u32,
        );
        assert!(r < 80);
    }

    fn count_pixels(img: &image::RgbImage, area: Rect, pred: impl Fn(&Rgb<u8>) -> bool) -> usize {
        let (x0, y0) = (area.x.max(0.0) as u32, area.y.max(0.0) as u32);
        let x1 = ((area.x + area.w) as u32).min(img.width());
        let y1 = ((area.y + area.h) as u32).min(img.height());
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|(x, y)| pred(img.get_pixel(*x, *y)))
            .count()
    }

    #[test]
    fn register_number_and_headers_are_drawn() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let background = BackgroundTemplate::from_image(RgbaImage::from_pixel(600, 840, PAPER));
        let photo = PhotoOutcome::Unavailable(PhotoUnavailable::Missing);
        let band = Rect {
            x: 0.0,
            y: 840.0 * layout.register_no_y_ratio,
            w: 600.0,
            h: layout.register_no_size * 1.2,
        };
        let dark = |p: &Rgb<u8>| p.0[0] < 100;

        let page = compositor(&layout, &face).compose(&record(), "Term 1", &background, &photo).unwrap();
        let img = decode(&page);
        assert!(count_pixels(&img, band, dark) > 30, "register number missing from its band");

        let blank = HallTicketRecord { register_no: None, ..record() };
        let page = compositor(&layout, &face).compose(&blank, "Term 1", &background, &photo).unwrap();
        assert_eq!(count_pixels(&decode(&page), band, dark), 0);

        // Light labels on the dark header fill
        let ctx = LayoutContext { layout: &layout, font: &face, utc_offset: FixedOffset::east_opt(0).unwrap() };
        let header = layout_ticket(&ctx, &record(), "Term 1", 600, 840)
            .ops
            .into_iter()
            .find_map(|op| match op {
                DrawOp::Fill { rect, .. } => Some(rect),
                _ => None,
            })
            .unwrap();
        let inner = Rect { x: header.x + 4.0, y: header.y + 4.0, w: header.w - 8.0, h: header.h - 8.0 };
        assert!(count_pixels(&img, inner, |p| p.0[0] > 180) > 30, "header labels missing");
    }

    #[test]
    fn photo_outcomes() {
        let cancel = CancelToken::new();
        let timeout = Duration::from_millis(500);

        assert_eq!(
            unavailable(load_photo(&backend(0, Ok(png_bytes(PAPER))), None, timeout, &cancel)),
            Some(PhotoUnavailable::Missing)
        );
        assert!(load_photo(&backend(0, Ok(png_bytes(PAPER))), Some("a.png"), timeout, &cancel).is_loaded());
        assert!(matches!(
            unavailable(load_photo(&backend(0, Err("404".into())), Some("a.png"), timeout, &cancel)),
            Some(PhotoUnavailable::Fetch(_))
        ));
        assert!(matches!(
            unavailable(load_photo(&backend(0, Ok(b"nope".to_vec())), Some("a.png"), timeout, &cancel)),
            Some(PhotoUnavailable::Decode(_))
        ));
    }

    #[test]
    fn slow_photo_times_out() {
        let started = Instant::now();
        let outcome = load_photo(
            &backend(2_000, Ok(png_bytes(PAPER))),
            Some("slow.png"),
            Duration::from_millis(100),
            &CancelToken::new(),
        );
        assert_eq!(
            unavailable(outcome),
            Some(PhotoUnavailable::TimedOut(Duration::from_millis(100)))
        );
        assert!(started.elapsed() < Duration::from_millis(1_500));
    }

    #[test]
    fn cancelled_wait_returns_promptly() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = load_photo(
            &backend(2_000, Ok(png_bytes(PAPER))),
            Some("slow.png"),
            Duration::from_secs(5),
            &cancel,
        );
        assert_eq!(unavailable(outcome), Some(PhotoUnavailable::Cancelled));
    }

    fn unavailable(outcome: PhotoOutcome) -> Option<PhotoUnavailable> {
        match outcome {
            PhotoOutcome::Unavailable(reason) => Some(reason),
            PhotoOutcome::Loaded(_) => None,
        }
    }
}
