// hallticket-pdf: renders every hall ticket of a class and assembles the PDF

use chrono::{Offset, Utc};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::api::HallTicketBackend;
use crate::assembler::{assemble, AssembledDocument};
use crate::cancel::CancelToken;
use crate::compositor::{
    load_photo, BackgroundTemplate, Compositor, PhotoOutcome, PhotoUnavailable, RenderedPage,
};
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::model::{ClassRecord, HallTicketRecord};
use crate::typeface::Typeface;

// ============================================================================
// Progress reporting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// Input position of the ticket that just finished
    pub index: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Whole percent done, rounded down so 100 means every ticket finished.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (self.completed * 100 / self.total) as u32
        }
    }
}

/// Receives one update per finished ticket, in non-decreasing order.
pub trait ProgressSink: Sync {
    fn report(&self, progress: Progress);

    /// Called when a batch fails so the next attempt starts from zero.
    fn reset(&self) {}
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug)]
pub struct BatchDocument {
    pub batch_id: String,
    pub class: ClassRecord,
    pub exam_name: String,
    /// Register numbers in page order
    pub labels: Vec<String>,
    pub document: AssembledDocument,
}

#[derive(Debug)]
pub enum BatchOutcome {
    /// The class has no hall tickets. Not an error.
    Empty { class: ClassRecord },
    Completed(BatchDocument),
}

// ============================================================================
// Service
// ============================================================================

/// Entry point for listing classes, previewing a ticket and running batches.
///
/// Only one batch may run at a time per service.
pub struct HallTicketService {
    backend: Arc<dyn HallTicketBackend>,
    settings: Settings,
    font: Typeface,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl HallTicketService {
    /// Creates a service using the configured font, or the bundled one.
    pub fn new(backend: Arc<dyn HallTicketBackend>, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let font = match &settings.font {
            Some(path) => {
                log::debug!("Using font {}", path.display());
                Typeface::load(path)?
            }
            None => Typeface::bundled()?,
        };
        Ok(Self::with_font(backend, settings, font))
    }

    pub fn with_font(backend: Arc<dyn HallTicketBackend>, settings: Settings, font: Typeface) -> Self {
        Self {
            backend,
            settings,
            font,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn classes(&self) -> Result<Vec<ClassRecord>> {
        self.backend.classes()
    }

    /// Finds a class by id, or by name ignoring case.
    pub fn resolve_class(&self, key: &str) -> Result<ClassRecord> {
        let classes = self.classes()?;
        let key = key.trim();
        classes
            .iter()
            .find(|c| c.id == key)
            .or_else(|| classes.iter().find(|c| c.class_name.eq_ignore_ascii_case(key)))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("class '{}'", key)))
    }

    /// Renders the first ticket of `class` without progress tracking, so the
    /// template can be checked before running a whole batch.
    pub fn render_preview(
        &self,
        class: &ClassRecord,
        exam_name: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Option<RenderedPage>> {
        let bulk = self.backend.bulk_download(&class.id)?;
        let Some(record) = bulk.hall_tickets.first() else {
            log::info!("No hall tickets to preview for {}", class.class_name);
            return Ok(None);
        };
        let exam_name = exam_name.or(bulk.exam_name.as_deref()).unwrap_or_default();
        let background = self.load_background()?;
        let compositor = self.compositor();
        self.render_one(&compositor, record, exam_name, &background, cancel)
            .map(Some)
    }

    /// Generates the hall ticket document for every student of `class`.
    pub fn download(
        &self,
        class: &ClassRecord,
        exam_name: Option<&str>,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::BatchInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let batch_id = generate_short_id();
        log::info!("[{}] Generating hall tickets for {} ({})", batch_id, class.class_name, class.id);

        let result = self.run_batch(&batch_id, class, exam_name, progress, cancel);
        if let Err(e) = &result {
            log::error!("[{}] Batch failed: {}", batch_id, e);
            progress.reset();
        }
        result
    }

    fn run_batch(
        &self,
        batch_id: &str,
        class: &ClassRecord,
        exam_name: Option<&str>,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome> {
        let bulk = self.backend.bulk_download(&class.id)?;
        if bulk.hall_tickets.is_empty() {
            log::info!("[{}] No hall tickets found for {}", batch_id, class.class_name);
            return Ok(BatchOutcome::Empty { class: class.clone() });
        }
        let exam_name = exam_name
            .map(str::to_string)
            .or(bulk.exam_name)
            .unwrap_or_default();

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        // Fetched once, shared read-only by every worker
        let background = self.load_background()?;
        let (width, height) = background.dimensions();
        log::info!(
            "[{}] {} tickets on a {}x{} template",
            batch_id,
            bulk.hall_tickets.len(),
            width,
            height
        );

        let pages = self.render_all(&bulk.hall_tickets, &exam_name, &background, progress, cancel)?;
        let labels = pages.iter().map(|p| p.label.clone()).collect();

        let title = format!("Hall Tickets - {}", class.class_name);
        let document = assemble(&pages, &title, self.settings.dpi)?;
        log::info!("[{}] Assembled {} pages", batch_id, document.page_count());

        Ok(BatchOutcome::Completed(BatchDocument {
            batch_id: batch_id.to_string(),
            class: class.clone(),
            exam_name,
            labels,
            document,
        }))
    }

    /// Renders all records on a pool of `workers` threads. Output order is
    /// input order regardless of which ticket finishes first.
    fn render_all(
        &self,
        records: &[HallTicketRecord],
        exam_name: &str,
        background: &BackgroundTemplate,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Vec<RenderedPage>> {
        let total = records.len();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.clamp(1, total.max(1)))
            .build()
            .map_err(|e| AppError::Render(format!("could not start render workers: {}", e)))?;
        let compositor = self.compositor();
        let completed = Mutex::new(0usize);

        let pages = pool.install(|| {
            records
                .par_iter()
                .enumerate()
                .map(|(index, record)| {
                    if cancel.is_cancelled() {
                        return Err(AppError::Cancelled);
                    }
                    let page = self.render_one(&compositor, record, exam_name, background, cancel)?;

                    // Count and report under one lock so updates stay ordered
                    let mut count = completed.lock().unwrap_or_else(|e| e.into_inner());
                    if cancel.is_cancelled() {
                        return Err(AppError::Cancelled);
                    }
                    *count += 1;
                    progress.report(Progress { completed: *count, total, index });
                    Ok(page)
                })
                .collect::<Result<Vec<_>>>()
        });

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        pages
    }

    fn render_one(
        &self,
        compositor: &Compositor<'_>,
        record: &HallTicketRecord,
        exam_name: &str,
        background: &BackgroundTemplate,
        cancel: &CancelToken,
    ) -> Result<RenderedPage> {
        let photo = load_photo(&self.backend, record.photo_url(), self.settings.photo_timeout(), cancel);
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if let PhotoOutcome::Unavailable(reason) = &photo {
            if *reason == PhotoUnavailable::Missing {
                log::debug!("{}: no photo on record", record.register_no());
            } else {
                log::warn!("{}: rendering without photo ({})", record.register_no(), reason);
            }
        }
        let page = compositor.compose(record, exam_name, background, &photo)?;
        log::debug!(
            "{}: rendered {} bytes{}",
            page.label,
            page.image_bytes.len(),
            if photo.is_loaded() { " with photo" } else { "" }
        );
        Ok(page)
    }

    fn compositor(&self) -> Compositor<'_> {
        Compositor {
            layout: &self.settings.layout,
            font: &self.font,
            utc_offset: self.settings.utc_offset().unwrap_or_else(|| Utc.fix()),
        }
    }

    fn load_background(&self) -> Result<BackgroundTemplate> {
        let bytes = self.backend.background()?;
        BackgroundTemplate::decode(&bytes)
    }
}

fn generate_short_id() -> String {
    let uuid = Uuid::new_v4();
    let hex = format!("{:x}", uuid);
    hex[..8].to_uppercase()
}
