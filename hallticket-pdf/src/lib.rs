//! Bulk hall ticket generation.
//!
//! Fetches a class's hall ticket records from the institution backend, draws
//! each student's details and photo over a shared background template and
//! assembles the tickets into one PDF, one page per student.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hallticket_pdf::{ApiClient, CancelToken, HallTicketService, NoProgress, Session, Settings};
//!
//! # fn main() -> hallticket_pdf::Result<()> {
//! let settings = Settings::default();
//! let api = ApiClient::new(&settings, Session::with_token("secret"));
//! let service = HallTicketService::new(Arc::new(api), settings)?;
//! let class = service.resolve_class("Grade 10")?;
//! service.download(&class, None, &NoProgress, &CancelToken::new())?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod assembler;
pub mod batch;
pub mod cancel;
pub mod compositor;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod typeface;

pub use api::{ApiClient, HallTicketBackend, Session};
pub use assembler::{assemble, AssembledDocument, Orientation, PageGeometry};
pub use batch::{BatchDocument, BatchOutcome, HallTicketService, NoProgress, Progress, ProgressSink};
pub use cancel::CancelToken;
pub use compositor::{BackgroundTemplate, Compositor, PhotoOutcome, PhotoUnavailable, RenderedPage};
pub use config::{Settings, TemplateLayout};
pub use error::{AppError, Result};
pub use model::{BulkDownload, ClassRecord, HallTicketRecord};
pub use typeface::Typeface;
