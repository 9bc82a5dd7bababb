// hallticket-pdf: runtime settings and template layout tuning

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

/// Name of the background template served next to the dashboard.
pub const DEFAULT_BACKGROUND: &str = "HallTicketBG.jpg";

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the REST backend
    pub api_base: String,
    /// Background template (file path or URL). Defaults to `<api_base>/HallTicketBG.jpg`.
    pub background: Option<String>,
    /// TrueType font used for all ticket text. Defaults to the bundled DejaVu Sans.
    pub font: Option<PathBuf>,
    /// Number of tickets rendered at once
    pub workers: usize,
    pub photo_timeout_ms: u64,
    pub http_timeout_ms: u64,
    /// Pixels per inch used when sizing PDF pages from rendered images
    pub dpi: f32,
    /// Offset applied when printing exam dates
    pub utc_offset_minutes: i32,
    pub layout: TemplateLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            background: None,
            font: None,
            workers: 8,
            photo_timeout_ms: 10_000,
            http_timeout_ms: 30_000,
            dpi: 96.0,
            utc_offset_minutes: 0,
            layout: TemplateLayout::default(),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Invalid JSON in {}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".into()));
        }
        if self.dpi.is_nan() || self.dpi <= 0.0 {
            return Err(AppError::Config(format!("dpi must be positive, got {}", self.dpi)));
        }
        if self.utc_offset().is_none() {
            return Err(AppError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        self.layout.validate()
    }

    pub fn background_source(&self) -> String {
        match &self.background {
            Some(src) => src.clone(),
            None => format!("{}/{}", self.api_base.trim_end_matches('/'), DEFAULT_BACKGROUND),
        }
    }

    pub fn photo_timeout(&self) -> Duration {
        Duration::from_millis(self.photo_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
    }
}

// ============================================================================
// Template layout
// ============================================================================

/// Placement of every element drawn over the background template.
///
/// Values ending in `_ratio` are fractions of the template's width or height so
/// the same layout works for differently sized scans of the template. The rest
/// are pixels at template resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateLayout {
    pub exam_title_y_ratio: f32,
    pub exam_title_size: f32,

    pub register_no_y_ratio: f32,
    pub register_no_size: f32,

    pub photo_width: u32,
    pub photo_height: u32,
    pub photo_right_margin: u32,
    pub photo_top_ratio: f32,
    pub photo_padding: u32,

    pub text_left_ratio: f32,
    pub text_top_ratio: f32,
    pub text_size: f32,
    pub line_height: f32,
    pub field_gap: f32,
    pub institution_wrap_chars: usize,

    pub table_gap: f32,
    pub table_header_height: f32,
    pub table_row_height: f32,
    pub table_text_size: f32,
    /// Relative widths of Date, Subject, Code, Time and Invigilator's Sign
    pub table_columns: [f32; 5],
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            exam_title_y_ratio: 0.14,
            exam_title_size: 34.0,
            register_no_y_ratio: 0.205,
            register_no_size: 26.0,
            photo_width: 150,
            photo_height: 180,
            photo_right_margin: 90,
            photo_top_ratio: 0.24,
            photo_padding: 6,
            text_left_ratio: 0.08,
            text_top_ratio: 0.27,
            text_size: 22.0,
            line_height: 30.0,
            field_gap: 14.0,
            institution_wrap_chars: 40,
            table_gap: 36.0,
            table_header_height: 44.0,
            table_row_height: 40.0,
            table_text_size: 18.0,
            table_columns: [0.16, 0.32, 0.14, 0.16, 0.22],
        }
    }
}

impl TemplateLayout {
    pub fn validate(&self) -> Result<()> {
        if self.institution_wrap_chars == 0 {
            return Err(AppError::Config("institution_wrap_chars must be at least 1".into()));
        }
        if self.table_columns.iter().any(|w| *w < 0.0) || self.table_columns.iter().sum::<f32>() <= 0.0 {
            return Err(AppError::Config("table_columns must be non-negative and not all zero".into()));
        }
        let ratios = [
            self.exam_title_y_ratio,
            self.register_no_y_ratio,
            self.photo_top_ratio,
            self.text_left_ratio,
            self.text_top_ratio,
        ];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(AppError::Config("layout ratios must lie between 0 and 1".into()));
        }
        Ok(())
    }
}
