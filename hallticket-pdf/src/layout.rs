// hallticket-pdf: placement of ticket elements over the background template
//
// Layout is computed separately from painting so positions can be checked
// without rasterising anything.

use chrono::FixedOffset;
use image::Rgba;

use crate::config::TemplateLayout;
use crate::model::HallTicketRecord;
use crate::typeface::Typeface;

pub const TABLE_HEADERS: [&str; 5] = ["Date", "Subject", "Code", "Time", "Invigilator's Sign"];

pub const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);
pub const HEADER_FILL: Rgba<u8> = Rgba([33, 37, 41, 255]);
pub const HEADER_INK: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const RULE: Rgba<u8> = Rgba([90, 90, 90, 255]);
pub const PHOTO_BACKING: Rgba<u8> = Rgba([255, 255, 255, 255]);

const CELL_PADDING: f32 = 8.0;

// ============================================================================
// Draw operations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// What a text operation shows, so callers can find a field's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ExamTitle,
    RegisterNo,
    CandidateName,
    Institution,
    ClassName,
    TableHeader,
    TableCell,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        field: Field,
        text: String,
        left: f32,
        top: f32,
        size: f32,
        color: Rgba<u8>,
    },
    Fill {
        rect: Rect,
        color: Rgba<u8>,
    },
    Stroke {
        rect: Rect,
        color: Rgba<u8>,
    },
    /// Axis-aligned one pixel rule
    Line {
        from: (f32, f32),
        to: (f32, f32),
        color: Rgba<u8>,
    },
    /// Photo area; painted only when the photo loaded.
    Photo {
        backing: Rect,
        frame: Rect,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketLayout {
    pub width: u32,
    pub height: u32,
    pub ops: Vec<DrawOp>,
}

impl TicketLayout {
    /// Top edge of the first text drawn for `field`.
    pub fn field_top(&self, field: Field) -> Option<f32> {
        self.texts(field).next().map(|(_, top)| top)
    }

    pub fn texts(&self, field: Field) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.ops.iter().filter_map(move |op| match op {
            DrawOp::Text { field: f, text, top, .. } if *f == field => Some((text.as_str(), *top)),
            _ => None,
        })
    }

    pub fn table_border(&self) -> Option<Rect> {
        self.ops.iter().rev().find_map(|op| match op {
            DrawOp::Stroke { rect, .. } => Some(*rect),
            _ => None,
        })
    }
}

// ============================================================================
// Layout
// ============================================================================

pub struct LayoutContext<'a> {
    pub layout: &'a TemplateLayout,
    pub font: &'a Typeface,
    pub utc_offset: FixedOffset,
}

pub fn layout_ticket(
    ctx: &LayoutContext<'_>,
    record: &HallTicketRecord,
    exam_name: &str,
    width: u32,
    height: u32,
) -> TicketLayout {
    let cfg = ctx.layout;
    let w = width as f32;
    let h = height as f32;
    let mut ops = Vec::new();

    // Exam title
    push_centered(
        &mut ops,
        ctx,
        Field::ExamTitle,
        exam_name,
        w / 2.0,
        h * cfg.exam_title_y_ratio,
        cfg.exam_title_size,
        INK,
    );

    // Photo slot, anchored to the right edge
    let frame = Rect {
        x: w - cfg.photo_right_margin as f32 - cfg.photo_width as f32,
        y: h * cfg.photo_top_ratio,
        w: cfg.photo_width as f32,
        h: cfg.photo_height as f32,
    };
    let pad = cfg.photo_padding as f32;
    let backing = Rect {
        x: frame.x - pad,
        y: frame.y - pad,
        w: frame.w + 2.0 * pad,
        h: frame.h + 2.0 * pad,
    };
    ops.push(DrawOp::Photo { backing, frame });

    push_centered(
        &mut ops,
        ctx,
        Field::RegisterNo,
        record.register_no(),
        w / 2.0,
        h * cfg.register_no_y_ratio,
        cfg.register_no_size,
        INK,
    );

    // Candidate details, one cursor shared by every block
    let left = w * cfg.text_left_ratio;
    let mut cursor = h * cfg.text_top_ratio;

    push_text(
        &mut ops,
        Field::CandidateName,
        format!("Candidate Name : {}", record.student_name()),
        left,
        cursor,
        cfg.text_size,
    );
    cursor += cfg.line_height + cfg.field_gap;

    let prefix = "Institution : ";
    let indent = ctx.font.text_width(prefix, cfg.text_size);
    for (i, line) in wrap_text(record.institution(), cfg.institution_wrap_chars)
        .into_iter()
        .enumerate()
    {
        let (text, x) = if i == 0 {
            (format!("{prefix}{line}"), left)
        } else {
            (line, left + indent)
        };
        push_text(&mut ops, Field::Institution, text, x, cursor, cfg.text_size);
        cursor += cfg.line_height;
    }
    cursor += cfg.field_gap;

    push_text(
        &mut ops,
        Field::ClassName,
        format!("Class : {}", record.class_name()),
        left,
        cursor,
        cfg.text_size,
    );
    cursor += cfg.line_height;

    layout_subjects(&mut ops, ctx, record, left, w - 2.0 * left, cursor + cfg.table_gap);

    TicketLayout { width, height, ops }
}

fn layout_subjects(
    ops: &mut Vec<DrawOp>,
    ctx: &LayoutContext<'_>,
    record: &HallTicketRecord,
    left: f32,
    width: f32,
    top: f32,
) {
    let cfg = ctx.layout;
    let total: f32 = cfg.table_columns.iter().sum();
    let mut column_x = [0.0f32; 5];
    let mut x = left;
    for (i, ratio) in cfg.table_columns.iter().enumerate() {
        column_x[i] = x;
        x += width * ratio / total;
    }

    let header = Rect { x: left, y: top, w: width, h: cfg.table_header_height };
    ops.push(DrawOp::Fill { rect: header, color: HEADER_FILL });
    let header_text_top = top + (cfg.table_header_height - cfg.table_text_size) / 2.0;
    for (label, cx) in TABLE_HEADERS.iter().zip(column_x) {
        ops.push(DrawOp::Text {
            field: Field::TableHeader,
            text: label.to_string(),
            left: cx + CELL_PADDING,
            top: header_text_top,
            size: cfg.table_text_size,
            color: HEADER_INK,
        });
    }

    let subjects = record.subjects();
    let body_top = header.bottom();
    for (row, subject) in subjects.iter().enumerate() {
        let row_top = body_top + row as f32 * cfg.table_row_height;
        let text_top = row_top + (cfg.table_row_height - cfg.table_text_size) / 2.0;
        let cells = [
            subject.display_date(ctx.utc_offset),
            subject.subject_name().to_string(),
            subject.subject_code().to_string(),
            subject.display_time(),
        ];
        for (cell, cx) in cells.into_iter().zip(column_x) {
            ops.push(DrawOp::Text {
                field: Field::TableCell,
                text: cell,
                left: cx + CELL_PADDING,
                top: text_top,
                size: cfg.table_text_size,
                color: INK,
            });
        }
        if row > 0 {
            ops.push(DrawOp::Line {
                from: (left, row_top),
                to: (left + width, row_top),
                color: RULE,
            });
        }
    }

    let border = Rect {
        x: left,
        y: top,
        w: width,
        h: cfg.table_header_height + subjects.len() as f32 * cfg.table_row_height,
    };
    for cx in &column_x[1..] {
        ops.push(DrawOp::Line {
            from: (*cx, border.y),
            to: (*cx, border.bottom()),
            color: RULE,
        });
    }
    ops.push(DrawOp::Stroke { rect: border, color: RULE });
}

fn push_text(ops: &mut Vec<DrawOp>, field: Field, text: String, left: f32, top: f32, size: f32) {
    ops.push(DrawOp::Text { field, text, left, top, size, color: INK });
}

#[allow(clippy::too_many_arguments)]
fn push_centered(
    ops: &mut Vec<DrawOp>,
    ctx: &LayoutContext<'_>,
    field: Field,
    text: &str,
    center_x: f32,
    top: f32,
    size: f32,
    color: Rgba<u8>,
) {
    let left = center_x - ctx.font.text_width(text, size) / 2.0;
    ops.push(DrawOp::Text {
        field,
        text: text.to_string(),
        left,
        top,
        size,
        color,
    });
}

/// Word wraps `text` into lines of at most `max_chars` characters.
/// Words longer than a line are split. Always yields at least one line.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let used = current.chars().count();
            let needed = if used == 0 { word.len() } else { used + 1 + word.len() };
            if needed <= max_chars {
                if used > 0 {
                    current.push(' ');
                }
                current.extend(word.iter());
                break;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            // Word alone is too long for a line
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HallTicketDetails, SubjectEntry, SubjectRef, Timestamp};

    fn ctx<'a>(layout: &'a TemplateLayout, font: &'a Typeface) -> LayoutContext<'a> {
        LayoutContext {
            layout,
            font,
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    fn record(institution: &str, subjects: usize) -> HallTicketRecord {
        HallTicketRecord {
            register_no: Some("REG-001".into()),
            student_name: Some("Asha Menon".into()),
            institution: Some(institution.into()),
            class_name: Some("Grade 10".into()),
            image_url: None,
            hall_ticket_details: HallTicketDetails {
                subjects: (0..subjects)
                    .map(|i| SubjectEntry {
                        subject_id: Some(SubjectRef {
                            subject_name: Some(format!("Subject {i}")),
                            subject_code: Some(format!("S{i}")),
                        }),
                        date: Some(Timestamp::Text("2025-03-14".into())),
                        time: Some("09:30".into()),
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap_text("St Mary's Higher Secondary", 12), vec!["St Mary's", "Higher", "Secondary"]);
        assert_eq!(wrap_text("short", 40), vec!["short"]);
        assert_eq!(wrap_text("", 40), vec![""]);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("ab abcdefgh", 4), vec!["ab", "abcd", "efgh"]);
    }

    #[test]
    fn long_institution_pushes_class_down() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let long = "Government Higher Secondary School for Girls, Thiruvananthapuram";
        assert!(long.chars().count() > layout.institution_wrap_chars);

        let short_layout = layout_ticket(&ctx(&layout, &face), &record("GHSS", 0), "Term 1", 1240, 1754);
        let long_layout = layout_ticket(&ctx(&layout, &face), &record(long, 0), "Term 1", 1240, 1754);

        let short_y = short_layout.field_top(Field::ClassName).unwrap();
        let long_y = long_layout.field_top(Field::ClassName).unwrap();
        let wrapped = long_layout.texts(Field::Institution).count();
        assert!(wrapped >= 2);
        assert!(long_y > short_y);
        let expected = (wrapped - 1) as f32 * layout.line_height;
        assert!(((long_y - short_y) - expected).abs() < 0.01);
    }

    #[test]
    fn table_border_tracks_row_count() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let ticket = layout_ticket(&ctx(&layout, &face), &record("GHSS", 4), "Term 1", 1240, 1754);
        let border = ticket.table_border().unwrap();
        assert_eq!(border.h, layout.table_header_height + 4.0 * layout.table_row_height);

        let headers: Vec<_> = ticket.texts(Field::TableHeader).map(|(t, _)| t).collect();
        assert_eq!(headers, TABLE_HEADERS);
        let cells: Vec<_> = ticket.texts(Field::TableCell).map(|(t, _)| t).take(4).collect();
        assert_eq!(cells, ["14-03-2025", "Subject 0", "S0", "09:30 AM"]);

        let class_y = ticket.field_top(Field::ClassName).unwrap();
        assert!(border.y > class_y);
    }

    #[test]
    fn title_position_is_relative_to_height() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let small = layout_ticket(&ctx(&layout, &face), &record("x", 0), "Exam", 600, 800);
        let large = layout_ticket(&ctx(&layout, &face), &record("x", 0), "Exam", 1200, 1600);
        let s = small.field_top(Field::ExamTitle).unwrap();
        let l = large.field_top(Field::ExamTitle).unwrap();
        assert!((l - 2.0 * s).abs() < 0.01);
    }

    #[test]
    fn photo_slot_hugs_right_edge() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let ticket = layout_ticket(&ctx(&layout, &face), &record("x", 0), "Exam", 1000, 1400);
        let frame = ticket
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Photo { frame, .. } => Some(*frame),
                _ => None,
            })
            .unwrap();
        assert_eq!(frame.x + frame.w, 1000.0 - layout.photo_right_margin as f32);
        assert_eq!(frame.w, layout.photo_width as f32);
    }

    #[test]
    fn register_number_is_centred_by_its_measured_width() {
        let layout = TemplateLayout::default();
        let face = Typeface::bundled().unwrap();
        let ticket = layout_ticket(&ctx(&layout, &face), &record("x", 0), "Exam", 1000, 1400);
        let left = ticket
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Text { field: Field::RegisterNo, left, .. } => Some(*left),
                _ => None,
            })
            .unwrap();
        let width = face.text_width("REG-001", layout.register_no_size);
        assert!(width > 0.0);
        assert!((left + width / 2.0 - 500.0).abs() < 0.01);
    }
}
