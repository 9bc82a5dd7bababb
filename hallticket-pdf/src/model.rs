// hallticket-pdf: records exchanged with the institution backend

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "className", default)]
    pub class_name: String,
}

/// `GET /class` has been seen both bare and wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ClassListResponse {
    Bare(Vec<ClassRecord>),
    Classes { classes: Vec<ClassRecord> },
    Data { data: Vec<ClassRecord> },
}

impl ClassListResponse {
    pub(crate) fn into_vec(self) -> Vec<ClassRecord> {
        match self {
            ClassListResponse::Bare(v) => v,
            ClassListResponse::Classes { classes } => classes,
            ClassListResponse::Data { data } => data,
        }
    }
}

// ============================================================================
// Hall tickets
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct BulkDownloadRequest<'a> {
    pub class: &'a str,
}

/// Body of `POST /hall-ticket/bulk-download`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownload {
    #[serde(default)]
    pub hall_tickets: Vec<HallTicketRecord>,
    #[serde(default)]
    pub exam_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HallTicketRecord {
    #[serde(default)]
    pub register_no: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub hall_ticket_details: HallTicketDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallTicketDetails {
    #[serde(default)]
    pub subjects: Vec<SubjectEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectEntry {
    #[serde(default)]
    pub subject_id: Option<SubjectRef>,
    #[serde(default)]
    pub date: Option<Timestamp>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRef {
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub subject_code: Option<String>,
}

impl HallTicketRecord {
    pub fn register_no(&self) -> &str {
        self.register_no.as_deref().unwrap_or_default()
    }

    pub fn student_name(&self) -> &str {
        self.student_name.as_deref().unwrap_or_default()
    }

    pub fn institution(&self) -> &str {
        self.institution.as_deref().unwrap_or_default()
    }

    pub fn class_name(&self) -> &str {
        self.class_name.as_deref().unwrap_or_default()
    }

    /// Photo URL, if the record carries a usable one.
    pub fn photo_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn subjects(&self) -> &[SubjectEntry] {
        &self.hall_ticket_details.subjects
    }
}

impl SubjectEntry {
    pub fn subject_name(&self) -> &str {
        self.subject_id
            .as_ref()
            .and_then(|s| s.subject_name.as_deref())
            .unwrap_or_default()
    }

    pub fn subject_code(&self) -> &str {
        self.subject_id
            .as_ref()
            .and_then(|s| s.subject_code.as_deref())
            .unwrap_or_default()
    }

    pub fn display_date(&self, offset: FixedOffset) -> String {
        self.date
            .as_ref()
            .map(|d| d.format_date(offset))
            .unwrap_or_default()
    }

    pub fn display_time(&self) -> String {
        self.time.as_deref().map(format_time_12h).unwrap_or_default()
    }
}

// ============================================================================
// Date / time formatting
// ============================================================================

/// Exam date as sent by the backend: epoch milliseconds or a date string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    /// Formats as `DD-MM-YYYY` in the given offset. Unparseable text is returned as-is.
    pub fn format_date(&self, offset: FixedOffset) -> String {
        match self.to_utc() {
            Some(utc) => utc.with_timezone(&offset).format("%d-%m-%Y").to_string(),
            None => match self {
                Timestamp::Text(s) => s.clone(),
                Timestamp::Millis(ms) => ms.to_string(),
            },
        }
    }

    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            Timestamp::Text(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                    return Some(Utc.from_utc_datetime(&naive));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }
        }
    }
}

/// `"14:30"` → `"02:30 PM"`. Anything that is not a 24-hour time is returned unchanged.
pub fn format_time_12h(raw: &str) -> String {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map(|t| t.format("%I:%M %p").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn parses_backend_record_with_missing_fields() {
        let json = r#"{
            "registerNo": "REG-001",
            "studentName": "Asha",
            "imageUrl": "",
            "hallTicketDetails": {
                "subjects": [
                    { "subjectId": { "subjectName": "Physics", "subjectCode": "PHY" },
                      "date": "2025-03-14T00:00:00.000Z", "time": "14:30" },
                    { "date": 1741910400000 }
                ]
            }
        }"#;
        let record: HallTicketRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.register_no(), "REG-001");
        assert_eq!(record.institution(), "");
        assert_eq!(record.photo_url(), None);
        assert_eq!(record.subjects().len(), 2);
        assert_eq!(record.subjects()[0].subject_code(), "PHY");
        assert_eq!(record.subjects()[0].display_date(utc()), "14-03-2025");
        assert_eq!(record.subjects()[0].display_time(), "02:30 PM");
        assert_eq!(record.subjects()[1].subject_name(), "");
        assert_eq!(record.subjects()[1].display_date(utc()), "14-03-2025");
        assert_eq!(record.subjects()[1].display_time(), "");
    }

    #[test]
    fn record_without_details_has_no_subjects() {
        let record: HallTicketRecord = serde_json::from_str(r#"{"registerNo":"X"}"#).unwrap();
        assert!(record.subjects().is_empty());
    }

    #[test]
    fn date_respects_offset() {
        let ts = Timestamp::Text("2025-03-14T20:00:00Z".into());
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        assert_eq!(ts.format_date(utc()), "14-03-2025");
        assert_eq!(ts.format_date(ist), "15-03-2025");
    }

    #[test]
    fn plain_date_and_garbage() {
        assert_eq!(Timestamp::Text("2025-01-02".into()).format_date(utc()), "02-01-2025");
        assert_eq!(Timestamp::Text("next week".into()).format_date(utc()), "next week");
    }

    #[test]
    fn twelve_hour_times() {
        assert_eq!(format_time_12h("09:05"), "09:05 AM");
        assert_eq!(format_time_12h("00:15"), "12:15 AM");
        assert_eq!(format_time_12h("12:00"), "12:00 PM");
        assert_eq!(format_time_12h("tbd"), "tbd");
    }

    #[test]
    fn class_list_shapes() {
        let bare: ClassListResponse =
            serde_json::from_str(r#"[{"_id":"c1","className":"Grade 10"}]"#).unwrap();
        let wrapped: ClassListResponse =
            serde_json::from_str(r#"{"classes":[{"_id":"c1","className":"Grade 10"}]}"#).unwrap();
        assert_eq!(bare.into_vec(), wrapped.into_vec());
    }

    #[test]
    fn bulk_download_tolerates_missing_list() {
        let bulk: BulkDownload = serde_json::from_str("{}").unwrap();
        assert!(bulk.hall_tickets.is_empty());
        assert!(bulk.exam_name.is_none());
    }
}
