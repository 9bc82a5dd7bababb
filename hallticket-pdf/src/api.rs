// hallticket-pdf: REST backend access

use std::io::Read;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::model::{BulkDownload, BulkDownloadRequest, ClassListResponse, ClassRecord};

/// Everything the batch needs from the outside world.
///
/// `ApiClient` talks HTTP; tests supply in-memory implementations.
pub trait HallTicketBackend: Send + Sync {
    fn classes(&self) -> Result<Vec<ClassRecord>>;

    fn bulk_download(&self, class_id: &str) -> Result<BulkDownload>;

    /// Raw bytes of the background template.
    fn background(&self) -> Result<Vec<u8>>;

    /// Raw bytes of a student photo.
    fn photo(&self, url: &str) -> Result<Vec<u8>>;
}

// ============================================================================
// Session
// ============================================================================

/// Credentials attached to backend requests. Passed in explicitly; there is no
/// process-wide login state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.trim().is_empty()).then_some(token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct ApiClient {
    agent: ureq::Agent,
    base: String,
    background: String,
    session: Session,
    photo_timeout: Duration,
}

impl ApiClient {
    pub fn new(settings: &Settings, session: Session) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.http_timeout())
            .build();
        log::debug!(
            "Backend {} ({})",
            settings.api_base,
            if session.is_authenticated() { "authenticated" } else { "anonymous" }
        );
        Self {
            agent,
            base: settings.api_base.trim_end_matches('/').to_string(),
            background: settings.background_source(),
            session,
            photo_timeout: settings.photo_timeout(),
        }
    }

    fn url(&self, path: &str) -> String {
        if is_remote(path) {
            path.to_string()
        } else {
            format!("{}/{}", self.base, path.trim_start_matches('/'))
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        log::debug!("GET {}", url);
        let response = self
            .session
            .authorize(self.agent.get(&url))
            .call()
            .map_err(|e| network_error(&url, e))?;
        serde_json::from_reader(response.into_reader())
            .map_err(|e| AppError::Decode(format!("{}: {}", url, e)))
    }

    fn fetch_bytes(&self, request: ureq::Request, url: &str) -> Result<Vec<u8>> {
        let response = request.call().map_err(|e| network_error(url, e))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| AppError::Network(format!("{}: failed to read response: {}", url, e)))?;
        Ok(bytes)
    }
}

impl HallTicketBackend for ApiClient {
    fn classes(&self) -> Result<Vec<ClassRecord>> {
        let list: ClassListResponse = self.get_json("class")?;
        Ok(list.into_vec())
    }

    fn bulk_download(&self, class_id: &str) -> Result<BulkDownload> {
        let url = self.url("hall-ticket/bulk-download");
        log::debug!("POST {} (class {})", url, class_id);
        let body = serde_json::to_string(&BulkDownloadRequest { class: class_id })
            .map_err(|e| AppError::Decode(e.to_string()))?;
        let response = self
            .session
            .authorize(self.agent.post(&url))
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| network_error(&url, e))?;
        serde_json::from_reader(response.into_reader())
            .map_err(|e| AppError::Decode(format!("{}: {}", url, e)))
    }

    fn background(&self) -> Result<Vec<u8>> {
        if is_remote(&self.background) {
            self.fetch_bytes(self.agent.get(&self.background), &self.background)
        } else {
            std::fs::read(&self.background)
                .map_err(|e| AppError::Image(format!("{}: {}", self.background, e)))
        }
    }

    fn photo(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.url(url);
        // Photos live on third-party storage; no credentials are sent.
        let request = self.agent.get(&url).timeout(self.photo_timeout);
        self.fetch_bytes(request, &url)
    }
}

fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

fn network_error(url: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(code, _) => AppError::Network(format!("{}: HTTP {}", url, code)),
        ureq::Error::Transport(t) => AppError::Network(format!("{}: {}", url, t)),
    }
}
