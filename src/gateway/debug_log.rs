//! Append-only JSON-lines log of repaired requests

use crate::core_types::ConversionRequest;
use crate::logging::log_warn;

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Serialize)]
struct Entry<'a> {
    timestamp: String,
    request_id: &'a str,
    needs_protocol_translation: bool,
    request: &'a ConversionRequest,
}

/// Writes one line per request, exactly as it is forwarded upstream.
///
/// Failures are logged and swallowed; the log never fails a request.
#[derive(Debug, Clone)]
pub struct RequestLog {
    path: PathBuf,
}

impl RequestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(
        &self,
        request_id: &str,
        request: &ConversionRequest,
        needs_protocol_translation: bool,
    ) {
        let entry = Entry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
            needs_protocol_translation,
            request,
        };
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                log_warn!(error = %e, "Failed to encode request for debug log");
                return;
            }
        };
        line.push('\n');

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await;
        match file {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    log_warn!(path = %self.path.display(), error = %e, "Failed to append debug log");
                }
            }
            Err(e) => {
                log_warn!(path = %self.path.display(), error = %e, "Failed to open debug log");
            }
        }
    }
}
