// src/crash/upload.rs

//! Crash upload request and the HTTP client that delivers it.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;

use crate::errors::Result;

use super::artifact::CrashArtifact;

/// Path appended to the configured upload base URL.
pub const UPLOAD_PATH: &str = "/server/coredump/put";

/// Report type sent with every crash upload.
pub const REPORT_TYPE: &str = "0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One fully prepared upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub url: String,
    /// Header name/value pairs, in send order.
    pub headers: Vec<(String, String)>,
    /// Zip archive bytes.
    pub body: Vec<u8>,
}

impl UploadRequest {
    pub fn new(base_url: &str, serial: &str, artifact: &CrashArtifact, body: Vec<u8>) -> Self {
        let url = format!("{}{}", base_url.trim_end_matches('/'), UPLOAD_PATH);
        let headers = vec![
            (CONTENT_TYPE.as_str().to_string(), "application/zip".to_string()),
            (CONTENT_LENGTH.as_str().to_string(), body.len().to_string()),
            ("Device-SN".to_string(), serial.to_string()),
            ("Report-Time".to_string(), artifact.report_time.clone()),
            ("Report-Type".to_string(), REPORT_TYPE.to_string()),
            ("APP-Fullname".to_string(), artifact.app_name.clone()),
            ("APP-PID".to_string(), artifact.pid.clone()),
        ];
        Self { url, headers, body }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
    pub body: String,
}

impl UploadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Synchronous uploader. Only ever called from the harvester thread.
pub trait CrashUploader: Send {
    fn upload(&self, request: &UploadRequest) -> Result<UploadResponse>;
}

/// `reqwest` blocking client.
///
/// Must be created and dropped outside any async context.
#[derive(Debug)]
pub struct HttpUploader {
    client: Client,
}

impl HttpUploader {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl CrashUploader for HttpUploader {
    fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(request.body.clone()).send()?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        debug!(url = %request.url, status, "upload response");
        Ok(UploadResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_identity_headers() {
        let artifact = CrashArtifact::parse("vui.1546272000.812.x.core", 0);
        let req = UploadRequest::new("http://crash.local/", "SN01", &artifact, vec![1, 2, 3]);

        assert_eq!(req.url, "http://crash.local/server/coredump/put");
        assert_eq!(req.header("content-type"), Some("application/zip"));
        assert_eq!(req.header("Content-Length"), Some("3"));
        assert_eq!(req.header("Device-SN"), Some("SN01"));
        assert_eq!(req.header("Report-Time"), Some("1546272000"));
        assert_eq!(req.header("Report-Type"), Some("0"));
        assert_eq!(req.header("APP-Fullname"), Some("vui"));
        assert_eq!(req.header("APP-PID"), Some("812"));
    }

    #[test]
    fn only_2xx_is_success() {
        let ok = UploadResponse {
            status: 204,
            body: String::new(),
        };
        let bad = UploadResponse {
            status: 500,
            body: "boom".into(),
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
