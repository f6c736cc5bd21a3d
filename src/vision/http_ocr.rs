//! HTTP OCR backend
//!
//! Speaks the asynchronous "read" API of a cloud vision service: the image
//! is POSTed to `/vision/v3.2/read/analyze`, the operation URL comes back in
//! the `Operation-Location` header, and that URL is polled for results.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::ocr::{OcrService, PollResponse, PollStatus};
use super::{RawFragment, Region, ScanError};

const ANALYZE_PATH: &str = "vision/v3.2/read/analyze";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_HEADER: &str = "Operation-Location";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ReadError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    read_results: Vec<ReadPage>,
}

#[derive(Debug, Deserialize)]
struct ReadPage {
    #[serde(default)]
    lines: Vec<ReadLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadLine {
    text: String,
    bounding_box: Vec<f32>,
    #[serde(default)]
    words: Vec<ReadWord>,
}

#[derive(Debug, Deserialize)]
struct ReadWord {
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct ReadError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_status(status: &str) -> Result<PollStatus, ScanError> {
    match status.to_ascii_lowercase().as_str() {
        "notstarted" => Ok(PollStatus::NotStarted),
        "running" => Ok(PollStatus::Running),
        "succeeded" => Ok(PollStatus::Succeeded),
        "failed" => Ok(PollStatus::Failed),
        other => Err(ScanError::Service(format!("unknown operation status '{}'", other))),
    }
}

/// Line confidence is the mean of its word confidences
fn line_confidence(words: &[ReadWord]) -> f32 {
    if words.is_empty() {
        return 1.0;
    }
    let sum: f32 = words.iter().map(|w| w.confidence).sum();
    (sum / words.len() as f32).clamp(0.0, 1.0)
}

/// Parse a poll response body into a [`PollResponse`]
pub fn parse_poll_response(body: &[u8]) -> Result<PollResponse, ScanError> {
    let operation: ReadOperation = serde_json::from_slice(body)
        .map_err(|e| ScanError::Service(format!("malformed OCR response: {}", e)))?;

    let status = parse_status(&operation.status)?;

    match status {
        PollStatus::NotStarted | PollStatus::Running => Ok(PollResponse::pending(status)),
        PollStatus::Failed => {
            let message = operation
                .error
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.code.unwrap_or_else(|| "error".to_string()),
                        e.message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| "OCR operation failed".to_string());
            Ok(PollResponse::failed(message))
        }
        PollStatus::Succeeded => {
            let mut lines = Vec::new();
            let pages = operation.analyze_result.map(|r| r.read_results).unwrap_or_default();

            for line in pages.into_iter().flat_map(|p| p.lines) {
                let Some(region) = Region::from_flat(&line.bounding_box) else {
                    warn!("Skipping OCR line {:?} with malformed bounding box", line.text);
                    continue;
                };
                let confidence = line_confidence(&line.words);
                lines.push(RawFragment::new(line.text, confidence, region));
            }

            Ok(PollResponse::succeeded(lines))
        }
    }
}

/// OCR service reached over HTTP
pub struct HttpOcrService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpOcrService {
    /// Create a client for `endpoint` (e.g. `https://<resource>.cognitiveservices.azure.com`)
    pub fn new(endpoint: &str, api_key: &str, request_timeout: Duration) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn analyze_url(&self) -> String {
        format!("{}/{}", self.endpoint, ANALYZE_PATH)
    }
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn submit(&self, image: &[u8]) -> Result<String, ScanError> {
        let response = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Service(format!("submit failed with status {}: {}", status, body)));
        }

        let operation = response
            .headers()
            .get(OPERATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ScanError::Service(format!("response is missing {} header", OPERATION_HEADER)))?;

        debug!("Submitted {} bytes, operation at {}", image.len(), operation);
        Ok(operation)
    }

    async fn poll(&self, operation: &str) -> Result<PollResponse, ScanError> {
        let response = self
            .client
            .get(operation)
            .header(KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScanError::Service(format!("poll failed with status {}", response.status())));
        }

        let body = response.bytes().await?;
        parse_poll_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running() {
        let response = parse_poll_response(br#"{"status": "running"}"#).unwrap();
        assert_eq!(response.status, PollStatus::Running);
        assert!(response.lines.is_empty());

        let response = parse_poll_response(br#"{"status": "notStarted"}"#).unwrap();
        assert_eq!(response.status, PollStatus::NotStarted);
    }

    #[test]
    fn test_parse_succeeded_lines() {
        let body = br#"{
            "status": "succeeded",
            "analyzeResult": {
                "readResults": [{
                    "page": 1,
                    "lines": [
                        {
                            "text": "GBR",
                            "boundingBox": [10, 10, 90, 10, 90, 50, 10, 50],
                            "words": [{"text": "GBR", "confidence": 0.8}]
                        },
                        {
                            "text": "12 34",
                            "boundingBox": [10, 60, 90, 60, 90, 100, 10, 100],
                            "words": [
                                {"text": "12", "confidence": 0.9},
                                {"text": "34", "confidence": 0.7}
                            ]
                        }
                    ]
                }]
            }
        }"#;

        let response = parse_poll_response(body).unwrap();
        assert_eq!(response.status, PollStatus::Succeeded);
        assert_eq!(response.lines.len(), 2);
        assert_eq!(response.lines[1].text, "12 34");
        assert!((response.lines[1].confidence - 0.8).abs() < 1e-6);
        assert_eq!(response.lines[1].region.center_y(), 80.0);
    }

    #[test]
    fn test_parse_succeeded_without_text() {
        let body = br#"{"status": "succeeded", "analyzeResult": {"readResults": [{"lines": []}]}}"#;
        let response = parse_poll_response(body).unwrap();
        assert_eq!(response.status, PollStatus::Succeeded);
        assert!(response.lines.is_empty());
    }

    #[test]
    fn test_malformed_bounding_box_skipped() {
        let body = br#"{"status": "succeeded", "analyzeResult": {"readResults": [{"lines": [
            {"text": "42", "boundingBox": [1, 2, 3], "words": []},
            {"text": "17", "boundingBox": [0, 0, 5, 0, 5, 5, 0, 5], "words": []}
        ]}]}}"#;
        let response = parse_poll_response(body).unwrap();
        assert_eq!(response.lines.len(), 1);
        assert_eq!(response.lines[0].text, "17");
        assert_eq!(response.lines[0].confidence, 1.0);
    }

    #[test]
    fn test_parse_failed_with_error() {
        let body = br#"{"status": "failed", "error": {"code": "InvalidImage", "message": "too small"}}"#;
        let response = parse_poll_response(body).unwrap();
        assert_eq!(response.status, PollStatus::Failed);
        assert_eq!(response.message.as_deref(), Some("InvalidImage: too small"));
    }

    #[test]
    fn test_parse_unknown_status_and_garbage() {
        assert!(parse_poll_response(br#"{"status": "paused"}"#).is_err());
        assert!(parse_poll_response(b"<html>").is_err());
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let service = HttpOcrService::new("https://ocr.example.com/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(service.analyze_url(), "https://ocr.example.com/vision/v3.2/read/analyze");
    }
}
