//! OCR gateway
//!
//! Wraps a recognition service that works as a long-running operation
//! (submit an image, then poll the returned handle) into a single call
//! with a bounded polling budget.
//!
//! ```text
//! Submitted -> Polling -> Succeeded | Failed | TimedOut
//! ```
//!
//! Cancellation before or during polling is treated as a local timeout:
//! no further polls are issued and the operation handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{RawFragment, ScanError};

/// Status reported by the service for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// One poll answer
#[derive(Debug, Clone)]
pub struct PollResponse {
    pub status: PollStatus,
    /// Recognized lines, only meaningful when `Succeeded`
    pub lines: Vec<RawFragment>,
    /// Service-provided failure detail, if any
    pub message: Option<String>,
}

impl PollResponse {
    pub fn pending(status: PollStatus) -> Self {
        Self {
            status,
            lines: Vec::new(),
            message: None,
        }
    }

    pub fn succeeded(lines: Vec<RawFragment>) -> Self {
        Self {
            status: PollStatus::Succeeded,
            lines,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: PollStatus::Failed,
            lines: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// Two-call asynchronous recognition contract
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Hand an encoded image to the service, returning an operation handle
    async fn submit(&self, image: &[u8]) -> Result<String, ScanError>;

    /// Query the status of an operation
    async fn poll(&self, operation: &str) -> Result<PollResponse, ScanError>;
}

/// Poll interval and attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

/// Gateway protocol state
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayState {
    Submitted { operation: String },
    Polling { operation: String, attempt: u32 },
    Succeeded(Vec<RawFragment>),
    Failed(String),
    TimedOut { attempts: u32 },
}

/// Blocking-style facade over an [`OcrService`]
#[derive(Clone)]
pub struct OcrGateway {
    service: Arc<dyn OcrService>,
    policy: PollPolicy,
    /// Bounds concurrently outstanding submissions
    permits: Arc<Semaphore>,
}

impl OcrGateway {
    /// Create a gateway allowing a single outstanding submission
    pub fn new(service: Arc<dyn OcrService>, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Allow up to `max` operations in flight at once (minimum 1)
    pub fn with_max_outstanding(mut self, max: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Recognize text lines in an encoded image.
    ///
    /// Fails with `Service` on a submit/poll error or a `Failed` operation,
    /// `Timeout` when the attempt budget runs out or `cancel` fires, and
    /// `EmptyResult` when the operation succeeds without any line.
    pub async fn recognize(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFragment>, ScanError> {
        if cancel.is_cancelled() {
            return Err(ScanError::Timeout { attempts: 0 });
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Timeout { attempts: 0 }),
            permit = self.permits.acquire() => permit
                .map_err(|e| ScanError::Service(format!("submission limiter closed: {}", e)))?,
        };

        let operation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Timeout { attempts: 0 }),
            op = self.service.submit(image) => op?,
        };
        debug!("OCR submitted, operation {}", operation);

        let mut state = GatewayState::Submitted { operation };
        loop {
            state = match state {
                GatewayState::Submitted { operation } => GatewayState::Polling { operation, attempt: 0 },
                GatewayState::Polling { operation, attempt } => {
                    self.poll_once(operation, attempt, cancel).await
                }
                GatewayState::Succeeded(lines) => {
                    debug!("OCR succeeded with {} line(s)", lines.len());
                    return if lines.is_empty() {
                        Err(ScanError::EmptyResult)
                    } else {
                        Ok(lines)
                    };
                }
                GatewayState::Failed(message) => {
                    warn!("OCR operation failed: {}", message);
                    return Err(ScanError::Service(message));
                }
                GatewayState::TimedOut { attempts } => {
                    warn!("OCR operation abandoned after {} poll(s)", attempts);
                    return Err(ScanError::Timeout { attempts });
                }
            };
        }
    }

    /// Wait one interval, poll once, and return the next state
    async fn poll_once(&self, operation: String, attempt: u32, cancel: &CancellationToken) -> GatewayState {
        if attempt >= self.policy.max_attempts {
            return GatewayState::TimedOut { attempts: attempt };
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return GatewayState::TimedOut { attempts: attempt },
            _ = tokio::time::sleep(self.policy.interval) => {}
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return GatewayState::TimedOut { attempts: attempt },
            response = self.service.poll(&operation) => response,
        };
        let attempt = attempt + 1;

        match response {
            Ok(response) => {
                debug!("OCR poll {}/{}: {:?}", attempt, self.policy.max_attempts, response.status);
                match response.status {
                    PollStatus::NotStarted | PollStatus::Running => {
                        GatewayState::Polling { operation, attempt }
                    }
                    PollStatus::Succeeded => GatewayState::Succeeded(response.lines),
                    PollStatus::Failed => GatewayState::Failed(
                        response
                            .message
                            .unwrap_or_else(|| format!("operation {} failed", operation)),
                    ),
                }
            }
            Err(e) => GatewayState::Failed(e.to_string()),
        }
    }
}
