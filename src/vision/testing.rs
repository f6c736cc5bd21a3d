//! Scripted in-process OCR service for tests

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;

use super::ocr::{OcrService, PollResponse, PollStatus};
use super::{RawFragment, Region, ScanError};

/// What the service does for one submission
#[derive(Debug, Clone)]
pub enum Script {
    /// `Running` for `running` polls, then `Succeeded` with `lines`
    Succeed { running: usize, lines: Vec<RawFragment> },
    /// `Running` for `running` polls, then `Failed`
    Fail { running: usize },
    /// Never leaves `Running`
    Hang,
    /// The submit call itself errors
    Reject,
}

/// Fake service consuming one script per submission, in submission order.
/// The last script repeats once the queue is drained.
pub struct ScriptedOcr {
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    operations: Mutex<HashMap<String, (Script, usize)>>,
    submits: AtomicUsize,
    polls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(None),
            operations: Mutex::new(HashMap::new()),
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        let next = self.scripts.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(script) => {
                *last = Some(script.clone());
                script
            }
            None => last.clone().unwrap_or(Script::Hang),
        }
    }

    fn finish(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn submit(&self, _image: &[u8]) -> Result<String, ScanError> {
        let script = self.next_script();
        if matches!(script, Script::Reject) {
            return Err(ScanError::Service("401 unauthorized".to_string()));
        }

        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let operation = format!("op-{}", n);
        self.operations.lock().insert(operation.clone(), (script, 0));
        Ok(operation)
    }

    async fn poll(&self, operation: &str) -> Result<PollResponse, ScanError> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let (script, polled) = {
            let mut operations = self.operations.lock();
            let entry = operations
                .get_mut(operation)
                .ok_or_else(|| ScanError::Service(format!("unknown operation {}", operation)))?;
            let polled = entry.1;
            entry.1 += 1;
            (entry.0.clone(), polled)
        };

        let response = match script {
            Script::Succeed { running, lines } if polled >= running => {
                self.finish();
                PollResponse::succeeded(lines)
            }
            Script::Fail { running } if polled >= running => {
                self.finish();
                PollResponse::failed("recognition failed")
            }
            _ if polled == 0 => PollResponse::pending(PollStatus::NotStarted),
            _ => PollResponse::pending(PollStatus::Running),
        };
        Ok(response)
    }
}

/// A fragment on a 40px-tall row starting at `y`
pub fn fragment(text: &str, confidence: f32, y: f32) -> RawFragment {
    RawFragment::new(text, confidence, Region::rect(10.0, y, 120.0, 40.0))
}

/// A small decodable PNG
pub fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 16) as u8, (y * 16) as u8, 200]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}
