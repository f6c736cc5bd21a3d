//! Message types sent from a scan session to its consumers

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::storage::Competitor;
use crate::vision::{RankedResult, ScanErrorKind};

/// Events published by a [`crate::session::ScanSession`]
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    /// A scan was accepted and is running
    ScanStarted { scan_id: Uuid, at: DateTime<Utc> },
    /// A scan selected a variant with at least one detection
    ScanCompleted {
        scan_id: Uuid,
        variant: String,
        results: Vec<RankedResult>,
    },
    /// A scan ended without a detection
    ScanFailed {
        scan_id: Uuid,
        kind: ScanErrorKind,
        message: String,
    },
    /// The best detection matched a registered competitor
    CompetitorIdentified { scan_id: Uuid, competitor: Competitor },
}

impl SessionEvent {
    pub fn scan_id(&self) -> Uuid {
        match self {
            Self::ScanStarted { scan_id, .. }
            | Self::ScanCompleted { scan_id, .. }
            | Self::ScanFailed { scan_id, .. }
            | Self::CompetitorIdentified { scan_id, .. } => *scan_id,
        }
    }
}
