use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-length face encoding (128-dimensional by default).
///
/// Immutable once produced by an encoder; components are never updated
/// incrementally, a re-registered photo replaces the whole vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceVector {
    values: Vec<f32>,
}

impl FaceVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance to another vector of the same length.
    ///
    /// Length agreement is the caller's responsibility; the matcher
    /// validates it and reports a dimension mismatch error.
    pub fn euclidean_distance(&self, other: &FaceVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A known person with display info and an optional face encoding.
///
/// A person without an encoding exists for caregivers to fill in later
/// and can never be matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub relationship: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    #[serde(skip)]
    pub vector: Option<FaceVector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of matching a probe encoding against the gallery.
///
/// Confidence is in `[0, 1]`, monotonically decreasing in distance, and is
/// only non-zero when a person id is present.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub person_id: Option<String>,
    pub confidence: f32,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            person_id: None,
            confidence: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.person_id.is_some()
    }
}

/// Category of a timeline record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Recognition,
    UnknownFace,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Recognition => "recognition",
            EventKind::UnknownFace => "unknown_face",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recognition" => Some(EventKind::Recognition),
            "unknown_face" => Some(EventKind::UnknownFace),
            _ => None,
        }
    }
}

/// One record on the caregiver-facing timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Final outcome of one recognition request.
///
/// Built exactly once per completed request and handed to storage as an
/// immutable record; `event` is the timeline record that was logged for it.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionOutcome {
    pub recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
    pub confidence: f32,
    pub should_announce: bool,
    pub timestamp: DateTime<Utc>,
    pub timeline_event: TimelineEvent,
}
