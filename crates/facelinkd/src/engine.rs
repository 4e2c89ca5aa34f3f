//! Recognition orchestrator.
//!
//! Composes the pipeline for each request: decode the base64 ingress, run
//! the encoder (on the blocking pool, under a timeout), match against the
//! stored gallery, consult the cooldown tracker, and emit exactly one
//! timeline record per completed or user-failed request. Internal errors
//! abort the request before any record or cooldown write lands.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use facelink_core::cooldown::CooldownTracker;
use facelink_core::encoder::{EncoderError, FaceEncoder};
use facelink_core::ingress;
use facelink_core::matcher::{EuclideanMatcher, GalleryEntry, MatchError, Matcher};
use facelink_core::types::{EventKind, FaceVector, Person, RecognitionOutcome, TimelineEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::store::{RecognitionStore, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("person not found: {0}")]
    PersonNotFound(String),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("encoder timed out after {0:?}")]
    EncodeTimeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Caller mistakes (bad request), as opposed to failures on our side.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidImage(_)
                | EngineError::NoFaceDetected
                | EngineError::PersonNotFound(_)
        )
    }

    fn from_encoder(err: EncoderError) -> Self {
        match err {
            EncoderError::InvalidImage(msg) => EngineError::InvalidImage(msg),
            EncoderError::NoFaceDetected => EngineError::NoFaceDetected,
            other => EngineError::Internal(other.to_string()),
        }
    }
}

pub struct RecognitionEngine<S> {
    store: S,
    encoder: Arc<dyn FaceEncoder>,
    matcher: EuclideanMatcher,
    cooldowns: CooldownTracker,
    distance_threshold: f32,
    cooldown_window: ChronoDuration,
    encode_timeout: Duration,
}

impl<S: RecognitionStore> RecognitionEngine<S> {
    pub fn new(
        store: S,
        encoder: Arc<dyn FaceEncoder>,
        cooldowns: CooldownTracker,
        config: &Config,
    ) -> Self {
        Self {
            store,
            encoder,
            matcher: EuclideanMatcher,
            cooldowns,
            distance_threshold: config.distance_threshold,
            cooldown_window: ChronoDuration::minutes(config.cooldown_minutes),
            encode_timeout: Duration::from_secs(config.encode_timeout_secs),
        }
    }

    /// Run one recognition request end to end.
    pub async fn recognize(&self, image_base64: &str) -> Result<RecognitionOutcome, EngineError> {
        let now = Utc::now();

        let probe = match self.encode_image(image_base64).await {
            Ok(v) => v,
            Err(err) if err.is_user_error() => {
                // Bad image or no face: the request fails, but the sighting
                // attempt still lands on the timeline for caregivers.
                let notes = match &err {
                    EngineError::NoFaceDetected => "No face detected in image",
                    _ => "Image could not be decoded",
                };
                self.log_event(EventKind::UnknownFace, now, None, None, notes)
                    .await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let people = self.store.list_people().await?;
        let gallery: Vec<GalleryEntry> = people
            .iter()
            .filter_map(|p| {
                p.vector.clone().map(|vector| GalleryEntry {
                    person_id: p.id.clone(),
                    vector,
                })
            })
            .collect();

        if gallery.is_empty() {
            let event = self
                .log_event(
                    EventKind::UnknownFace,
                    now,
                    None,
                    None,
                    "No familiar faces have been added yet",
                )
                .await?;
            return Ok(unrecognized_outcome(now, event));
        }

        let result = self
            .matcher
            .best_match(&probe, &gallery, self.distance_threshold)?;

        let Some(person_id) = result.person_id else {
            let event = self
                .log_event(
                    EventKind::UnknownFace,
                    now,
                    None,
                    None,
                    "Face detected but not recognized",
                )
                .await?;
            return Ok(unrecognized_outcome(now, event));
        };

        let person = people
            .into_iter()
            .find(|p| p.id == person_id)
            .ok_or_else(|| EngineError::Internal(format!("matched unknown person {person_id}")))?;

        let notes = format!("Recognized with {:.1}% confidence", result.confidence * 100.0);
        let event = self
            .log_event(
                EventKind::Recognition,
                now,
                Some(person_id.clone()),
                Some(result.confidence),
                &notes,
            )
            .await?;

        // Cooldown advances only after the timeline record has committed,
        // so a failed request never eats a future announcement.
        let should_announce = self
            .cooldowns
            .observe(&person_id, now, self.cooldown_window);
        if let Err(err) = self.store.upsert_cooldown(&person_id, now).await {
            tracing::warn!(person_id = %person_id, error = %err, "failed to persist cooldown entry");
        }

        tracing::info!(
            person = %person.name,
            confidence = result.confidence,
            should_announce,
            "visitor recognized"
        );

        Ok(RecognitionOutcome {
            recognized: true,
            person: Some(person),
            confidence: result.confidence,
            should_announce,
            timestamp: now,
            timeline_event: event,
        })
    }

    /// Encode a registration photo and replace the person's stored encoding.
    ///
    /// Deterministic encoders make this idempotent: re-registering the same
    /// photo stores the same vector and never duplicates the person.
    pub async fn register_photo(
        &self,
        person_id: &str,
        image_base64: &str,
    ) -> Result<Person, EngineError> {
        let person = self
            .store
            .get_person(person_id)
            .await?
            .ok_or_else(|| EngineError::PersonNotFound(person_id.to_string()))?;

        let vector = self.encode_image(image_base64).await?;
        if vector.len() != self.encoder.dimension() {
            return Err(EngineError::Internal(format!(
                "encoder produced {} components, expected {}",
                vector.len(),
                self.encoder.dimension()
            )));
        }

        self.store.set_person_vector(&person.id, &vector).await?;
        tracing::info!(person = %person.name, dimension = vector.len(), "face encoding registered");

        self.store
            .get_person(person_id)
            .await?
            .ok_or_else(|| EngineError::PersonNotFound(person_id.to_string()))
    }

    pub async fn add_person(
        &self,
        name: &str,
        relationship: &str,
        reminder: Option<&str>,
    ) -> Result<Person, EngineError> {
        Ok(self.store.add_person(name, relationship, reminder).await?)
    }

    pub async fn people(&self) -> Result<Vec<Person>, EngineError> {
        Ok(self.store.list_people().await?)
    }

    pub async fn remove_person(&self, person_id: &str) -> Result<bool, EngineError> {
        let removed = self.store.remove_person(person_id).await?;
        if removed {
            self.cooldowns.forget(person_id);
        }
        Ok(removed)
    }

    pub async fn timeline(&self, limit: u32) -> Result<Vec<TimelineEvent>, EngineError> {
        Ok(self.store.recent_events(limit).await?)
    }

    pub fn encoder_name(&self) -> &'static str {
        self.encoder.name()
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    pub fn cooldown_window(&self) -> ChronoDuration {
        self.cooldown_window
    }

    /// Decode the ingress payload and run the encoder under a timeout.
    async fn encode_image(&self, image_base64: &str) -> Result<FaceVector, EngineError> {
        let bytes = ingress::decode_base64_image(image_base64).map_err(EngineError::from_encoder)?;

        let encoder = Arc::clone(&self.encoder);
        let task = tokio::task::spawn_blocking(move || encoder.encode(&bytes));

        match tokio::time::timeout(self.encode_timeout, task).await {
            Err(_) => Err(EngineError::EncodeTimeout(self.encode_timeout)),
            Ok(Err(join)) => Err(EngineError::Internal(format!("encoder task: {join}"))),
            Ok(Ok(result)) => result.map_err(EngineError::from_encoder),
        }
    }

    async fn log_event(
        &self,
        kind: EventKind,
        now: DateTime<Utc>,
        person_id: Option<String>,
        confidence: Option<f32>,
        notes: &str,
    ) -> Result<TimelineEvent, EngineError> {
        let event = TimelineEvent {
            id: Uuid::new_v4().to_string(),
            kind,
            timestamp: now,
            person_id,
            confidence,
            notes: Some(notes.to_string()),
        };
        self.store.append_event(&event).await?;
        Ok(event)
    }
}

fn unrecognized_outcome(now: DateTime<Utc>, event: TimelineEvent) -> RecognitionOutcome {
    RecognitionOutcome {
        recognized: false,
        person: None,
        confidence: 0.0,
        should_announce: false,
        timestamp: now,
        timeline_event: event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use facelink_core::encoder::MockEncoder;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// In-memory store for exercising the engine without SQLite.
    #[derive(Default)]
    struct MemoryStore {
        people: Mutex<Vec<Person>>,
        events: Mutex<Vec<TimelineEvent>>,
        cooldowns: Mutex<Vec<(String, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl RecognitionStore for MemoryStore {
        async fn list_people(&self) -> Result<Vec<Person>, StoreError> {
            Ok(self.people.lock().unwrap().clone())
        }

        async fn get_person(&self, id: &str) -> Result<Option<Person>, StoreError> {
            Ok(self
                .people
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned())
        }

        async fn add_person(
            &self,
            name: &str,
            relationship: &str,
            reminder: Option<&str>,
        ) -> Result<Person, StoreError> {
            let now = Utc::now();
            let person = Person {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                relationship: relationship.to_string(),
                reminder: reminder.map(str::to_string),
                photo_path: None,
                vector: None,
                created_at: now,
                updated_at: now,
            };
            self.people.lock().unwrap().push(person.clone());
            Ok(person)
        }

        async fn set_person_vector(
            &self,
            id: &str,
            vector: &FaceVector,
        ) -> Result<(), StoreError> {
            let mut people = self.people.lock().unwrap();
            let person = people
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StoreError::PersonNotFound(id.to_string()))?;
            person.vector = Some(vector.clone());
            Ok(())
        }

        async fn remove_person(&self, id: &str) -> Result<bool, StoreError> {
            let mut people = self.people.lock().unwrap();
            let before = people.len();
            people.retain(|p| p.id != id);
            Ok(people.len() < before)
        }

        async fn append_event(&self, event: &TimelineEvent) -> Result<(), StoreError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn recent_events(&self, limit: u32) -> Result<Vec<TimelineEvent>, StoreError> {
            let events = self.events.lock().unwrap();
            Ok(events.iter().rev().take(limit as usize).cloned().collect())
        }

        async fn load_cooldowns(&self) -> Result<Vec<(String, DateTime<Utc>)>, StoreError> {
            Ok(self.cooldowns.lock().unwrap().clone())
        }

        async fn upsert_cooldown(
            &self,
            person_id: &str,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            let mut cooldowns = self.cooldowns.lock().unwrap();
            if let Some(entry) = cooldowns.iter_mut().find(|(id, _)| id == person_id) {
                entry.1 = at;
            } else {
                cooldowns.push((person_id.to_string(), at));
            }
            Ok(())
        }
    }

    /// Encoder that always reports an empty frame.
    struct NoFaceEncoder;

    impl FaceEncoder for NoFaceEncoder {
        fn encode(&self, _image_bytes: &[u8]) -> Result<FaceVector, EncoderError> {
            Err(EncoderError::NoFaceDetected)
        }

        fn dimension(&self) -> usize {
            128
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn test_config() -> Config {
        Config {
            db_path: "/tmp/unused.db".into(),
            distance_threshold: 0.6,
            cooldown_minutes: 5,
            encoder_model: None,
            embedding_dim: 128,
            encode_timeout_secs: 10,
        }
    }

    fn mock_engine() -> RecognitionEngine<MemoryStore> {
        RecognitionEngine::new(
            MemoryStore::default(),
            Arc::new(MockEncoder::new(128)),
            CooldownTracker::new(),
            &test_config(),
        )
    }

    fn photo(width: u32, height: u32) -> String {
        use base64::prelude::BASE64_STANDARD;
        use base64::Engine as _;

        let img = RgbImage::from_pixel(width, height, image::Rgb([120, 90, 60]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            BASE64_STANDARD.encode(buf.into_inner())
        )
    }

    #[tokio::test]
    async fn test_no_registered_faces_yields_unrecognized_outcome() {
        let engine = mock_engine();
        let outcome = engine.recognize(&photo(64, 64)).await.unwrap();

        assert!(!outcome.recognized);
        assert!(outcome.person.is_none());
        assert_eq!(outcome.confidence, 0.0);
        assert!(!outcome.should_announce);
        assert_eq!(outcome.timeline_event.kind, EventKind::UnknownFace);

        let events = engine.store.events.lock().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_registered_person_is_recognized_and_announced() {
        let engine = mock_engine();
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();
        engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();

        let outcome = engine.recognize(&photo(64, 64)).await.unwrap();
        assert!(outcome.recognized);
        assert_eq!(outcome.person.as_ref().unwrap().id, person.id);
        assert!((outcome.confidence - 1.0).abs() < 1e-6);
        assert!(outcome.should_announce);
        assert_eq!(outcome.timeline_event.kind, EventKind::Recognition);
        assert_eq!(outcome.timeline_event.person_id.as_deref(), Some(person.id.as_str()));
    }

    #[tokio::test]
    async fn test_repeat_sighting_within_cooldown_not_announced() {
        let engine = mock_engine();
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();
        engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();

        let first = engine.recognize(&photo(64, 64)).await.unwrap();
        let second = engine.recognize(&photo(64, 64)).await.unwrap();
        assert!(first.should_announce);
        assert!(!second.should_announce);

        // Both sightings still land on the timeline and refresh the cooldown.
        let events = engine.store.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        let cooldowns = engine.store.cooldowns.lock().unwrap();
        assert_eq!(cooldowns.len(), 1);
    }

    #[tokio::test]
    async fn test_unfamiliar_face_logged_as_unknown() {
        let engine = mock_engine();
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();
        // Registered photo differs from the probe; mock vectors for different
        // dimensions are effectively random, far beyond the 0.6 threshold.
        engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();

        let outcome = engine.recognize(&photo(200, 150)).await.unwrap();
        assert!(!outcome.recognized);
        assert_eq!(outcome.confidence, 0.0);
        assert!(!outcome.should_announce);
        assert_eq!(outcome.timeline_event.kind, EventKind::UnknownFace);

        // An unmatched sighting never touches cooldown state.
        assert!(engine.store.cooldowns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_face_fails_but_logs_unknown_face() {
        let engine = RecognitionEngine::new(
            MemoryStore::default(),
            Arc::new(NoFaceEncoder),
            CooldownTracker::new(),
            &test_config(),
        );

        let err = engine.recognize(&photo(64, 64)).await.unwrap_err();
        assert!(matches!(err, EngineError::NoFaceDetected));
        assert!(err.is_user_error());

        let events = engine.store.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::UnknownFace);
        assert!(engine.store.cooldowns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_base64_is_invalid_image() {
        let engine = mock_engine();
        let err = engine.recognize("!!!not-base64!!!").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
        assert!(err.is_user_error());
        // Still produces an audit record for the failed attempt.
        assert_eq!(engine.store.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_stored_vector_is_internal_error() {
        let engine = mock_engine();
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();
        engine
            .store
            .set_person_vector(&person.id, &FaceVector::new(vec![0.5; 64]))
            .await
            .unwrap();

        let err = engine.recognize(&photo(64, 64)).await.unwrap_err();
        assert!(matches!(err, EngineError::Match(MatchError::DimensionMismatch { .. })));
        assert!(!err.is_user_error());
        // Internal errors commit nothing.
        assert!(engine.store.events.lock().unwrap().is_empty());
        assert!(engine.store.cooldowns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_photo_is_idempotent() {
        let engine = mock_engine();
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();

        let first = engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();
        let second = engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(engine.store.people.lock().unwrap().len(), 1);
        let stored = engine.store.get_person(&person.id).await.unwrap().unwrap();
        assert_eq!(stored.vector.as_ref().unwrap().len(), 128);
    }

    #[tokio::test]
    async fn test_register_photo_unknown_person() {
        let engine = mock_engine();
        let err = engine
            .register_photo("missing", &photo(64, 64))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PersonNotFound(_)));
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_remove_person_forgets_cooldown() {
        let engine = mock_engine();
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();
        engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();
        let outcome = engine.recognize(&photo(64, 64)).await.unwrap();
        assert!(outcome.should_announce);

        assert!(engine.remove_person(&person.id).await.unwrap());
        assert!(engine.people().await.unwrap().is_empty());

        // Re-adding the same face starts with a fresh cooldown timer.
        let person = engine.add_person("Ana", "daughter", None).await.unwrap();
        engine.register_photo(&person.id, &photo(64, 64)).await.unwrap();
        let outcome = engine.recognize(&photo(64, 64)).await.unwrap();
        assert!(outcome.should_announce);
    }
}
