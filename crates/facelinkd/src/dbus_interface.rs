//! D-Bus interface for the FaceLink daemon.
//!
//! Bus name: org.facelink.Recognition1
//! Object path: /org/facelink/Recognition1
//!
//! Successful replies carry the `{"success": true, "data": ..., "message": ...}`
//! envelope the companion apps expect. Caller mistakes surface as
//! `InvalidArgs` (HTTP-400 equivalent), failures on our side as `Failed`
//! (500 equivalent).

use std::sync::Arc;
use zbus::interface;

use crate::engine::{EngineError, RecognitionEngine};
use crate::store::SqliteStore;

pub struct FacelinkService {
    engine: Arc<RecognitionEngine<SqliteStore>>,
}

impl FacelinkService {
    pub fn new(engine: Arc<RecognitionEngine<SqliteStore>>) -> Self {
        Self { engine }
    }
}

fn envelope(data: serde_json::Value, message: Option<String>) -> String {
    let mut body = serde_json::json!({ "success": true, "data": data });
    if let Some(message) = message {
        body["message"] = serde_json::Value::String(message);
    }
    body.to_string()
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    if err.is_user_error() {
        zbus::fdo::Error::InvalidArgs(err.to_string())
    } else {
        tracing::error!(error = %err, "request failed");
        zbus::fdo::Error::Failed(err.to_string())
    }
}

#[interface(name = "org.facelink.Recognition1")]
impl FacelinkService {
    /// Recognize a visitor from a base64-encoded photo.
    async fn recognize(&self, image: &str) -> zbus::fdo::Result<String> {
        if image.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("No image provided".into()));
        }

        let outcome = self.engine.recognize(image).await.map_err(to_fdo)?;

        let message = match &outcome.person {
            Some(person) => format!("It looks like {} is here.", person.name),
            None => outcome
                .timeline_event
                .notes
                .clone()
                .unwrap_or_else(|| "I don't recognize this person".to_string()),
        };

        let data = serde_json::to_value(&outcome)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(envelope(data, Some(message)))
    }

    /// Add a known person (no face encoding yet).
    async fn add_person(
        &self,
        name: &str,
        relationship: &str,
        reminder: &str,
    ) -> zbus::fdo::Result<String> {
        if name.is_empty() || relationship.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs(
                "Name and relationship are required".into(),
            ));
        }

        let reminder = (!reminder.is_empty()).then_some(reminder);
        let person = self
            .engine
            .add_person(name, relationship, reminder)
            .await
            .map_err(to_fdo)?;

        tracing::info!(person = %person.name, id = %person.id, "person added");
        let message = format!("Person \"{}\" created successfully", person.name);
        let data = serde_json::json!({ "person": person });
        Ok(envelope(data, Some(message)))
    }

    /// Register (or replace) a person's reference photo.
    async fn register_photo(&self, person_id: &str, image: &str) -> zbus::fdo::Result<String> {
        if image.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("No image provided".into()));
        }

        let person = self
            .engine
            .register_photo(person_id, image)
            .await
            .map_err(to_fdo)?;

        let message = format!("Face encoding registered for \"{}\"", person.name);
        Ok(envelope(serde_json::json!({ "person": person }), Some(message)))
    }

    /// List all known people.
    async fn list_people(&self) -> zbus::fdo::Result<String> {
        let people = self.engine.people().await.map_err(to_fdo)?;
        Ok(envelope(serde_json::json!({ "people": people }), None))
    }

    /// Remove a person and their cooldown state.
    async fn remove_person(&self, person_id: &str) -> zbus::fdo::Result<bool> {
        let removed = self.engine.remove_person(person_id).await.map_err(to_fdo)?;
        if removed {
            tracing::info!(person_id, "person removed");
        }
        Ok(removed)
    }

    /// Most recent timeline events, newest first.
    async fn timeline(&self, limit: u32) -> zbus::fdo::Result<String> {
        let events = self.engine.timeline(limit).await.map_err(to_fdo)?;
        Ok(envelope(serde_json::json!({ "events": events }), None))
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "encoder": self.engine.encoder_name(),
            "distance_threshold": self.engine.distance_threshold(),
            "cooldown_minutes": self.engine.cooldown_window().num_minutes(),
        })
        .to_string())
    }
}
