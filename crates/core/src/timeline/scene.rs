//! JSON scene documents and force files
//!
//! A scene holds the loop duration, the element list and the timed events. Force
//! files hold a list of [`ForceRecord`]s, the installation's saved constant forces.

use super::element::SceneElement;
use crate::core_types::Vec2;
use crate::error::SceneError;
use crate::solver::{Force, ForceRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_duration() -> f32 {
    20.0
}

/// Named marker fired once per loop when sequencer time passes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub time: f32,
}

/// On-disk form of a sequencer scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default = "default_duration")]
    pub duration: f32,
    #[serde(default)]
    pub elements: Vec<SceneElement>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            elements: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl SceneDocument {
    /// Load a scene from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let contents = fs::read_to_string(path).map_err(|e| SceneError::Read(e.to_string()))?;
        Self::from_json(&contents)
    }

    /// Parse a scene from a JSON string
    ///
    /// # Errors
    /// Returns [`SceneError::Parse`] on malformed JSON or a non-positive duration
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let scene: Self =
            serde_json::from_str(json).map_err(|e| SceneError::Parse(e.to_string()))?;
        if scene.duration <= 0.0 {
            return Err(SceneError::Parse(format!(
                "duration must be positive, got {}",
                scene.duration
            )));
        }
        Ok(scene)
    }

    /// Save the scene to file
    ///
    /// # Errors
    /// Returns error if file cannot be written or state cannot be serialized
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| SceneError::Serialize(e.to_string()))?;
        fs::write(path, contents).map_err(|e| SceneError::Write(e.to_string()))?;
        Ok(())
    }
}

/// Load world-space forces for a window of `size`
///
/// The engine maps them into its grid when they are queued.
///
/// # Errors
/// Returns error if file cannot be read or parsed
pub fn load_forces<P: AsRef<Path>>(path: P, size: Vec2) -> Result<Vec<Force>, SceneError> {
    let contents = fs::read_to_string(path).map_err(|e| SceneError::Read(e.to_string()))?;
    let records: Vec<ForceRecord> =
        serde_json::from_str(&contents).map_err(|e| SceneError::Parse(e.to_string()))?;
    Ok(records.iter().map(|r| r.to_force(size)).collect())
}

/// Save world-space forces authored in a window of `size`
///
/// # Errors
/// Returns error if file cannot be written or the records cannot be serialized
pub fn save_forces<P: AsRef<Path>>(
    path: P,
    forces: &[Force],
    size: Vec2,
) -> Result<(), SceneError> {
    let records: Vec<ForceRecord> = forces
        .iter()
        .map(|f| ForceRecord::from_force(f, size))
        .collect();
    let contents = serde_json::to_string_pretty(&records)
        .map_err(|e| SceneError::Serialize(e.to_string()))?;
    fs::write(path, contents).map_err(|e| SceneError::Write(e.to_string()))?;
    Ok(())
}
