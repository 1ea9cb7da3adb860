//! Looping scene timeline
//!
//! The [`Sequencer`] owns the scene elements and timed events and advances a looping
//! clock. It is an explicit context object: the application steps it once per frame
//! and hands the engine a [`FrameContext`] snapshot for that tick.

use super::element::{attractor_at, emitter_force_at, AttractorSample, ElementKind, SceneElement};
use super::scene::{EventRecord, SceneDocument};
use crate::error::SceneError;
use crate::solver::Force;
use std::path::Path;
use tracing::{info, warn};

/// Per-tick view of the timeline consumed by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameContext {
    /// Sequencer time the tunables are sampled at
    pub time: f32,
    /// Attractors in world space
    pub attractors: Vec<AttractorSample>,
}

/// Timed event with its per-loop fired flag
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub time: f32,
    pub fired: bool,
}

impl From<&EventRecord> for Event {
    fn from(record: &EventRecord) -> Self {
        Self {
            name: record.name.clone(),
            time: record.time,
            fired: false,
        }
    }
}

/// What happened during one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// The clock wrapped around the duration
    pub looped: bool,
    /// Names of events fired this step, in declaration order
    pub fired: Vec<String>,
}

/// Scene clock, elements and events
#[derive(Debug, Clone)]
pub struct Sequencer {
    time: f32,
    /// Loop length in seconds
    pub duration: f32,
    elements: Vec<SceneElement>,
    events: Vec<Event>,
    next_id: u32,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    /// Empty 20 second loop
    #[must_use]
    pub fn new() -> Self {
        Self {
            time: 0.0,
            duration: 20.0,
            elements: Vec::new(),
            events: Vec::new(),
            next_id: 0,
        }
    }

    /// Build from a scene document
    #[must_use]
    pub fn from_document(document: &SceneDocument) -> Self {
        let mut sequencer = Self::new();
        sequencer.apply_document(document);
        sequencer
    }

    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advance the clock by `delta` seconds (may be negative)
    pub fn step_by(&mut self, delta: f32) -> StepReport {
        self.step_to(self.time + delta)
    }

    /// Move the clock to `time`, wrapping into `[0, duration]`
    ///
    /// Wrapping resets every event, then events whose time has been reached fire.
    pub fn step_to(&mut self, time: f32) -> StepReport {
        let mut report = StepReport::default();

        self.time = time;
        if self.duration > 0.0 && (self.time > self.duration || self.time < 0.0) {
            self.time = self.time.rem_euclid(self.duration);
            report.looped = true;
            for event in &mut self.events {
                event.fired = false;
            }
            info!("Sequencer looped at {:.2}s", self.time);
        }

        for event in &mut self.events {
            if self.time >= event.time && !event.fired {
                event.fired = true;
                info!("Firing event '{}' at {:.2}s", event.name, self.time);
                report.fired.push(event.name.clone());
            }
        }

        report
    }

    /// Create an element of `kind` with default properties and a fresh id
    pub fn create_element(&mut self, kind: ElementKind) -> &mut SceneElement {
        let element = SceneElement::new(self.next_id, kind);
        self.add_element(element)
    }

    /// Append an element, keeping ids unique
    pub fn add_element(&mut self, mut element: SceneElement) -> &mut SceneElement {
        if self.id_in_use(element.id()) {
            element.common.id = self.unused_id();
        }
        self.next_id = self.next_id.max(element.id().saturating_add(1));
        let index = self.elements.len();
        self.elements.push(element);
        &mut self.elements[index]
    }

    fn id_in_use(&self, id: u32) -> bool {
        self.elements.iter().any(|e| e.id() == id)
    }

    /// `next_id`, or the lowest free id once ids have run up to `u32::MAX`
    fn unused_id(&self) -> u32 {
        if !self.id_in_use(self.next_id) {
            return self.next_id;
        }
        (0..u32::MAX)
            .find(|&id| !self.id_in_use(id))
            .unwrap_or(self.next_id)
    }

    /// First element named `name`
    #[must_use]
    pub fn find_element(&self, name: &str) -> Option<&SceneElement> {
        self.elements.iter().find(|e| e.name() == name)
    }

    pub fn find_element_mut(&mut self, name: &str) -> Option<&mut SceneElement> {
        self.elements.iter_mut().find(|e| e.name() == name)
    }

    /// Remove the element with `id`
    pub fn remove_element(&mut self, id: u32) -> Option<SceneElement> {
        let index = self.elements.iter().position(|e| e.id() == id)?;
        Some(self.elements.remove(index))
    }

    #[must_use]
    pub fn elements(&self) -> &[SceneElement] {
        &self.elements
    }

    fn of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &SceneElement> {
        self.elements.iter().filter(move |e| e.kind() == kind)
    }

    pub fn emitters(&self) -> impl Iterator<Item = &SceneElement> {
        self.of_kind(ElementKind::Emitter)
    }

    pub fn attractors(&self) -> impl Iterator<Item = &SceneElement> {
        self.of_kind(ElementKind::Attractor)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &SceneElement> {
        self.of_kind(ElementKind::Obstacle)
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn add_event(&mut self, name: impl Into<String>, time: f32) {
        self.events.push(Event {
            name: name.into(),
            time,
            fired: false,
        });
    }

    /// World-space forces of every emitter at the current time
    #[must_use]
    pub fn emitter_forces(&self) -> Vec<Force> {
        self.emitters()
            .filter_map(|e| emitter_force_at(e, self.time))
            .collect()
    }

    /// Snapshot for the engine tick
    #[must_use]
    pub fn frame_context(&self) -> FrameContext {
        FrameContext {
            time: self.time,
            attractors: self
                .attractors()
                .filter_map(|e| attractor_at(e, self.time))
                .collect(),
        }
    }

    /// Replace duration, elements and events from a scene file
    ///
    /// All-or-nothing: on error the current scene is kept.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SceneError> {
        let path = path.as_ref();
        match SceneDocument::load(path) {
            Ok(document) => {
                self.apply_document(&document);
                info!(
                    "Loaded scene {}: {} elements, {} events, {:.1}s loop",
                    path.display(),
                    self.elements.len(),
                    self.events.len(),
                    self.duration
                );
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load scene {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    /// Write duration, elements and events to a scene file
    ///
    /// # Errors
    /// Returns error if file cannot be written or state cannot be serialized
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneError> {
        let path = path.as_ref();
        self.to_document().save(path)?;
        info!("Saved scene {}", path.display());
        Ok(())
    }

    #[must_use]
    pub fn to_document(&self) -> SceneDocument {
        SceneDocument {
            duration: self.duration,
            elements: self.elements.clone(),
            events: self
                .events
                .iter()
                .map(|e| EventRecord {
                    name: e.name.clone(),
                    time: e.time,
                })
                .collect(),
        }
    }

    fn apply_document(&mut self, document: &SceneDocument) {
        self.duration = document.duration;
        self.elements.clear();
        self.next_id = 0;
        for element in &document.elements {
            self.add_element(element.clone());
        }
        self.events = document.events.iter().map(Event::from).collect();
    }
}
