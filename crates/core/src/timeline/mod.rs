//! Scene timeline: keyframed properties, scene elements and the looping sequencer

pub mod element;
pub mod property;
pub mod scene;
pub mod sequencer;

pub use element::{
    attractor_at, bounds_at, draw_obstacle, emitter_force_at, AttractorSample, ElementBody,
    ElementCommon, ElementKind, ObstacleShape, SceneElement,
};
pub use property::{Curve, Ease, Keyframe, Lerp, Property, EASE_COUNT};
pub use scene::{load_forces, save_forces, EventRecord, SceneDocument};
pub use sequencer::{Event, FrameContext, Sequencer, StepReport};
