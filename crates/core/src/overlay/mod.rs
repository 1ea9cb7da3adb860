//! Read-only visual layers fed from field readbacks

pub mod flow_field;
pub mod particles;

pub use flow_field::{FlowField, Segment, SEGMENT_SPACING};
pub use particles::{Particle, ParticleOverlay, ParticleSettings, Sprite};
