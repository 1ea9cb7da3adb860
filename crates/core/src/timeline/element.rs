//! Scene elements: emitters, attractors and obstacles
//!
//! Elements are a closed set, so they are modelled as one tagged enum instead of a
//! trait hierarchy. Every element shares [`ElementCommon`] (identity, start offset,
//! keyframed position and radius); the variant payload carries the rest. Behaviour is
//! provided by free functions that match on the variant.
//!
//! All properties are sampled at `start_time + t`, so one scene timeline can shift
//! individual elements without re-keying them.

use super::property::Property;
use crate::core_types::{Color, Rect, Vec2};
use crate::solver::{Force, ObstacleCanvas};
use serde::{Deserialize, Serialize};

/// Discriminant used when creating elements by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Emitter,
    Attractor,
    Obstacle,
}

/// Fields shared by every element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCommon {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub start_time: f32,
    pub position: Property<Vec2>,
    pub radius: Property<f32>,
}

impl ElementCommon {
    fn new(id: u32) -> Self {
        Self {
            id,
            name: "Untitled Element".to_string(),
            start_time: 0.0,
            position: Property::new(Vec2::new(100.0, 180.0)),
            radius: Property::new(64.0),
        }
    }

    #[must_use]
    pub fn position_at(&self, t: f32) -> Vec2 {
        self.position.value_at(self.start_time + t)
    }

    #[must_use]
    pub fn radius_at(&self, t: f32) -> f32 {
        self.radius.value_at(self.start_time + t)
    }
}

/// Injects smoke, heat and momentum each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    pub velocity: Property<Vec2>,
    pub color: Property<Color>,
    pub temperature: Property<f32>,
    pub density: Property<f32>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            velocity: Property::new(Vec2::new(1.0, 0.0)),
            color: Property::new(Color::new(0.5, 0.1, 0.01)),
            temperature: Property::new(10.0),
            density: Property::new(1.0),
        }
    }
}

/// Pulls (positive force) or pushes (negative force) velocity within its radius
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attractor {
    pub force: Property<f32>,
}

impl Default for Attractor {
    fn default() -> Self {
        Self {
            force: Property::new(0.5),
        }
    }
}

/// Outline drawn into the obstacle mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ObstacleShape {
    /// Rotated box; `aspect` is height / width of the unit quad
    Box { aspect: f32 },
    Disc,
}

impl Default for ObstacleShape {
    fn default() -> Self {
        ObstacleShape::Box { aspect: 1.0 }
    }
}

/// Solid region in the flow
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Obstacle {
    pub rotation: Property<f32>,
    #[serde(default)]
    pub shape: ObstacleShape,
}

/// Variant payload of a [`SceneElement`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElementBody {
    Emitter(Emitter),
    Attractor(Attractor),
    Obstacle(Obstacle),
}

/// One element of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneElement {
    #[serde(flatten)]
    pub common: ElementCommon,
    #[serde(flatten)]
    pub body: ElementBody,
}

impl SceneElement {
    /// New element of `kind` with default properties
    #[must_use]
    pub fn new(id: u32, kind: ElementKind) -> Self {
        let body = match kind {
            ElementKind::Emitter => ElementBody::Emitter(Emitter::default()),
            ElementKind::Attractor => ElementBody::Attractor(Attractor::default()),
            ElementKind::Obstacle => ElementBody::Obstacle(Obstacle::default()),
        };
        Self {
            common: ElementCommon::new(id),
            body,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self.body {
            ElementBody::Emitter(_) => ElementKind::Emitter,
            ElementBody::Attractor(_) => ElementKind::Attractor,
            ElementBody::Obstacle(_) => ElementKind::Obstacle,
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.common.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.common.name
    }
}

/// World-space bounds of an element at time `t`
#[must_use]
pub fn bounds_at(element: &SceneElement, t: f32) -> Rect {
    Rect::around(element.common.position_at(t), element.common.radius_at(t))
}

/// World-space force an emitter contributes at time `t`
///
/// Returns `None` for non-emitters.
#[must_use]
pub fn emitter_force_at(element: &SceneElement, t: f32) -> Option<Force> {
    let ElementBody::Emitter(emitter) = &element.body else {
        return None;
    };
    let local = element.common.start_time + t;
    Some(Force {
        position: element.common.position_at(t),
        velocity: emitter.velocity.value_at(local),
        color: emitter.color.value_at(local),
        radius: element.common.radius_at(t),
        temperature: emitter.temperature.value_at(local),
        density: emitter.density.value_at(local),
    })
}

/// Sampled attractor state in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttractorSample {
    pub position: Vec2,
    pub radius: f32,
    pub force: f32,
}

/// Attractor state at time `t`, `None` for other kinds
#[must_use]
pub fn attractor_at(element: &SceneElement, t: f32) -> Option<AttractorSample> {
    let ElementBody::Attractor(attractor) = &element.body else {
        return None;
    };
    Some(AttractorSample {
        position: element.common.position_at(t),
        radius: element.common.radius_at(t),
        force: attractor.force.value_at(element.common.start_time + t),
    })
}

/// Rasterize an obstacle into `canvas` at time `t`
///
/// `overhang` enlarges the shape (the display pass draws slightly larger than the
/// simulation pass). `scale` maps world coordinates to canvas texels. Elements that
/// are not obstacles, or whose radius is below 0.01, draw nothing.
pub fn draw_obstacle(
    element: &SceneElement,
    t: f32,
    canvas: &mut ObstacleCanvas,
    overhang: f32,
    scale: f32,
) {
    let ElementBody::Obstacle(obstacle) = &element.body else {
        return;
    };

    let radius = element.common.radius_at(t) * overhang;
    if radius < 0.01 {
        return;
    }

    let center = element.common.position_at(t) * scale;
    let radius = radius * scale;

    // Both shapes span `radius` edge to edge
    match obstacle.shape {
        ObstacleShape::Disc => canvas.fill_circle(center, radius * 0.5),
        ObstacleShape::Box { aspect } => {
            let rotation = obstacle
                .rotation
                .value_at(element.common.start_time + t);
            let (sin, cos) = rotation.sin_cos();
            let aspect = if aspect > 0.0 { aspect } else { 1.0 };
            let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)].map(
                |(x, y): (f32, f32)| {
                    let (x, y) = (x, y / aspect);
                    center + Vec2::new(x * cos - y * sin, x * sin + y * cos) * radius
                },
            );
            canvas.fill_quad(&corners);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_emitter_force() {
        let e = SceneElement::new(3, ElementKind::Emitter);
        let f = emitter_force_at(&e, 0.0).unwrap();
        assert_eq!(f.position, Vec2::new(100.0, 180.0));
        assert_eq!(f.radius, 64.0);
        assert_eq!(f.temperature, 10.0);
        assert_eq!(f.density, 1.0);
        assert_eq!(f.velocity, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_non_emitter_has_no_force() {
        let a = SceneElement::new(0, ElementKind::Attractor);
        assert!(emitter_force_at(&a, 0.0).is_none());
        assert_relative_eq!(attractor_at(&a, 0.0).unwrap().force, 0.5);
    }

    #[test]
    fn test_start_time_offsets_sampling() {
        let mut e = SceneElement::new(1, ElementKind::Attractor);
        e.common.radius = Property::with_range(0.0, 0.0, 10.0, 100.0);
        e.common.start_time = 5.0;
        assert_relative_eq!(e.common.radius_at(0.0), 50.0);
        let b = bounds_at(&e, 0.0);
        assert_relative_eq!(b.width(), 100.0);
    }

    #[test]
    fn test_draw_disc_obstacle_marks_canvas() {
        let mut e = SceneElement::new(2, ElementKind::Obstacle);
        if let ElementBody::Obstacle(o) = &mut e.body {
            o.shape = ObstacleShape::Disc;
        }
        e.common.position = Property::new(Vec2::new(20.0, 20.0));
        e.common.radius = Property::new(8.0);

        let mut canvas = ObstacleCanvas::new(32, 32);
        draw_obstacle(&e, 0.0, &mut canvas, 1.0, 0.5);
        assert!(canvas.is_solid(10, 10));
        assert!(!canvas.is_solid(0, 0));
    }

    #[test]
    fn test_element_json_is_tagged() {
        let e = SceneElement::new(9, ElementKind::Attractor);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "Attractor");
        assert_eq!(json["id"], 9);
        let back: SceneElement = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }
}
