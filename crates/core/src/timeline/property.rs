//! Keyframed, time-sampled values with easing
//!
//! A [`Property`] is an ordered list of keyframes. Sampling between two frames
//! interpolates with the easing curve of the earlier frame; sampling outside the
//! keyframe range clamps to the first/last value. A property with a single frame is
//! constant.
//!
//! Easing curves are serialized by index into a fixed table of 41 entries so scene
//! files stay compatible with the installation's existing documents. The table has
//! `None` at index 0 followed by groups of four (`In`, `Out`, `InOut`, `OutIn`) for
//! Quad, Cubic, Quad (again), Quart, Quint, Sine, Expo, Circ, Bounce and Back.

use crate::core_types::{Color, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Base easing curve family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    Quad,
    Cubic,
    Quart,
    Quint,
    Sine,
    Expo,
    Circ,
    Bounce,
    Back,
}

/// Easing applied to the normalized time between two keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Ease {
    /// Plain linear interpolation
    #[default]
    None,
    In(Curve),
    Out(Curve),
    InOut(Curve),
    OutIn(Curve),
}

/// Curve family for each group of four in the index table
const EASE_TABLE: [Curve; 10] = [
    Curve::Quad,
    Curve::Cubic,
    Curve::Quad,
    Curve::Quart,
    Curve::Quint,
    Curve::Sine,
    Curve::Expo,
    Curve::Circ,
    Curve::Bounce,
    Curve::Back,
];

/// Number of entries in the ease index table
pub const EASE_COUNT: u8 = 41;

impl Ease {
    /// Look up an ease by table index. Out-of-range indices map to `None`.
    #[must_use]
    pub fn from_index(index: u8) -> Self {
        if index == 0 || index >= EASE_COUNT {
            return Ease::None;
        }
        let slot = usize::from(index - 1);
        let curve = EASE_TABLE[slot / 4];
        match slot % 4 {
            0 => Ease::In(curve),
            1 => Ease::Out(curve),
            2 => Ease::InOut(curve),
            _ => Ease::OutIn(curve),
        }
    }

    /// Table index of this ease (first occurrence for the duplicated Quad group)
    #[must_use]
    pub fn index(&self) -> u8 {
        let (curve, mode) = match *self {
            Ease::None => return 0,
            Ease::In(c) => (c, 0),
            Ease::Out(c) => (c, 1),
            Ease::InOut(c) => (c, 2),
            Ease::OutIn(c) => (c, 3),
        };
        let group = EASE_TABLE
            .iter()
            .position(|&c| c == curve)
            .unwrap_or_default();
        1 + (group as u8) * 4 + mode
    }

    /// Map normalized time `t` in `[0, 1]` through the curve
    #[must_use]
    pub fn apply(&self, t: f32) -> f32 {
        match *self {
            Ease::None => t,
            Ease::In(c) => ease_in(c, t),
            Ease::Out(c) => ease_out(c, t),
            Ease::InOut(c) => ease_in_out(c, t),
            Ease::OutIn(c) => {
                if t < 0.5 {
                    ease_out(c, 2.0 * t) * 0.5
                } else {
                    ease_in(c, 2.0 * t - 1.0) * 0.5 + 0.5
                }
            }
        }
    }
}

impl From<u8> for Ease {
    fn from(index: u8) -> Self {
        Self::from_index(index)
    }
}

impl From<Ease> for u8 {
    fn from(ease: Ease) -> Self {
        ease.index()
    }
}

const BACK_OVERSHOOT: f32 = 1.70158;

fn bounce_out(t: f32) -> f32 {
    if t < 1.0 / 2.75 {
        7.5625 * t * t
    } else if t < 2.0 / 2.75 {
        let t = t - 1.5 / 2.75;
        7.5625 * t * t + 0.75
    } else if t < 2.5 / 2.75 {
        let t = t - 2.25 / 2.75;
        7.5625 * t * t + 0.9375
    } else {
        let t = t - 2.625 / 2.75;
        7.5625 * t * t + 0.984375
    }
}

fn ease_in(curve: Curve, t: f32) -> f32 {
    match curve {
        Curve::Quad => t * t,
        Curve::Cubic => t * t * t,
        Curve::Quart => t.powi(4),
        Curve::Quint => t.powi(5),
        Curve::Sine => 1.0 - (t * FRAC_PI_2).cos(),
        Curve::Expo => {
            if t == 0.0 {
                0.0
            } else {
                2f32.powf(10.0 * (t - 1.0))
            }
        }
        Curve::Circ => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
        Curve::Bounce => 1.0 - bounce_out(1.0 - t),
        Curve::Back => t * t * ((BACK_OVERSHOOT + 1.0) * t - BACK_OVERSHOOT),
    }
}

fn ease_out(curve: Curve, t: f32) -> f32 {
    match curve {
        Curve::Bounce => bounce_out(t),
        Curve::Sine => (t * FRAC_PI_2).sin(),
        // Every other family is the mirrored ease-in
        _ => 1.0 - ease_in(curve, 1.0 - t),
    }
}

fn ease_in_out(curve: Curve, t: f32) -> f32 {
    match curve {
        Curve::Sine => -0.5 * ((PI * t).cos() - 1.0),
        Curve::Back => {
            let s = BACK_OVERSHOOT * 1.525;
            let t2 = t * 2.0;
            if t2 < 1.0 {
                0.5 * (t2 * t2 * ((s + 1.0) * t2 - s))
            } else {
                let t2 = t2 - 2.0;
                0.5 * (t2 * t2 * ((s + 1.0) * t2 + s) + 2.0)
            }
        }
        _ => {
            if t < 0.5 {
                ease_in(curve, 2.0 * t) * 0.5
            } else {
                ease_out(curve, 2.0 * t - 1.0) * 0.5 + 0.5
            }
        }
    }
}

/// Values that can be interpolated between keyframes
pub trait Lerp: Clone {
    /// Interpolate from `self` to `other` by `t` in `[0, 1]`
    #[must_use]
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for i32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        (*self as f32 + (*other - *self) as f32 * t) as i32
    }
}

impl Lerp for Vec2 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Color {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Color::new(
            self.r.lerp(&other.r, t),
            self.g.lerp(&other.g, t),
            self.b.lerp(&other.b, t),
        )
    }
}

/// One keyframe of a [`Property`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub time: f32,
    #[serde(default)]
    pub ease: Ease,
    pub value: T,
}

/// Keyframed value sampled over sequencer time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property<T> {
    frames: Vec<Keyframe<T>>,
}

impl<T: Lerp + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Lerp + Default> From<T> for Property<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Lerp + Default> Property<T> {
    /// Constant property: a single keyframe at time zero
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            frames: vec![Keyframe {
                time: 0.0,
                ease: Ease::None,
                value,
            }],
        }
    }

    /// Two-frame property ramping from `v0` at `t0` to `v1` at `t1`
    #[must_use]
    pub fn with_range(t0: f32, v0: T, t1: f32, v1: T) -> Self {
        Self {
            frames: vec![
                Keyframe {
                    time: t0,
                    ease: Ease::None,
                    value: v0,
                },
                Keyframe {
                    time: t1,
                    ease: Ease::None,
                    value: v1,
                },
            ],
        }
    }

    /// Sample the property at time `t`
    ///
    /// Clamps to the first/last keyframe outside the keyframe range and eases between
    /// the bracketing pair inside it. An empty property yields `T::default()`.
    #[must_use]
    pub fn value_at(&self, t: f32) -> T {
        let (first, last) = match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return T::default(),
        };

        if self.frames.len() == 1 || t <= first.time {
            return first.value.clone();
        }
        if t >= last.time {
            return last.value.clone();
        }

        for pair in self.frames.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t >= a.time && t <= b.time {
                let span = b.time - a.time;
                let percent = if span > 0.0 { (t - a.time) / span } else { 1.0 };
                return a.value.lerp(&b.value, a.ease.apply(percent));
            }
        }

        last.value.clone()
    }

    /// Value of the first keyframe, used when a time-independent default is needed
    #[must_use]
    pub fn initial_value(&self) -> T {
        self.frames
            .first()
            .map(|f| f.value.clone())
            .unwrap_or_default()
    }

    /// Append a keyframe copying the last value
    ///
    /// With `None` the new frame is placed two seconds after the last one. Frames are
    /// kept sorted by time.
    pub fn add_keyframe(&mut self, time: Option<f32>) {
        let Some(last) = self.frames.last() else {
            self.frames.push(Keyframe {
                time: time.unwrap_or(0.0).max(0.0),
                ease: Ease::None,
                value: T::default(),
            });
            return;
        };

        let frame = Keyframe {
            time: time.unwrap_or(last.time + 2.0),
            ease: Ease::None,
            value: last.value.clone(),
        };
        let at = self.frames.partition_point(|f| f.time <= frame.time);
        self.frames.insert(at, frame);
    }

    /// Replace the value of every keyframe, keeping their times
    pub fn override_value(&mut self, value: &T) {
        for frame in &mut self.frames {
            frame.value = value.clone();
        }
    }

    /// Set time and value of an existing frame; returns `false` if there is no such frame
    pub fn set(&mut self, frame: usize, time: f32, value: T) -> bool {
        let Some(kf) = self.frames.get_mut(frame) else {
            return false;
        };
        kf.time = time;
        kf.value = value;
        true
    }

    /// Set the easing curve leaving `frame`; returns `false` if there is no such frame
    pub fn set_ease(&mut self, frame: usize, ease: Ease) -> bool {
        match self.frames.get_mut(frame) {
            Some(kf) => {
                kf.ease = ease;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.frames
    }

    pub fn remove_keyframe(&mut self, frame: usize) -> Option<Keyframe<T>> {
        (frame < self.frames.len()).then(|| self.frames.remove(frame))
    }
}
