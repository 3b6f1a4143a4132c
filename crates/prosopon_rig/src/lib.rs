//! Actuator rig catalog.
//!
//! A rig is a named physical head layout: which axes exist, which bus
//! channel each one lives on, its legal angle range, its rest angle, and
//! (for eyelids) its closed angle. The control logic never varies by rig;
//! all differences are data, so the catalog is a closed set of constructors
//! selected by name.

use std::collections::BTreeMap;

/// The closed set of actuator axes any supported head can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    LeftEyeX,
    LeftEyeY,
    LeftUpperLid,
    LeftLowerLid,
    RightEyeX,
    RightEyeY,
    RightUpperLid,
    RightLowerLid,
    /// Shared X axis driving both eyes on single-mechanism heads.
    EyesX,
    /// Shared Y axis driving both eyes on single-mechanism heads.
    EyesY,
}

impl Axis {
    pub fn name(&self) -> &'static str {
        match self {
            Axis::LeftEyeX => "left_eye_x",
            Axis::LeftEyeY => "left_eye_y",
            Axis::LeftUpperLid => "left_upper_lid",
            Axis::LeftLowerLid => "left_lower_lid",
            Axis::RightEyeX => "right_eye_x",
            Axis::RightEyeY => "right_eye_y",
            Axis::RightUpperLid => "right_upper_lid",
            Axis::RightLowerLid => "right_lower_lid",
            Axis::EyesX => "eyes_x",
            Axis::EyesY => "eyes_y",
        }
    }

    /// Horizontal gaze axis.
    pub fn is_x(&self) -> bool {
        matches!(self, Axis::LeftEyeX | Axis::RightEyeX | Axis::EyesX)
    }

    /// Vertical gaze axis.
    pub fn is_y(&self) -> bool {
        matches!(self, Axis::LeftEyeY | Axis::RightEyeY | Axis::EyesY)
    }

    /// Eyelid axis (participates in blinking, not gaze).
    pub fn is_lid(&self) -> bool {
        matches!(
            self,
            Axis::LeftUpperLid | Axis::LeftLowerLid | Axis::RightUpperLid | Axis::RightLowerLid
        )
    }

    /// Right-eye axes receive the rig's mechanical trim offset.
    pub fn is_right_eye(&self) -> bool {
        matches!(self, Axis::RightEyeX | Axis::RightEyeY)
    }
}

/// Everything the bus and the mappers need to know about one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSpec {
    pub channel: u8,
    pub min: f32,
    pub max: f32,
    /// Rest/center angle.
    pub default: f32,
    /// Closed-eyelid angle; None for non-lid axes.
    pub closed: Option<f32>,
    /// For Y axes: top-of-frame maps to `max` instead of `min`.
    pub invert_y: bool,
}

impl AxisSpec {
    fn gaze(channel: u8, min: f32, max: f32, default: f32, invert_y: bool) -> Self {
        Self {
            channel,
            min,
            max,
            default,
            closed: None,
            invert_y,
        }
    }

    fn lid(channel: u8, min: f32, max: f32, default: f32, closed: f32) -> Self {
        Self {
            channel,
            min,
            max,
            default,
            closed: Some(closed),
            invert_y: false,
        }
    }

    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min, self.max)
    }
}

/// A named, immutable actuator layout. One instance per session, selected
/// from the catalog by name.
#[derive(Debug, Clone, PartialEq)]
pub struct RigConfig {
    name: &'static str,
    axes: BTreeMap<Axis, AxisSpec>,
    /// Degrees added to the right eye's X target before clamping, to
    /// compensate mechanical misalignment between the two eye assemblies.
    pub right_eye_x_trim: f32,
    /// Degrees added to the right eye's Y target before clamping.
    pub right_eye_y_trim: f32,
}

impl RigConfig {
    /// Look up a rig by catalog name. Unknown names warn and fall back to
    /// the default `inmoov` layout.
    pub fn by_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "inmoov" => Self::inmoov(),
            "original" => Self::original(),
            "simple" => Self::simple(),
            other => {
                tracing::warn!("Unknown rig '{}', falling back to 'inmoov'", other);
                Self::inmoov()
            }
        }
    }

    /// Names accepted by [`RigConfig::by_name`].
    pub fn catalog() -> &'static [&'static str] {
        &["inmoov", "original", "simple"]
    }

    /// InMoov head: 8 servos, 4 per eye (X, Y, upper lid, lower lid).
    pub fn inmoov() -> Self {
        let axes = BTreeMap::from([
            (Axis::LeftEyeX, AxisSpec::gaze(0, 57.0, 145.0, 90.0, false)),
            (Axis::LeftEyeY, AxisSpec::gaze(1, 52.0, 112.0, 90.0, false)),
            (Axis::LeftUpperLid, AxisSpec::lid(2, 70.0, 180.0, 70.0, 180.0)),
            (Axis::LeftLowerLid, AxisSpec::lid(3, 10.0, 100.0, 100.0, 10.0)),
            (Axis::RightEyeX, AxisSpec::gaze(4, 57.0, 145.0, 90.0, false)),
            (Axis::RightEyeY, AxisSpec::gaze(5, 52.0, 112.0, 90.0, true)),
            (Axis::RightUpperLid, AxisSpec::lid(6, 10.0, 120.0, 120.0, 10.0)),
            (Axis::RightLowerLid, AxisSpec::lid(7, 90.0, 180.0, 90.0, 180.0)),
        ]);
        Self::validated(Self {
            name: "inmoov",
            axes,
            right_eye_x_trim: 0.0,
            right_eye_y_trim: 10.0,
        })
    }

    /// Original head: 6 servos, one shared X/Y mechanism plus four lids.
    pub fn original() -> Self {
        let axes = BTreeMap::from([
            (Axis::EyesX, AxisSpec::gaze(0, 57.0, 145.0, 100.0, false)),
            (Axis::EyesY, AxisSpec::gaze(1, 52.0, 112.0, 80.0, true)),
            (Axis::LeftUpperLid, AxisSpec::lid(2, 70.0, 180.0, 70.0, 180.0)),
            (Axis::RightUpperLid, AxisSpec::lid(3, 10.0, 120.0, 120.0, 10.0)),
            (Axis::LeftLowerLid, AxisSpec::lid(4, 10.0, 100.0, 100.0, 10.0)),
            (Axis::RightLowerLid, AxisSpec::lid(5, 90.0, 180.0, 90.0, 180.0)),
        ]);
        Self::validated(Self {
            name: "original",
            axes,
            right_eye_x_trim: 0.0,
            right_eye_y_trim: 0.0,
        })
    }

    /// Bench rig: bare X/Y gimbal, no eyelids.
    pub fn simple() -> Self {
        let axes = BTreeMap::from([
            (Axis::EyesX, AxisSpec::gaze(0, 0.0, 180.0, 90.0, false)),
            (Axis::EyesY, AxisSpec::gaze(1, 0.0, 180.0, 90.0, true)),
        ]);
        Self::validated(Self {
            name: "simple",
            axes,
            right_eye_x_trim: 0.0,
            right_eye_y_trim: 0.0,
        })
    }

    fn validated(rig: Self) -> Self {
        let mut seen = std::collections::BTreeSet::new();
        for (axis, spec) in &rig.axes {
            debug_assert!(
                seen.insert(spec.channel),
                "rig '{}': duplicate channel {} on {}",
                rig.name,
                spec.channel,
                axis.name()
            );
            debug_assert!(
                spec.min <= spec.default && spec.default <= spec.max,
                "rig '{}': default angle out of range on {}",
                rig.name,
                axis.name()
            );
            if let Some(closed) = spec.closed {
                debug_assert!(
                    spec.min <= closed && closed <= spec.max,
                    "rig '{}': closed angle out of range on {}",
                    rig.name,
                    axis.name()
                );
            }
        }
        rig
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn servo_count(&self) -> usize {
        self.axes.len()
    }

    pub fn spec(&self, axis: Axis) -> Option<&AxisSpec> {
        self.axes.get(&axis)
    }

    pub fn has_axis(&self, axis: Axis) -> bool {
        self.axes.contains_key(&axis)
    }

    /// Iteration order follows the `Axis` enum, not channel numbering.
    pub fn axes(&self) -> impl Iterator<Item = (Axis, &AxisSpec)> {
        self.axes.iter().map(|(a, s)| (*a, s))
    }

    /// Gaze axes only (X and Y, no lids).
    pub fn gaze_axes(&self) -> impl Iterator<Item = (Axis, &AxisSpec)> {
        self.axes().filter(|(a, _)| a.is_x() || a.is_y())
    }

    /// Eyelid axes with a configured closed angle.
    pub fn lids(&self) -> impl Iterator<Item = (Axis, &AxisSpec)> {
        self.axes().filter(|(_, s)| s.closed.is_some())
    }
}
