//! Face-position to servo-angle mapping.

use prosopon_rig::{Axis, RigConfig};
use std::collections::BTreeMap;

/// Per-axis target angles for one tracking tick. Ephemeral: recomputed
/// every tick, written as one batch, never persisted.
pub type GazeTarget = BTreeMap<Axis, f32>;

/// Maps a face center in pixel space onto the active rig's gaze axes.
pub struct GazeMapper;

impl GazeMapper {
    /// Compute target angles for every gaze axis the rig has.
    ///
    /// X axes are inverted: the camera mirrors the world, so a face
    /// moving right must swing the gaze left. Y orientation is rig data.
    /// Right-eye axes get the rig's mechanical trim added before the
    /// final clamp. The result covers all present gaze axes or (on a
    /// detection failure upstream) is never computed at all; partial
    /// updates are not representable.
    pub fn map(
        face_x: u32,
        face_y: u32,
        frame_width: u32,
        frame_height: u32,
        rig: &RigConfig,
    ) -> GazeTarget {
        let mut target = GazeTarget::new();

        for (axis, spec) in rig.gaze_axes() {
            let mut angle = if axis.is_x() {
                map_value(face_x as f32, 0.0, frame_width as f32, spec.max, spec.min)
            } else if spec.invert_y {
                map_value(face_y as f32, 0.0, frame_height as f32, spec.max, spec.min)
            } else {
                map_value(face_y as f32, 0.0, frame_height as f32, spec.min, spec.max)
            };

            if axis.is_right_eye() {
                angle += if axis.is_x() {
                    rig.right_eye_x_trim
                } else {
                    rig.right_eye_y_trim
                };
            }

            target.insert(axis, spec.clamp(angle));
        }

        target
    }
}

/// Linear interpolation from one range onto another.
fn map_value(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 640;
    const H: u32 = 480;

    #[test]
    fn test_center_maps_to_midpoints() {
        let rig = RigConfig::original();
        let target = GazeMapper::map(W / 2, H / 2, W, H, &rig);
        for (axis, angle) in &target {
            let spec = rig.spec(*axis).unwrap();
            let midpoint = (spec.min + spec.max) / 2.0;
            assert!(
                (angle - midpoint).abs() < 0.5,
                "{}: {} != midpoint {}",
                axis.name(),
                angle,
                midpoint
            );
        }
    }

    #[test]
    fn test_x_axis_is_inverted() {
        let rig = RigConfig::simple();
        let spec = *rig.spec(Axis::EyesX).unwrap();

        // Face at the left edge of the mirrored frame -> gaze at max.
        let left = GazeMapper::map(0, H / 2, W, H, &rig);
        assert_eq!(left[&Axis::EyesX], spec.max);

        // Face at the right edge -> gaze at min.
        let right = GazeMapper::map(W, H / 2, W, H, &rig);
        assert_eq!(right[&Axis::EyesX], spec.min);
    }

    #[test]
    fn test_y_orientation_follows_rig_data() {
        let rig = RigConfig::inmoov();
        let top = GazeMapper::map(W / 2, 0, W, H, &rig);

        // Left eye Y is not inverted: top of frame -> min bound.
        let left_spec = rig.spec(Axis::LeftEyeY).unwrap();
        assert_eq!(top[&Axis::LeftEyeY], left_spec.min);

        // Right eye Y is inverted: top of frame -> max bound (after trim
        // the clamp holds it at the bound).
        let right_spec = rig.spec(Axis::RightEyeY).unwrap();
        assert_eq!(top[&Axis::RightEyeY], right_spec.max);
    }

    #[test]
    fn test_right_eye_trim_is_applied_before_clamp() {
        let rig = RigConfig::inmoov();
        let center = GazeMapper::map(W / 2, H / 2, W, H, &rig);

        let left_spec = rig.spec(Axis::LeftEyeY).unwrap();
        let right_spec = rig.spec(Axis::RightEyeY).unwrap();
        let midpoint = (left_spec.min + left_spec.max) / 2.0;

        assert!((center[&Axis::LeftEyeY] - midpoint).abs() < 0.5);
        // inmoov carries a +10 degree Y trim on the right eye.
        let expected = right_spec.clamp(midpoint + rig.right_eye_y_trim);
        assert!((center[&Axis::RightEyeY] - expected).abs() < 0.5);
    }

    #[test]
    fn test_every_angle_is_clamped() {
        let rig = RigConfig::inmoov();
        // Degenerate coordinates way outside the frame still clamp.
        let target = GazeMapper::map(10_000, 10_000, W, H, &rig);
        for (axis, angle) in &target {
            let spec = rig.spec(*axis).unwrap();
            assert!(
                (spec.min..=spec.max).contains(angle),
                "{} out of range: {}",
                axis.name(),
                angle
            );
        }
    }

    #[test]
    fn test_batch_covers_all_gaze_axes() {
        let rig = RigConfig::inmoov();
        let target = GazeMapper::map(100, 100, W, H, &rig);
        assert_eq!(target.len(), rig.gaze_axes().count());

        let rig = RigConfig::simple();
        let target = GazeMapper::map(100, 100, W, H, &rig);
        assert_eq!(target.len(), 2);
    }
}
