use std::fmt;

use ekyc_types::Pose;

/// Quarter of the screen holding the nose-pointing target. A target sitting
/// exactly on the centre line belongs to the left or top half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenQuadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ScreenQuadrant {
    pub fn of_target(left: f32, top: f32) -> Self {
        match (left <= 0.5, top <= 0.5) {
            (true, true) => ScreenQuadrant::TopLeft,
            (false, true) => ScreenQuadrant::TopRight,
            (true, false) => ScreenQuadrant::BottomLeft,
            (false, false) => ScreenQuadrant::BottomRight,
        }
    }

    /// Whether turning from `selfie` to `nose_point` moves the head towards
    /// this quadrant.
    pub fn pose_fits(self, nose_point: &Pose, selfie: &Pose) -> bool {
        match self {
            ScreenQuadrant::TopLeft => {
                nose_point.yaw < selfie.yaw && nose_point.pitch > selfie.pitch
            }
            ScreenQuadrant::TopRight => {
                nose_point.yaw >= selfie.yaw && nose_point.pitch >= selfie.pitch
            }
            ScreenQuadrant::BottomLeft => {
                nose_point.yaw < selfie.yaw && nose_point.pitch < selfie.pitch
            }
            ScreenQuadrant::BottomRight => {
                nose_point.yaw >= selfie.yaw && nose_point.pitch < selfie.pitch
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenQuadrant::TopLeft => "top-left",
            ScreenQuadrant::TopRight => "top-right",
            ScreenQuadrant::BottomLeft => "bottom-left",
            ScreenQuadrant::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for ScreenQuadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
