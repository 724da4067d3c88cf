//! Angle extraction
//!
//! This module converts a frame of labeled body points into named joint
//! angles: planar three-point angles for elbow/knee/shoulder/hip, signed
//! in-plane wrist bend, head orientation from the face plane, and hand
//! flexion/opposition metrics.
//!
//! All angle math is a 2D planar approximation in the image plane (the head
//! orientation additionally uses the detector's relative depth). An angle
//! whose required points are missing is absent from the output set, never
//! defaulted.

use crate::types::{Joint, JointAngleSet, Landmark, LandmarkFrame};

/// Pose point indices (33-point full-body topology)
pub mod pose {
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;

    /// Minimum point count for pose angles to be computed
    pub const POINT_COUNT: usize = 33;
}

/// Face mesh point indices (468-point topology)
pub mod face {
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const RIGHT_EYE_OUTER: usize = 263;

    /// Minimum point count for head orientation to be computed
    pub const MIN_POINT_COUNT: usize = 264;
}

/// Hand point indices (21-point topology)
pub mod hand {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const PINKY_TIP: usize = 20;

    /// (MCP, PIP) index pairs for the four non-thumb fingers
    pub const MCP_PAIRS: [(usize, usize); 4] = [(5, 6), (9, 10), (13, 14), (17, 18)];
    /// (MCP, PIP, DIP) index triples for the four non-thumb fingers
    pub const PIP_TRIPLES: [(usize, usize, usize); 4] =
        [(5, 6, 7), (9, 10, 11), (13, 14, 15), (17, 18, 19)];

    pub const POINT_COUNT: usize = 21;
}

/// Planar angle at vertex `b` between rays to `a` and `c`, folded into
/// [0,180] degrees.
pub fn planar_angle(a: &Landmark, b: &Landmark, c: &Landmark) -> f64 {
    let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let mut angle = radians.to_degrees().abs();
    if angle > 180.0 {
        angle = 360.0 - angle;
    }
    angle
}

/// Signed in-plane angle at vertex `b`, in [-180,180] degrees. The sign
/// distinguishes flexion from extension.
pub fn signed_angle(a: &Landmark, b: &Landmark, c: &Landmark) -> f64 {
    let ux = a.x - b.x;
    let uy = a.y - b.y;
    let vx = c.x - b.x;
    let vy = c.y - b.y;
    let cross = ux * vy - uy * vx;
    let dot = ux * vx + uy * vy;
    cross.atan2(dot).to_degrees()
}

fn dist2d(a: &Landmark, b: &Landmark) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Head orientation angles derived from the face plane, each in [-90,90]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadOrientation {
    /// Left/right turn
    pub yaw: f64,
    /// Up/down tilt
    pub pitch: f64,
    /// Ear-to-ear tilt
    pub roll: f64,
}

/// Derive head orientation from the two outer eye points and the nose tip.
///
/// The face-plane normal is the cross product of the eye-line vector and the
/// nose offset from the eye midpoint; yaw and pitch are arctangent
/// projections of the normal (camera looking along -Z), roll comes from the
/// eye line itself.
pub fn head_orientation(
    left_eye: &Landmark,
    right_eye: &Landmark,
    nose: &Landmark,
) -> HeadOrientation {
    let mid = (
        (left_eye.x + right_eye.x) / 2.0,
        (left_eye.y + right_eye.y) / 2.0,
        (left_eye.z + right_eye.z) / 2.0,
    );

    let eye_line = (
        right_eye.x - left_eye.x,
        right_eye.y - left_eye.y,
        right_eye.z - left_eye.z,
    );
    let nose_offset = (nose.x - mid.0, nose.y - mid.1, nose.z - mid.2);

    let normal = (
        eye_line.1 * nose_offset.2 - eye_line.2 * nose_offset.1,
        eye_line.2 * nose_offset.0 - eye_line.0 * nose_offset.2,
        eye_line.0 * nose_offset.1 - eye_line.1 * nose_offset.0,
    );

    let mut norm = (normal.0 * normal.0 + normal.1 * normal.1 + normal.2 * normal.2).sqrt();
    if norm == 0.0 {
        norm = 1.0;
    }
    let (nx, ny, nz) = (normal.0 / norm, normal.1 / norm, normal.2 / norm);

    HeadOrientation {
        yaw: nx.atan2(nz).to_degrees().clamp(-90.0, 90.0),
        pitch: (-ny).atan2(nz).to_degrees().clamp(-90.0, 90.0),
        roll: eye_line.1.atan2(eye_line.0).to_degrees().clamp(-90.0, 90.0),
    }
}

/// Stateless extractor from landmark frames to joint angle sets
pub struct AngleExtractor;

impl AngleExtractor {
    /// Extract every computable joint angle from the frame.
    ///
    /// Signals whose points are missing are absent from the result; an empty
    /// frame yields an empty set.
    pub fn extract(frame: &LandmarkFrame) -> JointAngleSet {
        let mut angles = JointAngleSet::new();
        extract_pose_angles(&frame.pose, &mut angles);
        extract_head_angles(&frame.face, &mut angles);
        extract_hand_angles(&frame.hand, &mut angles);
        angles
    }
}

fn extract_pose_angles(points: &[Landmark], angles: &mut JointAngleSet) {
    if points.len() < pose::POINT_COUNT {
        return;
    }
    let p = |i: usize| &points[i];

    // Three-point angles: (proximal, vertex, distal) anatomical triples
    angles.insert(
        Joint::LeftElbow,
        planar_angle(p(pose::LEFT_SHOULDER), p(pose::LEFT_ELBOW), p(pose::LEFT_WRIST)),
    );
    angles.insert(
        Joint::RightElbow,
        planar_angle(p(pose::RIGHT_SHOULDER), p(pose::RIGHT_ELBOW), p(pose::RIGHT_WRIST)),
    );
    angles.insert(
        Joint::LeftKnee,
        planar_angle(p(pose::LEFT_HIP), p(pose::LEFT_KNEE), p(pose::LEFT_ANKLE)),
    );
    angles.insert(
        Joint::RightKnee,
        planar_angle(p(pose::RIGHT_HIP), p(pose::RIGHT_KNEE), p(pose::RIGHT_ANKLE)),
    );
    angles.insert(
        Joint::LeftShoulder,
        planar_angle(p(pose::LEFT_ELBOW), p(pose::LEFT_SHOULDER), p(pose::LEFT_HIP)),
    );
    angles.insert(
        Joint::RightShoulder,
        planar_angle(p(pose::RIGHT_ELBOW), p(pose::RIGHT_SHOULDER), p(pose::RIGHT_HIP)),
    );
    angles.insert(
        Joint::LeftHip,
        planar_angle(p(pose::LEFT_KNEE), p(pose::LEFT_HIP), p(pose::LEFT_SHOULDER)),
    );
    angles.insert(
        Joint::RightHip,
        planar_angle(p(pose::RIGHT_KNEE), p(pose::RIGHT_HIP), p(pose::RIGHT_SHOULDER)),
    );

    // Signed wrist bend in the image plane: elbow-wrist-index
    angles.insert(
        Joint::LeftWristSigned,
        signed_angle(p(pose::LEFT_ELBOW), p(pose::LEFT_WRIST), p(pose::LEFT_INDEX)),
    );
    angles.insert(
        Joint::RightWristSigned,
        signed_angle(p(pose::RIGHT_ELBOW), p(pose::RIGHT_WRIST), p(pose::RIGHT_INDEX)),
    );

    // Hip abduction approximation: lateral knee offset over torso length
    let left_torso = dist2d(p(pose::LEFT_HIP), p(pose::LEFT_SHOULDER));
    if left_torso > 0.0 {
        let dx = (points[pose::LEFT_KNEE].x - points[pose::LEFT_HIP].x).abs();
        angles.insert(Joint::LeftHipAbduction, (dx / left_torso * 90.0).min(90.0));
    }
    let right_torso = dist2d(p(pose::RIGHT_HIP), p(pose::RIGHT_SHOULDER));
    if right_torso > 0.0 {
        let dx = (points[pose::RIGHT_KNEE].x - points[pose::RIGHT_HIP].x).abs();
        angles.insert(Joint::RightHipAbduction, (dx / right_torso * 90.0).min(90.0));
    }
}

fn extract_head_angles(points: &[Landmark], angles: &mut JointAngleSet) {
    if points.len() < face::MIN_POINT_COUNT {
        return;
    }
    let head = head_orientation(
        &points[face::LEFT_EYE_OUTER],
        &points[face::RIGHT_EYE_OUTER],
        &points[face::NOSE_TIP],
    );
    angles.insert(Joint::HeadYaw, head.yaw);
    angles.insert(Joint::HeadPitch, head.pitch);
    angles.insert(Joint::HeadRoll, head.roll);
}

fn extract_hand_angles(points: &[Landmark], angles: &mut JointAngleSet) {
    if points.len() < hand::POINT_COUNT {
        return;
    }

    // Thumb opposition: thumb tip to pinky tip, normalized by palm width
    let palm = dist2d(&points[hand::WRIST], &points[hand::INDEX_MCP]);
    if palm > 0.0 {
        let opposition = dist2d(&points[hand::THUMB_TIP], &points[hand::PINKY_TIP]) / palm;
        angles.insert(Joint::ThumbOppDistance, opposition);
    }

    // MCP flexion: 180 - wrist/MCP/PIP angle, averaged over four fingers
    let mcp_avg = hand::MCP_PAIRS
        .iter()
        .map(|&(mcp, pip)| 180.0 - planar_angle(&points[hand::WRIST], &points[mcp], &points[pip]))
        .sum::<f64>()
        / hand::MCP_PAIRS.len() as f64;
    angles.insert(Joint::McpFlexionAvg, mcp_avg.clamp(0.0, 180.0));

    // PIP flexion: 180 - MCP/PIP/DIP angle, averaged over four fingers
    let pip_avg = hand::PIP_TRIPLES
        .iter()
        .map(|&(mcp, pip, dip)| 180.0 - planar_angle(&points[mcp], &points[pip], &points[dip]))
        .sum::<f64>()
        / hand::PIP_TRIPLES.len() as f64;
    angles.insert(Joint::PipFlexionAvg, pip_avg.clamp(0.0, 180.0));
}
