//! Individual liveness checks. The verifier chains them for a session; each
//! is also usable on its own against a single stored image.

use ekyc_types::{EngineSettings, FaceDetail, Pose};
use ekyc_vision::{FaceAnalyzer, FaceAttributes, ImageRef, imaging};
use tracing::debug;

use crate::error::{LivenessError, LivenessResult};

/// Largest head rotation, in degrees on any axis, accepted on a selfie.
pub const MAX_POSE_DEGREES: f32 = 20.0;

const CHIN_TOO_HIGH: &str = "Your chin is too high, please lower it.";
const CHIN_TOO_LOW: &str = "Your chin is too low, please raise it.";
const NOT_FACING_CAMERA: &str = "Please make sure your face is facing the camera straight on.";
const HEAD_TILTED: &str = "Please do not tilt your head left or right.";

/// Every pose problem on a head-on selfie, joined into one message.
pub fn selfie_pose_problems(pose: &Pose) -> Option<String> {
    let mut problems = Vec::new();
    if pose.pitch > MAX_POSE_DEGREES {
        problems.push(CHIN_TOO_HIGH);
    } else if pose.pitch < -MAX_POSE_DEGREES {
        problems.push(CHIN_TOO_LOW);
    }
    if pose.yaw.abs() > MAX_POSE_DEGREES {
        problems.push(NOT_FACING_CAMERA);
    }
    if pose.roll.abs() > MAX_POSE_DEGREES {
        problems.push(HEAD_TILTED);
    }
    (!problems.is_empty()).then(|| problems.join(" "))
}

/// Whether the midpoint of `face` lies within `max_drift` of the image
/// centre on both axes.
pub fn face_is_centred(face: &FaceDetail, max_drift: f32) -> bool {
    let bbox = &face.bounding_box;
    let x_drift = (bbox.left + bbox.width / 2.0 - 0.5).abs();
    let y_drift = (bbox.top + bbox.height / 2.0 - 0.5).abs();
    x_drift <= max_drift && y_drift <= max_drift
}

/// Eyes are closed only when the detector says so with at least
/// `min_confidence`. A "closed" reading below that floor, or a face without an
/// eyes reading, counts as open.
pub fn eyes_closed(face: &FaceDetail, min_confidence: f32) -> bool {
    face.eyes_open
        .is_some_and(|eyes| !eyes.value && eyes.confidence >= min_confidence)
}

pub fn verify_image_size(bytes: &[u8], settings: &EngineSettings) -> LivenessResult<()> {
    let (width, height) = imaging::dimensions(bytes)?;
    if width < settings.min_image_width || height < settings.min_image_height {
        return Err(LivenessError::ImageTooSmall {
            width,
            height,
            min_width: settings.min_image_width,
            min_height: settings.min_image_height,
        });
    }
    Ok(())
}

/// Best similarity between the face in `source` and a face in `target`, or
/// `None` when they are not the same person.
pub async fn compare_faces(
    faces: &dyn FaceAnalyzer,
    source: &str,
    target: &str,
    min_confidence: f32,
) -> LivenessResult<Option<f32>> {
    let matches = faces
        .compare_faces(
            &ImageRef::stored(source),
            &ImageRef::stored(target),
            min_confidence,
        )
        .await?;
    let best = matches
        .iter()
        .map(|m| m.similarity)
        .filter(|similarity| *similarity >= min_confidence)
        .max_by(f32::total_cmp);
    debug!(source, target, similarity = ?best, "compared faces");
    Ok(best)
}

pub async fn verify_eyes_open(
    faces: &dyn FaceAnalyzer,
    image_key: &str,
    min_confidence: f32,
) -> LivenessResult<bool> {
    let detected = faces
        .detect_faces(&ImageRef::stored(image_key), FaceAttributes::All)
        .await?;
    let face = detected
        .first()
        .ok_or_else(|| LivenessError::no_face(image_key))?;
    match face.eyes_open {
        Some(eyes) if eyes.confidence >= min_confidence => Ok(eyes.value),
        eyes => Err(LivenessError::LowConfidence {
            confidence: eyes.map_or(0.0, |eyes| eyes.confidence),
            required: min_confidence,
        }),
    }
}

/// False unless exactly one face is found and it is centred.
pub async fn verify_face_is_in_centre(
    faces: &dyn FaceAnalyzer,
    image_key: &str,
    max_drift: f32,
) -> LivenessResult<bool> {
    let detected = faces
        .detect_faces(&ImageRef::stored(image_key), FaceAttributes::Default)
        .await?;
    match detected.as_slice() {
        [face] => Ok(face_is_centred(face, max_drift)),
        _ => Ok(false),
    }
}

/// Pose problems on the first face of a selfie, if any.
pub async fn verify_selfie_pose(
    faces: &dyn FaceAnalyzer,
    image_key: &str,
) -> LivenessResult<Option<String>> {
    let detected = faces
        .detect_faces(&ImageRef::stored(image_key), FaceAttributes::All)
        .await?;
    let Some(face) = detected.first() else {
        return Ok(Some("No faces found in selfie image.".to_string()));
    };
    Ok(selfie_pose_problems(&face.pose))
}

#[cfg(test)]
mod tests {
    use ekyc_types::BoundingBox;
    use ekyc_vision::ScriptedFaceAnalyzer;
    use image::{DynamicImage, RgbImage};

    use super::*;

    #[test]
    fn level_pose_has_no_problems() {
        assert_eq!(selfie_pose_problems(&Pose::new(20.0, -20.0, 19.9)), None);
    }

    #[test]
    fn pose_problems_are_combined() {
        let message = selfie_pose_problems(&Pose::new(-25.0, 21.0, 30.0)).unwrap();
        assert_eq!(
            message,
            "Your chin is too high, please lower it. \
             Please make sure your face is facing the camera straight on. \
             Please do not tilt your head left or right."
        );
        let message = selfie_pose_problems(&Pose::new(0.0, -21.0, 0.0)).unwrap();
        assert_eq!(message, CHIN_TOO_LOW);
    }

    #[test]
    fn centring_allows_the_configured_drift() {
        let centred = FaceDetail::new(BoundingBox::new(0.3, 0.32, 0.4, 0.4), 99.0);
        assert!(face_is_centred(&centred, 0.05));
        let off_centre = FaceDetail::new(BoundingBox::new(0.3, 0.4, 0.4, 0.4), 99.0);
        assert!(!face_is_centred(&off_centre, 0.05));
    }

    #[test]
    fn unsure_eye_state_is_not_closed() {
        let face = FaceDetail::new(BoundingBox::new(0.2, 0.2, 0.4, 0.4), 99.0);
        assert!(!eyes_closed(&face, 70.0));
        assert!(!eyes_closed(&face.clone().with_eyes_open(false, 40.0), 70.0));
        assert!(!eyes_closed(&face.clone().with_eyes_open(true, 99.0), 70.0));
        assert!(eyes_closed(&face.with_eyes_open(false, 99.0), 70.0));
    }

    #[test]
    fn small_images_are_rejected() {
        let settings = EngineSettings::default();
        let small = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        let bytes = imaging::encode_png(&small).unwrap();
        let err = verify_image_size(&bytes, &settings).unwrap_err();
        assert!(matches!(err, LivenessError::ImageTooSmall { height: 200, .. }));

        let large = DynamicImage::ImageRgb8(RgbImage::new(250, 250));
        let bytes = imaging::encode_png(&large).unwrap();
        assert!(verify_image_size(&bytes, &settings).is_ok());
    }

    #[tokio::test]
    async fn eye_state_needs_a_confident_face() {
        let face = FaceDetail::new(BoundingBox::new(0.2, 0.2, 0.4, 0.4), 99.0);
        let faces = ScriptedFaceAnalyzer::new()
            .with_faces("open.jpg", vec![face.clone().with_eyes_open(true, 95.0)])
            .with_faces("unsure.jpg", vec![face.with_eyes_open(true, 50.0)]);

        assert!(verify_eyes_open(&faces, "open.jpg", 70.0).await.unwrap());
        let err = verify_eyes_open(&faces, "unsure.jpg", 70.0).await.unwrap_err();
        assert!(matches!(err, LivenessError::LowConfidence { .. }));
        let err = verify_eyes_open(&faces, "empty.jpg", 70.0).await.unwrap_err();
        assert!(matches!(err, LivenessError::NoFace { .. }));
    }

    #[tokio::test]
    async fn comparison_keeps_the_best_match() {
        let faces = ScriptedFaceAnalyzer::new()
            .with_similarity("selfie.jpg", "doc.jpg", 88.0)
            .with_similarity("selfie.jpg", "doc.jpg", 93.5)
            .with_similarity("selfie.jpg", "other.jpg", 40.0);

        let best = compare_faces(&faces, "selfie.jpg", "doc.jpg", 70.0).await.unwrap();
        assert_eq!(best, Some(93.5));
        let none = compare_faces(&faces, "selfie.jpg", "other.jpg", 70.0).await.unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn selfie_without_face_reports_it() {
        let faces = ScriptedFaceAnalyzer::new();
        let problem = verify_selfie_pose(&faces, "selfie.jpg").await.unwrap();
        assert_eq!(problem.as_deref(), Some("No faces found in selfie image."));
    }

    #[tokio::test]
    async fn two_faces_are_never_centred() {
        let face = FaceDetail::new(BoundingBox::new(0.3, 0.3, 0.4, 0.4), 99.0);
        let faces = ScriptedFaceAnalyzer::new()
            .with_faces("one.jpg", vec![face.clone()])
            .with_faces("two.jpg", vec![face.clone(), face]);
        assert!(verify_face_is_in_centre(&faces, "one.jpg", 0.05).await.unwrap());
        assert!(!verify_face_is_in_centre(&faces, "two.jpg", 0.05).await.unwrap());
    }
}
