//! Cropping the holder's photograph out of a document image.

use ekyc_types::geometry::crop_region;
use ekyc_types::{EngineSettings, FaceDetail};
use ekyc_vision::{Capabilities, FaceAttributes, ImageRef, imaging};
use image::GenericImageView;
use tracing::debug;

use crate::error::DocumentResult;
use crate::registry::DocumentDefinition;

/// Face with the largest `width + height` among those detected confidently.
pub fn largest_face(faces: &[FaceDetail], min_confidence: f32) -> Option<&FaceDetail> {
    faces
        .iter()
        .filter(|face| face.confidence >= min_confidence)
        .max_by(|a, b| a.extent().total_cmp(&b.extent()))
}

/// JPEG crop of the largest face, or `None` when the document type has no
/// photograph or none was found.
pub async fn extract_largest_face(
    capabilities: &Capabilities,
    settings: &EngineSettings,
    definition: &DocumentDefinition,
    image_key: &str,
) -> DocumentResult<Option<Vec<u8>>> {
    if !definition.face_extraction_supported {
        debug!(document_type = %definition.document_type, "face extraction not supported");
        return Ok(None);
    }
    let faces = capabilities
        .faces
        .detect_faces(&ImageRef::stored(image_key), FaceAttributes::Default)
        .await?;
    let Some(face) = largest_face(&faces, settings.min_confidence) else {
        debug!(detected = faces.len(), "no face to extract");
        return Ok(None);
    };

    let bytes = capabilities.store.get_image(image_key).await?;
    let image = imaging::decode(&bytes)?;
    let (width, height) = image.dimensions();
    let Some(crop) = imaging::crop(&image, crop_region(&face.bounding_box, width, height)) else {
        return Ok(None);
    };
    Ok(Some(imaging::encode_jpeg(&crop)?))
}

/// Stores the crop under `{prefix}/faces/` and returns its key.
pub async fn stage_largest_face(
    capabilities: &Capabilities,
    settings: &EngineSettings,
    definition: &DocumentDefinition,
    image_key: &str,
) -> DocumentResult<Option<String>> {
    let Some(crop) = extract_largest_face(capabilities, settings, definition, image_key).await? else {
        return Ok(None);
    };
    let key = imaging::staging_key(&settings.staging_prefix, "faces", &crop, "jpg");
    capabilities.store.put_image(&key, crop).await?;
    Ok(Some(key))
}
