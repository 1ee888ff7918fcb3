//! Straightening of photographed cards before reading them.
//!
//! Text is detected once. When the anchor line is tilted, the image is
//! rotated level, staged under `{prefix}/rotated/` and detected once more.
//! The stages run in order and the rotated image is never reassessed.

use ekyc_types::geometry::angle_between_points;
use ekyc_types::{Point, TextLine};
use ekyc_vision::{ImageRef, imaging};
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::error::DocumentResult;
use crate::extract::ExtractionContext;
use crate::lines::TextLineIndex;

/// Width images are scaled to before rotating.
pub const ROTATION_WIDTH: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    Level,
    /// Clockwise rotation, in degrees, that levels the anchor.
    Skewed { correction_degrees: f32 },
}

/// Measures the slope of the anchor's top edge in pixel space.
pub fn assess(top_edge: (Point, Point), image_width: u32, image_height: u32) -> Alignment {
    let (left, right) = top_edge;
    if left.y == right.y {
        return Alignment::Level;
    }
    let (width, height) = (image_width as f32, image_height as f32);
    let angle = angle_between_points(
        Point::new(left.x * width, left.y * height),
        Point::new(right.x * width, right.y * height),
    );
    if angle == 0.0 {
        Alignment::Level
    } else {
        Alignment::Skewed {
            correction_degrees: -angle,
        }
    }
}

#[derive(Debug)]
pub struct AlignedLines {
    pub index: TextLineIndex,
    /// Rotation applied before the final detection, if any.
    pub correction_degrees: Option<f32>,
}

enum Stage {
    Detect,
    Assess(TextLineIndex),
    Rotate { image: DynamicImage, degrees: f32 },
    Redetect { staged_key: String, degrees: f32 },
}

/// Detects lines on `image_key`, re-detecting on a rotated copy when the
/// line chosen by `locate_anchor` is tilted.
pub async fn detect_aligned<F>(
    ctx: ExtractionContext<'_>,
    image_key: &str,
    locate_anchor: F,
) -> DocumentResult<AlignedLines>
where
    F: Fn(&TextLineIndex) -> Option<&TextLine>,
{
    let text = &ctx.capabilities.text;
    let min_confidence = ctx.settings.min_confidence;
    let mut stage = Stage::Detect;
    loop {
        stage = match stage {
            Stage::Detect => {
                let lines = text.detect_lines(&ImageRef::stored(image_key)).await?;
                Stage::Assess(TextLineIndex::new(lines, min_confidence))
            }
            Stage::Assess(index) => {
                let Some(edge) = locate_anchor(&index).map(TextLine::top_edge) else {
                    debug!("alignment anchor not found; reading the image as is");
                    return Ok(AlignedLines {
                        index,
                        correction_degrees: None,
                    });
                };
                if edge.0.y == edge.1.y {
                    return Ok(AlignedLines {
                        index,
                        correction_degrees: None,
                    });
                }
                let bytes = ctx.capabilities.store.get_image(image_key).await?;
                let image = imaging::resize_to_width(&imaging::decode(&bytes)?, ROTATION_WIDTH);
                let (width, height) = image.dimensions();
                match assess(edge, width, height) {
                    Alignment::Level => {
                        return Ok(AlignedLines {
                            index,
                            correction_degrees: None,
                        });
                    }
                    Alignment::Skewed { correction_degrees } => Stage::Rotate {
                        image,
                        degrees: correction_degrees,
                    },
                }
            }
            Stage::Rotate { image, degrees } => {
                let bytes = imaging::encode_png(&imaging::rotate(&image, degrees))?;
                let staged_key =
                    imaging::staging_key(&ctx.settings.staging_prefix, "rotated", &bytes, "png");
                ctx.capabilities.store.put_image(&staged_key, bytes).await?;
                debug!(degrees, key = %staged_key, "staged rotated image");
                Stage::Redetect {
                    staged_key,
                    degrees,
                }
            }
            Stage::Redetect {
                staged_key,
                degrees,
            } => {
                let detected = text.detect_lines(&ImageRef::stored(staged_key.as_str())).await;
                if let Err(err) = ctx.capabilities.store.delete(&staged_key).await {
                    warn!(key = %staged_key, error = %err, "failed to remove rotated image");
                }
                return Ok(AlignedLines {
                    index: TextLineIndex::new(detected?, min_confidence),
                    correction_degrees: Some(degrees),
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_edges_need_no_rotation() {
        let edge = (Point::new(0.1, 0.4), Point::new(0.5, 0.4));
        assert_eq!(assess(edge, 1000, 600), Alignment::Level);
    }

    #[test]
    fn correction_is_measured_in_pixels() {
        // 0.1 of a 1000 px wide image across, 0.1 of a 500 px tall one down.
        let edge = (Point::new(0.1, 0.4), Point::new(0.2, 0.5));
        let Alignment::Skewed { correction_degrees } = assess(edge, 1000, 500) else {
            panic!("expected a skewed anchor");
        };
        let expected = -(50.0f32 / 100.0).atan().to_degrees();
        assert!((correction_degrees - expected).abs() < 1e-3);
    }

    #[test]
    fn counter_clockwise_tilt_is_corrected_clockwise() {
        let edge = (Point::new(0.1, 0.5), Point::new(0.6, 0.45));
        let Alignment::Skewed { correction_degrees } = assess(edge, 1000, 1000) else {
            panic!("expected a skewed anchor");
        };
        assert!(correction_degrees > 0.0);
    }
}
