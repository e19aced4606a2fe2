use shared::domain::{ClipRegion, Transform};
use tracing::warn;

/// Width and height assumed for a drawing that declares none.
pub const FALLBACK_DRAWING_SIZE: f64 = 50.0;

/// Maps an embedded drawing's own coordinates into the merged space.
///
/// `placement` is the embedding item's transform already composed with its
/// parent. It is scaled by `target_width / clip_width` and then shifted by
/// the embed offsets expressed at the new scale.
pub fn embedded_content_transform(
    placement: Transform,
    target_width: f64,
    clip: ClipRegion,
    x_offset: f64,
    y_offset: f64,
) -> Transform {
    let ratio = if clip.width.is_finite() && clip.width > 0.0 {
        target_width / clip.width
    } else {
        warn!(clip_width = clip.width, "clip region has no usable width; keeping scale");
        1.0
    };
    let scale = placement.scale * ratio;
    Transform {
        x: placement.x - x_offset * scale,
        y: placement.y - y_offset * scale,
        scale,
    }
}

/// Clip region for an embedded drawing's items. Embeds inherit the
/// enclosing clip unchanged, so every item ends up clipped to the primary
/// drawing's bounds.
pub fn embedded_clip(parent_clip: ClipRegion) -> ClipRegion {
    parent_clip
}

/// Clip covering the primary drawing.
pub fn primary_clip(width: f64, height: f64) -> ClipRegion {
    ClipRegion::new(0.0, 0.0, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_placement_scales_and_shifts_by_offsets() {
        let clip = primary_clip(100.0, 100.0);
        let transform = embedded_content_transform(Transform::IDENTITY, 50.0, clip, 10.0, 10.0);
        assert_eq!(transform, Transform::new(-5.0, -5.0, 0.5));
    }

    #[test]
    fn primary_content_transform_is_identity() {
        let clip = primary_clip(120.0, 80.0);
        let transform = embedded_content_transform(Transform::IDENTITY, 120.0, clip, 0.0, 0.0);
        assert_eq!(transform, Transform::IDENTITY);
    }

    #[test]
    fn composed_placement_keeps_parent_position() {
        let parent = Transform::new(20.0, 30.0, 2.0);
        let placement = Transform::new(5.0, 5.0, 1.0).compose(parent);
        assert_eq!(placement, Transform::new(30.0, 40.0, 2.0));

        let clip = primary_clip(200.0, 200.0);
        let transform = embedded_content_transform(placement, 100.0, clip, 0.0, 0.0);
        assert_eq!(transform, Transform::new(30.0, 40.0, 1.0));
    }

    #[test]
    fn degenerate_clip_keeps_placement_scale() {
        let clip = primary_clip(0.0, 0.0);
        let transform = embedded_content_transform(Transform::new(1.0, 1.0, 3.0), 40.0, clip, 0.0, 0.0);
        assert_eq!(transform.scale, 3.0);
        assert_eq!(embedded_clip(clip), clip);
    }
}
