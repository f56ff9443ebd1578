//! Screen-space rectangle selection over NDC-projected positions.
//!
//! The engine is single-shot: given a cloud's positions and a camera's
//! view-projection matrix, it returns the indices whose clip-space
//! coordinates land inside the rectangle. There is no persistent selection
//! state here; callers push results into whatever store keys them by cloud id.

/// A screen-space axis-aligned rectangle, in pixels, with `(x1, y1)` the
/// top-left corner and `(x2, y2)` the bottom-right corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    /// Left/top corner.
    pub x1: f32,
    /// See [`ScreenRect::x1`].
    pub y1: f32,
    /// Right/bottom corner.
    pub x2: f32,
    /// See [`ScreenRect::x2`].
    pub y2: f32,
}

impl ScreenRect {
    /// Tiny rectangles (both dimensions under 4px) are treated as clicks and
    /// never select anything.
    pub fn is_click(&self) -> bool {
        (self.x2 - self.x1).abs() < 4.0 && (self.y2 - self.y1).abs() < 4.0
    }
}

/// Selects every point index whose projected position lands inside `rect`.
///
/// `positions` is the flattened XYZ buffer of a [`crate::cloud::CanonicalCloud`].
/// `view_projection` is the camera's combined view-projection matrix.
/// `screen_width`/`screen_height` convert NDC `[-1, 1]` to the pixel space
/// `rect` is expressed in. Points with non-positive clip-space `w` are
/// skipped (they're behind the camera or otherwise degenerate).
pub fn select_in_rect(
    positions: &[f32],
    view_projection: glam::Mat4,
    screen_width: f32,
    screen_height: f32,
    rect: ScreenRect,
) -> Vec<usize> {
    if rect.is_click() {
        return Vec::new();
    }
    let (left, right) = (rect.x1.min(rect.x2), rect.x1.max(rect.x2));
    let (top, bottom) = (rect.y1.min(rect.y2), rect.y1.max(rect.y2));

    let mut selected = Vec::new();
    for (i, chunk) in positions.chunks_exact(3).enumerate() {
        let world = glam::Vec4::new(chunk[0], chunk[1], chunk[2], 1.0);
        let clip = view_projection * world;
        if clip.w <= 0.0 {
            continue;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        let sx = (ndc_x * 0.5 + 0.5) * screen_width;
        let sy = (1.0 - (ndc_y * 0.5 + 0.5)) * screen_height;
        if sx >= left && sx <= right && sy >= top && sy <= bottom {
            selected.push(i);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_sized_rect_selects_nothing() {
        let positions = [0.0, 0.0, 0.0];
        let vp = glam::Mat4::IDENTITY;
        let rect = ScreenRect {
            x1: 10.0,
            y1: 10.0,
            x2: 11.0,
            y2: 11.0,
        };
        assert!(select_in_rect(&positions, vp, 800.0, 600.0, rect).is_empty());
    }

    #[test]
    fn point_behind_camera_is_skipped() {
        // A perspective-like matrix where w tracks -z; put the point behind.
        let vp = glam::Mat4::from_cols(
            glam::Vec4::X,
            glam::Vec4::Y,
            glam::Vec4::new(0.0, 0.0, 1.0, -1.0),
            glam::Vec4::W,
        );
        let positions = [0.0, 0.0, 5.0]; // w = -5, behind camera
        let rect = ScreenRect {
            x1: 0.0,
            y1: 0.0,
            x2: 800.0,
            y2: 600.0,
        };
        assert!(select_in_rect(&positions, vp, 800.0, 600.0, rect).is_empty());
    }

    #[test]
    fn centered_point_is_selected_by_full_screen_rect() {
        let vp = glam::Mat4::IDENTITY;
        let positions = [0.0, 0.0, 0.0];
        let rect = ScreenRect {
            x1: 0.0,
            y1: 0.0,
            x2: 800.0,
            y2: 600.0,
        };
        assert_eq!(select_in_rect(&positions, vp, 800.0, 600.0, rect), vec![0]);
    }
}
