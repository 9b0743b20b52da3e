//! Page-space geometry and text style primitives.

/// Maximum font-size delta for two styles to merge into one block.
pub const FONT_SIZE_MERGE_TOLERANCE: f32 = 0.8;

/// Maximum per-channel color delta for two styles to merge.
pub const COLOR_CHANNEL_TOLERANCE: f32 = 0.1;

/// Axis-aligned bounding box in page space.
///
/// Raw PDF geometry is bottom-up; the extractor normalizes every box to a
/// top-down `y` (distance from the page top to the box top) so reconstruction
/// can invert it deterministically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Far vertical edge (`y + height`); the box bottom in top-down space.
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Area shared with `other`; zero when disjoint.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x_overlap = f32::max(
            0.0,
            f32::min(self.right(), other.right()) - f32::max(self.x, other.x),
        );
        let y_overlap = f32::max(
            0.0,
            f32::min(self.bottom(), other.bottom()) - f32::max(self.y, other.y),
        );
        x_overlap * y_overlap
    }

    /// Shared area as a fraction of the smaller box's area.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / smaller
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// Font styling attached to a fragment or block.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleInfo {
    pub font_name: String,
    pub font_size: f32,
    /// RGB, each channel in `0..=1`.
    pub color: [f32; 3],
    pub bold: bool,
    pub italic: bool,
}

impl StyleInfo {
    /// Whether two styles are close enough to merge into one block: same
    /// font name (case-insensitive), size within [`FONT_SIZE_MERGE_TOLERANCE`],
    /// each color channel within [`COLOR_CHANNEL_TOLERANCE`].
    pub fn is_compatible(&self, other: &StyleInfo) -> bool {
        self.font_name.eq_ignore_ascii_case(&other.font_name)
            && (self.font_size - other.font_size).abs() <= FONT_SIZE_MERGE_TOLERANCE
            && self
                .color
                .iter()
                .zip(other.color.iter())
                .all(|(a, b)| (a - b).abs() <= COLOR_CHANNEL_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(name: &str, size: f32, color: [f32; 3]) -> StyleInfo {
        StyleInfo {
            font_name: name.to_string(),
            font_size: size,
            color,
            bold: false,
            italic: false,
        }
    }

    #[test]
    fn test_overlap_ratio_identical_boxes() {
        let a = BoundingBox::new(10.0, 20.0, 100.0, 50.0);
        assert!((a.overlap_ratio(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_ratio_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.overlap_ratio(&b), 0.0);
    }

    #[test]
    fn test_union_contains_both() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 20.0, 3.0);
        let u = a.union(&b);
        assert_eq!(u.x, 0.0);
        assert_eq!(u.y, 0.0);
        assert_eq!(u.right(), 25.0);
        assert_eq!(u.bottom(), 10.0);
    }

    #[test]
    fn test_style_compatibility_font_name_case_insensitive() {
        let a = style("Helvetica", 12.0, [0.0, 0.0, 0.0]);
        let b = style("HELVETICA", 12.5, [0.05, 0.0, 0.0]);
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn test_style_compatibility_size_delta() {
        let a = style("Helvetica", 12.0, [0.0, 0.0, 0.0]);
        let b = style("Helvetica", 13.0, [0.0, 0.0, 0.0]);
        assert!(!a.is_compatible(&b));
    }

    #[test]
    fn test_style_compatibility_color_delta() {
        let a = style("Helvetica", 12.0, [0.0, 0.0, 0.0]);
        let b = style("Helvetica", 12.0, [0.0, 0.0, 0.2]);
        assert!(!a.is_compatible(&b));
    }
}
