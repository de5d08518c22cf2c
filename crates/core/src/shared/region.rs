use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The visual feature a region (or a cascade) is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Face,
    Eyes,
    Nose,
    Mouth,
}

impl FeatureKind {
    /// Features searched for inside a detected face.
    pub const SUB_FEATURES: &[FeatureKind] =
        &[FeatureKind::Eyes, FeatureKind::Nose, FeatureKind::Mouth];

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::Face => "face",
            FeatureKind::Eyes => "eyes",
            FeatureKind::Nose => "nose",
            FeatureKind::Mouth => "mouth",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "face" => Ok(FeatureKind::Face),
            "eyes" | "eye" => Ok(FeatureKind::Eyes),
            "nose" => Ok(FeatureKind::Nose),
            "mouth" => Ok(FeatureKind::Mouth),
            other => Err(format!("unknown feature kind: {other}")),
        }
    }
}

/// An axis-aligned rectangle in frame coordinates, tagged with its feature.
///
/// Published regions always have positive size and lie inside the frame
/// (and, for sub-features, inside their face); use [`Region::within`] and
/// [`Region::clamp_to`] to establish that from raw detector output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub kind: FeatureKind,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32, kind: FeatureKind) -> Self {
        Self {
            x,
            y,
            width,
            height,
            kind,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn with_kind(self, kind: FeatureKind) -> Self {
        Self { kind, ..self }
    }

    /// Shifts the region by `(dx, dy)`, e.g. from crop to frame coordinates.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    /// Intersection with `bounds`; `None` when nothing of `self` remains.
    ///
    /// The kind of `self` is preserved.
    pub fn clamp_to(&self, bounds: &Region) -> Option<Region> {
        let x1 = self.x.max(bounds.x);
        let y1 = self.y.max(bounds.y);
        let x2 = self.right().min(bounds.right());
        let y2 = self.bottom().min(bounds.bottom());
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region::new(x1, y1, x2 - x1, y2 - y1, self.kind))
    }

    /// Intersection with a `width x height` frame anchored at the origin.
    pub fn within(&self, width: u32, height: u32) -> Option<Region> {
        let frame = Region::new(0, 0, width as i32, height as i32, self.kind);
        self.clamp_to(&frame)
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.area() as f64;
        let area_b = other.area() as f64;
        inter / (area_a + area_b - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn face(x: i32, y: i32, w: i32, h: i32) -> Region {
        Region::new(x, y, w, h, FeatureKind::Face)
    }

    // ── IoU ──────────────────────────────────────────────────────────

    #[test]
    fn test_iou_identical_regions() {
        let a = face(10, 10, 100, 100);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = face(0, 0, 100, 100);
        let b = face(50, 0, 100, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[rstest]
    #[case::no_overlap(face(0, 0, 50, 50), face(100, 100, 50, 50))]
    #[case::touching_edges(face(0, 0, 50, 50), face(50, 0, 50, 50))]
    #[case::zero_width(face(0, 0, 0, 100), face(0, 0, 50, 50))]
    fn test_iou_disjoint(#[case] a: Region, #[case] b: Region) {
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    // ── Containment and clamping ─────────────────────────────────────

    #[rstest]
    #[case::inside(face(10, 10, 20, 20), true)]
    #[case::identical(face(0, 0, 100, 100), true)]
    #[case::overhangs_right(face(90, 10, 20, 20), false)]
    #[case::overhangs_top(face(10, -5, 20, 20), false)]
    fn test_contains(#[case] inner: Region, #[case] expected: bool) {
        assert_eq!(face(0, 0, 100, 100).contains(&inner), expected);
    }

    #[test]
    fn test_clamp_to_trims_overhang_and_keeps_kind() {
        let bounds = face(0, 0, 100, 100);
        let eye = Region::new(80, -10, 40, 30, FeatureKind::Eyes);
        let clamped = eye.clamp_to(&bounds).unwrap();
        assert_eq!(clamped, Region::new(80, 0, 20, 20, FeatureKind::Eyes));
        assert!(bounds.contains(&clamped));
    }

    #[test]
    fn test_clamp_to_disjoint_is_none() {
        let bounds = face(0, 0, 100, 100);
        assert!(face(150, 150, 10, 10).clamp_to(&bounds).is_none());
    }

    #[test]
    fn test_within_frame() {
        let r = face(-20, 10, 50, 500).within(640, 480).unwrap();
        assert_eq!(r, face(0, 10, 30, 470));
    }

    #[test]
    fn test_offset_moves_origin_only() {
        let r = Region::new(1, 2, 3, 4, FeatureKind::Nose).offset(10, 20);
        assert_eq!(r, Region::new(11, 22, 3, 4, FeatureKind::Nose));
    }

    #[test]
    fn test_area_of_degenerate_region_is_zero() {
        assert_eq!(face(0, 0, -5, 10).area(), 0);
        assert!(face(0, 0, 0, 10).is_empty());
    }

    // ── FeatureKind ──────────────────────────────────────────────────

    #[rstest]
    #[case("face", FeatureKind::Face)]
    #[case("Eyes", FeatureKind::Eyes)]
    #[case("eye", FeatureKind::Eyes)]
    #[case("NOSE", FeatureKind::Nose)]
    #[case("mouth", FeatureKind::Mouth)]
    fn test_feature_kind_parse(#[case] input: &str, #[case] expected: FeatureKind) {
        assert_eq!(input.parse::<FeatureKind>().unwrap(), expected);
    }

    #[test]
    fn test_feature_kind_parse_unknown() {
        assert!("ear".parse::<FeatureKind>().is_err());
    }

    #[test]
    fn test_sub_features_exclude_face() {
        assert!(!FeatureKind::SUB_FEATURES.contains(&FeatureKind::Face));
        assert_eq!(FeatureKind::SUB_FEATURES.len(), 3);
    }
}
