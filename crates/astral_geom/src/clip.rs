//! Convex clip-window geometry in image (pixel) coordinates.

/// A convex polygon in image-pixel coordinates together with the
/// logical-to-image scale/translate that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipGeometry {
    points: Vec<(f32, f32)>,
    scale: (f32, f32),
    translate: (f32, f32),
}

impl ClipGeometry {
    pub fn new(points: Vec<(f32, f32)>, scale: (f32, f32), translate: (f32, f32)) -> Self {
        Self {
            points,
            scale,
            translate,
        }
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn scale(&self) -> (f32, f32) {
        self.scale
    }

    pub fn translate(&self) -> (f32, f32) {
        self.translate
    }

    /// Axis-aligned bounding box in image-pixel coordinates.
    pub fn bounding_box(&self) -> Option<(f32, f32, f32, f32)> {
        let mut iter = self.points.iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for &(x, y) in iter {
            min.0 = min.0.min(x);
            min.1 = min.1.min(y);
            max.0 = max.0.max(x);
            max.1 = max.1.max(y);
        }
        Some((min.0, min.1, max.0, max.1))
    }
}

/// A `ClipGeometry` plus the image it is rasterised into, split into
/// tile-aligned sub-rectangles so the mask drawer can process it one tile
/// at a time.
#[derive(Debug, Clone)]
pub struct ClipGeometryGroup {
    geometry: ClipGeometry,
    image_size: (u32, u32),
    tile_size: u32,
}

impl ClipGeometryGroup {
    pub fn new(geometry: ClipGeometry, image_size: (u32, u32), tile_size: u32) -> Self {
        Self {
            geometry,
            image_size,
            tile_size,
        }
    }

    pub fn geometry(&self) -> &ClipGeometry {
        &self.geometry
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    /// Tile-aligned sub-rectangles, in image-pixel coordinates, covering the
    /// full image extent at `tile_size` granularity.
    pub fn sub_rects(&self) -> Vec<(u32, u32, u32, u32)> {
        let (w, h) = self.image_size;
        let ts = self.tile_size;
        let mut rects = Vec::new();
        let mut y = 0;
        while y < h {
            let rect_h = ts.min(h - y);
            let mut x = 0;
            while x < w {
                let rect_w = ts.min(w - x);
                rects.push((x, y, rect_w, rect_h));
                x += ts;
            }
            y += ts;
        }
        rects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_of_empty_geometry_is_none() {
        let g = ClipGeometry::new(vec![], (1.0, 1.0), (0.0, 0.0));
        assert_eq!(g.bounding_box(), None);
    }

    #[test]
    fn bounding_box_covers_all_points() {
        let g = ClipGeometry::new(
            vec![(1.0, 2.0), (5.0, 0.0), (3.0, 7.0)],
            (1.0, 1.0),
            (0.0, 0.0),
        );
        assert_eq!(g.bounding_box(), Some((1.0, 0.0, 5.0, 7.0)));
    }

    #[test]
    fn sub_rects_tile_the_full_extent_without_gaps() {
        let geometry = ClipGeometry::new(vec![(0.0, 0.0)], (1.0, 1.0), (0.0, 0.0));
        let group = ClipGeometryGroup::new(geometry, (70, 40), 32);
        let rects = group.sub_rects();
        assert_eq!(rects.len(), 3 * 2);
        let covered: u64 = rects.iter().map(|&(_, _, w, h)| (w as u64) * (h as u64)).sum();
        assert_eq!(covered, 70 * 40);
    }

    #[test]
    fn sub_rects_last_tile_in_row_is_clipped() {
        let geometry = ClipGeometry::new(vec![(0.0, 0.0)], (1.0, 1.0), (0.0, 0.0));
        let group = ClipGeometryGroup::new(geometry, (40, 32), 32);
        let rects = group.sub_rects();
        assert!(rects.contains(&(32, 0, 8, 32)));
    }
}
