//! Common types for the segment module

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates of one raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest region containing every point (inclusive pixel bounds)
    pub fn bounding<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    /// Exclusive right edge
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Smallest region containing both
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

/// One segmented text line
#[derive(Debug, Clone)]
pub struct LineArtifact {
    /// 1-based position in top-to-bottom order
    pub ordinal: usize,
    /// Where the crop came from on the source raster
    pub region: Region,
    /// Cropped and equalized pixels
    pub image: RgbImage,
    /// Advisory machine text, never authoritative
    pub text: Option<String>,
}

impl LineArtifact {
    /// File stem used for this line's artifacts (`line_001`, ...)
    pub fn file_stem(&self) -> String {
        format!("line_{:03}", self.ordinal)
    }
}

/// Everything segmentation produced for one page
#[derive(Debug, Clone, Default)]
pub struct SegmentOutput {
    /// Final merged regions, top to bottom
    pub regions: Vec<Region>,
    /// One artifact per region, same order
    pub lines: Vec<LineArtifact>,
    /// Region outlines drawn over the source, when requested
    pub overlay: Option<RgbImage>,
    /// Tiled line thumbnails, when requested and at least one line exists
    pub contact_sheet: Option<RgbImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_inclusive() {
        let r = Region::bounding([(3, 4), (10, 4), (5, 9)]).unwrap();
        assert_eq!(r, Region::new(3, 4, 8, 6));
        assert!(Region::bounding(std::iter::empty()).is_none());
    }

    #[test]
    fn test_union() {
        let a = Region::new(0, 0, 100, 20);
        let b = Region::new(10, 11, 100, 20);
        assert_eq!(a.union(&b), Region::new(0, 0, 110, 31));
    }

    #[test]
    fn test_file_stem() {
        let line = LineArtifact {
            ordinal: 7,
            region: Region::new(0, 0, 1, 1),
            image: RgbImage::new(1, 1),
            text: None,
        };
        assert_eq!(line.file_stem(), "line_007");
    }
}
