//! Headless renderer for the terminal viewer

use outboard_core::types::{PaletteDefinition, PixelPoint, PixelRect, Rgb16};
use outboard_core::Renderer;
use serde::Serialize;

/// What a replay drew, in counts and extents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub width: u32,
    pub height: u32,
    pub segments: usize,
    pub points: usize,
    pub boxes: usize,
    pub colors: usize,
    /// Smallest pixel rectangle covering everything drawn
    pub extent: Option<PixelRect>,
}

#[derive(Debug, Default)]
pub struct SummaryRenderer {
    summary: RenderSummary,
    lo: Option<PixelPoint>,
    hi: Option<PixelPoint>,
}

impl SummaryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn cover(&mut self, p: PixelPoint) {
        self.lo = Some(match self.lo {
            Some(lo) => PixelPoint::new(lo.x.min(p.x), lo.y.min(p.y)),
            None => p,
        });
        self.hi = Some(match self.hi {
            Some(hi) => PixelPoint::new(hi.x.max(p.x), hi.y.max(p.y)),
            None => p,
        });
    }
}

impl Renderer for SummaryRenderer {
    type Raster = RenderSummary;

    fn begin_frame(&mut self, width: u32, height: u32) {
        *self = Self::default();
        self.summary.width = width;
        self.summary.height = height;
    }

    fn move_to(&mut self, p: PixelPoint) {
        self.cover(p);
    }

    fn line_to(&mut self, p: PixelPoint) {
        self.summary.segments += 1;
        self.cover(p);
    }

    fn draw_point(&mut self, p: PixelPoint) {
        self.summary.points += 1;
        self.cover(p);
    }

    fn set_line_type(&mut self, _line_type: i16) {}

    fn set_line_width(&mut self, _width: i16) {}

    fn set_line_color(&mut self, _color: Rgb16) {
        self.summary.colors += 1;
    }

    fn fill_rect(&mut self, _shade: i16, rect: PixelRect) {
        self.summary.boxes += 1;
        self.cover(PixelPoint::new(rect.x, rect.y));
        self.cover(PixelPoint::new(rect.x + rect.width, rect.y + rect.height));
    }

    fn set_palette(&mut self, _palette: &PaletteDefinition) {}

    fn end_frame(&mut self) -> Self::Raster {
        let mut summary = std::mem::take(&mut self.summary);
        if let (Some(lo), Some(hi)) = (self.lo.take(), self.hi.take()) {
            summary.extent = Some(PixelRect::from_corners(lo, hi));
        }
        summary
    }
}
