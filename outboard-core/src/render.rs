//! Replay of a stored record onto a renderer
//!
//! The core does not rasterize. It walks a record's opcodes, converts
//! device coordinates to window pixels through the viewport, rebuilds the
//! coordinate-frame trail as `U` opcodes go by, and drives a [`Renderer`].

use crate::frames::CoordinateFrameTrail;
use crate::protocol::{commands, Command, ProtocolResult};
use crate::record::PlotRecord;
use crate::types::{DataBounds, PaletteDefinition, PixelPoint, PixelRect, Rgb16};
use crate::viewport::ViewportState;

/// Drawing surface driven by [`replay`]
pub trait Renderer {
    type Raster;

    fn begin_frame(&mut self, width: u32, height: u32);
    fn move_to(&mut self, p: PixelPoint);
    fn line_to(&mut self, p: PixelPoint);
    fn draw_point(&mut self, p: PixelPoint);
    fn set_line_type(&mut self, line_type: i16);
    fn set_line_width(&mut self, width: i16);
    fn set_line_color(&mut self, color: Rgb16);
    fn fill_rect(&mut self, shade: i16, rect: PixelRect);
    fn set_palette(&mut self, palette: &PaletteDefinition);
    fn end_frame(&mut self) -> Self::Raster;
}

/// Replay `record` at the viewport's size and window.
///
/// The trail is rebuilt from scratch. The viewport cursor follows pen
/// movement and persists after the call.
pub fn replay<R: Renderer>(
    record: &PlotRecord,
    viewport: &mut ViewportState,
    trail: &mut CoordinateFrameTrail,
    renderer: &mut R,
) -> ProtocolResult<R::Raster> {
    trail.begin_build();
    renderer.begin_frame(viewport.width, viewport.height);
    let mut pen_placed = false;

    for command in commands(record.commands(), record.byte_order()) {
        match command? {
            Command::Begin | Command::End | Command::Quit => {}
            Command::MoveTo(p) => {
                viewport.cursor = p;
                renderer.move_to(viewport.to_pixel(p));
                pen_placed = true;
            }
            Command::LineTo(p) => {
                if !pen_placed {
                    renderer.move_to(viewport.to_pixel(viewport.cursor));
                    pen_placed = true;
                }
                viewport.cursor = p;
                renderer.line_to(viewport.to_pixel(p));
            }
            Command::Point(p) => {
                viewport.cursor = p;
                renderer.draw_point(viewport.to_pixel(p));
            }
            Command::LineType(t) => renderer.set_line_type(t),
            Command::LineWidth(w) => renderer.set_line_width(w),
            Command::SetColor(c) => renderer.set_line_color(c),
            Command::DefinePalette(p) => renderer.set_palette(&p),
            Command::FilledBox {
                shade,
                x_low,
                x_high,
                y_high,
                y_low,
            } => {
                let low = viewport.device_to_pixel(x_low as f64, y_low as f64);
                let high = viewport.device_to_pixel(x_high as f64, y_high as f64);
                let rect = PixelRect::new(
                    low.0 as i32,
                    low.1 as i32,
                    (high.0 - low.0) as i32,
                    (high.1 - low.1) as i32,
                )
                .normalized();
                renderer.fill_rect(shade, rect);
            }
            Command::DefineFrame {
                x_min,
                y_min,
                x_max,
                y_max,
            } => {
                trail.push(DataBounds::new(x_min, x_max, y_min, y_max));
            }
        }
    }

    trail.finish_build();
    Ok(renderer.end_frame())
}

/// Call recorded by [`RecordingRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    MoveTo(PixelPoint),
    LineTo(PixelPoint),
    Point(PixelPoint),
    LineType(i16),
    LineWidth(i16),
    Color(Rgb16),
    Fill(i16, PixelRect),
    Palette(PaletteDefinition),
}

/// Renderer that keeps the call sequence as its raster.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    size: (u32, u32),
    calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Renderer for RecordingRenderer {
    type Raster = Vec<RenderCall>;

    fn begin_frame(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.calls.clear();
    }

    fn move_to(&mut self, p: PixelPoint) {
        self.calls.push(RenderCall::MoveTo(p));
    }

    fn line_to(&mut self, p: PixelPoint) {
        self.calls.push(RenderCall::LineTo(p));
    }

    fn draw_point(&mut self, p: PixelPoint) {
        self.calls.push(RenderCall::Point(p));
    }

    fn set_line_type(&mut self, line_type: i16) {
        self.calls.push(RenderCall::LineType(line_type));
    }

    fn set_line_width(&mut self, width: i16) {
        self.calls.push(RenderCall::LineWidth(width));
    }

    fn set_line_color(&mut self, color: Rgb16) {
        self.calls.push(RenderCall::Color(color));
    }

    fn fill_rect(&mut self, shade: i16, rect: PixelRect) {
        self.calls.push(RenderCall::Fill(shade, rect));
    }

    fn set_palette(&mut self, palette: &PaletteDefinition) {
        self.calls.push(RenderCall::Palette(*palette));
    }

    fn end_frame(&mut self) -> Self::Raster {
        std::mem::take(&mut self.calls)
    }
}
