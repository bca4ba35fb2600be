//! Mapping between device space and window pixels
//!
//! The visible window is a rectangle in device units. It starts as the full
//! device extent and shrinks under view-only zoom. Pixel y runs downward,
//! device y upward.

use crate::protocol::{DEVICE_HEIGHT, DEVICE_WIDTH};
use crate::types::{DevicePoint, PixelPoint, PixelRect};
use serde::{Deserialize, Serialize};

/// Smallest window span kept along an axis, in device units
const MIN_SPAN: f64 = 1e-9;

/// Visible rectangle in device units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceWindow {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl DeviceWindow {
    pub fn full() -> Self {
        Self {
            x_min: 0.0,
            x_max: DEVICE_WIDTH,
            y_min: 0.0,
            y_max: DEVICE_HEIGHT,
        }
    }

    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        let (x_min, x_max) = (x_min.min(x_max), x_min.max(x_max));
        let (y_min, y_max) = (y_min.min(y_max), y_min.max(y_max));
        Self {
            x_min,
            x_max: if x_max - x_min < MIN_SPAN { x_min + 1.0 } else { x_max },
            y_min,
            y_max: if y_max - y_min < MIN_SPAN { y_min + 1.0 } else { y_max },
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }
}

impl Default for DeviceWindow {
    fn default() -> Self {
        Self::full()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub window: DeviceWindow,
    pub width: u32,
    pub height: u32,
    /// Pen position in device space, carried between records
    pub cursor: DevicePoint,
}

impl ViewportState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window: DeviceWindow::full(),
            width: width.max(1),
            height: height.max(1),
            cursor: DevicePoint::default(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn set_window(&mut self, window: DeviceWindow) {
        self.window = window;
    }

    pub fn reset_window(&mut self) {
        self.window = DeviceWindow::full();
    }

    /// The same viewport showing the full device window
    pub fn unzoomed(&self) -> Self {
        Self {
            window: DeviceWindow::full(),
            ..self.clone()
        }
    }

    fn scale(&self) -> (f64, f64) {
        (
            self.width as f64 / (self.window.x_max - self.window.x_min),
            self.height as f64 / (self.window.y_max - self.window.y_min),
        )
    }

    pub fn device_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let (sx, sy) = self.scale();
        ((x - self.window.x_min) * sx, (self.window.y_max - y) * sy)
    }

    pub fn pixel_to_device(&self, px: f64, py: f64) -> (f64, f64) {
        let (sx, sy) = self.scale();
        (px / sx + self.window.x_min, self.window.y_max - py / sy)
    }

    pub fn to_pixel(&self, point: DevicePoint) -> PixelPoint {
        let (px, py) = self.device_to_pixel(point.x as f64, point.y as f64);
        PixelPoint::new(px as i32, py as i32)
    }

    /// Device window covered by a pixel rectangle
    pub fn window_for(&self, rect: PixelRect) -> DeviceWindow {
        let rect = rect.normalized();
        let (x0, y_top) = self.pixel_to_device(rect.x as f64, rect.y as f64);
        let (x1, y_bottom) =
            self.pixel_to_device((rect.x + rect.width) as f64, (rect.y + rect.height) as f64);
        DeviceWindow::new(x0, x1, y_bottom, y_top)
    }
}
