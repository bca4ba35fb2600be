//! Coordinate frames defined by the rendered record
//!
//! Every `U` opcode declares that the full device extent now maps onto a
//! data-space rectangle. The trail collects these in order during a
//! render; the active frame converts pointer positions back to data
//! coordinates.

use crate::protocol::{DEVICE_HEIGHT, DEVICE_WIDTH};
use crate::types::{DataBounds, DataPoint, FrameOrdinal};
use crate::viewport::ViewportState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame {requested} requested but the record defines {available} frame(s)")]
    UnknownFrame {
        requested: FrameOrdinal,
        available: usize,
    },

    #[error("Frame ordinals start at 1")]
    ZeroOrdinal,
}

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFrame {
    pub ordinal: FrameOrdinal,
    pub bounds: DataBounds,
}

impl CoordinateFrame {
    /// Device coordinates to data coordinates
    pub fn to_data(&self, device_x: f64, device_y: f64) -> DataPoint {
        let b = &self.bounds;
        DataPoint::new(
            b.x_min + device_x / DEVICE_WIDTH * (b.x_max - b.x_min),
            b.y_min + device_y / DEVICE_HEIGHT * (b.y_max - b.y_min),
        )
    }

    /// Data coordinates to device coordinates
    pub fn to_device(&self, point: DataPoint) -> (f64, f64) {
        let b = &self.bounds;
        (
            (point.x - b.x_min) / (b.x_max - b.x_min) * DEVICE_WIDTH,
            (point.y - b.y_min) / (b.y_max - b.y_min) * DEVICE_HEIGHT,
        )
    }
}

/// Outcome of a frame selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSelection {
    /// The frame is active now
    Applied(FrameOrdinal),
    /// Remembered until the next render builds the trail
    Deferred(FrameOrdinal),
}

#[derive(Debug, Clone, Default)]
pub struct CoordinateFrameTrail {
    frames: Vec<CoordinateFrame>,
    active: Option<usize>,
    requested: Option<FrameOrdinal>,
    built: bool,
}

impl CoordinateFrameTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget frames, keeping any pending selection.
    ///
    /// Called when a different record becomes current.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.active = None;
        self.built = false;
    }

    pub fn begin_build(&mut self) {
        self.clear();
    }

    /// Record a frame; the most recent one becomes active.
    pub fn push(&mut self, bounds: DataBounds) -> FrameOrdinal {
        let ordinal = self.frames.len() as FrameOrdinal + 1;
        self.frames.push(CoordinateFrame { ordinal, bounds });
        self.active = Some(self.frames.len() - 1);
        ordinal
    }

    /// Close the build and apply any pending selection.
    pub fn finish_build(&mut self) {
        self.built = true;
        if let Some(requested) = self.requested {
            if self.frames.is_empty() {
                return;
            }
            let index = (requested as usize).min(self.frames.len()) - 1;
            if index + 1 != requested as usize {
                log::warn!(
                    "record defines {} frame(s), frame {} unavailable; using frame {}",
                    self.frames.len(),
                    requested,
                    index + 1
                );
            }
            self.active = Some(index);
        }
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Make frame `ordinal` active.
    ///
    /// The choice persists across rebuilds until cleared. Before the first
    /// build it is deferred.
    pub fn select(&mut self, ordinal: FrameOrdinal) -> FrameResult<FrameSelection> {
        if ordinal == 0 {
            return Err(FrameError::ZeroOrdinal);
        }
        if !self.built {
            self.requested = Some(ordinal);
            return Ok(FrameSelection::Deferred(ordinal));
        }
        if ordinal as usize > self.frames.len() {
            return Err(FrameError::UnknownFrame {
                requested: ordinal,
                available: self.frames.len(),
            });
        }
        self.requested = Some(ordinal);
        self.active = Some(ordinal as usize - 1);
        Ok(FrameSelection::Applied(ordinal))
    }

    /// Return to "last frame wins".
    pub fn clear_selection(&mut self) {
        self.requested = None;
        if !self.frames.is_empty() {
            self.active = Some(self.frames.len() - 1);
        }
    }

    pub fn requested(&self) -> Option<FrameOrdinal> {
        self.requested
    }

    pub fn active(&self) -> Option<&CoordinateFrame> {
        self.active.and_then(|i| self.frames.get(i))
    }

    pub fn frames(&self) -> &[CoordinateFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pixel position to data coordinates through the active frame.
    ///
    /// With no frame the result is in device units.
    pub fn reverse_map(&self, viewport: &ViewportState, px: f64, py: f64) -> DataPoint {
        let (dx, dy) = viewport.pixel_to_device(px, py);
        match self.active() {
            Some(frame) => frame.to_data(dx, dy),
            None => DataPoint::new(dx, dy),
        }
    }

    /// Data coordinates to pixel position through the active frame.
    pub fn forward_map(&self, viewport: &ViewportState, point: DataPoint) -> (f64, f64) {
        let (dx, dy) = match self.active() {
            Some(frame) => frame.to_device(point),
            None => (point.x, point.y),
        };
        viewport.device_to_pixel(dx, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built(bounds: &[DataBounds]) -> CoordinateFrameTrail {
        let mut trail = CoordinateFrameTrail::new();
        trail.begin_build();
        for b in bounds {
            trail.push(*b);
        }
        trail.finish_build();
        trail
    }

    #[test]
    fn test_reverse_map_centre() {
        let trail = built(&[DataBounds::new(0.0, 10.0, 0.0, 10.0)]);
        let viewport = ViewportState::new(100, 100);
        let point = trail.reverse_map(&viewport, 50.0, 50.0);
        assert!((point.x - 5.0).abs() < 1e-9);
        assert!((point.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_frame_uses_device_units() {
        let trail = built(&[]);
        let viewport = ViewportState::new(4096, 3165);
        let point = trail.reverse_map(&viewport, 0.0, 3165.0);
        assert_eq!(point, DataPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_last_frame_wins() {
        let trail = built(&[
            DataBounds::new(0.0, 1.0, 0.0, 1.0),
            DataBounds::new(100.0, 200.0, -1.0, 1.0),
        ]);
        assert_eq!(trail.active().unwrap().ordinal, 2);
    }

    #[test]
    fn test_deferred_selection_survives_rebuild() {
        let mut trail = CoordinateFrameTrail::new();
        assert_eq!(trail.select(1).unwrap(), FrameSelection::Deferred(1));

        trail.begin_build();
        trail.push(DataBounds::new(0.0, 1.0, 0.0, 1.0));
        trail.push(DataBounds::new(0.0, 2.0, 0.0, 2.0));
        trail.finish_build();
        assert_eq!(trail.active().unwrap().ordinal, 1);

        trail.clear();
        trail.begin_build();
        trail.push(DataBounds::new(0.0, 1.0, 0.0, 1.0));
        trail.push(DataBounds::new(0.0, 2.0, 0.0, 2.0));
        trail.finish_build();
        assert_eq!(trail.active().unwrap().ordinal, 1);

        trail.clear_selection();
        assert_eq!(trail.active().unwrap().ordinal, 2);
    }

    #[test]
    fn test_selection_out_of_range() {
        let mut trail = built(&[DataBounds::new(0.0, 1.0, 0.0, 1.0)]);
        assert!(matches!(
            trail.select(3),
            Err(FrameError::UnknownFrame { requested: 3, available: 1 })
        ));
        assert!(matches!(trail.select(0), Err(FrameError::ZeroOrdinal)));
        assert_eq!(trail.select(1).unwrap(), FrameSelection::Applied(1));
    }

    #[test]
    fn test_pending_selection_falls_back_to_last() {
        let mut trail = CoordinateFrameTrail::new();
        trail.select(4).unwrap();
        trail.begin_build();
        trail.push(DataBounds::new(0.0, 1.0, 0.0, 1.0));
        trail.push(DataBounds::new(0.0, 2.0, 0.0, 2.0));
        trail.finish_build();
        assert_eq!(trail.active().unwrap().ordinal, 2);
    }

    #[test]
    fn test_forward_inverse_agree() {
        let trail = built(&[DataBounds::new(-3.0, 7.0, 1e3, 5e3)]);
        let viewport = ViewportState::new(640, 480);
        let point = DataPoint::new(2.5, 3210.0);
        let (px, py) = trail.forward_map(&viewport, point);
        let back = trail.reverse_map(&viewport, px, py);
        assert!((back.x - point.x).abs() < 1e-9);
        assert!((back.y - point.y).abs() < 1e-6);
    }
}
