//! Zoom selection and mode
//!
//! A rubber-band rectangle in pixels becomes a [`ZoomSelection`]: the
//! device window it covers plus the data bounds under the active frame.
//! View-only zoom applies the window; replot hands the data bounds to the
//! producer.

use crate::frames::CoordinateFrameTrail;
use crate::types::{DataBounds, PixelRect};
use crate::viewport::{DeviceWindow, ViewportState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomSelection {
    pub window: DeviceWindow,
    pub bounds: DataBounds,
}

/// Convert a pixel rectangle through the unzoomed viewport and active frame.
///
/// Any view-only window already applied is ignored, so the selection
/// depends only on the rectangle, the viewport size and the frame.
/// Returns `None` for a rectangle with zero width or height.
pub fn select(rect: PixelRect, viewport: &ViewportState, trail: &CoordinateFrameTrail) -> Option<ZoomSelection> {
    let rect = rect.normalized();
    if rect.is_degenerate() {
        return None;
    }
    let viewport = &viewport.unzoomed();
    let top_left = trail.reverse_map(viewport, rect.x as f64, rect.y as f64);
    let bottom_right = trail.reverse_map(
        viewport,
        (rect.x + rect.width) as f64,
        (rect.y + rect.height) as f64,
    );
    Some(ZoomSelection {
        window: viewport.window_for(rect),
        bounds: DataBounds::new(top_left.x, bottom_right.x, bottom_right.y, top_left.y).ordered(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoomMode {
    ViewOnly,
    Replot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    Selecting,
}

#[derive(Debug, Clone)]
pub struct ZoomOrchestrator {
    mode: ZoomMode,
    selection: SelectionState,
    last: Option<ZoomSelection>,
}

impl ZoomOrchestrator {
    pub fn new(replot_on_zoom: bool) -> Self {
        Self {
            mode: if replot_on_zoom {
                ZoomMode::Replot
            } else {
                ZoomMode::ViewOnly
            },
            selection: SelectionState::Idle,
            last: None,
        }
    }

    pub fn mode(&self) -> ZoomMode {
        self.mode
    }

    pub fn replot_on_zoom(&self) -> bool {
        self.mode == ZoomMode::Replot
    }

    /// Flip between view-only and replot; returns the new replot flag.
    pub fn toggle_replot_on_zoom(&mut self) -> bool {
        self.mode = match self.mode {
            ZoomMode::ViewOnly => ZoomMode::Replot,
            ZoomMode::Replot => ZoomMode::ViewOnly,
        };
        self.replot_on_zoom()
    }

    pub fn begin_selection(&mut self) {
        self.selection = SelectionState::Selecting;
    }

    pub fn cancel_selection(&mut self) {
        self.selection = SelectionState::Idle;
    }

    pub fn is_selecting(&self) -> bool {
        self.selection == SelectionState::Selecting
    }

    /// Finish a selection and return it when usable.
    pub fn commit(
        &mut self,
        rect: PixelRect,
        viewport: &ViewportState,
        trail: &CoordinateFrameTrail,
    ) -> Option<ZoomSelection> {
        self.selection = SelectionState::Idle;
        let selection = select(rect, viewport, trail)?;
        self.last = Some(selection);
        Some(selection)
    }

    pub fn last_selection(&self) -> Option<&ZoomSelection> {
        self.last.as_ref()
    }

    /// Reinterpret the stored geometry at the selection window.
    pub fn apply_view_only(&self, viewport: &mut ViewportState, selection: &ZoomSelection) {
        viewport.set_window(selection.window);
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.selection = SelectionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_trail() -> CoordinateFrameTrail {
        let mut trail = CoordinateFrameTrail::new();
        trail.begin_build();
        trail.push(DataBounds::new(0.0, 10.0, 0.0, 10.0));
        trail.finish_build();
        trail
    }

    #[test]
    fn test_select_quadrant() {
        let viewport = ViewportState::new(100, 100);
        let selection = select(PixelRect::new(0, 0, 50, 50), &viewport, &unit_trail()).unwrap();
        assert!((selection.bounds.x_min - 0.0).abs() < 1e-9);
        assert!((selection.bounds.x_max - 5.0).abs() < 1e-9);
        assert!((selection.bounds.y_min - 5.0).abs() < 1e-9);
        assert!((selection.bounds.y_max - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_rect_ignored() {
        let viewport = ViewportState::new(100, 100);
        let mut zoom = ZoomOrchestrator::new(false);
        zoom.begin_selection();
        assert!(zoom.commit(PixelRect::new(10, 10, 0, 40), &viewport, &unit_trail()).is_none());
        assert!(!zoom.is_selecting());
        assert!(zoom.last_selection().is_none());
    }

    #[test]
    fn test_view_only_is_idempotent() {
        let mut viewport = ViewportState::new(200, 100);
        let mut zoom = ZoomOrchestrator::new(false);
        let trail = unit_trail();
        let rect = PixelRect::new(20, 10, 60, 40);

        let first = zoom.commit(rect, &viewport, &trail).unwrap();
        zoom.apply_view_only(&mut viewport, &first);
        let once = viewport.clone();

        let second = zoom.commit(rect, &viewport, &trail).unwrap();
        zoom.apply_view_only(&mut viewport, &second);
        assert_eq!(second, first);
        assert_eq!(viewport, once);
    }

    #[test]
    fn test_select_ignores_applied_window() {
        let trail = unit_trail();
        let rect = PixelRect::new(0, 0, 50, 50);
        let full = ViewportState::new(100, 100);
        let mut zoomed = full.clone();
        zoomed.set_window(full.window_for(PixelRect::new(25, 25, 50, 50)));

        assert_eq!(select(rect, &zoomed, &trail), select(rect, &full, &trail));
    }

    #[test]
    fn test_toggle_mode() {
        let mut zoom = ZoomOrchestrator::new(false);
        assert_eq!(zoom.mode(), ZoomMode::ViewOnly);
        assert!(zoom.toggle_replot_on_zoom());
        assert_eq!(zoom.mode(), ZoomMode::Replot);
        assert!(!zoom.toggle_replot_on_zoom());
    }
}
