//! Movie playback over the display list
//!
//! The controller does not own a timer. The host calls [`tick`] at
//! [`interval`] while [`is_playing`] holds.
//!
//! [`tick`]: PlaybackController::tick
//! [`interval`]: PlaybackController::interval
//! [`is_playing`]: PlaybackController::is_playing

use crate::display_list::{DisplayList, NavOutcome};
use crate::types::Ordinal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted frame interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Stepping,
    Playing,
}

/// Result of one playback tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackTick {
    Advanced(Ordinal),
    /// Reached the last record; playback stopped there
    Finished(Ordinal),
    /// Not playing
    Idle,
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    state: PlaybackState,
    interval: Duration,
}

impl PlaybackController {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: PlaybackState::Idle,
            interval: interval.min(MAX_INTERVAL),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval.min(MAX_INTERVAL);
    }

    /// Show the first record and start advancing from it.
    pub fn start(&mut self, list: &mut DisplayList, interval: Option<Duration>) -> NavOutcome {
        if let Some(interval) = interval {
            self.set_interval(interval);
        }
        let outcome = list.first();
        self.state = match outcome {
            NavOutcome::Empty => PlaybackState::Idle,
            _ if list.len() <= 1 => PlaybackState::Idle,
            _ => PlaybackState::Playing,
        };
        outcome
    }

    pub fn stop(&mut self) {
        if self.state == PlaybackState::Playing {
            log::debug!("movie stopped");
        }
        self.state = PlaybackState::Idle;
    }

    pub fn tick(&mut self, list: &mut DisplayList) -> PlaybackTick {
        if self.state != PlaybackState::Playing {
            return PlaybackTick::Idle;
        }
        match list.next() {
            NavOutcome::Moved(ordinal) => {
                if list.current_position() == Some(list.len()) {
                    self.state = PlaybackState::Idle;
                    PlaybackTick::Finished(ordinal)
                } else {
                    PlaybackTick::Advanced(ordinal)
                }
            }
            NavOutcome::AtBoundary(ordinal) => {
                self.state = PlaybackState::Idle;
                PlaybackTick::Finished(ordinal)
            }
            NavOutcome::Empty => {
                self.state = PlaybackState::Idle;
                PlaybackTick::Idle
            }
        }
    }

    /// Run one user navigation; stops a running movie.
    pub fn step<F>(&mut self, list: &mut DisplayList, navigate: F) -> NavOutcome
    where
        F: FnOnce(&mut DisplayList) -> NavOutcome,
    {
        self.state = PlaybackState::Stepping;
        let outcome = navigate(list);
        self.state = PlaybackState::Idle;
        outcome
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireOrder;
    use crate::record::RecordBuffer;

    fn list_of(count: usize) -> DisplayList {
        let mut list = DisplayList::new(None);
        for _ in 0..count {
            let ordinal = list.reserve_ordinal();
            let mut buffer = RecordBuffer::new(ordinal, 0);
            buffer.push(b"GE");
            list.append(buffer.finalize(WireOrder::Little));
        }
        list
    }

    #[test]
    fn test_movie_visits_every_record_once() {
        let mut list = list_of(3);
        list.set_current(3);
        let mut playback = PlaybackController::default();

        assert_eq!(playback.start(&mut list, None), NavOutcome::Moved(1));
        assert!(playback.is_playing());
        assert_eq!(playback.tick(&mut list), PlaybackTick::Advanced(2));
        assert_eq!(playback.tick(&mut list), PlaybackTick::Finished(3));
        assert_eq!(playback.state(), PlaybackState::Idle);
        assert_eq!(playback.tick(&mut list), PlaybackTick::Idle);
        assert_eq!(list.current_ordinal(), Some(3));
    }

    #[test]
    fn test_single_record_movie_does_not_play() {
        let mut list = list_of(1);
        let mut playback = PlaybackController::default();
        assert_eq!(playback.start(&mut list, None), NavOutcome::Moved(1));
        assert!(!playback.is_playing());
    }

    #[test]
    fn test_step_stops_movie() {
        let mut list = list_of(4);
        let mut playback = PlaybackController::default();
        playback.start(&mut list, Some(Duration::from_millis(5)));
        assert_eq!(playback.interval(), Duration::from_millis(5));

        let outcome = playback.step(&mut list, DisplayList::last);
        assert_eq!(outcome, NavOutcome::Moved(4));
        assert!(!playback.is_playing());
    }

    #[test]
    fn test_interval_clamped() {
        let playback = PlaybackController::new(Duration::from_secs(600));
        assert_eq!(playback.interval(), MAX_INTERVAL);
    }
}
