use std::time::{Duration, Instant};

use strum::IntoStaticStr;

/// Save lifecycle shown by the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SaveState {
    Empty,
    Editing,
    Waiting,
    Saving,
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveEvent {
    BufferEmptied,
    BufferChanged,
    /// The timer armed for the current phase ran out.
    Elapsed,
}

impl SaveState {
    pub fn advance(self, event: SaveEvent) -> SaveState {
        match (self, event) {
            (_, SaveEvent::BufferEmptied) => SaveState::Empty,
            (_, SaveEvent::BufferChanged) => SaveState::Editing,
            (SaveState::Editing, SaveEvent::Elapsed) => SaveState::Waiting,
            (SaveState::Waiting, SaveEvent::Elapsed) => SaveState::Saving,
            (SaveState::Saving, SaveEvent::Elapsed) => SaveState::Saved,
            (stable @ (SaveState::Empty | SaveState::Saved), SaveEvent::Elapsed) => stable,
        }
    }

    /// Phases that still have a timer running behind them.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            SaveState::Editing | SaveState::Waiting | SaveState::Saving
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            SaveState::Empty => "Flick is empty",
            SaveState::Editing => "Flick is being edited",
            SaveState::Waiting => "Flick is waiting for saving",
            SaveState::Saving => "Saving Flick...",
            SaveState::Saved => "Flick saved",
        }
    }
}

/// A single cancellable deadline. Re-arming replaces the previous deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms the timer and returns its deadline once `now` has reached it.
    pub fn fire_if_due(&mut self, now: Instant) -> Option<Instant> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(deadline)
            }
            _ => None,
        }
    }
}

/// Earliest of the given optional deadlines.
pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_walks_the_transient_phases() {
        let mut state = SaveState::Empty.advance(SaveEvent::BufferChanged);
        let mut seen = vec![state];
        while state.is_transient() {
            state = state.advance(SaveEvent::Elapsed);
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SaveState::Editing,
                SaveState::Waiting,
                SaveState::Saving,
                SaveState::Saved
            ]
        );
        assert_eq!(state.advance(SaveEvent::Elapsed), SaveState::Saved);
    }

    #[test]
    fn emptying_wins_from_any_phase() {
        for state in [SaveState::Editing, SaveState::Waiting, SaveState::Saving, SaveState::Saved] {
            assert_eq!(state.advance(SaveEvent::BufferEmptied), SaveState::Empty);
        }
    }

    #[test]
    fn timer_fires_once() {
        let start = Instant::now();
        let mut timer = Timer::default();
        timer.arm(start, Duration::from_millis(10));
        assert_eq!(timer.fire_if_due(start), None);
        let due = start + Duration::from_millis(10);
        assert_eq!(timer.fire_if_due(due), Some(due));
        assert_eq!(timer.fire_if_due(due), None);
        assert!(!timer.is_armed());
    }

    #[test]
    fn earliest_ignores_unarmed() {
        let start = Instant::now();
        let later = start + Duration::from_secs(1);
        assert_eq!(earliest([None, Some(later), Some(start)]), Some(start));
        assert_eq!(earliest([None, None]), None);
    }
}
