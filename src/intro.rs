use std::time::{Duration, Instant};

use crate::content::{special, ChatEntry, Spawner, ThreadTag};
use crate::sequence::{Authority, DelayRange, Token};

/// Fixed insertion order: one randomized generic row, then the four
/// specials, each prepended so Event Details ends up on top.
const PLAN: [PlanEntry; 5] = [
    PlanEntry::Random,
    PlanEntry::Special(ThreadTag::Rsvp),
    PlanEntry::Special(ThreadTag::History),
    PlanEntry::Special(ThreadTag::Art),
    PlanEntry::Special(ThreadTag::Event),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlanEntry {
    Random,
    Special(ThreadTag),
}

#[derive(Debug, Clone)]
pub struct Timing {
    pub initial_beat: Duration,
    pub row_delay: DelayRange,
    pub highlight_pause: Duration,
    pub open_pause: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            initial_beat: Duration::from_millis(900),
            row_delay: DelayRange::from_millis(900, 1700),
            highlight_pause: Duration::from_millis(600),
            open_pause: Duration::from_millis(700),
        }
    }
}

#[derive(Debug)]
pub enum IntroAction {
    Prepend(ChatEntry),
    /// Visually select the row with this id.
    Highlight(String),
    Open(ChatEntry),
}

#[derive(Debug)]
enum Phase {
    Idle,
    NextRow { until: Instant },
    Highlight { until: Instant },
    Open { until: Instant },
    Done,
}

/// One-shot scripted arrival of the chat list, ending by auto-opening the
/// Event thread. Owns its own generation counter, independent of
/// conversation playback.
pub struct Choreographer {
    authority: Authority,
    token: Token,
    timing: Timing,
    speed: f64,
    phase: Phase,
    index: usize,
    last_row_id: Option<String>,
}

impl Choreographer {
    pub fn new(timing: Timing, speed: f64) -> Self {
        let authority = Authority::new();
        let token = authority.current();
        Self {
            authority,
            token,
            timing,
            speed,
            phase: Phase::Idle,
            index: 0,
            last_row_id: None,
        }
    }

    /// Cancel any prior run and schedule the first insertion after the
    /// fixed initial beat.
    pub fn start(&mut self, now: Instant) {
        self.stop();
        self.token = self.authority.invalidate();
        self.index = 0;
        self.last_row_id = None;
        self.phase = Phase::NextRow {
            until: now + self.scaled(self.timing.initial_beat),
        };
    }

    /// Invalidate the run and drop the pending deadline. Safe to call when
    /// nothing is running.
    pub fn stop(&mut self) {
        self.authority.invalidate();
        self.phase = Phase::Idle;
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Done)
    }

    /// Timer checkpoint; stale tokens stop the choreography silently.
    pub fn poll(&mut self, spawner: &mut Spawner, now: Instant) -> Vec<IntroAction> {
        if !self.authority.is_valid(self.token) {
            self.phase = Phase::Idle;
            return Vec::new();
        }
        match self.phase {
            Phase::Idle | Phase::Done => Vec::new(),
            Phase::NextRow { until } => {
                if now < until {
                    return Vec::new();
                }
                let entry = match PLAN[self.index] {
                    PlanEntry::Random => spawner.generate(),
                    PlanEntry::Special(tag) => match special(tag) {
                        Some(entry) => entry,
                        None => {
                            self.phase = Phase::Idle;
                            return Vec::new();
                        }
                    },
                };
                self.index += 1;
                self.last_row_id = Some(entry.id.clone());
                if self.index >= PLAN.len() {
                    // Last insert is Event Details; highlight, then open.
                    self.phase = Phase::Highlight {
                        until: now + self.scaled(self.timing.highlight_pause),
                    };
                } else {
                    let delay = self
                        .timing
                        .row_delay
                        .sample(&mut rand::thread_rng());
                    self.phase = Phase::NextRow {
                        until: now + self.scaled(delay),
                    };
                }
                vec![IntroAction::Prepend(entry)]
            }
            Phase::Highlight { until } => {
                if now < until {
                    return Vec::new();
                }
                self.phase = Phase::Open {
                    until: now + self.scaled(self.timing.open_pause),
                };
                match self.last_row_id.clone() {
                    Some(id) => vec![IntroAction::Highlight(id)],
                    None => Vec::new(),
                }
            }
            Phase::Open { until } => {
                if now < until {
                    return Vec::new();
                }
                self.phase = Phase::Done;
                match special(ThreadTag::Event) {
                    Some(entry) => vec![IntroAction::Open(entry)],
                    None => Vec::new(),
                }
            }
        }
    }

    fn scaled(&self, base: Duration) -> Duration {
        base.mul_f64(self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_choreographer() -> Choreographer {
        Choreographer::new(Timing::default(), 0.0)
    }

    fn drain(choreo: &mut Choreographer, spawner: &mut Spawner, now: Instant) -> Vec<IntroAction> {
        let mut actions = Vec::new();
        for _ in 0..50 {
            let batch = choreo.poll(spawner, now);
            if batch.is_empty() && !choreo.is_running() {
                break;
            }
            actions.extend(batch);
        }
        actions
    }

    #[test]
    fn plan_inserts_five_rows_then_highlights_and_opens_event() {
        let mut choreo = instant_choreographer();
        let mut spawner = Spawner::new();
        let now = Instant::now();
        choreo.start(now);
        let actions = drain(&mut choreo, &mut spawner, now);

        let prepends: Vec<ThreadTag> = actions
            .iter()
            .filter_map(|a| match a {
                IntroAction::Prepend(entry) => Some(entry.thread),
                _ => None,
            })
            .collect();
        assert_eq!(
            prepends,
            vec![
                ThreadTag::Generic,
                ThreadTag::Rsvp,
                ThreadTag::History,
                ThreadTag::Art,
                ThreadTag::Event,
            ]
        );
        assert!(matches!(
            actions[5],
            IntroAction::Highlight(ref id) if id == "event"
        ));
        assert!(matches!(
            actions[6],
            IntroAction::Open(ref entry) if entry.thread == ThreadTag::Event
        ));
        assert!(!choreo.is_running());
    }

    #[test]
    fn stop_cancels_pending_steps() {
        let mut choreo = instant_choreographer();
        let mut spawner = Spawner::new();
        let now = Instant::now();
        choreo.start(now);
        let first = choreo.poll(&mut spawner, now);
        assert_eq!(first.len(), 1);

        choreo.stop();
        for _ in 0..10 {
            assert!(choreo.poll(&mut spawner, now).is_empty());
        }
        assert!(!choreo.is_running());

        // stop is idempotent.
        choreo.stop();
        choreo.stop();
    }

    #[test]
    fn restart_supersedes_the_previous_run() {
        let mut choreo = instant_choreographer();
        let mut spawner = Spawner::new();
        let now = Instant::now();
        choreo.start(now);
        let _ = choreo.poll(&mut spawner, now);
        let _ = choreo.poll(&mut spawner, now);

        choreo.start(now);
        let actions = drain(&mut choreo, &mut spawner, now);
        let prepends = actions
            .iter()
            .filter(|a| matches!(a, IntroAction::Prepend(_)))
            .count();
        assert_eq!(prepends, 5, "a restart replays the plan from the top");
    }

    #[test]
    fn real_timing_waits_for_the_initial_beat() {
        let mut choreo = Choreographer::new(Timing::default(), 1.0);
        let mut spawner = Spawner::new();
        let now = Instant::now();
        choreo.start(now);
        assert!(choreo.poll(&mut spawner, now).is_empty());
        assert!(choreo.is_running());
        let later = now + Duration::from_millis(900);
        assert_eq!(choreo.poll(&mut spawner, later).len(), 1);
    }
}
