use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::assets::AssetRef;
use crate::content::{Direction, Payload, Script, ThreadTag};
use crate::embed::{self, EmbedFrame};
use crate::sequence::{Authority, Token};

/// A rendered conversation message.
#[derive(Clone, Debug)]
pub struct Message {
    pub direction: Direction,
    pub body: Body,
}

#[derive(Clone, Debug)]
pub enum Body {
    Text(String),
    /// `path: None` renders the missing-photo placeholder.
    Photo {
        path: Option<PathBuf>,
        caption: String,
    },
    Embed(EmbedFrame),
}

/// Per-thread "animated sequence has completed at least once" flags.
/// RSVP deliberately has no flag; it replays in full on every visit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub event: bool,
    pub art: bool,
    pub history: bool,
}

impl PlaybackState {
    pub fn is_played(&self, thread: ThreadTag) -> bool {
        match thread {
            ThreadTag::Event => self.event,
            ThreadTag::Art => self.art,
            ThreadTag::History => self.history,
            ThreadTag::Generic | ThreadTag::Rsvp => false,
        }
    }

    pub fn mark_played(&mut self, thread: ThreadTag) {
        match thread {
            ThreadTag::Event => self.event = true,
            ThreadTag::Art => self.art = true,
            ThreadTag::History => self.history = true,
            ThreadTag::Generic | ThreadTag::Rsvp => {}
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// View mutations a player asks for. The model applies them; the player
/// never touches the view directly.
#[derive(Debug)]
pub enum Action {
    SetThread(ThreadTag),
    ShowTyping,
    HideTyping,
    Append(Message),
    Probe(AssetRef),
    ActivateWidget,
    Completed(ThreadTag),
}

#[derive(Debug)]
enum Phase {
    /// Waiting on an asset probe for the current step.
    Probing,
    Typing { until: Instant },
    /// Inter-message beat; the step at `index` has already been appended.
    Settling { until: Instant },
    Finished,
}

/// Token-guarded interpreter for one thread script.
///
/// Advanced by the model on every tick and on every probe response; each
/// resumption re-checks the captured token and cancels silently when it
/// has been superseded. A cancelled run leaves whatever it already
/// appended on screen and never reports completion.
pub struct Player {
    token: Token,
    script: Script,
    index: usize,
    phase: Phase,
    speed: f64,
    /// Probe result for the current step, cleared on advance.
    resolution: Option<Option<PathBuf>>,
}

impl Player {
    pub fn start(script: Script, token: Token, speed: f64, now: Instant) -> (Self, Vec<Action>) {
        let thread = script.thread;
        let mut player = Self {
            token,
            script,
            index: 0,
            phase: Phase::Finished,
            speed,
            resolution: None,
        };
        let mut actions = vec![Action::SetThread(thread)];
        if player.script.steps.is_empty() {
            if player.script.completes {
                actions.push(Action::Completed(thread));
            }
        } else {
            actions.extend(player.enter_step(now));
        }
        (player, actions)
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn thread(&self) -> ThreadTag {
        self.script.thread
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    /// Timer checkpoint. Stale tokens stop the run with no further actions.
    pub fn poll(&mut self, authority: &Authority, now: Instant) -> Vec<Action> {
        if self.is_finished() {
            return Vec::new();
        }
        if !authority.is_valid(self.token) {
            self.phase = Phase::Finished;
            return Vec::new();
        }
        match self.phase {
            Phase::Probing | Phase::Finished => Vec::new(),
            Phase::Typing { until } => {
                if now < until {
                    return Vec::new();
                }
                let mut actions = vec![Action::HideTyping];
                actions.extend(self.append_current(now));
                actions
            }
            Phase::Settling { until } => {
                if now < until {
                    return Vec::new();
                }
                self.advance(now)
            }
        }
    }

    /// Probe-response checkpoint.
    pub fn on_probe(
        &mut self,
        authority: &Authority,
        key: &'static str,
        path: Option<PathBuf>,
        now: Instant,
    ) -> Vec<Action> {
        if self.is_finished() {
            return Vec::new();
        }
        if !authority.is_valid(self.token) {
            self.phase = Phase::Finished;
            return Vec::new();
        }
        if !matches!(self.phase, Phase::Probing) {
            return Vec::new();
        }
        let step = &self.script.steps[self.index];
        let matches_step = match &step.payload {
            Payload::Photo { asset, .. } => asset.key == key,
            _ => false,
        };
        if !matches_step {
            return Vec::new();
        }
        if step.optional && path.is_none() {
            // Absent optional asset: skip the step entirely.
            return self.advance(now);
        }
        self.resolution = Some(path);
        self.enter_step(now)
    }

    fn enter_step(&mut self, now: Instant) -> Vec<Action> {
        let step = &self.script.steps[self.index];
        if let Payload::Photo { asset, .. } = &step.payload {
            if self.resolution.is_none() {
                let asset = *asset;
                self.phase = Phase::Probing;
                return vec![Action::Probe(asset)];
            }
        }
        match step.typing {
            Some(range) => {
                let wait = self.scaled(range.sample(&mut rand::thread_rng()));
                self.phase = Phase::Typing { until: now + wait };
                vec![Action::ShowTyping]
            }
            None => self.append_current(now),
        }
    }

    fn append_current(&mut self, now: Instant) -> Vec<Action> {
        let step = &self.script.steps[self.index];
        let mut actions = Vec::new();
        let body = match &step.payload {
            Payload::Text(text) => {
                if text.contains("#tally-open=") {
                    // Popup links need the widget wired up.
                    actions.push(Action::ActivateWidget);
                }
                Body::Text(text.clone())
            }
            Payload::Photo { caption, .. } => Body::Photo {
                path: self.resolution.clone().flatten(),
                caption: caption.clone(),
            },
            Payload::Embed => {
                actions.push(Action::ActivateWidget);
                Body::Embed(EmbedFrame::new())
            }
        };
        actions.insert(
            0,
            Action::Append(Message {
                direction: step.direction,
                body,
            }),
        );
        let settle = self.scaled(step.settle.sample(&mut rand::thread_rng()));
        self.phase = Phase::Settling { until: now + settle };
        actions
    }

    fn advance(&mut self, now: Instant) -> Vec<Action> {
        self.index += 1;
        self.resolution = None;
        if self.index >= self.script.steps.len() {
            self.phase = Phase::Finished;
            if self.script.completes {
                return vec![Action::Completed(self.script.thread)];
            }
            return Vec::new();
        }
        self.enter_step(now)
    }

    fn scaled(&self, base: Duration) -> Duration {
        base.mul_f64(self.speed)
    }
}

/// Instant final render for threads that have already played: the full
/// script in one synchronous pass, no typing, no delays. Optional photos
/// are never appended here; their probe only happens during live playback.
pub fn final_render<F>(script: &Script, cached: F) -> (Vec<Message>, bool)
where
    F: Fn(&'static str) -> Option<PathBuf>,
{
    let mut messages = Vec::new();
    let mut activate = false;
    for step in &script.steps {
        if step.optional {
            continue;
        }
        let body = match &step.payload {
            Payload::Text(text) => {
                if text.contains("#tally-open=") {
                    activate = true;
                }
                Body::Text(text.clone())
            }
            Payload::Photo { asset, caption } => Body::Photo {
                path: cached(asset.key),
                caption: caption.clone(),
            },
            Payload::Embed => {
                activate = true;
                Body::Embed(EmbedFrame::new())
            }
        };
        messages.push(Message {
            direction: step.direction,
            body,
        });
    }
    (messages, activate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{script_for, ThreadTag};
    use crate::embed::popup_href;

    const INSTANT: f64 = 0.0;

    /// Answer every probe recorded so far. Repeat answers are no-ops once
    /// the player has moved past the probing phase.
    fn drain_probes(
        player: &mut Player,
        authority: &Authority,
        now: Instant,
        actions: &mut Vec<Action>,
        resolve: fn(AssetRef) -> Option<PathBuf>,
    ) {
        let probes: Vec<AssetRef> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Probe(asset) => Some(*asset),
                _ => None,
            })
            .collect();
        for asset in probes {
            actions.extend(player.on_probe(authority, asset.key, resolve(asset), now));
        }
    }

    fn run_to_completion(
        player: &mut Player,
        authority: &Authority,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        run_with_assets(player, authority, now, actions, |_| None);
    }

    fn run_with_assets(
        player: &mut Player,
        authority: &Authority,
        now: Instant,
        actions: &mut Vec<Action>,
        resolve: fn(AssetRef) -> Option<PathBuf>,
    ) {
        // Instant delays resolve on the next poll.
        for _ in 0..200 {
            if player.is_finished() {
                break;
            }
            drain_probes(player, authority, now, actions, resolve);
            actions.extend(player.poll(authority, now));
        }
    }

    fn appended(actions: &[Action]) -> Vec<&Message> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Append(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn completed(actions: &[Action]) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, Action::Completed(_)))
    }

    #[test]
    fn history_plays_eight_texts_then_completes() {
        let mut authority = Authority::new();
        let token = authority.invalidate();
        let now = Instant::now();
        let (mut player, mut actions) =
            Player::start(script_for(ThreadTag::History).unwrap(), token, INSTANT, now);
        run_to_completion(&mut player, &authority, now, &mut actions);

        let messages = appended(&actions);
        assert_eq!(messages.len(), 8);
        assert!(messages
            .iter()
            .all(|m| m.direction == Direction::Incoming && matches!(m.body, Body::Text(_))));
        let typing = actions
            .iter()
            .filter(|a| matches!(a, Action::ShowTyping))
            .count();
        assert_eq!(typing, 8);
        assert!(completed(&actions));
    }

    #[test]
    fn cancellation_stops_appends_and_never_completes() {
        let mut authority = Authority::new();
        let token = authority.invalidate();
        let now = Instant::now();
        let (mut player, mut actions) =
            Player::start(script_for(ThreadTag::History).unwrap(), token, INSTANT, now);

        // Let two messages land, then supersede the token.
        while appended(&actions).len() < 2 {
            actions.extend(player.poll(&authority, now));
        }
        let before = appended(&actions).len();
        authority.invalidate();

        for _ in 0..50 {
            actions.extend(player.poll(&authority, now));
        }
        assert_eq!(appended(&actions).len(), before);
        assert!(!completed(&actions));
        assert!(player.is_finished());
    }

    #[test]
    fn event_opens_with_outgoing_photo_and_wires_the_popup() {
        let mut authority = Authority::new();
        let token = authority.invalidate();
        let now = Instant::now();
        let (mut player, mut actions) =
            Player::start(script_for(ThreadTag::Event).unwrap(), token, INSTANT, now);
        assert!(matches!(actions[0], Action::SetThread(ThreadTag::Event)));
        // The opener probes its gif before anything is typed.
        drain_probes(&mut player, &authority, now, &mut actions, |_| None);
        let first = appended(&actions)
            .first()
            .map(|m| m.direction)
            .expect("opener appended");
        assert_eq!(first, Direction::Outgoing);

        run_to_completion(&mut player, &authority, now, &mut actions);
        let messages = appended(&actions);
        assert_eq!(messages.len(), 7);
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.direction == Direction::Outgoing)
                .count(),
            1
        );
        let Body::Text(last) = &messages[6].body else {
            panic!("last event message should be text");
        };
        assert!(last.contains(&popup_href()));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ActivateWidget)));
        assert!(completed(&actions));
    }

    #[test]
    fn art_appends_missing_photo_but_skips_absent_optional() {
        let mut authority = Authority::new();
        let token = authority.invalidate();
        let now = Instant::now();
        let (mut player, mut actions) =
            Player::start(script_for(ThreadTag::Art).unwrap(), token, INSTANT, now);
        run_to_completion(&mut player, &authority, now, &mut actions);

        let messages = appended(&actions);
        assert_eq!(messages.len(), 4);
        assert!(matches!(
            messages[0].body,
            Body::Photo { path: None, .. }
        ));
        assert!(messages[1..]
            .iter()
            .all(|m| matches!(m.body, Body::Text(_))));
        assert!(completed(&actions));
    }

    #[test]
    fn art_appends_optional_photo_when_it_resolves() {
        let mut authority = Authority::new();
        let token = authority.invalidate();
        let now = Instant::now();
        let (mut player, mut actions) =
            Player::start(script_for(ThreadTag::Art).unwrap(), token, INSTANT, now);

        run_with_assets(&mut player, &authority, now, &mut actions, |asset| {
            Some(PathBuf::from(asset.candidates[0]))
        });

        let messages = appended(&actions);
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[4].body, Body::Photo { path: Some(_), .. }));
    }

    #[test]
    fn rsvp_plays_one_embed_and_sets_no_flag() {
        let mut authority = Authority::new();
        let token = authority.invalidate();
        let now = Instant::now();
        let (mut player, mut actions) =
            Player::start(script_for(ThreadTag::Rsvp).unwrap(), token, INSTANT, now);
        run_to_completion(&mut player, &authority, now, &mut actions);

        let messages = appended(&actions);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0].body, Body::Embed(_)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ActivateWidget)));
        assert!(!completed(&actions));
        assert!(player.is_finished());
    }

    #[test]
    fn final_render_skips_optional_photos() {
        let (messages, activate) =
            final_render(&script_for(ThreadTag::Art).unwrap(), |_| None);
        assert_eq!(messages.len(), 4);
        assert!(!activate);
    }

    #[test]
    fn final_render_for_event_is_full_length_and_activates() {
        let (messages, activate) = final_render(&script_for(ThreadTag::Event).unwrap(), |key| {
            (key == "martisor-gif").then(|| PathBuf::from("images/martisor.gif"))
        });
        assert_eq!(messages.len(), 7);
        assert!(activate);
        assert!(matches!(
            messages[0].body,
            Body::Photo { path: Some(_), .. }
        ));
    }

    #[test]
    fn playback_state_transitions_once_per_reset_epoch() {
        let mut state = PlaybackState::default();
        assert!(!state.is_played(ThreadTag::Event));
        state.mark_played(ThreadTag::Event);
        state.mark_played(ThreadTag::Rsvp);
        assert!(state.is_played(ThreadTag::Event));
        assert!(!state.is_played(ThreadTag::Rsvp));
        state.reset();
        assert!(!state.is_played(ThreadTag::Event));
    }
}
