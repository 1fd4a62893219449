use rand::seq::SliceRandom;
use rand::Rng;

use crate::assets::AssetRef;
use crate::embed;
use crate::sequence::{DelayRange, ShuffledCycle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadTag {
    Generic,
    Event,
    Art,
    History,
    Rsvp,
}

impl ThreadTag {
    pub fn label(self) -> &'static str {
        match self {
            ThreadTag::Generic => "generic",
            ThreadTag::Event => "event",
            ThreadTag::Art => "art",
            ThreadTag::History => "history",
            ThreadTag::Rsvp => "rsvp",
        }
    }
}

/// One chat-list row. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: String,
    pub name: String,
    pub preview: String,
    pub time: String,
    pub badge: String,
    pub avatar: &'static str,
    pub thread: ThreadTag,
}

const ROMANIAN_NAMES: [&str; 30] = [
    "Ana Popescu",
    "Mihai Ionescu",
    "Ioana Dumitrescu",
    "Andrei Stan",
    "Elena Marinescu",
    "Radu Petrescu",
    "Cătălina Georgescu",
    "Ștefan Rusu",
    "Cristina Matei",
    "Vlad Popa",
    "Alina Toma",
    "Bogdan Enache",
    "Teodora Ilie",
    "Daria Stoica",
    "Sorin Dobre",
    "Irina Pavel",
    "Rareș Ciobanu",
    "Bianca Șerban",
    "Dragoș Vasile",
    "Maria Nistor",
    "Nicoleta Cristea",
    "Gabriel Munteanu",
    "Oana Sava",
    "Mădălina Răduț",
    "Florin Neagu",
    "Alexia Bălan",
    "Dinu Barbu",
    "Iulia Chiriac",
    "Săndel Păun",
    "Roxana Bîrsan",
];

const PREVIEW_OPTIONS: [&str; 5] = [
    "Happy Mărțișor!",
    "Noroc, sănătate și multă voie bună!",
    "Happy March 1st!",
    "Happy Spring!!!",
    "Un simbol mic pentru o prietenie mare. Să ai un Martie de vis!",
];

const TIME_OPTIONS: [&str; 9] = [
    "11:08 AM",
    "12:44 AM",
    "9:11 AM",
    "8:33 AM",
    "Yesterday",
    "Yesterday",
    "7:02 AM",
    "6:18 AM",
    "10:29 PM",
];

const GENERIC_AVATARS: [&str; 8] = [
    "images/a.jpg",
    "images/b.jpg",
    "images/c.jpg",
    "images/d.jpg",
    "images/e.jpg",
    "images/f.jpg",
    "images/g.jpg",
    "images/h.jpg",
];

/// Every avatar path a row may render. The special threads reuse the
/// first four generic avatars.
pub fn all_avatars() -> &'static [&'static str] {
    &GENERIC_AVATARS
}

pub const MARTISOR_GIF: AssetRef = AssetRef {
    key: "martisor-gif",
    candidates: &["images/martisor.gif", "martisor.gif"],
};

pub const CONCEPT_SKETCH: AssetRef = AssetRef {
    key: "concept-sketch",
    candidates: &[
        "images/conceptsketc.jpg",
        "conceptsketc.jpg",
        "images/conceptsketch.jpg",
        "conceptsketch.jpg",
    ],
};

pub const MARTISOR_SCANS: AssetRef = AssetRef {
    key: "martisor-scans",
    candidates: &["images/martisor-scans.gif", "martisor-scans.gif"],
};

/// The four special threads, statically known and only ever copied into
/// list rows.
pub fn special(thread: ThreadTag) -> Option<ChatEntry> {
    let (id, name, preview, time, badge, avatar) = match thread {
        ThreadTag::Event => (
            "event",
            "Event Details",
            "Celebrate spring the Romanian way!",
            "12:30 PM",
            "1",
            "images/a.jpg",
        ),
        ThreadTag::Art => (
            "art",
            "Art Details",
            "Concept sketch + artist statement",
            "12:29 PM",
            "",
            "images/b.jpg",
        ),
        ThreadTag::History => (
            "history",
            "Mărțișor History",
            "What is Mărțișor?",
            "12:28 PM",
            "",
            "images/c.jpg",
        ),
        ThreadTag::Rsvp => ("rsvp", "RSVP", "Tap to RSVP", "12:27 PM", "", "images/d.jpg"),
        ThreadTag::Generic => return None,
    };
    Some(ChatEntry {
        id: id.to_string(),
        name: name.to_string(),
        preview: preview.to_string(),
        time: time.to_string(),
        badge: badge.to_string(),
        avatar,
        thread,
    })
}

/// "First L." from a full name; single-word names pass through.
pub fn format_display_name(full: &str) -> String {
    let parts: Vec<&str> = full.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, .., last] => match last.chars().next() {
            Some(initial) => format!("{first} {initial}."),
            None => (*first).to_string(),
        },
    }
}

pub fn random_preview() -> &'static str {
    PREVIEW_OPTIONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PREVIEW_OPTIONS[0])
}

/// Builds ephemeral generic chat rows. Avatars and previews cycle through
/// their pools before repeating; names and time labels are uniform picks.
pub struct Spawner {
    avatars: ShuffledCycle<&'static str>,
    previews: ShuffledCycle<&'static str>,
    counter: u64,
}

impl Spawner {
    pub fn new() -> Self {
        Self {
            avatars: ShuffledCycle::new(GENERIC_AVATARS.to_vec()),
            previews: ShuffledCycle::new(PREVIEW_OPTIONS.to_vec()),
            counter: 0,
        }
    }

    pub fn generate(&mut self) -> ChatEntry {
        let mut rng = rand::thread_rng();
        self.counter += 1;
        let id = format!("c_{:08x}{:04x}", rng.gen::<u32>(), self.counter);
        let full = ROMANIAN_NAMES
            .choose(&mut rng)
            .copied()
            .unwrap_or(ROMANIAN_NAMES[0]);
        ChatEntry {
            id,
            name: format_display_name(full),
            preview: self
                .previews
                .next()
                .unwrap_or(PREVIEW_OPTIONS[0])
                .to_string(),
            time: TIME_OPTIONS
                .choose(&mut rng)
                .copied()
                .unwrap_or(TIME_OPTIONS[0])
                .to_string(),
            badge: "99+".to_string(),
            avatar: self.avatars.next().unwrap_or(GENERIC_AVATARS[0]),
            thread: ThreadTag::Generic,
        }
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Inline-markdown body.
    Text(String),
    Photo { asset: AssetRef, caption: String },
    Embed,
}

/// One playback step: an optional typing beat, an appended message, then a
/// settle delay before the next step.
#[derive(Clone, Debug)]
pub struct ScriptStep {
    pub direction: Direction,
    pub payload: Payload,
    /// `None` appends with no typing indicator.
    pub typing: Option<DelayRange>,
    pub settle: DelayRange,
    /// Optional photos are skipped entirely when their asset never
    /// resolves; absence is not an error.
    pub optional: bool,
}

impl ScriptStep {
    fn text(body: &str, typing: DelayRange, settle: DelayRange) -> Self {
        Self {
            direction: Direction::Incoming,
            payload: Payload::Text(body.to_string()),
            typing: Some(typing),
            settle,
            optional: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Script {
    pub thread: ThreadTag,
    pub steps: Vec<ScriptStep>,
    /// Whether an uninterrupted run marks the thread as played. RSVP never
    /// does; it replays in full on every visit.
    pub completes: bool,
}

const EVENT_TYPING: DelayRange = DelayRange::from_millis(850, 1500);
const EVENT_SETTLE: DelayRange = DelayRange::from_millis(320, 920);
const ART_TYPING: DelayRange = DelayRange::from_millis(800, 1400);
const ART_SETTLE: DelayRange = DelayRange::from_millis(280, 760);
const HISTORY_TYPING: DelayRange = DelayRange::from_millis(780, 1500);
const HISTORY_SETTLE: DelayRange = DelayRange::from_millis(220, 620);

const EVENT_TEXTS: [&str; 5] = [
    "Celebrate spring the Romanian way!",
    "Experience the live creation of a **large-scale Mărțișor** — a work exploring memory.",
    "Join us for the performance, food, and community. Open to all.",
    "**Sunday, March 1st @ 2:00 PM**",
    "**366 Devoe Street, Brooklyn**",
];

const ART_TEXTS: [&str; 3] = [
    "The mărțișor is a Romanian spring tradition: a small braided token of red and white thread, exchanged on March 1st as a symbol of renewal and connection.",
    "Memory is sustained in presence and in practice. Through memory, objects and events become distorted but durational, carried by the collective, across time and place.",
    "Together we will weave a large mărțișor, strung with bead constructed of a large amalgamation of objects related to memory.",
];

const HISTORY_TEXTS: [&str; 8] = [
    "Mărțișor is an ancient Romanian celebration on March 1st marking the arrival of spring and the victory of light over winter.",
    "The name is a diminutive of Martie, literally translating to \"little March.\"",
    "The core symbol is a red and white twisted string representing the transition from the white of winter to the red vitality of spring.",
    "It was added to the UNESCO Intangible Cultural Heritage list in 2017 to preserve its historical and cultural significance.",
    "Historical roots date back over 2,000 years to Roman and Dacian times, possibly tied to the feast of the god Mars.",
    "People traditionally wear the string pinned to their clothing or around their wrist for the first 9 to 12 days of the month.",
    "In modern times, the string is usually attached to small charms like snowdrops, ladybugs, or four-leaf clovers for good luck.",
    "The tradition concludes by tying the red and white string to the branch of a flowering fruit tree to ensure health and prosperity.",
];

pub fn script_for(thread: ThreadTag) -> Option<Script> {
    match thread {
        ThreadTag::Event => Some(event_script()),
        ThreadTag::Art => Some(art_script()),
        ThreadTag::History => Some(history_script()),
        ThreadTag::Rsvp => Some(rsvp_script()),
        ThreadTag::Generic => None,
    }
}

fn event_script() -> Script {
    // The green outgoing bubble exists only here.
    let mut steps = vec![ScriptStep {
        direction: Direction::Outgoing,
        payload: Payload::Photo {
            asset: MARTISOR_GIF,
            caption: "Happy Mărțișor!".to_string(),
        },
        typing: None,
        settle: DelayRange::from_millis(220, 520),
        optional: false,
    }];
    for body in EVENT_TEXTS {
        steps.push(ScriptStep::text(body, EVENT_TYPING, EVENT_SETTLE));
    }
    steps.push(ScriptStep::text(
        &format!("[Click here for RSVP]({})", embed::popup_href()),
        EVENT_TYPING,
        EVENT_SETTLE,
    ));
    Script {
        thread: ThreadTag::Event,
        steps,
        completes: true,
    }
}

fn art_script() -> Script {
    let mut steps = vec![ScriptStep {
        direction: Direction::Incoming,
        payload: Payload::Photo {
            asset: CONCEPT_SKETCH,
            caption: String::new(),
        },
        typing: Some(DelayRange::from_millis(650, 1200)),
        settle: DelayRange::from_millis(260, 640),
        optional: false,
    }];
    for body in ART_TEXTS {
        steps.push(ScriptStep::text(body, ART_TYPING, ART_SETTLE));
    }
    steps.push(ScriptStep {
        direction: Direction::Incoming,
        payload: Payload::Photo {
            asset: MARTISOR_SCANS,
            caption: String::new(),
        },
        typing: Some(DelayRange::from_millis(750, 1350)),
        settle: DelayRange::fixed(0),
        optional: true,
    });
    Script {
        thread: ThreadTag::Art,
        steps,
        completes: true,
    }
}

fn history_script() -> Script {
    Script {
        thread: ThreadTag::History,
        steps: HISTORY_TEXTS
            .iter()
            .map(|body| ScriptStep::text(body, HISTORY_TYPING, HISTORY_SETTLE))
            .collect(),
        completes: true,
    }
}

fn rsvp_script() -> Script {
    Script {
        thread: ThreadTag::Rsvp,
        steps: vec![ScriptStep {
            direction: Direction::Incoming,
            payload: Payload::Embed,
            typing: Some(DelayRange::from_millis(520, 980)),
            settle: DelayRange::fixed(0),
            optional: false,
        }],
        completes: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_name_keeps_first_name_and_initial() {
        assert_eq!(format_display_name("Ana Popescu"), "Ana P.");
        assert_eq!(format_display_name("  Mihai  Ionescu  "), "Mihai I.");
        assert_eq!(format_display_name("Madonna"), "Madonna");
        assert_eq!(format_display_name(""), "");
    }

    #[test]
    fn spawner_issues_fresh_identities() {
        let mut spawner = Spawner::new();
        let ids: HashSet<String> = (0..50).map(|_| spawner.generate().id).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn generic_entries_carry_overflow_badge() {
        let mut spawner = Spawner::new();
        let entry = spawner.generate();
        assert_eq!(entry.badge, "99+");
        assert_eq!(entry.thread, ThreadTag::Generic);
        assert!(entry.name.ends_with('.'));
    }

    #[test]
    fn specials_exist_for_exactly_the_four_threads() {
        for tag in [
            ThreadTag::Event,
            ThreadTag::Art,
            ThreadTag::History,
            ThreadTag::Rsvp,
        ] {
            let entry = special(tag).unwrap();
            assert_eq!(entry.thread, tag);
        }
        assert!(special(ThreadTag::Generic).is_none());
        assert_eq!(special(ThreadTag::Event).unwrap().badge, "1");
    }

    #[test]
    fn event_script_opens_with_the_only_outgoing_message() {
        let script = event_script();
        assert_eq!(script.steps.len(), 7);
        let opener = &script.steps[0];
        assert_eq!(opener.direction, Direction::Outgoing);
        assert!(opener.typing.is_none());
        assert!(matches!(opener.payload, Payload::Photo { .. }));
        for step in &script.steps[1..] {
            assert_eq!(step.direction, Direction::Incoming);
            assert!(step.typing.is_some());
        }
        let Payload::Text(last) = &script.steps[6].payload else {
            panic!("last event step should be text");
        };
        assert!(last.contains(&embed::popup_href()));
    }

    #[test]
    fn art_script_ends_with_an_optional_photo() {
        let script = art_script();
        assert_eq!(script.steps.len(), 5);
        assert!(!script.steps[0].optional);
        assert!(script.steps[4].optional);
        assert!(matches!(script.steps[4].payload, Payload::Photo { .. }));
    }

    #[test]
    fn history_script_is_eight_texts() {
        let script = history_script();
        assert_eq!(script.steps.len(), 8);
        assert!(script
            .steps
            .iter()
            .all(|step| matches!(step.payload, Payload::Text(_))));
    }

    #[test]
    fn rsvp_script_never_completes() {
        let script = rsvp_script();
        assert_eq!(script.steps.len(), 1);
        assert!(!script.completes);
        assert!(matches!(script.steps[0].payload, Payload::Embed));
    }
}
