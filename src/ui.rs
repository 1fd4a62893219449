use std::collections::HashSet;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use arboard::Clipboard;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::assets::{self, AssetRef};
use crate::content::{self, ChatEntry, Direction, Spawner, ThreadTag};
use crate::embed::{self, Activator, WidgetError};
use crate::intro::{self, Choreographer, IntroAction};
use crate::markdown;
use crate::player::{self, Action, Body, Message, PlaybackState, Player};
use crate::sequence::Authority;

const INITIAL_ROWS: usize = 10;

const TYPING_FRAMES: [&str; 4] = ["∙", "∙∙", "∙∙∙", "∙∙"];

/// Palette resolved from the `ui.theme` config key. Anything other than
/// "light" gets the dark default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    bg: Color,
    panel_bg: Color,
    header_bg: Color,
    row_selected_bg: Color,
    text_primary: Color,
    text_secondary: Color,
    accent: Color,
    bubble_in: Color,
    bubble_out: Color,
    link: Color,
}

impl Theme {
    pub fn named(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            _ => Self::dark(),
        }
    }

    fn dark() -> Self {
        Self {
            bg: Color::Rgb(11, 20, 26),
            panel_bg: Color::Rgb(17, 27, 33),
            header_bg: Color::Rgb(32, 44, 51),
            row_selected_bg: Color::Rgb(42, 57, 66),
            text_primary: Color::Rgb(233, 237, 239),
            text_secondary: Color::Rgb(134, 150, 160),
            accent: Color::Rgb(0, 168, 132),
            bubble_in: Color::Rgb(32, 44, 51),
            bubble_out: Color::Rgb(0, 92, 75),
            link: Color::Rgb(83, 189, 235),
        }
    }

    fn light() -> Self {
        Self {
            bg: Color::Rgb(239, 234, 226),
            panel_bg: Color::Rgb(255, 255, 255),
            header_bg: Color::Rgb(240, 242, 245),
            row_selected_bg: Color::Rgb(232, 234, 237),
            text_primary: Color::Rgb(17, 27, 33),
            text_secondary: Color::Rgb(102, 119, 129),
            accent: Color::Rgb(0, 128, 105),
            bubble_in: Color::Rgb(255, 255, 255),
            bubble_out: Color::Rgb(217, 253, 211),
            link: Color::Rgb(2, 126, 181),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

pub struct Options {
    pub tick_rate: Duration,
    pub speed: f64,
    pub theme: Theme,
    pub intro_timing: intro::Timing,
    pub assets: Option<assets::Handle>,
    pub activator: Activator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum View {
    List,
    Conversation,
}

enum AsyncResponse {
    Probe {
        request_id: u64,
        key: &'static str,
        path: Option<PathBuf>,
    },
    Avatar {
        path: &'static str,
        ok: bool,
    },
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        TYPING_FRAMES[self.index % TYPING_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(280) {
            self.index = (self.index + 1) % TYPING_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

/// The whole interface state: the chat list, the open conversation, the
/// intro choreography, and the single active script player. One generation
/// counter covers conversation playback; navigating anywhere invalidates
/// the running player, which then stops at its next checkpoint.
pub struct Model {
    view: View,
    rows: Vec<ChatEntry>,
    selected_row: usize,
    highlighted_row: Option<String>,
    active_entry: Option<ChatEntry>,
    active_thread: Option<ThreadTag>,
    messages: Vec<Message>,
    typing_visible: bool,
    status_message: String,
    clock: String,
    convo_authority: Authority,
    active_player: Option<Player>,
    played: PlaybackState,
    intro: Choreographer,
    spawner: Spawner,
    assets: Option<assets::Handle>,
    avatar_missing: HashSet<&'static str>,
    activator: Activator,
    widget_ready: bool,
    widget_pending: bool,
    speed: f64,
    tick_rate: Duration,
    theme: Theme,
    spinner: Spinner,
    needs_redraw: bool,
    pending_probe: Option<u64>,
    next_request_id: u64,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    widget_tx: Sender<Result<(), WidgetError>>,
    widget_rx: Receiver<Result<(), WidgetError>>,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let (widget_tx, widget_rx) = unbounded();
        let mut spawner = Spawner::new();
        let rows: Vec<ChatEntry> = (0..INITIAL_ROWS).map(|_| spawner.generate()).collect();

        let mut model = Self {
            view: View::List,
            rows,
            selected_row: 0,
            highlighted_row: None,
            active_entry: None,
            active_thread: None,
            messages: Vec::new(),
            typing_visible: false,
            status_message: String::new(),
            clock: clock_label(),
            convo_authority: Authority::new(),
            active_player: None,
            played: PlaybackState::default(),
            intro: Choreographer::new(opts.intro_timing, opts.speed),
            spawner,
            assets: opts.assets,
            avatar_missing: HashSet::new(),
            activator: opts.activator,
            widget_ready: false,
            widget_pending: false,
            speed: opts.speed,
            tick_rate: opts.tick_rate,
            theme: opts.theme,
            spinner: Spinner::new(),
            needs_redraw: true,
            pending_probe: None,
            next_request_id: 1,
            response_tx,
            response_rx,
            widget_tx,
            widget_rx,
        };

        // Asset locations are stable within a session, so the shared
        // photos are probed once up front.
        model.warm_probe(content::MARTISOR_GIF);
        model.warm_probe(content::CONCEPT_SKETCH);
        model.queue_avatar_probes();

        model.intro.start(Instant::now());
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = self.tick_rate;

        loop {
            if self.poll_async(Instant::now()) {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break;
                    }
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.tick(Instant::now());
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Timer checkpoint: the clock, the intro choreography, the active
    /// player, and the typing animation all advance here.
    fn tick(&mut self, now: Instant) {
        let clock = clock_label();
        if clock != self.clock {
            self.clock = clock;
            self.mark_dirty();
        }

        if self.intro.is_running() {
            let actions = self.intro.poll(&mut self.spawner, now);
            if !actions.is_empty() {
                self.apply_intro_actions(actions, now);
            }
        }

        if let Some(mut player) = self.active_player.take() {
            let actions = player.poll(&self.convo_authority, now);
            if !player.is_finished() {
                self.active_player = Some(player);
            }
            if !actions.is_empty() {
                self.apply_player_actions(actions, now);
            }
        }

        if self.typing_visible && self.spinner.advance() {
            self.mark_dirty();
        }
    }

    fn poll_async(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message, now);
            changed = true;
        }
        while let Ok(result) = self.widget_rx.try_recv() {
            self.on_widget(result);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse, now: Instant) {
        match message {
            AsyncResponse::Probe {
                request_id,
                key,
                path,
            } => {
                if self.pending_probe != Some(request_id) {
                    return;
                }
                self.pending_probe = None;
                let Some(mut player) = self.active_player.take() else {
                    return;
                };
                let actions = player.on_probe(&self.convo_authority, key, path, now);
                if !player.is_finished() {
                    self.active_player = Some(player);
                }
                self.apply_player_actions(actions, now);
                self.mark_dirty();
            }
            AsyncResponse::Avatar { path, ok } => {
                if !ok {
                    self.avatar_missing.insert(path);
                    self.mark_dirty();
                }
            }
        }
    }

    fn apply_intro_actions(&mut self, actions: Vec<IntroAction>, now: Instant) {
        for action in actions {
            match action {
                IntroAction::Prepend(entry) => {
                    self.rows.insert(0, entry);
                }
                IntroAction::Highlight(id) => {
                    if let Some(index) = self.rows.iter().position(|row| row.id == id) {
                        self.selected_row = index;
                    }
                    self.highlighted_row = Some(id);
                }
                IntroAction::Open(entry) => self.open_chat(entry, now),
            }
            self.mark_dirty();
        }
    }

    fn apply_player_actions(&mut self, actions: Vec<Action>, now: Instant) {
        for action in actions {
            match action {
                Action::SetThread(thread) => self.active_thread = Some(thread),
                Action::ShowTyping => {
                    self.typing_visible = true;
                    self.spinner.reset();
                }
                Action::HideTyping => self.typing_visible = false,
                Action::Append(message) => self.messages.push(message),
                Action::Probe(asset) => self.dispatch_probe(asset),
                Action::ActivateWidget => self.request_widget(),
                Action::Completed(thread) => self.played.mark_played(thread),
            }
            self.mark_dirty();
        }
    }

    /// Probe an asset for the active player. Without an asset resolver
    /// every photo renders its missing state.
    fn dispatch_probe(&mut self, asset: AssetRef) {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending_probe = Some(request_id);
        let tx = self.response_tx.clone();
        match &self.assets {
            Some(handle) => {
                let rx = handle.probe(asset);
                thread::spawn(move || {
                    if let Ok(resolution) = rx.recv() {
                        let _ = tx.send(AsyncResponse::Probe {
                            request_id,
                            key: resolution.key,
                            path: resolution.path,
                        });
                    }
                });
            }
            None => {
                let _ = tx.send(AsyncResponse::Probe {
                    request_id,
                    key: asset.key,
                    path: None,
                });
            }
        }
    }

    fn warm_probe(&self, asset: AssetRef) {
        let Some(handle) = &self.assets else {
            return;
        };
        let rx = handle.probe(asset);
        thread::spawn(move || {
            let _ = rx.recv();
        });
    }

    fn queue_avatar_probes(&self) {
        let Some(handle) = &self.assets else {
            return;
        };
        for path in content::all_avatars() {
            let rx = handle.probe_path(path);
            let tx = self.response_tx.clone();
            thread::spawn(move || {
                if let Ok(resolution) = rx.recv() {
                    let _ = tx.send(AsyncResponse::Avatar {
                        path: resolution.key,
                        ok: resolution.path.is_some(),
                    });
                }
            });
        }
    }

    fn request_widget(&mut self) {
        if self.widget_ready {
            self.activator.activate();
            self.activate_frames();
            return;
        }
        if self.widget_pending {
            return;
        }
        self.widget_pending = true;
        self.activator.request(self.widget_tx.clone());
    }

    fn on_widget(&mut self, result: Result<(), WidgetError>) {
        self.widget_pending = false;
        match result {
            Ok(()) => {
                self.widget_ready = true;
                self.activator.activate();
                self.activate_frames();
            }
            Err(err) => {
                // The frame still gets a source; it just never goes live.
                self.status_message = format!("RSVP widget: {err}");
                self.assign_deferred_frames();
            }
        }
        self.mark_dirty();
    }

    fn activate_frames(&mut self) {
        for message in &mut self.messages {
            if let Body::Embed(frame) = &mut message.body {
                frame.activate();
            }
        }
    }

    fn assign_deferred_frames(&mut self) {
        for message in &mut self.messages {
            if let Body::Embed(frame) = &mut message.body {
                frame.assign_deferred();
            }
        }
    }

    /// Entering a conversation supersedes everything in flight: the intro,
    /// the previous player, and any pending probe.
    fn open_chat(&mut self, entry: ChatEntry, now: Instant) {
        self.intro.stop();
        let token = self.convo_authority.invalidate();
        self.active_player = None;
        self.pending_probe = None;
        self.typing_visible = false;
        self.messages.clear();
        self.status_message.clear();
        self.active_thread = None;

        // Rows are immutable once created; opening only moves the selection.
        if let Some(index) = self.rows.iter().position(|row| row.id == entry.id) {
            self.selected_row = index;
        }
        self.highlighted_row = Some(entry.id.clone());
        self.view = View::Conversation;

        match content::script_for(entry.thread) {
            None => {
                self.active_thread = Some(entry.thread);
                self.messages.push(Message {
                    direction: Direction::Incoming,
                    body: Body::Text(content::random_preview().to_string()),
                });
            }
            Some(script) => {
                if self.played.is_played(entry.thread) {
                    self.active_thread = Some(entry.thread);
                    let assets = self.assets.clone();
                    let (messages, activate) = player::final_render(&script, |key| {
                        assets
                            .as_ref()
                            .and_then(|handle| handle.cached(key))
                            .flatten()
                    });
                    self.messages = messages;
                    if activate {
                        self.request_widget();
                    }
                } else {
                    let (player, actions) = Player::start(script, token, self.speed, now);
                    self.active_player = Some(player);
                    self.apply_player_actions(actions, now);
                }
            }
        }

        self.active_entry = Some(entry);
        self.mark_dirty();
    }

    fn close_chat(&mut self) {
        self.convo_authority.invalidate();
        self.active_player = None;
        self.pending_probe = None;
        self.typing_visible = false;
        self.active_entry = None;
        self.active_thread = None;
        self.status_message.clear();
        self.view = View::List;
        self.mark_dirty();
    }

    /// Back to the pristine state: fresh generic rows, no played flags,
    /// and the intro runs again from the top.
    fn reset_experience(&mut self, now: Instant) {
        self.intro.stop();
        self.convo_authority.invalidate();
        self.active_player = None;
        self.pending_probe = None;
        self.typing_visible = false;
        self.played.reset();
        self.messages.clear();
        self.active_entry = None;
        self.active_thread = None;
        self.highlighted_row = None;
        self.selected_row = 0;
        self.status_message.clear();
        self.view = View::List;
        self.rows = (0..INITIAL_ROWS).map(|_| self.spawner.generate()).collect();
        self.intro.start(now);
        self.mark_dirty();
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match self.view {
            View::List => match code {
                KeyCode::Char('q') => return true,
                KeyCode::Up | KeyCode::Char('k') => {
                    if self.selected_row > 0 {
                        self.selected_row -= 1;
                        self.mark_dirty();
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if self.selected_row + 1 < self.rows.len() {
                        self.selected_row += 1;
                        self.mark_dirty();
                    }
                }
                KeyCode::Enter => {
                    if let Some(entry) = self.rows.get(self.selected_row).cloned() {
                        self.open_chat(entry, Instant::now());
                    }
                }
                KeyCode::Char('r') => self.reset_experience(Instant::now()),
                _ => {}
            },
            View::Conversation => match code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('h') => self.close_chat(),
                KeyCode::Char('r') => self.reset_experience(Instant::now()),
                KeyCode::Char('o') => self.open_rsvp_page(),
                KeyCode::Char('y') => self.copy_rsvp_link(),
                _ => {}
            },
        }
        false
    }

    fn has_rsvp_target(&self) -> bool {
        self.messages.iter().any(|message| match &message.body {
            Body::Embed(_) => true,
            Body::Text(text) => markdown::render_inline(text)
                .links()
                .any(embed::is_popup_href),
            Body::Photo { .. } => false,
        })
    }

    fn open_rsvp_page(&mut self) {
        if !self.has_rsvp_target() {
            self.status_message = "No RSVP link in this conversation.".to_string();
            self.mark_dirty();
            return;
        }
        self.status_message = match webbrowser::open(&embed::form_page_url()) {
            Ok(()) => "Opening the RSVP form in your browser.".to_string(),
            Err(err) => format!("Failed to open browser: {err}"),
        };
        self.mark_dirty();
    }

    fn copy_rsvp_link(&mut self) {
        if !self.has_rsvp_target() {
            self.status_message = "No RSVP link in this conversation.".to_string();
            self.mark_dirty();
            return;
        }
        let result =
            Clipboard::new().and_then(|mut clipboard| clipboard.set_text(embed::form_page_url()));
        self.status_message = match result {
            Ok(()) => "RSVP link copied to clipboard.".to_string(),
            Err(err) => format!("Clipboard error: {err}"),
        };
        self.mark_dirty();
    }

    fn avatar_glyph(&self, entry: &ChatEntry) -> String {
        if self.avatar_missing.contains(entry.avatar) {
            return "◌".to_string();
        }
        entry
            .name
            .chars()
            .next()
            .map(|initial| initial.to_string())
            .unwrap_or_else(|| "·".to_string())
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(self.theme.bg)), full);

        let layout = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_header(frame, layout[0]);

        match self.view {
            View::List => self.draw_list(frame, layout[1]),
            View::Conversation => self.draw_conversation(frame, layout[1]),
        }

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(self.theme.text_secondary)
                    .bg(self.theme.panel_bg)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let title = match (&self.view, &self.active_entry) {
            (View::Conversation, Some(entry)) => {
                let presence = if self.typing_visible {
                    "typing…"
                } else {
                    "online"
                };
                format!(" {}  {}  ·  {presence}", self.avatar_glyph(entry), entry.name)
            }
            _ => " Mărțișor".to_string(),
        };
        let pad = (area.width as usize)
            .saturating_sub(UnicodeWidthStr::width(title.as_str()))
            .saturating_sub(UnicodeWidthStr::width(self.clock.as_str()) + 1);
        let line = Line::from(vec![
            Span::styled(
                title,
                Style::default()
                    .fg(self.theme.text_primary)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" ".repeat(pad)),
            Span::styled(
                self.clock.clone(),
                Style::default().fg(self.theme.text_secondary),
            ),
        ]);
        frame.render_widget(
            Paragraph::new(line).style(Style::default().bg(self.theme.header_bg)),
            area,
        );
    }

    fn draw_list(&self, frame: &mut Frame<'_>, area: Rect) {
        let width = area.width.saturating_sub(2) as usize;
        let items: Vec<ListItem<'static>> = self
            .rows
            .iter()
            .map(|entry| self.list_item(entry, width))
            .collect();
        let list = List::new(items)
            .style(Style::default().bg(self.theme.panel_bg))
            .highlight_style(Style::default().bg(self.theme.row_selected_bg));
        let mut state = ListState::default();
        if !self.rows.is_empty() {
            state.select(Some(self.selected_row.min(self.rows.len() - 1)));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn list_item(&self, entry: &ChatEntry, width: usize) -> ListItem<'static> {
        let glyph = self.avatar_glyph(entry);
        let name_style = if self.highlighted_row.as_deref() == Some(entry.id.as_str()) {
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(self.theme.text_primary)
                .add_modifier(Modifier::BOLD)
        };
        let name = format!(" {glyph}  {}", entry.name);
        let pad = width
            .saturating_sub(UnicodeWidthStr::width(name.as_str()))
            .saturating_sub(UnicodeWidthStr::width(entry.time.as_str()) + 1);
        let first = Line::from(vec![
            Span::styled(name, name_style),
            Span::raw(" ".repeat(pad)),
            Span::styled(
                entry.time.clone(),
                Style::default().fg(self.theme.text_secondary),
            ),
        ]);

        let preview = fit_width(&entry.preview, width.saturating_sub(10));
        let mut second = vec![Span::styled(
            format!("     {preview}"),
            Style::default().fg(self.theme.text_secondary),
        )];
        if !entry.badge.is_empty() {
            second.push(Span::raw("  "));
            second.push(Span::styled(
                format!(" {} ", entry.badge),
                Style::default()
                    .fg(self.theme.panel_bg)
                    .bg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ));
        }

        ListItem::new(vec![first, Line::from(second), Line::from(String::new())])
    }

    fn draw_conversation(&self, frame: &mut Frame<'_>, area: Rect) {
        let bubble_width = ((area.width as usize) * 3 / 4).max(16);
        let mut lines: Vec<Line<'static>> = Vec::new();
        for message in &self.messages {
            lines.extend(message_lines(message, bubble_width, &self.theme));
            lines.push(Line::from(String::new()));
        }
        if self.typing_visible {
            lines.push(Line::from(Span::styled(
                format!(" {} typing", self.spinner.frame()),
                Style::default()
                    .fg(self.theme.text_secondary)
                    .bg(self.theme.bubble_in)
                    .add_modifier(Modifier::ITALIC),
            )));
        }

        // Pinned to the newest message, like any chat surface.
        let skip = lines.len().saturating_sub(area.height as usize);
        let visible: Vec<Line<'static>> = lines.into_iter().skip(skip).collect();
        frame.render_widget(
            Paragraph::new(visible).style(Style::default().bg(self.theme.bg)),
            area,
        );
    }

    fn footer_text(&self) -> String {
        if !self.status_message.is_empty() {
            return self.status_message.clone();
        }
        match self.view {
            View::List => "↑/↓ select · Enter open · r replay intro · q quit".to_string(),
            View::Conversation => {
                let hints = "h/Esc back · o open RSVP · y copy link · r replay · q quit";
                match self.active_thread {
                    Some(tag) if tag != ThreadTag::Generic => {
                        format!("{} · {hints}", tag.label())
                    }
                    _ => hints.to_string(),
                }
            }
        }
    }
}

fn message_lines(message: &Message, width: usize, theme: &Theme) -> Vec<Line<'static>> {
    let (bubble_bg, alignment) = match message.direction {
        Direction::Incoming => (theme.bubble_in, Alignment::Left),
        Direction::Outgoing => (theme.bubble_out, Alignment::Right),
    };
    let mut lines = match &message.body {
        Body::Text(text) => wrap_inline(&markdown::render_inline(text), width, bubble_bg, theme),
        Body::Photo { path, caption } => {
            let label = match path {
                Some(path) => format!(
                    "🖼  {}",
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .unwrap_or("photo")
                ),
                None => "🖼  photo unavailable".to_string(),
            };
            let mut lines = vec![Line::from(Span::styled(
                label,
                Style::default()
                    .fg(theme.text_secondary)
                    .bg(bubble_bg)
                    .add_modifier(Modifier::ITALIC),
            ))];
            if !caption.is_empty() {
                for piece in wrap(caption, width) {
                    lines.push(Line::from(Span::styled(
                        piece.into_owned(),
                        Style::default().fg(theme.text_primary).bg(bubble_bg),
                    )));
                }
            }
            lines
        }
        Body::Embed(embed_frame) => {
            let status = match &embed_frame.src {
                Some(src) => fit_width(src, width),
                None => "loading form…".to_string(),
            };
            vec![
                Line::from(Span::styled(
                    embed_frame.title.clone(),
                    Style::default()
                        .fg(theme.accent)
                        .bg(bubble_bg)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    status,
                    Style::default().fg(theme.text_secondary).bg(bubble_bg),
                )),
            ]
        }
    };
    for line in &mut lines {
        line.alignment = Some(alignment);
    }
    lines
}

/// Greedy word wrap over styled fragments, so bold runs and links keep
/// their styling across line breaks.
fn wrap_inline(
    inline: &markdown::Inline,
    width: usize,
    bg: Color,
    theme: &Theme,
) -> Vec<Line<'static>> {
    let width = width.max(8);
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;

    for fragment in &inline.fragments {
        let style = fragment_style(fragment, bg, theme);
        for word in fragment.text.split_whitespace() {
            let word_width = UnicodeWidthStr::width(word);
            let needed = if current.is_empty() {
                word_width
            } else {
                word_width + 1
            };
            if !current.is_empty() && current_width + needed > width {
                lines.push(Line::from(std::mem::take(&mut current)));
                current_width = 0;
            }
            if !current.is_empty() {
                current.push(Span::styled(" ".to_string(), style));
                current_width += 1;
            }
            current.push(Span::styled(word.to_string(), style));
            current_width += word_width;
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    if lines.is_empty() {
        lines.push(Line::from(String::new()));
    }
    lines
}

fn fragment_style(fragment: &markdown::Fragment, bg: Color, theme: &Theme) -> Style {
    let mut style = Style::default().fg(theme.text_primary).bg(bg);
    if fragment.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if fragment.link.is_some() {
        style = style.fg(theme.link).add_modifier(Modifier::UNDERLINED);
    }
    style
}

fn fit_width(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn clock_label() -> String {
    chrono::Local::now()
        .format("%l:%M %p")
        .to_string()
        .trim_start()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::special;
    use crate::embed::{RuntimeStatus, SimulatedRuntime, WidgetRuntime};
    use std::sync::Arc;

    fn test_options() -> Options {
        let runtime = Arc::new(SimulatedRuntime::with_ready_after(Duration::ZERO));
        Options {
            tick_rate: Duration::from_millis(1),
            speed: 0.0,
            theme: Theme::default(),
            intro_timing: intro::Timing::default(),
            assets: None,
            activator: Activator::with_timing(
                runtime,
                Duration::from_millis(1),
                Duration::from_millis(500),
            ),
        }
    }

    fn pump(model: &mut Model, iterations: usize) {
        for _ in 0..iterations {
            let now = Instant::now();
            model.poll_async(now);
            model.tick(now);
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Pump until `done` holds, bounded so a regression fails instead of
    /// hanging.
    fn pump_until(model: &mut Model, done: impl Fn(&Model) -> bool) {
        for _ in 0..300 {
            if done(model) {
                return;
            }
            let now = Instant::now();
            model.poll_async(now);
            model.tick(now);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(done(model), "condition not reached while pumping");
    }

    #[test]
    fn intro_builds_the_list_and_opens_event_details() {
        let mut model = Model::new(test_options());
        assert_eq!(model.rows.len(), INITIAL_ROWS);
        assert!(model
            .rows
            .iter()
            .all(|row| row.thread == ThreadTag::Generic));

        pump_until(&mut model, |model| {
            model.played.event && model.active_player.is_none()
        });

        assert_eq!(model.rows.len(), INITIAL_ROWS + 5);
        let top: Vec<ThreadTag> = model.rows.iter().take(5).map(|row| row.thread).collect();
        assert_eq!(
            top,
            vec![
                ThreadTag::Event,
                ThreadTag::Art,
                ThreadTag::History,
                ThreadTag::Rsvp,
                ThreadTag::Generic,
            ]
        );
        assert_eq!(model.view, View::Conversation);
        assert_eq!(model.messages.len(), 7);
        assert!(!model.typing_visible);
        // Rows are immutable; the Event row keeps its unread badge.
        assert_eq!(model.rows[0].badge, "1");
    }

    #[test]
    fn leaving_mid_playback_cancels_and_restarts_from_the_top() {
        let mut model = Model::new(test_options());
        let now = Instant::now();
        let entry = special(ThreadTag::History).unwrap();
        model.open_chat(entry.clone(), now);
        pump_until(&mut model, |model| model.messages.len() >= 3);
        assert!(model.messages.len() < 8);

        model.close_chat();
        let before = model.messages.len();
        pump(&mut model, 20);
        assert_eq!(model.messages.len(), before);
        assert!(!model.played.history);

        // Reopening starts from message one, not where it left off.
        model.open_chat(entry, Instant::now());
        assert!(model.messages.len() <= 1);
        pump_until(&mut model, |model| model.played.history);
        assert_eq!(model.messages.len(), 8);
        assert!(model.active_player.is_none());
    }

    #[test]
    fn played_thread_rerenders_instantly() {
        let mut model = Model::new(test_options());
        let entry = special(ThreadTag::History).unwrap();
        model.open_chat(entry.clone(), Instant::now());
        pump_until(&mut model, |model| model.played.history);

        model.close_chat();
        model.open_chat(entry, Instant::now());
        assert_eq!(model.messages.len(), 8);
        assert!(model.active_player.is_none());
        assert!(!model.typing_visible);
    }

    #[test]
    fn rsvp_replays_on_every_visit() {
        let mut model = Model::new(test_options());
        let entry = special(ThreadTag::Rsvp).unwrap();
        model.open_chat(entry.clone(), Instant::now());
        assert!(model.active_player.is_some());
        pump_until(&mut model, |model| {
            model.messages.len() == 1 && model.active_player.is_none()
        });
        assert!(!model.played.is_played(ThreadTag::Rsvp));

        model.close_chat();
        model.open_chat(entry, Instant::now());
        assert!(model.active_player.is_some(), "rsvp never final-renders");
        pump_until(&mut model, |model| model.messages.len() == 1);
    }

    #[test]
    fn rsvp_embed_goes_live_once_the_widget_is_ready() {
        let runtime = Arc::new(SimulatedRuntime::with_ready_after(Duration::ZERO));
        let mut opts = test_options();
        opts.activator = Activator::with_timing(
            runtime.clone(),
            Duration::from_millis(1),
            Duration::from_millis(500),
        );
        let mut model = Model::new(opts);
        model.open_chat(special(ThreadTag::Rsvp).unwrap(), Instant::now());
        pump_until(&mut model, |model| {
            model.messages.iter().any(|message| match &message.body {
                Body::Embed(frame) => frame.live,
                _ => false,
            })
        });
        assert!(runtime.activations() >= 1);
    }

    #[test]
    fn unavailable_widget_falls_back_to_the_deferred_source() {
        struct Stuck;
        impl WidgetRuntime for Stuck {
            fn status(&self) -> RuntimeStatus {
                RuntimeStatus::Loading
            }
            fn begin_load(&self) {}
            fn activate(&self) {}
        }

        let mut opts = test_options();
        opts.activator = Activator::with_timing(
            Arc::new(Stuck),
            Duration::from_millis(2),
            Duration::from_millis(10),
        );
        let mut model = Model::new(opts);
        model.open_chat(special(ThreadTag::Rsvp).unwrap(), Instant::now());
        pump_until(&mut model, |model| {
            model.messages.iter().any(|message| match &message.body {
                Body::Embed(frame) => frame.src.is_some() && !frame.live,
                _ => false,
            })
        });
        assert!(!model.status_message.is_empty());
    }

    #[test]
    fn reset_clears_flags_and_replays_the_intro() {
        let mut model = Model::new(test_options());
        let entry = special(ThreadTag::Event).unwrap();
        model.open_chat(entry, Instant::now());
        pump_until(&mut model, |model| model.messages.len() >= 2);

        model.reset_experience(Instant::now());
        assert_eq!(model.view, View::List);
        assert_eq!(model.played, PlaybackState::default());
        assert_eq!(model.rows.len(), INITIAL_ROWS);
        assert!(model
            .rows
            .iter()
            .all(|row| row.thread == ThreadTag::Generic));
        assert!(model.active_player.is_none());
        assert!(model.intro.is_running());

        pump_until(&mut model, |model| model.view == View::Conversation);
        assert_eq!(model.rows.len(), INITIAL_ROWS + 5);
    }

    #[test]
    fn generic_threads_show_one_greeting() {
        let mut model = Model::new(test_options());
        let entry = model.rows[0].clone();
        assert_eq!(entry.badge, "99+");
        model.open_chat(entry, Instant::now());
        assert_eq!(model.messages.len(), 1);
        assert_eq!(model.messages[0].direction, Direction::Incoming);
        assert!(model.active_player.is_none());
        // Opening never mutates the row; the badge survives the visit.
        assert_eq!(model.rows[0].badge, "99+");
    }

    #[test]
    fn art_skips_the_optional_scan_without_assets() {
        let mut model = Model::new(test_options());
        model.open_chat(special(ThreadTag::Art).unwrap(), Instant::now());
        pump_until(&mut model, |model| model.played.art);
        assert_eq!(model.messages.len(), 4);
        assert!(matches!(
            model.messages[0].body,
            Body::Photo { path: None, .. }
        ));
    }

    #[test]
    fn footer_names_the_active_scripted_thread() {
        let mut model = Model::new(test_options());
        model.open_chat(special(ThreadTag::History).unwrap(), Instant::now());
        assert_eq!(model.active_thread, Some(ThreadTag::History));
        assert!(model.footer_text().starts_with("history"));

        model.close_chat();
        assert_eq!(model.active_thread, None);

        let generic = model.rows[0].clone();
        model.open_chat(generic, Instant::now());
        assert_eq!(model.active_thread, Some(ThreadTag::Generic));
        assert!(model.footer_text().starts_with("h/Esc"));
    }

    #[test]
    fn theme_names_resolve_to_distinct_palettes() {
        let light = Theme::named("light");
        assert_ne!(light, Theme::default());
        assert_eq!(Theme::named("default"), Theme::default());
        assert_eq!(Theme::named("no-such-theme"), Theme::default());
    }
}
