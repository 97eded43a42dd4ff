use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

use anyhow::Result;
use arboard::Clipboard;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::*;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::input::InputBuffer;
use crate::launch::{Launcher, Notice};
use crate::locate::Locator;
use crate::store::{NetworkElement, Store};
use crate::terminal::Terminal;
use crate::username::{UsernameResolver, UsernameSource};

const INFO_TEXT_SEARCH: &str = "(Enter) search | (Tab) username | (Esc) quit";
const INFO_TEXT_USERNAME: &str =
    "(Enter) apply | (Ctrl+r) reset to detected | (Tab) results | (Esc) back";
const INFO_TEXT_RESULTS: &str =
    "(Enter) login | (c) copy ssh command | (o) open logs | (/) search | (Esc) quit";
const INFO_TEXT_PROMPT: &str = "(Enter) confirm | (Esc) cancel";

const USERNAME_PROMPT: &str = "SSH username: ";

enum Focus {
    Search,
    Username,
    Results,
}

// which action to resume once the username prompt is answered
enum PendingAction {
    Copy(usize),
    Login(usize),
}

#[derive(Clone, Copy)]
enum Severity {
    Info,
    Warn,
    Error,
}

pub struct App {
    config: Config,
    store: Store,
    resolver: UsernameResolver,
    launcher: Launcher,
    search: InputBuffer,
    username: InputBuffer,
    results: Vec<NetworkElement>,
    table: TableState,
    longest_name: u16,
    focus: Focus,
    prompt: Option<(InputBuffer, PendingAction)>,
    status: Option<(String, Severity)>,
    notice_tx: Sender<Notice>,
    notice_rx: Receiver<Notice>,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.db_path)?;
        let resolver = UsernameResolver::new(config.settings_path.clone());
        let launcher = Launcher::new(Locator::new(&config), config.log_dir.clone());

        // seed the field with whatever resolves without user input
        let initial_user = resolver
            .resolve(None)
            .map(|(name, _)| name)
            .unwrap_or_default();

        let (notice_tx, notice_rx) = channel();

        Ok(Self {
            config,
            store,
            resolver,
            launcher,
            search: InputBuffer::new(String::new()),
            username: InputBuffer::with_value(String::new(), initial_user),
            results: Vec::new(),
            table: TableState::default(),
            longest_name: 0,
            focus: Focus::Search,
            prompt: None,
            status: None,
            notice_tx,
            notice_rx,
            should_quit: false,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = Terminal::new()?;
        while !self.should_quit {
            self.draw(&mut terminal)?;
            self.drain_notices();
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self, terminal: &mut Terminal<impl Write>) -> Result<()> {
        terminal.draw(|frame| {
            self.ui(frame);
        })?;
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        use event::KeyCode::*;

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == Char('c') {
            self.should_quit = true;
            return;
        }

        // the username prompt overlay captures everything while open
        if self.prompt.is_some() {
            self.handle_prompt_key(key);
            return;
        }

        match self.focus {
            Focus::Search => match key.code {
                Esc => self.should_quit = true,
                Tab => self.focus = Focus::Username,
                Enter => self.run_search(),
                Down => {
                    if !self.results.is_empty() {
                        self.focus = Focus::Results;
                        self.table.select(Some(0));
                    }
                }
                _ => self.search.handle_event(Event::Key(key)),
            },
            Focus::Username => match key.code {
                Esc => self.focus = Focus::Search,
                Tab => self.focus = Focus::Results,
                Enter => self.apply_username(),
                Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.reset_username()
                }
                _ => self.username.handle_event(Event::Key(key)),
            },
            Focus::Results => match key.code {
                Esc => self.should_quit = true,
                Tab | Char('/') => self.focus = Focus::Search,
                Up => self.up(),
                Down => self.down(),
                Enter => self.login_selected(),
                Char('c') => self.copy_selected(),
                Char('o') => self.open_logs(),
                Char('u') => self.focus = Focus::Username,
                _ => {}
            },
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        use event::KeyCode::*;

        match key.code {
            Esc => {
                self.prompt = None;
                self.report(
                    "username required: no SSH username detected or provided",
                    Severity::Error,
                );
            }
            Enter => {
                let Some((input, action)) = self.prompt.take() else {
                    return;
                };
                let value = input.input.value().trim().to_string();
                if value.is_empty() {
                    self.report(
                        "username required: no SSH username detected or provided",
                        Severity::Error,
                    );
                    return;
                }
                self.resolver.persist(&value);
                self.username.set_value(value.clone());
                match action {
                    PendingAction::Copy(idx) => self.copy_command(idx, &value),
                    PendingAction::Login(idx) => self.launch(idx, &value),
                }
            }
            _ => {
                if let Some((input, _)) = self.prompt.as_mut() {
                    input.handle_event(Event::Key(key));
                }
            }
        }
    }

    fn run_search(&mut self) {
        let term = self.search.input.value().trim().to_string();
        match self.store.search(&term) {
            Ok(results) => {
                self.longest_name = results
                    .iter()
                    .map(|e| UnicodeWidthStr::width(e.name.as_str()))
                    .max()
                    .unwrap_or(0) as u16;
                self.table = TableState::default()
                    .with_selected((!results.is_empty()).then_some(0));
                if results.is_empty() {
                    self.status = (!term.is_empty())
                        .then(|| ("no results".to_string(), Severity::Info));
                } else {
                    self.focus = Focus::Results;
                    self.report(format!("{} result(s)", results.len()), Severity::Info);
                }
                self.results = results;
            }
            Err(e) => self.report(format!("database query failed: {e:#}"), Severity::Error),
        }
    }

    /// Resolves the username for an action, opening the one-shot prompt if
    /// nothing resolves. Returns `None` while the prompt is pending.
    fn resolved_username(&mut self, action: PendingAction) -> Option<String> {
        let field = self.username.input.value().to_string();
        if let Some((name, source)) = self.resolver.resolve(Some(field.as_str())) {
            if source != UsernameSource::UiField {
                self.username.set_value(name.clone());
            }
            return Some(name);
        }

        self.prompt = Some((InputBuffer::new(USERNAME_PROMPT.to_string()), action));
        None
    }

    fn copy_selected(&mut self) {
        let Some(idx) = self.table.selected() else {
            return;
        };
        if let Some(user) = self.resolved_username(PendingAction::Copy(idx)) {
            self.copy_command(idx, &user);
        }
    }

    fn copy_command(&mut self, idx: usize, user: &str) {
        let Some(element) = self.results.get(idx) else {
            return;
        };
        let command = format!("ssh {}@{}", user, element.ip);
        match Clipboard::new().and_then(|mut clipboard| clipboard.set_text(command.clone())) {
            Ok(()) => self.report(format!("copied: {command}"), Severity::Info),
            Err(e) => self.report(format!("clipboard failure: {e}"), Severity::Error),
        }
    }

    fn login_selected(&mut self) {
        let Some(idx) = self.table.selected() else {
            return;
        };
        if let Some(user) = self.resolved_username(PendingAction::Login(idx)) {
            self.launch(idx, &user);
        }
    }

    fn launch(&mut self, idx: usize, user: &str) {
        let Some(element) = self.results.get(idx) else {
            return;
        };
        match self.launcher.login(
            user,
            &element.name,
            &element.ip,
            self.notice_tx.clone(),
        ) {
            Ok(session) => {
                let client = session
                    .client
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| session.client.display().to_string());
                self.report(
                    format!("launched {client}, logging to {}", session.log_path.display()),
                    Severity::Info,
                );
            }
            Err(e) => self.report(format!("{e:#}"), Severity::Error),
        }
    }

    fn apply_username(&mut self) {
        let value = self.username.input.value().trim().to_string();
        if value.is_empty() {
            self.report("please enter a valid SSH username", Severity::Error);
            return;
        }
        self.resolver.persist(&value);
        self.report(format!("SSH username set to {value}"), Severity::Info);
    }

    fn reset_username(&mut self) {
        match self.resolver.detect() {
            Some(detected) => {
                self.resolver.persist(&detected);
                self.username.set_value(detected.clone());
                self.report(
                    format!("SSH username reset to {detected}"),
                    Severity::Info,
                );
            }
            None => {
                self.username.set_value(String::new());
                self.report(
                    "could not auto-detect a username; enter one manually",
                    Severity::Warn,
                );
            }
        }
    }

    fn open_logs(&mut self) {
        let dir = self.config.log_dir.clone();
        let open = fs::create_dir_all(&dir)
            .map_err(anyhow::Error::from)
            .and_then(|()| open_file_browser(&dir));
        match open {
            Ok(()) => self.report(format!("opened {}", dir.display()), Severity::Info),
            Err(e) => self.report(format!("failed to open logs folder: {e}"), Severity::Error),
        }
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notice_rx.try_recv() {
            match notice {
                Notice::SessionLogEmpty(path) => {
                    let file = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    self.report(
                        format!(
                            "{file} was not created or is still empty; the session may have \
                             closed before login, or the client is too old for command-line \
                             session logging (PuTTY 0.76+)"
                        ),
                        Severity::Warn,
                    );
                }
            }
        }
    }

    fn report(&mut self, text: impl Into<String>, severity: Severity) {
        self.status = Some((text.into(), severity));
    }

    fn up(&mut self) {
        if self.results.is_empty() {
            return;
        }
        let i = match self.table.selected() {
            Some(0) | None => self.results.len() - 1,
            Some(i) => i - 1,
        };
        self.table.select(Some(i));
    }

    fn down(&mut self) {
        if self.results.is_empty() {
            return;
        }
        let i = match self.table.selected() {
            Some(i) if i + 1 >= self.results.len() => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.table.select(Some(i));
    }

    fn ui(&mut self, f: &mut Frame) {
        let recs = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.size());

        let focus_style = |focused: bool| {
            if focused {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            }
        };

        let search = Paragraph::new(self.search.input.value()).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Search")
                .border_style(focus_style(matches!(self.focus, Focus::Search))),
        );
        f.render_widget(search, recs[0]);

        let username = Paragraph::new(self.username.input.value()).block(
            Block::default()
                .borders(Borders::ALL)
                .title("SSH Username")
                .border_style(focus_style(matches!(self.focus, Focus::Username))),
        );
        f.render_widget(username, recs[1]);

        let header = Row::new(vec![
            Cell::from("Name").style(Style::default().add_modifier(Modifier::UNDERLINED)),
            Cell::from("IP").style(Style::default().add_modifier(Modifier::UNDERLINED)),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD));

        let term = self.search.input.value().trim().to_string();
        let rows: Vec<Row> = self
            .results
            .iter()
            .map(|element| {
                Row::new(vec![
                    Text::from(Line::from(highlight_spans(&element.name, &term))),
                    Text::from(element.ip.clone()),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(self.longest_name + 1),
                Constraint::Min(15),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Results ({})", self.results.len()))
                .border_style(focus_style(matches!(self.focus, Focus::Results))),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_spacing(HighlightSpacing::Always);
        StatefulWidget::render(table, recs[2], f.buffer_mut(), &mut self.table);

        if let Some((text, severity)) = &self.status {
            let style = match severity {
                Severity::Info => Style::default().fg(Color::Green),
                Severity::Warn => Style::default().fg(Color::Yellow),
                Severity::Error => Style::default().fg(Color::Red),
            };
            f.render_widget(Paragraph::new(text.as_str()).style(style), recs[3]);
        }

        let info = if self.prompt.is_some() {
            INFO_TEXT_PROMPT
        } else {
            match self.focus {
                Focus::Search => INFO_TEXT_SEARCH,
                Focus::Username => INFO_TEXT_USERNAME,
                Focus::Results => INFO_TEXT_RESULTS,
            }
        };
        f.render_widget(Paragraph::new(Line::from(info)).centered(), recs[4]);

        if let Some((input, _)) = &self.prompt {
            let area = centered_rect(50, 3, f.size());
            f.render_widget(Clear, area);
            let prompt = Paragraph::new(input.value()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Username required"),
            );
            f.render_widget(prompt, area);
            f.set_cursor(area.x + 1 + input.visual_cursor() as u16, area.y + 1);
        } else {
            match self.focus {
                Focus::Search => f.set_cursor(
                    recs[0].x + 1 + self.search.visual_cursor() as u16,
                    recs[0].y + 1,
                ),
                Focus::Username => f.set_cursor(
                    recs[1].x + 1 + self.username.visual_cursor() as u16,
                    recs[1].y + 1,
                ),
                Focus::Results => {}
            }
        }
    }
}

// case-insensitive substring occurrences of the search term, highlighted
fn highlight_spans<'b>(text: &str, term: &str) -> Vec<Span<'b>> {
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = term.chars().collect();
    if needle.is_empty() || needle.len() > chars.len() {
        return vec![Span::raw(text.to_string())];
    }

    let mut highlighted = vec![false; chars.len()];
    for start in 0..=chars.len() - needle.len() {
        let hit = chars[start..start + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b));
        if hit {
            for flag in &mut highlighted[start..start + needle.len()] {
                *flag = true;
            }
        }
    }

    let highlight_style = Style::default()
        .fg(Color::Black)
        .bg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    let mut spans = Vec::new();
    let mut segment = String::new();
    let mut segment_highlighted = false;
    for (c, &hit) in chars.iter().zip(&highlighted) {
        if hit != segment_highlighted && !segment.is_empty() {
            spans.push(styled_segment(&mut segment, segment_highlighted, highlight_style));
        }
        segment_highlighted = hit;
        segment.push(*c);
    }
    if !segment.is_empty() {
        spans.push(styled_segment(&mut segment, segment_highlighted, highlight_style));
    }
    spans
}

fn styled_segment<'b>(segment: &mut String, highlighted: bool, style: Style) -> Span<'b> {
    let content = std::mem::take(segment);
    if highlighted {
        Span::styled(content, style)
    } else {
        Span::raw(content)
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

#[cfg(target_os = "windows")]
fn open_file_browser(dir: &Path) -> Result<()> {
    Command::new("explorer").arg(dir).spawn()?;
    Ok(())
}

#[cfg(target_os = "macos")]
fn open_file_browser(dir: &Path) -> Result<()> {
    Command::new("open").arg(dir).spawn()?;
    Ok(())
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn open_file_browser(dir: &Path) -> Result<()> {
    Command::new("xdg-open").arg(dir).spawn()?;
    Ok(())
}
