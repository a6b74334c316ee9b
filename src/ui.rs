//! TUI module using ratatui.
//!
//! A list of stored summaries with a detail pane. The view only reads the
//! store and redraws when the store reports a change.

use crate::agent::SummarizerClient;
use crate::config::ConfigSource;
use crate::storage::{ClearMode, StoreEvent, SummaryStore};
use crate::summary::SummaryRecord;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{DefaultTerminal, Frame};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HELP: &str = "a add · c clear · t test connection · r reload config · j/k move · q quit";

struct App {
    list: ListState,
    status: String,
    quit: bool,
}

impl App {
    fn new(len: usize) -> Self {
        let selected = (len > 0).then_some(0);
        Self {
            list: ListState::default().with_selected(selected),
            status: HELP.to_string(),
            quit: false,
        }
    }

    /// Apply pending store events to the view state
    fn drain(&mut self, events: &mut Receiver<StoreEvent>, len: usize) {
        loop {
            match events.try_recv() {
                Ok(StoreEvent::Added { id }) => {
                    self.list.select(Some(0));
                    self.status = format!("Added summary {}", id);
                }
                Ok(StoreEvent::Cleared { remaining }) => {
                    self.list.select((remaining > 0).then_some(0));
                    self.status = "Summaries cleared".to_string();
                }
                Ok(StoreEvent::PersistFailed { message }) => {
                    self.status = format!("Warning: {}", message);
                }
                Err(TryRecvError::Lagged(_)) => {
                    self.list.select((len > 0).then_some(0));
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

/// Run the browser until the user quits
pub async fn run(store: &mut SummaryStore<SummarizerClient>, source: &ConfigSource) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, store, source).await;
    ratatui::restore();
    result
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    store: &mut SummaryStore<SummarizerClient>,
    source: &ConfigSource,
) -> anyhow::Result<()> {
    let mut events = store.subscribe();
    let mut app = App::new(store.len());

    while !app.quit {
        app.drain(&mut events, store.len());
        terminal.draw(|frame| draw(frame, store.records(), &mut app))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => app.quit = true,
            KeyCode::Down | KeyCode::Char('j') => app.list.select_next(),
            KeyCode::Up | KeyCode::Char('k') => app.list.select_previous(),
            KeyCode::Char('a') => add_from_editor(terminal, store, &mut app).await?,
            KeyCode::Char('c') => store.clear_all(ClearMode::Welcome).await,
            KeyCode::Char('t') => {
                app.status = "Testing connection...".to_string();
                terminal.draw(|frame| draw(frame, store.records(), &mut app))?;
                app.status = store.summarizer().test_connection().await.message;
            }
            KeyCode::Char('r') => app.status = reload(store, source),
            _ => {}
        }
    }

    Ok(())
}

/// Re-read the config the session started from and hand it to the summarizer
fn reload(store: &SummaryStore<SummarizerClient>, source: &ConfigSource) -> String {
    match source.load() {
        Ok(config) => {
            let provider = config.summarizer.provider;
            store.summarizer().reconfigure(config.summarizer);
            format!("Configuration reloaded (provider: {})", provider)
        }
        Err(e) => format!("Could not reload configuration: {}", e),
    }
}

/// Leave the alternate screen, let the user compose text in $EDITOR, and summarize it
async fn add_from_editor(
    terminal: &mut DefaultTerminal,
    store: &mut SummaryStore<SummarizerClient>,
    app: &mut App,
) -> anyhow::Result<()> {
    ratatui::restore();
    let edited = edit::edit("");
    *terminal = ratatui::init();
    terminal.clear()?;

    let text = match edited {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            app.status = "Nothing to summarize".to_string();
            return Ok(());
        }
        Err(e) => {
            app.status = format!("Editor failed: {}", e);
            return Ok(());
        }
    };

    app.status = "Summarizing...".to_string();
    terminal.draw(|frame| draw(frame, store.records(), app))?;

    if let Err(e) = store.add(&text, Some("editor")).await {
        app.status = e.to_string();
    }
    Ok(())
}

fn draw(frame: &mut Frame, records: &[SummaryRecord], app: &mut App) {
    let [main, footer] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(main);

    let now = Utc::now();
    let items: Vec<ListItem> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} Summary {}  ", record.size_class().marker(), i + 1)),
                Span::styled(
                    record.description(now),
                    Style::default().add_modifier(Modifier::DIM),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::bordered().title(format!(" Summaries ({}) ", records.len())))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.list);

    let detail = match app.list.selected().and_then(|i| records.get(i)) {
        Some(record) => detail_text(record),
        None => Text::from("No summaries yet. Press `a` to add one."),
    };
    frame.render_widget(
        Paragraph::new(detail)
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(" Details ")),
        detail_area,
    );

    frame.render_widget(
        Paragraph::new(app.status.as_str()).style(Style::default().add_modifier(Modifier::DIM)),
        footer,
    );
}

fn detail_text(record: &SummaryRecord) -> Text<'static> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::styled("Summary", bold),
        Line::raw(record.summary_text().to_string()),
        Line::raw(""),
    ];
    for (label, value) in record.details().into_iter().skip(1) {
        lines.push(Line::from(vec![
            Span::styled(format!("{}: ", label), bold),
            Span::raw(value),
        ]));
    }
    lines.push(Line::raw(""));
    lines.push(Line::styled("Original Text", bold));
    lines.push(Line::raw(record.original_text().to_string()));
    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Provider};
    use tempfile::TempDir;

    #[tokio::test]
    async fn reload_uses_the_session_config_file_and_override() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("session.toml");
        std::fs::write(&config_path, "[summarizer]\nprovider = \"ollama\"\nmax_summary_length = 3\n").unwrap();

        let source = ConfigSource::new(Some(config_path.clone()), Some(Provider::Mock));
        let client = SummarizerClient::new(&source.load().unwrap()).unwrap();
        let store = SummaryStore::open(temp.path().join("summaries.json"), client).await;

        std::fs::write(&config_path, "[summarizer]\nprovider = \"openai\"\nmax_summary_length = 6\n").unwrap();
        let status = reload(&store, &source);

        assert_eq!(status, "Configuration reloaded (provider: mock)");
        let settings = store.summarizer().settings();
        assert_eq!(settings.provider, Provider::Mock);
        assert_eq!(settings.max_summary_length, 6);
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_settings() {
        let temp = TempDir::new().unwrap();
        let client = SummarizerClient::new(&Config::default()).unwrap();
        let before = client.settings();
        let store = SummaryStore::open(temp.path().join("summaries.json"), client).await;

        let source = ConfigSource::new(Some(temp.path().join("gone.toml")), None);
        let status = reload(&store, &source);

        assert!(status.starts_with("Could not reload configuration"));
        assert_eq!(store.summarizer().settings(), before);
    }
}
