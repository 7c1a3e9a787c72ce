// src/tui.rs
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
    Terminal,
};
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::io;
use std::time::Duration;

use crate::api::ChatBackend;
use crate::app::App;
use crate::command::{self, Command, HELP};
use crate::session::{Message, Role};
use crate::state::{Action, ChatState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    notice: Option<String>,
}

impl Tui {
    pub fn new() -> io::Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal, notice: None })
    }

    pub async fn run_loop<B: ChatBackend>(&mut self, app: &mut App<B>) -> anyhow::Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        enter_screen(&mut io::stdout(), crossterm::terminal::disable_raw_mode)?;
        log::info!("TUI run loop started.");

        let result = self.event_loop(app).await;

        crossterm::terminal::disable_raw_mode()?;
        crossterm::execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::event::DisableBracketedPaste
        )?;
        self.terminal.show_cursor()?;
        result
    }

    async fn event_loop<B: ChatBackend>(&mut self, app: &mut App<B>) -> anyhow::Result<()> {
        loop {
            app.drain_events();
            let notice = self.notice.clone();
            let in_flight = app.in_flight();
            self.terminal.draw(|f| draw(f, &app.state, in_flight, notice.as_deref()))?;

            if event::poll(Duration::from_millis(100))? {
                let flow = match event::read()? {
                    CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(app, key),
                    CrosstermEvent::Paste(text) => {
                        self.handle_paste(app, &text);
                        Flow::Continue
                    }
                    _ => Flow::Continue,
                };
                if flow == Flow::Quit {
                    log::info!("Quit requested, exiting TUI loop.");
                    return Ok(());
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn handle_key<B: ChatBackend>(&mut self, app: &mut App<B>, key: KeyEvent) -> Flow {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => return Flow::Quit,
            KeyCode::Char('r') if ctrl => app.dispatch(Action::RunAnalysis),
            KeyCode::Esc => {
                if app.state.selected_tool.is_some() {
                    app.dispatch(Action::ClearTool);
                }
                self.notice = None;
            }
            KeyCode::Enter => return self.submit_line(app),
            KeyCode::Backspace => {
                let mut input = app.state.input.clone();
                input.pop();
                app.dispatch(Action::SetInput(input));
            }
            KeyCode::Char(c) if !ctrl => {
                let mut input = app.state.input.clone();
                input.push(c);
                app.dispatch(Action::SetInput(input));
            }
            _ => {}
        }
        Flow::Continue
    }

    fn submit_line<B: ChatBackend>(&mut self, app: &mut App<B>) -> Flow {
        self.notice = None;
        let line = app.state.input.clone();
        let parsed = match command::parse(&line) {
            Ok(Command::Submit(_)) => {
                app.dispatch(Action::Submit);
                return Flow::Continue;
            }
            other => other,
        };
        app.dispatch(Action::SetInput(String::new()));
        match parsed {
            Ok(Command::Quit) => return Flow::Quit,
            Ok(Command::Help) => self.notice = Some(HELP.to_string()),
            Ok(cmd) => match command::resolve(cmd, &app.state) {
                Ok(actions) => actions.into_iter().for_each(|a| app.dispatch(a)),
                Err(e) => self.notice = Some(e.to_string()),
            },
            Err(e) => self.notice = Some(e.to_string()),
        }
        Flow::Continue
    }

    fn handle_paste<B: ChatBackend>(&mut self, app: &mut App<B>, text: &str) {
        if app.state.selected_tool.is_some() {
            app.dispatch(Action::DragEnter);
        }
        match command::paste_to_action(text, &app.state) {
            Some(action) => app.dispatch(action),
            None => {
                if app.state.is_dragging {
                    app.dispatch(Action::DragLeave);
                }
                let mut input = app.state.input.clone();
                input.push_str(&text.replace(['\r', '\n'], " "));
                app.dispatch(Action::SetInput(input));
            }
        }
    }
}

/// Switches to the alternate screen with bracketed paste. Raw mode is already
/// on, so a failure here turns it back off before returning.
fn enter_screen(out: &mut impl io::Write, disable_raw: impl FnOnce() -> io::Result<()>) -> io::Result<()> {
    let entered = crossterm::execute!(
        out,
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableBracketedPaste
    );
    if let Err(e) = entered {
        if let Err(restore) = disable_raw() {
            log::warn!("Failed to leave raw mode: {}", restore);
        }
        return Err(e);
    }
    Ok(())
}

fn draw(f: &mut Frame, state: &ChatState, in_flight: usize, notice: Option<&str>) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .margin(1)
        .constraints([Constraint::Min(40), Constraint::Length(36)])
        .split(f.area());

    let footer_height = if state.selected_tool.is_some() { 7 } else { 3 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(footer_height), Constraint::Length(1)])
        .split(columns[0]);

    draw_messages(f, state, rows[0]);
    draw_footer(f, state, rows[1]);

    let status = match notice {
        Some(text) => Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Yellow))),
        None if in_flight > 0 => Line::from(format!("{} request(s) in flight | /help for commands", in_flight)),
        None => Line::from("Enter to send | /help for commands | Ctrl+Q to quit"),
    };
    f.render_widget(Paragraph::new(status), rows[2]);

    draw_sources(f, state, columns[1]);
}

fn draw_messages(f: &mut Frame, state: &ChatState, area: Rect) {
    let paragraph = Paragraph::new(message_lines(&state.messages)).wrap(Wrap { trim: false });
    // Offset in wrapped rows so the newest reply stays in view.
    let rows = paragraph.line_count(area.width.saturating_sub(2));
    let visible = area.height.saturating_sub(2) as usize;
    let offset = u16::try_from(rows.saturating_sub(visible)).unwrap_or(u16::MAX);
    let paragraph = paragraph
        .block(Block::default().borders(Borders::ALL).title("Medical assistant"))
        .scroll((offset, 0));
    f.render_widget(paragraph, area);
}

fn draw_footer(f: &mut Frame, state: &ChatState, area: Rect) {
    let mut lines = Vec::new();
    if let Some(tool) = &state.selected_tool {
        let drop_hint = if state.is_dragging { "Release to drop" } else { "Drop or /file your" };
        lines.push(Line::from(format!("{} {} here. Supported format: {}", drop_hint, tool.input_major_type(), tool.input_type)));
        match &state.attachment {
            Some(a) => {
                let kind = if state.preview().is_some() { "Preview ready" } else { "Attached" };
                lines.push(Line::from(format!("{}: {} ({})  Ctrl+R to run analysis", kind, a.name, a.mime)));
            }
            None => lines.push(Line::from("No file attached.")),
        }
        if state.is_uploading {
            lines.push(Line::from(Span::styled("Uploading...", Style::default().fg(Color::Cyan))));
        }
        if let Some(err) = &state.upload_error {
            lines.push(Line::from(Span::styled(format!("! {}", err), Style::default().fg(Color::Red))));
        }
    }
    lines.push(Line::from(vec![Span::styled("> ", Style::default().add_modifier(Modifier::BOLD)), Span::raw(state.input.clone())]));

    let title = match &state.selected_tool {
        Some(tool) => format!("Upload for {} (Esc to cancel)", tool.name),
        None => "Describe your medical query".to_string(),
    };
    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_sources(f: &mut Frame, state: &ChatState, area: Rect) {
    let mut lines = Vec::new();
    if state.sources.is_empty() {
        lines.push(Line::from(Span::styled("/source add URL [description]", Style::default().fg(Color::DarkGray))));
    }
    for (i, source) in state.sources.iter().enumerate() {
        lines.push(Line::from(Span::styled(format!("{}. {}", i + 1, source.url), Style::default().fg(Color::Cyan))));
        lines.push(Line::from(format!("   {}", source.description)));
    }
    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("My trusted sources"))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn message_lines(messages: &[Message]) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for msg in messages {
        let (label, color) = match msg.role {
            Role::User => ("You", Color::Green),
            Role::Assistant => ("Assistant", Color::Blue),
        };
        let label = Span::styled(
            format!("[{}] {}: ", msg.timestamp.format("%H:%M"), label),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        );

        if let Some(thinking) = &msg.thinking {
            let progress = if thinking.steps.is_empty() { "thinking...".to_string() } else { thinking.steps.join(" > ") };
            lines.push(Line::from(vec![label, Span::styled(progress, Style::default().add_modifier(Modifier::ITALIC))]));
            continue;
        }

        lines.push(Line::from(vec![label, Span::raw(msg.content.clone())]));
        if let Some(tools) = &msg.tools {
            for (i, tool) in tools.iter().enumerate() {
                let r = &tool.ratings;
                let verified = if r.verified == Some(true) { " verified" } else { "" };
                lines.push(Line::from(format!(
                    "  [{}] {} (needs {}) {:.1} stars, {} downloads, {:.0}% accuracy, updated {}{}",
                    i + 1,
                    tool.name,
                    tool.input_major_type(),
                    r.stars,
                    r.downloads,
                    r.accuracy * 100.0,
                    r.last_update,
                    verified
                )));
                lines.push(Line::from(format!("      {}", tool.description)));
            }
            lines.push(Line::from(Span::styled("  /tool N to select", Style::default().fg(Color::DarkGray))));
        }
        if let Some(sources) = &msg.sources {
            for source in sources {
                lines.push(Line::from(format!("  - {}: {}", source.title, source.info)));
                lines.push(Line::from(Span::styled(format!("    {}", source.url), Style::default().fg(Color::Cyan))));
            }
        }
        lines.push(Line::from(""));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolCatalog;
    use crate::session::{RequestId, Source};
    use crate::upload::FileUpload;

    use ratatui::backend::TestBackend;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines.iter().map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect()).collect()
    }

    #[test]
    fn renders_thinking_tools_and_sources() {
        let mut thinking = Message::thinking(RequestId(1));
        thinking.thinking.as_mut().unwrap().steps = vec!["Reading".into(), "Searching".into()];

        let mut with_tool = Message::assistant("You can use this suggested tool:");
        with_tool.tools = ToolCatalog::default().suggest(Some("brain_tumor"));

        let mut cited = Message::assistant("Here is what I found.");
        cited.sources = Some(vec![Source { title: "vidal.fr".into(), url: "https://vidal.fr/x".into(), info: "Drug database".into() }]);

        let text = plain(&message_lines(&[Message::user("hi"), thinking, with_tool, cited]));
        assert!(text[0].ends_with("] You: hi"));
        assert!(text[2].ends_with("] Assistant: Reading > Searching"));
        assert!(text[4].starts_with("  [1] Brain tumor classifier (needs image) 4.5 stars"));
        assert!(text.iter().any(|l| l == "  - vidal.fr: Drug database"));
    }

    #[test]
    fn draws_upload_panel_and_sources() {
        let mut state = ChatState::default();
        state.apply(Action::AddSource { url: "https://pubmed.ncbi.nlm.nih.gov".into(), description: None });
        state.apply(Action::SelectTool(ToolCatalog::default().get("brain_tumor").cloned().unwrap()));
        state.apply(Action::UploadFile(FileUpload::new("voice.wav", "audio/wav", vec![1])));

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| draw(f, &state, 0, None)).unwrap();
        let rendered: String = terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect();

        assert!(rendered.contains("Invalid file type. Expected image file."));
        assert!(rendered.contains("My trusted sources"));
        assert!(rendered.contains("No description"));
    }

    #[test]
    fn long_replies_keep_newest_tail_visible() {
        let mut state = ChatState::default();
        for i in 0..3 {
            state.messages.push(Message::user(format!("question {i}")));
            let body = "lorem ipsum dolor ".repeat(30);
            state.messages.push(Message::assistant(format!("{body}TAIL{i}")));
        }

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, &state, 0, None)).unwrap();
        let rendered: String = terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect();

        assert!(rendered.contains("TAIL2"));
    }

    struct BrokenPipe;

    impl io::Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn failed_screen_switch_leaves_raw_mode() {
        let mut restored = false;
        let result = enter_screen(&mut BrokenPipe, || {
            restored = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(restored);
    }

    #[test]
    fn screen_switch_keeps_raw_mode_on_success() {
        let mut out = Vec::new();
        let mut restored = false;
        enter_screen(&mut out, || {
            restored = true;
            Ok(())
        })
        .unwrap();
        assert!(!out.is_empty());
        assert!(!restored);
    }
}
