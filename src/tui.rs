use crate::config;
use crate::session::Session;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use tui_textarea::{CursorMove, TextArea};

const EDITOR_TITLE: &str = "Assembly (F5: Run, F6: Rerun binary, Tab: Switch)";

#[derive(Debug, PartialEq)]
pub enum Pane {
    Editor,
    Registers,
    Output,
}

#[derive(Debug, PartialEq)]
pub enum NumFormat {
    Hex,
    Decimal,
    Binary,
}

impl NumFormat {
    /// Renders a register value; anything that isn't `0x`-hex is shown as is.
    pub fn render(&self, value: &str) -> String {
        let parsed = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .and_then(|digits| u16::from_str_radix(digits, 16).ok());
        match (self, parsed) {
            (NumFormat::Decimal, Some(word)) => (word as i16).to_string(),
            (NumFormat::Binary, Some(word)) => format!("0b{word:016b}"),
            _ => value.to_string(),
        }
    }
}

pub struct App<'a> {
    pub session: Session,
    pub editor: TextArea<'a>,
    pub binary: Option<PathBuf>,
    pub active_pane: Pane,
    pub number_format: NumFormat,
    pub output_scroll: u16,
    pub should_quit: bool,
}

impl<'a> App<'a> {
    pub fn new(session: Session, source: &str, binary: Option<PathBuf>) -> App<'a> {
        let mut editor = TextArea::new(source.lines().map(str::to_string).collect());
        editor.set_block(
            ratatui::widgets::Block::default()
                .borders(ratatui::widgets::Borders::ALL)
                .title(EDITOR_TITLE),
        );
        // Assembler errors are reported by line number.
        editor.set_line_number_style(ratatui::style::Style::default().fg(ratatui::style::Color::DarkGray));

        App {
            session,
            editor,
            binary,
            active_pane: Pane::Editor,
            number_format: NumFormat::Hex,
            output_scroll: 0,
            should_quit: false,
        }
    }

    fn run(&mut self) {
        let source = self.editor.lines().join("\n");
        if self.session.run_source(&source).is_err() {
            self.output_scroll = 0;
        }
    }

    fn rerun(&mut self) {
        tracing::debug!(binary = ?self.session.last_binary(), "rerun requested");
        if !self.session.rerun() {
            tracing::debug!("no binary to rerun");
        }
        self.output_scroll = 0;
    }

    /// Applies finished run events and jumps to the first line the assembler rejected.
    fn sync(&mut self) {
        let was_running = self.session.is_running();
        self.session.pump();
        if was_running && !self.session.is_running() {
            if let Some(&line) = self.session.error_lines().first() {
                let row = line.saturating_sub(1).min(u16::MAX as usize) as u16;
                self.editor.move_cursor(CursorMove::Jump(row, 0));
                self.active_pane = Pane::Editor;
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => {
                self.active_pane = match self.active_pane {
                    Pane::Editor => Pane::Registers,
                    Pane::Registers => Pane::Output,
                    Pane::Output => Pane::Editor,
                };
            }
            KeyCode::F(5) => self.run(),
            KeyCode::F(6) => self.rerun(),
            KeyCode::F(9) => {
                self.number_format = match self.number_format {
                    NumFormat::Hex => NumFormat::Decimal,
                    NumFormat::Decimal => NumFormat::Binary,
                    NumFormat::Binary => NumFormat::Hex,
                };
            }
            _ => match self.active_pane {
                Pane::Editor => {
                    self.editor.input(key);
                }
                Pane::Output => match key.code {
                    KeyCode::Up => self.output_scroll = self.output_scroll.saturating_sub(1),
                    KeyCode::Down => self.output_scroll = self.output_scroll.saturating_add(1),
                    _ => {}
                },
                Pane::Registers => {}
            },
        }
    }
}

pub fn run(mut app: App) -> Result<(), io::Error> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    if let Some(path) = app.binary.take() {
        app.session.load_binary(&path);
    }
    let res = run_app(&mut terminal, app);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
) -> io::Result<()> {
    loop {
        app.sync();
        terminal.draw(|f| ui::draw(f, &mut app))?;

        if !event::poll(config::UI_TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind == event::KeyEventKind::Press {
                app.handle_key(key);
            }
        }
        if app.should_quit {
            return Ok(());
        }
    }
}

mod ui {
    use super::*;
    use ratatui::{
        layout::{Constraint, Direction, Layout},
        style::{Color, Style},
        text::{Line, Span},
        widgets::{Block, Borders, Paragraph, Row, Table},
        Frame,
    };

    fn border(app: &App, pane: Pane) -> Style {
        if app.active_pane == pane { Style::default().fg(Color::Yellow) } else { Style::default() }
    }

    pub fn draw(f: &mut Frame, app: &mut App) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),  // Status bar
                Constraint::Min(10),    // Editor and registers
                Constraint::Length(12), // Output
            ])
            .split(f.area());

        let top_msg = Paragraph::new(format!(
            "{} | Format (F9): {:?} | Pane (Tab): {:?} | PC: {} | Press ESC to quit",
            app.session.status(),
            app.number_format,
            app.active_pane,
            app.session.registers().pc()
        ))
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(top_msg, chunks[0]);

        let middle_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
            .split(chunks[1]);

        let editor_style = border(app, Pane::Editor);
        app.editor.set_block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(editor_style)
                .title(EDITOR_TITLE),
        );
        f.render_widget(&app.editor, middle_chunks[0]);

        let rows = app.session.registers().snapshot().iter().map(|entry| {
            Row::new(vec![entry.name.to_string(), app.number_format.render(&entry.value)])
        });
        let regs = Table::new(rows, [Constraint::Length(4), Constraint::Min(8)])
            .header(Row::new(vec!["Reg", "Value"]).style(Style::default().fg(Color::Cyan)))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border(app, Pane::Registers))
                    .title("Registers"),
            );
        f.render_widget(regs, middle_chunks[1]);

        let error_lines = app.session.error_lines();
        let lines: Vec<Line> = app
            .session
            .output()
            .iter()
            .map(|line| {
                let flagged = crate::output::assembler_error_line(line)
                    .is_some_and(|n| error_lines.contains(&n));
                if flagged {
                    Line::from(Span::styled(line.as_str(), Style::default().fg(Color::Red)))
                } else {
                    Line::from(line.as_str())
                }
            })
            .collect();
        let output = Paragraph::new(lines)
            .scroll((app.output_scroll, 0))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border(app, Pane::Output))
                    .title("Output"),
            );
        f.render_widget(output, chunks[2]);
    }
}
