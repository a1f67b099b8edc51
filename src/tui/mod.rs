mod clipboard;
mod help;
mod state;

use crate::config::FieldValue;
use crate::labels::Labels;
use crate::logging::{Level, Transcript};
use crate::orchestrator::{self, FieldKind, Mailbox, UiCommand, WizardController, WizardView};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Terminal,
};
use state::{Focus, PathPrompt, PromptKind, UiState};
use std::path::PathBuf;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(controller: WizardController, mailbox: Mailbox) -> Result<()> {
    let (view_tx, view_rx) = mpsc::unbounded_channel::<WizardView>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let transcript = controller.transcript().clone();

    // The terminal loop runs on its own thread so blocking input polling never stalls tokio.
    let ui_handle = std::thread::spawn(move || run_threaded(transcript, view_rx, cmd_tx));

    let res = orchestrator::run_controller(controller, mailbox, cmd_rx, view_tx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    transcript: Transcript,
    mut view_rx: UnboundedReceiver<WizardView>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        while let Ok(view) = view_rx.try_recv() {
            state.apply_view(view);
            dirty = true;
        }

        // Redraw on input and on a slow tick so new transcript lines show up.
        if dirty || last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| draw(f.area(), f, &mut state, &transcript))
                .ok();
            last_tick = Instant::now();
            dirty = false;
        }

        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                dirty = true;
                if !handle_key(&mut state, k, &cmd_tx) {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Apply one key press. Returns false when the user asked to quit.
fn handle_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) -> bool {
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && matches!(k.code, KeyCode::Char('q') | KeyCode::Char('c')) {
        return false;
    }

    if state.prompt.is_some() {
        handle_prompt_key(state, k, cmd_tx);
        return true;
    }

    if state.show_help {
        state.show_help = false;
        return true;
    }

    match (ctrl, k.code) {
        (true, KeyCode::Char('n')) => {
            let enabled = state.view.as_ref().is_some_and(|v| v.next_enabled);
            if enabled {
                let _ = cmd_tx.send(UiCommand::Next);
            } else {
                state.info = "Next is not available yet".into();
            }
        }
        (true, KeyCode::Char('b')) => {
            let _ = cmd_tx.send(UiCommand::Back);
            state.selected = 0;
            state.info.clear();
        }
        (true, KeyCode::Char('y')) => {
            state.info = match clipboard::copy_to_clipboard(&state.editor.text) {
                Ok(()) => "✓ Copied preview to clipboard".into(),
                Err(e) => format!("Clipboard copy failed: {e:#}"),
            };
        }
        (true, _) => {}
        (_, KeyCode::Tab) | (_, KeyCode::BackTab) => {
            state.focus = match state.focus {
                Focus::Menu => Focus::Preview,
                Focus::Preview => Focus::Menu,
            };
        }
        _ if state.focus == Focus::Preview => handle_preview_key(state, k, cmd_tx),
        (false, KeyCode::Char('?')) if state.selected_kind() != Some(FieldKind::Text) => {
            state.show_help = true;
        }
        _ => handle_menu_key(state, k, cmd_tx),
    }
    true
}

fn handle_menu_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) {
    match k.code {
        KeyCode::Up => state.select_prev(),
        KeyCode::Down => state.select_next(),
        KeyCode::Enter => open_prompt(state),
        _ => edit_selected_field(state, k.code, cmd_tx),
    }
}

fn open_prompt(state: &mut UiState) {
    let kind = match state.selected_kind() {
        Some(FieldKind::FileOpen) => PromptKind::Open,
        Some(FieldKind::FileSave) => PromptKind::Save,
        _ => return,
    };
    let Some(view) = &state.view else {
        return;
    };
    if !view.picker_enabled {
        state.info = "Selection is disabled while the step is running".into();
        return;
    }
    let input = match kind {
        PromptKind::Open => {
            let mut dir = view.file_path.clone();
            if !dir.is_empty() && !dir.ends_with(std::path::MAIN_SEPARATOR) {
                dir.push(std::path::MAIN_SEPARATOR);
            }
            dir
        }
        PromptKind::Save => view.save_path.clone(),
    };
    state.prompt = Some(PathPrompt { kind, input });
}

fn edit_selected_field(state: &mut UiState, code: KeyCode, cmd_tx: &UnboundedSender<UiCommand>) {
    let Some((name, value)) = state.selected_value() else {
        return;
    };
    let bounds = match &state.view {
        Some(view) => view.bounds,
        None => return,
    };
    let updated = match (value, code) {
        (FieldValue::Bool(b), KeyCode::Char(' ')) | (FieldValue::Bool(b), KeyCode::Enter) => {
            FieldValue::Bool(!b)
        }
        (FieldValue::Int(n), KeyCode::Left) => FieldValue::Int(bounds.step_by(n, -1)),
        (FieldValue::Int(n), KeyCode::Right) => FieldValue::Int(bounds.step_by(n, 1)),
        (FieldValue::Text(mut s), KeyCode::Char(c)) => {
            s.push(c);
            FieldValue::Text(s)
        }
        (FieldValue::Text(mut s), KeyCode::Backspace) => {
            if s.pop().is_none() {
                return;
            }
            FieldValue::Text(s)
        }
        _ => return,
    };
    state.set_selected_value(updated.clone());
    let _ = cmd_tx.send(UiCommand::SetField {
        name: name.to_string(),
        value: updated,
    });
}

fn handle_preview_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) {
    let editor = &mut state.editor;
    let changed = match k.code {
        KeyCode::Char(c) => {
            editor.insert(c);
            true
        }
        KeyCode::Enter => {
            editor.insert('\n');
            true
        }
        KeyCode::Backspace => editor.backspace(),
        KeyCode::Left => {
            editor.left();
            false
        }
        KeyCode::Right => {
            editor.right();
            false
        }
        KeyCode::Up => {
            editor.up();
            false
        }
        KeyCode::Down => {
            editor.down();
            false
        }
        KeyCode::Home => {
            editor.home();
            false
        }
        KeyCode::End => {
            editor.end();
            false
        }
        _ => false,
    };
    if changed {
        let _ = cmd_tx.send(UiCommand::EditPreview(editor.text.clone()));
    }
}

fn handle_prompt_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) {
    let Some(prompt) = state.prompt.as_mut() else {
        return;
    };
    match k.code {
        KeyCode::Esc => state.prompt = None,
        KeyCode::Backspace => {
            prompt.input.pop();
        }
        KeyCode::Char(c) => prompt.input.push(c),
        KeyCode::Enter => {
            let path = PathBuf::from(prompt.input.trim());
            let cmd = match prompt.kind {
                PromptKind::Open => UiCommand::SelectFile(path),
                PromptKind::Save => UiCommand::SaveTo(path),
            };
            let _ = cmd_tx.send(cmd);
            state.prompt = None;
        }
        _ => {}
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &mut UiState, transcript: &Transcript) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(columns[0]);

    draw_menu(left[0], f, state);
    draw_transcript(left[1], f, transcript);
    draw_preview(columns[1], f, state);
    draw_status(rows[1], f, state);

    if let Some(prompt) = &state.prompt {
        draw_prompt(centered(area, 70, 3), f, prompt);
    }
    if state.show_help {
        help::draw_help(centered(area, 70, 16), f);
    }
}

fn focused_block(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn draw_menu(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let Some(view) = &state.view else {
        f.render_widget(Paragraph::new("Loading…"), area);
        return;
    };
    let app_title = Labels::default().app_title;
    let title = if view.done {
        format!("{app_title} · {}", view.title)
    } else {
        format!(
            "{app_title} · {} ({}/{})",
            view.title,
            view.index + 1,
            view.step_count - 1
        )
    };

    let mut lines: Vec<Line> = Vec::new();
    if view.done {
        lines.push(Line::from(Span::styled(
            view.title.clone(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
        lines.push(Line::from("Press Ctrl-B to process another document."));
    }
    for (i, field) in view.fields.iter().enumerate() {
        let selected = i == state.selected && state.focus == Focus::Menu;
        let marker = if selected { "> " } else { "  " };
        let value = match (&field.kind, &field.value) {
            (FieldKind::FileOpen, _) => {
                if view.picker_enabled {
                    "[Enter: choose…]".to_string()
                } else {
                    "[disabled]".to_string()
                }
            }
            (FieldKind::FileSave, _) => {
                if view.picker_enabled {
                    format!("[Enter: save as…] {}", view.save_path)
                } else {
                    "[disabled]".to_string()
                }
            }
            (FieldKind::Text, Some(FieldValue::Text(s)))
                if field.name.contains("key") && !s.is_empty() =>
            {
                "•".repeat(s.chars().count().min(12))
            }
            (_, Some(value)) => value.to_string(),
            (_, None) => String::new(),
        };
        let style = if selected {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{marker}{}: ", field.label), style),
            Span::raw(value),
        ]));
    }

    lines.push(Line::from(""));
    let enabled = Style::default().fg(Color::Green);
    let disabled = Style::default().fg(Color::DarkGray);
    let mut buttons = vec![Span::styled("[Ctrl-B Back]", enabled)];
    if view.has_next {
        buttons.push(Span::raw("  "));
        buttons.push(Span::styled(
            "[Ctrl-N Next]",
            if view.next_enabled { enabled } else { disabled },
        ));
    }
    if view.busy {
        buttons.push(Span::styled("  running…", Style::default().fg(Color::Yellow)));
    }
    lines.push(Line::from(buttons));

    let p = Paragraph::new(lines).block(focused_block(title, state.focus == Focus::Menu));
    f.render_widget(p, area);
}

fn draw_transcript(area: Rect, f: &mut ratatui::Frame, transcript: &Transcript) {
    let height = area.height.saturating_sub(2) as usize;
    let all = transcript.lines();
    let start = all.len().saturating_sub(height);
    let lines: Vec<Line> = all[start..]
        .iter()
        .map(|line| {
            let color = match line.level {
                Level::Info => Color::Gray,
                Level::Warn => Color::Yellow,
                Level::Error => Color::Red,
            };
            Line::from(Span::styled(line.text.clone(), Style::default().fg(color)))
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(p, area);
}

fn draw_preview(area: Rect, f: &mut ratatui::Frame, state: &mut UiState) {
    let focused = state.focus == Focus::Preview;
    let inner_height = area.height.saturating_sub(2);
    state.editor.ensure_visible(inner_height);

    let p = Paragraph::new(state.editor.text.as_str())
        .scroll((state.editor.scroll, 0))
        .block(focused_block("Preview".to_string(), focused));
    f.render_widget(p, area);

    if focused && state.prompt.is_none() && !state.show_help {
        let (line, col) = state.editor.line_col();
        let y = area.y + 1 + (line as u16).saturating_sub(state.editor.scroll);
        let x = area.x + 1 + (col as u16).min(area.width.saturating_sub(3));
        f.set_cursor_position((x, y));
    }
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let text = if state.info.is_empty() {
        "Tab focus · ↑/↓ select · Ctrl-N next · Ctrl-B back · Ctrl-Y copy · ? help · Ctrl-Q quit"
            .to_string()
    } else {
        state.info.clone()
    };
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn draw_prompt(area: Rect, f: &mut ratatui::Frame, prompt: &PathPrompt) {
    let title = match prompt.kind {
        PromptKind::Open => "Open document (.pdf .docx .doc .md .html) · Enter to confirm, Esc to cancel",
        PromptKind::Save => "Save chunks as · Enter to confirm, Esc to cancel",
    };
    let p = Paragraph::new(prompt.input.as_str())
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
    let x = area.x + 1 + (prompt.input.chars().count() as u16).min(area.width.saturating_sub(3));
    f.set_cursor_position((x, area.y + 1));
}

/// A `percent_x`-wide, `height`-tall rectangle centred in `area`.
fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = area.width * percent_x / 100;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{FieldView, StepperBounds};

    fn view() -> WizardView {
        WizardView {
            index: 1,
            step_count: 4,
            done: false,
            title: "Step 2. Processing".into(),
            fields: vec![
                FieldView {
                    name: "chunk_size",
                    label: "Chunk Size".into(),
                    kind: FieldKind::Int,
                    value: Some(FieldValue::Int(256)),
                },
                FieldView {
                    name: "include_title",
                    label: "Include title".into(),
                    kind: FieldKind::Bool,
                    value: Some(FieldValue::Bool(true)),
                },
            ],
            next_enabled: true,
            picker_enabled: true,
            has_next: true,
            busy: false,
            preview: String::new(),
            preview_revision: 0,
            file_path: "/docs".into(),
            save_path: "/docs/chunks.json".into(),
            bounds: StepperBounds::default(),
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn stepping_and_toggling_send_set_field() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        state.apply_view(view());

        assert!(handle_key(&mut state, key(KeyCode::Right), &tx));
        assert_eq!(
            rx.try_recv().unwrap(),
            UiCommand::SetField {
                name: "chunk_size".into(),
                value: FieldValue::Int(320)
            }
        );

        handle_key(&mut state, key(KeyCode::Down), &tx);
        handle_key(&mut state, key(KeyCode::Char(' ')), &tx);
        assert_eq!(
            rx.try_recv().unwrap(),
            UiCommand::SetField {
                name: "include_title".into(),
                value: FieldValue::Bool(false)
            }
        );
    }

    #[test]
    fn preview_edits_are_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        state.apply_view(view());
        handle_key(&mut state, key(KeyCode::Tab), &tx);
        handle_key(&mut state, key(KeyCode::Char('#')), &tx);
        assert_eq!(rx.try_recv().unwrap(), UiCommand::EditPreview("#".into()));
    }

    #[test]
    fn ctrl_q_quits() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        let quit = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL);
        assert!(!handle_key(&mut state, quit, &tx));
    }
}
