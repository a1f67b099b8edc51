use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("Tab", "Switch focus between settings and preview"),
    ("↑/↓", "Select field (settings) / move cursor (preview)"),
    ("Space", "Toggle a checkbox"),
    ("←/→", "Step a number"),
    ("Enter", "Open the document or save-as prompt"),
    ("Ctrl-N", "Next: run the current step"),
    ("Ctrl-B", "Back to the first step"),
    ("Ctrl-Y", "Copy the preview to the clipboard"),
    ("Ctrl-Q", "Quit (also Ctrl-C)"),
    ("?", "Toggle this help"),
];

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    for (key, action) in KEYS {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<8}"), Style::default().fg(Color::Magenta)),
            Span::raw(*action),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Text fields are saved on every keystroke. Edits to the preview are what the next step reads.",
    ));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
