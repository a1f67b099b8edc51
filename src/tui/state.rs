use crate::config::FieldValue;
use crate::orchestrator::{FieldKind, WizardView};

/// Which pane receives typed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Menu,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Open,
    Save,
}

/// Inline path entry standing in for the open/save dialogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrompt {
    pub kind: PromptKind,
    pub input: String,
}

/// Editable copy of the controller's preview text.
///
/// `cursor` is a byte offset that always sits on a char boundary.
#[derive(Debug, Clone, Default)]
pub struct PreviewEditor {
    pub text: String,
    pub cursor: usize,
    pub revision: u64,
    pub scroll: u16,
}

impl PreviewEditor {
    /// Take the controller's text if it was replaced since the last sync.
    pub fn sync(&mut self, text: &str, revision: u64) -> bool {
        if revision == self.revision {
            return false;
        }
        self.text = text.to_string();
        self.cursor = 0;
        self.scroll = 0;
        self.revision = revision;
        true
    }

    pub fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn backspace(&mut self) -> bool {
        let Some(prev) = self.text[..self.cursor].chars().next_back() else {
            return false;
        };
        self.cursor -= prev.len_utf8();
        self.text.remove(self.cursor);
        true
    }

    pub fn left(&mut self) {
        if let Some(prev) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= prev.len_utf8();
        }
    }

    pub fn right(&mut self) {
        if let Some(next) = self.text[self.cursor..].chars().next() {
            self.cursor += next.len_utf8();
        }
    }

    fn line_start(&self, at: usize) -> usize {
        self.text[..at].rfind('\n').map(|i| i + 1).unwrap_or(0)
    }

    fn line_end(&self, at: usize) -> usize {
        self.text[at..]
            .find('\n')
            .map(|i| at + i)
            .unwrap_or(self.text.len())
    }

    pub fn home(&mut self) {
        self.cursor = self.line_start(self.cursor);
    }

    pub fn end(&mut self) {
        self.cursor = self.line_end(self.cursor);
    }

    /// Byte offset of column `col` (in chars) on the line starting at `start`, clamped to its end.
    fn offset_in_line(&self, start: usize, col: usize) -> usize {
        let end = self.line_end(start);
        self.text[start..end]
            .char_indices()
            .nth(col)
            .map(|(i, _)| start + i)
            .unwrap_or(end)
    }

    pub fn up(&mut self) {
        let start = self.line_start(self.cursor);
        if start == 0 {
            return;
        }
        let (_, col) = self.line_col();
        let prev_start = self.line_start(start - 1);
        self.cursor = self.offset_in_line(prev_start, col);
    }

    pub fn down(&mut self) {
        let end = self.line_end(self.cursor);
        if end == self.text.len() {
            return;
        }
        let (_, col) = self.line_col();
        self.cursor = self.offset_in_line(end + 1, col);
    }

    /// Zero-based line and column (in chars) of the cursor.
    pub fn line_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let col = before[self.line_start(self.cursor)..].chars().count();
        (line, col)
    }

    /// Scroll so the cursor line is inside a viewport of `height` rows.
    pub fn ensure_visible(&mut self, height: u16) {
        let (line, _) = self.line_col();
        let line = u16::try_from(line).unwrap_or(u16::MAX);
        let height = height.max(1);
        if line < self.scroll {
            self.scroll = line;
        } else if line >= self.scroll.saturating_add(height) {
            self.scroll = line - height + 1;
        }
    }
}

/// UI thread state. Only the terminal thread touches it.
#[derive(Debug, Default)]
pub struct UiState {
    pub focus: Focus,
    pub selected: usize,
    pub prompt: Option<PathPrompt>,
    pub editor: PreviewEditor,
    pub info: String,
    pub show_help: bool,
    pub view: Option<WizardView>,
}

impl UiState {
    /// Adopt a fresh controller snapshot.
    pub fn apply_view(&mut self, view: WizardView) {
        self.editor.sync(&view.preview, view.preview_revision);
        if self.selected >= view.fields.len() {
            self.selected = view.fields.len().saturating_sub(1);
        }
        self.view = Some(view);
    }

    pub fn selected_kind(&self) -> Option<FieldKind> {
        self.view
            .as_ref()
            .and_then(|view| view.fields.get(self.selected))
            .map(|field| field.kind)
    }

    /// Current value of the selected field, as last published by the controller.
    pub fn selected_value(&self) -> Option<(&'static str, FieldValue)> {
        let field = self.view.as_ref()?.fields.get(self.selected)?;
        Some((field.name, field.value.clone()?))
    }

    /// Record an edit locally so quick successive keys build on it before the next view.
    pub fn set_selected_value(&mut self, value: FieldValue) {
        if let Some(field) = self
            .view
            .as_mut()
            .and_then(|view| view.fields.get_mut(self.selected))
        {
            field.value = Some(value);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        let count = self.view.as_ref().map(|view| view.fields.len()).unwrap_or(0);
        if self.selected + 1 < count {
            self.selected += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor(text: &str) -> PreviewEditor {
        PreviewEditor {
            text: text.to_string(),
            ..PreviewEditor::default()
        }
    }

    #[test]
    fn edits_respect_multibyte_chars() {
        let mut ed = editor("чат");
        ed.right();
        ed.right();
        ed.insert('x');
        assert_eq!(ed.text, "чаxт");
        assert!(ed.backspace());
        assert!(ed.backspace());
        assert_eq!(ed.text, "чт");
        assert_eq!(ed.line_col(), (0, 1));
    }

    #[test]
    fn vertical_moves_keep_column() {
        let mut ed = editor("abcdef\nxy\nlonger line");
        for _ in 0..4 {
            ed.right();
        }
        ed.down();
        assert_eq!(ed.line_col(), (1, 2));
        ed.down();
        assert_eq!(ed.line_col(), (2, 2));
        ed.up();
        ed.up();
        assert_eq!(ed.line_col(), (0, 2));
        ed.end();
        assert_eq!(ed.line_col(), (0, 6));
    }

    #[test]
    fn sync_only_takes_new_revisions() {
        let mut ed = editor("");
        assert!(ed.sync("first", 1));
        ed.end();
        ed.insert('!');
        assert!(!ed.sync("first", 1));
        assert_eq!(ed.text, "first!");
        assert!(ed.sync("second", 2));
        assert_eq!(ed.text, "second");
        assert_eq!(ed.cursor, 0);
    }

    #[test]
    fn scroll_follows_cursor() {
        let mut ed = editor("1\n2\n3\n4\n5\n6");
        for _ in 0..5 {
            ed.down();
        }
        ed.ensure_visible(3);
        assert_eq!(ed.scroll, 3);
        ed.up();
        ed.up();
        ed.up();
        ed.up();
        ed.ensure_visible(3);
        assert_eq!(ed.scroll, 1);
    }
}
