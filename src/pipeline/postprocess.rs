//! Deterministic Markdown cleanup applied after conversion.
//!
//! Passes run in a fixed order: fences are stripped before line endings are normalised, and
//! heading spacing is fixed only once trailing whitespace is gone so headings are detected on
//! clean lines.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```$").expect("valid regex"));
static RE_EXCESS_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

/// Clean converter output without touching its content.
pub fn clean_markdown(input: &str) -> String {
    let s = unwrap_outer_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.replace(&INVISIBLE[..], "");
    let s = s
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let s = space_headings(&s);
    let s = RE_EXCESS_BLANKS.replace_all(&s, "\n\n");
    let trimmed = s.trim_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

fn unwrap_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

/// True for ATX headings: one to six `#` followed by a space or end of line.
pub(crate) fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    match line[hashes..].chars().next() {
        None | Some(' ') | Some('\t') => Some(hashes),
        _ => None,
    }
}

/// Line-by-line fenced code tracking. A fence closes only on a bare run of its opening
/// character that is at least as long as the opening run.
#[derive(Debug, Default)]
pub(crate) struct Fences {
    open: Option<(char, usize)>,
}

impl Fences {
    /// Returns true when `line` is a fence marker or lies inside an open fence.
    pub(crate) fn feed(&mut self, line: &str) -> bool {
        match (self.open, fence_marker(line)) {
            (None, Some((ch, len, _))) => {
                self.open = Some((ch, len));
                true
            }
            (Some((open_ch, open_len)), Some((ch, len, true)))
                if ch == open_ch && len >= open_len =>
            {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

/// Fence character, run length and whether nothing follows the run.
fn fence_marker(line: &str) -> Option<(char, usize, bool)> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    Some((ch, len, trimmed[len..].trim().is_empty()))
}

/// Put a blank line before and after every heading outside fenced code.
fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut fences = Fences::default();
    let mut after_heading = false;
    for line in input.lines() {
        let in_fence = fences.feed(line);
        let is_heading = !in_fence && heading_level(line).is_some();
        if (is_heading || after_heading)
            && !line.is_empty()
            && out.last().is_some_and(|prev| !prev.is_empty())
        {
            out.push("");
        }
        out.push(line);
        after_heading = is_heading;
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_fence() {
        assert_eq!(clean_markdown("```markdown\n# Hi\ntext\n```"), "# Hi\n\ntext\n");
    }

    #[test]
    fn keeps_inner_code_fences() {
        let input = "Intro\n\n```rust\nfn main() {}\n```\n\nOutro";
        assert_eq!(clean_markdown(input), format!("{input}\n"));
    }

    #[test]
    fn normalises_whitespace_and_invisible_chars() {
        let input = "a  \r\nb\u{200B}c\r\n\n\n\n\nd";
        assert_eq!(clean_markdown(input), "a\nbc\n\nd\n");
    }

    #[test]
    fn headings_get_blank_lines() {
        let input = "text\n## Section\nbody";
        assert_eq!(clean_markdown(input), "text\n\n## Section\n\nbody\n");
    }

    #[test]
    fn hashes_inside_code_are_not_headings() {
        let input = "Code:\n\n```\n#include <x>\n# comment\n```";
        assert_eq!(clean_markdown(input), format!("{input}\n"));
    }

    #[test]
    fn other_fence_markers_inside_code_do_not_close_it() {
        let input = "```md\n~~~\n# still code\n````\n## Real\ntext";
        assert_eq!(
            clean_markdown(input),
            "```md\n~~~\n# still code\n````\n\n## Real\n\ntext\n"
        );

        let mut fences = Fences::default();
        assert!(fences.feed("~~~~"));
        assert!(fences.feed("~~~"));
        assert!(fences.feed("~~~~ info"));
        assert!(fences.feed("~~~~~"));
        assert!(!fences.feed("# heading"));
    }

    #[test]
    fn heading_level_requires_space() {
        assert_eq!(heading_level("## Title"), Some(2));
        assert_eq!(heading_level("#"), Some(1));
        assert_eq!(heading_level("#hashtag"), None);
        assert_eq!(heading_level("####### seven"), None);
    }

    #[test]
    fn blank_input_stays_empty() {
        assert_eq!(clean_markdown(" \n\n "), "");
    }
}
