//! Whitespace cleanup for raw page text.

/// Normalizes raw extractor output for a single page.
///
/// Strips NUL and form-feed characters, trims trailing whitespace on each
/// line, collapses runs of blank lines into a single blank line and drops
/// leading/trailing blank lines.
pub fn clean_page_text(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    for line in raw.split('\n') {
        let line: String = line
            .chars()
            .filter(|ch| *ch != '\u{0}' && *ch != '\u{c}')
            .collect();
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !lines.is_empty() {
                lines.push(String::new());
            }
            continue;
        }
        blank_run = 0;
        lines.push(line.to_string());
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::clean_page_text;
    use pretty_assertions::assert_eq;

    #[test]
    fn collapses_blank_runs() {
        let raw = "\n\n\nTitle\n\n\n\nFirst line   \nSecond line\n\n\n";
        assert_eq!(clean_page_text(raw), "Title\n\nFirst line\nSecond line");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(clean_page_text("a\u{c}b\u{0}c\r\n"), "abc");
    }

    #[test]
    fn blank_page_is_empty() {
        assert_eq!(clean_page_text(" \n\t\n"), "");
    }
}
