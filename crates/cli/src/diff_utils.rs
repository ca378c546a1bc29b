//! Line-by-line diffs between a historical version and the working copy

use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};

/// Check if content is binary (contains null bytes in first 8KB)
pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(8192).any(|&b| b == 0)
}

/// Generate a unified diff
///
/// `old_label`/`new_label` name the two sides in the `---`/`+++` header.
/// Returns an empty string when the contents are identical.
pub fn generate_unified_diff(
    old_content: &[u8],
    new_content: &[u8],
    old_label: &str,
    new_label: &str,
    context_lines: usize,
    color: bool,
) -> String {
    let old_text = String::from_utf8_lossy(old_content);
    let new_text = String::from_utf8_lossy(new_content);

    let diff = TextDiff::from_lines(&old_text, &new_text);
    let mut unified = diff.unified_diff();
    let hunks: Vec<_> = unified.context_radius(context_lines).iter_hunks().collect();
    if hunks.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    let header = format!("--- {}\n+++ {}\n", old_label, new_label);
    if color {
        output.push_str(&header.bold().to_string());
    } else {
        output.push_str(&header);
    }

    for hunk in hunks {
        // Hunk header (e.g., @@ -12,7 +12,8 @@)
        let header = hunk.header().to_string();
        if color {
            output.push_str(&format!("{}\n", header.cyan()));
        } else {
            output.push_str(&format!("{}\n", header));
        }

        for change in hunk.iter_changes() {
            let line: &str = change.value();
            let (sign, styled) = match change.tag() {
                ChangeTag::Delete => ('-', format!("-{}", line).red().to_string()),
                ChangeTag::Insert => ('+', format!("+{}", line).green().to_string()),
                ChangeTag::Equal => (' ', format!(" {}", line).dimmed().to_string()),
            };

            if color {
                output.push_str(&styled);
            } else {
                output.push(sign);
                output.push_str(line);
            }

            if !line.ends_with('\n') {
                output.push('\n');
            }
        }
    }

    output
}
