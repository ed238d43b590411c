//! Deterministic source-text editing helpers shared by the fix handlers.
//!
//! All functions take the full source and return a new string; nothing here
//! touches the filesystem.

use std::sync::LazyLock;

use regex::Regex;

/// 1-based line lookup.
pub fn line_at(source: &str, line: u32) -> Option<&str> {
    source.lines().nth(line.saturating_sub(1) as usize)
}

/// Replace the 1-based `line` with `new_line`, preserving the rest verbatim.
/// Returns `None` when the line does not exist.
pub fn replace_line(source: &str, line: u32, new_line: &str) -> Option<String> {
    let index = line.saturating_sub(1) as usize;
    let mut lines: Vec<&str> = source.lines().collect();
    if index >= lines.len() {
        return None;
    }
    lines[index] = new_line;
    Some(rejoin(&lines, source))
}

/// Insert `text` as a new line before the 0-based line `index`.
pub fn insert_line(source: &str, index: usize, text: &str) -> String {
    let mut lines: Vec<&str> = source.lines().collect();
    let index = index.min(lines.len());
    lines.insert(index, text);
    rejoin(&lines, source)
}

/// 0-based index after the leading shebang/comment/import block, where a new
/// import statement belongs.
pub fn import_insert_index(source: &str) -> usize {
    let mut index = 0;
    for (i, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("import ")
            || trimmed.starts_with("from ")
            || trimmed.starts_with('#')
        {
            index = i + 1;
        } else if trimmed.is_empty() {
            continue;
        } else {
            break;
        }
    }
    index
}

/// Width of the leading whitespace, tabs counted as one column each.
pub fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Levenshtein distance between two identifiers.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").unwrap());

/// All distinct identifiers in the source, in first-occurrence order.
/// Used for nearest-name suggestion ranking; keywords are not filtered out
/// because a misspelling is never closer to a keyword than to a real name
/// at distance <= 2 in practice.
pub fn identifiers(source: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in IDENTIFIER_RE.find_iter(source) {
        let ident = m.as_str();
        if !seen.iter().any(|s: &String| s == ident) {
            seen.push(ident.to_string());
        }
    }
    seen
}

/// Closest identifier to `target` within `max_distance`, excluding exact
/// matches. Ties resolve to the earliest occurrence for determinism.
pub fn nearest_identifier(source: &str, target: &str, max_distance: usize) -> Option<String> {
    let mut best: Option<(usize, String)> = None;
    for candidate in identifiers(source) {
        if candidate == target {
            continue;
        }
        let distance = edit_distance(&candidate, target);
        if distance == 0 || distance > max_distance {
            continue;
        }
        let better = match &best {
            Some((best_distance, _)) => distance < *best_distance,
            None => true,
        };
        if better {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, name)| name)
}

/// Replace a whole-word identifier throughout the source.
pub fn replace_identifier(source: &str, from: &str, to: &str) -> String {
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(from))).unwrap();
    pattern.replace_all(source, to).into_owned()
}

/// Rejoin edited lines, preserving the original trailing newline (if any).
fn rejoin(lines: &[&str], original: &str) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_line_preserves_trailing_newline() {
        let source = "a\nb\nc\n";
        let edited = replace_line(source, 2, "B").expect("edit");
        assert_eq!(edited, "a\nB\nc\n");
    }

    #[test]
    fn replace_line_out_of_range_is_none() {
        assert!(replace_line("a\n", 5, "x").is_none());
    }

    #[test]
    fn import_index_lands_after_import_block() {
        let source = "#!/usr/bin/env python3\nimport os\nfrom sys import argv\n\nprint(argv)\n";
        assert_eq!(import_insert_index(source), 3);
    }

    #[test]
    fn import_index_is_zero_for_plain_code() {
        assert_eq!(import_insert_index("x = 1\n"), 0);
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn nearest_identifier_prefers_closest() {
        let source = "def total(values):\n    return sum(values)\n\nprint(totl([1]))\n";
        assert_eq!(
            nearest_identifier(source, "totl", 2),
            Some("total".to_string())
        );
    }

    #[test]
    fn nearest_identifier_respects_max_distance() {
        let source = "def compute():\n    pass\n";
        assert_eq!(nearest_identifier(source, "zzzz", 2), None);
    }

    #[test]
    fn replace_identifier_is_whole_word() {
        let source = "totl = totls + totl\n";
        assert_eq!(replace_identifier(source, "totl", "total"), "total = totls + total\n");
    }
}
