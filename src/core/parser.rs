//! Traceback parsing: raw stderr text into an [`ErrorRecord`].
//!
//! Classification and symbol extraction are table-driven: each kind maps to
//! an ordered list of `(pattern, confidence)` rules, and the first matching
//! rule contributes its capture groups to `extracted_symbols`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::record::{ErrorKind, ErrorRecord, RawFailure};

/// The failure output carried no traceback or frame information at all
/// (e.g. a hard process crash). The orchestrator recovers by synthesizing
/// an `Unknown` record instead of aborting.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no traceback information in failure output")]
pub struct ParseError;

/// One `File "...", line N[, in ctx]` traceback frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    file: String,
    line: u32,
}

static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*File "(?P<file>[^"]+)", line (?P<line>\d+)(?:, in .+)?$"#).unwrap()
});

static EXCEPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<ty>[A-Za-z_][A-Za-z0-9_]*)(?::\s?(?P<msg>.*))?$").unwrap()
});

static CARET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<pad>\s*)\^+\s*$").unwrap());

/// Per-kind extraction rules. First match wins; every capture group is
/// appended to `extracted_symbols` in order.
struct ExtractRule {
    kind: ErrorKind,
    pattern: &'static str,
    confidence: f32,
}

const EXTRACT_RULES: &[ExtractRule] = &[
    ExtractRule {
        kind: ErrorKind::ModuleNotFoundError,
        pattern: r"No module named '([^']+)'",
        confidence: 0.95,
    },
    ExtractRule {
        kind: ErrorKind::ImportError,
        pattern: r"cannot import name '([^']+)' from '([^']+)'",
        confidence: 0.95,
    },
    ExtractRule {
        kind: ErrorKind::ImportError,
        pattern: r"No module named '([^']+)'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::NameError,
        pattern: r"name '([^']+)' is not defined",
        confidence: 0.95,
    },
    ExtractRule {
        kind: ErrorKind::AttributeError,
        pattern: r"'([^']+)' object has no attribute '([^']+)'",
        confidence: 0.95,
    },
    ExtractRule {
        kind: ErrorKind::AttributeError,
        pattern: r"module '([^']+)' has no attribute '([^']+)'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::KeyError,
        pattern: r"^'(.*)'$",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::KeyError,
        pattern: r"^(.+)$",
        confidence: 0.4,
    },
    ExtractRule {
        kind: ErrorKind::IndexError,
        pattern: r"(\w+) index out of range",
        confidence: 0.8,
    },
    ExtractRule {
        kind: ErrorKind::TypeError,
        pattern: r"unsupported operand type\(s\) for (\S+): '([^']+)' and '([^']+)'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::TypeError,
        pattern: r#"can only concatenate (\w+) \(not "([^"]+)"\) to \w+"#,
        confidence: 0.85,
    },
    ExtractRule {
        kind: ErrorKind::TypeError,
        pattern: r"'(\w+)' object is not (callable|subscriptable|iterable)",
        confidence: 0.7,
    },
    ExtractRule {
        kind: ErrorKind::ValueError,
        pattern: r"invalid literal for int\(\) with base \d+: '([^']*)'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::ValueError,
        pattern: r"could not convert string to float: '([^']*)'",
        confidence: 0.85,
    },
    ExtractRule {
        kind: ErrorKind::FileNotFoundError,
        pattern: r"No such file or directory: '([^']+)'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::ZeroDivisionError,
        pattern: r"division by zero",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::SyntaxError,
        pattern: r"Missing parentheses in call to '(\w+)'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::SyntaxError,
        pattern: r"expected ':'",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::SyntaxError,
        pattern: r"invalid syntax",
        confidence: 0.6,
    },
    ExtractRule {
        kind: ErrorKind::IndentationError,
        pattern: r"expected an indented block",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::IndentationError,
        pattern: r"unexpected indent",
        confidence: 0.9,
    },
    ExtractRule {
        kind: ErrorKind::IndentationError,
        pattern: r"inconsistent use of tabs and spaces",
        confidence: 0.9,
    },
];

static COMPILED_RULES: LazyLock<Vec<(ErrorKind, Regex, f32)>> = LazyLock::new(|| {
    EXTRACT_RULES
        .iter()
        .map(|rule| (rule.kind, Regex::new(rule.pattern).unwrap(), rule.confidence))
        .collect()
});

/// Confidence assigned when the kind is recognized but no extraction rule
/// matched the message (classification alone, no symbols).
const BASE_CONFIDENCE: f32 = 0.5;

/// Parse a raw failure into a structured record.
///
/// Fails with [`ParseError`] only when stderr carries neither a traceback
/// frame nor a recognizable `Type: message` exception line.
pub fn parse(raw: &RawFailure, script_path: &Path) -> Result<ErrorRecord, ParseError> {
    let lines: Vec<&str> = raw.stderr.lines().collect();
    let frames = collect_frames(&lines);
    let exception = find_exception_line(&lines);

    let (type_name, message) = match exception {
        Some(found) => found,
        None if frames.is_empty() => return Err(ParseError),
        // Frames but no recognizable final line: degrade to Unknown.
        None => {
            return Ok(ErrorRecord {
                kind: ErrorKind::Unknown,
                message: last_nonempty_line(&lines),
                line: script_line(&frames, script_path),
                column: None,
                extracted_symbols: Vec::new(),
                confidence: 0.0,
            });
        }
    };

    let kind = ErrorKind::from_type_name(&type_name);
    let (extracted_symbols, confidence) = if kind == ErrorKind::Unknown {
        (Vec::new(), 0.0)
    } else {
        extract_symbols(kind, &message)
    };

    let column = match kind {
        ErrorKind::SyntaxError | ErrorKind::IndentationError => caret_column(&lines),
        _ => None,
    };

    Ok(ErrorRecord {
        kind,
        message,
        line: script_line(&frames, script_path),
        column,
        extracted_symbols,
        confidence,
    })
}

fn collect_frames(lines: &[&str]) -> Vec<Frame> {
    lines
        .iter()
        .filter_map(|line| {
            FRAME_RE.captures(line).and_then(|caps| {
                let line: u32 = caps["line"].parse().ok()?;
                Some(Frame {
                    file: caps["file"].to_string(),
                    line,
                })
            })
        })
        .collect()
}

/// Innermost frame that belongs to the target script; frames from library
/// code are skipped.
fn script_line(frames: &[Frame], script_path: &Path) -> Option<u32> {
    let script_name = script_path.file_name()?.to_string_lossy().into_owned();
    frames
        .iter()
        .filter(|frame| {
            Path::new(&frame.file)
                .file_name()
                .is_some_and(|name| name.to_string_lossy() == script_name)
        })
        .next_back()
        .map(|frame| frame.line)
}

/// Scan from the end for the final `Type: message` (or bare `Type`) line.
fn find_exception_line(lines: &[&str]) -> Option<(String, String)> {
    for line in lines.iter().rev() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with(' ') {
            continue;
        }
        if let Some(caps) = EXCEPTION_RE.captures(trimmed) {
            let ty = caps["ty"].to_string();
            let looks_like_exception = ErrorKind::from_type_name(&ty) != ErrorKind::Unknown
                || ty.ends_with("Error")
                || ty.ends_with("Exception")
                || ty.ends_with("Warning")
                || ty == "KeyboardInterrupt"
                || ty == "SystemExit";
            if looks_like_exception {
                let msg = caps
                    .name("msg")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                return Some((ty, msg));
            }
        }
    }
    None
}

fn extract_symbols(kind: ErrorKind, message: &str) -> (Vec<String>, f32) {
    for (rule_kind, regex, confidence) in COMPILED_RULES.iter() {
        if *rule_kind != kind {
            continue;
        }
        if let Some(caps) = regex.captures(message) {
            let symbols = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_string())
                .collect();
            return (symbols, *confidence);
        }
    }
    (Vec::new(), BASE_CONFIDENCE)
}

/// Column under the caret of a syntax error block. CPython echoes the
/// offending source line indented by four spaces, with `^` aligned below.
fn caret_column(lines: &[&str]) -> Option<u32> {
    for line in lines.iter() {
        if let Some(caps) = CARET_RE.captures(line) {
            let pad = caps["pad"].len();
            return Some(pad.saturating_sub(4) as u32 + 1);
        }
    }
    None
}

fn last_nonempty_line(lines: &[&str]) -> String {
    lines
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(stderr: &str) -> RawFailure {
        RawFailure {
            stderr: stderr.to_string(),
            exit_code: Some(1),
        }
    }

    #[test]
    fn parses_module_not_found() {
        let raw = failure(
            "Traceback (most recent call last):\n  File \"/tmp/app.py\", line 1, in <module>\n    import notreal\nModuleNotFoundError: No module named 'notreal'\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.kind, ErrorKind::ModuleNotFoundError);
        assert_eq!(record.line, Some(1));
        assert_eq!(record.extracted_symbols, vec!["notreal".to_string()]);
        assert!(record.confidence > 0.9);
    }

    #[test]
    fn parses_syntax_error_with_caret() {
        let raw = failure(
            "  File \"/tmp/app.py\", line 1\n    def f(x)\n            ^\nSyntaxError: expected ':'\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.kind, ErrorKind::SyntaxError);
        assert_eq!(record.line, Some(1));
        assert_eq!(record.column, Some(9));
        assert_eq!(record.message, "expected ':'");
    }

    #[test]
    fn skips_library_frames_for_line() {
        let raw = failure(
            "Traceback (most recent call last):\n  File \"/tmp/app.py\", line 7, in <module>\n    run()\n  File \"/usr/lib/python3/os.py\", line 42, in run\n    boom\nValueError: invalid literal for int() with base 10: 'x'\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.line, Some(7));
        assert_eq!(record.extracted_symbols, vec!["x".to_string()]);
    }

    #[test]
    fn innermost_script_frame_wins() {
        let raw = failure(
            "Traceback (most recent call last):\n  File \"/tmp/app.py\", line 9, in <module>\n    main()\n  File \"/tmp/app.py\", line 4, in main\n    d['k']\nKeyError: 'k'\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.line, Some(4));
        assert_eq!(record.extracted_symbols, vec!["k".to_string()]);
    }

    #[test]
    fn import_error_captures_name_and_module() {
        let raw = failure(
            "Traceback (most recent call last):\n  File \"/tmp/app.py\", line 1, in <module>\nImportError: cannot import name 'spam' from 'collections'\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.kind, ErrorKind::ImportError);
        assert_eq!(
            record.extracted_symbols,
            vec!["spam".to_string(), "collections".to_string()]
        );
    }

    #[test]
    fn unrecognized_type_maps_to_unknown_with_zero_confidence() {
        let raw = failure(
            "Traceback (most recent call last):\n  File \"/tmp/app.py\", line 2, in <module>\nRecursionError: maximum recursion depth exceeded\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.kind, ErrorKind::Unknown);
        assert_eq!(record.confidence, 0.0);
        assert!(record.extracted_symbols.is_empty());
    }

    #[test]
    fn bare_crash_is_a_parse_error() {
        let raw = failure("Killed\n");
        assert_eq!(parse(&raw, Path::new("/tmp/app.py")), Err(ParseError));
    }

    #[test]
    fn recognized_kind_without_rule_match_gets_base_confidence() {
        let raw = failure(
            "Traceback (most recent call last):\n  File \"/tmp/app.py\", line 3, in <module>\nTypeError: something novel happened\n",
        );
        let record = parse(&raw, Path::new("/tmp/app.py")).expect("record");
        assert_eq!(record.kind, ErrorKind::TypeError);
        assert_eq!(record.confidence, BASE_CONFIDENCE);
    }
}
