//! Token/structure repair for `SyntaxError` and `IndentationError`.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::edit::{indent_width, line_at, replace_line};
use crate::core::record::{ErrorKind, ErrorRecord};
use crate::handlers::{Capability, FixProposal, Handler, HandlerDescriptor, Unsupported};

static BLOCK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(if|elif|else|for|while|def|class|try|except|finally|with)\b").unwrap()
});

static PRINT_STMT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)print\s+(.+?)\s*$").unwrap());

/// Append the missing `:` to a block header (`def f(x)` -> `def f(x):`).
pub struct MissingColon;

impl Handler for MissingColon {
    fn id(&self) -> &'static str {
        "syntax.missing_colon"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::SyntaxError],
            priority: 10,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        let header_hint = record.message.contains("expected ':'")
            || record.message.contains("invalid syntax");
        header_hint
            && record
                .line
                .and_then(|line| line_at(source, line))
                .is_some_and(is_colonless_header)
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = record
            .line
            .ok_or_else(|| Unsupported("no line number for syntax error".to_string()))?;
        let line = line_at(source, line_no)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        if !is_colonless_header(line) {
            return Err(Unsupported("line is not a colonless block header".to_string()));
        }
        let fixed = format!("{}:", line.trim_end());
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("insert missing ':' on line {line_no}"),
        )
        .with_confidence(0.9))
    }
}

fn is_colonless_header(line: &str) -> bool {
    let code = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let trimmed = code.trim_end();
    BLOCK_HEADER_RE.is_match(trimmed) && !trimmed.ends_with(':') && !trimmed.ends_with('\\')
}

/// Wrap Python-2 style `print x` statements in parentheses.
pub struct PrintStatement;

impl Handler for PrintStatement {
    fn id(&self) -> &'static str {
        "syntax.print_statement"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::SyntaxError],
            priority: 15,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, _source: &str) -> bool {
        record.message.contains("Missing parentheses in call to 'print'")
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = record
            .line
            .ok_or_else(|| Unsupported("no line number for print statement".to_string()))?;
        let line = line_at(source, line_no)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        let caps = PRINT_STMT_RE
            .captures(line)
            .ok_or_else(|| Unsupported("line is not a bare print statement".to_string()))?;
        let fixed = format!("{}print({})", &caps[1], &caps[2]);
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("add parentheses to print on line {line_no}"),
        )
        .with_confidence(0.9))
    }
}

/// Convert leading tabs to four-space indentation across the file.
pub struct TabsToSpaces;

impl Handler for TabsToSpaces {
    fn id(&self) -> &'static str {
        "syntax.tabs_to_spaces"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::IndentationError, ErrorKind::SyntaxError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        record.message.contains("inconsistent use of tabs and spaces")
            && source.lines().any(|line| line.starts_with('\t'))
    }

    fn propose_fix(
        &self,
        _record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let mut changed = false;
        let mut lines = Vec::new();
        for line in source.lines() {
            let tabs = line.len() - line.trim_start_matches('\t').len();
            if tabs > 0 {
                changed = true;
                lines.push(format!("{}{}", "    ".repeat(tabs), &line[tabs..]));
            } else {
                lines.push(line.to_string());
            }
        }
        if !changed {
            return Err(Unsupported("no leading tabs found".to_string()));
        }
        let mut new_source = lines.join("\n");
        if source.ends_with('\n') {
            new_source.push('\n');
        }
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            "convert leading tabs to four-space indentation".to_string(),
        )
        .with_confidence(0.85))
    }
}

/// Normalize the indentation of the offending line to its enclosing block.
pub struct IndentBlock;

impl Handler for IndentBlock {
    fn id(&self) -> &'static str {
        "syntax.indent_block"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::IndentationError],
            priority: 30,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        (record.message.contains("expected an indented block")
            || record.message.contains("unexpected indent"))
            && record
                .line
                .and_then(|line| line_at(source, line))
                .is_some()
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = record
            .line
            .ok_or_else(|| Unsupported("no line number for indentation error".to_string()))?;
        let line = line_at(source, line_no)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        let target = enclosing_indent(source, line_no)
            .ok_or_else(|| Unsupported("no enclosing block found".to_string()))?;
        let fixed = format!("{}{}", " ".repeat(target), line.trim_start());
        if fixed == line {
            return Err(Unsupported("line already at target indentation".to_string()));
        }
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("normalize indentation on line {line_no} to width {target}"),
        )
        .with_confidence(0.75))
    }
}

/// Target indentation for the 1-based `line_no`: the previous non-empty
/// line's width, plus four if that line opens a block.
fn enclosing_indent(source: &str, line_no: u32) -> Option<usize> {
    let lines: Vec<&str> = source.lines().collect();
    let index = line_no.checked_sub(1)? as usize;
    if index >= lines.len() {
        return None;
    }
    let previous = lines[..index]
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())?;
    let base = indent_width(previous);
    if previous.trim_end().ends_with(':') {
        Some(base + 4)
    } else {
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ErrorKind, message: &str, line: u32) -> ErrorRecord {
        ErrorRecord {
            kind,
            message: message.to_string(),
            line: Some(line),
            column: None,
            extracted_symbols: Vec::new(),
            confidence: 0.9,
        }
    }

    #[test]
    fn adds_missing_colon_to_def() {
        let source = "def f(x)\n    return x\n";
        let record = record(ErrorKind::SyntaxError, "expected ':'", 1);
        assert!(MissingColon.can_handle(&record, source));
        let proposal = MissingColon.propose_fix(&record, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "def f(x):\n    return x\n");
    }

    #[test]
    fn colon_handler_declines_non_header_lines() {
        let source = "x = (1,\n";
        let record = record(ErrorKind::SyntaxError, "invalid syntax", 1);
        assert!(!MissingColon.can_handle(&record, source));
    }

    #[test]
    fn wraps_print_statement() {
        let source = "print 'hello'\n";
        let record = record(
            ErrorKind::SyntaxError,
            "Missing parentheses in call to 'print'. Did you mean print(...)?",
            1,
        );
        let proposal = PrintStatement.propose_fix(&record, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "print('hello')\n");
    }

    #[test]
    fn converts_tabs_to_spaces() {
        let source = "def f():\n\treturn 1\n";
        let record = record(
            ErrorKind::IndentationError,
            "inconsistent use of tabs and spaces in indentation",
            2,
        );
        assert!(TabsToSpaces.can_handle(&record, source));
        let proposal = TabsToSpaces.propose_fix(&record, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "def f():\n    return 1\n");
    }

    #[test]
    fn indents_expected_block() {
        let source = "def f():\nreturn 1\n";
        let record = record(
            ErrorKind::IndentationError,
            "expected an indented block after function definition on line 1",
            2,
        );
        let proposal = IndentBlock.propose_fix(&record, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "def f():\n    return 1\n");
    }

    #[test]
    fn dedents_unexpected_indent() {
        let source = "x = 1\n        y = 2\n";
        let record = record(ErrorKind::IndentationError, "unexpected indent", 2);
        let proposal = IndentBlock.propose_fix(&record, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "x = 1\ny = 2\n");
    }
}
