//! Guarding and coercion strategies: `KeyError`, `IndexError`, `TypeError`,
//! `ValueError`, `ZeroDivisionError` and `FileNotFoundError`.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::edit::{line_at, replace_line};
use crate::core::record::{ErrorKind, ErrorRecord};
use crate::handlers::{
    Capability, FixProposal, Handler, HandlerDescriptor, SideEffect, Unsupported,
};

static INDEX_ACCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<seq>[A-Za-z_][A-Za-z0-9_]*)\[(?P<idx>[A-Za-z_][A-Za-z0-9_]*|\d+)\]")
        .unwrap()
});

static INT_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"int\((?P<arg>[^()]+)\)").unwrap());

static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<num>[A-Za-z0-9_\.\]\)]+)\s*(?P<op>//|/|%)\s*(?P<den>[A-Za-z_][A-Za-z0-9_\.]*|\d+)",
    )
    .unwrap()
});

static STR_CONCAT_LEFT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // "literal" + expr  ->  "literal" + str(expr)
    Regex::new(r#"(?P<lhs>["'][^"']*["']\s*\+\s*)(?P<rhs>[A-Za-z_][A-Za-z0-9_\.\[\]\(\)]*|\d+)"#)
        .unwrap()
});

static STR_CONCAT_RIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // expr + "literal"  ->  str(expr) + "literal"
    Regex::new(r#"(?P<lhs>[A-Za-z_][A-Za-z0-9_\.\[\]\(\)]*|\d+)(?P<rhs>\s*\+\s*["'])"#).unwrap()
});

/// Resolve the offending line: the record's line when present, otherwise the
/// first line matching `predicate`.
fn target_line<F>(record: &ErrorRecord, source: &str, predicate: F) -> Option<u32>
where
    F: Fn(&str) -> bool,
{
    if let Some(line) = record.line
        && line_at(source, line).is_some_and(&predicate)
    {
        return Some(line);
    }
    source
        .lines()
        .position(|line| predicate(line))
        .map(|i| i as u32 + 1)
}

/// `d['k']` -> `d.get('k')`: membership guard with a `None` default.
pub struct KeyGuard;

impl KeyGuard {
    fn access_pattern(key: &str) -> Regex {
        let key = regex::escape(key);
        Regex::new(&format!(
            r#"(?P<map>[A-Za-z_][A-Za-z0-9_\.]*)\[(?P<key>'{key}'|"{key}")\]"#
        ))
        .unwrap()
    }
}

impl Handler for KeyGuard {
    fn id(&self) -> &'static str {
        "guards.key_guard"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::KeyError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        record.symbol().is_some_and(|key| {
            let pattern = Self::access_pattern(key);
            target_line(record, source, |line| pattern.is_match(line)).is_some()
        })
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let key = record
            .symbol()
            .ok_or_else(|| Unsupported("no key extracted".to_string()))?;
        let pattern = Self::access_pattern(key);
        let line_no = target_line(record, source, |line| pattern.is_match(line))
            .ok_or_else(|| Unsupported(format!("no subscript with key '{key}' found")))?;
        let line = line_at(source, line_no).unwrap_or_default();
        let fixed = pattern.replace(line, "$map.get($key)").into_owned();
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("guard dict access with .get('{key}') on line {line_no}"),
        )
        .with_confidence(0.8))
    }
}

/// `xs[i]` -> `(xs[i] if i < len(xs) else None)`: bounds guard with a safe
/// default.
pub struct IndexGuard;

impl Handler for IndexGuard {
    fn id(&self) -> &'static str {
        "guards.index_guard"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::IndexError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        target_line(record, source, |line| INDEX_ACCESS_RE.is_match(line)).is_some()
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = target_line(record, source, |line| INDEX_ACCESS_RE.is_match(line))
            .ok_or_else(|| Unsupported("no simple subscript found".to_string()))?;
        let line = line_at(source, line_no).unwrap_or_default();
        let caps = INDEX_ACCESS_RE
            .captures(line)
            .ok_or_else(|| Unsupported("no simple subscript found".to_string()))?;
        let seq = &caps["seq"];
        let idx = &caps["idx"];
        let guarded = format!("({seq}[{idx}] if {idx} < len({seq}) else None)");
        let fixed = line.replacen(&caps[0], &guarded, 1);
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("bounds-guard '{seq}[{idx}]' on line {line_no}"),
        )
        .with_confidence(0.7))
    }
}

/// Insert `str(...)` around the non-string operand of a failing
/// concatenation.
pub struct StrCoercion;

impl Handler for StrCoercion {
    fn id(&self) -> &'static str {
        "guards.str_coercion"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::TypeError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        let concat = record.message.contains("can only concatenate str")
            || (record.message.contains("unsupported operand type(s) for +")
                && record.message.contains("'str'"));
        concat
            && target_line(record, source, |line| {
                STR_CONCAT_LEFT_RE.is_match(line) || STR_CONCAT_RIGHT_RE.is_match(line)
            })
            .is_some()
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = target_line(record, source, |line| {
            STR_CONCAT_LEFT_RE.is_match(line) || STR_CONCAT_RIGHT_RE.is_match(line)
        })
        .ok_or_else(|| Unsupported("no string concatenation found".to_string()))?;
        let line = line_at(source, line_no).unwrap_or_default();
        let fixed = if STR_CONCAT_LEFT_RE.is_match(line) {
            STR_CONCAT_LEFT_RE
                .replace(line, "${lhs}str(${rhs})")
                .into_owned()
        } else {
            STR_CONCAT_RIGHT_RE
                .replace(line, "str(${lhs})${rhs}")
                .into_owned()
        };
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("coerce concatenation operand with str() on line {line_no}"),
        )
        .with_confidence(0.7))
    }
}

/// `int(x)` -> `int(float(x))` for `invalid literal for int()` failures.
pub struct IntCoercion;

impl Handler for IntCoercion {
    fn id(&self) -> &'static str {
        "guards.int_coercion"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::ValueError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        record.message.contains("invalid literal for int()")
            && target_line(record, source, |line| {
                INT_CALL_RE.is_match(line) && !line.contains("int(float(")
            })
            .is_some()
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = target_line(record, source, |line| {
            INT_CALL_RE.is_match(line) && !line.contains("int(float(")
        })
        .ok_or_else(|| Unsupported("no int(...) call found".to_string()))?;
        let line = line_at(source, line_no).unwrap_or_default();
        let fixed = INT_CALL_RE
            .replace(line, "int(float(${arg}))")
            .into_owned();
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("coerce through float before int() on line {line_no}"),
        )
        .with_confidence(0.65))
    }
}

/// Guard a division with a zero check on the denominator.
pub struct ZeroDivisionGuard;

impl Handler for ZeroDivisionGuard {
    fn id(&self) -> &'static str {
        "guards.zero_division"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::ZeroDivisionError],
            priority: 30,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        target_line(record, source, |line| {
            DIVISION_RE.is_match(line) && !line.contains("!= 0 else")
        })
        .is_some()
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let line_no = target_line(record, source, |line| {
            DIVISION_RE.is_match(line) && !line.contains("!= 0 else")
        })
        .ok_or_else(|| Unsupported("no division found".to_string()))?;
        let line = line_at(source, line_no).unwrap_or_default();
        let caps = DIVISION_RE
            .captures(line)
            .ok_or_else(|| Unsupported("no division found".to_string()))?;
        let (num, op, den) = (&caps["num"], &caps["op"], &caps["den"]);
        let guarded = format!("({num} {op} {den} if {den} != 0 else 0)");
        let fixed = line.replacen(&caps[0], &guarded, 1);
        let new_source = replace_line(source, line_no, &fixed)
            .ok_or_else(|| Unsupported(format!("line {line_no} not in source")))?;
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("guard division by '{den}' on line {line_no}"),
        )
        .with_confidence(0.65))
    }
}

/// Create the file a failing `open(...)` was looking for.
pub struct MissingFile;

impl Handler for MissingFile {
    fn id(&self) -> &'static str {
        "guards.missing_file"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::FileNotFoundError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, _source: &str) -> bool {
        record.symbol().is_some_and(|path| !path.is_empty())
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let path = record
            .symbol()
            .ok_or_else(|| Unsupported("no file path extracted".to_string()))?;
        Ok(FixProposal::edit(
            self.id(),
            source.to_string(),
            format!("create missing file '{path}'"),
        )
        .with_confidence(0.7)
        .with_side_effect(SideEffect::WriteCompanionFile {
            path: PathBuf::from(path),
            contents: String::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ErrorKind, message: &str, line: Option<u32>, symbols: &[&str]) -> ErrorRecord {
        ErrorRecord {
            kind,
            message: message.to_string(),
            line,
            column: None,
            extracted_symbols: symbols.iter().map(|s| s.to_string()).collect(),
            confidence: 0.9,
        }
    }

    #[test]
    fn key_guard_rewrites_to_get() {
        let source = "d = {}\nprint(d['name'])\n";
        let rec = record(ErrorKind::KeyError, "'name'", Some(2), &["name"]);
        assert!(KeyGuard.can_handle(&rec, source));
        let proposal = KeyGuard.propose_fix(&rec, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "d = {}\nprint(d.get('name'))\n");
    }

    #[test]
    fn key_guard_finds_line_without_record_line() {
        let source = "d = {}\nx = d[\"k\"]\n";
        let rec = record(ErrorKind::KeyError, "'k'", None, &["k"]);
        let proposal = KeyGuard.propose_fix(&rec, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "d = {}\nx = d.get(\"k\")\n");
    }

    #[test]
    fn index_guard_wraps_subscript() {
        let source = "xs = [1]\nprint(xs[5])\n";
        let rec = record(ErrorKind::IndexError, "list index out of range", Some(2), &["list"]);
        let proposal = IndexGuard.propose_fix(&rec, source).expect("proposal");
        assert_eq!(
            proposal.new_source_text,
            "xs = [1]\nprint((xs[5] if 5 < len(xs) else None))\n"
        );
    }

    #[test]
    fn str_coercion_wraps_right_operand() {
        let source = "age = 3\nprint('age: ' + age)\n";
        let rec = record(
            ErrorKind::TypeError,
            "can only concatenate str (not \"int\") to str",
            Some(2),
            &["str", "int"],
        );
        assert!(StrCoercion.can_handle(&rec, source));
        let proposal = StrCoercion.propose_fix(&rec, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "age = 3\nprint('age: ' + str(age))\n");
    }

    #[test]
    fn int_coercion_goes_through_float() {
        let source = "n = int(value)\n";
        let rec = record(
            ErrorKind::ValueError,
            "invalid literal for int() with base 10: '3.5'",
            Some(1),
            &["3.5"],
        );
        let proposal = IntCoercion.propose_fix(&rec, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "n = int(float(value))\n");
    }

    #[test]
    fn zero_division_guards_denominator() {
        let source = "rate = total / count\n";
        let rec = record(ErrorKind::ZeroDivisionError, "division by zero", Some(1), &[]);
        let proposal = ZeroDivisionGuard.propose_fix(&rec, source).expect("proposal");
        assert_eq!(
            proposal.new_source_text,
            "rate = (total / count if count != 0 else 0)\n"
        );
    }

    #[test]
    fn missing_file_proposes_companion_file() {
        let rec = record(
            ErrorKind::FileNotFoundError,
            "[Errno 2] No such file or directory: 'data.txt'",
            Some(3),
            &["data.txt"],
        );
        let proposal = MissingFile.propose_fix(&rec, "open('data.txt')\n").expect("proposal");
        assert_eq!(
            proposal.side_effects,
            vec![SideEffect::WriteCompanionFile {
                path: PathBuf::from("data.txt"),
                contents: String::new(),
            }]
        );
    }
}
