//! Strategies for `NameError` and `AttributeError`.

use regex::Regex;

use crate::core::edit::{
    import_insert_index, indent_width, insert_line, nearest_identifier, replace_identifier,
};
use crate::core::record::{ErrorKind, ErrorRecord};
use crate::handlers::{Capability, FixProposal, Handler, HandlerDescriptor, Unsupported};

/// Undefined name to import statement, one unambiguous option per name.
const IMPORT_SUGGESTIONS: &[(&str, &str)] = &[
    ("sleep", "from time import sleep"),
    ("time", "import time"),
    ("datetime", "from datetime import datetime"),
    ("timedelta", "from datetime import timedelta"),
    ("date", "from datetime import date"),
    ("json", "import json"),
    ("os", "import os"),
    ("sys", "import sys"),
    ("random", "import random"),
    ("math", "import math"),
    ("defaultdict", "from collections import defaultdict"),
    ("Counter", "from collections import Counter"),
    ("OrderedDict", "from collections import OrderedDict"),
    ("namedtuple", "from collections import namedtuple"),
    ("deque", "from collections import deque"),
    ("Path", "from pathlib import Path"),
    ("glob", "import glob"),
    ("shutil", "import shutil"),
    ("tempfile", "import tempfile"),
    ("subprocess", "import subprocess"),
    ("threading", "import threading"),
    ("asyncio", "import asyncio"),
    ("pickle", "import pickle"),
    ("csv", "import csv"),
    ("sqlite3", "import sqlite3"),
    ("hashlib", "import hashlib"),
    ("base64", "import base64"),
    ("uuid", "import uuid"),
    ("logging", "import logging"),
    ("argparse", "import argparse"),
    ("itertools", "import itertools"),
    ("functools", "import functools"),
    ("re", "import re"),
    ("copy", "import copy"),
    ("statistics", "import statistics"),
    ("plt", "import matplotlib.pyplot as plt"),
];

/// Math builtins importable as `from math import <name>`.
const MATH_FUNCTIONS: &[&str] = &[
    "sqrt", "sin", "cos", "tan", "log", "exp", "ceil", "floor", "pi",
];

fn suggested_import(name: &str) -> Option<String> {
    if let Some((_, stmt)) = IMPORT_SUGGESTIONS.iter().find(|(n, _)| *n == name) {
        return Some((*stmt).to_string());
    }
    if MATH_FUNCTIONS.contains(&name) {
        return Some(format!("from math import {name}"));
    }
    None
}

/// Add the well-known import for an undefined name.
pub struct KnownImport;

impl Handler for KnownImport {
    fn id(&self) -> &'static str {
        "names.known_import"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::NameError],
            priority: 10,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        record.symbol().is_some_and(|name| {
            suggested_import(name).is_some_and(|stmt| !source.contains(&stmt))
        })
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let name = record
            .symbol()
            .ok_or_else(|| Unsupported("no undefined name extracted".to_string()))?;
        let statement = suggested_import(name)
            .ok_or_else(|| Unsupported(format!("no import suggestion for '{name}'")))?;
        if source.contains(&statement) {
            return Err(Unsupported("import already present".to_string()));
        }
        let new_source = insert_line(source, import_insert_index(source), &statement);
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("add '{statement}' for undefined name '{name}'"),
        )
        .with_confidence(0.85))
    }
}

/// Synthesize a placeholder function, or move an existing definition above
/// its first use when the failure is a forward reference.
pub struct StubFunction;

impl Handler for StubFunction {
    fn id(&self) -> &'static str {
        "names.stub_function"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::NameError],
            priority: 30,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        record
            .symbol()
            .is_some_and(|name| call_arity(name, source).is_some())
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let name = record
            .symbol()
            .ok_or_else(|| Unsupported("no undefined name extracted".to_string()))?;
        let arity = call_arity(name, source)
            .ok_or_else(|| Unsupported(format!("'{name}' is never called")))?;

        if let Some(new_source) = move_definition_above_use(name, source) {
            return Ok(FixProposal::edit(
                self.id(),
                new_source,
                format!("move 'def {name}' above its first use"),
            )
            .with_confidence(0.8));
        }
        if definition_index(name, source).is_some() {
            return Err(Unsupported(format!("'{name}' is already defined")));
        }

        let params: Vec<String> = (1..=arity).map(|i| format!("arg{i}")).collect();
        let stub = format!(
            "\n\ndef {name}({params}):\n    return None\n",
            params = params.join(", ")
        );
        let new_source = format!("{}{stub}", source.trim_end());
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("create placeholder function '{name}' with {arity} parameter(s)"),
        )
        .with_confidence(0.6))
    }
}

/// Number of arguments at the first call site, or `None` when the name is
/// never called with parentheses.
fn call_arity(name: &str, source: &str) -> Option<usize> {
    let pattern = Regex::new(&format!(r"\b{}\s*\(([^)]*)\)", regex::escape(name))).ok()?;
    let args = pattern.captures(source)?.get(1)?.as_str().trim().to_string();
    if args.is_empty() {
        return Some(0);
    }
    // Count top-level commas only; nested calls and subscripts don't split.
    let mut depth = 0i32;
    let mut count = 1usize;
    for c in args.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => count += 1,
            _ => {}
        }
    }
    Some(count)
}

fn definition_index(name: &str, source: &str) -> Option<usize> {
    let needle = format!("def {name}(");
    source
        .lines()
        .position(|line| line.trim_start().starts_with(&needle))
}

/// When `def name` appears after the first non-definition use, lift the whole
/// definition block to just below the import block.
fn move_definition_above_use(name: &str, source: &str) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let def_start = definition_index(name, source)?;
    let first_use = lines.iter().position(|line| {
        line.contains(name) && !line.trim_start().starts_with("def ")
    })?;
    if def_start <= first_use {
        return None;
    }

    let def_indent = indent_width(lines[def_start]);
    let mut def_end = lines.len();
    for (offset, line) in lines[def_start + 1..].iter().enumerate() {
        if !line.trim().is_empty() && indent_width(line) <= def_indent {
            def_end = def_start + 1 + offset;
            break;
        }
    }

    let block: Vec<&str> = lines[def_start..def_end].to_vec();
    let mut remaining: Vec<&str> = Vec::new();
    remaining.extend_from_slice(&lines[..def_start]);
    remaining.extend_from_slice(&lines[def_end..]);

    let insert_at = import_insert_index(&remaining.join("\n"));
    let mut out: Vec<&str> = Vec::new();
    out.extend_from_slice(&remaining[..insert_at]);
    out.extend_from_slice(&block);
    out.push("");
    out.extend_from_slice(&remaining[insert_at..]);

    let mut result = out.join("\n");
    if source.ends_with('\n') {
        result.push('\n');
    }
    Some(result)
}

/// Add the well-known import when a module attribute lookup failed
/// (`module 'x' has no attribute 'y'` with a known suggestion for `y`).
pub struct AttributeImport;

impl Handler for AttributeImport {
    fn id(&self) -> &'static str {
        "names.attribute_import"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::AttributeError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        missing_attribute(record).is_some_and(|attr| {
            suggested_import(attr).is_some_and(|stmt| !source.contains(&stmt))
        })
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let attr = missing_attribute(record)
            .ok_or_else(|| Unsupported("no attribute extracted".to_string()))?;
        let statement = suggested_import(attr)
            .ok_or_else(|| Unsupported(format!("no import suggestion for '{attr}'")))?;
        let new_source = insert_line(source, import_insert_index(source), &statement);
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("add '{statement}' for missing attribute '{attr}'"),
        )
        .with_confidence(0.6))
    }
}

/// The attribute name from `'X' object has no attribute 'Y'` records
/// (symbols are `[object, attribute]`).
fn missing_attribute(record: &ErrorRecord) -> Option<&str> {
    record.extracted_symbols.get(1).map(String::as_str)
}

/// Suggestion-only: rank existing identifiers by edit distance and propose
/// the nearest as a likely misspelling. Never auto-applied.
pub struct NearestName;

impl Handler for NearestName {
    fn id(&self) -> &'static str {
        "names.nearest_name"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::NameError, ErrorKind::AttributeError],
            priority: 40,
            capability: Capability::SuggestOnly,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        misspelled(record)
            .is_some_and(|name| nearest_identifier(source, name, 2).is_some())
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let name = misspelled(record)
            .ok_or_else(|| Unsupported("no symbol extracted".to_string()))?;
        let nearest = nearest_identifier(source, name, 2)
            .ok_or_else(|| Unsupported(format!("no identifier near '{name}'")))?;
        let new_source = replace_identifier(source, name, &nearest);
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("'{name}' looks like a misspelling of '{nearest}'"),
        )
        .with_confidence(0.5))
    }
}

fn misspelled(record: &ErrorRecord) -> Option<&str> {
    match record.kind {
        ErrorKind::AttributeError => missing_attribute(record),
        _ => record.symbol(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_record(name: &str) -> ErrorRecord {
        ErrorRecord {
            kind: ErrorKind::NameError,
            message: format!("name '{name}' is not defined"),
            line: Some(1),
            column: None,
            extracted_symbols: vec![name.to_string()],
            confidence: 0.95,
        }
    }

    #[test]
    fn adds_known_import_after_import_block() {
        let source = "import os\n\nsleep(1)\n";
        let record = name_record("sleep");
        assert!(KnownImport.can_handle(&record, source));
        let proposal = KnownImport.propose_fix(&record, source).expect("proposal");
        assert_eq!(proposal.new_source_text, "import os\nfrom time import sleep\n\nsleep(1)\n");
    }

    #[test]
    fn known_import_declines_when_already_present() {
        let source = "from time import sleep\nsleep(1)\n";
        assert!(!KnownImport.can_handle(&name_record("sleep"), source));
    }

    #[test]
    fn math_functions_import_from_math() {
        let source = "print(sqrt(4))\n";
        let proposal = KnownImport
            .propose_fix(&name_record("sqrt"), source)
            .expect("proposal");
        assert!(proposal.new_source_text.starts_with("from math import sqrt\n"));
    }

    #[test]
    fn stub_function_infers_arity_from_call_site() {
        let source = "result = combine(1, [2, 3], f(4))\nprint(result)\n";
        let proposal = StubFunction
            .propose_fix(&name_record("combine"), source)
            .expect("proposal");
        assert!(proposal.new_source_text.contains("def combine(arg1, arg2, arg3):"));
    }

    #[test]
    fn stub_function_moves_forward_reference_to_top() {
        let source = "print(helper())\n\ndef helper():\n    return 1\n";
        let proposal = StubFunction
            .propose_fix(&name_record("helper"), source)
            .expect("proposal");
        let def_pos = proposal.new_source_text.find("def helper").expect("def");
        let use_pos = proposal.new_source_text.find("print(helper").expect("use");
        assert!(def_pos < use_pos);
    }

    #[test]
    fn nearest_name_suggests_but_is_suggest_only() {
        let source = "def total(values):\n    return sum(values)\n\nprint(totl([1]))\n";
        let record = name_record("totl");
        assert!(NearestName.can_handle(&record, source));
        let proposal = NearestName.propose_fix(&record, source).expect("proposal");
        assert!(proposal.description.contains("total"));
        assert_eq!(
            NearestName.descriptor().capability,
            Capability::SuggestOnly
        );
        assert!(proposal.new_source_text.contains("print(total([1]))"));
    }

    #[test]
    fn attribute_import_uses_second_symbol() {
        let record = ErrorRecord {
            kind: ErrorKind::AttributeError,
            message: "module 'mod' has no attribute 'sleep'".to_string(),
            line: Some(2),
            column: None,
            extracted_symbols: vec!["mod".to_string(), "sleep".to_string()],
            confidence: 0.9,
        };
        let source = "import mod\nmod.sleep(1)\n";
        assert!(AttributeImport.can_handle(&record, source));
    }
}
