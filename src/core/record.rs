//! Error taxonomy and the structured failure record.
//!
//! These types define stable contracts between the parser, the handler
//! registry and the orchestrator. They carry no I/O and must remain
//! deterministic across runs.

use serde::{Deserialize, Serialize};

/// Raw failure captured from a script execution, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFailure {
    /// Full stderr text of the failed process.
    pub stderr: String,
    /// Process exit code, when the platform reports one.
    pub exit_code: Option<i32>,
}

/// Closed classification of runtime failures.
///
/// Unrecognized type names map to [`ErrorKind::Unknown`] so future Python
/// exception types degrade gracefully instead of breaking the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SyntaxError,
    IndentationError,
    ModuleNotFoundError,
    ImportError,
    TypeError,
    IndexError,
    NameError,
    AttributeError,
    KeyError,
    ZeroDivisionError,
    FileNotFoundError,
    ValueError,
    Unknown,
}

impl ErrorKind {
    /// Classify a Python exception type name.
    ///
    /// `TabError` folds into `IndentationError` (it is a subclass and the
    /// indentation strategies cover it).
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "SyntaxError" => Self::SyntaxError,
            "IndentationError" | "TabError" => Self::IndentationError,
            "ModuleNotFoundError" => Self::ModuleNotFoundError,
            "ImportError" => Self::ImportError,
            "TypeError" => Self::TypeError,
            "IndexError" => Self::IndexError,
            "NameError" => Self::NameError,
            "AttributeError" => Self::AttributeError,
            "KeyError" => Self::KeyError,
            "ZeroDivisionError" => Self::ZeroDivisionError,
            "FileNotFoundError" => Self::FileNotFoundError,
            "ValueError" => Self::ValueError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "SyntaxError",
            Self::IndentationError => "IndentationError",
            Self::ModuleNotFoundError => "ModuleNotFoundError",
            Self::ImportError => "ImportError",
            Self::TypeError => "TypeError",
            Self::IndexError => "IndexError",
            Self::NameError => "NameError",
            Self::AttributeError => "AttributeError",
            Self::KeyError => "KeyError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::FileNotFoundError => "FileNotFoundError",
            Self::ValueError => "ValueError",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(kind, message, line)` tuple used to detect ineffective-fix loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<u32>,
}

/// Structured representation of a classified runtime failure.
///
/// Constructed once by the parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Raw message text after the `Type:` prefix.
    pub message: String,
    /// 1-based line in the target script, from the innermost matching frame.
    pub line: Option<u32>,
    /// 1-based column, currently only available for syntax-class errors.
    pub column: Option<u32>,
    /// Salient tokens pulled from the message, in capture order
    /// (e.g. the missing module name, the offending key).
    pub extracted_symbols: Vec<String>,
    /// Classification confidence in `0.0..=1.0`.
    pub confidence: f32,
}

impl ErrorRecord {
    pub fn signature(&self) -> Signature {
        Signature {
            kind: self.kind,
            message: self.message.clone(),
            line: self.line,
        }
    }

    /// First extracted symbol, when the rule table pulled one.
    pub fn symbol(&self) -> Option<&str> {
        self.extracted_symbols.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_type_names() {
        assert_eq!(
            ErrorKind::from_type_name("ModuleNotFoundError"),
            ErrorKind::ModuleNotFoundError
        );
        assert_eq!(
            ErrorKind::from_type_name("TabError"),
            ErrorKind::IndentationError
        );
        assert_eq!(ErrorKind::from_type_name("OSError"), ErrorKind::Unknown);
    }

    #[test]
    fn signature_carries_kind_message_line() {
        let record = ErrorRecord {
            kind: ErrorKind::KeyError,
            message: "'name'".to_string(),
            line: Some(4),
            column: None,
            extracted_symbols: vec!["name".to_string()],
            confidence: 0.9,
        };
        let sig = record.signature();
        assert_eq!(sig.kind, ErrorKind::KeyError);
        assert_eq!(sig.line, Some(4));
        assert_eq!(sig.message, "'name'");
    }
}
