//! Fix strategies and the priority-ordered handler registry.
//!
//! A [`Handler`] inspects a classified failure plus the current source text
//! and proposes a replacement source. Handlers never write files; the
//! orchestrator applies proposals inside a backup scope. The registry is an
//! explicit value built at session start, not a process-wide singleton, so
//! selection stays deterministic and testable.

pub mod guards;
pub mod imports;
pub mod names;
pub mod syntax;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::record::{ErrorKind, ErrorRecord};

/// Whether a handler's proposals may be applied automatically or are only
/// surfaced to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    AutoFix,
    SuggestOnly,
}

/// Static registration metadata for a handler.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    /// Error kinds this handler is a candidate for.
    pub covers: &'static [ErrorKind],
    /// Lower value wins. Ties resolve by registration order.
    pub priority: u8,
    pub capability: Capability,
}

/// A filesystem action that accompanies a source edit (creating a stub
/// module, installing a package). Kept declarative so handlers stay pure;
/// the orchestrator applies these inside the backup scope and removes
/// created files on rollback. Relative paths resolve against the script's
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffect {
    InstallPackage(String),
    WriteCompanionFile { path: PathBuf, contents: String },
}

/// A candidate source-text edit produced by a handler, not yet applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixProposal {
    /// Full replacement text for the target script.
    pub new_source_text: String,
    pub description: String,
    pub confidence: f32,
    pub handler_id: &'static str,
    pub side_effects: Vec<SideEffect>,
}

impl FixProposal {
    pub fn edit(handler_id: &'static str, new_source_text: String, description: String) -> Self {
        Self {
            new_source_text,
            description,
            confidence: 0.8,
            handler_id,
            side_effects: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_side_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }
}

/// The handler matched at the registry level but cannot construct a concrete
/// edit for the actual code shape. Selection falls through to the next
/// candidate.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no concrete edit for this code shape: {0}")]
pub struct Unsupported(pub String);

/// Strategy object proposing fixes for one or more error kinds.
pub trait Handler {
    fn id(&self) -> &'static str;
    fn descriptor(&self) -> HandlerDescriptor;

    /// Pure predicate over the record and a snapshot of the source.
    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool;

    /// Build a concrete proposal. Must not touch the filesystem.
    fn propose_fix(&self, record: &ErrorRecord, source: &str)
    -> Result<FixProposal, Unsupported>;
}

/// Priority-ordered handler registry, keyed by error kind.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
    // kind -> handler indices ordered by (priority, registration order)
    by_kind: HashMap<ErrorKind, Vec<usize>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            by_kind: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Box<dyn Handler>) {
        let descriptor = handler.descriptor();
        let index = self.handlers.len();
        self.handlers.push(handler);
        let handlers = &self.handlers;
        for kind in descriptor.covers {
            let entries = self.by_kind.entry(*kind).or_default();
            entries.push(index);
            // Stable sort keeps registration order among equal priorities.
            entries.sort_by_key(|&i| handlers[i].descriptor().priority);
        }
    }

    /// Candidates for a kind in selection order.
    pub fn candidates(&self, kind: ErrorKind) -> impl Iterator<Item = &dyn Handler> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|&i| self.handlers[i].as_ref())
    }

    /// First candidate whose `can_handle` is true, or `None` to signal
    /// escalation (suggestion-only report or the AI fallback collaborator).
    pub fn select(&self, record: &ErrorRecord, source: &str) -> Option<&dyn Handler> {
        self.candidates(record.kind)
            .find(|handler| handler.can_handle(record, source))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the full strategy set.
///
/// `allow_install` gates registration of the package-install strategy; when
/// the session is not authorized to install, the stub-module strategy covers
/// missing modules instead.
pub fn default_registry(allow_install: bool) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register(Box::new(syntax::MissingColon));
    registry.register(Box::new(syntax::PrintStatement));
    registry.register(Box::new(syntax::TabsToSpaces));
    registry.register(Box::new(syntax::IndentBlock));

    if allow_install {
        registry.register(Box::new(imports::InstallPackage));
    }
    registry.register(Box::new(imports::RemoveStdlibImport));
    registry.register(Box::new(imports::ModuleStub));

    registry.register(Box::new(names::KnownImport));
    registry.register(Box::new(names::StubFunction));
    registry.register(Box::new(names::AttributeImport));
    registry.register(Box::new(names::NearestName));

    registry.register(Box::new(guards::KeyGuard));
    registry.register(Box::new(guards::IndexGuard));
    registry.register(Box::new(guards::StrCoercion));
    registry.register(Box::new(guards::IntCoercion));
    registry.register(Box::new(guards::ZeroDivisionGuard));
    registry.register(Box::new(guards::MissingFile));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        id: &'static str,
        priority: u8,
        handles: bool,
    }

    impl Handler for Fixed {
        fn id(&self) -> &'static str {
            self.id
        }

        fn descriptor(&self) -> HandlerDescriptor {
            HandlerDescriptor {
                covers: &[ErrorKind::NameError],
                priority: self.priority,
                capability: Capability::AutoFix,
            }
        }

        fn can_handle(&self, _record: &ErrorRecord, _source: &str) -> bool {
            self.handles
        }

        fn propose_fix(
            &self,
            _record: &ErrorRecord,
            source: &str,
        ) -> Result<FixProposal, Unsupported> {
            Ok(FixProposal::edit(self.id, source.to_string(), "noop".into()))
        }
    }

    fn name_error() -> ErrorRecord {
        ErrorRecord {
            kind: ErrorKind::NameError,
            message: "name 'x' is not defined".to_string(),
            line: Some(1),
            column: None,
            extracted_symbols: vec!["x".to_string()],
            confidence: 0.95,
        }
    }

    #[test]
    fn selects_lowest_priority_first() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Fixed {
            id: "low",
            priority: 30,
            handles: true,
        }));
        registry.register(Box::new(Fixed {
            id: "high",
            priority: 10,
            handles: true,
        }));

        let selected = registry.select(&name_error(), "").expect("handler");
        assert_eq!(selected.id(), "high");
    }

    #[test]
    fn ties_resolve_by_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Fixed {
            id: "first",
            priority: 10,
            handles: true,
        }));
        registry.register(Box::new(Fixed {
            id: "second",
            priority: 10,
            handles: true,
        }));

        let selected = registry.select(&name_error(), "").expect("handler");
        assert_eq!(selected.id(), "first");
    }

    #[test]
    fn skips_non_matching_candidates() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Fixed {
            id: "declines",
            priority: 10,
            handles: false,
        }));
        registry.register(Box::new(Fixed {
            id: "accepts",
            priority: 20,
            handles: true,
        }));

        let selected = registry.select(&name_error(), "").expect("handler");
        assert_eq!(selected.id(), "accepts");
    }

    #[test]
    fn returns_none_when_no_candidate_matches() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Fixed {
            id: "declines",
            priority: 10,
            handles: false,
        }));
        assert!(registry.select(&name_error(), "").is_none());

        let mut unknown = name_error();
        unknown.kind = ErrorKind::Unknown;
        assert!(registry.select(&unknown, "").is_none());
    }

    #[test]
    fn default_registry_covers_every_fixable_kind() {
        let registry = default_registry(false);
        for kind in [
            ErrorKind::SyntaxError,
            ErrorKind::IndentationError,
            ErrorKind::ModuleNotFoundError,
            ErrorKind::ImportError,
            ErrorKind::TypeError,
            ErrorKind::IndexError,
            ErrorKind::NameError,
            ErrorKind::AttributeError,
            ErrorKind::KeyError,
            ErrorKind::ZeroDivisionError,
            ErrorKind::FileNotFoundError,
            ErrorKind::ValueError,
        ] {
            assert!(
                registry.candidates(kind).next().is_some(),
                "no candidate registered for {kind}"
            );
        }
        assert!(registry.candidates(ErrorKind::Unknown).next().is_none());
    }

    #[test]
    fn install_handler_only_present_when_authorized() {
        let without = default_registry(false);
        let with = default_registry(true);
        assert_eq!(with.len(), without.len() + 1);
    }
}
