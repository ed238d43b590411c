//! Strategies for `ModuleNotFoundError` and `ImportError`.

use std::path::PathBuf;

use crate::core::record::{ErrorKind, ErrorRecord};
use crate::handlers::{
    Capability, FixProposal, Handler, HandlerDescriptor, SideEffect, Unsupported,
};

/// Modules resolvable from PyPI, used to decide between installing and
/// stubbing. Kept as a declarative table like the extraction rules.
const KNOWN_PACKAGES: &[&str] = &[
    "requests", "numpy", "pandas", "matplotlib", "scipy", "sklearn", "tensorflow", "torch",
    "flask", "django", "fastapi", "sqlalchemy", "pymongo", "redis", "celery", "pytest",
    "pydantic", "click", "typer", "rich", "tqdm", "pillow", "lxml", "selenium", "openpyxl",
    "pytz", "cryptography", "bcrypt", "httpx", "aiohttp", "uvicorn", "streamlit", "plotly",
    "seaborn", "networkx", "sympy", "nltk", "spacy", "transformers",
];

/// Import-name to distribution-name mapping (`import cv2` installs
/// `opencv-python`).
const PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("cv2", "opencv-python"),
    ("PIL", "pillow"),
    ("sklearn", "scikit-learn"),
    ("bs4", "beautifulsoup4"),
    ("yaml", "pyyaml"),
    ("dateutil", "python-dateutil"),
    ("jwt", "PyJWT"),
    ("psycopg2", "psycopg2-binary"),
];

/// Standard-library modules a failing `from X import Y` can never be fixed
/// for by installing or stubbing.
const STDLIB_MODULES: &[&str] = &[
    "os", "sys", "json", "math", "time", "datetime", "pathlib", "collections", "itertools",
    "functools", "re", "string", "random", "subprocess", "typing", "io", "csv", "pickle",
    "logging", "argparse", "shutil", "tempfile", "threading", "asyncio", "uuid", "hashlib",
    "base64", "socket", "urllib", "http", "statistics", "decimal", "copy", "operator",
];

/// Distribution name for a missing module, when it is a known package.
fn known_package(module: &str) -> Option<&'static str> {
    let base = module.split('.').next().unwrap_or(module);
    if let Some((_, dist)) = PACKAGE_ALIASES.iter().find(|(name, _)| *name == base) {
        return Some(dist);
    }
    KNOWN_PACKAGES.iter().find(|&&name| name == base).copied()
}

fn is_stdlib(module: &str) -> bool {
    let base = module.split('.').next().unwrap_or(module);
    STDLIB_MODULES.contains(&base)
}

/// Delegate to the package-manager collaborator for known packages.
/// Only registered when the session authorizes installs.
pub struct InstallPackage;

impl Handler for InstallPackage {
    fn id(&self) -> &'static str {
        "imports.install_package"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::ModuleNotFoundError, ErrorKind::ImportError],
            priority: 10,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, _source: &str) -> bool {
        missing_module(record).is_some_and(|module| known_package(module).is_some())
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let module = missing_module(record)
            .ok_or_else(|| Unsupported("no module name extracted".to_string()))?;
        let package = known_package(module)
            .ok_or_else(|| Unsupported(format!("'{module}' is not a known package")))?;
        Ok(FixProposal::edit(
            self.id(),
            source.to_string(),
            format!("install package '{package}' for module '{module}'"),
        )
        .with_confidence(0.8)
        .with_side_effect(SideEffect::InstallPackage(package.to_string())))
    }
}

/// Synthesize a placeholder module next to the script. Dotted paths create
/// package directories with `__init__.py` files.
pub struct ModuleStub;

impl Handler for ModuleStub {
    fn id(&self) -> &'static str {
        "imports.module_stub"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::ModuleNotFoundError],
            priority: 20,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, _source: &str) -> bool {
        missing_module(record).is_some_and(|module| !is_stdlib(module))
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let module = missing_module(record)
            .ok_or_else(|| Unsupported("no module name extracted".to_string()))?;
        if !module
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'))
        {
            return Err(Unsupported(format!("'{module}' is not a plain module path")));
        }

        let parts: Vec<&str> = module.split('.').collect();
        let mut proposal = FixProposal::edit(
            self.id(),
            source.to_string(),
            format!("create placeholder module '{module}' next to the script"),
        )
        .with_confidence(0.7);

        let mut dir = PathBuf::new();
        for part in &parts[..parts.len() - 1] {
            dir.push(part);
            proposal = proposal.with_side_effect(SideEffect::WriteCompanionFile {
                path: dir.join("__init__.py"),
                contents: String::new(),
            });
        }
        let stub = "\
\"\"\"Placeholder module generated while auto-fixing a missing import.\"\"\"


def placeholder_function():
    return None
";
        proposal = proposal.with_side_effect(SideEffect::WriteCompanionFile {
            path: dir.join(format!("{}.py", parts[parts.len() - 1])),
            contents: stub.to_string(),
        });
        Ok(proposal)
    }
}

/// Comment out `from <stdlib> import <name>` lines that can never succeed:
/// the symbol does not exist in the standard-library module.
pub struct RemoveStdlibImport;

impl Handler for RemoveStdlibImport {
    fn id(&self) -> &'static str {
        "imports.remove_stdlib_import"
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            covers: &[ErrorKind::ImportError],
            priority: 15,
            capability: Capability::AutoFix,
        }
    }

    fn can_handle(&self, record: &ErrorRecord, source: &str) -> bool {
        match import_pair(record) {
            Some((name, module)) => {
                is_stdlib(module) && import_line_index(source, name, module).is_some()
            }
            None => false,
        }
    }

    fn propose_fix(
        &self,
        record: &ErrorRecord,
        source: &str,
    ) -> Result<FixProposal, Unsupported> {
        let (name, module) = import_pair(record)
            .ok_or_else(|| Unsupported("no name/module pair extracted".to_string()))?;
        let index = import_line_index(source, name, module)
            .ok_or_else(|| Unsupported("failing import line not found".to_string()))?;

        let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
        lines[index] = format!("# {}  # symbol does not exist", lines[index]);
        let mut new_source = lines.join("\n");
        if source.ends_with('\n') {
            new_source.push('\n');
        }
        Ok(FixProposal::edit(
            self.id(),
            new_source,
            format!("comment out impossible import of '{name}' from stdlib '{module}'"),
        )
        .with_confidence(0.7))
    }
}

/// `(name, module)` from a `cannot import name 'X' from 'Y'` record.
fn import_pair(record: &ErrorRecord) -> Option<(&str, &str)> {
    match record.extracted_symbols.as_slice() {
        [name, module, ..] => Some((name.as_str(), module.as_str())),
        _ => None,
    }
}

fn missing_module(record: &ErrorRecord) -> Option<&str> {
    // ImportError extraction may yield (name, module); module-not-found
    // extraction yields just the module.
    match record.kind {
        ErrorKind::ImportError if record.extracted_symbols.len() == 2 => {
            record.extracted_symbols.get(1).map(String::as_str)
        }
        _ => record.symbol(),
    }
}

fn import_line_index(source: &str, name: &str, module: &str) -> Option<usize> {
    let needle = format!("from {module} import {name}");
    source
        .lines()
        .position(|line| line.trim_start().starts_with(&needle))
}
