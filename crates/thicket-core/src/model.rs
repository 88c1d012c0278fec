//! Core data structures for declared targets

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Stable identifier for a target node inside a `BuildGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct TargetId(pub u32);

/// What a target declares itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Library,
    TestSuite,
    Binary,
    Page,
    Resources,
    Other,
}

impl TargetKind {
    /// Infer the kind from the alias a target was declared with.
    pub fn from_alias(alias: &str) -> Self {
        match alias {
            "library" => TargetKind::Library,
            "test_suite" | "junit_tests" => TargetKind::TestSuite,
            "page" => TargetKind::Page,
            "resources" => TargetKind::Resources,
            a if a.ends_with("_library") => TargetKind::Library,
            a if a.ends_with("_tests") || a.ends_with("_test") => TargetKind::TestSuite,
            a if a.ends_with("_binary") => TargetKind::Binary,
            _ => TargetKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Library => "library",
            TargetKind::TestSuite => "test-suite",
            TargetKind::Binary => "binary",
            TargetKind::Page => "page",
            TargetKind::Resources => "resources",
            TargetKind::Other => "other",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "library" => Ok(TargetKind::Library),
            "test-suite" | "test_suite" => Ok(TargetKind::TestSuite),
            "binary" => Ok(TargetKind::Binary),
            "page" => Ok(TargetKind::Page),
            "resources" => Ok(TargetKind::Resources),
            "other" => Ok(TargetKind::Other),
            other => Err(format!("unknown target kind `{}`", other)),
        }
    }
}

/// A literal value appearing as a manifest argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Call(Call),
}

impl Value {
    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Call(_) => "call",
        }
    }
}

/// A call-like entry: `alias(positional, key=value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub alias: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl Call {
    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Source file patterns owned by a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    /// Literal paths relative to the manifest directory.
    Files(Vec<String>),
    /// `globs(...)` / `rglobs(...)` / `zglobs(...)`.
    Globs {
        include: Vec<String>,
        exclude: Vec<String>,
        recursive: bool,
    },
}

/// An unresolved reference to another target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    /// The reference exactly as written in the manifest.
    pub raw: String,
    /// The reference normalised against the declaring directory.
    pub address: Address,
}

/// A single target as declared in a manifest, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDecl {
    pub address: Address,
    pub alias: String,
    pub kind: TargetKind,
    pub sources: Vec<SourceSpec>,
    /// Source files matched by `sources`, relative to the build root.
    #[serde(default)]
    pub source_files: Vec<String>,
    /// Sorted by address, one entry per address.
    pub dependencies: Vec<DependencyRef>,
    pub tags: BTreeSet<String>,
    pub timeout: Option<u64>,
    pub description: Option<String>,
    pub extra: BTreeMap<String, Value>,
    /// Manifest file, relative to the build root.
    pub manifest: PathBuf,
    pub line: u32,
}

impl TargetDecl {
    pub fn new(address: Address, alias: impl Into<String>, manifest: PathBuf, line: u32) -> Self {
        let alias = alias.into();
        TargetDecl {
            address,
            kind: TargetKind::from_alias(&alias),
            alias,
            sources: Vec::new(),
            source_files: Vec::new(),
            dependencies: Vec::new(),
            tags: BTreeSet::new(),
            timeout: None,
            description: None,
            extra: BTreeMap::new(),
            manifest,
            line,
        }
    }

    /// Add a dependency. Returns false if the address was already present.
    pub fn add_dependency(&mut self, dep: DependencyRef) -> bool {
        match self
            .dependencies
            .binary_search_by(|existing| existing.address.cmp(&dep.address))
        {
            Ok(_) => false,
            Err(pos) => {
                self.dependencies.insert(pos, dep);
                true
            }
        }
    }

    /// `manifest:line`, for diagnostics.
    pub fn location(&self) -> String {
        format!("{}:{}", self.manifest.display(), self.line)
    }

    /// Compare everything except where in the manifest the target sits.
    pub fn same_declaration(&self, other: &TargetDecl) -> bool {
        self.address == other.address
            && self.alias == other.alias
            && self.kind == other.kind
            && self.sources == other.sources
            && self.source_files == other.source_files
            && self.dependencies == other.dependencies
            && self.tags == other.tags
            && self.timeout == other.timeout
            && self.description == other.description
            && self.extra == other.extra
    }
}

/// A resolved dependency edge. Points from the dependent to the dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub raw: String,
}
