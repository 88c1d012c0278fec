//! Turn parsed calls into target declarations

use std::path::Path;

use thicket_core::{Address, Call, DependencyRef, SourceSpec, TargetDecl, Value};

use crate::config::Config;
use crate::error::LoadError;
use crate::parser::CallSite;

/// Glob helpers accepted in `sources`.
const GLOB_FUNCTIONS: &[&str] = &["globs", "rglobs", "zglobs"];

/// Load every call in one manifest.
///
/// `manifest` is the manifest path relative to the build root; its parent
/// directory becomes the spec path of every target it declares. All errors
/// in the file are returned, not just the first.
pub fn load_calls(calls: &[CallSite], manifest: &Path, config: &Config) -> Result<Vec<TargetDecl>, Vec<LoadError>> {
    let spec_path = spec_path_of(manifest);
    let mut decls = Vec::new();
    let mut errors = Vec::new();

    for site in calls {
        if config.is_ignored_alias(&site.call.alias) {
            tracing::debug!("Skipping {}() at {}:{}", site.call.alias, manifest.display(), site.line);
            continue;
        }
        let mut ctx = CallContext {
            manifest,
            line: site.line,
            spec_path: &spec_path,
            errors: Vec::new(),
        };
        if let Some(decl) = ctx.load(&site.call, config) {
            if ctx.errors.is_empty() {
                decls.push(decl);
            }
        }
        errors.extend(ctx.errors);
    }

    if errors.is_empty() { Ok(decls) } else { Err(errors) }
}

/// Directory of a manifest as a `/`-separated spec path.
pub fn spec_path_of(manifest: &Path) -> String {
    manifest
        .parent()
        .map(|dir| {
            dir.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

struct CallContext<'a> {
    manifest: &'a Path,
    line: u32,
    spec_path: &'a str,
    errors: Vec<LoadError>,
}

impl CallContext<'_> {
    fn wrong_type(&mut self, field: &str, expected: &'static str, found: &Value) {
        self.errors.push(LoadError::WrongType {
            file: self.manifest.to_path_buf(),
            line: self.line,
            field: field.to_string(),
            expected,
            found: found.type_name(),
        });
    }

    fn invalid(&mut self, message: String) {
        self.errors.push(LoadError::Invalid {
            file: self.manifest.to_path_buf(),
            line: self.line,
            message,
        });
    }

    fn load(&mut self, call: &Call, config: &Config) -> Option<TargetDecl> {
        if !call.args.is_empty() {
            self.errors.push(LoadError::Positional {
                file: self.manifest.to_path_buf(),
                line: self.line,
                alias: call.alias.clone(),
            });
        }

        let name = match call.kwarg("name") {
            Some(Value::Str(name)) => name,
            Some(other) => {
                self.wrong_type("name", "a string", other);
                return None;
            }
            None => {
                self.errors.push(LoadError::MissingName {
                    file: self.manifest.to_path_buf(),
                    line: self.line,
                    alias: call.alias.clone(),
                });
                return None;
            }
        };

        let address = match Address::new(self.spec_path, name) {
            Ok(address) => address,
            Err(source) => {
                self.errors.push(LoadError::Address {
                    file: self.manifest.to_path_buf(),
                    line: self.line,
                    source,
                });
                return None;
            }
        };

        let mut decl = TargetDecl::new(address, call.alias.clone(), self.manifest.to_path_buf(), self.line);
        decl.kind = config.kind_for(&call.alias);

        if call.kwarg("source").is_some() && call.kwarg("sources").is_some() {
            self.invalid(format!("{}() takes `source` or `sources`, not both", call.alias));
        }

        for (key, value) in &call.kwargs {
            match key.as_str() {
                "name" => {}
                "source" => match value {
                    Value::Str(file) => decl.sources.push(SourceSpec::Files(vec![file.clone()])),
                    Value::None => {}
                    other => self.wrong_type("source", "a string", other),
                },
                "sources" => self.sources(value, &mut decl),
                "dependencies" => self.dependencies(value, &mut decl),
                "tags" => {
                    if let Some(tags) = self.string_list("tags", value) {
                        decl.tags.extend(tags);
                    }
                }
                "timeout" => match value {
                    Value::Int(n) if *n >= 0 => decl.timeout = Some(*n as u64),
                    Value::Int(n) => self.invalid(format!("`timeout` must not be negative, found {}", n)),
                    Value::None => {}
                    other => self.wrong_type("timeout", "a non-negative integer", other),
                },
                "description" => match value {
                    Value::Str(text) => decl.description = Some(text.clone()),
                    Value::None => {}
                    other => self.wrong_type("description", "a string", other),
                },
                _ => {
                    decl.extra.insert(key.clone(), value.clone());
                }
            }
        }

        Some(decl)
    }

    /// Items of a list, tuple or set.
    fn sequence<'v>(&mut self, field: &str, value: &'v Value) -> Option<&'v [Value]> {
        match value {
            Value::List(items) | Value::Tuple(items) => Some(items.as_slice()),
            other => {
                self.wrong_type(field, "a list of strings", other);
                None
            }
        }
    }

    fn string_list(&mut self, field: &str, value: &Value) -> Option<Vec<String>> {
        let items = self.sequence(field, value)?;
        let mut strings = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Str(s) => strings.push(s.clone()),
                other => {
                    self.wrong_type(field, "a list of strings", other);
                    return None;
                }
            }
        }
        Some(strings)
    }

    fn dependencies(&mut self, value: &Value, decl: &mut TargetDecl) {
        let Some(specs) = self.string_list("dependencies", value) else {
            return;
        };
        for raw in specs {
            match Address::parse(&raw, self.spec_path) {
                Ok(address) => {
                    if !decl.add_dependency(DependencyRef { raw: raw.clone(), address }) {
                        tracing::debug!("{} lists {} more than once", decl.address, raw);
                    }
                }
                Err(source) => self.errors.push(LoadError::Address {
                    file: self.manifest.to_path_buf(),
                    line: self.line,
                    source,
                }),
            }
        }
    }

    fn sources(&mut self, value: &Value, decl: &mut TargetDecl) {
        match value {
            Value::None => {}
            Value::Str(file) => decl.sources.push(SourceSpec::Files(vec![file.clone()])),
            Value::Call(call) => {
                if let Some(spec) = self.glob_call(call) {
                    decl.sources.push(spec);
                }
            }
            Value::List(items) | Value::Tuple(items) => {
                let mut files = Vec::new();
                for item in items {
                    match item {
                        Value::Str(file) => files.push(file.clone()),
                        Value::Call(call) => {
                            if let Some(spec) = self.glob_call(call) {
                                decl.sources.push(spec);
                            }
                        }
                        other => self.wrong_type("sources", "strings or glob calls", other),
                    }
                }
                if !files.is_empty() {
                    decl.sources.insert(0, SourceSpec::Files(files));
                }
            }
            other => self.wrong_type("sources", "a string, list or glob call", other),
        }
    }

    fn glob_call(&mut self, call: &Call) -> Option<SourceSpec> {
        if !GLOB_FUNCTIONS.contains(&call.alias.as_str()) {
            self.invalid(format!(
                "unknown source function {}(); expected one of {}",
                call.alias,
                GLOB_FUNCTIONS.join(", ")
            ));
            return None;
        }

        let mut include = Vec::new();
        for arg in &call.args {
            match arg {
                Value::Str(pattern) => include.push(pattern.clone()),
                other => {
                    self.wrong_type(&format!("{}() pattern", call.alias), "a string", other);
                    return None;
                }
            }
        }

        let mut exclude = Vec::new();
        for (key, value) in &call.kwargs {
            if key != "exclude" {
                self.invalid(format!("{}() got unexpected keyword `{}`", call.alias, key));
                return None;
            }
            let Some(items) = self.sequence("exclude", value) else {
                return None;
            };
            for item in items {
                match item {
                    Value::Str(pattern) => exclude.push(pattern.clone()),
                    // exclude=[globs('*_slow.py')] excludes what the inner glob includes
                    Value::Call(inner) => match self.glob_call(inner) {
                        Some(SourceSpec::Globs { include: inner_include, recursive, .. }) => {
                            exclude.extend(inner_include.into_iter().map(|p| recursive_pattern(&p, recursive)));
                        }
                        _ => return None,
                    },
                    other => {
                        self.wrong_type("exclude", "strings or glob calls", other);
                        return None;
                    }
                }
            }
        }

        Some(SourceSpec::Globs {
            include,
            exclude,
            recursive: call.alias == "rglobs",
        })
    }
}

/// `rglobs('*.py')` means `**/*.py`.
pub fn recursive_pattern(pattern: &str, recursive: bool) -> String {
    if recursive && !pattern.starts_with("**/") {
        format!("**/{}", pattern)
    } else {
        pattern.to_string()
    }
}
