//! Configuration validation engine.
//!
//! Checks a config file against the known schema, flags unknown or
//! misspelled fields, and reports settings that parse but cannot work.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    env_subst::substitute_env,
    schema::{ModgraphConfig, ModuleConfig, RateLimitConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "invalid-value",
    /// "security", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "server.bnd"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Expected shape of the configuration.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A map with dynamic keys whose values have a known shape.
    Map(Box<KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    let rate_limit = || Struct(HashMap::from([("max_calls", Leaf), ("window_secs", Leaf)]));

    let module = Struct(HashMap::from([
        ("enabled", Leaf),
        ("require_session", Leaf),
        ("permissions", Leaf),
        ("operation_permissions", Map(Box::new(Leaf))),
        ("audit", Leaf),
        ("rate_limit", rate_limit()),
    ]));

    Struct(HashMap::from([
        ("server", Struct(HashMap::from([("bind", Leaf), ("port", Leaf)]))),
        (
            "graphql",
            Struct(HashMap::from([
                ("graphiql", Leaf),
                ("request_timeout_secs", Leaf),
                ("schema_dir", Leaf),
            ])),
        ),
        (
            "sessions",
            Struct(HashMap::from([
                ("cookie_name", Leaf),
                ("header_name", Leaf),
                ("ttl_secs", Leaf),
                ("lookup_timeout_ms", Leaf),
            ])),
        ),
        (
            "throttle",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("max_calls", Leaf),
                ("window_secs", Leaf),
            ])),
        ),
        ("modules", Map(Box::new(module))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered config file
/// if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let diagnostics = match std::fs::read_to_string(&actual_path) {
        Ok(content) => {
            let format = actual_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("toml");
            validate_str(&substitute_env(&content), format)
        },
        Err(e) => vec![Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: format!("failed to read config file: {e}"),
        }],
    };

    ValidationResult {
        diagnostics,
        config_path: Some(actual_path),
    }
}

/// Validate TOML text without touching the filesystem (beyond `schema_dir`
/// existence checks).
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    ValidationResult {
        diagnostics: validate_str(toml_str, "toml"),
        config_path: None,
    }
}

fn validate_str(raw: &str, format: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let value = match parse_value(raw, format) {
        Ok(v) => v,
        Err(message) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message,
            });
            return diagnostics;
        },
    };

    // 2. Unknown fields
    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    // 3. Types, then semantics on the typed config
    match serde_json::from_value::<ModgraphConfig>(value) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    diagnostics
}

fn parse_value(raw: &str, format: &str) -> Result<serde_json::Value, String> {
    match format {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| format!("TOML syntax error: {e}"))
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<serde_json::Value>(raw)
            .map_err(|e| format!("YAML syntax error: {e}")),
        "json" => serde_json::from_str(raw).map_err(|e| format!("JSON syntax error: {e}")),
        other => Err(format!("unsupported config format: .{other}")),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Walk the value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let serde_json::Value::Object(table) = value else {
        // Leaf or type mismatch; type errors are reported later.
        return;
    };
    match schema {
        KnownKeys::Struct(fields) => {
            let known: Vec<&str> = fields.keys().copied().collect();
            for (key, child) in table {
                let path = join_path(prefix, key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child, child_schema, &path, diagnostics);
                    continue;
                }
                let level = if prefix.is_empty() {
                    "unknown field at top level"
                } else {
                    "unknown field"
                };
                let message = match suggest(key, &known, 3) {
                    Some(s) => format!("{level} (did you mean \"{s}\"?)"),
                    None => level.to_string(),
                };
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "unknown-field",
                    path,
                    message,
                });
            }
        },
        KnownKeys::Map(value_schema) => {
            for (key, child) in table {
                check_unknown_fields(child, value_schema, &join_path(prefix, key), diagnostics);
            }
        },
        KnownKeys::Leaf => {},
    }
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        category: "invalid-value",
        path: path.into(),
        message: message.into(),
    }
}

/// Operation names are Rust method names: `[a-z_][a-z0-9_]*`.
fn is_operation_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Run semantic checks on a successfully parsed config.
fn check_semantics(config: &ModgraphConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.server.port == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "invalid-value",
            path: "server.port".into(),
            message: "port 0 binds an ephemeral port".into(),
        });
    }

    let is_localhost = matches!(
        config.server.bind.as_str(),
        "127.0.0.1" | "localhost" | "::1"
    );
    if config.graphql.graphiql && !is_localhost {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "graphql.graphiql".into(),
            message: format!("GraphiQL is served while binding to {}", config.server.bind),
        });
    }

    if config.graphql.request_timeout_secs == 0 {
        diagnostics.push(invalid(
            "graphql.request_timeout_secs",
            "request timeout must be greater than zero",
        ));
    }
    if let Some(dir) = &config.graphql.schema_dir
        && !dir.is_dir()
    {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "file-ref",
            path: "graphql.schema_dir".into(),
            message: format!(
                "schema directory {} does not exist; built-in schemas will be used",
                dir.display()
            ),
        });
    }

    if config.sessions.cookie_name.trim().is_empty() {
        diagnostics.push(invalid("sessions.cookie_name", "cookie name must not be empty"));
    }
    if http_header_name_invalid(&config.sessions.header_name) {
        diagnostics.push(invalid(
            "sessions.header_name",
            format!("\"{}\" is not a valid header name", config.sessions.header_name),
        ));
    }
    if config.sessions.lookup_timeout_ms == 0 {
        diagnostics.push(invalid(
            "sessions.lookup_timeout_ms",
            "session lookup timeout must be greater than zero",
        ));
    }
    if config.sessions.ttl_secs == Some(0) {
        diagnostics.push(invalid(
            "sessions.ttl_secs",
            "a zero TTL expires every session immediately; omit it for no expiry",
        ));
    }

    if config.throttle.enabled {
        check_rate_limit(
            "throttle",
            RateLimitConfig {
                max_calls: config.throttle.max_calls,
                window_secs: config.throttle.window_secs,
            },
            diagnostics,
        );
    }

    for (name, module) in &config.modules {
        check_module(name, module, diagnostics);
    }
}

fn check_module(name: &str, module: &ModuleConfig, diagnostics: &mut Vec<Diagnostic>) {
    let prefix = format!("modules.{name}");

    if module.permissions.iter().any(|p| p.trim().is_empty()) {
        diagnostics.push(invalid(
            format!("{prefix}.permissions"),
            "permission names must not be empty",
        ));
    }
    for (operation, perms) in &module.operation_permissions {
        if !is_operation_name(operation) {
            let snake = to_snake_case(operation);
            let hint = if is_operation_name(&snake) {
                format!(" (did you mean \"{snake}\"?)")
            } else {
                String::new()
            };
            diagnostics.push(invalid(
                format!("{prefix}.operation_permissions.{operation}"),
                format!(
                    "operation names are snake_case method names; this rule can never \
                     match{hint}"
                ),
            ));
        }
        if perms.iter().any(|p| p.trim().is_empty()) {
            diagnostics.push(invalid(
                format!("{prefix}.operation_permissions.{operation}"),
                "permission names must not be empty",
            ));
        }
    }

    let has_permissions =
        !module.permissions.is_empty() || !module.operation_permissions.is_empty();
    if has_permissions && !module.require_session {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "security",
            path: prefix.clone(),
            message: "permissions imply an authenticated session; anonymous calls will be denied"
                .into(),
        });
    }

    if let Some(limit) = module.rate_limit {
        check_rate_limit(&format!("{prefix}.rate_limit"), limit, diagnostics);
    }
}

fn check_rate_limit(path: &str, limit: RateLimitConfig, diagnostics: &mut Vec<Diagnostic>) {
    if limit.window_secs == 0 {
        diagnostics.push(invalid(
            format!("{path}.window_secs"),
            "rate limit window must be greater than zero",
        ));
    }
    if limit.max_calls == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "invalid-value",
            path: format!("{path}.max_calls"),
            message: "max_calls = 0 denies every call".into(),
        });
    }
}

fn http_header_name_invalid(name: &str) -> bool {
    name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
