use crate::error::VariableError;
use std::collections::HashSet;
use std::sync::Arc;

// ─── Type descriptors ─────────────────────────────────────────

/// Explicit description of a candidate deserialization target.
///
/// Built by callers (or a declared-type registry) — the guard never loads
/// or introspects real types, it only walks this structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub raw_name: String,
    pub is_array: bool,
    pub is_primitive: bool,
    pub key_type: Option<Box<TypeDescriptor>>,
    pub content_type: Option<Box<TypeDescriptor>>,
}

impl TypeDescriptor {
    /// A plain (non-generic, non-array) object type.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            raw_name: name.into(),
            is_array: false,
            is_primitive: false,
            key_type: None,
            content_type: None,
        }
    }

    pub fn primitive(name: impl Into<String>) -> Self {
        Self {
            is_primitive: true,
            ..Self::object(name)
        }
    }

    /// An array of `element`. The array type itself is never checked.
    pub fn array(element: TypeDescriptor) -> Self {
        Self {
            raw_name: format!("{}[]", element.raw_name),
            is_array: true,
            is_primitive: false,
            key_type: None,
            content_type: Some(Box::new(element)),
        }
    }

    /// A container (list-like) of `content`, e.g. `List<Order>`.
    pub fn container(name: impl Into<String>, content: TypeDescriptor) -> Self {
        Self {
            content_type: Some(Box::new(content)),
            ..Self::object(name)
        }
    }

    /// A map-like type. Both the key and the value type are walked.
    pub fn map(name: impl Into<String>, key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self {
            key_type: Some(Box::new(key)),
            content_type: Some(Box::new(value)),
            ..Self::object(name)
        }
    }
}

// ─── Allowlist predicate ──────────────────────────────────────

/// Process-wide predicate restricting which type names may be decoded
/// from untrusted object payloads. Read-only after startup.
pub trait TypeAllowlist: Send + Sync {
    fn is_allowed(&self, type_name: &str) -> bool;
}

/// Allowlist parsed from configuration: a comma-separated mix of exact
/// type names and `prefix.*` package patterns.
#[derive(Debug, Default)]
pub struct PatternAllowlist {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl PatternAllowlist {
    pub fn parse(spec: &str) -> Self {
        let mut exact = HashSet::new();
        let mut prefixes = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.strip_suffix(".*") {
                Some(prefix) => prefixes.push(format!("{prefix}.")),
                None => {
                    exact.insert(entry.to_string());
                }
            }
        }
        Self { exact, prefixes }
    }
}

impl TypeAllowlist for PatternAllowlist {
    fn is_allowed(&self, type_name: &str) -> bool {
        self.exact.contains(type_name) || self.prefixes.iter().any(|p| type_name.starts_with(p))
    }
}

// ─── Guard ────────────────────────────────────────────────────

/// Validates type descriptors against the allowlist before any object
/// payload is decoded.
///
/// Only active when the global validation switch is on AND a predicate is
/// configured; otherwise decoding proceeds unchecked (kept for backward
/// compatibility, not as a recommendation).
pub struct DeserializationGuard {
    allowlist: Option<Arc<dyn TypeAllowlist>>,
}

impl DeserializationGuard {
    pub fn new(enabled: bool, allowlist: Option<Arc<dyn TypeAllowlist>>) -> Self {
        Self {
            allowlist: if enabled { allowlist } else { None },
        }
    }

    /// Validation switched off entirely.
    pub fn disabled() -> Self {
        Self { allowlist: None }
    }

    pub fn is_active(&self) -> bool {
        self.allowlist.is_some()
    }

    /// Walk the descriptor and return every violating type name, deduplicated.
    ///
    /// Accumulates before returning rather than failing fast, so callers
    /// can report the complete list in one error. Primitives are skipped;
    /// arrays descend into their element without checking the array type;
    /// map keys and container contents are walked recursively; only plain
    /// object types are checked against the predicate.
    pub fn validate(&self, descriptor: &TypeDescriptor) -> Vec<String> {
        let allowlist = match &self.allowlist {
            Some(a) => a,
            None => return Vec::new(),
        };
        let mut violations = Vec::new();
        walk(allowlist.as_ref(), descriptor, &mut violations);
        violations
    }

    /// `validate`, turned into the pipeline's error form.
    pub fn check(&self, descriptor: &TypeDescriptor) -> Result<(), VariableError> {
        let violations = self.validate(descriptor);
        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!(types = ?violations, "deserialization rejected");
            Err(VariableError::DeserializationRejected { types: violations })
        }
    }

    /// Check a single declared object type name.
    pub fn check_name(&self, type_name: &str) -> Result<(), VariableError> {
        self.check(&TypeDescriptor::object(type_name))
    }
}

fn walk(allowlist: &dyn TypeAllowlist, descriptor: &TypeDescriptor, violations: &mut Vec<String>) {
    if descriptor.is_primitive {
        return;
    }
    if descriptor.is_array {
        if let Some(element) = &descriptor.content_type {
            walk(allowlist, element, violations);
        }
        return;
    }
    if descriptor.key_type.is_some() || descriptor.content_type.is_some() {
        // Container or map — its own raw name is not checked.
        if let Some(key) = &descriptor.key_type {
            walk(allowlist, key, violations);
        }
        if let Some(content) = &descriptor.content_type {
            walk(allowlist, content, violations);
        }
        return;
    }
    if !allowlist.is_allowed(&descriptor.raw_name) && !violations.contains(&descriptor.raw_name) {
        violations.push(descriptor.raw_name.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(spec: &str) -> DeserializationGuard {
        DeserializationGuard::new(true, Some(Arc::new(PatternAllowlist::parse(spec))))
    }

    /// Three distinct disallowed nested types → exactly those three names.
    #[test]
    fn accumulates_every_violation() {
        let g = guard("com.acme.*");
        let descriptor = TypeDescriptor::map(
            "java.util.HashMap",
            TypeDescriptor::object("evil.KeyType"),
            TypeDescriptor::container(
                "java.util.ArrayList",
                TypeDescriptor::map(
                    "java.util.HashMap",
                    TypeDescriptor::object("evil.Nested"),
                    TypeDescriptor::object("evil.Deep"),
                ),
            ),
        );
        let violations = g.validate(&descriptor);
        assert_eq!(violations, vec!["evil.KeyType", "evil.Nested", "evil.Deep"]);
    }

    #[test]
    fn allowed_only_descriptor_is_clean() {
        let g = guard("com.acme.*,java.util.HashMap");
        let descriptor = TypeDescriptor::map(
            "java.util.HashMap",
            TypeDescriptor::primitive("int"),
            TypeDescriptor::object("com.acme.Order"),
        );
        assert!(g.validate(&descriptor).is_empty());
        assert!(g.check(&descriptor).is_ok());
    }

    /// The array type itself is skipped; only its element is checked.
    #[test]
    fn array_descends_into_element() {
        let g = guard("com.acme.*");
        let ok = TypeDescriptor::array(TypeDescriptor::object("com.acme.Order"));
        assert!(g.validate(&ok).is_empty());

        let bad = TypeDescriptor::array(TypeDescriptor::object("evil.Payload"));
        assert_eq!(g.validate(&bad), vec!["evil.Payload"]);
    }

    #[test]
    fn duplicate_names_reported_once() {
        let g = guard("");
        let descriptor = TypeDescriptor::map(
            "java.util.HashMap",
            TypeDescriptor::object("evil.Payload"),
            TypeDescriptor::object("evil.Payload"),
        );
        assert_eq!(g.validate(&descriptor), vec!["evil.Payload"]);
    }

    /// Disabled guard validates nothing (the backward-compatibility opt-out).
    #[test]
    fn disabled_guard_passes_everything() {
        let g = DeserializationGuard::disabled();
        assert!(!g.is_active());
        assert!(g.check_name("evil.Payload").is_ok());

        let g = DeserializationGuard::new(false, Some(Arc::new(PatternAllowlist::parse("x"))));
        assert!(g.check_name("evil.Payload").is_ok());
    }

    #[test]
    fn pattern_allowlist_matching() {
        let a = PatternAllowlist::parse("com.acme.*, java.util.HashMap");
        assert!(a.is_allowed("com.acme.Order"));
        assert!(a.is_allowed("com.acme.sub.Item"));
        assert!(a.is_allowed("java.util.HashMap"));
        assert!(!a.is_allowed("com.acmeX.Order"));
        assert!(!a.is_allowed("java.util.ArrayList"));
    }
}
