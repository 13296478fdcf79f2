//! Attribute expressions and `ref(node, output)` references
//!
//! Declarations carry raw JSON values. Any string that is exactly a
//! `ref(node, output)` call, at any depth inside an array or object, is
//! parsed into a [`Reference`]. A string that starts with `ref(` but does
//! not parse is rejected rather than kept as a literal. Resolution is
//! deferred to diff/apply time, when the referenced node's outputs may or
//! may not be known yet.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*ref\(\s*([A-Za-z0-9_.:/-]+)\s*,\s*([A-Za-z0-9_.:/-]+)\s*\)\s*$")
        .expect("reference pattern is valid")
});

/// Characters allowed in node ids besides ASCII letters and digits
pub const ID_PUNCTUATION: &str = "_.:/-";

/// Whether `id` can be named by a `ref(node, output)` reference
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ID_PUNCTUATION.contains(c))
}

/// Whether a string is meant as a reference, parsed or not
fn looks_like_reference(s: &str) -> bool {
    s.trim_start().starts_with("ref(")
}

/// A string that starts like a reference but does not parse as one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReference(pub String);

impl fmt::Display for MalformedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed reference '{}', expected ref(node, output)",
            self.0
        )
    }
}

/// A reference to another node's output
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub node: String,
    pub output: String,
}

impl Reference {
    pub fn new(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }

    /// Parse `ref(node, output)`, returning `None` for any other string
    pub fn parse(s: &str) -> Option<Self> {
        let caps = REF_PATTERN.captures(s)?;
        Some(Self::new(&caps[1], &caps[2]))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref({}, {})", self.node, self.output)
    }
}

/// An attribute value that may contain references
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A value with no references inside
    Literal(Value),
    /// A whole-value reference
    Ref(Reference),
    /// An array with at least one reference inside
    List(Vec<Expr>),
    /// An object with at least one reference inside
    Map(BTreeMap<String, Expr>),
}

impl Expr {
    /// Parse a raw declaration value
    pub fn parse(raw: &Value) -> Result<Self, MalformedReference> {
        let expr = match raw {
            Value::String(s) => match Reference::parse(s) {
                Some(r) => Self::Ref(r),
                None if looks_like_reference(s) => {
                    return Err(MalformedReference(s.clone()));
                }
                None => Self::Literal(raw.clone()),
            },
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(Self::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                if items.iter().all(Self::is_literal) {
                    Self::Literal(raw.clone())
                } else {
                    Self::List(items)
                }
            }
            Value::Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|(k, v)| Self::parse(v).map(|e| (k.clone(), e)))
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                if fields.values().all(Self::is_literal) {
                    Self::Literal(raw.clone())
                } else {
                    Self::Map(fields)
                }
            }
            _ => Self::Literal(raw.clone()),
        };
        Ok(expr)
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// All references inside this expression, in document order
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Literal(_) => {}
            Self::Ref(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|e| e.collect_references(out)),
            Self::Map(fields) => fields.values().for_each(|e| e.collect_references(out)),
        }
    }

    /// Resolve to a concrete value
    ///
    /// Returns `None` as soon as any reference cannot be resolved by `lookup`.
    pub fn resolve<F>(&self, lookup: &F) -> Option<Value>
    where
        F: Fn(&Reference) -> Option<Value>,
    {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Ref(r) => lookup(r),
            Self::List(items) => items
                .iter()
                .map(|e| e.resolve(lookup))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Map(fields) => fields
                .iter()
                .map(|(k, e)| e.resolve(lookup).map(|v| (k.clone(), v)))
                .collect::<Option<Map<String, Value>>>()
                .map(Value::Object),
        }
    }

    /// Render back to the raw declaration form
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Ref(r) => Value::String(r.to_string()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_raw).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, e)| (k.clone(), e.to_raw()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            Reference::parse("ref(db, host)"),
            Some(Reference::new("db", "host"))
        );
        assert_eq!(
            Reference::parse("  ref( db-1 ,port )"),
            Some(Reference::new("db-1", "port"))
        );
        assert_eq!(Reference::parse("ref(db)"), None);
        assert_eq!(Reference::parse("prefix ref(db, host)"), None);
        assert_eq!(Reference::parse("db.host"), None);
    }

    #[test]
    fn test_literal_stays_literal() {
        let raw = json!({"port": 80, "tags": ["a", "b"], "note": "see ref docs"});
        assert_eq!(Expr::parse(&raw), Ok(Expr::Literal(raw.clone())));
    }

    #[test]
    fn test_nested_references_are_found() {
        let raw = json!({
            "env": {"DB_HOST": "ref(db, host)", "APP_ENV": "prod"},
            "subnets": ["ref(vpc, subnet_a)", "subnet-static"]
        });
        let expr = Expr::parse(&raw).unwrap();
        let refs: Vec<String> = expr.references().iter().map(|r| r.to_string()).collect();
        assert_eq!(refs, vec!["ref(db, host)", "ref(vpc, subnet_a)"]);
        assert_eq!(expr.to_raw(), raw);
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let expr = Expr::parse(&json!(["ref(db, host)", 5432])).unwrap();

        let resolved = expr.resolve(&|r: &Reference| {
            (r.node == "db" && r.output == "host").then(|| json!("10.0.0.5"))
        });
        assert_eq!(resolved, Some(json!(["10.0.0.5", 5432])));

        let unresolved = expr.resolve(&|_: &Reference| None);
        assert_eq!(unresolved, None);
    }

    #[test]
    fn test_malformed_reference_is_rejected() {
        assert_eq!(
            Expr::parse(&json!("ref(db, host")),
            Err(MalformedReference("ref(db, host".into()))
        );
        assert!(Expr::parse(&json!(" ref(my db, host)")).is_err());
        // Nested values are checked too
        assert!(Expr::parse(&json!({"env": ["ref(db)"]})).is_err());
    }

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("db-1"));
        assert!(is_valid_id("aws:s3/logs_bucket.v2"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("my db"));
        assert!(!is_valid_id("db,1"));
        assert!(!is_valid_id("db)"));
    }
}
