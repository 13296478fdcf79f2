//! Error types for the stackgraph crate
//!
//! Plan errors (`DuplicateId`, `DanglingReference`, `CycleDetected`,
//! `InvalidDeclaration`) are raised before any provider call is made.
//! Apply errors (`Provisioning`, `UnresolvedOutput`) are carried in the
//! apply report next to the partial snapshot.

use crate::diff::OperationKind;
use thiserror::Error;

/// Errors that can occur while planning or applying a stack
#[derive(Error, Debug)]
pub enum Error {
    /// Two declarations share the same id
    #[error("duplicate resource id: {id}")]
    DuplicateId { id: String },

    /// A reference or explicit dependency points at something that does not exist
    #[error("resource '{node}' references unknown {}", describe_target(.target, .output.as_deref()))]
    DanglingReference {
        /// Node holding the reference
        node: String,
        /// Referenced node id
        target: String,
        /// Referenced output, `None` for explicit `depends_on` entries
        output: Option<String>,
    },

    /// The dependency graph is not acyclic
    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    CycleDetected {
        /// Node ids on the cycle, each depending on the next
        cycle: Vec<String>,
    },

    /// A declaration is malformed: an id no reference can name, an empty
    /// kind, or an attribute that starts like a reference but does not parse
    #[error("invalid declaration '{id}': {message}")]
    InvalidDeclaration { id: String, message: String },

    /// The provisioning API rejected an operation
    #[error("{operation} of '{node}' failed: {source}")]
    Provisioning {
        node: String,
        operation: OperationKind,
        #[source]
        source: anyhow::Error,
    },

    /// A reference could not be resolved at apply time
    #[error("resource '{node}' needs output '{output}' of '{target}', which is not available")]
    UnresolvedOutput {
        node: String,
        target: String,
        output: String,
    },
}

impl Error {
    /// Whether this error is raised while building or ordering the plan
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. }
                | Self::DanglingReference { .. }
                | Self::CycleDetected { .. }
                | Self::InvalidDeclaration { .. }
        )
    }

    /// Node id the error is about, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::DuplicateId { id } | Self::InvalidDeclaration { id, .. } => Some(id),
            Self::DanglingReference { node, .. }
            | Self::Provisioning { node, .. }
            | Self::UnresolvedOutput { node, .. } => Some(node),
            Self::CycleDetected { .. } => None,
        }
    }
}

fn describe_target(target: &str, output: Option<&str>) -> String {
    match output {
        Some(output) => format!("output '{output}' of '{target}'"),
        None => format!("resource '{target}'"),
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
        None => String::from("(empty)"),
    }
}

/// Result type for stackgraph operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_reference_message() {
        let err = Error::DanglingReference {
            node: "app".into(),
            target: "db".into(),
            output: Some("host".into()),
        };
        assert_eq!(
            err.to_string(),
            "resource 'app' references unknown output 'host' of 'db'"
        );

        let err = Error::DanglingReference {
            node: "app".into(),
            target: "vpc".into(),
            output: None,
        };
        assert_eq!(
            err.to_string(),
            "resource 'app' references unknown resource 'vpc'"
        );
    }

    #[test]
    fn test_cycle_message_closes_loop() {
        let err = Error::CycleDetected {
            cycle: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_plan_error_classification() {
        assert!(Error::DuplicateId { id: "a".into() }.is_plan_error());
        let err = Error::Provisioning {
            node: "a".into(),
            operation: OperationKind::Create,
            source: anyhow::anyhow!("quota exceeded"),
        };
        assert!(!err.is_plan_error());
        assert_eq!(err.node(), Some("a"));
        assert_eq!(err.to_string(), "create of 'a' failed: quota exceeded");
    }
}
