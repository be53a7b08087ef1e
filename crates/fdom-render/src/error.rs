#![forbid(unsafe_code)]

//! Error types for reconciliation.

/// A virtual node that could not be materialized.
///
/// Reconcile errors never abort a patch pass: the reconciler logs them and
/// materializes a placeholder in place of the failed node, so siblings are
/// still patched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// The element tag is not a valid element name.
    #[error("invalid tag name {tag:?}")]
    InvalidTag { tag: String },
    /// A component's render function panicked.
    #[error("component `{component}` panicked: {message}")]
    ComponentPanicked { component: String, message: String },
    /// The host document refused to create a node.
    #[error("host refused to create node: {message}")]
    Host { message: String },
}

/// Whether `tag` is an acceptable element name: an ASCII letter followed by
/// letters, digits, `-`, `_`, `.`, or `:`.
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_validation() {
        assert!(is_valid_tag("div"));
        assert!(is_valid_tag("my-widget"));
        assert!(is_valid_tag("svg:path"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("1div"));
        assert!(!is_valid_tag("di v"));
        assert!(!is_valid_tag("<script>"));
    }

    #[test]
    fn display_names_component() {
        let err = ReconcileError::ComponentPanicked {
            component: "Counter".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "component `Counter` panicked: boom");
    }
}
