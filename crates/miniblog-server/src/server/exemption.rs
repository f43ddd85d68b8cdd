use miniblog_core::operations;
use std::collections::HashSet;
use std::sync::Arc;

/// Operations callable without a credential.
///
/// Built once at startup and cloned (cheaply) into both the gRPC interceptor
/// chain and the HTTP middleware. Authentication and authorization consult
/// the same instance.
#[derive(Clone, Debug)]
pub struct ExemptionSet {
    operations: Arc<HashSet<&'static str>>,
}

impl ExemptionSet {
    pub fn new(operations: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            operations: Arc::new(operations.into_iter().collect()),
        }
    }

    pub fn is_exempt(&self, operation: &str) -> bool {
        self.operations.contains(operation)
    }
}

impl Default for ExemptionSet {
    /// Health check, user sign-up and login.
    fn default() -> Self {
        Self::new([
            operations::HEALTHZ,
            operations::CREATE_USER,
            operations::LOGIN,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_covers_public_operations_only() {
        let set = ExemptionSet::default();
        let exempt: Vec<_> = operations::ALL
            .into_iter()
            .filter(|op| set.is_exempt(op))
            .collect();
        assert_eq!(
            exempt,
            [operations::HEALTHZ, operations::LOGIN, operations::CREATE_USER]
        );
    }

    #[test]
    fn clones_share_one_registry() {
        let set = ExemptionSet::default();
        let clone = set.clone();
        assert!(Arc::ptr_eq(&set.operations, &clone.operations));
        assert!(!clone.is_exempt("/miniblog.v1.MiniBlog/Unknown"));
    }
}
