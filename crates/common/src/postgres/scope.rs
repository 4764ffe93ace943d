use crate::domain::ScopeFilter;

/// Bind values for the `($n OR campus_id IS NULL OR campus_id = $n+1)` clause
///
/// The first value matches every row, the second names the campus whose rows
/// apply next to the unscoped ones.
pub(crate) fn scope_params(scope: &ScopeFilter) -> (bool, Option<String>) {
    match scope {
        ScopeFilter::All => (true, None),
        ScopeFilter::Global => (false, None),
        ScopeFilter::Campus(campus_id) => (false, Some(campus_id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_params() {
        assert_eq!(scope_params(&ScopeFilter::All), (true, None));
        assert_eq!(scope_params(&ScopeFilter::Global), (false, None));
        assert_eq!(
            scope_params(&ScopeFilter::Campus("campus-1".to_string())),
            (false, Some("campus-1".to_string()))
        );
    }
}
