/// Campus filter applied to assignments and bindings
///
/// A row with no campus applies everywhere. A row with a campus applies only
/// when evaluated for that campus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Only rows that carry no campus
    Global,
    /// Rows that carry no campus plus rows scoped to this campus
    Campus(String),
    /// Every row, whatever its campus
    All,
}

impl ScopeFilter {
    /// Filter used when resolving for an optional campus
    pub fn for_campus(campus_id: Option<String>) -> Self {
        match campus_id {
            Some(campus_id) => ScopeFilter::Campus(campus_id),
            None => ScopeFilter::Global,
        }
    }

    pub fn matches(&self, row_campus_id: Option<&str>) -> bool {
        match (self, row_campus_id) {
            (ScopeFilter::All, _) => true,
            (_, None) => true,
            (ScopeFilter::Global, Some(_)) => false,
            (ScopeFilter::Campus(campus_id), Some(row)) => campus_id == row,
        }
    }
}
