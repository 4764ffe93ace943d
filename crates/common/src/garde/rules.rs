//! Custom garde rules shared by the administrative request types.

/// Longest accepted role name
pub const MAX_ROLE_NAME_LENGTH: usize = 64;

/// Longest accepted role description
pub const MAX_ROLE_DESCRIPTION_LENGTH: usize = 512;

/// Role names are compared byte-for-byte, so reject surrounding whitespace
/// that would make two visually identical names distinct.
pub fn role_name(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("role name must not be blank"));
    }
    if value.trim() != value {
        return Err(garde::Error::new(
            "role name must not start or end with whitespace",
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(garde::Error::new(
            "role name must not contain control characters",
        ));
    }
    Ok(())
}

/// Optional ids must be non-empty when present
pub fn optional_id(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(id) if id.trim().is_empty() => Err(garde::Error::new("id must not be empty")),
        _ => Ok(()),
    }
}
