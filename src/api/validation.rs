use super::ApiError;

pub fn validate_id(kind: &str, id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid {kind} ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}

/// Clamps an audit listing size to `1..=max`, falling back to `max`.
pub fn validate_limit(limit: Option<u64>, max: u64) -> Result<u64, ApiError> {
    match limit {
        None => Ok(max),
        Some(0) => Err(ApiError::validation("Limit must be at least 1")),
        Some(limit) => Ok(limit.min(max)),
    }
}

pub fn validate_page(page: Option<u64>) -> Result<Option<u64>, ApiError> {
    match page {
        Some(0) => Err(ApiError::validation("Page numbers start at 1")),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("incident", 1).is_ok());
        assert!(validate_id("incident", 0).is_err());
        assert!(validate_id("category", -3).is_err());
    }

    #[test]
    fn test_validate_limit() {
        assert_eq!(validate_limit(None, 100).unwrap(), 100);
        assert_eq!(validate_limit(Some(5), 100).unwrap(), 5);
        assert_eq!(validate_limit(Some(1000), 100).unwrap(), 100);
        assert!(validate_limit(Some(0), 100).is_err());
    }

    #[test]
    fn test_validate_page() {
        assert_eq!(validate_page(None).unwrap(), None);
        assert_eq!(validate_page(Some(3)).unwrap(), Some(3));
        assert!(validate_page(Some(0)).is_err());
    }
}
