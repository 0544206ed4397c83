//! Common API utilities and shared types

use serde::Serialize;
use std::str::FromStr;

use crate::api::middleware::ApiError;

/// A page of items with the total match count
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Parse an optional enum query parameter; blank means absent
pub fn parse_param<T>(name: &str, raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ApiError::validation_error(format!("Invalid {}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadStatus;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param::<LeadStatus>("status", None).unwrap(), None);
        assert_eq!(parse_param::<LeadStatus>("status", Some("  ")).unwrap(), None);
        assert_eq!(
            parse_param::<LeadStatus>("status", Some("contacted")).unwrap(),
            Some(LeadStatus::Contacted)
        );
        let err = parse_param::<LeadStatus>("status", Some("bogus")).unwrap_err();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
    }
}
