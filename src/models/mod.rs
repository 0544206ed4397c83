//! Data models
//!
//! Records stored by the brokerage service and the request/response types
//! built around them:
//! - Listings and the filters used to browse them
//! - Leads with their communications log and notes
//! - Import drafts produced by the listing scraper extension
//! - Admin sessions

use serde::{Deserialize, Serialize};

/// Declares a closed set of lowercase string values stored as TEXT columns.
///
/// Generates `as_str`, `ALL`, `Display`, and a case-insensitive `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($label:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", $label, s)),
                }
            }
        }
    };
}

mod communication;
mod import_draft;
mod lead;
mod listing;
mod note;
mod session;

pub use communication::{Communication, CommunicationChannel, CommunicationDirection, CreateCommunicationInput};
pub use import_draft::{DraftStatus, ImportDraft};
pub use lead::{CreateLeadInput, Lead, LeadDetail, LeadFilter, LeadIntent, LeadSource, LeadStats, LeadStatus, UpdateLeadInput};
pub use listing::{CreateListingInput, Listing, ListingFilter, ListingStatus, ListingType, PropertyType, UpdateListingInput};
pub use note::{CreateNoteInput, Note};
pub use session::AdminSession;

/// Offset pagination used by list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp raw query values into a usable window.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(Some(10_000), Some(-5));
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(p.offset, 0);

        let p = Pagination::new(Some(0), None);
        assert_eq!(p.limit, 1);

        let p = Pagination::default();
        assert_eq!(p.limit, Pagination::DEFAULT_LIMIT);
    }

    #[test]
    fn test_string_enum_parsing_is_case_insensitive() {
        assert_eq!("Multi_Family".parse::<PropertyType>().unwrap(), PropertyType::MultiFamily);
        assert_eq!(" OFF_MARKET ".parse::<ListingStatus>().unwrap(), ListingStatus::OffMarket);
        assert!("castle".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_string_enum_serde_matches_display() {
        for source in LeadSource::ALL {
            let json = serde_json::to_string(source).unwrap();
            assert_eq!(json, format!("\"{}\"", source));
        }
        for property_type in PropertyType::ALL {
            let json = serde_json::to_string(property_type).unwrap();
            assert_eq!(json, format!("\"{}\"", property_type));
        }
    }
}
