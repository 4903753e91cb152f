//! Common types and utilities shared across models.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Whether a listing (product or category) is sold outright or rented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Buy,
    Rent,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Buy => "buy",
            ListingType::Rent => "rent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(ListingType::Buy),
            "rent" => Some(ListingType::Rent),
            _ => None,
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Helper to parse a JSON array column, tolerating empty or corrupt values
pub fn parse_json_list<T: DeserializeOwned>(json: &str) -> Vec<T> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Helper to serialize a list into a JSON array column
pub fn serialize_json_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Field that distinguishes "absent" (`None`) from an explicit `null` (`Some(None)`).
/// Pair with `#[serde(default)]`.
pub fn nullable_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Requested page of a listing, normalised to sane bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: i64 = 20;
    pub const MAX_PER_PAGE: i64 = 100;

    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    /// `ceil(total / per_page)`
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.per_page - 1) / self.per_page
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Round a money amount to two decimal places
pub fn round_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_type_parse() {
        assert_eq!(ListingType::parse("buy"), Some(ListingType::Buy));
        assert_eq!(ListingType::parse(" RENT "), Some(ListingType::Rent));
        assert_eq!(ListingType::parse("lease"), None);
        assert_eq!(ListingType::Rent.to_string(), "rent");
    }

    #[test]
    fn test_page_request_bounds() {
        let page = PageRequest::new(Some(0), Some(500));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 100);

        let page = PageRequest::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);
    }

    #[test]
    fn test_total_pages_is_ceiling() {
        let page = PageRequest::new(None, Some(20));
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(1), 1);
        assert_eq!(page.total_pages(20), 1);
        assert_eq!(page.total_pages(21), 2);
    }

    #[test]
    fn test_json_list_helpers() {
        let tags: Vec<String> = parse_json_list(r#"["gold","ring"]"#);
        assert_eq!(tags, vec!["gold", "ring"]);

        let broken: Vec<String> = parse_json_list("not json");
        assert!(broken.is_empty());

        assert_eq!(serialize_json_list::<String>(&[]), "[]");
    }

    #[test]
    fn test_round_amount() {
        assert_eq!(round_amount(0.1 + 0.2), 0.3);
        assert_eq!(round_amount(1999.999), 2000.0);
    }
}
