//! Email classification categories.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category assigned to an email by the classifier.
///
/// Serialized with the spellings the classifier model is asked to return
/// ("Not Interested", "Meeting Booked", ...), which are also the values
/// stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Interested,
    #[serde(rename = "Not Interested")]
    NotInterested,
    #[serde(rename = "Meeting Booked")]
    MeetingBooked,
    Spam,
    #[serde(rename = "Out of Office")]
    OutOfOffice,
    /// Safe default when classification fails or returns an unknown value.
    Uncategorized,
}

impl Category {
    /// Returns true for the category that triggers notification side effects.
    pub fn is_high_value(self) -> bool {
        matches!(self, Category::Interested)
    }

    /// The canonical string form, matching the serialized spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Interested => "Interested",
            Category::NotInterested => "Not Interested",
            Category::MeetingBooked => "Meeting Booked",
            Category::Spam => "Spam",
            Category::OutOfOffice => "Out of Office",
            Category::Uncategorized => "Uncategorized",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {:?}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Interested" => Ok(Category::Interested),
            "Not Interested" => Ok(Category::NotInterested),
            "Meeting Booked" => Ok(Category::MeetingBooked),
            "Spam" => Ok(Category::Spam),
            "Out of Office" => Ok(Category::OutOfOffice),
            "Uncategorized" => Ok(Category::Uncategorized),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_interested_is_high_value() {
        assert!(Category::Interested.is_high_value());
        assert!(!Category::NotInterested.is_high_value());
        assert!(!Category::MeetingBooked.is_high_value());
        assert!(!Category::Spam.is_high_value());
        assert!(!Category::OutOfOffice.is_high_value());
        assert!(!Category::Uncategorized.is_high_value());
    }

    #[test]
    fn serialization_uses_wire_spellings() {
        let json = serde_json::to_string(&Category::NotInterested).unwrap();
        assert_eq!(json, "\"Not Interested\"");

        let deserialized: Category = serde_json::from_str("\"Out of Office\"").unwrap();
        assert_eq!(deserialized, Category::OutOfOffice);
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(
            "  Meeting Booked\n".parse::<Category>().unwrap(),
            Category::MeetingBooked
        );
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let err = "Definitely Interested".parse::<Category>().unwrap_err();
        assert_eq!(err.0, "Definitely Interested");
    }

    #[test]
    fn display_round_trips_through_parse() {
        for category in [
            Category::Interested,
            Category::NotInterested,
            Category::MeetingBooked,
            Category::Spam,
            Category::OutOfOffice,
            Category::Uncategorized,
        ] {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
        }
    }
}
