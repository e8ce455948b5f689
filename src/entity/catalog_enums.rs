//! Enumerations shared by catalog tables

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Academic level of a course.
///
/// Variants are declared in ascending order, so the derived `Ord` sorts
/// `100L` before `200L` regardless of how the label is rendered.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, DeriveActiveEnum,
    Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(8))")]
pub enum Level {
    #[sea_orm(string_value = "100L")]
    #[serde(rename = "100L")]
    L100,
    #[sea_orm(string_value = "200L")]
    #[serde(rename = "200L")]
    L200,
    #[sea_orm(string_value = "300L")]
    #[serde(rename = "300L")]
    L300,
    #[sea_orm(string_value = "400L")]
    #[serde(rename = "400L")]
    L400,
    #[sea_orm(string_value = "500L")]
    #[serde(rename = "500L")]
    L500,
}

impl Level {
    pub const ALL: [Level; 5] = [Level::L100, Level::L200, Level::L300, Level::L400, Level::L500];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L100 => "100L",
            Level::L200 => "200L",
            Level::L300 => "300L",
            Level::L400 => "400L",
            Level::L500 => "500L",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| "Level must be one of: 100L, 200L, 300L, 400L, 500L".to_string())
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, DeriveActiveEnum,
    Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
pub enum Semester {
    #[sea_orm(string_value = "First Semester")]
    #[serde(rename = "First Semester")]
    First,
    #[sea_orm(string_value = "Second Semester")]
    #[serde(rename = "Second Semester")]
    Second,
}

impl Semester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::First => "First Semester",
            Semester::Second => "Second Semester",
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Semester {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "First Semester" => Ok(Semester::First),
            "Second Semester" => Ok(Semester::Second),
            _ => Err(r#"Semester must be either "First Semester" or "Second Semester""#.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parses_known_labels() {
        assert_eq!("300L".parse::<Level>(), Ok(Level::L300));
        assert!("300 Level".parse::<Level>().is_err());
        assert!("600L".parse::<Level>().is_err());
    }

    #[test]
    fn level_order_is_numeric() {
        let mut levels = vec![Level::L500, Level::L100, Level::L300];
        levels.sort();
        assert_eq!(levels, vec![Level::L100, Level::L300, Level::L500]);
    }

    #[test]
    fn semester_serializes_as_label() {
        let json = serde_json::to_string(&Semester::Second).unwrap();
        assert_eq!(json, r#""Second Semester""#);
        assert_eq!("First Semester".parse::<Semester>(), Ok(Semester::First));
        assert!("first".parse::<Semester>().is_err());
    }
}
