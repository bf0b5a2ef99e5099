// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for settings and JSON responses
use serde::{Deserialize, Serialize};

// used when parsing stored names back into types
use std::str::FromStr;
// used to print out readable forms of a data type
use std::fmt;

use crate::error::CatalogError;

// ------------- Numeric casting --------------
/// True when the literal can be read as a decimal number.
pub fn is_digit(value: &str) -> bool {
    as_number(value).is_some()
}

/// True when the literal can be read as a number without a fractional part,
/// so "1.0" counts as an integer while "1.6" does not.
pub fn is_int(value: &str) -> bool {
    match as_number(value) {
        Some(n) => n.is_finite() && n.fract() == 0.0,
        None => false,
    }
}

pub fn as_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

/// A JSON number that stays integral when the value has no fractional part.
pub fn json_number(n: f64) -> Option<serde_json::Number> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(serde_json::Number::from(n as i64));
    }
    serde_json::Number::from_f64(n)
}

// ------------- Field Type --------------
/// Declared type of a study field. Values are always stored as text, the type
/// only governs which literals are accepted and how they are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    List,
    Int,
    #[default]
    Str,
    Float,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::List => "list",
            FieldType::Int => "int",
            FieldType::Str => "str",
            FieldType::Float => "float",
        }
    }
    pub fn describe(&self) -> &'static str {
        match self {
            FieldType::List => "List",
            FieldType::Int => "Integer",
            FieldType::Str => "Character String",
            FieldType::Float => "Decimal Number",
        }
    }
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            FieldType::List | FieldType::Str => true,
            FieldType::Int => is_int(value),
            FieldType::Float => is_digit(value),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(FieldType::List),
            "int" => Ok(FieldType::Int),
            "str" => Ok(FieldType::Str),
            "float" => Ok(FieldType::Float),
            other => Err(CatalogError::Configuration(format!("Unknown field type '{other}'"))),
        }
    }
}

// ------------- Widget --------------
/// The control a filter is rendered with, which also decides how its
/// selection payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Widget {
    #[default]
    #[serde(rename = "checkbox")]
    Checkbox,
    #[serde(rename = "double slider")]
    DoubleSlider,
    #[serde(rename = "discrete slider")]
    DiscreteSlider,
}

impl Widget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Widget::Checkbox => "checkbox",
            Widget::DoubleSlider => "double slider",
            Widget::DiscreteSlider => "discrete slider",
        }
    }
    pub fn is_slider(&self) -> bool {
        !matches!(self, Widget::Checkbox)
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Widget {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkbox" => Ok(Widget::Checkbox),
            "double slider" => Ok(Widget::DoubleSlider),
            "discrete slider" => Ok(Widget::DiscreteSlider),
            other => Err(CatalogError::Configuration(format!("Unknown widget '{other}'"))),
        }
    }
}

// ------------- Sentinels --------------
/// Literals that stand for "no value". They are kept in storage but never
/// listed or counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels(Vec<String>);

impl Sentinels {
    pub fn new<I, S>(literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(literals.into_iter().map(Into::into).collect())
    }
    pub fn is_missing(&self, value: &str) -> bool {
        self.0.iter().any(|s| s == value)
    }
    pub fn literals(&self) -> &[String] {
        &self.0
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self::new(["", "NaN", ".", "None", "9999"])
    }
}

// ------------- SQL conversions --------------
impl ToSql for FieldType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}
impl FromSql for FieldType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
impl ToSql for Widget {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}
impl FromSql for Widget {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
