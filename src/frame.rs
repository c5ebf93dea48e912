use crate::catalog::StationCatalog;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const FIELD_SEPARATOR: char = '|';
pub const RECORD_SEPARATOR: &str = " & ";
pub const MAX_FRAME_SIZE: usize = 1024;
pub const WIRE_TIME_FORMAT: &str = "%H:%M:%S";

// Record token offsets on the wire: [station_index, placeholder, time, value...]
const TOKEN_STATION_INDEX: usize = 0;
const TOKEN_TIME: usize = 2;
const TOKEN_FIRST_VALUE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Numeric(f64),
    Text(String),
}

impl Value {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Numeric(number) => Some(*number),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Numeric(_) => None,
            Value::Text(text) => Some(text),
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Numeric(number) => write!(f, "{}", number),
            Value::Text(text) => write!(f, "{}", text),
        }
    }
}

/// One decoded station record: produced by [`decode`], stamped by the
/// reconciler, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub station: String,
    pub timestamp: Option<NaiveDateTime>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Separator,
    Field(&'a str),
}

impl<'a> Token<'a> {
    fn classify(raw: &'a str) -> Self {
        if raw == RECORD_SEPARATOR {
            Token::Separator
        } else {
            Token::Field(raw)
        }
    }
}

/// Decode one protocol line into zero or more readings.
///
/// Never fails: malformed records are dropped with a diagnostic and their
/// siblings on the same line still decode. Wire times carry no date, so
/// they are combined with today's calendar date.
pub fn decode(line: &str, catalog: &StationCatalog) -> Vec<Reading> {
    decode_on_date(line, catalog, Local::now().date_naive())
}

/// [`decode`] with an explicit calendar date for the wire's time-only fields.
pub fn decode_on_date(line: &str, catalog: &StationCatalog, date: NaiveDate) -> Vec<Reading> {
    let tokens: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if tokens.len() < 2 {
        return Vec::new();
    }

    let mut readings = Vec::new();
    let mut record: Vec<&str> = Vec::new();

    // First and last tokens are framing markers
    for raw in &tokens[1..tokens.len() - 1] {
        match Token::classify(raw) {
            Token::Separator => {
                if let Some(reading) = decode_record(&record, catalog, date) {
                    readings.push(reading);
                }
                record.clear();
            }
            Token::Field(field) => record.push(field),
        }
    }

    // A trailing record is valid without a closing separator
    if let Some(reading) = decode_record(&record, catalog, date) {
        readings.push(reading);
    }

    readings
}

fn decode_record(tokens: &[&str], catalog: &StationCatalog, date: NaiveDate) -> Option<Reading> {
    if tokens.is_empty() {
        return None;
    }

    let index_token = tokens[TOKEN_STATION_INDEX].trim();
    let index: usize = match index_token.parse() {
        Ok(index) => index,
        Err(_) => {
            warn!(token = index_token, "record dropped: station index is not an integer");
            return None;
        }
    };

    let station = match catalog.station_by_index(index) {
        Some(station) => station,
        None => {
            warn!(
                index,
                stations = catalog.station_count(),
                "record dropped: station index out of range"
            );
            return None;
        }
    };

    let timestamp = tokens.get(TOKEN_TIME).and_then(|raw| parse_wire_time(raw, date));

    let values = tokens
        .iter()
        .skip(TOKEN_FIRST_VALUE)
        .filter_map(|raw| parse_value(raw))
        .collect();

    Some(Reading {
        station: station.name.clone(),
        timestamp,
        values,
    })
}

fn parse_wire_time(raw: &str, date: NaiveDate) -> Option<NaiveDateTime> {
    match NaiveTime::parse_from_str(raw.trim(), WIRE_TIME_FORMAT) {
        Ok(time) => Some(date.and_time(time)),
        Err(_) => {
            debug!(token = raw, "invalid time field, record kept with unknown timestamp");
            None
        }
    }
}

fn parse_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if !numeric_shape(trimmed) {
        return Some(Value::Text(trimmed.to_string()));
    }

    match trimmed.parse::<f64>() {
        Ok(number) => Some(Value::Numeric(number)),
        Err(_) => {
            warn!(token = trimmed, "value dropped: numeric-looking token failed to parse");
            None
        }
    }
}

// Digits with at most one decimal point, nothing else
fn numeric_shape(token: &str) -> bool {
    let digits = token.replacen('.', "", 1);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_classification_is_literal() {
        assert_eq!(Token::classify(" & "), Token::Separator);

        // Only the exact separator token separates records
        assert_eq!(Token::classify("&"), Token::Field("&"));
        assert_eq!(Token::classify(" &"), Token::Field(" &"));
        assert_eq!(Token::classify("& "), Token::Field("& "));
        assert_eq!(Token::classify("  &  "), Token::Field("  &  "));
    }

    #[test]
    fn test_numeric_shape() {
        assert!(numeric_shape("21"));
        assert!(numeric_shape("21.5"));
        assert!(numeric_shape(".5"));
        assert!(numeric_shape("5."));

        assert!(!numeric_shape(""));
        assert!(!numeric_shape("."));
        assert!(!numeric_shape("-5"));
        assert!(!numeric_shape("1.2.3"));
        assert!(!numeric_shape("1e3"));
        assert!(!numeric_shape("13:11:16"));
    }

    #[test]
    fn test_value_typing() {
        assert_eq!(parse_value(" 46.0 "), Some(Value::Numeric(46.0)));
        assert_eq!(parse_value(" foo "), Some(Value::Text("foo".to_string())));
        assert_eq!(parse_value("-5"), Some(Value::Text("-5".to_string())));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Numeric(21.5).to_string(), "21.5");
        assert_eq!(Value::Text("low".to_string()).to_string(), "low");
    }
}
