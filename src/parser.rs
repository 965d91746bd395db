//! CSV record parsing for site metadata and order lines
//!
//! Input contract: the first non-blank line describes the site,
//! `ID, cook cap, cook secs, assemble cap, assemble secs, package cap, package secs, P, L, T, V, B`,
//! and every following non-blank line is an order,
//! `ID, YYYY-MM-DD HH:MM:SS, order ID, item code, item code, ...`.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::ParseError;
use crate::models::{Inventory, RequestRecord, SiteMetadata, StageSpec, StockItem};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const METADATA_FIELDS: usize = 12;

// Digits with at most one non-numeric qualifier on either side. A sign,
// decimal point or exponent is not a qualifier.
static QUALIFIED_INT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\d\-.+]?(\d+)[^\d\-.+]?$").expect("integer pattern compiles")
});

/// Parse a numeric field that may carry a qualifier letter, e.g. `4C` or `C4`
pub fn parse_qualified_int(field: &'static str, value: &str) -> Result<i64, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    let caps = QUALIFIED_INT.captures(value.trim()).ok_or_else(invalid)?;
    caps[1].parse::<i64>().map_err(|_| invalid())
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Parse the site description line
pub fn parse_site_metadata(line: &str) -> Result<SiteMetadata, ParseError> {
    let fields = split_fields(line);
    if fields.len() != METADATA_FIELDS {
        return Err(ParseError::FieldCount {
            expected: METADATA_FIELDS,
            found: fields.len(),
        });
    }

    let site_id = fields[0];
    if site_id.is_empty() {
        return Err(ParseError::MissingField("site id"));
    }

    let stage = |cap: usize, secs: usize, name: &'static str, unit: &'static str| -> Result<StageSpec, ParseError> {
        Ok(StageSpec {
            capacity: parse_qualified_int(name, fields[cap])?,
            unit_seconds: parse_qualified_int(unit, fields[secs])?,
        })
    };

    let mut counts = [0i64; 5];
    for (offset, item) in StockItem::ALL.iter().enumerate() {
        counts[item.index()] = parse_qualified_int(item.name(), fields[7 + offset])?;
    }

    Ok(SiteMetadata {
        site_id: site_id.to_string(),
        cook: stage(1, 2, "cook capacity", "cook time")?,
        assemble: stage(3, 4, "assemble capacity", "assemble time")?,
        package: stage(5, 6, "package capacity", "package time")?,
        stock: Inventory::new(counts),
    })
}

/// Parse one order line, e.g. `R1,2020-12-08 19:15:31,O1,BLT,LT,VLT`
pub fn parse_request(line: &str) -> Result<RequestRecord, ParseError> {
    let fields = split_fields(line);

    let site_id = fields
        .first()
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("site id"))?;
    let timestamp = fields
        .get(1)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("arrival time"))?;
    let order_id = fields
        .get(2)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("order id"))?;

    let arrival = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::MalformedTimestamp(timestamp.to_string()))?;

    let items: Vec<String> = fields[3..].iter().map(|s| s.to_string()).collect();
    if items.is_empty() {
        return Err(ParseError::NoItems(order_id.to_string()));
    }
    for code in &items {
        if code.is_empty() {
            return Err(ParseError::MissingField("item code"));
        }
        if let Some(letter) = code
            .chars()
            .find(|&c| StockItem::from_ingredient(c).is_none())
        {
            return Err(ParseError::UnknownIngredient {
                code: code.clone(),
                letter,
            });
        }
    }

    Ok(RequestRecord {
        order_id: order_id.to_string(),
        site_id: site_id.to_string(),
        arrival,
        items,
    })
}

/// Parse a complete single-site stream into its metadata and requests
pub fn parse_stream(text: &str) -> Result<(SiteMetadata, Vec<RequestRecord>), ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (meta_line, first) = lines.next().ok_or(ParseError::MissingMetadata)?;
    let meta = parse_site_metadata(first).map_err(|e| e.at_line(meta_line))?;

    let mut requests = Vec::new();
    for (number, line) in lines {
        let request = parse_request(line).map_err(|e| e.at_line(number))?;
        if request.site_id != meta.site_id {
            return Err(ParseError::SiteMismatch {
                expected: meta.site_id.clone(),
                found: request.site_id,
            }
            .at_line(number));
        }
        requests.push(request);
    }

    Ok((meta, requests))
}
