// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The aggregate queries understood by the in-memory store:
//! `SELECT c1[, c2...], COUNT(*) FROM table [WHERE c = ? [AND c = ?]...] GROUP BY c1[, c2...]`

use model::{UpllError, UpllResult};
use regex::Regex;
use std::sync::LazyLock;
#[allow(unused)]
use tracing::{debug, error};

static AGGREGATE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+(?P<cols>.+?)\s*,\s*COUNT\(\s*\*\s*\)\s+FROM\s+(?P<table>\w+)(?:\s+WHERE\s+(?P<filter>.+?))?\s+GROUP\s+BY\s+(?P<group>.+?)\s*;?\s*$",
    )
});

static CONDITION: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\s*(?P<col>\w+)\s*=\s*\?\s*$"));

static CONJUNCTION: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+"));

fn compiled(re: &'static LazyLock<Result<Regex, regex::Error>>) -> UpllResult<&'static Regex> {
    re.as_ref()
        .map_err(|e| UpllError::Generic(format!("bad query grammar: {e}")))
}

fn columns(list: &str) -> Vec<String> {
    list.split(',').map(|c| c.trim().to_owned()).collect()
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct AggregateQuery {
    pub(crate) table: String,
    pub(crate) group: Vec<String>,
    /// Columns compared with the placeholders, in order.
    pub(crate) filters: Vec<String>,
}

impl AggregateQuery {
    pub(crate) fn parse(text: &str) -> UpllResult<Self> {
        let syntax = || {
            error!("Unsupported raw query: {text}");
            UpllError::DbAccess(format!("unsupported query: {text}"))
        };
        let caps = compiled(&AGGREGATE)?.captures(text).ok_or_else(syntax)?;
        let group_of = |name: &str| caps.name(name).map(|m| m.as_str()).ok_or_else(syntax);
        let table = group_of("table")?.to_owned();
        let selected = columns(group_of("cols")?);
        let group = columns(group_of("group")?);
        if selected != group {
            return Err(syntax());
        }
        let mut filters = Vec::new();
        if let Some(filter) = caps.name("filter") {
            let condition = compiled(&CONDITION)?;
            for clause in compiled(&CONJUNCTION)?.split(filter.as_str()) {
                let column = condition
                    .captures(clause)
                    .and_then(|c| c.name("col"))
                    .ok_or_else(syntax)?;
                filters.push(column.as_str().to_owned());
            }
        }
        debug!("Parsed aggregate on {table} grouped by {group:?}");
        Ok(Self {
            table,
            group,
            filters,
        })
    }
}
