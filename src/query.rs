//! Ordering, paging and list documents shared by every list endpoint.

use serde::{Deserialize, Serialize};

pub const MAX_ROWS_PER_PAGE: i64 = 100;
pub const DEFAULT_ROWS_PER_PAGE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown order field {0:?}")]
    UnknownOrderField(String),

    #[error("unknown order direction {0:?}: expected ASC or DESC")]
    UnknownDirection(String),

    #[error("page number must be at least 1, got {0}")]
    InvalidPageNumber(i64),

    #[error("rows per page must be between 1 and 100, got {0}")]
    InvalidRowsPerPage(i64),

    #[error("{0}")]
    InvalidFilter(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        }
    }
}

/// Sort order. `field` always comes from a per-entity whitelist, so it is
/// safe to splice into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub direction: Direction,
}

impl OrderBy {
    pub const fn new(field: &'static str, direction: Direction) -> Self {
        OrderBy { field, direction }
    }

    /// Parses `field` or `field,ASC|DESC`. Missing input yields `default`.
    pub fn parse(
        raw: Option<&str>,
        allowed: &[&'static str],
        default: OrderBy,
    ) -> Result<Self, QueryError> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(default),
            Some(raw) => raw,
        };

        let (name, direction) = match raw.split_once(',') {
            Some((name, dir)) => (name.trim(), Some(dir.trim())),
            None => (raw, None),
        };

        let field = allowed
            .iter()
            .copied()
            .find(|candidate| *candidate == name)
            .ok_or_else(|| QueryError::UnknownOrderField(name.to_string()))?;

        let direction = match direction.map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => Direction::Asc,
            Some("DESC") => Direction::Desc,
            Some(other) => return Err(QueryError::UnknownDirection(other.to_string())),
        };

        Ok(OrderBy { field, direction })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    rows: u32,
}

impl Page {
    pub fn new(number: i64, rows: i64) -> Result<Self, QueryError> {
        if number < 1 || number > i64::from(u32::MAX) {
            return Err(QueryError::InvalidPageNumber(number));
        }
        if !(1..=MAX_ROWS_PER_PAGE).contains(&rows) {
            return Err(QueryError::InvalidRowsPerPage(rows));
        }
        Ok(Page {
            number: number as u32,
            rows: rows as u32,
        })
    }

    pub fn first(rows: u32) -> Self {
        Page {
            number: 1,
            rows: rows.clamp(1, MAX_ROWS_PER_PAGE as u32),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.rows)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.rows)
    }
}

/// Paging and ordering parameters accepted by list endpoints
/// (`?page=2&rows=20&orderBy=date_created,DESC`).
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub rows: Option<i64>,
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
}

impl ListParams {
    pub fn resolve(
        &self,
        allowed: &[&'static str],
        default: OrderBy,
    ) -> Result<(OrderBy, Page), QueryError> {
        let order = OrderBy::parse(self.order_by.as_deref(), allowed, default)?;
        let page = Page::new(
            self.page.unwrap_or(1),
            self.rows.unwrap_or(DEFAULT_ROWS_PER_PAGE),
        )?;
        Ok((order, page))
    }
}

#[derive(Debug, Serialize)]
pub struct PageDocument<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub rows_per_page: u32,
}

impl<T> PageDocument<T> {
    pub fn new<S: Into<T>>(items: Vec<S>, total: i64, page: Page) -> Self {
        PageDocument {
            items: items.into_iter().map(Into::into).collect(),
            total,
            page: page.number(),
            rows_per_page: page.rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["id", "scheduled_on", "date_created"];
    const DEFAULT: OrderBy = OrderBy::new("id", Direction::Asc);

    #[test]
    fn order_by_defaults_and_whitelist() {
        assert_eq!(OrderBy::parse(None, FIELDS, DEFAULT), Ok(DEFAULT));
        assert_eq!(OrderBy::parse(Some("  "), FIELDS, DEFAULT), Ok(DEFAULT));
        assert_eq!(
            OrderBy::parse(Some("scheduled_on,desc"), FIELDS, DEFAULT),
            Ok(OrderBy::new("scheduled_on", Direction::Desc))
        );
        assert_eq!(
            OrderBy::parse(Some("date_created"), FIELDS, DEFAULT),
            Ok(OrderBy::new("date_created", Direction::Asc))
        );
        assert_eq!(
            OrderBy::parse(Some("password_hash"), FIELDS, DEFAULT),
            Err(QueryError::UnknownOrderField("password_hash".to_string()))
        );
        assert_eq!(
            OrderBy::parse(Some("id,sideways"), FIELDS, DEFAULT),
            Err(QueryError::UnknownDirection("SIDEWAYS".to_string()))
        );
    }

    #[test]
    fn page_bounds() {
        assert!(Page::new(1, 100).is_ok());
        assert_eq!(Page::new(1, 101), Err(QueryError::InvalidRowsPerPage(101)));
        assert_eq!(Page::new(1, 0), Err(QueryError::InvalidRowsPerPage(0)));
        assert_eq!(Page::new(0, 10), Err(QueryError::InvalidPageNumber(0)));

        let page = Page::new(3, 20).unwrap();
        assert_eq!(page.offset(), 40);
        assert_eq!(page.limit(), 20);
        assert_eq!(Page::first(500).rows(), 100);
    }

    #[test]
    fn list_params_resolve_with_defaults() {
        let params = ListParams::default();
        let (order, page) = params.resolve(FIELDS, DEFAULT).unwrap();
        assert_eq!(order, DEFAULT);
        assert_eq!(page.number(), 1);
        assert_eq!(i64::from(page.rows()), DEFAULT_ROWS_PER_PAGE);

        let params = ListParams {
            page: Some(2),
            rows: Some(101),
            order_by: None,
        };
        assert!(params.resolve(FIELDS, DEFAULT).is_err());
    }
}
