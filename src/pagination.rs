//! Keyset (cursor) pagination over stored videos
//!
//! Pages are addressed by the sort-field value of the last record already
//! seen rather than by an offset. Each query asks for rows strictly past
//! that value, so rows inserted while a client is paging never shift the
//! window underneath it. One extra row is always fetched to learn whether a
//! further page exists.
//!
//! A cursor carries only the value, not the field it came from. Clients must
//! send the same `field` with every page of a traversal; a cursor whose value
//! cannot be read as the requested field is rejected as invalid.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::model::VideoRecord;

/// Largest page a client may ask for
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid limit parameter")]
    InvalidLimit,

    #[error("invalid sort field '{0}', expected 'published_at' or 'id'")]
    InvalidSortField(String),

    #[error("invalid sort order '{0}', expected 'ASC' or 'DESC'")]
    InvalidSortOrder(String),
}

/// Field a page is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    PublishedAt,
    Id,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::PublishedAt => "published_at",
            SortField::Id => "id",
        }
    }
}

impl FromStr for SortField {
    type Err = PaginationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published_at" => Ok(SortField::PublishedAt),
            "id" => Ok(SortField::Id),
            other => Err(PaginationError::InvalidSortField(other.to_string())),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = PaginationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else if s.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else {
            Err(PaginationError::InvalidSortOrder(s.to_string()))
        }
    }
}

/// A client's request for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub cursor: Option<String>,
}

impl PageRequest {
    /// First page of `limit` records, newest first
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            cursor: None,
        }
    }

    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_field = field;
        self.sort_order = order;
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// A typed value of the sort field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortValue {
    PublishedAt(DateTime<Utc>),
    Id(String),
}

impl SortValue {
    /// The sort-field value of `record`
    pub fn of(record: &VideoRecord, field: SortField) -> Self {
        match field {
            SortField::PublishedAt => SortValue::PublishedAt(record.published_at),
            SortField::Id => SortValue::Id(record.id.clone()),
        }
    }

    /// Reads a decoded cursor value as `field`
    pub fn parse(field: SortField, text: &str) -> Result<Self, PaginationError> {
        match field {
            SortField::PublishedAt => DateTime::parse_from_rfc3339(text)
                .map(|ts| SortValue::PublishedAt(ts.with_timezone(&Utc)))
                .map_err(|e| {
                    PaginationError::InvalidCursor(format!("'{text}' is not a timestamp: {e}"))
                }),
            SortField::Id => Ok(SortValue::Id(text.to_string())),
        }
    }

    /// Textual form carried inside a cursor
    pub fn to_text(&self) -> String {
        match self {
            SortValue::PublishedAt(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            SortValue::Id(id) => id.clone(),
        }
    }
}

/// Strict bound on the sort field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeysetFilter {
    /// `field < value`
    Before(SortValue),
    /// `field > value`
    After(SortValue),
}

/// Store-facing description of one page scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub filter: Option<KeysetFilter>,
    /// Requested limit plus one
    pub fetch_limit: usize,
}

/// One page of results ready to be returned
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<VideoRecord>,
    pub has_next: bool,
    pub next_cursor: Option<String>,
    pub total_count: u64,
}

/// Translates a page request into the scan the store must run
pub fn build_query(request: &PageRequest) -> Result<PageQuery, PaginationError> {
    if request.limit == 0 || request.limit > MAX_PAGE_LIMIT {
        return Err(PaginationError::InvalidLimit);
    }

    let filter = match &request.cursor {
        Some(token) => {
            let text = decode_cursor(token)?;
            let value = SortValue::parse(request.sort_field, &text)?;
            Some(match request.sort_order {
                SortOrder::Desc => KeysetFilter::Before(value),
                SortOrder::Asc => KeysetFilter::After(value),
            })
        }
        None => None,
    };

    Ok(PageQuery {
        sort_field: request.sort_field,
        sort_order: request.sort_order,
        filter,
        fetch_limit: request.limit + 1,
    })
}

/// Trims an over-fetched row set down to a page and computes its cursor
///
/// `rows` must already be ordered as the query asked. The cursor points at
/// the last record kept, never at the dropped look-ahead row.
pub fn shape_page(
    mut rows: Vec<VideoRecord>,
    limit: usize,
    sort_field: SortField,
    total_count: u64,
) -> Page {
    let has_next = rows.len() > limit;
    rows.truncate(limit);

    let next_cursor = match rows.last() {
        Some(last) if has_next => Some(encode_cursor(&SortValue::of(last, sort_field).to_text())),
        _ => None,
    };

    Page {
        records: rows,
        has_next,
        next_cursor,
        total_count,
    }
}

/// Wraps a value's text in URL-safe base64
pub fn encode_cursor(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(value.as_bytes())
}

/// Unwraps a cursor produced by [`encode_cursor`]
pub fn decode_cursor(token: &str) -> Result<String, PaginationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|e| PaginationError::InvalidCursor(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PaginationError::InvalidCursor(e.to_string()))
}
