//! Database initialization, table definitions and video queries
//!
//! Videos live in an embedded redb database. The main table is keyed by
//! video id; a secondary index keyed by publication time gives ordered
//! scans for the default sort. Both tables hold the same JSON record.

use std::ops::Bound;

use redb::{
    AccessGuard, Database, Key, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    StorageError, TableDefinition,
};
use thiserror::Error;
use tracing::debug;

use crate::model::VideoRecord;
use crate::pagination::{KeysetFilter, PageQuery, SortField, SortOrder, SortValue};

/// Main table for storing video records
///
/// Key: video id
/// Value: JSON-serialized VideoRecord
pub const TABLE_VIDEOS: TableDefinition<&str, &str> = TableDefinition::new("videos_v1");

/// Index table ordered by publication time
///
/// Key: `(published_at in microseconds, video id)`
/// Value: JSON-serialized VideoRecord
///
/// The id component keeps keys unique when two videos share a timestamp.
pub const TABLE_PUBLISHED_INDEX: TableDefinition<(i64, &str), &str> =
    TableDefinition::new("videos_by_published_v1");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cursor value does not match sort field '{0}'")]
    MismatchedSortValue(SortField),
}

/// Creates or opens the database file and makes sure both tables exist
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "videos.db")
///
/// # Returns
///
/// * `Ok(Database)` - Database with both tables created
/// * `Err(StoreError)` - The file could not be opened or the tables created
///
/// # Example
///
/// ```no_run
/// # use vidfetch::database::init_db;
/// let db = init_db("videos.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, StoreError> {
    // Create or open the database file
    let db = Database::create(db_path)?;

    // Opening a table inside a write transaction creates it if missing
    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_VIDEOS)?;
        write_txn.open_table(TABLE_PUBLISHED_INDEX)?;
    }

    // Commit to persist the table structures
    write_txn.commit()?;

    Ok(db)
}

/// Inserts or replaces a batch of videos in one transaction
///
/// An existing record with the same id is overwritten field by field with
/// the new values.
///
/// # Arguments
///
/// * `db` - Database opened by [`init_db`]
/// * `videos` - Records to store, keyed by their `id`
///
/// # Returns
///
/// * `Ok(usize)` - Number of records written
/// * `Err(StoreError)` - Nothing from the batch was committed
pub fn upsert_videos(db: &Database, videos: &[VideoRecord]) -> Result<usize, StoreError> {
    if videos.is_empty() {
        return Ok(0);
    }

    let write_txn = db.begin_write()?;
    {
        let mut table_main = write_txn.open_table(TABLE_VIDEOS)?;
        let mut table_index = write_txn.open_table(TABLE_PUBLISHED_INDEX)?;

        for video in videos {
            let record_json = serde_json::to_string(video)?;

            // drop the index entry of the previous version before re-keying
            let previous = table_main
                .get(video.id.as_str())?
                .map(|guard| serde_json::from_str::<VideoRecord>(guard.value()))
                .transpose()?;
            if let Some(previous) = previous {
                table_index.remove((previous.published_at.timestamp_micros(), video.id.as_str()))?;
            }

            table_main.insert(video.id.as_str(), record_json.as_str())?;
            table_index.insert(
                (video.published_at.timestamp_micros(), video.id.as_str()),
                record_json.as_str(),
            )?;
        }
    }
    write_txn.commit()?;

    debug!(count = videos.len(), "videos upserted");
    Ok(videos.len())
}

/// Runs a keyset page scan
///
/// # Arguments
///
/// * `db` - Database opened by [`init_db`]
/// * `query` - Scan built by [`crate::pagination::build_query`]
///
/// # Returns
///
/// * `Ok(Vec<VideoRecord>)` - At most `query.fetch_limit` rows, in the requested order
/// * `Err(StoreError)` - A read failed or a stored record could not be decoded
pub fn query_videos(db: &Database, query: &PageQuery) -> Result<Vec<VideoRecord>, StoreError> {
    let read_txn = db.begin_read()?;

    match query.sort_field {
        SortField::PublishedAt => {
            let table = read_txn.open_table(TABLE_PUBLISHED_INDEX)?;
            let bounds: (Bound<(i64, &str)>, Bound<(i64, &str)>) = match &query.filter {
                None => (Bound::Unbounded, Bound::Unbounded),
                Some(KeysetFilter::Before(value)) => {
                    (Bound::Unbounded, Bound::Excluded((published_micros(value)?, "")))
                }
                Some(KeysetFilter::After(value)) => match published_micros(value)?.checked_add(1) {
                    Some(start) => (Bound::Included((start, "")), Bound::Unbounded),
                    None => return Ok(Vec::new()),
                },
            };
            let range = table.range::<(i64, &str)>(bounds)?;
            match query.sort_order {
                SortOrder::Desc => collect_rows(range.rev(), query.fetch_limit),
                SortOrder::Asc => collect_rows(range, query.fetch_limit),
            }
        }
        SortField::Id => {
            let table = read_txn.open_table(TABLE_VIDEOS)?;
            let text = query.filter.as_ref().map(|filter| match filter {
                KeysetFilter::Before(value) | KeysetFilter::After(value) => value.to_text(),
            });
            let bounds: (Bound<&str>, Bound<&str>) = match (&query.filter, text.as_deref()) {
                (Some(KeysetFilter::Before(_)), Some(id)) => (Bound::Unbounded, Bound::Excluded(id)),
                (Some(KeysetFilter::After(_)), Some(id)) => (Bound::Excluded(id), Bound::Unbounded),
                _ => (Bound::Unbounded, Bound::Unbounded),
            };
            let range = table.range::<&str>(bounds)?;
            match query.sort_order {
                SortOrder::Desc => collect_rows(range.rev(), query.fetch_limit),
                SortOrder::Asc => collect_rows(range, query.fetch_limit),
            }
        }
    }
}

/// Number of stored videos, ignoring any page window
pub fn count_videos(db: &Database) -> Result<u64, StoreError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_VIDEOS)?;
    Ok(table.len()?)
}

/// Looks up a single video by id
pub fn get_video(db: &Database, id: &str) -> Result<Option<VideoRecord>, StoreError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_VIDEOS)?;
    let record = table
        .get(id)?
        .map(|guard| serde_json::from_str::<VideoRecord>(guard.value()))
        .transpose()?;
    Ok(record)
}

fn published_micros(value: &SortValue) -> Result<i64, StoreError> {
    match value {
        SortValue::PublishedAt(ts) => Ok(ts.timestamp_micros()),
        SortValue::Id(_) => Err(StoreError::MismatchedSortValue(SortField::PublishedAt)),
    }
}

fn collect_rows<'a, K, I>(entries: I, limit: usize) -> Result<Vec<VideoRecord>, StoreError>
where
    K: Key + 'static,
    I: Iterator<Item = Result<(AccessGuard<'a, K>, AccessGuard<'a, &'static str>), StorageError>>,
{
    // grows with the rows actually read, not with the requested limit
    let mut rows = Vec::new();
    for entry in entries.take(limit) {
        let (_, value) = entry?;
        rows.push(serde_json::from_str::<VideoRecord>(value.value())?);
    }
    Ok(rows)
}
