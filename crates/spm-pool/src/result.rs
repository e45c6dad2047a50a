//! Query results: a re-readable view over a driver cursor

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use spm_core::{DriverCursor, Result, Row, SpmError, normalize_column_names};

use crate::pool::PoolShared;
use crate::pool::tracker::ResourceKey;

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Shared ownership of a driver cursor.
///
/// The cursor is released when it is closed explicitly, reclaimed by the
/// reaper, or when the last reference goes away.
pub(crate) struct CursorHandle {
    id: u64,
    cursor: Mutex<Option<Box<dyn DriverCursor>>>,
}

impl CursorHandle {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Release the cursor. Returns false if it was already released.
    pub(crate) fn close(&self) -> bool {
        match self.cursor.lock().take() {
            Some(mut cursor) => {
                cursor.close();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cursor.lock().is_none()
    }
}

impl Drop for CursorHandle {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.get_mut().take() {
            cursor.close();
        }
    }
}

/// The result of one executed statement
///
/// Reading never consumes the result: [`first`](Self::first) peeks at the
/// first record and [`all`](Self::all) rewinds after reading, so both can be
/// called any number of times. Clones share the same cursor.
#[derive(Clone)]
pub struct ResultSet {
    cursor: Arc<CursorHandle>,
    columns: Arc<[String]>,
    row_count: u64,
    pool: Weak<PoolShared>,
}

impl ResultSet {
    pub(crate) fn new(
        cursor: Box<dyn DriverCursor>,
        pool: &Arc<PoolShared>,
    ) -> (Self, Arc<CursorHandle>) {
        let columns: Arc<[String]> = normalize_column_names(cursor.description()).into();
        let row_count = cursor.row_count();
        let handle = Arc::new(CursorHandle {
            id: NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed),
            cursor: Mutex::new(Some(cursor)),
        });
        let result = Self {
            cursor: handle.clone(),
            columns,
            row_count,
            pool: Arc::downgrade(pool),
        };
        (result, handle)
    }

    /// Rows returned by a query, or rows affected by a statement
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Normalized column names, in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The first record, or `None` if the statement produced no rows.
    ///
    /// The cursor is moved back after reading, so repeated calls return the
    /// same row.
    pub fn first(&self) -> Result<Option<Row>> {
        let row = {
            let mut guard = self.cursor.cursor.lock();
            let cursor = guard.as_mut().ok_or(SpmError::CursorClosed)?;
            match cursor.fetch_one()? {
                Some(values) => {
                    cursor.scroll(-1)?;
                    Some(Row::new(self.columns.clone(), values))
                }
                None => None,
            }
        };
        self.touch();
        Ok(row)
    }

    /// Every remaining record, in order. The cursor is rewound afterwards.
    pub fn all(&self) -> Result<Vec<Row>> {
        let rows = {
            let mut guard = self.cursor.cursor.lock();
            let cursor = guard.as_mut().ok_or(SpmError::CursorClosed)?;
            let records = cursor.fetch_all()?;
            if !records.is_empty() {
                cursor.scroll(-(records.len() as i64))?;
            }
            records
                .into_iter()
                .map(|values| Row::new(self.columns.clone(), values))
                .collect::<Vec<_>>()
        };
        self.touch();
        Ok(rows)
    }

    /// Release the cursor now instead of waiting for the last clone to drop
    pub fn close(&self) {
        if self.cursor.close()
            && let Some(pool) = self.pool.upgrade()
        {
            pool.tracker.untrack(ResourceKey::Cursor(self.cursor.id()));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    /// Reading counts as activity for leak detection
    fn touch(&self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.tracker.touch(ResourceKey::Cursor(self.cursor.id()));
        }
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.columns)
            .field("row_count", &self.row_count)
            .field("closed", &self.is_closed())
            .finish()
    }
}
