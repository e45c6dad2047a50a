//! Client-side buffered cursor

use crate::{ColumnDescription, DriverCursor, Result, SpmError, Value};

/// A [`DriverCursor`] over rows that were fully received from the server.
///
/// Drivers that read a whole result set up front (the MySQL driver does) hand
/// one of these back from `execute`.
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    description: Vec<ColumnDescription>,
    rows: Vec<Vec<Value>>,
    row_count: u64,
    position: usize,
    closed: bool,
}

impl BufferedCursor {
    /// Create a cursor over the rows of a query
    pub fn new(description: Vec<ColumnDescription>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            description,
            rows,
            row_count,
            position: 0,
            closed: false,
        }
    }

    /// Create a cursor for a statement that produced no rows
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            row_count: affected_rows,
            ..Self::default()
        }
    }

    /// Current zero-based position
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SpmError::CursorClosed)
        } else {
            Ok(())
        }
    }
}

impl DriverCursor for BufferedCursor {
    fn description(&self) -> &[ColumnDescription] {
        &self.description
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn fetch_one(&mut self) -> Result<Option<Vec<Value>>> {
        self.ensure_open()?;
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>> {
        self.ensure_open()?;
        let rows = self.rows[self.position..].to_vec();
        self.position = self.rows.len();
        Ok(rows)
    }

    fn scroll(&mut self, offset: i64) -> Result<()> {
        self.ensure_open()?;
        let target = self.position as i64 + offset;
        if target < 0 || target > self.rows.len() as i64 {
            return Err(SpmError::Query(format!(
                "cursor scroll out of range: position {} offset {}",
                self.position, offset
            )));
        }
        self.position = target as usize;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> BufferedCursor {
        BufferedCursor::new(
            vec![ColumnDescription::new("id", "LONG")],
            vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
        )
    }

    #[test]
    fn test_fetch_one_then_scroll_back() {
        let mut cursor = cursor();
        assert_eq!(cursor.fetch_one().unwrap(), Some(vec![Value::Int64(1)]));
        cursor.scroll(-1).unwrap();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.fetch_one().unwrap(), Some(vec![Value::Int64(1)]));
    }

    #[test]
    fn test_fetch_all_from_position() {
        let mut cursor = cursor();
        cursor.fetch_one().unwrap();
        assert_eq!(cursor.fetch_all().unwrap(), vec![vec![Value::Int64(2)]]);
        assert_eq!(cursor.fetch_one().unwrap(), None);
    }

    #[test]
    fn test_scroll_out_of_range() {
        let mut cursor = cursor();
        assert!(matches!(cursor.scroll(-1), Err(SpmError::Query(_))));
        assert!(cursor.scroll(3).is_err());
        cursor.scroll(2).unwrap();
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_closed_cursor_rejects_reads() {
        let mut cursor = cursor();
        cursor.close();
        assert!(cursor.is_closed());
        assert!(matches!(cursor.fetch_one(), Err(SpmError::CursorClosed)));
        assert!(matches!(cursor.fetch_all(), Err(SpmError::CursorClosed)));
    }

    #[test]
    fn test_affected_cursor_has_no_rows() {
        let mut cursor = BufferedCursor::affected(3);
        assert_eq!(cursor.row_count(), 3);
        assert!(cursor.description().is_empty());
        assert_eq!(cursor.fetch_one().unwrap(), None);
    }
}
