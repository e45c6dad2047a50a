//! MySQL connection implementation

use async_trait::async_trait;
use mysql_async::{Conn, Opts, Row as MySqlRow, consts::ColumnType, prelude::*};
use spm_core::{
    BufferedCursor, ColumnDescription, DriverConnection, DriverCursor, Result, SpmError, Value,
};

/// A single MySQL link
///
/// Holds the `mysql_async` connection until [`close`](DriverConnection::close)
/// is called; every call after that fails with `ConnectionClosed`.
pub struct MySqlConnection {
    conn: Option<Conn>,
}

impl MySqlConnection {
    /// Open a link with the given options
    pub async fn connect(opts: Opts) -> Result<Self> {
        tracing::debug!(
            host = %opts.ip_or_hostname(),
            port = opts.tcp_port(),
            "connecting to MySQL"
        );
        let conn = Conn::new(opts)
            .await
            .map_err(|e| SpmError::Connect(format!("Failed to connect to MySQL: {}", e)))?;
        tracing::debug!(connection_id = conn.id(), "MySQL connection established");
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn.as_mut().ok_or(SpmError::ConnectionClosed)
    }

    /// Run a statement whose result is of no interest
    async fn run(&mut self, sql: &str) -> Result<()> {
        self.conn()?
            .query_drop(sql)
            .await
            .map_err(|e| SpmError::Driver(format!("'{}' failed: {}", sql, e)))
    }
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("id", &self.conn.as_ref().map(|conn| conn.id()))
            .finish()
    }
}

/// Convert mysql_async Value to our Value type, using column type metadata
/// to correctly interpret byte strings from the text protocol.
fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => {
                    s.parse::<i64>().map(Value::Int64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_FLOAT => {
                    s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    Value::Decimal(s)
                }
                ColumnType::MYSQL_TYPE_DATE => parse_date(&s),
                ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                    parse_datetime(&s)
                }
                _ => Value::String(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Int64(i),
            Err(_) => Value::Decimal(u.to_string()),
        },
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32);
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                match date {
                    Some(date) => Value::Date(date),
                    None => Value::String(format!("{:04}-{:02}-{:02}", year, month, day)),
                }
            } else {
                let datetime = date.and_then(|d| {
                    d.and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                });
                match datetime {
                    Some(dt) => Value::DateTime(dt),
                    None => Value::String(format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                        year, month, day, hour, min, sec
                    )),
                }
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn parse_date(s: &str) -> Value {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Value::Date)
        .unwrap_or_else(|_| Value::String(s.to_string()))
}

fn parse_datetime(s: &str) -> Value {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(Value::DateTime)
        .unwrap_or_else(|_| Value::String(s.to_string()))
}

#[async_trait]
impl DriverConnection for MySqlConnection {
    async fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        };
        self.run(sql).await
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&mut self, sql: &str) -> Result<Box<dyn DriverCursor>> {
        let conn = self.conn()?;
        let mut result = conn
            .query_iter(sql)
            .await
            .map_err(|e| SpmError::Query(format!("Failed to execute query: {}", e)))?;

        let columns = result.columns_ref();
        let description: Vec<ColumnDescription> = columns
            .iter()
            .map(|col| ColumnDescription::new(col.name_str(), format!("{:?}", col.column_type())))
            .collect();
        let column_types: Vec<ColumnType> = columns.iter().map(|col| col.column_type()).collect();

        let mysql_rows: Vec<MySqlRow> = result
            .collect()
            .await
            .map_err(|e| SpmError::Query(format!("Failed to read result: {}", e)))?;
        let affected_rows = result.affected_rows();
        // Discard any further result sets of a multi-statement query
        result
            .drop_result()
            .await
            .map_err(|e| SpmError::Query(format!("Failed to read result: {}", e)))?;

        if description.is_empty() {
            tracing::debug!(affected_rows, "statement executed");
            return Ok(Box::new(BufferedCursor::affected(affected_rows)));
        }

        let rows: Vec<Vec<Value>> = mysql_rows
            .into_iter()
            .map(|mut mysql_row| {
                column_types
                    .iter()
                    .enumerate()
                    .map(|(idx, col_type)| {
                        let val = mysql_row.take(idx).unwrap_or(mysql_async::Value::NULL);
                        mysql_value_to_value(val, *col_type)
                    })
                    .collect()
            })
            .collect();

        tracing::debug!(row_count = rows.len(), "query executed");
        Ok(Box::new(BufferedCursor::new(description, rows)))
    }

    async fn commit(&mut self) -> Result<()> {
        self.run("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.disconnect()
            .await
            .map_err(|e| SpmError::Driver(format!("Failed to disconnect: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    #[test]
    fn test_text_protocol_integers() {
        let text = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());
        let v = mysql_value_to_value(text("42"), ColumnType::MYSQL_TYPE_LONG);
        assert_eq!(v, Value::Int64(42));

        let v = mysql_value_to_value(text("x"), ColumnType::MYSQL_TYPE_LONG);
        assert_eq!(v, Value::String("x".into()));
    }

    #[test]
    fn test_decimal_keeps_precision() {
        let v = mysql_value_to_value(
            mysql_async::Value::Bytes(b"12345678901234567890.12".to_vec()),
            ColumnType::MYSQL_TYPE_NEWDECIMAL,
        );
        assert_eq!(v, Value::Decimal("12345678901234567890.12".into()));
    }

    #[test]
    fn test_text_protocol_dates() {
        let text = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());
        let v = mysql_value_to_value(text("2024-03-01"), ColumnType::MYSQL_TYPE_DATE);
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));

        let v = mysql_value_to_value(text("2024-03-01 10:20:30"), ColumnType::MYSQL_TYPE_DATETIME);
        let expected =
            NaiveDateTime::parse_from_str("2024-03-01 10:20:30", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(v, Value::DateTime(expected));

        let v = mysql_value_to_value(text("0000-00-00"), ColumnType::MYSQL_TYPE_DATE);
        assert_eq!(v, Value::String("0000-00-00".into()));
    }

    #[test]
    fn test_binary_values() {
        use mysql_async::Value as My;

        assert_eq!(mysql_value_to_value(My::NULL, ColumnType::MYSQL_TYPE_LONG), Value::Null);
        assert_eq!(
            mysql_value_to_value(My::UInt(u64::MAX), ColumnType::MYSQL_TYPE_LONGLONG),
            Value::Decimal(u64::MAX.to_string())
        );
        assert_eq!(
            mysql_value_to_value(My::Bytes(vec![0xff, 0xfe]), ColumnType::MYSQL_TYPE_BLOB),
            Value::Bytes(vec![0xff, 0xfe])
        );
        assert_eq!(
            mysql_value_to_value(My::Date(2024, 3, 1, 0, 0, 0, 0), ColumnType::MYSQL_TYPE_DATE),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            mysql_value_to_value(My::Time(true, 1, 2, 3, 4, 0), ColumnType::MYSQL_TYPE_TIME),
            Value::String("-26:03:04.000000".into())
        );
    }
}
