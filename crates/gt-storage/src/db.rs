use crate::StorageError;

/// SQL flavor spoken by a backend. Only the handful of statements that
/// differ between Dolt (MySQL) and SQLite are routed through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn insert_ignore(&self) -> &'static str {
        match self {
            Dialect::Mysql => "INSERT IGNORE",
            Dialect::Sqlite => "INSERT OR IGNORE",
        }
    }

    pub fn table_exists_sql(&self, table: &str) -> String {
        let table = self.quote(table);
        match self {
            Dialect::Mysql => format!(
                "SELECT COUNT(*) AS n FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = {table}"
            ),
            Dialect::Sqlite => {
                format!("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = {table}")
            }
        }
    }

    /// Quotes a string literal for this dialect.
    pub fn quote(&self, value: &str) -> String {
        let escaped = match self {
            Dialect::Mysql => value.replace('\\', "\\\\").replace('\'', "''"),
            Dialect::Sqlite => value.replace('\'', "''"),
        };
        format!("'{escaped}'")
    }

    pub fn quote_list<'a>(&self, values: impl IntoIterator<Item = &'a str>) -> String {
        values
            .into_iter()
            .map(|value| self.quote(value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result of a read query: a header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            rows: self,
            cells,
        })
    }

    /// First cell of the first row parsed as a count; a header-only result
    /// counts as zero.
    pub fn scalar_u64(&self) -> Result<u64, StorageError> {
        let Some(first) = self.rows.first().and_then(|row| row.first()) else {
            return Ok(0);
        };
        let trimmed = first.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed
            .parse::<u64>()
            .map_err(|_| StorageError::Decode(format!("expected a count, got {trimmed:?}")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    rows: &'a Rows,
    cells: &'a [String],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.rows.column_index(column)?;
        self.cells.get(index).map(String::as_str)
    }

    /// Missing columns and SQL NULLs both read as the empty string.
    pub fn text(&self, column: &str) -> &'a str {
        self.get(column).unwrap_or_default()
    }
}

/// The external record store, reached through a synchronous
/// request/response command interface.
///
/// `query` is read-only. Everything that mutates goes through `execute` and
/// is only durable after `commit`.
pub trait BeadsDb {
    fn dialect(&self) -> Dialect;

    fn version(&self) -> Result<String, StorageError>;

    fn query(&self, sql: &str) -> Result<Rows, StorageError>;

    fn execute(&self, sql: &str) -> Result<(), StorageError>;

    fn commit(&self, message: &str) -> Result<(), StorageError>;

    fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        let rows = self.query(&self.dialect().table_exists_sql(table))?;
        Ok(rows.scalar_u64()? > 0)
    }

    fn count(&self, sql: &str) -> Result<u64, StorageError> {
        self.query(sql)?.scalar_u64()
    }
}
