use crate::db::Rows;
use crate::StorageError;

/// Parses the CSV emitted by `dolt sql -r csv`: a header row followed by
/// zero or more data rows. Quoted fields may contain commas, doubled quotes
/// and newlines.
pub fn parse_csv(input: &str) -> Result<Rows, StorageError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if field_started || !field.is_empty() || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                field_started = false;
            }
            other => {
                field.push(other);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(StorageError::Decode("unterminated quoted field".to_string()));
    }
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    let mut records = records.into_iter();
    let Some(columns) = records.next() else {
        return Ok(Rows::default());
    };
    let width = columns.len();
    let rows = records
        .map(|mut row| {
            row.resize(width.max(row.len()), String::new());
            row
        })
        .collect();
    Ok(Rows { columns, rows })
}
