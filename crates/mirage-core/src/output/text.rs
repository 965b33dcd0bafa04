//! Delimited text batches in bulk-load format: one row per line, `\N` for
//! NULL, backslash escapes for the delimiter and line breaks.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{MirageError, Result};

pub const NULL_MARKER: &str = "\\N";

/// `<root>/<table>/<table>_<batch>.csv`
pub fn batch_path(root: &Path, table: &str, batch: usize) -> PathBuf {
    root.join(table).join(format!("{}_{:05}.csv", table, batch))
}

/// Join one row's fields.
pub fn format_row(fields: &[Option<String>], delimiter: &str) -> String {
    fields
        .iter()
        .map(|f| match f {
            Some(value) => escape(value, delimiter),
            None => NULL_MARKER.to_string(),
        })
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn escape(value: &str, delimiter: &str) -> String {
    if !value.contains(['\\', '\n', '\r']) && !value.contains(delimiter) {
        return value.to_string();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    escaped.replace(delimiter, &format!("\\{}", delimiter))
}

/// Write the lines of one batch, creating the table directory if needed.
/// Returns the number of bytes written.
pub fn write_batch(path: &Path, lines: &[String]) -> Result<u64> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| MirageError::Output {
            message: format!("creating directory {}", dir.display()),
            source: e,
        })?;
    }
    let file = fs::File::create(path).map_err(|e| MirageError::Output {
        message: format!("creating {}", path.display()),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let mut bytes = 0u64;
    for line in lines {
        writeln!(writer, "{}", line).map_err(|e| MirageError::Output {
            message: format!("writing {}", path.display()),
            source: e,
        })?;
        bytes += line.len() as u64 + 1;
    }
    writer.flush().map_err(|e| MirageError::Output {
        message: format!("flushing {}", path.display()),
        source: e,
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_null_and_escape() {
        let row = vec![
            Some("1".to_string()),
            None,
            Some("a|b".to_string()),
            Some("x\\y".to_string()),
        ];
        assert_eq!(format_row(&row, "|"), "1|\\N|a\\|b|x\\\\y");
    }

    #[test]
    fn test_batch_path_layout() {
        let path = batch_path(Path::new("/data"), "orders", 7);
        assert_eq!(path, PathBuf::from("/data/orders/orders_00007.csv"));
    }

    #[test]
    fn test_write_batch_creates_table_dir() {
        let dir = tempdir().unwrap();
        let path = batch_path(dir.path(), "nation", 0);
        let lines = vec!["0|ALGERIA".to_string(), "1|ARGENTINA".to_string()];
        let bytes = write_batch(&path, &lines).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0|ALGERIA\n1|ARGENTINA\n");
        assert_eq!(bytes, content.len() as u64);
    }
}
