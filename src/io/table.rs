//! Whitespace separated text tables (poses, point clouds).

use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};

/// Rows of non-empty fields. Blank lines and `#` comments are skipped; runs
/// of spaces and tabs separate fields.
pub(crate) fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    parse_rows(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub(crate) fn parse_rows(text: &str) -> Result<Vec<Vec<String>>> {
    let normalized = text.replace('\t', " ");
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(normalized.as_bytes());

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let fields: Vec<String> = rec
            .iter()
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if fields.is_empty() || fields[0].starts_with('#') {
            continue;
        }
        rows.push(fields);
    }
    Ok(rows)
}

/// Parse `fields[start..start + N]` as floats.
pub(crate) fn parse_floats<const N: usize>(fields: &[String], start: usize) -> Result<[f64; N]> {
    let mut out = [0.0; N];
    for (i, value) in out.iter_mut().enumerate() {
        let field = fields
            .get(start + i)
            .with_context(|| format!("Expected at least {} fields, got {}", start + N, fields.len()))?;
        *value = field
            .parse()
            .with_context(|| format!("Invalid number `{}`", field))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_skips_comments_and_blank_lines() {
        let rows = parse_rows("# header\n\n1 2  3\n\t4\t5 6\n   # indented comment\n").unwrap();
        assert_eq!(rows, vec![vec!["1", "2", "3"], vec!["4", "5", "6"]]);
    }

    #[test]
    fn test_parse_floats_reports_bad_fields() {
        let row: Vec<String> = ["a", "1.5", "x"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_floats::<1>(&row, 1).unwrap(), [1.5]);
        assert!(parse_floats::<2>(&row, 1).is_err());
        assert!(parse_floats::<3>(&row, 1).is_err());
    }
}
