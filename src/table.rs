//! Wide CSV table used by every enrichment step.
//!
//! Cells are kept as strings so columns a step does not know about survive
//! a load/save cycle untouched.

use anyhow::{Context, Result};
use chrono::Local;
use csv::{ReaderBuilder, Writer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            headers,
            index,
            rows: Vec::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV: {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut table = Table::new(headers);
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Malformed CSV row in {}", path.display()))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(table.headers.len(), String::new());
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV: {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Appends an empty column if `name` is not present yet.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(i) = self.column_index(name) {
            return i;
        }
        let i = self.headers.len();
        self.headers.push(name.to_string());
        self.index.insert(name.to_string(), i);
        for row in &mut self.rows {
            row.push(String::new());
        }
        i
    }

    /// Missing columns read as empty strings.
    pub fn get(&self, row: usize, column: &str) -> &str {
        self.column_index(column)
            .and_then(|i| self.rows.get(row).and_then(|r| r.get(i)))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn get_f64(&self, row: usize, column: &str) -> Option<f64> {
        safe_float(self.get(row, column))
    }

    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) {
        let i = self.ensure_column(column);
        if let Some(r) = self.rows.get_mut(row) {
            r[i] = value.into();
        }
    }

    pub fn set_f64(&mut self, row: usize, column: &str, value: Option<f64>, decimals: usize) {
        let text = value.map(|v| fmt_value(v, decimals)).unwrap_or_default();
        self.set(row, column, text);
    }
}

/// Parses a numeric cell; blank and NA-like markers are `None`.
pub fn safe_float(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "na" | "n/a" | "nan" | "none" | "null" | "-" => return None,
        _ => {}
    }
    trimmed
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub fn fmt_value(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

/// Copies `source` into `backup_dir` as `<stem>_backup_<timestamp>.csv`.
pub fn create_backup(source: impl AsRef<Path>, backup_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let source = source.as_ref();
    let backup_dir = backup_dir.as_ref();
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("Failed to create backup dir: {}", backup_dir.display()))?;

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data");
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = backup_dir.join(format!("{}_backup_{}.csv", stem, timestamp));

    fs::copy(source, &backup_path).with_context(|| {
        format!(
            "Failed to back up {} to {}",
            source.display(),
            backup_path.display()
        )
    })?;
    tracing::info!(backup = %backup_path.display(), "backup created");
    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_float_treats_markers_as_missing() {
        assert_eq!(safe_float(""), None);
        assert_eq!(safe_float("NA"), None);
        assert_eq!(safe_float("N/A"), None);
        assert_eq!(safe_float("nan"), None);
        assert_eq!(safe_float("abc"), None);
        assert_eq!(safe_float(" 12.5 "), Some(12.5));
        assert_eq!(safe_float("1,250,000"), Some(1_250_000.0));
    }

    #[test]
    fn unknown_columns_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.csv");
        fs::write(&path, "id_building,custom_note,bldg_sqft\nB1,\"keep, me\",1000\n").unwrap();

        let mut table = Table::load(&path).unwrap();
        table.set_f64(0, "energy_total", Some(12.345), 2);
        table.save(&path).unwrap();

        let reloaded = Table::load(&path).unwrap();
        assert_eq!(reloaded.get(0, "custom_note"), "keep, me");
        assert_eq!(reloaded.get(0, "energy_total"), "12.35");
        assert_eq!(reloaded.get_f64(0, "bldg_sqft"), Some(1000.0));
        assert_eq!(reloaded.headers().len(), 4);
    }

    #[test]
    fn short_rows_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, "a,b,c\n1,2\n").unwrap();

        let table = Table::load(&path).unwrap();
        assert_eq!(table.get(0, "c"), "");
        assert_eq!(table.get(0, "missing"), "");
    }

    #[test]
    fn backup_copies_file_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("portfolio_data.csv");
        fs::write(&source, "a\n1\n").unwrap();

        let backup = create_backup(&source, dir.path().join("backups")).unwrap();
        let name = backup.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("portfolio_data_backup_"));
        assert_eq!(fs::read_to_string(backup).unwrap(), "a\n1\n");
    }
}
