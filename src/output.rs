use crate::error::Result;
use crate::types::{columns, CleanedRecord, CrossTab, RawDataset, YearTrendRow};
use crate::util::format_number;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Write rows back out in `headers` order; absent cells become empty.
pub fn write_raw(path: &Path, data: &RawDataset) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&data.headers)?;
    for row in &data.records {
        wtr.write_record(
            data.headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or("")),
        )?;
    }
    wtr.flush()?;
    Ok(())
}

/// Export the cleaned set with derived columns; the file loads back to the
/// same records.
pub fn write_records(path: &Path, records: &[CleanedRecord]) -> Result<()> {
    let extras: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.extra.keys().map(String::as_str))
        .collect();
    let headers: Vec<String> = columns::SOURCE
        .iter()
        .chain(columns::DERIVED.iter())
        .copied()
        .chain(extras)
        .map(str::to_string)
        .collect();

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&headers)?;
    for r in records {
        let cells: HashMap<String, Option<String>> = r.cells().into_iter().collect();
        wtr.write_record(headers.iter().map(|h| {
            cells
                .get(h)
                .and_then(|v| v.as_deref())
                .unwrap_or("")
                .to_string()
        }))?;
    }
    wtr.flush()?;
    info!("Exported {} cleaned records to {}", records.len(), path.display());
    Ok(())
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

pub fn render_cross_tab(tab: &CrossTab, max_rows: usize) -> String {
    let mut builder = Builder::default();
    let mut header = vec![format!("{} \\ {}", tab.primary, tab.secondary)];
    header.extend(tab.columns.iter().cloned());
    header.push("Total".to_string());
    builder.push_record(header);
    for row in tab.rows.iter().take(max_rows) {
        let mut cells = vec![row.key.clone()];
        cells.extend(row.counts.iter().map(|c| c.to_string()));
        cells.push(row.total.to_string());
        builder.push_record(cells);
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn render_year_trends(rows: &[YearTrendRow]) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let mut builder = Builder::default();
    let mut header = vec!["Year".to_string()];
    header.extend(MONTHS.iter().map(|m| m.to_string()));
    header.push("Total".to_string());
    builder.push_record(header);
    for row in rows {
        let mut cells = vec![row.year.to_string()];
        cells.extend(row.months.iter().map(|v| format_number(*v, 0)));
        cells.push(format_number(row.total, 0));
        builder.push_record(cells);
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_cross_tab(title: &str, tab: &CrossTab, max_rows: usize) {
    println!("\n{}\n", title);
    if tab.rows.is_empty() {
        println!("(no rows)\n");
        return;
    }
    println!("{}\n", render_cross_tab(tab, max_rows));
}
