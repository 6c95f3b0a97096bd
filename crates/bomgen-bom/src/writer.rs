//! Sink writers for the abstract table: CSV and JSON. The core produces
//! [`BomTable`]; these only serialize it.

use std::io::Write;

use serde_json::{json, Map, Value};

use crate::config::CsvSink;
use crate::table::BomTable;
use crate::Result;

/// Write the table as CSV, honoring the configured separator, header
/// visibility and quoting. The DNF section follows the data rows after a
/// `DNF:` marker line.
pub fn write_csv<W: Write>(table: &BomTable, opts: &CsvSink, out: W) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .delimiter(opts.separator)
        .quote_style(if opts.quote_all {
            csv::QuoteStyle::Always
        } else {
            csv::QuoteStyle::Necessary
        })
        .flexible(true)
        .from_writer(out);

    if !opts.hide_header {
        w.write_record(table.header())?;
    }
    for row in &table.rows {
        w.write_record(row)?;
    }
    if !table.dnf_rows.is_empty() {
        w.write_record(["DNF:"])?;
        for row in &table.dnf_rows {
            w.write_record(row)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Write the table as JSON: an object with the grouped rows as
/// name-keyed records, the DNF section and the stats.
pub fn write_json<W: Write>(table: &BomTable, mut out: W) -> Result<()> {
    let to_records = |rows: &[Vec<String>]| -> Vec<Value> {
        rows.iter()
            .map(|row| {
                let mut record = Map::new();
                for (col, cell) in table.columns.iter().zip(row) {
                    record.insert(col.name.clone(), Value::String(cell.clone()));
                }
                Value::Object(record)
            })
            .collect()
    };
    let doc = json!({
        "rows": to_records(&table.rows),
        "dnf": to_records(&table.dnf_rows),
        "stats": table.stats,
    });
    serde_json::to_writer_pretty(&mut out, &doc).map_err(std::io::Error::other)?;
    writeln!(out)?;
    Ok(())
}
