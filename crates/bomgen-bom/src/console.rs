//! Console rendering of the table, behind the `table` feature.

use std::io::{self, Write};

use comfy_table::{Cell, Color, ContentArrangement, Table};

use crate::table::BomTable;

impl BomTable {
    /// Write the BoM as a formatted console table. DNF rows are appended
    /// greyed out.
    pub fn write_console<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::DynamicFullWidth);
        table.set_header(self.header());

        for row in &self.rows {
            table.add_row(row.iter().map(Cell::new));
        }
        for row in &self.dnf_rows {
            table.add_row(row.iter().map(|cell| Cell::new(cell).fg(Color::DarkGrey)));
        }

        writeln!(writer, "{table}")?;
        writeln!(
            writer,
            "{} components, {} fitted, {} to buy",
            self.stats.n_total, self.stats.n_fitted, self.stats.n_build
        )?;
        Ok(())
    }
}
