//! Markdown rendering of result sets.
//!
//! Follows the pipe-table layout of `tabulate`: numeric columns are right aligned, everything
//! else left aligned, and every column is at least two characters wider than its header.
//! Unlike `tabulate`, numbers are not lined up on the decimal point.

use snowflake_client::{Column, ResultSet};
use unicode_width::UnicodeWidthStr;

/// Printed for SQL `NULL`. pandas' `to_markdown` leaves these cells blank instead.
const NULL: &str = "NULL";
/// Extra width every header gets on top of its own.
const HEADER_PADDING: usize = 2;

/// Snowflake types shown right aligned.
const NUMERIC_TYPES: &[&str] = &[
    "fixed",
    "real",
    "number",
    "numeric",
    "decimal",
    "int",
    "integer",
    "bigint",
    "smallint",
    "tinyint",
    "byteint",
    "float",
    "float4",
    "float8",
    "double",
    "double precision",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Alignment {
    Left,
    Right,
}

impl Alignment {
    fn of(column: &Column) -> Self {
        if NUMERIC_TYPES.contains(&column.data_type.as_str()) {
            Alignment::Right
        } else {
            Alignment::Left
        }
    }

    fn pad(self, value: &str, width: usize) -> String {
        let fill = " ".repeat(width.saturating_sub(value.width()));
        match self {
            Alignment::Left => format!("{value}{fill}"),
            Alignment::Right => format!("{fill}{value}"),
        }
    }

    fn rule(self, width: usize) -> String {
        let dashes = "-".repeat(width + 1);
        match self {
            Alignment::Left => format!(":{dashes}"),
            Alignment::Right => format!("{dashes}:"),
        }
    }
}

/// Keeps a cell on one line and out of the column separators.
fn escape_cell(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

/// Renders `result` as a markdown pipe table, without a trailing newline.
pub fn render_markdown(result: &ResultSet) -> String {
    let alignments: Vec<Alignment> = result.columns.iter().map(Alignment::of).collect();
    let headers: Vec<String> = result
        .columns
        .iter()
        .map(|column| escape_cell(&column.name))
        .collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            (0..headers.len())
                .map(|i| match row.get(i).and_then(Option::as_deref) {
                    Some(value) => escape_cell(value),
                    None => NULL.to_owned(),
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| header.width() + HEADER_PADDING)
        .collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }

    let line = |cells: Vec<String>| format!("| {} |", cells.join(" | "));
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(line(
        headers
            .iter()
            .zip(&alignments)
            .zip(&widths)
            .map(|((header, alignment), width)| alignment.pad(header, *width))
            .collect(),
    ));
    lines.push(format!(
        "|{}|",
        alignments
            .iter()
            .zip(&widths)
            .map(|(alignment, width)| alignment.rule(*width))
            .collect::<Vec<_>>()
            .join("|")
    ));
    for row in &rows {
        lines.push(line(
            row.iter()
                .zip(&alignments)
                .zip(&widths)
                .map(|((cell, alignment), width)| alignment.pad(cell, *width))
                .collect(),
        ));
    }
    lines.join("\n")
}
