//! Markdown table rendering

/// Renders a Markdown table with every column padded to its widest cell
///
/// Pipes in cells are escaped and line breaks flattened so a cell never
/// breaks the table.
pub fn render_table<S: AsRef<str>>(headers: &[&str], rows: &[Vec<S>]) -> String {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| escape_cell(cell.as_ref())).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(width) => *width = (*width).max(len),
                None => widths.push(len),
            }
        }
    }

    let mut out = String::new();
    push_row(&mut out, headers, &widths);

    out.push('|');
    for width in &widths {
        out.push_str(&"-".repeat(width + 2));
        out.push('|');
    }
    out.push('\n');

    for row in &rows {
        push_row(&mut out, row, &widths);
    }

    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    out.push('|');
    for (i, width) in widths.iter().enumerate() {
        let cell: &str = cells.get(i).map(|c| c.as_ref()).unwrap_or_default();
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(width - cell.chars().count()));
        out.push_str(" |");
    }
    out.push('\n');
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
