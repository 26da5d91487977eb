use crate::models::ServiceView;

const HEADERS: [&str; 7] = [
    "Service",
    "Running",
    "Disabled",
    "PID",
    "StartTime",
    "Uptime",
    "CmdLine",
];
const NULL: &str = "null";

/// Renders the listing as a `|`-separated table with padded columns.
pub fn render_table(views: &[ServiceView]) -> String {
    let rows: Vec<[String; 7]> = views
        .iter()
        .map(|v| {
            [
                v.name.clone(),
                v.running.to_string(),
                v.disabled.to_string(),
                v.pid.to_string(),
                v.started_at.clone().unwrap_or_else(|| NULL.to_string()),
                v.uptime.clone().unwrap_or_else(|| NULL.to_string()),
                v.command_line.clone().unwrap_or_else(|| NULL.to_string()),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(String::from), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let last = cells.len() - 1;
    for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        if i == last {
            out.push_str(cell);
        } else {
            out.push_str(&format!("{:<width$}    |", cell, width = width));
        }
    }
    out.push('\n');
}

pub fn render_json(views: &[ServiceView]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(views)
}
