//! Text (terminal) reporter

use super::YearRow;
use anyhow::Result;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const HEADERS: [&str; 7] = [
    "REPOSITORY",
    "YEAR",
    "COMMITS",
    "AUTHORS",
    "TOP CONTRIBUTOR",
    "LOC",
    "CONVENTIONAL",
];

fn ratio_cell(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:.0}%", r * 100.0),
        None => "n/a".into(),
    }
}

fn cells(row: &YearRow) -> [String; 7] {
    let top = match &row.top_contributor {
        Some(name) => format!("{} ({})", name, row.top_contributor_commits),
        None => "-".into(),
    };
    [
        row.repository.clone(),
        row.year.clone(),
        row.commits.to_string(),
        row.contributors.to_string(),
        top,
        row.lines_of_code.to_string(),
        ratio_cell(row.conventional_ratio),
    ]
}

/// Render rows as an aligned table. Numeric columns are right-aligned.
pub fn render(rows: &[YearRow], color: bool) -> Result<String> {
    let (bold, dim, reset) = if color {
        (BOLD, DIM, RESET)
    } else {
        ("", "", "")
    };

    if rows.is_empty() {
        return Ok(format!("{dim}No statistics recorded yet.{reset}\n"));
    }

    let body: Vec<[String; 7]> = rows.iter().map(cells).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &body {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |values: &[String], out: &mut String| {
        let mut parts = Vec::with_capacity(values.len());
        for (i, (value, width)) in values.iter().zip(widths.iter()).enumerate() {
            let numeric = matches!(i, 2 | 3 | 5 | 6);
            parts.push(if numeric {
                format!("{:>width$}", value, width = width)
            } else {
                format!("{:<width$}", value, width = width)
            });
        }
        out.push_str(parts.join("  ").trim_end());
        out.push('\n');
    };

    let mut out = String::new();
    let headers: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    out.push_str(bold);
    line(headers.as_slice(), &mut out);
    out.push_str(reset);
    let total: usize = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&format!("{dim}{}{reset}\n", "─".repeat(total)));
    for row in &body {
        line(row.as_slice(), &mut out);
    }

    let commits: u64 = rows.iter().map(|r| r.commits).sum();
    out.push_str(&format!(
        "\n{bold}{}{reset} rows, {bold}{}{reset} commits\n",
        rows.len(),
        commits
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::{rows, tests::test_state};

    #[test]
    fn test_text_render_plain() {
        let out = render(&rows(&test_state()), false).unwrap();
        assert!(!out.contains('\x1b'));
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("REPOSITORY"));
        assert!(lines[2].contains("acme/api"));
        assert!(lines[2].contains("n/a"));
        assert!(lines[3].contains("alice (2)"));
        assert!(lines[3].ends_with("67%"));
        assert!(out.contains("2 rows, 6 commits"));
    }

    #[test]
    fn test_text_render_colored_and_empty() {
        let out = render(&rows(&test_state()), true).unwrap();
        assert!(out.contains(BOLD));
        assert!(render(&[], false).unwrap().contains("No statistics"));
    }
}
