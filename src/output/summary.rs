use std::fmt::Write;
use std::path::Path;

use comfy_table::{Cell, Color as TableColor};

use crate::providers::github::{CreateStats, GitHubRepo};
use crate::providers::gitlab::FetchStats;

use super::styling::{bright, bright_green, bright_yellow, cyan, dim};
use super::tables::{count_cell, create_table};

/// Prints the result of a `fetch-refs` run to stdout.
pub fn print_fetch_summary(project: &str, stats: &FetchStats, output: Option<&Path>) {
    println!("{}", render_fetch_summary(project, stats, output));
}

/// Prints the result of a `create-refs` run to stdout.
pub fn print_create_summary(repo: &GitHubRepo, total: usize, stats: &CreateStats) {
    println!("{}", render_create_summary(repo, total, stats));
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_fetch_summary(project: &str, stats: &FetchStats, output_path: Option<&Path>) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let _ = writeln!(output, "  {} {}", dim("Project:"), cyan(project));

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Pages", "Merge requests", "Exported", "Skipped"]));
    table.add_row(vec![
        Cell::new(stats.pages),
        Cell::new(stats.visited),
        Cell::new(stats.emitted).fg(TableColor::Green),
        count_cell(stats.skipped),
    ]);
    let _ = writeln!(output, "{table}");

    match output_path {
        Some(path) if stats.emitted > 0 => {
            let _ = writeln!(
                output,
                "{} {}",
                bright_green("Successfully exported merge request references to:"),
                path.display()
            );
        }
        _ => {
            let _ = writeln!(
                output,
                "{}",
                bright_yellow("No merge requests found in the repository")
            );
        }
    }

    output
}

fn render_create_summary(repo: &GitHubRepo, total: usize, stats: &CreateStats) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🔀", "Branches");
    let _ = writeln!(output, "  {} {}", dim("Repository:"), cyan(repo));

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Refs", "Created", "Already existed"]));
    table.add_row(vec![
        Cell::new(total),
        Cell::new(stats.created).fg(TableColor::Green),
        count_cell(stats.existing),
    ]);
    let _ = writeln!(output, "{table}");

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render_fetch_summary_with_output() {
        let stats = FetchStats {
            pages: 2,
            visited: 150,
            emitted: 149,
            skipped: 1,
        };
        let path = PathBuf::from("/tmp/group-project.csv");

        let output = render_fetch_summary("group/project", &stats, Some(&path));

        assert!(output.contains("group/project"));
        assert!(output.contains("149"));
        assert!(output.contains("/tmp/group-project.csv"));
    }

    #[test]
    fn test_render_fetch_summary_without_refs() {
        let output = render_fetch_summary("group/empty", &FetchStats::default(), None);

        assert!(output.contains("No merge requests found"));
    }

    #[test]
    fn test_render_create_summary() {
        let repo = GitHubRepo::parse("octo/migrated").unwrap();
        let stats = CreateStats {
            created: 10,
            existing: 2,
        };

        let output = render_create_summary(&repo, 12, &stats);

        assert!(output.contains("octo/migrated"));
        assert!(output.contains("Already existed"));
        assert!(output.contains("12"));
    }
}
