mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
use styling::{dim, magenta_bold};
pub use summary::{print_create_summary, print_fetch_summary};

/// Prints the banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔀 gl-create-refs"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab merge request refs exporter")
    );
}
