use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow};

/// Spinner on stderr for a long-running phase
pub struct PhaseProgress {
    pb: ProgressBar,
    label: String,
}

impl PhaseProgress {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(bright_yellow(&label).to_string());
        Self { pb, label }
    }

    /// Moves on to the next phase, marking the current one done.
    pub fn next(self, done: &str, label: impl Into<String>) -> Self {
        self.pb
            .finish_with_message(bright_green(format!("{done} ✓")).to_string());
        let label = label.into();
        let pb = create_spinner(bright_yellow(&label).to_string());
        Self { pb, label }
    }

    pub fn update(&self, detail: impl std::fmt::Display) {
        self.pb
            .set_message(bright_yellow(format!("{} ({detail})", self.label)).to_string());
    }

    pub fn finish(self, done: &str) {
        self.pb
            .finish_with_message(bright_green(format!("{done} ✓")).to_string());
        eprintln!();
    }

    pub fn fail(self) {
        self.pb
            .abandon_with_message(bright_red(format!("{} ✗", self.label)).to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
