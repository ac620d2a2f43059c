//! Console output formatting
//!
//! All progress output goes through [`Console`] so timestamp prefixing and
//! status coloring are applied in one place. Status lines keep a fixed
//! `name status=[..] exit-code=[..] ms=[..]` shape so they stay grep-able.

use crate::core::{NodeResult, NodeStatus};
use chrono::Local;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");

/// Colorize a status word
pub fn format_status(status: NodeStatus) -> String {
    match status {
        NodeStatus::Pending => style("PENDING").dim().to_string(),
        NodeStatus::Executing => style("EXECUTING").yellow().to_string(),
        NodeStatus::Passed => style("PASSED").green().to_string(),
        NodeStatus::Failed => style("FAILED").red().to_string(),
        NodeStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Line-oriented progress console
#[derive(Debug, Clone, Default)]
pub struct Console {
    timestamps: bool,
}

impl Console {
    pub fn new(timestamps: bool) -> Self {
        Console { timestamps }
    }

    fn prefix(&self) -> String {
        if self.timestamps {
            format!("{} ", Local::now().format("%H:%M:%S%.3f"))
        } else {
            String::new()
        }
    }

    /// Print a progress line to stdout
    pub fn info(&self, message: impl AsRef<str>) {
        println!("{}{}", self.prefix(), message.as_ref());
    }

    /// Print an error line to stderr
    pub fn error(&self, message: impl AsRef<str>) {
        eprintln!("{}{}", self.prefix(), message.as_ref());
    }

    /// A node has started running
    pub fn executing(&self, label: &str) {
        self.info(format!(
            "{} status=[{}]",
            label,
            format_status(NodeStatus::Executing)
        ));
    }

    /// A node was skipped without running
    pub fn skipped(&self, label: &str) {
        self.info(format!(
            "{} status=[{}]",
            label,
            format_status(NodeStatus::Skipped)
        ));
    }

    /// A node reached a terminal state with a measured duration
    pub fn finished(&self, label: &str, result: &NodeResult) {
        let line = format!(
            "{} status=[{}] exit-code=[{}] ms=[{}]",
            label,
            format_status(result.status),
            result.exit_code,
            result.elapsed_ms
        );
        if result.status == NodeStatus::Failed {
            self.error(line);
        } else {
            self.info(line);
        }
    }

    /// Echo a resolved command before it runs
    pub fn command(&self, command: &str) {
        self.info(format!("$ {command}"));
    }

    /// One line of captured process output
    pub fn output(&self, line: &str) {
        self.info(format!("> {line}"));
    }
}
