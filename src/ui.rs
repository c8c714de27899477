use colored::{ColoredString, Colorize};
use converge::{ActionResult, ConfirmCallback, PlanAction, ProgressCallback, RiskLevel, TaskProgress};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// Risk level padded to a fixed width and colored
pub fn risk_label(level: RiskLevel) -> ColoredString {
    let text = format!("{:<6}", level.to_string());
    match level {
        RiskLevel::High => text.red().bold(),
        RiskLevel::Medium => text.yellow(),
        RiskLevel::Low => text.green(),
    }
}

/// Prompts on the terminal through `dialoguer`
pub struct TerminalConfirm;

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> converge::Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| converge::Error::Confirmation(e.to_string()))
    }
}

/// Prints one line per action, task transition and compensation
pub struct TerminalProgress {
    pub quiet: bool,
}

impl ProgressCallback for TerminalProgress {
    fn on_action_start(&mut self, index: usize, total: usize, action: &PlanAction) {
        if !self.quiet {
            step(index + 1, total, &format!("{} {}", action.kind(), action.op.target()));
        }
    }

    fn on_action_complete(&mut self, result: &ActionResult) {
        if result.success {
            if !self.quiet {
                dim(&result.message);
            }
        } else {
            error(&format!("{}: {}", result.action.kind(), result.message));
        }
    }

    fn on_task_update(&mut self, progress: &TaskProgress) {
        if self.quiet {
            return;
        }
        let detail = progress
            .detail
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        dim(&format!(
            "task {} on {}: {}{}",
            progress.upid, progress.node, progress.status, detail
        ));
    }

    fn on_rollback_start(&mut self, action: &PlanAction) {
        println!("{} {}", "↺".yellow(), action.reason);
    }
}
