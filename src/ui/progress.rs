use crate::decision::{Action, ActionType};
use crate::state::Phase;
use crate::ui::icons::{CHECK, CROSS, DENIED, FILE_NEW, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Terminal UI for the orchestration loop, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Loop bar: iterations used out of the iteration cap
/// - Action bar: spinner with the current action and collaborator activity
///
/// Output is hidden when stderr is not a terminal; final summaries are printed by
/// the caller.
pub struct OrchestratorUI {
    multi: MultiProgress,
    loop_bar: ProgressBar,
    action_bar: ProgressBar,
    verbose: bool,
    current: Mutex<String>,
}

impl OrchestratorUI {
    /// Create the UI sized by the iteration cap.
    pub fn new(max_iterations: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let loop_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");

        let loop_bar = multi.add(ProgressBar::new(max_iterations));
        loop_bar.set_style(loop_style);
        loop_bar.set_prefix("  Loop");

        let action_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let action_bar = multi.add(ProgressBar::new_spinner());
        action_bar.set_style(action_style);
        action_bar.set_prefix("Action");

        Self {
            multi,
            loop_bar,
            action_bar,
            verbose,
            current: Mutex::new(String::new()),
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_separator(&self) {
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    /// Header printed once before the first iteration.
    pub fn print_run_header(&self, project: &str, workspace: &Path, max_iterations: u32) {
        self.print_line("");
        self.print_separator();
        self.print_line(format!(
            "{} Orchestrating {}",
            style("▶").green().bold(),
            style(project).yellow().bold()
        ));
        self.print_separator();
        self.print_line(format!("{}  {}", style("Workspace:").dim(), workspace.display()));
        self.print_line(format!(
            "{}  {} iterations max",
            style("Budget:").dim(),
            max_iterations
        ));
        self.print_line("");
    }

    /// Advance the loop bar to a new iteration.
    pub fn start_iteration(&self, iteration: u32, phase: Phase) {
        self.loop_bar.set_position(u64::from(iteration.saturating_sub(1)));
        self.loop_bar
            .set_message(format!("phase {}", style(phase).yellow()));
    }

    /// Show the chosen action and start the spinner.
    pub fn start_action(&self, action: &Action) {
        let label = action.action_type().to_string();
        if let Ok(mut current) = self.current.lock() {
            *current = label.clone();
        }
        self.print_line(format!(
            "  {} {}",
            style(&label).cyan().bold(),
            style(&action.reason).dim()
        ));
        self.action_bar.reset();
        self.action_bar
            .set_message(format!("{} {}", style(&label).cyan(), style("(starting...)").dim()));
        self.action_bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn set_status(&self, status: String) {
        let label = self
            .current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        self.action_bar
            .set_message(format!("{} {}", style(label).cyan(), status));
    }

    /// Short status line; printed as well in verbose mode.
    pub fn log_step(&self, msg: &str) {
        self.set_status(style(format!("({})", msg)).dim().to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    /// Refresh the spinner with wall-clock time spent in the current call.
    pub fn update_elapsed(&self, elapsed: Duration) {
        let secs = elapsed.as_secs();
        let time_str = if secs >= 60 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}s", secs)
        };
        self.set_status(style(format!("({})", time_str)).dim().to_string());
    }

    /// Show a tool use event (Read, Write, Edit, ...).
    pub fn show_tool_use(&self, emoji: &str, description: &str) {
        self.set_status(format!("{} {}", emoji, style(description).yellow()));
        self.print_line(format!("    {} {}", emoji, style(description).yellow()));
    }

    /// Brief snippet of collaborator text; printed only in verbose mode.
    pub fn show_thinking(&self, snippet: &str) {
        self.set_status(style(format!("💭 {}", snippet)).dim().to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("💭").dim(), style(snippet).dim()));
        }
    }

    pub fn show_artifact(&self, path: &Path) {
        self.print_line(format!("    {}{}", FILE_NEW, style(path.display()).green()));
    }

    /// A write outside the code directory that was rejected.
    pub fn show_denied(&self, target: &str, message: &str) {
        self.print_line(format!(
            "    {}{} {}",
            DENIED,
            style(target).red(),
            style(message).dim()
        ));
    }

    pub fn action_succeeded(&self, action: ActionType, summary: &str) {
        self.action_bar
            .finish_with_message(format!("{}{} {}", CHECK, action, style(summary).dim()));
        self.loop_bar.inc(1);
    }

    pub fn action_failed(&self, action: ActionType, error: &str) {
        self.action_bar
            .finish_with_message(format!("{}{} failed: {}", CROSS, action, style(error).red()));
        self.loop_bar.inc(1);
        self.print_line(format!(
            "    {}{} failed: {}",
            CROSS,
            style(action).red().bold(),
            error
        ));
    }

    /// Terminal action reached; the caller renders the details.
    pub fn action_halted(&self, action: ActionType) {
        self.action_bar
            .finish_with_message(format!("{}{}", SPARKLE, style(action).bold()));
        self.loop_bar.inc(1);
    }

    /// Stop all bars, leaving their last state on screen.
    pub fn finish(&self, message: &str) {
        if !self.action_bar.is_finished() {
            self.action_bar.finish_and_clear();
        }
        self.loop_bar.finish_with_message(message.to_string());
    }
}
