//! Styled and plain implementations of the core presentation traits.
//!
//! The styled variant draws coloured status lines, `indicatif` spinners and
//! `dialoguer` prompts. The plain variant writes `[INFO]`-style prefixes and
//! reads answers line by line, which keeps it usable from pipes and tests.

use console::{Style, Term};
use dialoguer::{Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use runveer_core::{MenuPresenter, ScriptEntry, Status, StatusReporter};
use std::cell::RefCell;
use std::io::{self, BufRead, BufReader, Stdin, Write};
use std::path::PathBuf;
use std::time::Duration;

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Short trait tags shown next to a script name.
pub fn script_tags(entry: &ScriptEntry) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if entry.has_dependencies {
        tags.push("deps");
    }
    let Some(profile) = &entry.profile else {
        tags.push("unreadable");
        return tags;
    };
    if profile.interactive {
        tags.push("interactive");
    }
    if profile.privileged {
        tags.push("sudo");
    }
    if profile.web_ui {
        tags.push("web");
    }
    tags
}

fn script_label(entry: &ScriptEntry) -> String {
    let tags = script_tags(entry);
    if tags.is_empty() {
        entry.name.clone()
    } else {
        format!("{} [{}]", entry.name, tags.join(", "))
    }
}

pub struct StyledReporter {
    term: Term,
    assume_yes: bool,
    task: RefCell<Option<ProgressBar>>,
}

impl StyledReporter {
    pub fn new(assume_yes: bool, to_stderr: bool) -> Self {
        Self {
            term: if to_stderr {
                Term::stderr()
            } else {
                Term::stdout()
            },
            assume_yes,
            task: RefCell::new(None),
        }
    }

    fn write_line(&self, line: &str) {
        let write = || {
            let _ = self.term.write_line(line);
        };
        match self.task.borrow().as_ref() {
            Some(pb) => pb.suspend(write),
            None => write(),
        }
    }
}

impl StatusReporter for StyledReporter {
    fn status(&self, level: Status, message: &str) {
        let (symbol, style) = match level {
            Status::Info => ("ℹ", Style::new().blue()),
            Status::Success => ("✓", Style::new().green()),
            Status::Warning => ("⚠", Style::new().yellow()),
            Status::Error => ("✗", Style::new().red().bold()),
            Status::Progress => ("→", Style::new().cyan()),
        };
        self.write_line(&format!("{} {message}", style.apply_to(symbol)));
    }

    fn panel(&self, title: &str, body: &str) {
        let rule = Style::new().dim().apply_to("─".repeat(40));
        self.write_line(&format!("{} {}", Style::new().bold().apply_to(title), rule));
        for line in body.lines() {
            self.write_line(line);
        }
        self.write_line(&rule.to_string());
    }

    fn confirm(&self, question: &str, default: bool) -> bool {
        if self.assume_yes {
            return true;
        }
        if let Some(pb) = self.task.borrow_mut().take() {
            pb.finish_and_clear();
        }
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .unwrap_or(default)
    }

    fn start_task(&self, message: &str) {
        let mut task = self.task.borrow_mut();
        if let Some(previous) = task.take() {
            previous.finish_and_clear();
        }
        *task = Some(spinner(message));
    }

    fn finish_task(&self, ok: bool, message: &str) {
        let current = self.task.borrow_mut().take();
        match current {
            Some(pb) if ok => spin_ok(&pb, message),
            Some(pb) => spin_fail(&pb, message),
            None => self.status(if ok { Status::Success } else { Status::Error }, message),
        }
    }
}

impl MenuPresenter for StyledReporter {
    fn choose_script(&self, scripts: &[ScriptEntry]) -> Option<PathBuf> {
        let mut items: Vec<String> = scripts.iter().map(script_label).collect();
        items.push("Quit".to_owned());
        let picked = Select::new()
            .with_prompt("Select a script to run")
            .items(&items)
            .default(0)
            .interact_opt()
            .ok()
            .flatten()?;
        scripts.get(picked).map(|s| s.path.clone())
    }
}

/// Prefix-tagged output with line-based prompts.
pub struct PlainReporter<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
    assume_yes: bool,
}

impl PlainReporter<BufReader<Stdin>, Box<dyn Write>> {
    pub fn stdio(assume_yes: bool, to_stderr: bool) -> Self {
        let output: Box<dyn Write> = if to_stderr {
            Box::new(io::stderr())
        } else {
            Box::new(io::stdout())
        };
        Self::new(BufReader::new(io::stdin()), output, assume_yes)
    }
}

impl<R: BufRead, W: Write> PlainReporter<R, W> {
    pub fn new(input: R, output: W, assume_yes: bool) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
            assume_yes,
        }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    fn write_line(&self, line: &str) {
        let mut out = self.output.borrow_mut();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    fn prompt(&self, text: &str) -> Option<String> {
        {
            let mut out = self.output.borrow_mut();
            let _ = write!(out, "{text}");
            let _ = out.flush();
        }
        let mut line = String::new();
        match self.input.borrow_mut().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_owned()),
        }
    }
}

impl<R: BufRead, W: Write> StatusReporter for PlainReporter<R, W> {
    fn status(&self, level: Status, message: &str) {
        let tag = match level {
            Status::Info => "[INFO]",
            Status::Success => "[OK]",
            Status::Warning => "[WARN]",
            Status::Error => "[ERROR]",
            Status::Progress => "[..]",
        };
        self.write_line(&format!("{tag} {message}"));
    }

    fn panel(&self, title: &str, body: &str) {
        self.write_line(&format!("=== {title} ==="));
        for line in body.lines() {
            self.write_line(line);
        }
        self.write_line(&"=".repeat(title.len() + 8));
    }

    fn confirm(&self, question: &str, default: bool) -> bool {
        if self.assume_yes {
            return true;
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        match self.prompt(&format!("{question} {hint} ")) {
            Some(answer) => match answer.to_ascii_lowercase().as_str() {
                "" => default,
                "y" | "yes" => true,
                _ => false,
            },
            None => default,
        }
    }
}

impl<R: BufRead, W: Write> MenuPresenter for PlainReporter<R, W> {
    fn choose_script(&self, scripts: &[ScriptEntry]) -> Option<PathBuf> {
        self.write_line("Available scripts:");
        for (i, entry) in scripts.iter().enumerate() {
            self.write_line(&format!("  {}) {}", i + 1, script_label(entry)));
        }
        self.write_line("  0) quit");

        loop {
            let answer = self.prompt(&format!("Select [0-{}]: ", scripts.len()))?;
            if matches!(answer.as_str(), "0" | "q" | "quit") {
                return None;
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=scripts.len()).contains(&n) => {
                    return Some(scripts[n - 1].path.clone());
                }
                _ => self.write_line(&format!("invalid choice '{answer}'")),
            }
        }
    }
}
