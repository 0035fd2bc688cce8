// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ReporterOutput, StatusLevel};
use crate::{
    helpers::plural,
    runner::{RunSummary, TrackerListener},
};
use owo_colors::{OwoColorize, Style};
use std::{fmt, time::Duration};
use swrite::{SWrite, swrite};

#[derive(Debug, Default, Clone)]
pub(super) struct Styles {
    pub(super) count: Style,
    pub(super) pass: Style,
    pub(super) retry: Style,
    pub(super) fail: Style,
    pub(super) skip: Style,
    pub(super) test_name: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.retry = Style::new().magenta().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.test_name = Style::new().blue().bold();
    }
}

pub(super) struct DisplayBracketedDuration(pub(super) Duration);

impl fmt::Display for DisplayBracketedDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        write!(f, "[{:>8.3?}s] ", self.0.as_secs_f64())
    }
}

/// Prints a one-line summary once every tracked run has finished.
///
/// Attach it to a scheduler with
/// [`SchedulerBuilder::add_tracker_listener`](crate::runner::SchedulerBuilder::add_tracker_listener).
#[derive(Debug)]
pub struct SummaryDisplayer {
    styles: Styles,
    status_level: StatusLevel,
    output: ReporterOutput,
}

impl SummaryDisplayer {
    pub(super) fn new(styles: Styles, status_level: StatusLevel, output: ReporterOutput) -> Self {
        Self {
            styles,
            status_level,
            output,
        }
    }

    fn summary_line(&self, summary: &RunSummary) -> String {
        let failed = summary.failed_required.len();
        let failed_optional = summary.failed_optional.len();
        let summary_style = if failed > 0 {
            self.styles.fail
        } else {
            self.styles.pass
        };

        let mut line = String::new();
        swrite!(
            line,
            "{:>12} {} {} run: {} passed",
            "Summary".style(summary_style),
            summary.total.style(self.styles.count),
            plural::tests_str(summary.total),
            summary.passed.style(self.styles.count),
        );
        if failed > 0 {
            swrite!(line, ", {} failed", failed.style(self.styles.fail));
        }
        if failed_optional > 0 {
            swrite!(
                line,
                ", {} optional {} failed",
                failed_optional.style(self.styles.skip),
                plural::tests_str(failed_optional),
            );
        }
        if summary.in_progress > 0 {
            swrite!(
                line,
                ", {} still running",
                summary.in_progress.style(self.styles.count)
            );
        }
        line
    }
}

impl TrackerListener for SummaryDisplayer {
    fn on_all_done(&mut self, summary: &RunSummary) {
        if self.status_level == StatusLevel::None {
            return;
        }

        self.output.write_line(&self.summary_line(summary));
        for name in &summary.failed_required {
            let mut line = format!("{:>12} {}", "FAIL".style(self.styles.fail), name);
            if summary.attempts_exhausted.contains(name) {
                line.push_str(" (attempts exhausted)");
            }
            self.output.write_line(&line);
        }
        if self.status_level >= StatusLevel::Retry {
            for name in &summary.failed_optional {
                self.output.write_line(&format!(
                    "{:>12} {} (optional)",
                    "FAIL".style(self.styles.skip),
                    name
                ));
            }
        }
    }
}
