//! External collaborators reached through command-line programs.
//!
//! Every tool is a `program` plus an argument template from the tools file. Arguments may
//! contain `{placeholder}` variables, which are substituted per call. Tensors are exchanged
//! with the tools as `.npz` archives in the run's working directory.

pub mod alignment;
pub mod features;
pub mod model;
pub mod relax;

pub use alignment::ProcessAlignmentRunner;
pub use features::ProcessFeaturePipeline;
pub use model::load_models;
pub use relax::ProcessRelaxer;

use crate::config::file::FileToolCommand;
use crate::error::{CliError, Result};
use foldrun::engine::error::ToolError;
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Lines of a failing tool's stderr kept in the error message.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{name}}}' in argument '{arg}'")]
    UnknownPlaceholder { name: String, arg: String },

    #[error("unclosed placeholder in argument '{0}'")]
    Unclosed(String),
}

/// Variables available to one tool call.
pub type Vars<'a> = [(&'a str, String)];

pub(crate) fn path_var(path: &Path) -> String {
    path.display().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_tool(command: &FileToolCommand) -> Self {
        Self::new(&command.program, command.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Checks that every placeholder names one of `allowed`.
    pub fn validate(&self, section: &str, allowed: &[&str]) -> Result<()> {
        for arg in &self.args {
            substitute(arg, |name| allowed.iter().any(|a| *a == name).then(String::new)).map_err(|e| {
                CliError::Config(format!("Invalid [{}] arguments in the tools file: {}", section, e))
            })?;
        }
        Ok(())
    }

    pub fn render(&self, vars: &Vars<'_>) -> std::result::Result<Vec<String>, TemplateError> {
        let lookup = |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
        };
        self.args.iter().map(|arg| substitute(arg, lookup)).collect()
    }

    /// Runs the program to completion. A non-zero exit status is an error carrying the
    /// tail of the tool's stderr.
    pub fn run(&self, vars: &Vars<'_>) -> std::result::Result<(), ToolError> {
        let args = self
            .render(vars)
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        debug!(program = %self.program, ?args, "Running external tool.");

        let start = Instant::now();
        let output = Command::new(&self.program).args(&args).output()?;
        let elapsed = start.elapsed();

        if !output.status.success() {
            return Err(ToolError::Process {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        debug!(program = %self.program, elapsed_ms = elapsed.as_millis() as u64, "External tool finished.");
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn substitute(
    arg: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<String, TemplateError> {
    let mut rendered = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TemplateError::Unclosed(arg.to_string()))?;
        let name = &after[..close];
        let value = lookup(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
            name: name.to_string(),
            arg: arg.to_string(),
        })?;
        rendered.push_str(&value);
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(args: &[&str]) -> CommandTemplate {
        CommandTemplate::new("sh", args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn render_substitutes_every_placeholder() {
        let t = template(&["--in={fasta_path}", "{cpus}", "literal"]);
        let vars = [("fasta_path", "/tmp/a.fasta".to_string()), ("cpus", "8".to_string())];
        assert_eq!(
            t.render(&vars).unwrap(),
            vec!["--in=/tmp/a.fasta", "8", "literal"]
        );
    }

    #[test]
    fn render_rejects_unknown_and_unclosed_placeholders() {
        let vars = [("cpus", "8".to_string())];
        assert_eq!(
            template(&["{gpus}"]).render(&vars),
            Err(TemplateError::UnknownPlaceholder {
                name: "gpus".to_string(),
                arg: "{gpus}".to_string()
            })
        );
        assert_eq!(
            template(&["{cpus"]).render(&vars),
            Err(TemplateError::Unclosed("{cpus".to_string()))
        );
    }

    #[test]
    fn validate_reports_the_section() {
        let err = template(&["{nope}"])
            .validate("alignment", &["fasta_path"])
            .unwrap_err();
        assert!(err.to_string().contains("[alignment]"));
        assert!(template(&["{fasta_path}"]).validate("alignment", &["fasta_path"]).is_ok());
    }

    #[test]
    fn run_reports_exit_status_and_stderr() {
        let t = template(&["-c", "echo {message} >&2; exit 3"]);
        let err = t.run(&[("message", "boom".to_string())]).unwrap_err();
        match err {
            ToolError::Process { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(template(&["-c", "true"]).run(&[]).is_ok());
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let t = CommandTemplate::new("foldrun-no-such-program", Vec::new());
        assert!(matches!(t.run(&[]), Err(ToolError::Io(_))));
    }

    #[test]
    fn stderr_is_truncated_to_its_tail() {
        let long: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&long);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 49"));
    }
}
