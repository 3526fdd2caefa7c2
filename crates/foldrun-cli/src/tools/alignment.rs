use super::{CommandTemplate, path_var};
use crate::config::file::FileToolCommand;
use crate::error::Result;
use foldrun::engine::alignment::{AlignmentRequest, AlignmentRunner};
use foldrun::engine::error::ToolError;
use tracing::info;

pub const ALIGNMENT_VARS: [&str; 7] = [
    "fasta_path",
    "output_dir",
    "tag",
    "template_search",
    "mode",
    "database_preset",
    "cpus",
];

/// Runs the alignment search program once per chain that has no alignments yet.
#[derive(Debug, Clone)]
pub struct ProcessAlignmentRunner {
    command: CommandTemplate,
}

impl ProcessAlignmentRunner {
    pub fn new(command: &FileToolCommand) -> Result<Self> {
        let command = CommandTemplate::from_tool(command);
        command.validate("alignment", &ALIGNMENT_VARS)?;
        Ok(Self { command })
    }
}

impl AlignmentRunner for ProcessAlignmentRunner {
    fn run(&self, request: &AlignmentRequest<'_>) -> std::result::Result<(), ToolError> {
        info!(
            tag = %request.chain.tag,
            program = self.command.program(),
            template_search = request.template_search.as_str(),
            "Running alignment search."
        );
        self.command.run(&[
            ("fasta_path", path_var(request.fasta_path)),
            ("output_dir", path_var(request.output_dir)),
            ("tag", request.chain.tag.clone()),
            ("template_search", request.template_search.as_str().to_string()),
            ("mode", request.mode.as_str().to_string()),
            ("database_preset", request.database_preset.as_str().to_string()),
            ("cpus", request.cpus.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldrun::core::models::target::ChainSequence;
    use foldrun::engine::config::{AlignmentMode, DatabasePreset, TemplateSearch};
    use std::fs;
    use tempfile::tempdir;

    fn tool(args: &[&str]) -> FileToolCommand {
        FileToolCommand {
            program: "sh".to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn passes_request_fields_to_the_program() {
        let dir = tempdir().unwrap();
        let runner = ProcessAlignmentRunner::new(&tool(&[
            "-c",
            "echo \"$1 $2 $3 $4\" > \"$5/call.txt\"",
            "sh",
            "{tag}",
            "{template_search}",
            "{database_preset}",
            "{cpus}",
            "{output_dir}",
        ]))
        .unwrap();
        let chain = ChainSequence::new("T1", "MKV");
        let fasta = dir.path().join("query.fasta");
        let request = AlignmentRequest {
            chain: &chain,
            fasta_path: &fasta,
            output_dir: dir.path(),
            template_search: TemplateSearch::Hmmsearch,
            mode: AlignmentMode::Full,
            database_preset: DatabasePreset::ReducedDbs,
            cpus: 8,
        };

        runner.run(&request).unwrap();

        let call = fs::read_to_string(dir.path().join("call.txt")).unwrap();
        assert_eq!(call.trim(), "T1 hmmsearch reduced_dbs 8");
    }

    #[test]
    fn unknown_placeholders_are_rejected_at_construction() {
        assert!(ProcessAlignmentRunner::new(&tool(&["{database}"])).is_err());
    }
}
