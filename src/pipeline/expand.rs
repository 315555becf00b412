//! Command Expansion
//!
//! Materializes the template table into concrete argument vectors for one
//! subject. Expansion is a pure function of the prefix and the table: no
//! filesystem access, no quoting, no path resolution.

use std::fmt;
use std::path::Path;
use std::process::Command;

use super::template::{StepTemplate, PIPELINE, PREFIX_PLACEHOLDER};

/// One concrete, ready-to-spawn step for a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedCommand {
    /// 1-based step number, copied from the template
    pub order: usize,
    pub program: String,
    pub args: Vec<String>,
}

impl ExpandedCommand {
    /// Builds a process command running in `working_dir`.
    pub fn to_command(&self, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(working_dir);
        cmd
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for ExpandedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Substitutes the prefix into every placeholder occurrence of a token.
fn substitute_prefix(token: &str, prefix: &str) -> String {
    token.replace(PREFIX_PLACEHOLDER, prefix)
}

/// Expands a single template for a subject.
pub fn expand_step(template: &StepTemplate, prefix: &str) -> ExpandedCommand {
    ExpandedCommand {
        order: template.order,
        program: substitute_prefix(template.program, prefix),
        args: template
            .arg_templates()
            .map(|token| substitute_prefix(token, prefix))
            .collect(),
    }
}

/// Expands an arbitrary table, preserving its order.
pub fn expand_with(templates: &[StepTemplate], prefix: &str) -> Vec<ExpandedCommand> {
    templates.iter().map(|t| expand_step(t, prefix)).collect()
}

/// Expands the preprocessing pipeline for a subject.
///
/// # Example
///
/// ```
/// use dwiprep::pipeline::expand::expand_pipeline;
///
/// let commands = expand_pipeline("003");
/// assert_eq!(commands.len(), 7);
/// assert_eq!(
///     commands[0].to_string(),
///     "mrconvert -fslgrad 003.bvec 003.bval 003-dwi.nii.gz 003-dwi.mif"
/// );
/// ```
pub fn expand_pipeline(prefix: &str) -> Vec<ExpandedCommand> {
    expand_with(&PIPELINE, prefix)
}

/// Every input file name the pipeline reads for a subject, in table order.
///
/// Includes files produced by earlier steps; callers that only care about
/// pre-existing inputs can filter on what is present on disk.
pub fn pipeline_inputs(prefix: &str) -> Vec<String> {
    PIPELINE
        .iter()
        .flat_map(|t| t.inputs.iter())
        .map(|token| substitute_prefix(token, prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &ExpandedCommand) -> Vec<&str> {
        cmd.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_expand_step_one() {
        let commands = expand_pipeline("003");
        assert_eq!(commands[0].program, "mrconvert");
        assert_eq!(
            args(&commands[0]),
            vec!["-fslgrad", "003.bvec", "003.bval", "003-dwi.nii.gz", "003-dwi.mif"]
        );
    }

    #[test]
    fn test_expand_compound_tokens() {
        let commands = expand_pipeline("003");
        assert_eq!(
            commands[2].to_string(),
            "dwipreproc AP 003-dwi-denoised.mif -rpe_pair AP003.nii.gz PA003.nii.gz 003-dwi-processed.mif"
        );
    }

    #[test]
    fn test_expand_step_seven_uses_mask_from_step_five() {
        let commands = expand_pipeline("003");
        let mask = &commands[4].args.last().unwrap().clone();
        assert_eq!(mask, "003-dwi-mask.mif");

        assert_eq!(
            args(&commands[6]),
            vec![
                "csd",
                "003-dwi-biascorrected.mif",
                "003-response.txt",
                "003-fod.mif",
                "-mask",
                "003-dwi-mask.mif"
            ]
        );
        assert!(commands[6].args.contains(mask));
    }

    #[test]
    fn test_expand_preserves_order() {
        let orders: Vec<usize> = expand_pipeline("1").iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_expand_is_deterministic() {
        assert_eq!(expand_pipeline("003"), expand_pipeline("003"));
    }

    #[test]
    fn test_expand_leaves_no_placeholders() {
        for cmd in expand_pipeline("123456") {
            assert!(!cmd.to_string().contains(PREFIX_PLACEHOLDER));
        }
    }

    #[test]
    fn test_expand_keeps_tokens_with_spaces_intact() {
        let templates = [StepTemplate {
            order: 1,
            purpose: "test",
            program: "cp",
            pre_args: &[],
            fixed_options: &[],
            inputs: &["my scan {prefix}.nii.gz"],
            output: "out dir/{prefix}.mif",
            trailing_options: &[],
        }];

        let commands = expand_with(&templates, "42");
        assert_eq!(
            commands[0].args,
            vec!["my scan 42.nii.gz".to_string(), "out dir/42.mif".to_string()]
        );
    }

    #[test]
    fn test_pipeline_inputs_include_phase_encode_pair() {
        let inputs = pipeline_inputs("003");
        assert!(inputs.contains(&"AP003.nii.gz".to_string()));
        assert!(inputs.contains(&"PA003.nii.gz".to_string()));
        assert!(inputs.contains(&"003.bvec".to_string()));
        assert_eq!(inputs[0], "003.bvec");
    }

    #[test]
    fn test_expand_with_empty_table() {
        assert!(expand_with(&[], "003").is_empty());
    }

    #[test]
    fn test_to_command_sets_program_and_args() {
        let cmd = expand_pipeline("003")[4].to_command(Path::new("/tmp"));
        assert_eq!(cmd.get_program(), "dwi2mask");

        let collected: Vec<&str> = cmd.get_args().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(collected, vec!["003-dwi-biascorrected.mif", "003-dwi-mask.mif"]);
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/tmp")));
    }
}
