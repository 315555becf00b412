//! Pipeline Template Table
//!
//! The fixed, ordered catalog of DWI preprocessing steps. Each entry is a
//! command template whose tokens may contain the `{prefix}` placeholder.
//!
//! # Invocations for subject `003`
//!
//! ```text
//! 1  mrconvert -fslgrad 003.bvec 003.bval 003-dwi.nii.gz 003-dwi.mif
//! 2  dwidenoise 003-dwi.mif 003-dwi-denoised.mif -noise 003-noise.mif
//! 3  dwipreproc AP 003-dwi-denoised.mif -rpe_pair AP003.nii.gz PA003.nii.gz 003-dwi-processed.mif
//! 4  dwibiascorrect 003-dwi-processed.mif 003-dwi-biascorrected.mif -fsl
//! 5  dwi2mask 003-dwi-biascorrected.mif 003-dwi-mask.mif
//! 6  dwi2response tournier 003-dwi-biascorrected.mif 003-response.txt
//! 7  dwi2fod csd 003-dwi-biascorrected.mif 003-response.txt 003-fod.mif -mask 003-dwi-mask.mif
//! ```

/// Placeholder substituted with the subject prefix.
pub const PREFIX_PLACEHOLDER: &str = "{prefix}";

/// A single fixed step of the preprocessing pipeline.
///
/// Tokens are emitted in field order: `program`, `pre_args`,
/// `fixed_options`, `inputs`, `output`, `trailing_options`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTemplate {
    /// 1-based position in the pipeline
    pub order: usize,

    /// Short human-readable description
    pub purpose: &'static str,

    /// External executable name
    pub program: &'static str,

    /// Positional arguments placed before the options
    pub pre_args: &'static [&'static str],

    /// Option tokens placed before the inputs
    pub fixed_options: &'static [&'static str],

    /// Input file patterns
    pub inputs: &'static [&'static str],

    /// Primary output file pattern
    pub output: &'static str,

    /// Option tokens placed after the output
    pub trailing_options: &'static [&'static str],
}

impl StepTemplate {
    /// Iterates all template tokens after the program name, in emission order.
    pub fn arg_templates(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pre_args
            .iter()
            .copied()
            .chain(self.fixed_options.iter().copied())
            .chain(self.inputs.iter().copied())
            .chain(std::iter::once(self.output))
            .chain(self.trailing_options.iter().copied())
    }

    /// Renders the template with placeholders left in place.
    pub fn render_template(&self) -> String {
        std::iter::once(self.program)
            .chain(self.arg_templates())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Number of steps in the preprocessing pipeline.
pub const STEP_COUNT: usize = 7;

/// The preprocessing pipeline, in execution order.
pub static PIPELINE: [StepTemplate; STEP_COUNT] = [
    StepTemplate {
        order: 1,
        purpose: "format conversion with gradient tables",
        program: "mrconvert",
        pre_args: &[],
        fixed_options: &["-fslgrad"],
        inputs: &["{prefix}.bvec", "{prefix}.bval", "{prefix}-dwi.nii.gz"],
        output: "{prefix}-dwi.mif",
        trailing_options: &[],
    },
    StepTemplate {
        order: 2,
        purpose: "denoising with noise map",
        program: "dwidenoise",
        pre_args: &[],
        fixed_options: &[],
        inputs: &["{prefix}-dwi.mif"],
        output: "{prefix}-dwi-denoised.mif",
        trailing_options: &["-noise", "{prefix}-noise.mif"],
    },
    StepTemplate {
        order: 3,
        purpose: "EPI distortion and motion correction",
        program: "dwipreproc",
        pre_args: &["AP", "{prefix}-dwi-denoised.mif"],
        fixed_options: &["-rpe_pair"],
        inputs: &["AP{prefix}.nii.gz", "PA{prefix}.nii.gz"],
        output: "{prefix}-dwi-processed.mif",
        trailing_options: &[],
    },
    StepTemplate {
        order: 4,
        purpose: "bias-field correction",
        program: "dwibiascorrect",
        pre_args: &[],
        fixed_options: &[],
        inputs: &["{prefix}-dwi-processed.mif"],
        output: "{prefix}-dwi-biascorrected.mif",
        trailing_options: &["-fsl"],
    },
    StepTemplate {
        order: 5,
        purpose: "brain mask estimation",
        program: "dwi2mask",
        pre_args: &[],
        fixed_options: &[],
        inputs: &["{prefix}-dwi-biascorrected.mif"],
        output: "{prefix}-dwi-mask.mif",
        trailing_options: &[],
    },
    StepTemplate {
        order: 6,
        purpose: "fiber response estimation",
        program: "dwi2response",
        pre_args: &["tournier"],
        fixed_options: &[],
        inputs: &["{prefix}-dwi-biascorrected.mif"],
        output: "{prefix}-response.txt",
        trailing_options: &[],
    },
    StepTemplate {
        order: 7,
        purpose: "fiber orientation distribution estimation",
        program: "dwi2fod",
        pre_args: &["csd"],
        fixed_options: &[],
        inputs: &["{prefix}-dwi-biascorrected.mif", "{prefix}-response.txt"],
        output: "{prefix}-fod.mif",
        trailing_options: &["-mask", "{prefix}-dwi-mask.mif"],
    },
];

/// Returns the pipeline table.
pub fn pipeline() -> &'static [StepTemplate] {
    &PIPELINE
}
