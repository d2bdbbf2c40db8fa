use crate::utils::config::DEFAULT_DOWNSAMPLE_STEP;
use std::path::PathBuf;

/// Arguments for the analyze command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Binary trace file written by the allocator shim
    pub trace_file: PathBuf,

    /// Output path for JSON report
    pub output_json: PathBuf,

    /// Print text summary to stdout
    pub print_summary: bool,

    /// Replay threads concurrently
    pub parallel: bool,

    /// Drop empty size classes above the largest observed one
    pub trim: bool,

    /// Keep every n-th time series sample in the report
    pub downsample_step: Option<usize>,

    /// Cap on diagnostics listed in the report
    pub max_diagnostics: Option<usize>,

    /// Size classes listed per thread in the summary
    pub top_classes: usize,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            trace_file: PathBuf::new(),
            output_json: PathBuf::from("report.json"),
            print_summary: false,
            parallel: false,
            trim: false,
            downsample_step: None,
            max_diagnostics: None,
            top_classes: 10,
        }
    }
}

impl AnalyzeArgs {
    /// Downsample with the default step used for plotting
    pub fn with_default_downsampling(mut self) -> Self {
        self.downsample_step = Some(DEFAULT_DOWNSAMPLE_STEP);
        self
    }

    /// Map `--downsample-step [N]` to a step
    ///
    /// Absent means no downsampling, a bare flag means the default step.
    pub fn resolve_downsample_step(flag: Option<Option<usize>>) -> Option<usize> {
        flag.map(|step| step.unwrap_or(DEFAULT_DOWNSAMPLE_STEP))
    }
}
