use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aligner",
    version,
    about = "Judge alignment: cached evaluation runs, versioned prompt optimization and version metrics"
)]
pub struct Cli {
    /// State file (JSON or YAML) holding judges, traces, runs and labeling sessions
    #[arg(
        long,
        global = true,
        env = "ALIGNER_STATE",
        default_value = "aligner-state.json"
    )]
    pub state: PathBuf,

    /// YAML config file; ALIGNER_* environment variables are used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the dataset fingerprint of a set of trace ids
    Fingerprint(FingerprintArgs),
    /// Evaluate the latest judge version over traces, reusing recorded runs
    Evaluate(EvaluateArgs),
    /// Score a single trace with the latest judge version
    Test(TestArgs),
    /// Optimize a judge against its labeled traces and create a new version
    Align(JudgeArgs),
    /// Compare the latest judge version with its predecessor
    Compare(JudgeArgs),
    /// Delete a judge and its cached evaluation runs
    Delete(JudgeArgs),
}

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    #[arg(required = true)]
    pub trace_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub judge: String,

    #[arg(required = true)]
    pub trace_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    #[arg(long)]
    pub judge: String,

    #[arg(long)]
    pub trace: String,
}

#[derive(Args, Debug)]
pub struct JudgeArgs {
    #[arg(long)]
    pub judge: String,
}
