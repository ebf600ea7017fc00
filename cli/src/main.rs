mod logger;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use bw_patch_engine::ScooterModel;
use clap::{Parser, ValueEnum};

/// One of the closed registry's scooter models, validated by `clap` at
/// parse time so an unknown model never reaches the engine.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Mi4,
    Mi4lite,
    Mi4pro2nd,
    Mi5,
    Mi5elite,
    Mi5max,
    Mi5pro,
    S60,
    Ultra4,
}

impl From<ModelArg> for ScooterModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Mi4 => ScooterModel::Mi4,
            ModelArg::Mi4lite => ScooterModel::Mi4lite,
            ModelArg::Mi4pro2nd => ScooterModel::Mi4pro2nd,
            ModelArg::Mi5 => ScooterModel::Mi5,
            ModelArg::Mi5elite => ScooterModel::Mi5elite,
            ModelArg::Mi5max => ScooterModel::Mi5max,
            ModelArg::Mi5pro => ScooterModel::Mi5pro,
            ModelArg::S60 => ScooterModel::S60,
            ModelArg::Ultra4 => ScooterModel::Ultra4,
        }
    }
}

/// Apply a comma-separated list of patches to a scooter firmware image.
#[derive(Parser)]
#[command(name = "bw-patch")]
struct Args {
    model: ModelArg,
    infile: PathBuf,
    outfile: PathBuf,
    patches: String,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::CliLogger::init(logger::level_for_verbosity(args.verbose)).expect("failed to install logger");

    let input = match fs::read(&args.infile) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("failed to read {}: {e}", args.infile.display());
            return ExitCode::from(1);
        }
    };

    let output = match bw_patch_engine::patch_firmware(args.model.into(), input, &args.patches, false) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("patch session aborted: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = fs::write(&args.outfile, output) {
        log::error!("failed to write {}: {e}", args.outfile.display());
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}
