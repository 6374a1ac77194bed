use std::env;
use std::process::ExitCode;

use school_econ_merge::pipeline::PipelineConfig;
use school_econ_merge::PipelineResult;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path = match config_path(&args) {
        Ok(path) => path,
        Err(usage) => {
            eprintln!("{usage}");
            return ExitCode::FAILURE;
        }
    };

    match run(config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// The single positional argument, or the usage line. `args` may be empty when the OS passes no
// program name.
fn config_path(args: &[String]) -> Result<&str, String> {
    match args {
        [_, path] => Ok(path.as_str()),
        _ => {
            let program = args.first().map_or("school-econ-merge", String::as_str);
            Err(format!("Usage: {program} <pipeline.json>"))
        }
    }
}

fn run(config_path: &str) -> PipelineResult<()> {
    let pipeline = PipelineConfig::from_path(config_path)?.into_pipeline()?;
    let report = pipeline.run()?;

    for (name, rows) in &report.source_rows {
        tracing::info!(source = %name, rows, "source prepared");
    }
    tracing::info!(
        rows = report.output_rows,
        path = %report.output_path.display(),
        "merged table written"
    );
    for (name, value) in &report.summaries {
        println!("{name}: {value}");
    }
    Ok(())
}
