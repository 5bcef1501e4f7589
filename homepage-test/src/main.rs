use anyhow::Context;
use clap::Parser;
use homepage_test::{homepage, DEFAULT_TARGET};
use stampede::core::{Options, THRESHOLDS_FAILED_EXIT_CODE};
use stampede::TestRun;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Load test the k6.io demo site homepage.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// URL each iteration loads
    #[arg(short, long, env = "TARGET_URL", default_value = DEFAULT_TARGET)]
    target: String,

    /// k6-style JSON options replacing the built-in scenarios and thresholds
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the end-of-test summary as JSON
    #[arg(long)]
    summary_export: Option<PathBuf>,

    /// Skip threshold evaluation
    #[arg(long)]
    no_thresholds: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stampede=info,homepage_test=info")),
        )
        .init();

    let args = Args::parse();
    homepage_test::set_target(&args.target);

    let options = match &args.config {
        Some(path) => Options::from_json_file(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => homepage_test::options()?,
    };

    let summary = TestRun::new(options)
        .no_thresholds(args.no_thresholds)
        .run(homepage())
        .await?;

    println!("{summary}");

    if let Some(path) = &args.summary_export {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }

    if summary.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(THRESHOLDS_FAILED_EXIT_CODE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["homepage-test"]).unwrap();
        assert_eq!(args.target, std::env::var("TARGET_URL").unwrap_or(DEFAULT_TARGET.into()));
        assert!(args.config.is_none());
        assert!(!args.no_thresholds);
    }

    #[test]
    fn flags() {
        let args = Args::try_parse_from([
            "homepage-test",
            "-t",
            "http://localhost:3002/",
            "--config",
            "options.json",
            "--summary-export",
            "summary.json",
            "--no-thresholds",
        ])
        .unwrap();
        assert_eq!(args.target, "http://localhost:3002/");
        assert_eq!(args.config, Some(PathBuf::from("options.json")));
        assert_eq!(args.summary_export, Some(PathBuf::from("summary.json")));
        assert!(args.no_thresholds);
    }
}
