use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};

use macsym::{Config, Symbolizer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let matches = Command::new("symbolize")
        .about("Symbolicate a macOS crash report")
        .arg(
            Arg::new("report")
                .required(true)
                .value_name("report_path")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a .crash, .diag, .spin or .ips report"),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("app-version")
                .required(true)
                .help("Application version, e.g. 44.10.0.30800"),
        )
        .arg(
            Arg::new("arch")
                .short('a')
                .long("arch")
                .default_value("x86_64")
                .help("Architecture the report was captured on: x86_64 or arm64"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a JSON configuration file; defaults are used if missing"),
        )
        .arg(
            Arg::new("backup")
                .long("backup")
                .action(ArgAction::SetTrue)
                .help("Fetch symbols from the backup source"),
        )
        .get_matches();

    let config: Config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open config {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => Config::default(),
    };

    let symbolizer = Symbolizer::new(config)?;

    let report_path = matches.get_one::<PathBuf>("report").unwrap();
    let report = symbolizer
        .run(
            &report_path.to_string_lossy(),
            matches.get_one::<String>("version").unwrap(),
            matches.get_one::<String>("arch").unwrap(),
            matches.get_flag("backup"),
        )
        .await;

    println!("{}", report.title);
    for line in &report.info {
        println!("{line}");
    }
    for block in &report.blocks {
        println!();
        for line in block {
            println!("{line}");
        }
    }

    Ok(())
}
