use clap::Parser;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5230 or config.listen_port)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "growpromise-server",
    version,
    about = "GrowPromise server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file (overrides CONFIG_PATH)
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,
}
