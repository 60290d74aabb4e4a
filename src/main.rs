use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use yaml_key::edit::{EditOptions, State, YamlEdit};

#[derive(Parser)]
#[command(
  name = "yaml-key",
  about = "Manage individual keys in a YAML file without rewriting the whole file",
  version,
  author
)]
struct Cli {
  /// Path to the YAML file
  dest: PathBuf,

  /// Dotted key to manage, e.g. `some.nested.setting`
  #[arg(short, long)]
  key: String,

  /// Desired value, parsed as YAML; required unless the state is absent
  #[arg(long)]
  value: Option<String>,

  /// Desired state of the key
  #[arg(long, value_enum, default_value_t = StateArg::Present)]
  state: StateArg,

  /// Back up the file before changing it
  #[arg(short, long)]
  backup: bool,

  /// Fail instead of creating the file when it does not exist
  #[arg(long)]
  no_create: bool,

  /// Report what would change without writing anything
  #[arg(long)]
  check: bool,

  /// Print a unified diff of the change
  #[arg(short, long)]
  diff: bool,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
  Present,
  Absent,
}

impl From<StateArg> for State {
  fn from(state: StateArg) -> Self {
    match state {
      StateArg::Present => State::Present,
      StateArg::Absent => State::Absent,
    }
  }
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  let value = cli
    .value
    .as_deref()
    .map(serde_yaml::from_str::<serde_yaml::Value>)
    .transpose()?;

  let options = EditOptions {
    dest: cli.dest,
    key: cli.key,
    value,
    state: cli.state.into(),
    backup: cli.backup,
    create: !cli.no_create,
    check: cli.check,
    diff: cli.diff,
  };

  let outcome = YamlEdit::apply_with_options(options)?;

  if let Some(diff) = &outcome.diff {
    print!("{}", diff.to_unified());
  }
  if let Some(backup) = &outcome.backup_file {
    println!("backup: {}", backup.display());
  }
  println!("{}", outcome.message);

  Ok(())
}
