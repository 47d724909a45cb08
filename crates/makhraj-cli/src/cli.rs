use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "makhraj-cache")]
#[command(about = "Inspect and manage the makhraj tiered cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (defaults to ./makhraj.toml when present)
    #[arg(short, long, global = true, env = "MAKHRAJ_CONFIG")]
    pub config: Option<String>,

    /// Run as a client host: skip Redis and use the local store instead
    #[arg(long, global = true)]
    pub client: bool,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read a value by key
    Get(KeyArgs),
    /// Store a value
    Set(SetArgs),
    /// Remove a key from every tier
    Delete(KeyArgs),
    /// Remove all keys, or only those starting with a prefix
    Clear(ClearArgs),
    /// Show hit/miss counters and tier state
    Stats,
    /// Check that the secondary tier answers
    Ping,
}

#[derive(clap::Args)]
pub struct KeyArgs {
    /// Cache key (without namespace)
    pub key: String,
}

#[derive(clap::Args)]
pub struct SetArgs {
    /// Cache key (without namespace)
    pub key: String,
    /// JSON value; plain text is stored as a string. Reads --file or stdin if omitted
    pub value: Option<String>,
    /// Path to a JSON file holding the value
    #[arg(long, conflicts_with = "value")]
    pub file: Option<String>,
    /// Time to live in seconds (configured default when omitted)
    #[arg(long)]
    pub ttl: Option<u64>,
}

#[derive(clap::Args)]
pub struct ClearArgs {
    /// Only clear keys starting with this prefix
    pub prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_with_ttl() {
        let cli = Cli::try_parse_from(["makhraj-cache", "set", "teacher_tasks", "[1,2]", "--ttl", "60"])
            .unwrap();
        match cli.command {
            Commands::Set(args) => {
                assert_eq!(args.key, "teacher_tasks");
                assert_eq!(args.value.as_deref(), Some("[1,2]"));
                assert_eq!(args.ttl, Some(60));
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["makhraj-cache", "stats", "--client", "--format", "table"])
            .unwrap();
        assert!(cli.client);
        assert_eq!(cli.format, Some(OutputFormat::Table));
    }

    #[test]
    fn test_value_and_file_conflict() {
        let result =
            Cli::try_parse_from(["makhraj-cache", "set", "k", "1", "--file", "value.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_clear_without_prefix() {
        let cli = Cli::try_parse_from(["makhraj-cache", "clear"]).unwrap();
        match cli.command {
            Commands::Clear(args) => assert!(args.prefix.is_none()),
            _ => panic!("expected clear"),
        }
    }
}
