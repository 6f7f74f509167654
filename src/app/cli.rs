use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// One line per column, the catalog's own diagnostic dump.
    #[default]
    Text,
    Markdown,
}

#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite database file. If not provided, looks for DB_FILE, then the server options.
    #[arg(long, conflicts_with_all = ["host", "dbname"])]
    pub sqlite: Option<PathBuf>,

    /// Database server host. Falls back to DB_HOST.
    #[arg(long)]
    pub host: Option<String>,

    /// Database server port. Falls back to DB_PORT, then 5432.
    #[arg(long)]
    pub port: Option<u16>,

    /// Database name on the server. Falls back to DB_NAME.
    #[arg(long)]
    pub dbname: Option<String>,

    /// Login user. Falls back to DB_USER. The password is read from DB_PASSWORD.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Schema to read on the server. Falls back to DB_SCHEMA, then "public".
    #[arg(long)]
    pub schema: Option<String>,

    /// Per-statement deadline in seconds. Falls back to DB_TIMEOUT_SECS.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Tables to leave out of the report.
    #[arg(short, long, value_delimiter = ',')]
    pub ignore: Option<Vec<String>>,

    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Log extraction steps.
    #[arg(short, long)]
    pub verbose: bool,
}
