use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "tokenvault", about = "Session token service")]
pub struct Cli {
    /// Path to the settings file, without or with the `.toml` extension.
    #[arg(long)]
    pub settings: Option<String>,
    /// Load and validate settings, then exit.
    #[arg(long)]
    pub check: bool,
}
