use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "carbon-server",
    version,
    about = "Campus carbon emissions API"
)]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// Serve from a process-local store instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    pub memory_store: bool,
    #[arg(long, default_value_t = false)]
    pub print_openapi: bool,
}
