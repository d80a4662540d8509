//! Standalone runner for the stub message server.
//!
//! Useful for driving the client manually against a local endpoint:
//!
//! ```bash
//! cargo run --bin relaychat-stub -- --port 3021
//! ```

use clap::Parser;

use relaychat_stub::StubServer;

#[derive(Parser, Debug)]
#[command(version, about = "Scriptable stub message server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3021)]
    port: u16,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYCHAT_STUB_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let server = StubServer::bind(&format!("{}:{}", args.host, args.port)).await?;
    tracing::info!(addr = %server.addr(), "stub server running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}
