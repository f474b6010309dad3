use anyhow::Context;
use tcp_chat::chat;
use tcp_chat::cmd::{Invocation, USAGE, parse_invocation};
use tcp_chat::tracer::{setup_json_tracing, setup_simple_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, json_logs) = match parse_invocation(std::env::args_os()) {
        Invocation::Serve { config, json_logs } => (config, json_logs),
        Invocation::Info(e) => e.exit(),
        Invocation::Usage => {
            println!("{USAGE}");
            return Ok(());
        }
    };

    if json_logs {
        let _ = setup_json_tracing();
    } else {
        let _ = setup_simple_tracing();
    }

    let logo = chat::load_logo(&config.logo_path)
        .await
        .with_context(|| format!("failed to load logo from {}", config.logo_path.display()))?;

    chat::run(config, logo)
        .await
        .context("chat server stopped")?;

    Ok(())
}
