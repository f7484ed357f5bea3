mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = cli::App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    cli::run(app).await
}
