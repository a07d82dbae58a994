use app_operator::{App, Operator, OperatorConfig};
use clap::Parser;
use kube::CustomResourceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "app-operator", about = "Keeps each App's Service converged")]
struct Cli {
    /// Print the App CRD as YAML and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,app_operator=debug,kube=info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&App::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = OperatorConfig::from_env()?;
    tracing::info!(default_image = %config.default_image, "loaded configuration");

    Operator::new(config).run().await?;
    Ok(())
}
