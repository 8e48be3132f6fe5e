use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use crate::lib::{
    config::types::{Cli, Command, DagArgs, ServeArgs},
    dag::dag::example_kubernetes_operator,
    transformer::{api::ModelServer, transformer::Transformer, types::Model},
};

mod lib {
    pub mod config;
    pub mod dag;
    pub mod transformer;
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    cli.logging.init();

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Dag(args) => print_dag(args),
    };

    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "fatal error");
        std::process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let address = args.http_address.clone();
    let port = args.http_port;

    let config = args
        .into_config(&|key: &str| std::env::var(key).ok())
        .context("invalid configuration")?;
    info!(
        predictor_host = %config.predictor_host,
        protocol = %config.protocol,
        model = %config.model_name,
        "starting transformer"
    );

    let model = Transformer::initialize(config)
        .await
        .context("failed to initialize transformer")?;
    info!(
        namespace = model.namespace(),
        retrieval = model.retrieval_url(),
        predictor = model.predictor_url(),
        token_exchanges = model.token_exchanges(),
        "transformer ready"
    );

    let server = ModelServer::new(Arc::new(model), &address, port);
    server
        .start_server(async {
            if signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        })
        .await?;

    info!("transformer stopped");
    Ok(())
}

fn print_dag(args: DagArgs) -> anyhow::Result<()> {
    let dag = example_kubernetes_operator(chrono::Utc::now())?;

    let rendered = if args.compact {
        serde_json::to_string(&dag)?
    } else {
        dag.to_json()?
    };
    println!("{rendered}");
    Ok(())
}
