use anyhow::{Context, Result};
use clap::Parser;
use leftover_chef::config::AppConfig;
use leftover_chef::server::{self, AppState};
use leftover_chef::transform::{fallback_response, transform};
use leftover_chef::Chef;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,leftover_chef=debug")),
        )
        .init();

    let config = AppConfig::parse();
    let ctx = config.exec_ctx().context("Failed to set up the model backend")?;
    let chef = Chef::new(config.chef_config()).context("Failed to build the pipeline")?;

    if let Some(leftovers) = config.once.as_deref() {
        return run_once(&chef, &ctx, leftovers).await;
    }

    let state = Arc::new(AppState { ctx, chef });
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);
    tracing::info!(model = %config.model, "Chef ready");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Run the pipeline for one input and print the merged response.
async fn run_once(chef: &Chef, ctx: &leftover_chef::ExecCtx, leftovers: &str) -> Result<()> {
    let response = match chef.run(ctx, leftovers).await {
        Ok(outputs) => {
            println!("--- RAW OUTPUT ---");
            for raw in [&outputs.diet, &outputs.shopping, &outputs.recipe] {
                println!("{}", raw.as_deref().unwrap_or(""));
            }
            transform(
                outputs.diet.as_deref(),
                outputs.shopping.as_deref(),
                outputs.recipe.as_deref(),
            )
            .context("Branch outputs could not be merged")?
        }
        Err(e) => {
            tracing::error!(stage = e.stage().unwrap_or("unknown"), error = %e, "pipeline failed");
            fallback_response()
        }
    };

    println!("--- RECIPE ---");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
