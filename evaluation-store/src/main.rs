use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use serde::Serialize;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use evaluation_store::config::Config;
use evaluation_store::{
    EvaluationContext, EvaluationDistribution, EvaluationRule, EvaluationStore, PgEvaluationStore,
};

#[derive(Serialize)]
struct RuleGraph {
    #[serde(flatten)]
    rule: EvaluationRule,
    distributions: Vec<EvaluationDistribution>,
}

fn init_tracing(debug: bool) {
    let base_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    let log_layer = if debug {
        base_layer
            .with_ansi(true)
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    } else {
        base_layer
            .json()
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    };

    tracing_subscriber::registry().with(log_layer).init();
}

async fn dump_flag(config: &Config, flag_key: &str) -> anyhow::Result<Vec<RuleGraph>> {
    let pool = common_database::get_pool_with_timeouts(
        &config.database_url,
        config.max_pg_connections,
        config.database_timeouts(),
    )
    .await
    .context("could not connect to postgres")?;

    let store = PgEvaluationStore::from_config(Arc::new(pool), config);
    let ctx = EvaluationContext::new();

    let rules = store.get_evaluation_rules(&ctx, flag_key).await?;

    let mut graph = Vec::with_capacity(rules.len());
    for rule in rules {
        let distributions = store.get_evaluation_distributions(&ctx, &rule.id).await?;
        graph.push(RuleGraph {
            rule,
            distributions,
        });
    }

    Ok(graph)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(*config.debug);

    let Some(flag_key) = std::env::args().nth(1) else {
        eprintln!("usage: evaluation-store <flag-key>");
        return ExitCode::from(2);
    };

    match dump_flag(&config, &flag_key).await {
        Ok(graph) => match serde_json::to_string_pretty(&graph) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize evaluation graph");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, flag_key = %flag_key, "failed to load evaluation graph");
            ExitCode::FAILURE
        }
    }
}
