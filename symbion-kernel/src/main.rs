/**
 * SYMBION KERNEL - Point d'entrée du checker Symbion
 *
 * RÔLE : charger checker.yaml, monter le moteur de checks avec les plugins
 * intégrés, checker chaque hôte configuré et afficher les résultats.
 *
 * ARCHITECTURE : un run par hôte dans `spawn_blocking`, verrous d'appel et
 * value store partagés. Timeout par hôte via un jeton d'annulation.
 * CODE DE SORTIE : pire état des hôtes (0 OK, 1 WARN, 2 CRIT, 3 UNKNOWN).
 */

mod builtin;
mod config;
mod fetchers;
mod runner;

use crate::config::load_config;
use crate::runner::{exit_code, Checker};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use symbion_checkengine::{ActiveCheckResult, CancellationToken};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn join_host(
    name: &str,
    mut handle: JoinHandle<ActiveCheckResult>,
    token: &CancellationToken,
    timeout: Option<Duration>,
) -> anyhow::Result<ActiveCheckResult> {
    let Some(limit) = timeout else {
        return Ok(handle.await?);
    };
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => Ok(joined?),
        Err(_) => {
            // annulation coopérative : le run rend la main au prochain service
            warn!("[kernel] {name}: no result after {}s, cancelling", limit.as_secs());
            token.cancel();
            Ok(handle.await?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = load_config().await;
    let timeout = cfg.host_timeout_secs.map(Duration::from_secs);
    let checker = Arc::new(Checker::new(cfg)?);
    let hosts = checker.host_names();
    info!("[kernel] checking {} host(s)", hosts.len());

    let mut running = Vec::new();
    for name in hosts {
        let token = CancellationToken::new();
        let handle = tokio::task::spawn_blocking({
            let checker = checker.clone();
            let name = name.clone();
            let token = token.clone();
            move || checker.check_host(&name, &token)
        });
        running.push((name, handle, token));
    }

    let mut results = BTreeMap::new();
    for (name, handle, token) in running {
        match join_host(&name, handle, &token, timeout).await {
            Ok(result) => {
                println!("{name}: {}", result.as_text());
                results.insert(name, result);
            }
            Err(e) => error!("[kernel] {name}: check task failed: {e}"),
        }
    }

    let crashes = checker.finish();
    if crashes > 0 {
        warn!("[kernel] {crashes} plugin crash(es) reported");
    }
    std::process::exit(exit_code(&results));
}
