//! Racecourse Operator - converges Racecourse resources into running deployments

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use racecourse_operator::controller::{error_policy, reconcile, Context};
use racecourse_operator::crd::Racecourse;
use racecourse_operator::resources::{MANAGED_BY_LABEL, MANAGER_NAME};

/// Racecourse Operator - deploys and maintains racecourse instances
#[derive(Parser, Debug)]
#[command(name = "racecourse-operator", version, about, long_about = None)]
struct Cli {
    /// Print the Racecourse CRD as YAML and exit
    #[arg(long)]
    crd: bool,

    /// Log output format
    #[arg(long, env = "RACECOURSE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Run(RunArgs),
}

/// Controller arguments
#[derive(Parser, Debug)]
struct RunArgs {
    /// Only watch Racecourses in this namespace (all namespaces if unset)
    #[arg(long, env = "RACECOURSE_WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds between passes over a healthy Racecourse
    #[arg(long, env = "RACECOURSE_RESYNC_SECS", default_value_t = 300)]
    resync_secs: u64,

    /// Seconds before retrying a failed pass
    #[arg(long, env = "RACECOURSE_ERROR_REQUEUE_SECS", default_value_t = 5)]
    error_requeue_secs: u64,

    /// Skip installing the CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with((cli.log_format == LogFormat::Text).then(|| fmt::layer()))
        .with((cli.log_format == LogFormat::Json).then(|| fmt::layer().json()))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if cli.crd {
        let crd = serde_yaml::to_string(&Racecourse::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Run(args)) => run_controller(args).await,
        None => run_controller(RunArgs::parse_from(["run"])).await,
    }
}

/// Install or update the Racecourse CRD with server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(MANAGER_NAME).force();
    let crd = Racecourse::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;

    tracing::info!(crd = %name, "Installing Racecourse CRD...");
    crds.patch(&name, &params, &Patch::Apply(&crd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Racecourse CRD: {}", e))?;
    Ok(())
}

/// Api scoped to the watch namespace, or to all namespaces
fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received, cancelling in-flight reconciles");
    token.cancel();
}

/// Run the Racecourse controller until shutdown
async fn run_controller(args: RunArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crd_installed(&client).await?;
    }

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let ctx = Arc::new(
        Context::builder(client.clone())
            .resync_interval(Duration::from_secs(args.resync_secs))
            .error_requeue(Duration::from_secs(args.error_requeue_secs))
            .cancellation(token.clone())
            .build(),
    );

    let namespace = args.namespace.as_deref();
    let children = WatcherConfig::default().labels(&format!("{MANAGED_BY_LABEL}={MANAGER_NAME}"));

    tracing::info!(
        namespace = namespace.unwrap_or("<all>"),
        resync_secs = args.resync_secs,
        "Starting Racecourse controller"
    );

    Controller::new(scoped::<Racecourse>(&client, namespace), WatcherConfig::default())
        .owns(scoped::<ConfigMap>(&client, namespace), children.clone())
        .owns(scoped::<Service>(&client, namespace), children.clone())
        .owns(scoped::<Deployment>(&client, namespace), children.clone())
        .owns(scoped::<Ingress>(&client, namespace), children)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(racecourse = %obj.name, ?action, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;

    token.cancel();
    tracing::info!("Racecourse controller shutting down");
    Ok(())
}
