//! Racecourse controller implementation
//!
//! One pass of [`reconcile`] is a fixed pipeline:
//!
//! 1. re-read the Racecourse (gone → done)
//! 2. validate the spec
//! 3. converge the ConfigMap, Service and Deployment, then the Ingress if enabled
//! 4. aggregate and write the status
//!
//! The first failing step aborts the pass; later steps and the status write are
//! skipped and the error is handed to [`error_policy`] for a requeue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::client::{KubeClient, KubeClientImpl};
use super::converge::converge;
use super::status::aggregate;
use crate::crd::Racecourse;
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::resources::{
    build_config_map, build_deployment, build_ingress, build_service, MANAGER_NAME,
};
use crate::Error;

/// Default interval between passes over a healthy Racecourse
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default delay before retrying a failed pass
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Controller context shared by every reconcile pass
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .resync_interval(Duration::from_secs(60))
///     .cancellation(token)
///     .build();
/// ```
pub struct Context {
    /// Object store access (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Cancelled on shutdown; in-flight store calls return [`Error::Cancelled`]
    pub cancel: CancellationToken,
    /// Requeue delay after a successful pass
    pub resync_interval: Duration,
    /// Requeue delay after a failed pass
    pub error_requeue: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Run a store call unless the pass has been cancelled
    pub async fn cancellable<T>(
        &self,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }

    /// Create a context for testing with the given store and publisher
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            kube,
            events,
            cancel: CancellationToken::new(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    cancel: CancellationToken,
    field_manager: String,
    resync_interval: Duration,
    error_requeue: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            events: None,
            cancel: CancellationToken::new(),
            field_manager: MANAGER_NAME.to_string(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }

    /// Field manager recorded on every write
    pub fn field_manager(mut self, name: impl Into<String>) -> Self {
        self.field_manager = name.into();
        self
    }

    /// Requeue delay after a successful pass
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Requeue delay after a failed pass
    pub fn error_requeue(mut self, delay: Duration) -> Self {
        self.error_requeue = delay;
        self
    }

    /// Token that aborts in-flight passes when cancelled
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Override the store client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self.kube.unwrap_or_else(|| {
                Arc::new(KubeClientImpl::new(self.client.clone(), &self.field_manager))
            }),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), &self.field_manager))
            }),
            cancel: self.cancel,
            resync_interval: self.resync_interval,
            error_requeue: self.error_requeue,
        }
    }
}

/// Reconcile a Racecourse
///
/// Returns the requeue action on success. Any failure is returned unchanged
/// after a Warning event is published on the Racecourse.
#[instrument(
    skip(racecourse, ctx),
    fields(racecourse = %racecourse.name_any(), namespace = %racecourse.namespace().unwrap_or_default())
)]
pub async fn reconcile(racecourse: Arc<Racecourse>, ctx: Arc<Context>) -> Result<Action, Error> {
    match reconcile_pass(&racecourse, &ctx).await {
        Ok(action) => Ok(action),
        Err(e) if e.is_cancelled() => {
            debug!("reconcile cancelled");
            Err(e)
        }
        Err(e) => {
            let reason = if matches!(e, Error::Validation(_)) {
                reasons::VALIDATION_FAILED
            } else {
                reasons::RECONCILE_FAILED
            };
            ctx.events
                .publish(
                    &racecourse.object_ref(&()),
                    EventType::Warning,
                    reason,
                    actions::RECONCILE,
                    Some(e.to_string()),
                )
                .await;
            Err(e)
        }
    }
}

async fn reconcile_pass(racecourse: &Racecourse, ctx: &Context) -> Result<Action, Error> {
    let name = racecourse.name_any();
    let namespace = racecourse
        .namespace()
        .ok_or_else(|| Error::missing("Racecourse", "metadata.namespace"))?;

    let Some(latest) = ctx
        .cancellable(ctx.kube.get_racecourse(&namespace, &name))
        .await?
    else {
        info!("racecourse no longer exists");
        return Ok(Action::await_change());
    };

    if let Err(e) = latest.spec.validate() {
        warn!(error = %e, "racecourse validation failed");
        return Err(e);
    }

    converge(ctx, &latest, build_config_map(&latest)).await?;
    converge(ctx, &latest, build_service(&latest)).await?;
    let deployment = converge(ctx, &latest, build_deployment(&latest)).await?;

    if latest.spec.ingress.is_enabled() {
        converge(ctx, &latest, build_ingress(&latest)).await?;
    } else {
        debug!("ingress disabled");
    }

    let status = aggregate(&latest, Some(&deployment.object), latest.status.as_ref());
    ctx.cancellable(ctx.kube.patch_status(&namespace, &name, &status))
        .await?;

    info!(
        phase = %status.phase,
        available = status.available_replicas,
        "racecourse reconciled"
    );
    Ok(Action::requeue(ctx.resync_interval))
}

/// Error policy for the Racecourse controller
///
/// Logs the error and requeues after the configured backoff.
pub fn error_policy(racecourse: Arc<Racecourse>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        warn!(
            racecourse = %racecourse.name_any(),
            "racecourse children changed concurrently, retrying"
        );
    } else {
        error!(
            ?error,
            racecourse = %racecourse.name_any(),
            "reconciliation failed"
        );
    }
    Action::requeue(ctx.error_requeue)
}
