use crate::ratelimit::RateLimiter;
use crate::registry::{Registry, SourceSelection};
use crate::session::Session;
use crate::sources::{Source, SourceResult};
use crate::stats::Statistics;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

// region:        --- Constants

const RESULTS_CHANNEL_CAPACITY: usize = 1024;

// how long a cancelled source may keep flushing what it already produced
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(2);

// endregion:     --- Constants

/// Settings of one enumeration call.
#[derive(Debug, Clone)]
pub struct EnumerationOptions {
    pub proxy: Option<String>,
    /// Timeout of every single HTTP request.
    pub timeout: Duration,
    /// Overall deadline of the enumeration.
    pub max_enumeration_time: Duration,
    /// Global rate plus per-source overrides, shared by every call.
    pub rate_limiter: Arc<RateLimiter>,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(30),
            max_enumeration_time: Duration::from_secs(10 * 60),
            rate_limiter: Arc::new(RateLimiter::unlimited()),
        }
    }
}

pub struct Agent {
    sources: Vec<Arc<dyn Source>>,
}

// region:        --- Constructors

impl Agent {
    pub fn new(registry: &Registry, selection: &SourceSelection) -> Self {
        Self::with_sources(registry.select(selection))
    }

    pub fn with_sources(sources: Vec<Arc<dyn Source>>) -> Self {
        debug!(
            "Active sources: {:?}",
            sources.iter().map(|source| source.name()).collect::<Vec<_>>()
        );
        Self { sources }
    }
}

// endregion:     --- Constructors

impl Agent {
    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Runs every active source against `domain` and merges their results.
    ///
    /// The stream ends once every source is done, or once `cancel` or the
    /// enumeration deadline fired and the sources wound down. Reaching the
    /// deadline is not an error: whatever was found so far is delivered.
    /// Must be called from within a tokio runtime.
    #[instrument(name = "enumerate", level = "info", skip_all, fields(domain = %domain))]
    pub fn enumerate(
        &self,
        domain: &str,
        options: &EnumerationOptions,
        cancel: &CancellationToken,
    ) -> Result<ReceiverStream<SourceResult>> {
        let session = Arc::new(Session::new(
            options.proxy.as_deref(),
            options.timeout,
            Arc::clone(&options.rate_limiter),
        )?);
        let (results_tx, results_rx) = mpsc::channel(RESULTS_CHANNEL_CAPACITY);

        let deadline = cancel.child_token();
        let max_enumeration_time = options.max_enumeration_time;
        let sources = self.sources.clone();
        let domain = domain.to_string();

        tokio::spawn(
            async move {
                let mut forwarders = JoinSet::new();
                for source in sources {
                    forwarders.spawn(forward(
                        source,
                        deadline.clone(),
                        domain.clone(),
                        Arc::clone(&session),
                        results_tx.clone(),
                    ));
                }
                // the merged stream closes with the last forwarder's sender
                drop(results_tx);

                let expired = sleep(max_enumeration_time);
                tokio::pin!(expired);

                loop {
                    tokio::select! {
                        joined = forwarders.join_next() => match joined {
                            Some(Ok(())) => {}
                            Some(Err(err)) => error!("Source task failed: {}", err),
                            None => break,
                        },
                        _ = &mut expired, if !deadline.is_cancelled() => {
                            info!(
                                "Maximum enumeration time of {:?} reached, keeping partial results",
                                max_enumeration_time
                            );
                            deadline.cancel();
                        }
                    }
                }
                info!("All sources finished");
            }
            .in_current_span(),
        );

        Ok(ReceiverStream::new(results_rx))
    }

    /// Snapshot of every active source. Only final once the stream returned
    /// by [`Agent::enumerate`] is drained.
    pub fn statistics(&self) -> BTreeMap<String, Statistics> {
        self.sources
            .iter()
            .map(|source| (source.name().to_string(), source.statistics()))
            .collect()
    }
}

/// Pipes one source's stream into the merged one, preserving its order.
async fn forward(
    source: Arc<dyn Source>,
    cancel: CancellationToken,
    domain: String,
    session: Arc<Session>,
    results_tx: mpsc::Sender<SourceResult>,
) {
    let name = source.name();
    debug!(source = name, "Starting");
    let mut results = Arc::clone(&source).run(cancel.clone(), domain, session);

    let drained = loop {
        tokio::select! {
            biased;
            result = results.recv() => match result {
                Some(result) => {
                    if results_tx.send(result).await.is_err() {
                        debug!(source = name, "Consumer gone, stopping");
                        return;
                    }
                }
                None => break true,
            },
            _ = cancel.cancelled() => break false,
        }
    };

    if !drained {
        let flushed = timeout(CANCEL_GRACE_PERIOD, async {
            while let Some(result) = results.recv().await {
                if results_tx.send(result).await.is_err() {
                    break;
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!(source = name, "Did not stop within {:?}", CANCEL_GRACE_PERIOD);
            return;
        }
    }

    debug!(source = name, "Finished");
}
