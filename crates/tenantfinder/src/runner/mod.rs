mod options;
mod validate;

pub use options::{
    default_rate_limits, Options, DEFAULT_MAX_ENUMERATION_MINS, DEFAULT_TIMEOUT_SECS,
};

use crate::agent::{Agent, EnumerationOptions};
use crate::aggregate::{normalize, Aggregator};
use crate::output::OutputWriter;
use crate::ratelimit::{Rate, RateLimiter};
use crate::registry::Registry;
use crate::stats::{self, log_statistics, Statistics};
use crate::Result;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Outcome of one domain's enumeration.
#[derive(Debug)]
pub struct EnumerationReport {
    pub aggregator: Aggregator,
    /// Per-source counters with duplicates already subtracted.
    pub statistics: BTreeMap<String, Statistics>,
}

/// Drives enumerations for the command line: one agent, one rate limiter
/// shared by every domain, and the configured output destinations.
pub struct Runner {
    options: Options,
    agent: Agent,
    rate_limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

// region:        --- Constructors

impl Runner {
    pub fn new(options: Options) -> Result<Self> {
        Self::with_registry(&Registry::builtin()?, options)
    }

    pub fn with_registry(registry: &Registry, options: Options) -> Result<Self> {
        options.validate(registry)?;

        let agent = Agent::new(registry, &options.selection());
        let rate_limiter = Arc::new(RateLimiter::new(
            Rate::per_second(options.rate_limit),
            options.rate_limits.clone(),
        ));

        Ok(Self {
            options,
            agent,
            rate_limiter,
            cancel: CancellationToken::new(),
        })
    }
}

// endregion:     --- Constructors

impl Runner {
    /// Cancelling this token winds down the running enumeration and skips the
    /// remaining domains.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn enumeration_options(&self) -> EnumerationOptions {
        EnumerationOptions {
            proxy: self.options.proxy.clone(),
            timeout: self.options.timeout(),
            max_enumeration_time: self.options.max_enumeration_time(),
            rate_limiter: Arc::clone(&self.rate_limiter),
        }
    }

    /// Enumerates the configured domains, or stdin lines when none were given.
    pub async fn run_enumeration(&self) -> Result<()> {
        let mut writers: Vec<Box<dyn Write>> = vec![Box::new(io::stdout())];

        if !self.options.domains.is_empty() {
            let domains = self.options.domains.join("\n");
            let reader = BufReader::new(domains.as_bytes());
            return self.enumerate_multiple_domains(reader, &mut writers).await;
        }

        if self.options.stdin {
            let reader = BufReader::new(tokio::io::stdin());
            return self.enumerate_multiple_domains(reader, &mut writers).await;
        }

        Ok(())
    }

    /// One domain per line. Stops at the first error.
    pub async fn enumerate_multiple_domains<R>(
        &self,
        reader: R,
        writers: &mut Vec<Box<dyn Write>>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let output = OutputWriter::new(self.options.json);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let domain = normalize(&line);
            if domain.is_empty() {
                continue;
            }
            if self.cancel.is_cancelled() {
                warn!("Cancelled, skipping remaining domains");
                break;
            }

            // a single output file collects every domain, an output
            // directory gets one file per domain
            let file = if let Some(path) = &self.options.output_file {
                Some(output.create_file(path, true).map_err(|err| {
                    error!("Could not create file {:?} for {}: {}", path, domain, err);
                    err
                })?)
            } else if let Some(dir) = &self.options.output_directory {
                let extension = if self.options.json { "json" } else { "txt" };
                let path = dir.join(format!("{domain}.{extension}"));
                Some(output.create_file(&path, false).map_err(|err| {
                    error!("Could not create file {:?} for {}: {}", path, domain, err);
                    err
                })?)
            } else {
                None
            };

            match file {
                Some(file) => {
                    writers.push(Box::new(file));
                    let res = self.enumerate_single_domain(&domain, writers).await;
                    writers.pop();
                    res?;
                }
                None => {
                    self.enumerate_single_domain(&domain, writers).await?;
                }
            }
        }

        Ok(())
    }

    #[instrument(name = "domain", level = "info", skip_all, fields(domain = %domain))]
    pub async fn enumerate_single_domain(
        &self,
        domain: &str,
        writers: &mut [Box<dyn Write>],
    ) -> Result<EnumerationReport> {
        info!("Enumerating domains for {}", domain);
        let start = Instant::now();

        let results = self
            .agent
            .enumerate(domain, &self.enumeration_options(), &self.cancel)?;
        let mut aggregator = Aggregator::new(domain);
        aggregator.consume(results).await;

        // a failing destination does not stop the others
        let output = OutputWriter::new(self.options.json);
        let mut write_error = None;
        for writer in writers.iter_mut() {
            let written = if self.options.capture_sources {
                output.write_source_host(domain, aggregator.attribution(), writer.as_mut())
            } else {
                output.write_host(domain, aggregator.unique(), writer.as_mut())
            };
            if let Err(err) = written {
                error!("Could not write results for {}: {}", domain, err);
                write_error.get_or_insert(err);
            }
        }

        info!(
            "Found {} domains for {} in {:.2?}",
            aggregator.unique().len(),
            domain,
            start.elapsed()
        );

        let errors: usize = aggregator.errors().values().sum();
        if errors > 0 {
            warn!("{} source error(s) while enumerating {}", errors, domain);
        }

        // sources are done once the stream is drained, their counters are final
        let statistics = stats::correct(self.agent.statistics(), aggregator.skipped());
        if self.options.statistics {
            info!("Printing source statistics for {}", domain);
            log_statistics(&statistics);
        }

        if let Some(err) = write_error {
            return Err(err);
        }

        Ok(EnumerationReport {
            aggregator,
            statistics,
        })
    }
}
