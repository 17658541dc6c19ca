use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pacer_core::{
    OperationError, QueueBuilder, QueueConfig, QueueError, RequestQueue, SubmitOptions,
};

#[derive(Parser, Debug)]
#[command(name = "pacer")]
#[command(about = "Run simulated AI requests through a paced retry queue", long_about = None)]
struct Args {
    /// Number of requests to submit
    #[arg(short = 'n', long, default_value = "5")]
    requests: usize,

    /// Requests executing at once (1-5)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Minimum spacing between dispatches, in milliseconds (>= 500)
    #[arg(long)]
    min_interval_ms: Option<u64>,

    /// Provider calls that fail before the provider starts answering
    #[arg(long, default_value = "2")]
    fail_first: u32,

    /// Successful requests allowed per day (>= 100)
    #[arg(long)]
    daily_limit: Option<u32>,

    /// Dispatches allowed per minute (>= 1)
    #[arg(long)]
    per_minute_limit: Option<u32>,

    /// Print events, results and status as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Flags override the environment.
    fn apply(&self, mut config: QueueConfig) -> QueueConfig {
        if let Some(limit) = self.concurrency {
            config.concurrency_limit = limit;
        }
        if let Some(ms) = self.min_interval_ms {
            config.min_request_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = self.daily_limit {
            config.daily_limit = Some(limit);
        }
        if let Some(limit) = self.per_minute_limit {
            config.per_minute_limit = Some(limit);
        }
        config
    }
}

#[derive(Debug, Clone, Serialize)]
struct Prompt {
    id: usize,
    text: String,
}

#[derive(Debug, Serialize)]
struct Completion {
    prompt_id: usize,
    text: String,
    /// Provider call that produced this answer, counted across all prompts.
    call: u32,
}

/// Stand-in for a generative-AI client.
#[async_trait]
trait Provider: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<Completion, OperationError>;
}

/// Failure texts the way a provider SDK reports them; the queue classifies
/// them from the message alone.
const FAILURES: [&str; 3] = [
    "429 Too Many Requests: rate limit exceeded",
    "503 Service Unavailable",
    "The model is overloaded. Please try again later.",
];

struct SimulatedProvider {
    remaining_failures: AtomicU32,
    calls: AtomicU32,
    latency: Duration,
}

impl SimulatedProvider {
    fn new(failures: u32, latency: Duration) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            latency,
        }
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    async fn generate(&self, prompt: &Prompt) -> Result<Completion, OperationError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        let failing = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            let message = FAILURES[call as usize % FAILURES.len()];
            return Err(OperationError::from_message(message));
        }

        Ok(Completion {
            prompt_id: prompt.id,
            text: format!("summary of \"{}\"", prompt.text),
            call: call + 1,
        })
    }
}

/// Submit every prompt up front, then collect outcomes in submission order.
async fn run(
    queue: &RequestQueue,
    provider: Arc<dyn Provider>,
    requests: usize,
) -> Vec<Result<Completion, QueueError>> {
    let tickets: Vec<_> = (0..requests)
        .map(|i| {
            let prompt = Prompt {
                id: i,
                text: format!("chapter {}", i + 1),
            };
            let provider = Arc::clone(&provider);
            let options = SubmitOptions::default()
                .with_priority((i % 3) as i32)
                .with_timeout(Duration::from_secs(30));

            queue.enqueue(
                move || {
                    let provider = Arc::clone(&provider);
                    let prompt = prompt.clone();
                    async move { provider.generate(&prompt).await }
                },
                options,
            )
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        outcomes.push(ticket.await);
    }
    outcomes
}

fn report(outcomes: &[Result<Completion, QueueError>], json: bool) -> anyhow::Result<()> {
    for outcome in outcomes {
        match outcome {
            Ok(completion) if json => println!("{}", serde_json::to_string(completion)?),
            Ok(completion) => info!(
                prompt = completion.prompt_id,
                call = completion.call,
                text = %completion.text,
                "request completed"
            ),
            Err(err) => warn!(error = %err, "request failed"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pacer_core=info,pacer_cli=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args = Args::parse();
    let config = args.apply(QueueConfig::from_env().context("reading PACER_* environment")?);
    info!(?config, requests = args.requests, fail_first = args.fail_first, "starting");

    let queue = QueueBuilder::new()
        .config(config)
        .build()
        .context("building request queue")?;
    let provider: Arc<dyn Provider> = Arc::new(SimulatedProvider::new(
        args.fail_first,
        Duration::from_millis(200),
    ));

    if args.json {
        let mut events = queue.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
        });
    }

    tokio::select! {
        outcomes = run(&queue, provider, args.requests) => {
            report(&outcomes, args.json)?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            warn!("interrupted, shutting down");
            queue.shutdown().await;
        }
    }

    let status = queue.queue_status();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "completed={} failed={} retried={} rejected={} requests_today={}",
            status.counts.completed,
            status.counts.failed,
            status.counts.retried,
            status.counts.rejected,
            status.requests_today,
        );
    }
    Ok(())
}
