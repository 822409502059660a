use anyhow::{
    Result,
    bail,
    ensure,
};
use futures::future::join_all;
use rand::Rng;
use std::time::Duration;
use tokio::time::{
    self,
    MissedTickBehavior,
};
use wallet_dispatch::{
    DetailedStats,
    DispatchConfig,
    DispatchError,
    Dispatcher,
    SignerPool,
    SignerSpec,
    WorkId,
};


#[derive(clap::Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of requests to submit
    #[arg(long)]
    pub requests: usize,

    /// How long each simulated transaction takes
    #[arg(long, default_value_t = 500)]
    pub latency_ms: u64,

    /// Probability in [0, 1] that a simulated transaction reverts
    #[arg(long, default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Delay between submissions
    #[arg(long, default_value_t = 0)]
    pub spacing_ms: u64,

    /// Interval between stats log lines while requests are outstanding
    #[arg(long, default_value_t = 1000)]
    pub monitor_ms: u64,
}

#[derive(Debug)]
pub struct RequestReport {
    pub id: WorkId,
    pub result: Result<String, DispatchError>,
}

#[derive(Debug)]
pub struct SimulationReport {
    pub requests: Vec<RequestReport>,
    pub stats: DetailedStats,
}

impl SimulationReport {
    pub fn succeeded(&self) -> usize {
        self.requests.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn rejected(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(&r.result, Err(e) if e.is_capacity_exceeded()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.requests.len() - self.succeeded() - self.rejected()
    }

    pub fn print(&self) {
        for request in &self.requests {
            match &request.result {
                Ok(signer) => println!("request {}: ok via {signer}", request.id),
                Err(e) => println!("request {}: {e}", request.id),
            }
        }
        println!(
            "{} succeeded, {} failed, {} rejected at admission",
            self.succeeded(),
            self.failed(),
            self.rejected()
        );
    }
}

/// Submits `args.requests` synthetic operations and waits for all of them.
pub async fn run<C: Send + Sync + 'static>(
    specs: Vec<SignerSpec<C>>,
    config: &DispatchConfig,
    args: &SimulateArgs,
) -> Result<SimulationReport> {
    ensure!(
        (0.0..=1.0).contains(&args.failure_rate),
        "--failure-rate must be within [0, 1], got {}",
        args.failure_rate
    );
    ensure!(args.monitor_ms > 0, "--monitor-ms must be positive");

    tracing::info!(
        "simulating {} requests: latency {}ms, failure rate {}, spacing {}ms",
        args.requests,
        args.latency_ms,
        args.failure_rate,
        args.spacing_ms
    );
    let pool = SignerPool::new(specs, config)?;
    let dispatcher = Dispatcher::start(pool, config)?;
    let monitor_task = tokio::spawn(monitor(
        dispatcher.clone(),
        Duration::from_millis(args.monitor_ms),
    ));

    let latency = Duration::from_millis(args.latency_ms);
    let spacing = Duration::from_millis(args.spacing_ms);
    let mut tickets = Vec::with_capacity(args.requests);
    for n in 0..args.requests {
        if n > 0 && !spacing.is_zero() {
            time::sleep(spacing).await;
        }
        let reverts = rand::rng().random_bool(args.failure_rate);
        tickets.push(dispatcher.submit(move |signer| async move {
            time::sleep(latency).await;
            if reverts {
                bail!("simulated revert on {}", signer.name());
            }
            Ok(signer.name().to_owned())
        }));
    }

    let ids: Vec<_> = tickets.iter().map(|ticket| ticket.id()).collect();
    let results = join_all(tickets).await;
    monitor_task.abort();
    dispatcher.log_stats();

    let requests: Vec<_> = ids
        .into_iter()
        .zip(results)
        .map(|(id, result)| RequestReport { id, result })
        .collect();
    let report = SimulationReport {
        requests,
        stats: dispatcher.detailed_stats(),
    };
    tracing::info!(
        "simulation finished: {} succeeded, {} failed, {} rejected",
        report.succeeded(),
        report.failed(),
        report.rejected()
    );
    Ok(report)
}

async fn monitor<C: Send + Sync + 'static>(dispatcher: Dispatcher<C>, period: Duration) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        dispatcher.log_stats();
    }
}
