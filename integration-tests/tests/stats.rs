#![allow(non_snake_case)]

use futures::future::join_all;
use std::time::Duration;
use tokio::time;
use wallet_dispatch::{
    DispatchConfig,
    Dispatcher,
    SignerPool,
    SignerSpec,
};

const UNIT: Duration = Duration::from_secs(1);

fn arb_dispatcher(signers: usize, max_queue_size: usize) -> Dispatcher<u32> {
    let config = DispatchConfig::default().with_max_queue_size(max_queue_size);
    let specs = (0..signers)
        .map(|i| SignerSpec::new(format!("Wallet-{}", i + 1), format!("0x{i:064x}"), i as u32))
        .collect();
    let pool = SignerPool::new(specs, &config).unwrap();
    Dispatcher::start(pool, &config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn clear_queue__k_pending__returns_k_and_rejects_each_caller() {
    // given
    let dispatcher = arb_dispatcher(2, 10);
    let running: Vec<_> = (0..2)
        .map(|_| {
            dispatcher.submit(|_signer| async {
                time::sleep(UNIT).await;
                Ok::<_, anyhow::Error>(())
            })
        })
        .collect();
    let pending: Vec<_> = (0..5)
        .map(|_| dispatcher.submit(|_signer| async { Ok::<_, anyhow::Error>(()) }))
        .collect();

    // when
    let cleared = dispatcher.clear_queue();

    // then
    assert_eq!(cleared, 5);
    assert_eq!(dispatcher.queue_len(), 0);
    for result in join_all(pending).await {
        assert!(result.unwrap_err().is_admin_cleared());
    }
    assert!(join_all(running).await.iter().all(Result::is_ok));
    assert_eq!(dispatcher.queue_stats().total_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn total_processed__counts_successes_and_failures_and_never_decreases() {
    // given
    let dispatcher = arb_dispatcher(2, 10);
    let mut last = dispatcher.queue_stats().total_processed;

    // when
    let mut observed = Vec::new();
    for n in 0..8u32 {
        let result = dispatcher
            .submit(move |_signer| async move {
                time::sleep(UNIT / 2).await;
                if n % 3 == 0 {
                    anyhow::bail!("reverted");
                }
                Ok(n)
            })
            .await;
        let processed = dispatcher.queue_stats().total_processed;
        observed.push((result.is_ok(), processed - last));
        last = processed;
    }

    // then
    assert!(observed.iter().all(|(_, delta)| *delta == 1));
    assert_eq!(last, 8);
    let stats = dispatcher.detailed_stats();
    assert_eq!(stats.total_operations, 8);
    assert_eq!(stats.failed_operations, 3);
    assert_eq!(stats.success_rate_pct, 62.5);
}

#[tokio::test(start_paused = true)]
async fn detailed_stats__serializes_with_camel_case_keys() {
    // given
    let dispatcher = arb_dispatcher(2, 4);
    let _busy = dispatcher.submit(|_signer| async {
        time::sleep(UNIT).await;
        Ok::<_, anyhow::Error>(())
    });
    time::sleep(Duration::from_millis(10)).await;

    // when
    let json = serde_json::to_value(dispatcher.detailed_stats()).unwrap();

    // then
    assert_eq!(json["totalSigners"], 2);
    assert_eq!(json["busySigners"], 1);
    assert_eq!(json["availableSigners"], 1);
    assert_eq!(json["perSigner"][0]["name"], "Wallet-1");
    assert_eq!(json["perSigner"][0]["busy"], true);
    assert!(json["perSigner"][0]["lastUsed"].is_string());
    assert_eq!(json["queue"]["maxSize"], 4);
    assert_eq!(json["queue"]["isDraining"], false);
}
