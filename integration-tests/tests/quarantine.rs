#![allow(non_snake_case)]

use std::time::Duration;
use tokio::time::{
    self,
    Instant,
};
use wallet_dispatch::{
    DispatchConfig,
    Dispatcher,
    SignerPool,
    SignerSpec,
};

const COOLDOWN: Duration = Duration::from_secs(5 * 60);

fn arb_dispatcher(signers: usize) -> Dispatcher<u32> {
    let config = DispatchConfig::default().with_quarantine_cooldown(COOLDOWN);
    let specs = (0..signers)
        .map(|i| SignerSpec::new(format!("Wallet-{}", i + 1), format!("0x{i:064x}"), i as u32))
        .collect();
    let pool = SignerPool::new(specs, &config).unwrap();
    Dispatcher::start(pool, &config).unwrap()
}

async fn revert(dispatcher: &Dispatcher<u32>) {
    let result = dispatcher
        .submit(|_signer| async { Err::<(), _>(anyhow::anyhow!("execution reverted")) })
        .await;
    assert!(result.unwrap_err().operation_error().is_some());
}

async fn succeed(dispatcher: &Dispatcher<u32>) -> String {
    dispatcher
        .submit(|signer| async move { Ok::<_, anyhow::Error>(signer.name().to_owned()) })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn dispatcher__three_consecutive_failures__quarantines_until_cooldown() {
    // given
    let dispatcher = arb_dispatcher(1);
    let id = dispatcher.primary_signer().id();
    for _ in 0..3 {
        revert(&dispatcher).await;
    }
    assert!(!dispatcher.pool().is_available(id));
    assert_eq!(dispatcher.detailed_stats().quarantined_signers, 1);
    let quarantined_at = Instant::now();

    // when
    let waiting = dispatcher
        .submit(|signer| async move { Ok::<_, anyhow::Error>(signer.name().to_owned()) });
    time::sleep(Duration::from_secs(1)).await;
    let queued_while_quarantined = dispatcher.queue_len();
    let name = waiting.await.unwrap();

    // then
    assert_eq!(queued_while_quarantined, 1);
    assert_eq!(name, "Wallet-1");
    assert!(quarantined_at.elapsed() >= COOLDOWN - Duration::from_secs(1));
    assert!(dispatcher.pool().is_available(id));
    assert_eq!(dispatcher.pool().consecutive_failures(id), 0);
}

#[tokio::test(start_paused = true)]
async fn dispatcher__success_between_failures__never_quarantines() {
    // given
    let dispatcher = arb_dispatcher(1);
    let id = dispatcher.primary_signer().id();

    // when
    revert(&dispatcher).await;
    revert(&dispatcher).await;
    succeed(&dispatcher).await;
    revert(&dispatcher).await;
    revert(&dispatcher).await;

    // then
    assert!(dispatcher.pool().is_available(id));
    assert_eq!(dispatcher.pool().consecutive_failures(id), 2);
    let stats = dispatcher.detailed_stats();
    assert_eq!(stats.quarantined_signers, 0);
    assert_eq!(stats.failed_operations, 4);
    assert_eq!(stats.successful_operations, 1);
}

#[tokio::test(start_paused = true)]
async fn dispatcher__one_signer_quarantined__traffic_moves_to_the_rest() {
    // given
    let dispatcher = arb_dispatcher(2);
    let failing = dispatcher.primary_signer();
    // submissions alternate between the two signers
    for _ in 0..6 {
        let _ = dispatcher
            .submit(|signer| async move {
                if signer.id().index() == 0 {
                    anyhow::bail!("insufficient funds");
                }
                Ok(())
            })
            .await;
    }
    assert!(!dispatcher.pool().is_available(failing.id()));

    // when
    let names = [succeed(&dispatcher).await, succeed(&dispatcher).await];

    // then
    assert_eq!(names, ["Wallet-2", "Wallet-2"]);
}

#[tokio::test(start_paused = true)]
async fn restore__manual__returns_signer_to_rotation_early() {
    // given
    let dispatcher = arb_dispatcher(1);
    let id = dispatcher.primary_signer().id();
    for _ in 0..3 {
        revert(&dispatcher).await;
    }
    let started = Instant::now();

    // when
    let restored = dispatcher.pool().restore(id);
    let name = succeed(&dispatcher).await;

    // then
    assert!(restored);
    assert_eq!(name, "Wallet-1");
    assert!(started.elapsed() < Duration::from_secs(1));
}
