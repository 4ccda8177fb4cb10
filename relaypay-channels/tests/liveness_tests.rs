//! Liveness monitoring driven by real controller events, on paused time.

mod common;

#[cfg(test)]
mod liveness_tests {
    use super::common::*;
    use relaypay_lib::test_utils::{sample_state, TestFixtures};
    use relaypay_lib::ChannelId;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    type Reports = Arc<Mutex<Vec<(ChannelId, Duration, Instant)>>>;

    fn recorder() -> (Reports, impl Fn(&ChannelId, Duration) + Send + 'static) {
        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        (reports, move |id: &ChannelId, elapsed: Duration| {
            sink.lock().unwrap().push((id.clone(), elapsed, Instant::now()))
        })
    }

    fn parties() -> (Party, Party) {
        let (client, relay) = client_and_relay();
        let config = default_config().with_liveness_interval_ms(100);
        let relay = party_on(relay.store, relay.ledger, RELAY_KEY, "relay", config);
        (client, relay)
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_updates_keep_channel_live() {
        let (client, relay) = parties();
        let id = TestFixtures::channel_id();
        let start = Instant::now();

        let _subscription = relay.manager.subscribe_to_channel(&id, |_| {}).await.unwrap();
        let (reports, on_stale) = recorder();
        let monitor = relay.manager.monitor_liveness(&id, on_stale).unwrap();
        assert_eq!(monitor.stale_threshold(), Duration::from_millis(200));

        client.manager.open(&id, sample_state(0, 1000, 0)).await.unwrap();
        for nonce in 1..=3 {
            sleep(Duration::from_millis(150)).await;
            client
                .manager
                .update(&id, sample_state(nonce, 1000 - nonce * 100, nonce * 100))
                .await
                .unwrap();
        }

        // Updates every 150ms never leave 200ms of silence
        sleep(Duration::from_millis(100)).await;
        assert!(reports.lock().unwrap().is_empty());
        assert!(!monitor.is_stale());
        assert_eq!(monitor.last_accepted_at(), start + Duration::from_millis(450));

        // Last update at 450ms: checks at 500ms and 600ms pass, 700ms reports
        sleep(Duration::from_millis(200)).await;
        let reports = reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, id);
        assert_eq!(reports[0].1, Duration::from_millis(250));
        assert_eq!(reports[0].2, start + Duration::from_millis(700));
        assert!(monitor.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_packages_are_not_activity() {
        let (_client, relay) = parties();
        let id = TestFixtures::channel_id();

        let _subscription = relay.manager.subscribe_to_channel(&id, |_| {}).await.unwrap();
        let (reports, on_stale) = recorder();
        let _monitor = relay.manager.monitor_liveness(&id, on_stale).unwrap();

        // A steady stream of forged packages
        for nonce in 1..=4 {
            sleep(Duration::from_millis(60)).await;
            let mut forged = signed_package([0x66; 32], sample_state(nonce, 1, 1));
            forged.data.client_balance = 1_000u64.into();
            relay.store.inject("channels/0xA", forged.to_value().unwrap());
        }

        sleep(Duration::from_millis(80)).await;
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forged_floods_past_event_buffer_still_report_stale() {
        let (_client, relay) = client_and_relay();
        let config = default_config()
            .with_liveness_interval_ms(100)
            .with_event_buffer(4);
        let relay = party_on(relay.store, relay.ledger, RELAY_KEY, "relay", config);
        let id = TestFixtures::channel_id();

        let _subscription = relay.manager.subscribe_to_channel(&id, |_| {}).await.unwrap();
        let (reports, on_stale) = recorder();
        let _monitor = relay.manager.monitor_liveness(&id, on_stale).unwrap();
        let mut events = relay.manager.get(&id).unwrap().events();

        // Bursts of forged packages, each far larger than the event buffer
        for burst in 0..6u64 {
            sleep(Duration::from_millis(150)).await;
            for i in 0..20 {
                let mut forged = signed_package([0x66; 32], sample_state(burst * 20 + i + 1, 1, 1));
                forged.data.client_balance = 1_000u64.into();
                relay.store.inject("channels/0xA", forged.to_value().unwrap());
            }
        }
        sleep(Duration::from_millis(10)).await;

        assert!(matches!(
            events.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_))
        ));
        let snapshot = relay.manager.metrics().snapshot();
        assert_eq!(snapshot.invalid_signatures, 120);
        assert_eq!(snapshot.packages_accepted, 0);

        // Checks at 300ms..900ms all see silence since start
        let reports = reports.lock().unwrap();
        let elapsed: Vec<_> = reports.iter().map(|r| r.1).collect();
        assert_eq!(
            elapsed,
            (3..=9).map(|n| Duration::from_millis(n * 100)).collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_updates_keep_channel_live() {
        let store = Arc::new(relaypay_lib::MemoryReplicatedStore::new());
        let ledger = Arc::new(relaypay_lib::test_utils::MockSettlementLedger::new());
        let client = party_on(
            store,
            ledger,
            CLIENT_KEY,
            "client",
            default_config().with_liveness_interval_ms(100),
        );
        let id = TestFixtures::channel_id();

        client.manager.open(&id, sample_state(0, 1000, 0)).await.unwrap();
        let (reports, on_stale) = recorder();
        let monitor = client.manager.monitor_liveness(&id, on_stale).unwrap();

        for nonce in 1..=5 {
            sleep(Duration::from_millis(190)).await;
            client
                .manager
                .update(&id, sample_state(nonce, 1000 - nonce, nonce))
                .await
                .unwrap();
        }
        assert!(reports.lock().unwrap().is_empty());

        monitor.stop();
        sleep(Duration::from_secs(10)).await;
        assert!(reports.lock().unwrap().is_empty());
    }
}
