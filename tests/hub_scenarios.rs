//! End-to-end hub scenarios through the public API

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use frame_hub::{
    BufferPlan, DeliveryPolicy, Error, Hub, HubConfig, HubPhase, IngestConfig, IngestServer,
};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for_subscribers<T: Clone + Send + 'static>(hub: &Hub<T>, count: usize) {
    timeout(WAIT, async {
        while hub.subscriber_count() != count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

#[tokio::test]
async fn test_subscribe_publish_unsubscribe_shutdown() {
    let hub: Hub<u32> = Hub::new(2);
    assert!(hub.start());

    let mut a = hub.subscribe(4);
    for value in [1, 2, 3] {
        assert!(hub.publish(value).await);
    }
    for expected in [1, 2, 3] {
        assert_eq!(timeout(WAIT, a.recv()).await.unwrap(), Some(expected));
    }

    let mut b = hub.subscribe(4);
    assert!(hub.publish(4).await);
    assert_eq!(timeout(WAIT, a.recv()).await.unwrap(), Some(4));
    assert_eq!(timeout(WAIT, b.recv()).await.unwrap(), Some(4));

    hub.unsubscribe(&mut b);
    assert!(timeout(WAIT, b.recv()).await.unwrap().is_none());

    assert!(hub.shutdown());
    assert!(!hub.shutdown());
    assert!(timeout(WAIT, a.recv()).await.unwrap().is_none());
    assert!(!hub.publish(5).await);

    timeout(WAIT, hub.stopped()).await.unwrap();
    assert_eq!(hub.phase(), HubPhase::Stopped);

    let stats = hub.stats();
    assert_eq!(stats.published, 4);
    assert_eq!(stats.delivered, 5);
}

#[tokio::test]
async fn test_subscription_as_stream() {
    let hub: Hub<u32> = Hub::new(4);
    hub.start();

    let sub = hub.subscribe_unbounded();
    for value in 0..10 {
        assert!(hub.publish(value).await);
    }

    let collector = tokio::spawn(sub.collect::<Vec<_>>());
    timeout(WAIT, async {
        while hub.stats().delivered < 10 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    hub.shutdown();

    let values = timeout(WAIT, collector).await.unwrap().unwrap();
    assert_eq!(values, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_latest_wins_consumer_keeps_up() {
    let config = HubConfig::with_queue_capacity(8).delivery(DeliveryPolicy::Blocking);
    let hub: Hub<u32> = Hub::with_config(config);
    hub.start();

    let mut sub = hub.subscribe(16);
    for value in 0..10 {
        assert!(hub.publish(value).await);
    }
    timeout(WAIT, async {
        while hub.stats().delivered < 10 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(timeout(WAIT, sub.recv_latest()).await.unwrap(), Some(9));
    assert_eq!(sub.stats().discarded, 9);
}

#[tokio::test]
async fn test_many_consumers_churn() {
    let hub: Hub<Bytes> = Hub::new(4);
    hub.start();

    let mut steady = hub.subscribe(64);
    for round in 0..20u8 {
        let passing = hub.subscribe(1);
        assert!(hub.publish(Bytes::from(vec![round])).await);
        drop(passing);
    }

    for round in 0..20u8 {
        let chunk = timeout(WAIT, steady.recv()).await.unwrap().unwrap();
        assert_eq!(&chunk[..], &[round]);
    }
    wait_for_subscribers(&hub, 1).await;
}

#[tokio::test]
async fn test_ingest_to_subscriber() {
    let hub: Hub<Bytes> = Hub::new(8);
    hub.start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = IngestServer::new(IngestConfig::with_addr(addr).fixed(4), hub.clone());
    let task = tokio::spawn(async move { server.serve(listener).await });

    let mut sub = hub.subscribe(8);
    wait_for_subscribers(&hub, 1).await;

    let mut producer = TcpStream::connect(addr).await.unwrap();
    producer.write_all(b"abcdefgh").await.unwrap();

    assert_eq!(
        timeout(WAIT, sub.recv()).await.unwrap(),
        Some(Bytes::from_static(b"abcd"))
    );
    assert_eq!(
        timeout(WAIT, sub.recv()).await.unwrap(),
        Some(Bytes::from_static(b"efgh"))
    );

    hub.shutdown();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_rotating_pool_never_overwritten_under_reader() {
    let plan = BufferPlan::from_total(8);
    let config = HubConfig::from_plan(&plan);
    plan.validate_for(&config).unwrap();

    let hub: Hub<Arc<AtomicU32>> = Hub::with_config(config);
    hub.start();
    let mut slow = hub.subscribe(plan.inbox_capacity);
    wait_for_subscribers(&hub, 1).await;

    let pool: Vec<Arc<AtomicU32>> = (0..plan.total).map(|_| Arc::new(AtomicU32::new(0))).collect();
    let producer = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for value in 0..40u32 {
                let slot = Arc::clone(&pool[value as usize % pool.len()]);
                slot.store(value, Ordering::SeqCst);
                if !hub.publish(slot).await {
                    break;
                }
            }
        })
    };

    // Let the producer run as far ahead as the hub allows
    tokio::time::sleep(Duration::from_millis(50)).await;

    for expected in 0..40u32 {
        let slot = timeout(WAIT, slow.recv()).await.unwrap().unwrap();
        assert_eq!(slot.load(Ordering::SeqCst), expected, "slot recycled while buffered");
    }
    timeout(WAIT, producer).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rotating_pool_rejects_dropping_hub() {
    let plan = BufferPlan::from_total(8);
    let config = HubConfig::from_plan(&plan).delivery(DeliveryPolicy::DropOnFull);

    assert!(matches!(
        plan.validate_for(&config),
        Err(Error::UnsafeDelivery { .. })
    ));
}
