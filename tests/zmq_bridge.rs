mod common;

use std::time::Duration;

use home_sensors::{
    api::HttpStorageApi,
    bridge::{self, BridgeOptions},
    source::ZmqSubscriber,
};
use serde_json::json;
use tokio::{sync::oneshot, time::timeout};
use zeromq::{PubSocket, Socket as _, SocketSend as _, ZmqMessage};

use crate::common::FakeStorage;

#[tokio::test]
async fn bridges_published_messages_to_the_api() {
    let storage = FakeStorage::default();
    let base_url = storage.clone().serve().await;
    let api = HttpStorageApi::new(&base_url).unwrap();

    let mut publisher = PubSocket::new();
    let endpoint = publisher.bind("tcp://127.0.0.1:0").await.unwrap().to_string();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let bridge = bridge::start(
        api,
        BridgeOptions::default(),
        move || async move { ZmqSubscriber::connect(&endpoint, None).await },
        async {
            let _ = stop_rx.await;
        },
    );

    let skipped = json!({"device_id": 99, "timestamp": 1, "type": "Temperature", "value": 1.0});
    let error = json!({"device_id": 5, "timestamp": 2, "type": "Error"});
    let valid = json!({"device_id": 5, "timestamp": 3, "type": "Temperature", "value": 21.5, "battery": 90});

    let publish = async {
        // A SUB socket misses whatever is published before its subscription
        // reaches the publisher, so keep publishing until something lands.
        let delivered = timeout(Duration::from_secs(10), async {
            loop {
                for message in [&skipped, &error, &valid] {
                    publisher
                        .send(ZmqMessage::from(message.to_string()))
                        .await
                        .unwrap();
                }

                if !storage.posted().is_empty() {
                    break;
                }

                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        let _ = stop_tx.send(());
        delivered
    };

    let (stats, delivered) = tokio::join!(bridge, publish);
    assert!(delivered.is_ok(), "no measurement reached the API");
    let stats = stats.unwrap();

    let expected = json!({"sensor_id": 5, "mtype_id": 1, "timestamp": 3, "value": 21.5});
    let posted = storage.posted();
    assert!(posted.iter().all(|m| *m == expected), "{posted:?}");
    // A post still in flight at shutdown may land without being counted.
    assert!(stats.submitted >= 1);
    assert!(stats.submitted <= posted.len() as u64);
    assert!(stats.received >= stats.submitted);
}
