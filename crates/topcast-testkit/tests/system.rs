// End-to-end scenarios across the whole pipeline: authorize, connect,
// subscribe, publish through the queue, and fan out over the transport.
use bytes::Bytes;
use topcast_testkit::{init_tracing, TestWorld};

#[tokio::test]
async fn subscribe_then_publish_delivers_exact_payload() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);

    let subscriber = world.connect("alpha-key", "c-sub").await.expect("connect");
    let publisher = world.connect("beta-key", "c-pub").await.expect("connect");

    subscriber.subscribe("t1").await.expect("subscribe");
    let response = publisher.publish("t1", "hello").await.expect("publish");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "Published message");

    let report = world.pump().await.expect("pump");
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        world.delivered_to(&subscriber.connection_id),
        vec![Bytes::from_static(b"hello")]
    );
    // The publisher never subscribed, so the message does not echo back.
    assert!(world.delivered_to(&publisher.connection_id).is_empty());
}

#[tokio::test]
async fn unknown_api_key_cannot_connect() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key"]);
    let err = world.connect("stolen-key", "c1").await.expect_err("reject");
    assert!(err.to_string().contains("authorize"));
}

#[tokio::test]
async fn topics_are_isolated() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);

    let on_t1 = world.connect("alpha-key", "c1").await.expect("connect");
    let on_t2 = world.connect("beta-key", "c2").await.expect("connect");
    on_t1.subscribe("t1").await.expect("subscribe");
    on_t2.subscribe("t2").await.expect("subscribe");

    on_t1.publish("t1", "for-t1").await.expect("publish");
    on_t1.publish("t2", "for-t2").await.expect("publish");
    let report = world.pump().await.expect("pump");

    assert_eq!(report.messages, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(
        world.delivered_to(&on_t1.connection_id),
        vec![Bytes::from_static(b"for-t1")]
    );
    assert_eq!(
        world.delivered_to(&on_t2.connection_id),
        vec![Bytes::from_static(b"for-t2")]
    );
}

#[tokio::test]
async fn subscription_survives_disconnect_and_resumes_on_reconnect() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);
    let publisher = world.connect("beta-key", "c-pub").await.expect("connect");

    let first = world.connect("alpha-key", "c1").await.expect("connect");
    first.subscribe("t1").await.expect("subscribe");
    first.disconnect().await.expect("disconnect");

    // Published while the subscriber is away: nobody to deliver to.
    publisher.publish("t1", "missed").await.expect("publish");
    let report = world.pump().await.expect("pump");
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 0);

    // The same principal reconnects on a new connection and resumes
    // topic traffic without resubscribing.
    let second = world.connect("alpha-key", "c2").await.expect("reconnect");
    publisher.publish("t1", "caught").await.expect("publish");
    let report = world.pump().await.expect("pump");
    assert_eq!(report.delivered, 1);
    assert_eq!(
        world.delivered_to(&second.connection_id),
        vec![Bytes::from_static(b"caught")]
    );
    assert!(world.delivered_to(&first.connection_id).is_empty());
}

#[tokio::test]
async fn double_subscribe_yields_one_delivery() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);

    let subscriber = world.connect("alpha-key", "c1").await.expect("connect");
    let publisher = world.connect("beta-key", "c2").await.expect("connect");
    subscriber.subscribe("t1").await.expect("subscribe");
    subscriber.subscribe("t1").await.expect("resubscribe");

    publisher.publish("t1", "once").await.expect("publish");
    let report = world.pump().await.expect("pump");

    assert_eq!(report.delivered, 1);
    assert_eq!(
        world.delivered_to(&subscriber.connection_id),
        vec![Bytes::from_static(b"once")]
    );
}

#[tokio::test]
async fn principal_with_two_connections_gets_one_copy_each() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);

    let desktop = world.connect("alpha-key", "c-desktop").await.expect("connect");
    let phone = world.connect("alpha-key", "c-phone").await.expect("connect");
    let publisher = world.connect("beta-key", "c-pub").await.expect("connect");
    desktop.subscribe("t1").await.expect("subscribe");

    publisher.publish("t1", "fanout").await.expect("publish");
    let report = world.pump().await.expect("pump");

    assert_eq!(report.delivered, 2);
    assert_eq!(
        world.delivered_to(&desktop.connection_id),
        vec![Bytes::from_static(b"fanout")]
    );
    assert_eq!(
        world.delivered_to(&phone.connection_id),
        vec![Bytes::from_static(b"fanout")]
    );
}

#[tokio::test]
async fn subscribed_publisher_receives_its_own_message() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key"]);

    let session = world.connect("alpha-key", "c1").await.expect("connect");
    session.subscribe("t1").await.expect("subscribe");
    session.publish("t1", "echo").await.expect("publish");
    let report = world.pump().await.expect("pump");

    assert_eq!(report.delivered, 1);
    assert_eq!(
        world.delivered_to(&session.connection_id),
        vec![Bytes::from_static(b"echo")]
    );
}

#[tokio::test]
async fn unsubscribe_stops_further_deliveries() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);

    let subscriber = world.connect("alpha-key", "c1").await.expect("connect");
    let publisher = world.connect("beta-key", "c2").await.expect("connect");
    subscriber.subscribe("t1").await.expect("subscribe");

    publisher.publish("t1", "before").await.expect("publish");
    world.pump().await.expect("pump");

    subscriber.unsubscribe("t1").await.expect("unsubscribe");
    publisher.publish("t1", "after").await.expect("publish");
    let report = world.pump().await.expect("pump");

    assert_eq!(report.delivered, 0);
    assert_eq!(
        world.delivered_to(&subscriber.connection_id),
        vec![Bytes::from_static(b"before")]
    );
}

#[tokio::test]
async fn unreachable_subscriber_does_not_block_the_rest() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key", "beta-key"]);

    let dead = world.connect("alpha-key", "c-dead").await.expect("connect");
    let live = world.connect("alpha-key", "c-live").await.expect("connect");
    let publisher = world.connect("beta-key", "c-pub").await.expect("connect");
    dead.subscribe("t1").await.expect("subscribe");
    world.transport.mark_unreachable(dead.connection_id.clone());

    publisher.publish("t1", "x").await.expect("publish");
    let report = world.pump().await.expect("pump");

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(
        world.delivered_to(&live.connection_id),
        vec![Bytes::from_static(b"x")]
    );
}

#[tokio::test]
async fn malformed_and_unknown_bodies_get_error_responses() {
    init_tracing();
    let world = TestWorld::with_keys(&["alpha-key"]);
    let session = world.connect("alpha-key", "c1").await.expect("connect");

    let response = session.send_raw("not json at all").await.expect("send");
    assert_eq!(response.status, 404);

    let response = session
        .send_raw(r#"{ "action": "shout", "topic": "t1" }"#)
        .await
        .expect("send");
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "Unknown action");

    let response = session
        .send_raw(r#"{ "action": "publish", "topic": "t1" }"#)
        .await
        .expect("send");
    assert_eq!(response.status, 400);
    assert_eq!(response.body, "Invalid message");

    // None of those reached the queue.
    assert!(world.queue.is_empty());
}
