mod common;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{DB, POSTS, Post, client, seed_posts};
use docgate::{bson::doc, memory::MemoryDriver, prelude::*};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Records the name and fields of every span opened while it is the default subscriber.
struct SpanCapture {
    spans: Arc<Mutex<Vec<(String, BTreeMap<String, String>)>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanCapture {
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        struct FieldVisitor(BTreeMap<String, String>);

        impl tracing::field::Visit for FieldVisitor {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                self.0.insert(field.name().to_string(), value.to_string());
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                self.0.insert(field.name().to_string(), format!("{value:?}"));
            }
        }

        let mut visitor = FieldVisitor(BTreeMap::new());
        attrs.record(&mut visitor);

        self.spans
            .lock()
            .unwrap()
            .push((attrs.metadata().name().to_string(), visitor.0));
    }
}

fn sample_count(client: &Client<MemoryDriver>, command: &str, db: &str, collection: &str) -> u64 {
    client
        .metrics()
        .latency()
        .with_label_values(&["tests", command, db, collection])
        .get_sample_count()
}

fn error_count(client: &Client<MemoryDriver>, command: &str, db: &str, collection: &str) -> u64 {
    client
        .metrics()
        .errors()
        .with_label_values(&["tests", command, db, collection])
        .get()
}

#[tokio::test]
async fn test_one_latency_sample_per_call() {
    let (client, _) = client();
    seed_posts(&client).await;
    assert_eq!(sample_count(&client, "insert_many", DB, POSTS), 1);
    assert_eq!(sample_count(&client, "count", DB, POSTS), 1);

    let posts = client.collection(DB, POSTS);
    let mut dest: Vec<Post> = Vec::new();
    posts.find(doc! {}, &mut dest, &[], 0, 0, None).await.unwrap();
    posts.find(doc! { "likes": 100 }, &mut dest, &[], 0, 0, None).await.unwrap();
    posts.delete_one(doc! { "_id": 42 }).await.unwrap();

    assert_eq!(sample_count(&client, "find", DB, POSTS), 2);
    assert_eq!(sample_count(&client, "delete_one", DB, POSTS), 1);
    assert_eq!(error_count(&client, "find", DB, POSTS), 0);
    assert_eq!(error_count(&client, "delete_one", DB, POSTS), 0);
}

#[tokio::test]
async fn test_error_counter_increments_on_failure() {
    let (client, _) = client();
    seed_posts(&client).await;
    let posts = client.collection(DB, POSTS);

    posts.insert_one(&Post::new(6, "f", 0)).await.unwrap();
    assert_eq!(error_count(&client, "insert_one", DB, POSTS), 0);

    posts.insert_one(&Post::new(6, "f", 0)).await.unwrap_err();
    assert_eq!(error_count(&client, "insert_one", DB, POSTS), 1);
    assert_eq!(sample_count(&client, "insert_one", DB, POSTS), 2);

    let err = posts
        .update_one(doc! {}, doc! { "$rename": { "title": "name" } }, false)
        .await
        .unwrap_err();
    assert!(!err.is_validation());
    assert_eq!(error_count(&client, "update_one", DB, POSTS), 1);
}

#[tokio::test]
async fn test_decode_failure_counts_as_error() {
    let (client, _) = client();
    client
        .collection(DB, POSTS)
        .insert_one(&doc! { "_id": 1, "title": 7, "likes": 1 })
        .await
        .unwrap();

    let mut dest: Vec<Post> = Vec::new();
    let err = client
        .collection(DB, POSTS)
        .find(doc! {}, &mut dest, &[], 0, 0, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DocGateError::Serialization(_)));
    assert_eq!(error_count(&client, "find", DB, POSTS), 1);
}

#[tokio::test]
async fn test_clients_share_a_wrapped_registry() {
    let shared = prometheus::Registry::new();
    let build = |registry: MetricsRegistry| {
        ClientBuilder::new(Config::new("memory:27017"))
            .metrics_registry(&registry)
            .metric_target("tests")
            .with_driver(MemoryDriver::new())
            .unwrap()
    };

    let first = build(MetricsRegistry::with_registry(shared.clone()));
    let second = build(MetricsRegistry::with_registry(shared.clone()));
    assert!(first.metrics().registered_in(&MetricsRegistry::with_registry(shared.clone())));

    first.collection(DB, POSTS).estimated_count().await.unwrap();
    second.collection(DB, POSTS).estimated_count().await.unwrap();

    assert_eq!(sample_count(&first, "estimated_count", DB, POSTS), 2);
    let exported: Vec<String> = shared.gather().iter().map(|family| family.name().to_string()).collect();
    assert_eq!(exported, vec!["docgate_client_command_latency".to_string()]);
}

#[tokio::test]
async fn test_label_converters_collapse_shards() {
    let (client, _) = client();
    client.add_label_converter(shard_suffix('_'));
    client.add_label_converter(|label: &str| label.starts_with("posts").then(|| "never".to_string()));

    for shard in ["posts_0001", "posts_0002"] {
        client.collection("blog_7", shard).estimated_count().await.unwrap();
    }
    client.collection(DB, "posts").estimated_count().await.unwrap();

    assert_eq!(sample_count(&client, "estimated_count", "blog_*", "posts_*"), 2);
    assert_eq!(sample_count(&client, "estimated_count", DB, "never"), 1);
    assert_eq!(client.convert_label("posts_x"), "never");
    assert_eq!(client.convert_label("users"), "users");
}

#[tokio::test]
async fn test_operations_open_a_db_span() {
    let spans = Arc::new(Mutex::new(Vec::new()));
    let _guard = tracing_subscriber::registry()
        .with(SpanCapture { spans: spans.clone() })
        .set_default();

    let (client, _) = client();
    client
        .collection(DB, POSTS)
        .insert_one(&Post::new(1, "a", 1))
        .await
        .unwrap();

    let spans = spans.lock().unwrap();
    let (name, fields) = spans
        .iter()
        .find(|(name, _)| name == "db")
        .expect("no db span recorded");

    assert_eq!(name, "db");
    assert_eq!(fields.get("otel.name").map(String::as_str), Some("db|blog.posts"));
    assert_eq!(fields.get("db.name").map(String::as_str), Some(DB));
    assert_eq!(fields.get("db.collection").map(String::as_str), Some(POSTS));
    assert_eq!(fields.get("command").map(String::as_str), Some("insert_one"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_operation_times_out() {
    let driver = MemoryDriver::builder().latency(Duration::from_secs(5)).build();
    let client = ClientBuilder::new(Config {
        timeout: 1,
        ..Config::new("memory:27017")
    })
    .metrics_registry(&MetricsRegistry::new())
    .metric_target("tests")
    .with_driver(driver)
    .unwrap();

    let err = client
        .collection(DB, POSTS)
        .count(doc! {}, 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocGateError::Timeout { command: "count", timeout } if timeout == Duration::from_secs(1)
    ));
    assert_eq!(error_count(&client, "count", DB, POSTS), 1);

    let mut dest: Vec<Post> = Vec::new();
    let err = client
        .collection(DB, POSTS)
        .find(doc! {}, &mut dest, &[], 0, 0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DocGateError::Timeout { command: "find", .. }));
}
