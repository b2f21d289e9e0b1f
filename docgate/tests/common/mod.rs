#![allow(dead_code)]

use docgate::{
    bson::doc,
    memory::MemoryDriver,
    prelude::*,
};
use serde::{Deserialize, Serialize};

pub const DB: &str = "blog";
pub const POSTS: &str = "posts";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: i32,
    pub title: String,
    pub likes: i64,
}

impl Post {
    pub fn new(id: i32, title: &str, likes: i64) -> Self {
        Self { id, title: title.to_string(), likes }
    }
}

/// A client over `driver` whose metrics land in a private registry.
pub fn client_with(driver: MemoryDriver) -> (Client<MemoryDriver>, MetricsRegistry) {
    let registry = MetricsRegistry::new();
    let client = ClientBuilder::new(Config::new("memory:27017"))
        .metrics_registry(&registry)
        .metric_target("tests")
        .with_driver(driver)
        .unwrap();

    (client, registry)
}

pub fn client() -> (Client<MemoryDriver>, MetricsRegistry) {
    client_with(MemoryDriver::new())
}

/// Inserts five posts whose likes are 5, 1, 4, 2, 3 in that insertion order.
pub async fn seed_posts(client: &Client<MemoryDriver>) {
    let posts = [
        Post::new(1, "e", 5),
        Post::new(2, "a", 1),
        Post::new(3, "d", 4),
        Post::new(4, "b", 2),
        Post::new(5, "c", 3),
    ];

    client
        .typed_collection::<Post>(DB, POSTS)
        .insert_many(&posts)
        .await
        .unwrap();

    let count = client.collection(DB, POSTS).count(doc! {}, 0, 0).await.unwrap();
    assert_eq!(count, 5);
}
