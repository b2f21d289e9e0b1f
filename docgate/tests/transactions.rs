mod common;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use common::{DB, POSTS, Post, client, client_with, seed_posts};
use docgate::{
    bson::doc,
    memory::{MAX_TRANSACTION_ATTEMPTS, MemoryDriver},
    prelude::*,
};
use futures::FutureExt;
use serde::Serialize;

#[derive(Debug, Serialize, UpdateFields)]
struct BarePatch {
    likes: i64,
}

async fn likes(client: &Client<MemoryDriver>, id: i32) -> Option<i64> {
    client
        .typed_collection::<Post>(DB, POSTS)
        .find_id(id, None)
        .await
        .unwrap()
        .map(|post| post.likes)
}

#[tokio::test]
async fn test_transaction_commits_on_success() {
    let (client, _) = client();
    seed_posts(&client).await;

    let moved = client
        .do_transaction(|session| {
            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts
                    .update_one(doc! { "_id": 1 }, doc! { "$inc": { "likes": -2 } }, false)
                    .await?;
                posts
                    .update_one(doc! { "_id": 2 }, doc! { "$inc": { "likes": 2 } }, false)
                    .await?;
                posts.insert_one(&Post::new(6, "f", 0)).await?;

                posts.count(doc! {}).await
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(moved, 6);
    assert_eq!(likes(&client, 1).await, Some(3));
    assert_eq!(likes(&client, 2).await, Some(3));
    assert_eq!(likes(&client, 6).await, Some(0));
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let (client, _) = client();
    seed_posts(&client).await;

    let err = client
        .do_transaction(|session| {
            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts
                    .update_one(doc! { "_id": 1 }, doc! { "$set": { "likes": 100 } }, false)
                    .await?;
                assert!(posts.delete_one(doc! { "_id": 2 }).await?);

                // Duplicate key.
                posts.insert_one(&Post::new(3, "dup", 0)).await?;
                Ok::<_, DocGateError>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DocGateError::Transaction { stage: "with_transaction", .. }));
    assert_eq!(likes(&client, 1).await, Some(5));
    assert_eq!(likes(&client, 2).await, Some(1));
}

#[tokio::test]
async fn test_transaction_reads_its_own_writes() {
    let (client, _) = client();
    seed_posts(&client).await;

    let titles = client
        .do_transaction(|session| {
            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts
                    .update_one(doc! { "likes": { "$lt": 3 } }, doc! { "$set": { "title": "low" } }, false)
                    .await?;

                let low: Vec<Post> = posts.find(doc! { "title": "low" }, &[], 0, 0).await?;
                let first: Option<Post> = posts.find_one(doc! { "_id": 2 }).await?;

                Ok::<_, DocGateError>((low.len(), first.map(|post| post.title)))
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(titles, (1, Some("low".to_string())));
}

#[tokio::test]
async fn test_guard_applies_inside_transactions() {
    let (client, _) = client();
    seed_posts(&client).await;

    let err = client
        .do_transaction(|session| {
            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts.delete_one(doc! { "_id": 1 }).await?;
                posts
                    .update_one(doc! { "_id": 2 }, UpdateDocument::new().set_record(BarePatch { likes: 0 }), false)
                    .await?;
                Ok::<_, DocGateError>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    match err {
        DocGateError::Transaction { source, .. } => assert!(source.is_validation()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(likes(&client, 1).await, Some(5));
}

#[tokio::test]
async fn test_conflicting_commit_is_retried() {
    let driver = MemoryDriver::new();
    let (client, _) = client_with(driver.clone());
    seed_posts(&client).await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    client
        .do_transaction(move |session| {
            let outside = driver.clone();
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;

            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts
                    .update_one(doc! { "_id": 1 }, doc! { "$set": { "likes": 10 } }, false)
                    .await?;

                if attempt == 1 {
                    outside
                        .update_one(
                            Namespace::new(DB, POSTS),
                            doc! { "_id": 2 },
                            doc! { "$set": { "likes": 20 } },
                            Default::default(),
                        )
                        .await?;
                }
                Ok::<_, DocGateError>(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(likes(&client, 1).await, Some(10));
    assert_eq!(likes(&client, 2).await, Some(20));
}

#[tokio::test]
async fn test_persistent_conflict_aborts_commit() {
    let driver = MemoryDriver::new();
    let (client, _) = client_with(driver.clone());
    seed_posts(&client).await;

    let err = client
        .do_transaction(move |session| {
            let outside = driver.clone();

            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts
                    .update_one(doc! { "_id": 1 }, doc! { "$set": { "likes": 10 } }, false)
                    .await?;

                outside
                    .update_one(
                        Namespace::new(DB, POSTS),
                        doc! { "_id": 2 },
                        doc! { "$inc": { "likes": 1 } },
                        Default::default(),
                    )
                    .await?;
                Ok::<_, DocGateError>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DocGateError::Transaction { stage: "commit_transaction", .. }));
    assert_eq!(likes(&client, 1).await, Some(5));
    assert_eq!(likes(&client, 2).await, Some(1 + i64::from(MAX_TRANSACTION_ATTEMPTS)));
}

#[tokio::test]
async fn test_use_session_is_instrumented() {
    let (client, _) = client();
    seed_posts(&client).await;

    let count = client
        .collection(DB, POSTS)
        .use_session(|session| {
            async move {
                let mut posts = SessionCollection::new(session, DB, POSTS);
                posts
                    .update_one(doc! { "_id": 5 }, doc! { "$inc": { "likes": 1 } }, false)
                    .await?;
                posts.count(doc! { "likes": { "$gte": 4 } }).await
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(likes(&client, 5).await, Some(4));

    let labels = ["tests", "use_session", DB, POSTS];
    assert_eq!(client.metrics().latency().with_label_values(&labels).get_sample_count(), 1);
}
