mod common;

use std::collections::HashMap;

use common::{DB, POSTS, Post, client, seed_posts};
use docgate::{
    bson::doc,
    driver::WriteModel,
    prelude::*,
};
use serde::Serialize;

#[derive(Debug, Serialize, UpdateFields)]
struct TitlePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    likes: Option<i64>,
    #[serde(skip)]
    #[allow(dead_code)]
    scratch: HashMap<String, String>,
}

#[derive(Debug, Serialize, UpdateFields)]
struct BarePatch {
    likes: i64,
}

#[derive(Debug, Serialize, UpdateFields)]
struct LoosePatch {
    likes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, UpdateFields)]
struct Author {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, UpdateFields)]
struct NestedPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<Author>,
}

#[derive(Debug, Serialize, UpdateFields)]
struct TagsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<HashMap<String, i64>>,
}

async fn assert_untouched(client: &Client<docgate::memory::MemoryDriver>) {
    let posts = client
        .typed_collection::<Post>(DB, POSTS)
        .find(doc! {}, &["_id"], 0, 0, None)
        .await
        .unwrap();

    let likes: Vec<i64> = posts.iter().map(|post| post.likes).collect();
    assert_eq!(likes, vec![5, 1, 4, 2, 3]);
}

#[tokio::test]
async fn test_conforming_record_updates_only_set_fields() {
    let (client, _) = client();
    seed_posts(&client).await;

    let patch = TitlePatch {
        title: Some("renamed".to_string()),
        likes: None,
        scratch: HashMap::from([("ignored".to_string(), "yes".to_string())]),
    };
    client
        .collection(DB, POSTS)
        .update_one(doc! { "_id": 2 }, UpdateDocument::new().set_record(patch), false)
        .await
        .unwrap();

    let post = client
        .typed_collection::<Post>(DB, POSTS)
        .find_id(2, None)
        .await
        .unwrap();
    assert_eq!(post, Some(Post::new(2, "renamed", 1)));
}

#[tokio::test]
async fn test_map_shaped_set_document_passes() {
    let (client, _) = client();
    seed_posts(&client).await;

    let result = client
        .collection(DB, POSTS)
        .update_one(doc! { "_id": 3 }, doc! { "$set": { "title": "raw" } }, false)
        .await
        .unwrap();

    assert_eq!(result.modified_count, 1);
}

#[tokio::test]
async fn test_non_option_field_is_rejected() {
    let (client, _) = client();
    seed_posts(&client).await;

    let err = client
        .collection(DB, POSTS)
        .update_one(doc! { "_id": 1 }, UpdateDocument::new().set_record(BarePatch { likes: 0 }), false)
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("must be an Option"));
    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_missing_skip_serializing_if_is_rejected() {
    let (client, _) = client();
    seed_posts(&client).await;

    let err = client
        .collection(DB, POSTS)
        .update_many(doc! {}, UpdateDocument::new().set_record(LoosePatch { likes: None }), false)
        .await
        .unwrap_err();

    assert!(matches!(&err, DocGateError::UnsafeUpdate { operator, .. } if operator == "$set"));
    assert!(err.to_string().contains("skip_serializing_if"));
    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_nested_record_and_map_are_rejected() {
    let (client, _) = client();
    seed_posts(&client).await;
    let posts = client.collection(DB, POSTS);

    let nested = NestedPatch {
        author: Some(Author { name: Some("ann".to_string()) }),
    };
    let err = posts
        .update_id(1, UpdateDocument::new().set_record(nested), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must not hold a record"));

    let tags = TagsPatch { tags: None };
    let err = posts
        .update_id(1, UpdateDocument::new().unset_record(tags), false)
        .await
        .unwrap_err();
    assert!(matches!(&err, DocGateError::UnsafeUpdate { operator, reason } if operator == "$unset" && reason.contains("map")));

    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_pipeline_update_is_invalid_argument() {
    let (client, _) = client();
    seed_posts(&client).await;

    let err = client
        .collection(DB, POSTS)
        .update_one(doc! { "_id": 1 }, vec![doc! { "$set": { "likes": 0 } }], false)
        .await
        .unwrap_err();

    assert!(matches!(err, DocGateError::InvalidArgument(_)));
    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_find_one_and_update_is_guarded() {
    let (client, _) = client();
    seed_posts(&client).await;

    let mut result = Post::new(-1, "untouched", -1);
    let err = client
        .collection(DB, POSTS)
        .find_one_and_update(
            doc! { "_id": 1 },
            UpdateDocument::new().set_record(BarePatch { likes: 0 }),
            &mut result,
            &[],
            true,
            true,
            None,
        )
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(result, Post::new(-1, "untouched", -1));
    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_bulk_write_rejects_whole_batch() {
    let (client, _) = client();
    seed_posts(&client).await;

    let err = client
        .collection(DB, POSTS)
        .bulk_write(vec![
            WriteModel::update_one(doc! { "_id": 1 }, doc! { "$set": { "likes": 0 } }, false),
            WriteModel::delete_one(doc! { "_id": 2 }),
            WriteModel::update_many(doc! {}, UpdateDocument::new().set_record(LoosePatch { likes: Some(0) }), false),
        ])
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_replacement_with_operators_is_rejected() {
    let (client, _) = client();
    seed_posts(&client).await;

    let mut result = Post::default();
    let err = client
        .collection(DB, POSTS)
        .find_one_and_replace(
            doc! { "_id": 1 },
            &doc! { "$set": { "likes": 0 } },
            &mut result,
            &[],
            false,
            false,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DocGateError::InvalidArgument(_)));
    assert_untouched(&client).await;
}

#[tokio::test]
async fn test_rejected_updates_emit_no_metrics() {
    let (client, _) = client();
    seed_posts(&client).await;

    let _ = client
        .collection(DB, POSTS)
        .update_one(doc! { "_id": 1 }, UpdateDocument::new().set_record(BarePatch { likes: 0 }), false)
        .await
        .unwrap_err();

    let labels = ["tests", "update_one", DB, POSTS];
    assert_eq!(client.metrics().latency().with_label_values(&labels).get_sample_count(), 0);
    assert_eq!(client.metrics().errors().with_label_values(&labels).get(), 0);
}
