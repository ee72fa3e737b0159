//! Per-content-group bundle publisher
//!
//! A content group is served to clients as one JSON document in the object
//! store. The publisher rebuilds and uploads that document whenever the
//! group row or any of its content rows changed since the last successful
//! publish, then records the public URL on the group row.
//!
//! Two watermarks track what was last published: the newest content row
//! timestamp and the group row timestamp. They only move after the upload
//! and the URL write both succeeded, so a failed cycle is retried with the
//! same data on the next firing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RotorErrorTrait;
use crate::metrics;
use crate::models::{ContentGroup, ContentKind, ContentList, Video};
use crate::storage::{ControlRepository, CorsRule, ObjectMeta, SharedObjectStore};
use crate::utils::error::PublishError;

use super::{GroupSink, Watcher};

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing changed since the last publish
    Unchanged,
    /// Bundle uploaded under `key` with `items` entries
    Published { key: String, url: String, items: usize },
}

/// Decode a group's content rows into the published bundle.
///
/// Rows that do not decode are dropped. Items named in the group's main
/// list come first, in that list's order; the rest follow in storage order.
pub fn build_bundle(group: &ContentGroup, list: &ContentList) -> Vec<Video> {
    let decoded: Vec<Video> = list
        .items
        .iter()
        .filter_map(|item| match item.kind {
            ContentKind::Video => match serde_json::from_str::<Video>(&item.value) {
                Ok(mut video) => {
                    video.id = item.id;
                    Some(video)
                }
                Err(e) => {
                    tracing::debug!(group_id = group.id, item_id = item.id, error = %e, "dropping undecodable content");
                    None
                }
            },
        })
        .collect();

    let mut placed = HashSet::new();
    let mut bundle = Vec::with_capacity(decoded.len());

    for id in &group.main_content {
        if placed.contains(id) {
            continue;
        }
        if let Some(video) = decoded.iter().find(|v| v.id == *id) {
            placed.insert(*id);
            bundle.push(video.clone());
        }
    }

    bundle.extend(decoded.into_iter().filter(|v| !placed.contains(&v.id)));
    bundle
}

pub struct ContentPublisher {
    group: ContentGroup,
    list_watermark: i64,
    group_watermark: i64,
    repo: ControlRepository,
    store: SharedObjectStore,
    sink: Arc<dyn GroupSink>,
}

impl ContentPublisher {
    /// Apply the bucket CORS policy, then run a first publish check.
    ///
    /// # Errors
    ///
    /// Fails only if the CORS policy cannot be applied. A failed first
    /// publish is logged and retried on the next firing.
    pub async fn create(
        group: ContentGroup,
        repo: ControlRepository,
        store: SharedObjectStore,
        sink: Arc<dyn GroupSink>,
    ) -> Result<Self, PublishError> {
        store.set_cors(&[CorsRule::permissive()]).await?;

        let mut publisher = Self {
            group,
            list_watermark: 0,
            group_watermark: 0,
            repo,
            store,
            sink,
        };
        publisher.on_fire().await;
        Ok(publisher)
    }

    pub fn group_id(&self) -> i64 {
        self.group.id
    }

    /// Last published (list, group) timestamps
    pub fn watermarks(&self) -> (i64, i64) {
        (self.list_watermark, self.group_watermark)
    }

    /// Run one publish cycle
    ///
    /// # Errors
    ///
    /// Any read, encode, upload or URL write failure. Watermarks are left
    /// where they were.
    pub async fn check_once(&mut self) -> Result<PublishOutcome, PublishError> {
        let mut group = self.repo.content_group(self.group.id)?;
        let list = self.repo.content_list(group.id)?;

        if list.update_time <= self.list_watermark && group.update_time <= self.group_watermark {
            self.group = group;
            return Ok(PublishOutcome::Unchanged);
        }

        let bundle = build_bundle(&group, &list);
        let body = serde_json::to_vec(&bundle)?;
        let key = group.bundle_key();

        self.store
            .put_object(&key, Bytes::from(body), &ObjectMeta::bundle())
            .await?;

        let url = self.store.public_url(&key);
        self.repo.update_content_json_url(group.id, &url)?;
        group.json_url = url.clone();

        self.list_watermark = list.update_time;
        self.group_watermark = group.update_time;
        self.sink.update_content_group(group.clone());
        self.group = group;

        Ok(PublishOutcome::Published {
            key,
            url,
            items: bundle.len(),
        })
    }
}

#[async_trait]
impl Watcher for ContentPublisher {
    fn slot_id(&self) -> i64 {
        self.group.id
    }

    fn label(&self) -> String {
        format!("publish:{}", self.group.id)
    }

    async fn on_fire(&mut self) {
        match self.check_once().await {
            Ok(PublishOutcome::Unchanged) => {}
            Ok(PublishOutcome::Published { key, url, items }) => {
                metrics::record_publish("ok");
                tracing::info!(group_id = self.group.id, key = %key, url = %url, items, "bundle published");
            }
            Err(e) => {
                metrics::record_publish(e.category().as_str());
                if e.is_recoverable() {
                    tracing::warn!(group_id = self.group.id, error = %e, "publish failed, retrying next cycle");
                } else {
                    tracing::error!(group_id = self.group.id, error = %e, "publish failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentItem, DomainGroup, DomainList};
    use crate::storage::{ObjectStore, SqliteRowStore};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        uploads: Mutex<Vec<(String, Bytes)>>,
        fail_uploads: AtomicBool,
        fail_cors: bool,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn set_cors(&self, _rules: &[CorsRule]) -> Result<(), PublishError> {
            if self.fail_cors {
                return Err(PublishError::Setup("cors denied".into()));
            }
            Ok(())
        }

        async fn put_object(
            &self,
            key: &str,
            body: Bytes,
            _meta: &ObjectMeta,
        ) -> Result<(), PublishError> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(PublishError::Rejected {
                    key: key.to_string(),
                    status: 503,
                });
            }
            self.uploads.lock().unwrap().push((key.to_string(), body));
            Ok(())
        }

        fn public_url_base(&self) -> &str {
            "http://cdn.example/"
        }
    }

    #[derive(Default)]
    struct Recorder {
        groups: Mutex<Vec<ContentGroup>>,
    }

    impl GroupSink for Recorder {
        fn update_domain_group(&self, _group: DomainGroup, _list: Option<DomainList>) {}

        fn update_content_group(&self, group: ContentGroup) {
            self.groups.lock().unwrap().push(group);
        }
    }

    fn video(title: &str) -> String {
        serde_json::json!({ "title": title, "videoSrc": format!("http://v/{title}.mp4") }).to_string()
    }

    fn item(id: i64, value: &str) -> ContentItem {
        ContentItem {
            id,
            value: value.to_string(),
            ..Default::default()
        }
    }

    fn setup(main: Vec<i64>, titles: &[&str]) -> (ControlRepository, ContentGroup) {
        let repo = ControlRepository::new(Arc::new(SqliteRowStore::in_memory().unwrap()));
        let id = repo
            .insert_content_group(&ContentGroup {
                name: "summer".into(),
                main_content: main,
                ..Default::default()
            })
            .unwrap();
        for title in titles {
            repo.insert_content(&ContentItem {
                group_id: id,
                value: video(title),
                ..Default::default()
            })
            .unwrap();
        }
        let group = repo.content_group(id).unwrap();
        (repo, group)
    }

    #[test]
    fn test_main_content_goes_first_in_listed_order() {
        let group = ContentGroup {
            main_content: vec![3, 1, 3],
            ..Default::default()
        };
        let list = ContentList {
            items: vec![item(1, &video("a")), item(2, &video("b")), item(3, &video("c"))],
            ..Default::default()
        };

        let ids: Vec<i64> = build_bundle(&group, &list).iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_undecodable_rows_are_dropped() {
        let group = ContentGroup {
            main_content: vec![2],
            ..Default::default()
        };
        let list = ContentList {
            items: vec![item(1, &video("a")), item(2, "not json"), item(3, &video("c"))],
            ..Default::default()
        };

        let bundle = build_bundle(&group, &list);
        assert_eq!(bundle.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(bundle[0].title, "a");
    }

    #[tokio::test]
    async fn test_create_publishes_once_and_records_url() {
        let (repo, group) = setup(vec![], &["a", "b"]);
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(Recorder::default());

        let mut publisher = ContentPublisher::create(group.clone(), repo.clone(), store.clone(), sink.clone())
            .await
            .unwrap();
        assert_eq!(publisher.check_once().await.unwrap(), PublishOutcome::Unchanged);

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "summer.json");
        let bundle: Vec<Video> = serde_json::from_slice(&uploads[0].1).unwrap();
        assert_eq!(bundle.len(), 2);

        let stored = repo.content_group(group.id).unwrap();
        assert_eq!(stored.json_url, "http://cdn.example/summer.json");
        assert_eq!(sink.groups.lock().unwrap()[0].json_url, stored.json_url);
    }

    #[tokio::test]
    async fn test_new_data_publishes_exactly_once() {
        let (repo, group) = setup(vec![], &["a", "b"]);
        let store = Arc::new(MemoryStore::default());

        let mut publisher = ContentPublisher::create(
            group.clone(),
            repo.clone(),
            store.clone(),
            Arc::new(Recorder::default()),
        )
        .await
        .unwrap();
        assert_eq!(store.uploads.lock().unwrap().len(), 1);

        let added = repo
            .insert_content(&ContentItem {
                group_id: group.id,
                value: video("c"),
                ..Default::default()
            })
            .unwrap();
        repo.rows()
            .execute(
                "UPDATE content SET time = ?1 WHERE id = ?2",
                &["2030-01-01 00:00:00.000".into(), added.into()],
            )
            .unwrap();

        assert!(matches!(
            publisher.check_once().await.unwrap(),
            PublishOutcome::Published { items: 3, .. }
        ));
        assert_eq!(publisher.check_once().await.unwrap(), PublishOutcome::Unchanged);
        assert_eq!(store.uploads.lock().unwrap().len(), 2);

        // Editing the group row alone also triggers a single publish
        repo.rows()
            .execute(
                "UPDATE content_group SET main_content = ?1, time = ?2 WHERE id = ?3",
                &[
                    added.to_string().into(),
                    "2030-01-01 00:00:01.000".into(),
                    group.id.into(),
                ],
            )
            .unwrap();

        assert!(matches!(
            publisher.check_once().await.unwrap(),
            PublishOutcome::Published { items: 3, .. }
        ));
        assert_eq!(publisher.check_once().await.unwrap(), PublishOutcome::Unchanged);

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 3);
        let bundle: Vec<Video> = serde_json::from_slice(&uploads[2].1).unwrap();
        assert_eq!(bundle[0].id, added);
        assert_eq!(bundle[0].title, "c");
    }

    #[tokio::test]
    async fn test_failed_upload_counted_by_category() {
        let _ = metrics::init_metrics();
        let (repo, group) = setup(vec![], &["a"]);
        let store = Arc::new(MemoryStore::default());
        store.fail_uploads.store(true, Ordering::SeqCst);

        // The first cycle runs inside create
        ContentPublisher::create(group, repo, store, Arc::new(Recorder::default()))
            .await
            .unwrap();

        let text = metrics::encode_metrics().unwrap();
        assert!(text.contains(r#"rotor_bundle_publishes_total{outcome="network"}"#));
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_watermarks() {
        let (repo, group) = setup(vec![], &["a"]);
        let store = Arc::new(MemoryStore::default());
        store.fail_uploads.store(true, Ordering::SeqCst);
        let sink = Arc::new(Recorder::default());

        let mut publisher = ContentPublisher::create(group, repo, store.clone(), sink.clone())
            .await
            .unwrap();
        assert_eq!(publisher.watermarks(), (0, 0));
        assert!(publisher.check_once().await.is_err());
        assert!(sink.groups.lock().unwrap().is_empty());

        store.fail_uploads.store(false, Ordering::SeqCst);
        assert!(matches!(
            publisher.check_once().await.unwrap(),
            PublishOutcome::Published { items: 1, .. }
        ));
        assert_ne!(publisher.watermarks(), (0, 0));
    }

    #[tokio::test]
    async fn test_cors_failure_is_fatal() {
        let (repo, group) = setup(vec![], &[]);
        let store = Arc::new(MemoryStore {
            fail_cors: true,
            ..Default::default()
        });

        let result = ContentPublisher::create(group, repo, store.clone(), Arc::new(Recorder::default())).await;
        assert!(result.is_err());
        assert!(store.uploads.lock().unwrap().is_empty());
    }
}
