//! Common test utilities

use std::sync::Arc;

use async_trait::async_trait;
use rotor::coordinator::{PartnerRules, RotationEngine};
use rotor::detector::GeoDetector;
use rotor::models::{
    ContentGroup, ContentItem, ContentKind, Domain, DomainGroup, DomainStatus, GroupKind,
};
use rotor::storage::{ControlRepository, SqliteRowStore};
use rotor::watcher::{HealthOracle, ProbeVerdict};

/// Repository over a fresh in-memory database
pub fn memory_repo() -> ControlRepository {
    ControlRepository::new(Arc::new(SqliteRowStore::in_memory().unwrap()))
}

/// Engine with no partner rewrites and no location filters
#[allow(dead_code)]
pub fn plain_engine() -> Arc<RotationEngine> {
    Arc::new(RotationEngine::new(PartnerRules::default(), GeoDetector::new()))
}

/// Insert a SHOW group holding `domains`, returning its id
#[allow(dead_code)]
pub fn seed_show_group(repo: &ControlRepository, name: &str, domains: &[(&str, DomainStatus)]) -> i64 {
    let id = repo
        .insert_domain_group(&DomainGroup {
            name: name.to_string(),
            kind: GroupKind::Show,
            ..Default::default()
        })
        .unwrap();
    for (domain, status) in domains {
        repo.insert_domain(&Domain {
            group_id: id,
            domain: domain.to_string(),
            status: *status,
            ..Default::default()
        })
        .unwrap();
    }
    id
}

/// Insert a JUMP group redirecting into `show_groups`, returning its id
#[allow(dead_code)]
pub fn seed_jump_group(
    repo: &ControlRepository,
    name: &str,
    show_groups: &[i64],
    domains: &[&str],
) -> i64 {
    let id = repo
        .insert_domain_group(&DomainGroup {
            name: name.to_string(),
            kind: GroupKind::Jump,
            show_group_list: show_groups.to_vec(),
            ..Default::default()
        })
        .unwrap();
    for domain in domains {
        repo.insert_domain(&Domain {
            group_id: id,
            domain: domain.to_string(),
            ..Default::default()
        })
        .unwrap();
    }
    id
}

/// Insert a content group with one video per title, returning the group id
/// and the item ids in insertion order
#[allow(dead_code)]
pub fn seed_content_group(
    repo: &ControlRepository,
    name: &str,
    titles: &[&str],
) -> (i64, Vec<i64>) {
    let id = repo
        .insert_content_group(&ContentGroup {
            name: name.to_string(),
            ..Default::default()
        })
        .unwrap();
    let items = titles
        .iter()
        .map(|title| {
            let video = serde_json::json!({
                "title": title,
                "videoSrc": format!("https://cdn.example/{title}.mp4"),
                "type": 0,
            });
            repo.insert_content(&ContentItem {
                group_id: id,
                value: video.to_string(),
                kind: ContentKind::Video,
                ..Default::default()
            })
            .unwrap()
        })
        .collect();
    (id, items)
}

/// Oracle that never flags anything
#[allow(dead_code)]
pub struct AlwaysHealthy;

#[async_trait]
impl HealthOracle for AlwaysHealthy {
    async fn probe(&self, _domain: &str) -> ProbeVerdict {
        ProbeVerdict::Healthy
    }
}
