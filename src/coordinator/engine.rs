//! Rotation engine
//!
//! The engine holds the in-memory mirror of every tracked group and answers
//! selection requests from it without touching storage. Watchers push
//! refreshed groups in through [`GroupSink`]; request handlers pull rotated
//! domains and content bundles out.
//!
//! All state sits behind one mutex. Selection and refresh never interleave,
//! so the round-robin cursors cannot lose updates.
//!
//! # Selection
//!
//! - SHOW domains rotate across groups, then across each group's domains.
//!   A group that is not OK, or has no OK domain, is skipped.
//! - JUMP domains rotate across JUMP groups; a pick only counts if the group
//!   names at least one OK SHOW group in its show list, which becomes the
//!   next hop.
//! - Content rotates across content groups one step per request, without
//!   retrying past a missing entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::detector::GeoDetector;
use crate::metrics;
use crate::models::{
    ContentGroup, DomainGroup, DomainList, GroupKind, SelectedContent, SelectedDomain,
};
use crate::utils::error::SelectionError;
use crate::utils::rotate;
use crate::watcher::GroupSink;

use super::encoding::PartnerRules;

struct DomainEntry {
    group: DomainGroup,
    list: DomainList,
    cursor: usize,
}

#[derive(Default)]
struct EngineState {
    domains: HashMap<i64, DomainEntry>,
    show_groups: Vec<i64>,
    show_cursor: usize,
    jump_groups: Vec<i64>,
    jump_cursor: usize,
    contents: HashMap<i64, ContentGroup>,
    content_groups: Vec<i64>,
    content_cursor: usize,
}

/// Number of groups the engine is serving
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCounts {
    pub show_groups: usize,
    pub jump_groups: usize,
    pub content_groups: usize,
}

pub struct RotationEngine {
    state: Mutex<EngineState>,
    partners: PartnerRules,
    detector: GeoDetector,
}

impl RotationEngine {
    pub fn new(partners: PartnerRules, detector: GeoDetector) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            partners,
            detector,
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pick the next usable domain.
    ///
    /// `kind == Jump` rotates across JUMP groups and ignores `group_id`.
    /// Otherwise a non-zero `group_id` selects within that group only, and
    /// zero rotates across all SHOW groups.
    pub fn select_domain(
        &self,
        group_id: i64,
        kind: GroupKind,
    ) -> Result<SelectedDomain, SelectionError> {
        let mut guard = self.state();
        let state = &mut *guard;

        let result = match kind {
            GroupKind::Jump => {
                let groups = &state.jump_groups;
                let domains = &mut state.domains;
                rotate(&mut state.jump_cursor, groups.len(), |i| {
                    pick_domain(domains, groups[i], true)
                })
                .ok_or(SelectionError::NoUsableJumpDomain)
            }
            GroupKind::Show if group_id != 0 => {
                pick_domain(&mut state.domains, group_id, false).ok_or(SelectionError::NoUsableDomain)
            }
            GroupKind::Show => {
                let groups = &state.show_groups;
                let domains = &mut state.domains;
                rotate(&mut state.show_cursor, groups.len(), |i| {
                    pick_domain(domains, groups[i], false)
                })
                .ok_or(SelectionError::NoUsableDomain)
            }
        };
        drop(guard);

        match result {
            Ok(mut selected) => {
                selected.domain = self.partners.rewrite(selected.group_id, &selected.domain);
                metrics::record_selection("domain", "ok");
                Ok(selected)
            }
            Err(e) => {
                metrics::record_selection("domain", "exhausted");
                tracing::warn!(group_id, kind = ?kind, error = %e, "domain selection failed");
                Err(e)
            }
        }
    }

    /// Pick a content bundle and the flags for the requesting domain group.
    ///
    /// A non-zero `content_group_id` returns that group; zero takes the next
    /// group in rotation. Share and ads flags default to on when the domain
    /// group is unknown; a filtered client location turns sharing off.
    pub fn select_content(
        &self,
        content_group_id: i64,
        domain_group_id: i64,
        client_ip: &str,
    ) -> Result<SelectedContent, SelectionError> {
        let result = self.lookup_content(content_group_id, domain_group_id);

        match result {
            Ok(mut selected) => {
                if self.detector.check(domain_group_id, client_ip) {
                    selected.force_share = false;
                }
                metrics::record_selection("content", "ok");
                Ok(selected)
            }
            Err(e) => {
                metrics::record_selection("content", "exhausted");
                tracing::warn!(content_group_id, domain_group_id, error = %e, "content selection failed");
                Err(e)
            }
        }
    }

    fn lookup_content(
        &self,
        content_group_id: i64,
        domain_group_id: i64,
    ) -> Result<SelectedContent, SelectionError> {
        let mut state = self.state();

        let group = if content_group_id != 0 {
            state
                .contents
                .get(&content_group_id)
                .ok_or(SelectionError::UnknownContentGroup(content_group_id))?
        } else {
            let len = state.content_groups.len();
            if len == 0 {
                return Err(SelectionError::NoContentGroup);
            }
            let at = state.content_cursor % len;
            state.content_cursor = (at + 1) % len;
            let id = state.content_groups[at];
            state
                .contents
                .get(&id)
                .ok_or(SelectionError::ContentMapInconsistent(id))?
        };

        let mut selected = SelectedContent {
            content_group_id: group.id,
            content_url: group.json_url.clone(),
            offline: false,
            force_share: true,
            show_ads: true,
        };

        if let Some(entry) = state.domains.get(&domain_group_id) {
            selected.force_share = entry.group.force_share();
            selected.show_ads = entry.group.show_ads();
            selected.offline = !entry.group.is_ok();
        }

        Ok(selected)
    }

    /// Merge a refreshed domain group, tracking it if new
    pub fn update_domain_group(&self, group: DomainGroup, list: Option<DomainList>) {
        let mut state = self.state();
        let id = group.id;

        if let Some(entry) = state.domains.get_mut(&id) {
            entry.group = group;
            if let Some(list) = list {
                entry.list = list;
                if !entry.list.domains.is_empty() {
                    entry.cursor %= entry.list.domains.len();
                } else {
                    entry.cursor = 0;
                }
            }
            return;
        }

        match group.kind {
            GroupKind::Show => state.show_groups.push(id),
            GroupKind::Jump => state.jump_groups.push(id),
        }
        let list = list.unwrap_or_else(|| DomainList {
            group_id: id,
            ..Default::default()
        });
        tracing::info!(group_id = id, kind = ?group.kind, domains = list.domains.len(), "tracking domain group");
        state.domains.insert(
            id,
            DomainEntry {
                group,
                list,
                cursor: 0,
            },
        );

        let counts = counts_of(&state);
        drop(state);
        metrics::set_tracked_groups(counts.show_groups, counts.jump_groups, counts.content_groups);
    }

    /// Merge a refreshed content group, tracking it if new
    pub fn update_content_group(&self, group: ContentGroup) {
        let mut state = self.state();
        let id = group.id;

        if state.contents.insert(id, group).is_some() {
            return;
        }

        state.content_groups.push(id);
        tracing::info!(group_id = id, "tracking content group");

        let counts = counts_of(&state);
        drop(state);
        metrics::set_tracked_groups(counts.show_groups, counts.jump_groups, counts.content_groups);
    }

    pub fn counts(&self) -> EngineCounts {
        counts_of(&self.state())
    }

    /// Current in-memory copy of a domain group
    pub fn domain_group(&self, id: i64) -> Option<(DomainGroup, DomainList)> {
        self.state()
            .domains
            .get(&id)
            .map(|entry| (entry.group.clone(), entry.list.clone()))
    }

    /// Current in-memory copy of a content group
    pub fn content_group(&self, id: i64) -> Option<ContentGroup> {
        self.state().contents.get(&id).cloned()
    }
}

impl GroupSink for RotationEngine {
    fn update_domain_group(&self, group: DomainGroup, list: Option<DomainList>) {
        RotationEngine::update_domain_group(self, group, list);
    }

    fn update_content_group(&self, group: ContentGroup) {
        RotationEngine::update_content_group(self, group);
    }
}

fn counts_of(state: &EngineState) -> EngineCounts {
    EngineCounts {
        show_groups: state.show_groups.len(),
        jump_groups: state.jump_groups.len(),
        content_groups: state.content_groups.len(),
    }
}

/// Round-robin one group's domains. For a jump pick the group must also
/// name an OK SHOW group, which is returned as the next hop.
fn pick_domain(
    domains: &mut HashMap<i64, DomainEntry>,
    group_id: i64,
    jump: bool,
) -> Option<SelectedDomain> {
    let entry = domains.get_mut(&group_id)?;
    if !entry.group.is_ok() {
        return None;
    }

    let list = &entry.list.domains;
    let domain = rotate(&mut entry.cursor, list.len(), |i| {
        list[i].is_ok().then(|| list[i].clone())
    })?;

    let mut selected = SelectedDomain {
        id: domain.id,
        group_id: domain.group_id,
        domain: domain.domain,
        status: domain.status,
        show_group_id: 0,
        time: domain.time,
    };

    if jump {
        let targets = entry.group.show_group_list.clone();
        selected.show_group_id = targets.into_iter().find(|id| {
            domains
                .get(id)
                .is_some_and(|e| e.group.is_ok() && !e.group.is_jump())
        })?;
    }

    Some(selected)
}
