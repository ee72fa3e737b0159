//! Typed access to the persisted groups
//!
//! [`ControlRepository`] turns the text rows of a [`RowStore`] into the
//! model types the engine works with. Single-row reads fail on any column
//! that does not parse; list reads skip such rows with a warning so one bad
//! row cannot hide the rest of a group.
//!
//! Change timestamps (`utime`) are the row's `time` column expressed in unix
//! milliseconds. List reads report the newest `utime` among their rows.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rotor::storage::{ControlRepository, SqliteRowStore};
//!
//! let repo = ControlRepository::new(Arc::new(SqliteRowStore::new("data/rotor.db")?));
//! let (groups, max_id) = repo.domain_groups_after(0)?;
//! ```

use crate::models::{
    ContentGroup, ContentItem, ContentKind, ContentList, Domain, DomainGroup, DomainList,
    DomainStatus, GroupKind, GroupStatus,
};
use crate::utils::error::StorageError;
use crate::utils::parse_id_list;

use super::rows::{Row, SharedRowStore, SqlArg};

type Result<T> = std::result::Result<T, StorageError>;

/// Layout SQLite's `strftime('%Y-%m-%d %H:%M:%f')` writes; the fraction is optional
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ============================================================================
// Row Parsing
// ============================================================================

fn text<'a>(row: &'a Row, column: &str) -> Result<&'a str> {
    row.get(column)
        .map(String::as_str)
        .ok_or_else(|| StorageError::MissingColumn(column.to_string()))
}

fn int(row: &Row, column: &str) -> Result<i64> {
    let value = text(row, column)?;
    value.trim().parse::<i64>().map_err(|_| StorageError::BadColumn {
        column: column.to_string(),
        value: value.to_string(),
    })
}

fn code<T>(row: &Row, column: &str, from_code: fn(i64) -> Option<T>) -> Result<T> {
    let raw = int(row, column)?;
    from_code(raw).ok_or_else(|| StorageError::BadColumn {
        column: column.to_string(),
        value: raw.to_string(),
    })
}

fn domain_group_from_row(row: &Row) -> Result<DomainGroup> {
    Ok(DomainGroup {
        id: int(row, "id")?,
        name: text(row, "name")?.to_string(),
        status: code(row, "status", GroupStatus::from_code)?,
        share_status: int(row, "share_status")?,
        ads_status: int(row, "ads_status")?,
        kind: code(row, "type", GroupKind::from_code)?,
        show_group_list: parse_id_list(text(row, "show_group_list")?),
        time: text(row, "time")?.to_string(),
        update_time: utime(row)?,
    })
}

fn domain_from_row(row: &Row) -> Result<Domain> {
    Ok(Domain {
        id: int(row, "id")?,
        group_id: int(row, "group_id")?,
        domain: text(row, "domain")?.to_string(),
        status: code(row, "status", DomainStatus::from_code)?,
        time: text(row, "time")?.to_string(),
    })
}

fn content_group_from_row(row: &Row) -> Result<ContentGroup> {
    let mut group = ContentGroup {
        id: int(row, "id")?,
        name: text(row, "name")?.to_string(),
        json_url: text(row, "json_url")?.to_string(),
        kind: code(row, "type", ContentKind::from_code)?,
        main_content: Vec::new(),
        time: text(row, "time")?.to_string(),
        update_time: utime(row)?,
    };
    group.set_main_content_text(text(row, "main_content")?);
    Ok(group)
}

fn content_item_from_row(row: &Row) -> Result<ContentItem> {
    Ok(ContentItem {
        id: int(row, "id")?,
        group_id: int(row, "group_id")?,
        value: text(row, "value")?.to_string(),
        kind: code(row, "type", ContentKind::from_code)?,
        time: text(row, "time")?.to_string(),
    })
}

/// Parse every row, skipping and logging the ones that fail
fn parse_rows<T>(rows: Vec<Row>, table: &str, parse: fn(&Row) -> Result<T>) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match parse(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(table, error = %e, "skipping unparseable row");
                None
            }
        })
        .collect()
}

fn utime(row: &Row) -> Result<i64> {
    let value = text(row, "time")?;
    chrono::NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map(|t| t.and_utc().timestamp_millis())
        .map_err(|_| StorageError::BadColumn {
            column: "time".to_string(),
            value: value.to_string(),
        })
}

fn max_utime(rows: &[Row]) -> i64 {
    rows.iter()
        .filter_map(|row| utime(row).ok())
        .max()
        .unwrap_or(0)
}

// ============================================================================
// Repository
// ============================================================================

/// Typed queries over `domain_group`, `domain`, `content_group` and `content`
#[derive(Clone)]
pub struct ControlRepository {
    rows: SharedRowStore,
}

impl ControlRepository {
    pub fn new(rows: SharedRowStore) -> Self {
        Self { rows }
    }

    /// Underlying row store
    pub fn rows(&self) -> &SharedRowStore {
        &self.rows
    }

    // ---- inserts -----------------------------------------------------------

    pub fn insert_domain_group(&self, group: &DomainGroup) -> Result<i64> {
        self.rows.insert(
            "INSERT INTO domain_group (name, status, share_status, ads_status, type, show_group_list) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                group.name.as_str().into(),
                group.status.code().into(),
                group.share_status.into(),
                group.ads_status.into(),
                group.kind.code().into(),
                group.show_group_list_text().into(),
            ],
        )
    }

    pub fn insert_domain(&self, domain: &Domain) -> Result<i64> {
        self.rows.insert(
            "INSERT INTO domain (group_id, domain, status) VALUES (?1, ?2, ?3)",
            &[
                domain.group_id.into(),
                domain.domain.as_str().into(),
                domain.status.code().into(),
            ],
        )
    }

    pub fn insert_content_group(&self, group: &ContentGroup) -> Result<i64> {
        self.rows.insert(
            "INSERT INTO content_group (name, type, main_content) VALUES (?1, ?2, ?3)",
            &[
                group.name.as_str().into(),
                group.kind.code().into(),
                group.main_content_text().into(),
            ],
        )
    }

    pub fn insert_content(&self, item: &ContentItem) -> Result<i64> {
        self.rows.insert(
            "INSERT INTO content (group_id, value, type) VALUES (?1, ?2, ?3)",
            &[
                item.group_id.into(),
                item.value.as_str().into(),
                item.kind.code().into(),
            ],
        )
    }

    // ---- domain groups -----------------------------------------------------

    /// Load one domain group
    pub fn domain_group(&self, id: i64) -> Result<DomainGroup> {
        let row = self.rows.fetch_one(
            "SELECT id, name, status, share_status, ads_status, type, show_group_list, time \
             FROM domain_group WHERE id = ?1",
            &[id.into()],
        )?;
        domain_group_from_row(&row)
    }

    /// Load every domain group with id above `max_id`, plus the new maximum id
    pub fn domain_groups_after(&self, max_id: i64) -> Result<(Vec<DomainGroup>, i64)> {
        let rows = self.rows.fetch_many(
            "SELECT id, name, status, share_status, ads_status, type, show_group_list, time \
             FROM domain_group WHERE id > ?1 ORDER BY id",
            &[max_id.into()],
        )?;
        let groups = parse_rows(rows, "domain_group", domain_group_from_row);
        let new_max = groups.iter().map(|g| g.id).max().unwrap_or(max_id).max(max_id);
        Ok((groups, new_max))
    }

    /// Load a group's domains in storage order
    pub fn domain_list(&self, group_id: i64) -> Result<DomainList> {
        let rows = self.rows.fetch_many(
            "SELECT id, group_id, domain, status, time \
             FROM domain WHERE group_id = ?1 ORDER BY id",
            &[group_id.into()],
        )?;
        let update_time = max_utime(&rows);
        Ok(DomainList {
            group_id,
            domains: parse_rows(rows, "domain", domain_from_row),
            update_time,
        })
    }

    /// Distinct literal domains currently OK, across all groups
    pub fn live_domains(&self) -> Result<Vec<String>> {
        let rows = self.rows.fetch_many(
            "SELECT domain FROM domain WHERE status = ?1 GROUP BY domain ORDER BY domain",
            &[DomainStatus::Ok.code().into()],
        )?;
        rows.iter()
            .map(|row| text(row, "domain").map(str::to_string))
            .collect()
    }

    pub fn update_domain_status(&self, id: i64, status: DomainStatus) -> Result<usize> {
        self.rows.execute(
            "UPDATE domain SET status = ?1 WHERE id = ?2",
            &[status.code().into(), id.into()],
        )
    }

    /// Set the status of every row carrying this literal domain
    pub fn update_domains_status(&self, domain: &str, status: DomainStatus) -> Result<usize> {
        self.rows.execute(
            "UPDATE domain SET status = ?1 WHERE domain = ?2",
            &[status.code().into(), domain.into()],
        )
    }

    /// Write a group's status and toggle flags
    pub fn update_domain_group_status(&self, group: &DomainGroup) -> Result<usize> {
        self.rows.execute(
            "UPDATE domain_group SET status = ?1, share_status = ?2, ads_status = ?3 WHERE id = ?4",
            &[
                group.status.code().into(),
                group.share_status.into(),
                group.ads_status.into(),
                group.id.into(),
            ],
        )
    }

    // ---- content groups ----------------------------------------------------

    /// Load one content group
    pub fn content_group(&self, id: i64) -> Result<ContentGroup> {
        let row = self.rows.fetch_one(
            "SELECT id, name, json_url, type, main_content, time \
             FROM content_group WHERE id = ?1",
            &[id.into()],
        )?;
        content_group_from_row(&row)
    }

    /// Load every content group with id above `max_id`, plus the new maximum id
    pub fn content_groups_after(&self, max_id: i64) -> Result<(Vec<ContentGroup>, i64)> {
        let rows = self.rows.fetch_many(
            "SELECT id, name, json_url, type, main_content, time \
             FROM content_group WHERE id > ?1 ORDER BY id",
            &[max_id.into()],
        )?;
        let groups = parse_rows(rows, "content_group", content_group_from_row);
        let new_max = groups.iter().map(|g| g.id).max().unwrap_or(max_id).max(max_id);
        Ok((groups, new_max))
    }

    /// Load a group's content items in storage order
    pub fn content_list(&self, group_id: i64) -> Result<ContentList> {
        let rows = self.rows.fetch_many(
            "SELECT id, group_id, value, type, time \
             FROM content WHERE group_id = ?1 ORDER BY id",
            &[group_id.into()],
        )?;
        let update_time = max_utime(&rows);
        Ok(ContentList {
            group_id,
            items: parse_rows(rows, "content", content_item_from_row),
            update_time,
        })
    }

    /// Record where a group's bundle was published
    pub fn update_content_json_url(&self, id: i64, url: &str) -> Result<usize> {
        self.rows.execute(
            "UPDATE content_group SET json_url = ?1 WHERE id = ?2",
            &[SqlArg::from(url), id.into()],
        )
    }
}
