// Core data structures for the rotation engine

use serde::{Deserialize, Serialize};

use crate::utils::{join_id_list, parse_id_list};

/// Defines a fieldless enum stored as an integer code in SQL and JSON.
macro_rules! int_code_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "i64", try_from = "i64")]
        pub enum $name { $( $(#[$vmeta])* $variant ),+ }

        impl $name {
            /// Create from the stored integer code
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Integer code as stored
            pub fn code(&self) -> i64 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> i64 {
                value.code()
            }
        }

        impl TryFrom<i64> for $name {
            type Error = String;

            fn try_from(code: i64) -> Result<Self, Self::Error> {
                Self::from_code(code)
                    .ok_or_else(|| format!("invalid {} code: {code}", stringify!($name)))
            }
        }
    };
}

int_code_enum! {
    /// Lifecycle status of a domain group
    #[derive(Default)]
    pub enum GroupStatus {
        #[default]
        Ok = 0,
        Down = 1,
        Off = 2,
    }
}

int_code_enum! {
    /// Per-domain status. A probe only ever moves OK to DOWN.
    #[derive(Default)]
    pub enum DomainStatus {
        #[default]
        Ok = 0,
        Down = 1,
    }
}

int_code_enum! {
    /// Role of a domain group in rotation
    #[derive(Default)]
    pub enum GroupKind {
        #[default]
        Show = 0,
        Jump = 1,
    }
}

int_code_enum! {
    /// Payload shape of a content group's items
    #[derive(Default)]
    pub enum ContentKind {
        #[default]
        Video = 0,
    }
}

/// A named set of interchangeable domains served as one rotation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DomainGroup {
    pub id: i64,
    pub name: String,
    pub status: GroupStatus,
    /// 0 = force sharing on
    pub share_status: i64,
    /// 0 = ads shown
    pub ads_status: i64,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    /// SHOW groups a JUMP group may redirect into, in order
    pub show_group_list: Vec<i64>,
    pub time: String,
    pub update_time: i64,
}

impl DomainGroup {
    pub fn is_ok(&self) -> bool {
        self.status == GroupStatus::Ok
    }

    pub fn is_jump(&self) -> bool {
        self.kind == GroupKind::Jump
    }

    pub fn force_share(&self) -> bool {
        self.share_status == 0
    }

    pub fn show_ads(&self) -> bool {
        self.ads_status == 0
    }

    /// Stored form of `show_group_list`
    pub fn show_group_list_text(&self) -> String {
        join_id_list(&self.show_group_list)
    }
}

/// One literal domain in a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Domain {
    pub id: i64,
    #[serde(rename = "groupID")]
    pub group_id: i64,
    pub domain: String,
    pub status: DomainStatus,
    pub time: String,
}

impl Domain {
    pub fn is_ok(&self) -> bool {
        self.status == DomainStatus::Ok
    }
}

/// A group's domains plus the newest row timestamp among them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DomainList {
    #[serde(rename = "groupID")]
    pub group_id: i64,
    #[serde(rename = "domainList")]
    pub domains: Vec<Domain>,
    #[serde(rename = "updateTime")]
    pub update_time: i64,
}

/// The answer to a domain selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedDomain {
    pub id: i64,
    #[serde(rename = "groupID")]
    pub group_id: i64,
    /// Possibly rewritten through a partner wrapper
    pub domain: String,
    pub status: DomainStatus,
    /// Next-hop SHOW group for JUMP selections, 0 otherwise
    #[serde(rename = "showGroupID")]
    pub show_group_id: i64,
    pub time: String,
}

/// A named set of content items published as one JSON bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentGroup {
    pub id: i64,
    pub name: String,
    pub json_url: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Item ids pinned to the front of the bundle, in order
    pub main_content: Vec<i64>,
    pub time: String,
    pub update_time: i64,
}

impl ContentGroup {
    /// Stored form of `main_content`
    pub fn main_content_text(&self) -> String {
        join_id_list(&self.main_content)
    }

    /// Object key the bundle is uploaded under
    pub fn bundle_key(&self) -> String {
        format!("{}.json", self.name)
    }

    pub(crate) fn set_main_content_text(&mut self, text: &str) {
        self.main_content = parse_id_list(text);
    }
}

/// A single content row; `value` is the opaque JSON payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContentItem {
    pub id: i64,
    #[serde(rename = "groupID")]
    pub group_id: i64,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub time: String,
}

/// A group's items plus the newest row timestamp among them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContentList {
    #[serde(rename = "groupID")]
    pub group_id: i64,
    #[serde(rename = "contentList")]
    pub items: Vec<ContentItem>,
    #[serde(rename = "updateTime")]
    pub update_time: i64,
}

/// Decoded payload of a VIDEO content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Video {
    pub content: String,
    pub id: i64,
    pub title: String,
    pub video_src: String,
    pub image_url: String,
    pub title_img: String,
    /// 0 = normal, 1 = ads
    #[serde(rename = "type")]
    pub kind: i64,
}

/// The answer to a content selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedContent {
    #[serde(rename = "contentGroupID")]
    pub content_group_id: i64,
    pub content_url: String,
    #[serde(rename = "ifOffLine")]
    pub offline: bool,
    #[serde(rename = "ifForceShare")]
    pub force_share: bool,
    #[serde(rename = "ifShowAds")]
    pub show_ads: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip_as_integers() {
        let json = serde_json::to_string(&GroupStatus::Off).unwrap();
        assert_eq!(json, "2");
        let status: DomainStatus = serde_json::from_str("1").unwrap();
        assert_eq!(status, DomainStatus::Down);
        assert!(serde_json::from_str::<DomainStatus>("2").is_err());
    }

    #[test]
    fn test_domain_group_wire_names() {
        let group: DomainGroup = serde_json::from_str(
            r#"{"id":4,"name":"jump","type":1,"shareStatus":1,"showGroupList":[2,3]}"#,
        )
        .unwrap();
        assert!(group.is_jump());
        assert!(!group.force_share());
        assert!(group.show_ads());
        assert_eq!(group.show_group_list_text(), "2,3");
    }

    #[test]
    fn test_selected_content_wire_names() {
        let value = serde_json::to_value(SelectedContent {
            content_group_id: 9,
            content_url: "http://cdn/x.json".into(),
            offline: false,
            force_share: true,
            show_ads: true,
        })
        .unwrap();
        assert_eq!(value["contentGroupID"], 9);
        assert_eq!(value["ifOffLine"], false);
        assert_eq!(value["ifForceShare"], true);
    }

    #[test]
    fn test_bundle_key() {
        let group = ContentGroup {
            name: "summer".into(),
            ..Default::default()
        };
        assert_eq!(group.bundle_key(), "summer.json");
    }
}
