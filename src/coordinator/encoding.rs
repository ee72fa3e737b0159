//! Outbound URL rewriting for partner groups

use std::collections::HashSet;

const BAIDU_LOOP: &str = "http://xbox.m.baidu.com/app/share/loop?";
const ZHIHU_LINK: &str = "http://link.zhihu.com/?target=http://";

/// Wrap a domain in Baidu's share-loop launcher
pub fn baidu_encoding(domain: &str) -> String {
    let command = format!(r#"{{"browser":"main","url":"http://{domain}","mode":"2"}}"#);
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("command", &command)
        .finish();
    format!("{BAIDU_LOOP}{query}")
}

/// Wrap a domain in Zhihu's outbound link redirector
pub fn zhihu_encoding(domain: &str) -> String {
    format!("{ZHIHU_LINK}{domain}")
}

/// Which domain groups get their selected domains rewritten, and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerRules {
    enabled: bool,
    baidu: HashSet<i64>,
    zhihu: HashSet<i64>,
}

impl PartnerRules {
    pub fn new(enabled: bool, baidu: HashSet<i64>, zhihu: HashSet<i64>) -> Self {
        Self {
            enabled,
            baidu,
            zhihu,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Rewrite `domain` for `group_id`. Baidu membership is checked first;
    /// groups in neither set, or any group while disabled, pass through.
    pub fn rewrite(&self, group_id: i64, domain: &str) -> String {
        if !self.enabled {
            return domain.to_string();
        }
        if self.baidu.contains(&group_id) {
            baidu_encoding(domain)
        } else if self.zhihu.contains(&group_id) {
            zhihu_encoding(domain)
        } else {
            domain.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(enabled: bool) -> PartnerRules {
        PartnerRules::new(enabled, HashSet::from([1, 3]), HashSet::from([2, 3]))
    }

    #[test]
    fn test_baidu_encoding() {
        assert_eq!(
            baidu_encoding("a.example"),
            "http://xbox.m.baidu.com/app/share/loop?command=%7B%22browser%22%3A%22main%22%2C%22url%22%3A%22http%3A%2F%2Fa.example%22%2C%22mode%22%3A%222%22%7D"
        );
    }

    #[test]
    fn test_zhihu_encoding() {
        assert_eq!(
            zhihu_encoding("a.example"),
            "http://link.zhihu.com/?target=http://a.example"
        );
    }

    #[test]
    fn test_baidu_wins_over_zhihu() {
        let out = rules(true).rewrite(3, "a.example");
        assert!(out.starts_with(BAIDU_LOOP));
        assert!(out.contains("a.example"));
    }

    #[test]
    fn test_rewrite_by_membership() {
        let rules = rules(true);
        assert!(rules.rewrite(1, "a.example").starts_with(BAIDU_LOOP));
        assert_eq!(
            rules.rewrite(2, "a.example"),
            "http://link.zhihu.com/?target=http://a.example"
        );
        assert_eq!(rules.rewrite(9, "a.example"), "a.example");
    }

    #[test]
    fn test_disabled_passes_through() {
        assert_eq!(rules(false).rewrite(1, "a.example"), "a.example");
    }
}
