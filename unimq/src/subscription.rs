//! # 订阅表达式
//!
//! 标签过滤表达式：`*` 或空串订阅全部消息，`TagA || TagB` 订阅其中任一标签。

use crate::errors::ConsumerError;
use std::{collections::HashSet, fmt};

const SUB_ALL: &str = "*";

/// 标签过滤表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionExpr {
    /// 订阅全部
    All,
    /// 订阅指定标签
    Tags(HashSet<String>),
}

impl SubscriptionExpr {
    /// 解析标签过滤表达式
    pub fn parse(expr: &str) -> Result<Self, ConsumerError> {
        let expr = expr.trim();
        if expr.is_empty() || expr == SUB_ALL {
            return Ok(SubscriptionExpr::All);
        }

        let mut tags = HashSet::new();
        for tag in expr.split("||") {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(ConsumerError::InvalidConfig(format!(
                    "标签过滤表达式'{expr}'存在空标签"
                )));
            }
            tags.insert(tag.to_owned());
        }
        Ok(SubscriptionExpr::Tags(tags))
    }

    /// 判断消息标签是否匹配
    pub fn matches(&self, tags: Option<&str>) -> bool {
        match self {
            SubscriptionExpr::All => true,
            SubscriptionExpr::Tags(set) => tags.is_some_and(|t| set.contains(t)),
        }
    }
}

impl fmt::Display for SubscriptionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionExpr::All => f.write_str(SUB_ALL),
            SubscriptionExpr::Tags(set) => {
                let mut tags: Vec<&str> = set.iter().map(String::as_str).collect();
                tags.sort_unstable();
                f.write_str(&tags.join(" || "))
            }
        }
    }
}

/// 单个主题的订阅
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// 主题
    pub topic: String,
    /// 标签过滤表达式
    pub expr: SubscriptionExpr,
}

impl Subscription {
    /// 判断消息是否属于本订阅
    pub fn accepts(&self, topic: &str, tags: Option<&str>) -> bool {
        self.topic == topic && self.expr.matches(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        for expr in ["*", "", "  * "] {
            let expr = SubscriptionExpr::parse(expr).unwrap();
            assert_eq!(expr, SubscriptionExpr::All);
            assert!(expr.matches(Some("TagA")));
            assert!(expr.matches(None));
        }
    }

    #[test]
    fn tag_list_matches_listed_tags_only() {
        let expr = SubscriptionExpr::parse("TagA || TagB").unwrap();
        assert!(expr.matches(Some("TagA")));
        assert!(expr.matches(Some("TagB")));
        assert!(!expr.matches(Some("TagC")));
        assert!(!expr.matches(None));
        assert_eq!(expr.to_string(), "TagA || TagB");
    }

    #[test]
    fn empty_alternative_rejected() {
        let err = SubscriptionExpr::parse("TagA || ").unwrap_err();
        assert!(matches!(err, ConsumerError::InvalidConfig(_)));
    }

    #[test]
    fn subscription_checks_topic() {
        let sub = Subscription {
            topic: "order".to_owned(),
            expr: SubscriptionExpr::parse("paid").unwrap(),
        };
        assert!(sub.accepts("order", Some("paid")));
        assert!(!sub.accepts("refund", Some("paid")));
    }
}
