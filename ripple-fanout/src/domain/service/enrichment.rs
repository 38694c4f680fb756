//! 通知富化：补充发送者资料与目标摘要

use std::sync::Arc;

use tracing::warn;

use crate::domain::model::{EnrichedNotification, Notification};
use crate::domain::repository::{TargetResolver, UserDirectory};

/// 目标摘要的最大字符数
pub const EXCERPT_MAX_CHARS: usize = 140;

pub struct NotificationEnricher {
    users: Arc<dyn UserDirectory>,
    targets: Arc<dyn TargetResolver>,
}

impl NotificationEnricher {
    pub fn new(users: Arc<dyn UserDirectory>, targets: Arc<dyn TargetResolver>) -> Self {
        Self { users, targets }
    }

    /// 查询失败只记录日志，对应字段留空
    pub async fn enrich(&self, notification: Notification) -> EnrichedNotification {
        let sender = match notification.sender_id.as_deref() {
            Some(sender_id) => match self.users.profile(sender_id).await {
                Ok(profile) => profile,
                Err(err) => {
                    warn!(sender_id = %sender_id, error = %err, "Failed to load sender profile");
                    None
                }
            },
            None => None,
        };

        let target_excerpt = match notification.target_ref.as_deref() {
            Some(target_ref) => match self.targets.excerpt(notification.kind, target_ref).await {
                Ok(text) => text.map(|text| excerpt(&text)),
                Err(err) => {
                    warn!(target_ref = %target_ref, error = %err, "Failed to resolve target excerpt");
                    None
                }
            },
            None => None,
        };

        EnrichedNotification {
            notification,
            sender,
            target_excerpt,
        }
    }
}

/// 按字符截断，超长时以省略号结尾
pub fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(EXCERPT_MAX_CHARS - 1).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("  short post "), "short post");

        let long = "é".repeat(200);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_MAX_CHARS);
        assert!(cut.ends_with('…'));
    }
}
