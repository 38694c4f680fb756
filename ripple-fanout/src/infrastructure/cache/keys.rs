//! 缓存键命名空间
//!
//! 键只编码“命名空间 + 主体 ID”，不与持久化数据建立外键关系

/// 用户资料：`user:{id}`
pub fn user_profile(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// 信息流分页：`feed:{userId}:{tab}:{page}`
pub fn feed_page(user_id: &str, tab: &str, page: u32) -> String {
    format!("feed:{user_id}:{tab}:{page}")
}

/// 某个用户所有信息流分页的匹配模式
pub fn feed_pattern(user_id: &str) -> String {
    format!("feed:{}:*", escape_glob(user_id))
}

/// 热门话题快照
pub fn trending_hashtags() -> String {
    "trending:hashtags".to_string()
}

/// 未读通知计数：`notification:unread:{userId}`
pub fn unread_count(user_id: &str) -> String {
    format!("notification:unread:{user_id}")
}

/// 刷新令牌存活标记：`session:{userId}:{tokenId}`
pub fn session(user_id: &str, token_id: &str) -> String {
    format!("session:{user_id}:{token_id}")
}

/// 某个用户全部会话标记的匹配模式
pub fn session_pattern(user_id: &str) -> String {
    format!("session:{}:*", escape_glob(user_id))
}

/// 转义 glob 元字符，ID 中的 `*` / `?` / `[` 只匹配自身
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 不可变参考内容：`ref:{namespace}:{id}`
pub fn reference_content(namespace: &str, id: &str) -> String {
    format!("ref:{namespace}:{id}")
}

/// 直播间当前观看人数：`stream:viewers:{streamId}`
pub fn stream_viewers(stream_id: &str) -> String {
    format!("stream:viewers:{stream_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(user_profile("42"), "user:42");
        assert_eq!(feed_page("42", "home", 2), "feed:42:home:2");
        assert_eq!(feed_pattern("42"), "feed:42:*");
        assert_eq!(unread_count("42"), "notification:unread:42");
        assert_eq!(session("42", "t1"), "session:42:t1");
        assert_eq!(reference_content("quran", "2:255"), "ref:quran:2:255");
    }

    #[test]
    fn test_patterns_escape_glob_metacharacters() {
        use crate::infrastructure::cache::memory_store::glob_match;

        assert_eq!(feed_pattern("4*"), r"feed:4\*:*");
        assert_eq!(session_pattern("a?[b]"), r"session:a\?\[b\]:*");
        assert_eq!(escape_glob(r"x\y"), r"x\\y");

        assert!(!glob_match(&feed_pattern("4*"), &feed_page("42", "home", 1)));
        assert!(glob_match(&feed_pattern("4*"), &feed_page("4*", "home", 1)));
        assert!(!glob_match(&session_pattern("?"), &session("7", "t1")));
        assert!(glob_match(&session_pattern("42"), &session("42", "t1")));
    }
}
