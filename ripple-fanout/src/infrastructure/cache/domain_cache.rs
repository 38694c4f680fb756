//! 各业务域的缓存读写入口
//!
//! 键名来自 `keys`，TTL 来自 `CacheTtlPolicy`，调用点不出现字面量

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CacheLayer, CacheTtl, keys};
use crate::domain::model::SenderProfile;

/// 会话标记的值，只表示“存活”
const SESSION_LIVE: &str = "1";

impl CacheLayer {
    pub async fn get_cached_feed_page<T: DeserializeOwned>(
        &self,
        user_id: &str,
        tab: &str,
        page: u32,
    ) -> Option<T> {
        self.get_json(&keys::feed_page(user_id, tab, page)).await
    }

    pub async fn cache_feed_page<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        tab: &str,
        page: u32,
        data: &T,
    ) {
        self.set_json_with_policy(&keys::feed_page(user_id, tab, page), data, CacheTtl::FeedPage)
            .await;
    }

    /// 用户发帖 / 关注关系变化后清空其所有信息流分页
    pub async fn invalidate_user_feeds(&self, user_id: &str) -> u64 {
        self.delete_by_prefix(&keys::feed_pattern(user_id)).await
    }

    pub async fn get_cached_profile(&self, user_id: &str) -> Option<SenderProfile> {
        self.get_json(&keys::user_profile(user_id)).await
    }

    pub async fn cache_profile(&self, profile: &SenderProfile) {
        self.set_json_with_policy(&keys::user_profile(&profile.id), profile, CacheTtl::Profile)
            .await;
    }

    pub async fn invalidate_profile(&self, user_id: &str) {
        self.delete(&keys::user_profile(user_id)).await;
    }

    pub async fn get_trending_hashtags<T: DeserializeOwned>(&self) -> Option<T> {
        self.get_json(&keys::trending_hashtags()).await
    }

    pub async fn cache_trending_hashtags<T: Serialize + ?Sized>(&self, snapshot: &T) {
        self.set_json_with_policy(&keys::trending_hashtags(), snapshot, CacheTtl::Trending)
            .await;
    }

    pub async fn mark_session_live(&self, user_id: &str, token_id: &str) {
        self.set_with_policy(&keys::session(user_id, token_id), SESSION_LIVE, CacheTtl::Session)
            .await;
    }

    /// 缓存不可用时返回 false，调用方应回退到持久化的令牌记录
    pub async fn is_session_live(&self, user_id: &str, token_id: &str) -> bool {
        self.get(&keys::session(user_id, token_id)).await.is_some()
    }

    pub async fn revoke_session(&self, user_id: &str, token_id: &str) {
        self.delete(&keys::session(user_id, token_id)).await;
    }

    pub async fn revoke_all_sessions(&self, user_id: &str) -> u64 {
        self.delete_by_prefix(&keys::session_pattern(user_id)).await
    }

    pub async fn get_reference_content(&self, namespace: &str, id: &str) -> Option<String> {
        self.get(&keys::reference_content(namespace, id)).await
    }

    pub async fn cache_reference_content(&self, namespace: &str, id: &str, content: &str) {
        self.set_with_policy(
            &keys::reference_content(namespace, id),
            content,
            CacheTtl::ReferenceContent,
        )
        .await;
    }
}
