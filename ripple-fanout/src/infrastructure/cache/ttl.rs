//! 缓存 TTL 策略表
//!
//! 所有写入都必须带 TTL；调用方按数据类别取值，不在调用点硬编码秒数

use std::time::Duration;

use ripple_core::config::CacheTtlSection;

/// 缓存数据类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    Profile,
    FeedPage,
    Trending,
    UnreadCount,
    Session,
    ReferenceContent,
    StreamViewers,
}

#[derive(Debug, Clone)]
pub struct CacheTtlPolicy {
    pub profile: Duration,
    pub feed_page: Duration,
    pub trending: Duration,
    pub unread_count: Duration,
    pub session: Duration,
    pub reference_content: Duration,
    pub stream_viewers: Duration,
}

const MINUTE: u64 = 60;
const DAY: u64 = 24 * 60 * MINUTE;

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self {
            profile: Duration::from_secs(5 * MINUTE),
            feed_page: Duration::from_secs(MINUTE),
            trending: Duration::from_secs(10 * MINUTE),
            unread_count: Duration::from_secs(5 * MINUTE),
            session: Duration::from_secs(7 * DAY),
            reference_content: Duration::from_secs(7 * DAY),
            stream_viewers: Duration::from_secs(30),
        }
    }
}

impl CacheTtlPolicy {
    /// 从配置覆盖默认值（0 秒视为未配置）
    pub fn from_config(section: &CacheTtlSection) -> Self {
        let defaults = Self::default();
        let pick = |value: Option<u64>, default: Duration| {
            value
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        Self {
            profile: pick(section.profile_seconds, defaults.profile),
            feed_page: pick(section.feed_seconds, defaults.feed_page),
            trending: pick(section.trending_seconds, defaults.trending),
            unread_count: pick(section.unread_seconds, defaults.unread_count),
            session: pick(section.session_seconds, defaults.session),
            reference_content: pick(section.reference_seconds, defaults.reference_content),
            stream_viewers: pick(section.stream_viewers_seconds, defaults.stream_viewers),
        }
    }

    pub fn ttl(&self, class: CacheTtl) -> Duration {
        match class {
            CacheTtl::Profile => self.profile,
            CacheTtl::FeedPage => self.feed_page,
            CacheTtl::Trending => self.trending,
            CacheTtl::UnreadCount => self.unread_count,
            CacheTtl::Session => self.session,
            CacheTtl::ReferenceContent => self.reference_content,
            CacheTtl::StreamViewers => self.stream_viewers,
        }
    }
}
