//! 查询结构体定义（Query DTO）

use serde::{Deserialize, Serialize};

/// 分页查询通知（页码从 1 开始）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNotificationsQuery {
    pub user_id: String,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountQuery {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerCountQuery {
    pub stream_id: String,
}

/// 查询用户的推送订阅（含已停用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub user_id: String,
}
