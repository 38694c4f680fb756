use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::model::{NotificationType, SenderProfile};
use crate::domain::repository::{TargetResolver, UserDirectory};
use crate::error::Result;

/// 内存中的用户资料表
#[derive(Default)]
pub struct StaticUserDirectory {
    profiles: RwLock<HashMap<String, SenderProfile>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: SenderProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn profile(&self, user_id: &str) -> Result<Option<SenderProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }
}

/// 内存中的目标摘要表（target_ref -> 文本）
#[derive(Default)]
pub struct StaticTargetResolver {
    excerpts: RwLock<HashMap<String, String>>,
}

impl StaticTargetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, target_ref: impl Into<String>, text: impl Into<String>) {
        self.excerpts
            .write()
            .await
            .insert(target_ref.into(), text.into());
    }
}

#[async_trait]
impl TargetResolver for StaticTargetResolver {
    async fn excerpt(&self, _kind: NotificationType, target_ref: &str) -> Result<Option<String>> {
        Ok(self.excerpts.read().await.get(target_ref).cloned())
    }
}
