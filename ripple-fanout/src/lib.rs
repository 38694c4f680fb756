//! Ripple 实时互动扇出服务
//!
//! 把点赞、关注、回复、提及、转发与直播事件转换为：持久化通知、
//! 在线客户端的实时推送、离线客户端的浏览器推送，以及由缓存加速的计数。

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;

pub use config::FanoutConfig;
pub use error::{FanoutError, Result};
