//! # Prometheus 指标收集模块
//!
//! 为扇出子系统提供统一的 Prometheus 指标收集能力。

use std::sync::Arc;

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 注册到 [`REGISTRY`] 的进程级指标，只创建一次
static GLOBAL: Lazy<Arc<FanoutMetrics>> = Lazy::new(|| {
    let metrics = FanoutMetrics::new();
    if let Err(err) = metrics.register(&REGISTRY) {
        tracing::warn!(error = %err, "Failed to register fanout metrics");
    }
    Arc::new(metrics)
});

/// 扇出子系统指标
#[derive(Clone)]
pub struct FanoutMetrics {
    /// 通知创建总数（按类型）
    pub notifications_created_total: IntCounterVec,
    /// 被去重策略抑制的通知总数（按类型）
    pub notifications_suppressed_total: IntCounterVec,
    /// 实时推送结果（delivered / skipped）
    pub realtime_publish_total: IntCounterVec,
    /// 浏览器推送结果（delivered / gone / failed / timeout）
    pub push_delivery_total: IntCounterVec,
    /// 缓存降级操作次数（按操作）
    pub cache_degraded_total: IntCounterVec,
}

impl FanoutMetrics {
    /// 进程级共享实例（已注册到全局注册表）
    pub fn global() -> Arc<FanoutMetrics> {
        Arc::clone(&GLOBAL)
    }

    /// 未注册的独立实例，测试和嵌入场景使用
    pub fn new() -> Self {
        let notifications_created_total = IntCounterVec::new(
            Opts::new(
                "ripple_notifications_created_total",
                "Total number of notifications persisted",
            ),
            &["type"],
        )
        .expect("Failed to create ripple_notifications_created_total metric");

        let notifications_suppressed_total = IntCounterVec::new(
            Opts::new(
                "ripple_notifications_suppressed_total",
                "Total number of notifications suppressed as duplicates",
            ),
            &["type"],
        )
        .expect("Failed to create ripple_notifications_suppressed_total metric");

        let realtime_publish_total = IntCounterVec::new(
            Opts::new(
                "ripple_realtime_publish_total",
                "Total number of realtime publish attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("Failed to create ripple_realtime_publish_total metric");

        let push_delivery_total = IntCounterVec::new(
            Opts::new(
                "ripple_push_delivery_total",
                "Total number of push deliveries by outcome",
            ),
            &["outcome"],
        )
        .expect("Failed to create ripple_push_delivery_total metric");

        let cache_degraded_total = IntCounterVec::new(
            Opts::new(
                "ripple_cache_degraded_total",
                "Total number of cache operations served in degraded mode",
            ),
            &["operation"],
        )
        .expect("Failed to create ripple_cache_degraded_total metric");

        Self {
            notifications_created_total,
            notifications_suppressed_total,
            realtime_publish_total,
            push_delivery_total,
            cache_degraded_total,
        }
    }
}

impl FanoutMetrics {
    /// 把全部指标注册到给定注册表；任一指标注册失败即返回错误
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        let collectors: [Box<dyn Collector>; 5] = [
            Box::new(self.notifications_created_total.clone()),
            Box::new(self.notifications_suppressed_total.clone()),
            Box::new(self.realtime_publish_total.clone()),
            Box::new(self.push_delivery_total.clone()),
            Box::new(self.cache_degraded_total.clone()),
        ];
        for collector in collectors {
            registry.register(collector)?;
        }
        Ok(())
    }
}

impl Default for FanoutMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 以 Prometheus 文本格式导出全局注册表
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %err, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_metrics_are_shared_and_exported() {
        let first = FanoutMetrics::global();
        let second = FanoutMetrics::global();
        assert!(Arc::ptr_eq(&first, &second));

        let before = second
            .notifications_created_total
            .with_label_values(&["like"])
            .get();
        first
            .notifications_created_total
            .with_label_values(&["like"])
            .inc();
        assert_eq!(
            second
                .notifications_created_total
                .with_label_values(&["like"])
                .get(),
            before + 1
        );

        let text = encode_metrics();
        assert!(text.contains("ripple_notifications_created_total"));
        assert!(text.contains("ripple_notifications_created_total{type=\"like\"}"));
    }

    #[test]
    fn test_duplicate_registration_is_reported() {
        let registry = Registry::new();
        FanoutMetrics::new().register(&registry).unwrap();

        let err = FanoutMetrics::new().register(&registry).unwrap_err();
        assert!(matches!(err, prometheus::Error::AlreadyReg));
    }

    #[test]
    fn test_isolated_instance_does_not_touch_global_counters() {
        let isolated = FanoutMetrics::new();
        isolated.cache_degraded_total.with_label_values(&["isolated_only"]).inc();

        assert!(!encode_metrics().contains("isolated_only"));
    }
}
