//! 服务模块 - 依赖组装

pub mod wire;

pub use wire::{ApplicationContext, FanoutDependencies, FanoutSettings, assemble, initialize};
