#![allow(dead_code)]

use std::{path::PathBuf, sync::LazyLock};
use tracing::{Level, info};
use tracing_subscriber::fmt;
use unimq::config::build_config;

pub(crate) static CFG: LazyLock<config::Config> = LazyLock::new(|| {
    init();
    build_config(PathBuf::from(env!("CARGO_MANIFEST_DIR"))).expect("加载配置失败")
});

static TRACING: LazyLock<()> = LazyLock::new(|| {
    fmt().with_test_writer().with_max_level(Level::DEBUG).init();
    info!("启用 {} 测试日志输出", Level::DEBUG);
});

pub(crate) fn init() {
    LazyLock::force(&TRACING);
}
