//! # 消费者实例标识
//!
//! 进程内唯一的实例名称由进程号与单调递增序号组成。
//! 序号 `INDEX` 与首次解析后固定的 `PID` 为进程级全局状态。

use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};
use tracing::warn;

static INDEX: AtomicU64 = AtomicU64::new(0);
static PID: OnceLock<i64> = OnceLock::new();

/// 形如 `pid@host` 的运行时信息
pub fn runtime_info() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_owned());
    format!("{}@{host}", std::process::id())
}

/// 从 `pid@host` 中解析进程号，无法解析时返回 `None`
pub fn parse_pid(info: &str) -> Option<i64> {
    match info.find('@') {
        Some(idx) if idx > 0 => info[..idx].parse().ok(),
        _ => None,
    }
}

/// 当前进程号，解析失败时以随机数代替；首次解析后固定不变
pub fn pid() -> i64 {
    *PID.get_or_init(|| resolve_pid(&runtime_info()))
}

fn resolve_pid(info: &str) -> i64 {
    match parse_pid(info) {
        Some(pid) => pid,
        None => {
            let pid = i64::from(rand::random::<i32>());
            warn!("解析进程号失败：'{info}'，以随机数 {pid} 代替");
            pid
        }
    }
}

/// 生成进程内唯一的实例名称
pub fn unique_instance_name() -> String {
    let index = INDEX.fetch_add(1, Ordering::SeqCst) + 1;
    format!("pid{}_index{index}", pid())
}
