//! # 消费结果处置
//!
//! 将批次的消费状态换算为提交、延迟重投、暂停重投或转入死信。

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Duration;
use unimq::message::ConsumeStatus;

/// 延迟级别表，级别 `n` 对应下标 `n - 1`
pub const DELAY_LEVELS: [Duration; 18] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(2 * 60),
    Duration::from_secs(3 * 60),
    Duration::from_secs(4 * 60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(6 * 60),
    Duration::from_secs(7 * 60),
    Duration::from_secs(8 * 60),
    Duration::from_secs(9 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(20 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(2 * 60 * 60),
];

/// 并发消费默认最大重新消费次数
pub const DEFAULT_MAX_RECONSUME_TIMES: i32 = 16;

/// 顺序消费默认暂停时长
pub const DEFAULT_SUSPEND: Duration = Duration::from_millis(1000);

/// 批次处置动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 提交偏移量
    Commit,
    /// 转入死信主题后提交偏移量
    DeadLetter,
    /// 转入重试主题，等待后重新投递
    Retry(Duration),
    /// 暂停队列后重新投递
    Suspend(Duration),
}

/// 延迟级别对应的时长
///
/// 级别 0 取 `3 + reconsume_times`，超出范围时截断到表的两端。
pub fn delay_of(delay_level: i32, reconsume_times: i32) -> Duration {
    let level = match delay_level {
        0 => reconsume_times.saturating_add(3),
        level => level,
    };
    let index = level.clamp(1, DELAY_LEVELS.len() as i32) as usize - 1;
    DELAY_LEVELS[index]
}

/// 当前毫秒时间戳
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// 由消费状态决定处置动作
///
/// `reconsume_times` 为批次内消息已重新消费的最大次数；`max_reconsume_times` 为 -1 时，
/// 并发消费取 [`DEFAULT_MAX_RECONSUME_TIMES`]，顺序消费不设上限。
pub fn decide(status: ConsumeStatus, reconsume_times: i32, max_reconsume_times: i32) -> Action {
    match status {
        ConsumeStatus::ConsumeSuccess | ConsumeStatus::Success => Action::Commit,
        ConsumeStatus::ReconsumeLater { delay_level } if delay_level < 0 => Action::DeadLetter,
        ConsumeStatus::ReconsumeLater { delay_level } => {
            let max = match max_reconsume_times {
                -1 => DEFAULT_MAX_RECONSUME_TIMES,
                max => max,
            };
            if reconsume_times >= max {
                Action::DeadLetter
            } else {
                Action::Retry(delay_of(delay_level, reconsume_times))
            }
        }
        ConsumeStatus::SuspendQueue { suspend_millis } => {
            if max_reconsume_times >= 0 && reconsume_times >= max_reconsume_times {
                return Action::DeadLetter;
            }
            match suspend_millis {
                -1 => Action::Suspend(DEFAULT_SUSPEND),
                ms => Action::Suspend(Duration::from_millis(ms.max(0) as u64)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(1, 0, 1)]
    #[case(3, 7, 10)]
    #[case(18, 0, 2 * 60 * 60)]
    #[case(25, 0, 2 * 60 * 60)]
    #[case(0, 0, 10)]
    #[case(0, 2, 60)]
    #[case(0, 40, 2 * 60 * 60)]
    fn delay_level_table(#[case] level: i32, #[case] times: i32, #[case] secs: u64) {
        assert_eq!(delay_of(level, times), Duration::from_secs(secs));
    }

    #[rstest]
    #[case(ConsumeStatus::ConsumeSuccess)]
    #[case(ConsumeStatus::Success)]
    fn success_commits(#[case] status: ConsumeStatus) {
        assert_eq!(decide(status, 99, 1), Action::Commit);
    }

    #[test]
    fn negative_level_dead_letters_at_once() {
        let status = ConsumeStatus::ReconsumeLater { delay_level: -1 };
        assert_eq!(decide(status, 0, -1), Action::DeadLetter);
    }

    #[test]
    fn reconsume_later_bounded_by_default_max() {
        let status = ConsumeStatus::ReconsumeLater { delay_level: 2 };
        assert_eq!(decide(status, 15, -1), Action::Retry(Duration::from_secs(5)));
        assert_eq!(decide(status, 16, -1), Action::DeadLetter);
        assert_eq!(decide(status, 3, 3), Action::DeadLetter);
        assert_eq!(decide(status, 2, 3), Action::Retry(Duration::from_secs(5)));
    }

    #[test]
    fn suspend_unbounded_unless_configured() {
        let status = ConsumeStatus::SuspendQueue { suspend_millis: -1 };
        assert_eq!(decide(status, 1000, -1), Action::Suspend(DEFAULT_SUSPEND));
        assert_eq!(decide(status, 2, 2), Action::DeadLetter);

        let status = ConsumeStatus::SuspendQueue { suspend_millis: 250 };
        assert_eq!(decide(status, 0, 2), Action::Suspend(Duration::from_millis(250)));
    }
}
