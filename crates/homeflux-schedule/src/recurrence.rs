use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use std::collections::BTreeSet;

/// 星期编号（0 = 周日 ... 6 = 周六）
pub fn weekday_index(at: &NaiveDateTime) -> u8 {
    at.weekday().num_days_from_sunday() as u8
}

/// 计算严格晚于 `now` 的下一个满足时刻与星期条件的时间点
///
/// 今天若符合星期且时间未过则取今天，否则取最近的符合条件的未来日期。
/// 星期集合为空（或不含 0-6 之间的值）时返回 `None`。
pub fn next_occurrence(
    now: NaiveDateTime,
    time: NaiveTime,
    weekdays: &BTreeSet<u8>,
) -> Option<NaiveDateTime> {
    // 第 7 天覆盖“同一星期几、但今天时间已过”的情况
    (0..=7).find_map(|offset| {
        let candidate = (now.date() + Duration::days(offset)).and_time(time);
        let matches_day = weekdays.contains(&weekday_index(&candidate));
        (matches_day && candidate > now).then_some(candidate)
    })
}
