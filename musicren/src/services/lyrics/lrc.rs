//! LRC parsing

use crate::models::LyricLine;
use std::time::Duration;

/// Parse `[mm:ss.xx]`-tagged text into lines ordered by timestamp
///
/// A line may carry several time tags; it is emitted once per tag. Lines
/// without a time tag (including `[ar:...]`-style metadata) are dropped.
pub fn parse_lrc(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut rest = raw.trim();
        let mut stamps = Vec::new();

        while let Some(tag_end) = rest.strip_prefix('[').and_then(|r| r.find(']')) {
            let tag = &rest[1..=tag_end];
            match parse_timestamp(tag) {
                Some(ts) => stamps.push(ts),
                None => break,
            }
            rest = rest[tag_end + 2..].trim_start();
        }

        let text = rest.trim();
        lines.extend(stamps.into_iter().map(|timestamp| LyricLine {
            timestamp,
            text: text.to_string(),
        }));
    }

    lines.sort_by_key(|line| line.timestamp);
    lines
}

/// `mm:ss`, `mm:ss.x`, `mm:ss.xx` or `mm:ss.xxx`
fn parse_timestamp(tag: &str) -> Option<Duration> {
    let (minutes, seconds) = tag.split_once(':')?;
    let minutes: u64 = digits(minutes)?;

    let (whole, fraction) = match seconds.split_once(['.', ':']) {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (seconds, None),
    };
    let whole: u64 = digits(whole)?;
    if whole >= 60 {
        return None;
    }

    let millis = match fraction {
        None => 0,
        Some(f) if (1..=3).contains(&f.len()) => {
            let value: u64 = digits(f)?;
            value * 10u64.pow(3 - f.len() as u32)
        }
        Some(_) => return None,
    };

    let millis = minutes
        .checked_mul(60)
        .and_then(|secs| secs.checked_add(whole))
        .and_then(|secs| secs.checked_mul(1000))
        .and_then(|ms| ms.checked_add(millis))?;
    Some(Duration::from_millis(millis))
}

fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
