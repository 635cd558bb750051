//! Retention of decoded messages per channel

use std::collections::VecDeque;

use terminal_core::RetentionMode;

/// Fold one delivery batch into a channel's decoded stream
pub fn apply_batch<T>(
    mode: RetentionMode,
    items: &mut VecDeque<T>,
    batch: impl IntoIterator<Item = T>,
) {
    match mode {
        RetentionMode::NewestFirst => {
            for item in batch {
                items.push_front(item);
            }
        }
        RetentionMode::ArrivalOrder => items.extend(batch),
        RetentionMode::KeepLatest => {
            items.clear();
            items.extend(batch);
        }
    }
}
