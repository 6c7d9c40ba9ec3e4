//! Message channel limits.

use std::time::Duration;

/// Largest payload a single frame may carry.
pub const MAX_MESSAGE_LENGTH: usize = 1024;

/// Bytes preceding the payload in every frame.
pub const FRAME_HEADER_LEN: usize = 16;

/// Largest encoded frame.
pub const MAX_FRAME_LEN: usize = FRAME_HEADER_LEN + MAX_MESSAGE_LENGTH;

/// `mq_maxmsg` for queues created by a receiver.
pub const QUEUE_MAX_MESSAGES: i64 = 10;

/// `mq_msgsize` for queues created by a receiver.
pub const QUEUE_MESSAGE_SIZE: i64 = 2048;

/// Default number of entries in a channel directory.
pub const MAX_CHANNELS: usize = 256;

/// Well-known channel every directory pre-opens as number 1.
pub const MAIN_CHANNEL: &str = "main";

/// Channel number meaning "whoever sent the last message".
pub const REPLY_CHANNEL: usize = 0;

/// Channel number of [`MAIN_CHANNEL`].
pub const MAIN_CHANNEL_NUMBER: usize = 1;

/// How long a send may wait for queue space.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(1);

/// Shortest receive timeout.
pub const MIN_RECEIVE_TIMEOUT: Duration = Duration::from_micros(10);

/// Longest receive timeout.
pub const MAX_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Clamp a requested receive timeout into the supported range.
pub fn clamp_receive_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_RECEIVE_TIMEOUT, MAX_RECEIVE_TIMEOUT)
}
