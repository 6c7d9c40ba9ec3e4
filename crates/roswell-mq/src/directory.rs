//! Per-process directory of named message channels.
//!
//! Each directory owns one inbound queue named after itself and keeps a table
//! of outbound queues indexed by small channel numbers. Number 0 always
//! refers to whoever sent the last received message; number 1 is the
//! well-known `main` channel. Later numbers are handed out as destinations
//! are resolved or new senders are heard from. Numbers are local to the
//! directory instance.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use roswell_wire::limits::{
    MAIN_CHANNEL, MAIN_CHANNEL_NUMBER, MAX_CHANNELS, MAX_MESSAGE_LENGTH, QUEUE_MAX_MESSAGES,
    QUEUE_MESSAGE_SIZE, REPLY_CHANNEL, SEND_TIMEOUT, clamp_receive_timeout,
};
use roswell_wire::{ChannelName, MessageType, decode_frame, encode_frame};

use crate::ChannelError;
use crate::queue::{
    MessageQueue, QueueAttributes, deadline_after, latency_since, micros_within_second,
};

/// Configuration for a channel directory.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Name of this process's inbound channel. Longer than 8 bytes is
    /// truncated.
    pub name: String,
    /// Default wait for [`ChannelDirectory::receive_msg`], clamped to
    /// 10µs..=1s.
    pub receive_timeout: Duration,
    /// Entries in the channel table, including the reply and `main` entries.
    pub capacity: usize,
    /// `mq_maxmsg` if the inbound queue gets created.
    pub max_messages: i64,
    /// `mq_msgsize` if the inbound queue gets created.
    pub message_size: i64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: MAIN_CHANNEL.to_owned(),
            receive_timeout: Duration::from_millis(100),
            capacity: MAX_CHANNELS,
            max_messages: QUEUE_MAX_MESSAGES,
            message_size: QUEUE_MESSAGE_SIZE,
        }
    }
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// A message taken off this directory's inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Channel number of the sender in this directory, or 0 when the table
    /// had no room (or no reply queue) for it.
    pub channel: usize,
    pub sender: ChannelName,
    pub kind: MessageType,
    pub payload: Vec<u8>,
    /// Microseconds within the second at which the sender built the frame.
    pub timestamp_usec: u32,
    /// Time from the frame's timestamp to its arrival.
    pub latency: Duration,
    /// Whether this message introduced a sender the directory had not seen.
    pub new_sender: bool,
}

impl Received {
    /// Payload as text, up to the first NUL. Invalid UTF-8 is replaced.
    pub fn payload_str(&self) -> Cow<'_, str> {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end])
    }
}

struct ChannelEntry {
    name: ChannelName,
    queue: Option<Arc<MessageQueue>>,
}

struct ChannelTable {
    /// Entry 0 is the last sender, entry 1 is `main`.
    entries: Vec<ChannelEntry>,
}

impl ChannelTable {
    /// Number of the named entry, skipping the reply slot.
    fn find(&self, name: &ChannelName) -> Option<usize> {
        self.entries
            .iter()
            .skip(1)
            .position(|e| e.name == *name)
            .map(|i| i + 1)
    }
}

/// A process's set of message channels.
pub struct ChannelDirectory {
    me: ChannelName,
    inbound: MessageQueue,
    receive_buf_len: usize,
    receive_timeout: Duration,
    capacity: usize,
    table: RwLock<ChannelTable>,
    last_message: Mutex<Cow<'static, str>>,
}

impl ChannelDirectory {
    /// Open (creating if needed) this process's inbound queue and pre-open
    /// `main` for sending. A missing `main` is retried on first send.
    pub fn open(config: ChannelConfig) -> Result<Self, ChannelError> {
        let me = ChannelName::truncating(&config.name)?;
        let inbound = MessageQueue::open_receiver(&me, config.max_messages, config.message_size)
            .map_err(ChannelError::Io)?;
        let attributes = inbound.attributes().map_err(ChannelError::Io)?;

        let main = ChannelName::new(MAIN_CHANNEL)?;
        let main_queue = match MessageQueue::open_sender(&main) {
            Ok(queue) => Some(Arc::new(queue)),
            Err(e) => {
                tracing::debug!(channel = %me, error = %e, "main channel not open yet");
                None
            }
        };

        let receive_timeout = clamp_receive_timeout(config.receive_timeout);
        tracing::debug!(
            channel = %me,
            max_messages = attributes.max_messages,
            message_size = attributes.message_size,
            receive_timeout_us = receive_timeout.as_micros() as u64,
            "opened channel directory"
        );

        Ok(Self {
            me,
            inbound,
            receive_buf_len: attributes.message_size.max(0) as usize,
            receive_timeout,
            capacity: config.capacity.max(MAIN_CHANNEL_NUMBER + 1),
            table: RwLock::new(ChannelTable {
                entries: vec![
                    ChannelEntry {
                        name: ChannelName::empty(),
                        queue: None,
                    },
                    ChannelEntry {
                        name: main,
                        queue: main_queue,
                    },
                ],
            }),
            last_message: Mutex::new(Cow::Borrowed("opened")),
        })
    }

    // -------------------------------------------------------------------------
    // Addressing
    // -------------------------------------------------------------------------

    /// Channel number for `name`, opening its queue on first use.
    pub fn resolve(&self, name: &str) -> Result<usize, ChannelError> {
        let name = ChannelName::new(name).map_err(|e| self.fail(e.into()))?;
        if let Some(channel) = self.table.read().find(&name) {
            return Ok(channel);
        }

        let mut table = self.table.write();
        if let Some(channel) = table.find(&name) {
            return Ok(channel);
        }
        if table.entries.len() >= self.capacity {
            return Err(self.fail(ChannelError::TableFull {
                capacity: self.capacity,
            }));
        }

        let queue = MessageQueue::open_sender(&name)
            .map_err(|e| self.fail(ChannelError::from_open(e, name)))?;
        table.entries.push(ChannelEntry {
            name,
            queue: Some(Arc::new(queue)),
        });
        let channel = table.entries.len() - 1;
        drop(table);

        tracing::debug!(
            channel = %self.me,
            destination = %name,
            number = channel,
            "resolved channel"
        );
        self.set_message(Cow::Owned(format!("resolved {} as {}", name, channel)));
        Ok(channel)
    }

    /// Name behind a channel number. Number 0 is the last sender (empty if
    /// nothing was received yet).
    pub fn channel_name(&self, channel: usize) -> Result<ChannelName, ChannelError> {
        let table = self.table.read();
        table
            .entries
            .get(channel)
            .map(|e| e.name)
            .ok_or(ChannelError::OutOfRange {
                channel,
                count: table.entries.len(),
            })
    }

    fn sender_for(&self, channel: usize) -> Result<Arc<MessageQueue>, ChannelError> {
        let name = {
            let table = self.table.read();
            let entry = table.entries.get(channel).ok_or(ChannelError::OutOfRange {
                channel,
                count: table.entries.len(),
            })?;
            if let Some(queue) = &entry.queue {
                return Ok(queue.clone());
            }
            if channel == REPLY_CHANNEL || entry.name.is_empty() {
                return Err(ChannelError::NoReplyTarget);
            }
            entry.name
        };

        // Known name whose queue did not exist when we first looked.
        let queue = Arc::new(
            MessageQueue::open_sender(&name).map_err(|e| ChannelError::from_open(e, name))?,
        );
        let mut table = self.table.write();
        if let Some(entry) = table.entries.get_mut(channel)
            && entry.name == name
        {
            entry.queue = Some(queue.clone());
        }
        Ok(queue)
    }

    // -------------------------------------------------------------------------
    // Sending
    // -------------------------------------------------------------------------

    /// Send a message on `channel`, returning the encoded frame length.
    ///
    /// Channel 0 replies to the sender of the last received message. A full
    /// destination queue fails with [`ChannelError::Busy`].
    pub fn send_msg(
        &self,
        channel: usize,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<usize, ChannelError> {
        self.try_send(channel, kind, payload)
            .map_err(|e| self.fail(e))
    }

    fn try_send(
        &self,
        channel: usize,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<usize, ChannelError> {
        if !kind.is_sendable() {
            return Err(ChannelError::InvalidType(kind.raw()));
        }
        if payload.len() > MAX_MESSAGE_LENGTH {
            return Err(ChannelError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_MESSAGE_LENGTH,
            });
        }

        let queue = self.sender_for(channel)?;
        let frame = encode_frame(&self.me, micros_within_second(), kind, payload)?;
        let deadline = deadline_after(SEND_TIMEOUT).map_err(ChannelError::Io)?;
        queue
            .send_until(&frame, &deadline)
            .map_err(ChannelError::from_send)?;

        tracing::trace!(
            channel = %self.me,
            destination = %queue.name(),
            number = channel,
            %kind,
            len = payload.len(),
            "sent message"
        );
        self.set_message(Cow::Borrowed("sent"));
        Ok(frame.len())
    }

    /// Resolve `name` and send to it, returning its channel number.
    pub fn send_to(
        &self,
        name: &str,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<usize, ChannelError> {
        let channel = self.resolve(name)?;
        self.send_msg(channel, kind, payload)?;
        Ok(channel)
    }

    /// Send `text` as a NUL-terminated COMMAND on `channel`.
    pub fn send_command(&self, channel: usize, text: &str) -> Result<usize, ChannelError> {
        self.send_msg(channel, MessageType::COMMAND, &nul_terminated(text))
    }

    /// Send `text` as a NUL-terminated COMMAND to `name`, returning its
    /// channel number.
    pub fn send_command_to(&self, name: &str, text: &str) -> Result<usize, ChannelError> {
        self.send_to(name, MessageType::COMMAND, &nul_terminated(text))
    }

    // -------------------------------------------------------------------------
    // Receiving
    // -------------------------------------------------------------------------

    /// Wait up to the configured receive timeout for a message. `Ok(None)`
    /// means nothing arrived.
    pub fn receive_msg(&self) -> Result<Option<Received>, ChannelError> {
        self.receive_msg_timeout(self.receive_timeout)
    }

    /// Like [`ChannelDirectory::receive_msg`] with a per-call timeout.
    pub fn receive_msg_timeout(&self, timeout: Duration) -> Result<Option<Received>, ChannelError> {
        let timeout = clamp_receive_timeout(timeout);
        let mut buf = vec![0u8; self.receive_buf_len];
        let deadline = deadline_after(timeout).map_err(|e| self.fail(ChannelError::Io(e)))?;

        let len = match self.inbound.receive_until(&mut buf, &deadline) {
            Ok(len) => len,
            Err(e) if matches!(e.raw_os_error(), Some(libc::ETIMEDOUT | libc::EAGAIN)) => {
                self.set_message(Cow::Borrowed("no message"));
                return Ok(None);
            }
            Err(e) => return Err(self.fail(ChannelError::from_receive(e))),
        };

        let (header, payload) =
            decode_frame(&buf[..len]).map_err(|e| self.fail(ChannelError::Frame(e)))?;
        let latency = latency_since(header.timestamp_usec, micros_within_second());
        let (channel, new_sender) = self.learn_sender(header.sender);

        tracing::trace!(
            channel = %self.me,
            sender = %header.sender,
            number = channel,
            kind = %header.kind,
            len = payload.len(),
            latency_us = latency.as_micros() as u64,
            "received message"
        );
        self.set_message(Cow::Borrowed("received"));

        Ok(Some(Received {
            channel,
            sender: header.sender,
            kind: header.kind,
            payload: payload.to_vec(),
            timestamp_usec: header.timestamp_usec,
            latency,
            new_sender,
        }))
    }

    /// Make `sender` the reply target and find (or assign) its number.
    fn learn_sender(&self, sender: ChannelName) -> (usize, bool) {
        let mut table = self.table.write();

        let (channel, new_sender, queue) = match table.find(&sender) {
            Some(channel) => {
                if table.entries[channel].queue.is_none() {
                    table.entries[channel].queue = open_reply_queue(&self.me, &sender);
                }
                (channel, false, table.entries[channel].queue.clone())
            }
            None => {
                let queue = open_reply_queue(&self.me, &sender);
                if queue.is_none() {
                    (REPLY_CHANNEL, false, None)
                } else if table.entries.len() < self.capacity {
                    table.entries.push(ChannelEntry {
                        name: sender,
                        queue: queue.clone(),
                    });
                    (table.entries.len() - 1, true, queue)
                } else {
                    tracing::debug!(
                        channel = %self.me,
                        %sender,
                        capacity = self.capacity,
                        "channel table full, sender kept as reply target only"
                    );
                    (REPLY_CHANNEL, true, queue)
                }
            }
        };

        table.entries[REPLY_CHANNEL] = ChannelEntry {
            name: sender,
            queue,
        };
        (channel, new_sender)
    }

    /// Throw away every message waiting on `name` (this directory's own
    /// queue when `None`). A queue that does not exist counts as empty.
    pub fn clear_queue(&self, name: Option<&str>) -> Result<usize, ChannelError> {
        let name = match name {
            Some(name) => ChannelName::new(name).map_err(|e| self.fail(e.into()))?,
            None => self.me,
        };

        let drain = match MessageQueue::open_drain(&name) {
            Ok(queue) => queue,
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => return Ok(0),
            Err(e) => return Err(self.fail(ChannelError::Io(e))),
        };
        let attributes = drain.attributes().map_err(|e| self.fail(ChannelError::Io(e)))?;
        let mut buf = vec![0u8; attributes.message_size.max(0) as usize];

        let mut drained = 0;
        loop {
            match drain.try_receive(&mut buf) {
                Ok(_) => drained += 1,
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => break,
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(self.fail(ChannelError::Io(e))),
            }
        }

        tracing::debug!(channel = %self.me, queue = %name, drained, "cleared queue");
        self.set_message(Cow::Owned(format!("cleared {} messages from {}", drained, name)));
        Ok(drained)
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn my_name(&self) -> &ChannelName {
        &self.me
    }

    /// Entries in the channel table, including the reply and `main` entries.
    pub fn channel_count(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Kernel attributes of the inbound queue.
    pub fn queue_attributes(&self) -> Result<QueueAttributes, ChannelError> {
        self.inbound
            .attributes()
            .map_err(|e| self.fail(ChannelError::Io(e)))
    }

    /// Human-readable outcome of the last operation on this directory.
    pub fn last_message(&self) -> String {
        self.last_message.lock().to_string()
    }

    fn set_message(&self, message: Cow<'static, str>) {
        *self.last_message.lock() = message;
    }

    fn fail(&self, err: ChannelError) -> ChannelError {
        self.set_message(Cow::Owned(err.to_string()));
        err
    }
}

impl std::fmt::Debug for ChannelDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDirectory")
            .field("me", &self.me)
            .field("channels", &self.channel_count())
            .field("receive_timeout", &self.receive_timeout)
            .finish_non_exhaustive()
    }
}

fn open_reply_queue(me: &ChannelName, sender: &ChannelName) -> Option<Arc<MessageQueue>> {
    if sender.is_empty() {
        return None;
    }
    match MessageQueue::open_sender(sender) {
        Ok(queue) => Some(Arc::new(queue)),
        Err(e) => {
            tracing::warn!(channel = %me, %sender, error = %e, "cannot open reply queue");
            None
        }
    }
}

fn nul_terminated(text: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(0);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_str_stops_at_nul() {
        let received = Received {
            channel: 2,
            sender: ChannelName::new("client").unwrap(),
            kind: MessageType::COMMAND,
            payload: b"reload\0junk".to_vec(),
            timestamp_usec: 0,
            latency: Duration::ZERO,
            new_sender: true,
        };
        assert_eq!(received.payload_str(), "reload");
    }

    #[test]
    fn commands_carry_terminator() {
        assert_eq!(nul_terminated("reload"), b"reload\0");
        assert_eq!(nul_terminated(""), b"\0");
    }

    #[test]
    fn config_builders() {
        let config = ChannelConfig::new("client")
            .with_receive_timeout(Duration::from_millis(1))
            .with_capacity(4);
        assert_eq!(config.name, "client");
        assert_eq!(config.receive_timeout, Duration::from_millis(1));
        assert_eq!(config.capacity, 4);
        assert_eq!(config.max_messages, 10);
        assert_eq!(config.message_size, 2048);
    }
}
