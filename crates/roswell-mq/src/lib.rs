//! Named message channels over POSIX message queues.
//!
//! Every process opens a [`ChannelDirectory`] under a short name (at most 8
//! bytes). That creates an inbound queue `/name` other processes can send to.
//! Destinations are addressed by name once and by channel number afterwards:
//!
//! ```no_run
//! use roswell_mq::{ChannelConfig, ChannelDirectory, MessageType};
//!
//! let client = ChannelDirectory::open(ChannelConfig::new("client"))?;
//! client.send_command(1, "reload")?; // channel 1 is always `main`
//!
//! if let Some(reply) = client.receive_msg()? {
//!     println!("{} from {}: {}", reply.kind, reply.sender, reply.payload_str());
//! }
//! # Ok::<(), roswell_mq::ChannelError>(())
//! ```
//!
//! Queues are Linux POSIX message queues; sends never wait longer than a
//! millisecond and a full destination is reported as
//! [`ChannelError::Busy`], while an empty inbound queue is just `Ok(None)`.

mod directory;
mod error;
pub mod queue;

pub use directory::{ChannelConfig, ChannelDirectory, Received};
pub use error::ChannelError;
pub use queue::{MessageQueue, QueueAttributes};
pub use roswell_wire::{ChannelName, MessageType};
