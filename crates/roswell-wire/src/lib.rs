//! Layouts and wire formats shared by the roswell table and channel crates.
//!
//! Nothing in here touches the operating system. The types describe bytes:
//! how an element header sits in the mapped table, how a name is padded into
//! its slot, and how a message frame is laid out on a queue.

#![deny(unsafe_code)]

pub mod element;
pub mod error;
pub mod frame;
pub mod limits;
pub mod name;

pub use element::{ElementHeader, ElementKind, TableControl};
pub use error::ErrorKind;
pub use frame::{FrameError, FrameHeader, MessageType, decode_frame, encode_frame};
pub use name::{ChannelName, ElementName, FixedName, NameError, TableTitle};
