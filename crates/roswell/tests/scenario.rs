//! The GPS walkthrough: one process publishes, another attaches and reads,
//! and both talk over channels.

use std::ffi::CString;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use roswell::prelude::*;
use roswell::{ChannelName, ErrorKind};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique(prefix: char) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tag = (std::process::id() << 8 | (n & 0xFF)) & 0x0FFF_FFFF;
    format!("{}{:07x}", prefix, tag)
}

/// Removes kernel objects created by a test.
#[derive(Default)]
struct Cleanup {
    segments: Vec<String>,
    queues: Vec<String>,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        for title in &self.segments {
            let path = CString::new(format!("/{}", title)).unwrap();
            unsafe { libc::shm_unlink(path.as_ptr()) };
        }
        for name in &self.queues {
            let _ = unlink_queue(name);
        }
    }
}

fn unlink_queue(name: &str) -> std::io::Result<()> {
    let path = CString::new(format!("/{}", name)).unwrap();
    if unsafe { libc::mq_unlink(path.as_ptr()) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Epoch {
    sec: i64,
    nsec: i64,
}

#[test]
fn publisher_and_subscriber_agree() -> roswell::Result<()> {
    init_tracing();
    let mut cleanup = Cleanup::default();
    let title = unique('T');
    cleanup.segments.push(title.clone());

    let a = SharedTable::open(TableConfig::default().with_title(title.as_str()))?;
    let position = a.create_publisher("GPS-position", ElementKind::BoundedString)?;
    let altitude = a.create_publisher("GPS-altitude", ElementKind::Fixed(8))?;
    let epoch = a.create_publisher("GPS-epoch", ElementKind::Fixed(16))?;
    a.write_str(position, "3258.1200N,09642.943W")?;
    a.write_value(altitude, &195.0f64)?;
    a.write_value(
        epoch,
        &Epoch {
            sec: 1_700_000_000,
            nsec: 250,
        },
    )?;

    let b = SharedTable::open_titled(&title)?;
    assert_eq!(b.subscribe("GPS-position")?, position);
    assert_eq!(b.read_string(position)?, "3258.1200N,09642.943W");
    assert_eq!(b.read_value_named::<f64>("GPS-altitude")?, 195.0);
    assert_eq!(
        b.read_value::<Epoch>(b.subscribe("GPS-epoch")?)?,
        Epoch {
            sec: 1_700_000_000,
            nsec: 250
        }
    );

    // B never registered these, so it cannot write them.
    let err = roswell::Error::from(b.write_value(altitude, &0.0f64).unwrap_err());
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().starts_with("shared table: "));
    Ok(())
}

#[test]
fn both_halves_share_one_error_type() -> roswell::Result<()> {
    init_tracing();
    let mut cleanup = Cleanup::default();
    let server_name = unique('s');
    let client_name = unique('c');
    cleanup.queues.push(server_name.clone());
    cleanup.queues.push(client_name.clone());

    let server = ChannelDirectory::open(ChannelConfig::new(server_name.as_str()))?;
    let client = ChannelDirectory::open(
        ChannelConfig::new(client_name.as_str()).with_receive_timeout(Duration::from_millis(1)),
    )?;

    let channel = client.send_to(&server_name, MessageType::ONBOARD, b"")?;
    let got = server
        .receive_msg_timeout(Duration::from_millis(200))?
        .expect("onboard message");
    assert_eq!(got.kind, MessageType::ONBOARD);
    assert_eq!(got.sender, ChannelName::new(&client_name).unwrap());
    assert!(got.payload.is_empty());

    server.send_command(got.channel, "reload")?;
    let reply = client
        .receive_msg_timeout(Duration::from_millis(200))?
        .expect("command back");
    assert_eq!(reply.channel, channel);
    assert_eq!(reply.payload_str(), "reload");

    let err = roswell::Error::from(client.send_msg(99, MessageType::DATA, b"").unwrap_err());
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    Ok(())
}
