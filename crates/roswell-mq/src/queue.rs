//! Thin owner of a POSIX message queue descriptor.
//!
//! Errors come back as raw `io::Error`s so callers can classify the errno.

use std::ffi::CString;
use std::io;
use std::time::Duration;

use roswell_wire::ChannelName;

/// Mode for queues created by a receiver.
const QUEUE_MODE: libc::mode_t = 0o660;

/// Kernel attributes of an open queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttributes {
    pub max_messages: i64,
    pub message_size: i64,
    /// Messages waiting at the time of the call.
    pub current_messages: i64,
}

/// An open message queue descriptor, closed on drop.
#[derive(Debug)]
pub struct MessageQueue {
    mqd: libc::mqd_t,
    name: ChannelName,
}

impl MessageQueue {
    /// Create-or-attach `/{name}` for blocking reads.
    pub fn open_receiver(
        name: &ChannelName,
        max_messages: i64,
        message_size: i64,
    ) -> io::Result<Self> {
        let path = queue_path(name)?;
        // SAFETY: mq_attr is plain data; the kernel ignores the padding.
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        attr.mq_maxmsg = max_messages as _;
        attr.mq_msgsize = message_size as _;

        let mqd = unsafe {
            libc::mq_open(
                path.as_ptr(),
                libc::O_RDONLY | libc::O_CREAT,
                QUEUE_MODE,
                &mut attr as *mut libc::mq_attr,
            )
        };
        Self::from_mqd(mqd, name)
    }

    /// Attach to an existing `/{name}` for non-blocking writes.
    pub fn open_sender(name: &ChannelName) -> io::Result<Self> {
        let path = queue_path(name)?;
        let mqd = unsafe { libc::mq_open(path.as_ptr(), libc::O_WRONLY | libc::O_NONBLOCK) };
        Self::from_mqd(mqd, name)
    }

    /// Attach to an existing `/{name}` for non-blocking reads.
    pub fn open_drain(name: &ChannelName) -> io::Result<Self> {
        let path = queue_path(name)?;
        let mqd = unsafe { libc::mq_open(path.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK) };
        Self::from_mqd(mqd, name)
    }

    fn from_mqd(mqd: libc::mqd_t, name: &ChannelName) -> io::Result<Self> {
        if mqd == -1 as libc::mqd_t {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { mqd, name: *name })
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Enqueue `frame`, waiting for space until `deadline` (CLOCK_REALTIME)
    /// unless the descriptor is non-blocking.
    pub fn send_until(&self, frame: &[u8], deadline: &libc::timespec) -> io::Result<()> {
        let rc = unsafe {
            libc::mq_timedsend(
                self.mqd,
                frame.as_ptr() as *const libc::c_char,
                frame.len(),
                0,
                deadline,
            )
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Dequeue one message into `buf`, waiting until `deadline`.
    ///
    /// `buf` must be at least the queue's message size.
    pub fn receive_until(&self, buf: &mut [u8], deadline: &libc::timespec) -> io::Result<usize> {
        let n = unsafe {
            libc::mq_timedreceive(
                self.mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                std::ptr::null_mut(),
                deadline,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Dequeue one message without a deadline. On a non-blocking descriptor
    /// an empty queue fails with `EAGAIN`.
    pub fn try_receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::mq_receive(
                self.mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                std::ptr::null_mut(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub fn attributes(&self) -> io::Result<QueueAttributes> {
        // SAFETY: mq_attr is plain data and is fully written by mq_getattr.
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        if unsafe { libc::mq_getattr(self.mqd, &mut attr) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(QueueAttributes {
            max_messages: attr.mq_maxmsg as i64,
            message_size: attr.mq_msgsize as i64,
            current_messages: attr.mq_curmsgs as i64,
        })
    }

    /// Remove `/{name}` from the system. Open descriptors keep working.
    pub fn unlink(name: &ChannelName) -> io::Result<()> {
        let path = queue_path(name)?;
        if unsafe { libc::mq_unlink(path.as_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        unsafe {
            libc::mq_close(self.mqd);
        }
    }
}

fn queue_path(name: &ChannelName) -> io::Result<CString> {
    let mut path = Vec::with_capacity(name.len() + 1);
    path.push(b'/');
    path.extend_from_slice(name.as_bytes());
    CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Absolute CLOCK_REALTIME deadline `timeout` from now.
pub fn deadline_after(timeout: Duration) -> io::Result<libc::timespec> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut tv_sec = now.tv_sec + timeout.as_secs() as libc::time_t;
    let mut tv_nsec = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
    if tv_nsec >= 1_000_000_000 {
        tv_sec += 1;
        tv_nsec -= 1_000_000_000;
    }
    Ok(libc::timespec { tv_sec, tv_nsec })
}

/// Microseconds elapsed within the current wall-clock second.
pub fn micros_within_second() -> u32 {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_REALTIME cannot fail with a valid pointer.
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
    (now.tv_nsec / 1_000) as u32
}

/// Time from a frame's embedded timestamp to `now_usec`, assuming it is
/// less than a second old.
pub fn latency_since(sent_usec: u32, now_usec: u32) -> Duration {
    let elapsed = (now_usec + 1_000_000 - sent_usec % 1_000_000) % 1_000_000;
    Duration::from_micros(elapsed as u64)
}
