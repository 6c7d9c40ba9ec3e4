//! Shared-memory element table.
//!
//! A table is a POSIX shared-memory segment, named by a short title, holding
//! up to 255 named elements. Any process can register an element and publish
//! values into it; any process can look it up by name and read the latest
//! value. Reads and writes never take a lock: each element has two copies and
//! a writer always fills the one readers are not pointed at.
//!
//! ```no_run
//! use roswell_shm::{SharedTable, ElementKind};
//!
//! let table = SharedTable::open_titled("Roswell")?;
//! let altitude = table.create_publisher("GPS-altitude", ElementKind::Fixed(8))?;
//! table.write_value(altitude, &195.0f64)?;
//!
//! let reader = SharedTable::open_titled("Roswell")?;
//! let id = reader.subscribe("GPS-altitude")?;
//! assert_eq!(reader.read_value::<f64>(id)?, 195.0);
//! # Ok::<(), roswell_shm::ShmError>(())
//! ```

mod access;
mod error;
pub mod layout;
mod mapping;
mod table;

pub use access::Written;
pub use error::ShmError;
pub use layout::TableOffsets;
pub use roswell_primitives::SpinPolicy;
pub use roswell_wire::{ElementKind, ElementName, TableTitle};
pub use table::{ElementId, ElementInfo, SharedTable, TableConfig};
