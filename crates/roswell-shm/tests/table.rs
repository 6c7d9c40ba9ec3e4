//! Element table behaviour across attachments of the same segment.

use std::ffi::CString;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};
use roswell_shm::{ElementId, ElementKind, SharedTable, ShmError, TableConfig};
use roswell_wire::ErrorKind;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A table title no other test (or concurrent test run) uses.
fn unique_title() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("rt{:x}x{:x}", std::process::id(), n)
}

/// Removes the segment when the test ends.
struct Segment(String);

impl Segment {
    fn new() -> Self {
        init_tracing();
        Self(unique_title())
    }

    fn open(&self) -> SharedTable {
        SharedTable::open_titled(&self.0).unwrap()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        let path = CString::new(format!("/{}", self.0)).unwrap();
        unsafe { libc::shm_unlink(path.as_ptr()) };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Epoch {
    sec: i64,
    nsec: i64,
}

#[test]
fn publisher_and_subscriber_agree_on_ids() {
    let segment = Segment::new();
    let publisher = segment.open();

    let position = publisher
        .create_publisher("GPS-position", ElementKind::BoundedString)
        .unwrap();
    let altitude = publisher
        .create_publisher("GPS-altitude", ElementKind::Fixed(8))
        .unwrap();
    assert_eq!(position.get(), 1);
    assert_eq!(altitude.get(), 2);
    assert_eq!(publisher.subscribe("GPS-position").unwrap(), position);
    assert_eq!(publisher.subscribe("GPS-altitude").unwrap(), altitude);
}

#[test]
fn values_cross_attachments() {
    let segment = Segment::new();
    let a = segment.open();
    let position = a
        .create_publisher("GPS-position", ElementKind::BoundedString)
        .unwrap();
    let altitude = a
        .create_publisher("GPS-altitude", ElementKind::Fixed(8))
        .unwrap();
    a.write_str(position, "3258.1200N,09642.943W").unwrap();
    a.write_value(altitude, &195.0f64).unwrap();

    let b = segment.open();
    assert_eq!(b.len(), 2);
    let position = b.subscribe("GPS-position").unwrap();
    let altitude = b.subscribe("GPS-altitude").unwrap();
    assert_eq!(b.read_string(position).unwrap(), "3258.1200N,09642.943W");
    assert_eq!(b.read_value::<f64>(altitude).unwrap(), 195.0);

    // The writer keeps flipping between copies; the reader follows.
    for i in 0..5 {
        a.write_value(altitude, &(200.0 + i as f64)).unwrap();
        assert_eq!(b.read_value::<f64>(altitude).unwrap(), 200.0 + i as f64);
    }
}

#[test]
fn pod_structs_round_trip_by_name() {
    let segment = Segment::new();
    let table = segment.open();
    table
        .create_publisher("GPS-epoch", ElementKind::of::<Epoch>().unwrap())
        .unwrap();

    let epoch = Epoch {
        sec: 1_700_000_000,
        nsec: 250_000_000,
    };
    table.write_value_named("GPS-epoch", &epoch).unwrap();
    assert_eq!(table.read_value_named::<Epoch>("GPS-epoch").unwrap(), epoch);

    let mut raw = [0u8; 32];
    assert_eq!(table.read_bytes_named("GPS-epoch", &mut raw).unwrap(), 16);
    assert_eq!(&raw[..8], &1_700_000_000i64.to_ne_bytes());
}

#[test]
fn reregistration_reuses_or_rejects() {
    let segment = Segment::new();
    let table = segment.open();

    let id = table
        .create_publisher("GPS-altitude", ElementKind::Fixed(8))
        .unwrap();
    let allocated = table.allocated_bytes();
    assert_eq!(allocated, 8);

    // Same or smaller size: same ID, no new allocation.
    assert_eq!(
        table
            .create_publisher("GPS-altitude", ElementKind::Fixed(8))
            .unwrap(),
        id
    );
    assert_eq!(table.create_publisher_sized("GPS-altitude", 4).unwrap(), id);
    assert_eq!(table.allocated_bytes(), allocated);

    let err = table
        .create_publisher("GPS-altitude", ElementKind::Fixed(16))
        .unwrap_err();
    assert!(matches!(err, ShmError::InvalidSize { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = table
        .create_publisher("GPS-altitude", ElementKind::BoundedString)
        .unwrap_err();
    assert!(matches!(err, ShmError::InvalidSize { .. }));
    assert_eq!(table.len(), 1);
}

#[test]
fn long_strings_are_truncated() {
    let segment = Segment::new();
    let table = segment.open();
    let id = table
        .create_publisher_sized("motd", 0)
        .unwrap();
    assert_eq!(table.allocated_bytes(), 64);

    let long = "x".repeat(100);
    let written = table.write_str(id, &long).unwrap();
    assert_eq!(written.len, 63);
    assert!(written.truncated);
    assert_eq!(table.last_message(), "string too long");
    assert_eq!(table.read_string(id).unwrap(), "x".repeat(63));

    let written = table.write_str(id, "short").unwrap();
    assert!(!written.truncated);
    assert_eq!(table.read_string(id).unwrap(), "short");

    let mut buf = [0u8; 8];
    assert_eq!(table.read_bytes(id, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"short");
}

#[test]
fn kind_mismatches_are_rejected() {
    let segment = Segment::new();
    let table = segment.open();
    let text = table
        .create_publisher("text", ElementKind::BoundedString)
        .unwrap();
    let number = table.create_publisher("number", ElementKind::Fixed(4)).unwrap();

    let err = table.write_str(number, "nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = table.write_value(text, &1u32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = table.write_bytes(number, &[1, 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = table.read_value::<f64>(number).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = table.read_string(number).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    let mut small = [0u8; 2];
    let err = table.read_bytes(number, &mut small).unwrap_err();
    assert!(matches!(
        err,
        ShmError::BufferTooSmall {
            needed: 4,
            available: 2
        }
    ));
}

#[test]
fn bad_ids_and_names() {
    let segment = Segment::new();
    let table = segment.open();
    table.create_publisher("one", ElementKind::Fixed(1)).unwrap();

    for raw in [0, 2, 300] {
        let err = table.read_value::<u8>(ElementId::new(raw)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    let err = table.subscribe("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(table.last_message(), "element missing not found");

    let err = table.read_string_named("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    for bad in ["", "a-name-longer-than-15"] {
        let err = table.subscribe(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = table
            .create_publisher(bad, ElementKind::Fixed(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    let err = table.create_publisher_sized("huge", 0x8000).unwrap_err();
    assert!(matches!(err, ShmError::SizeOutOfRange { size: 0x8000 }));
}

#[test]
fn unencodable_sizes_are_rejected() {
    let segment = Segment::new();
    let table = segment.open();

    // Neither size survives a trip through the header's size field.
    let err = table.create_publisher("zero", ElementKind::Fixed(0)).unwrap_err();
    assert!(matches!(err, ShmError::SizeOutOfRange { size: 0 }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = table
        .create_publisher("mirror", ElementKind::Fixed(0x8000))
        .unwrap_err();
    assert!(matches!(err, ShmError::SizeOutOfRange { size: 0x8000 }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(table.is_empty());
    assert_eq!(table.allocated_bytes(), 0);
    assert_eq!(table.subscribe("zero").unwrap_err().kind(), ErrorKind::NotFound);

    let number = table.create_publisher("number", ElementKind::Fixed(8)).unwrap();
    assert_eq!(number.get(), 1);
    let text = table
        .create_publisher("text", ElementKind::BoundedString)
        .unwrap();
    table.write_value(number, &0x0102_0304_0506_0708u64).unwrap();
    table.write_str(text, "still here").unwrap();
    assert_eq!(table.read_value::<u64>(number).unwrap(), 0x0102_0304_0506_0708);
    assert_eq!(table.read_string(text).unwrap(), "still here");
}

#[test]
fn raw_bytes_by_name() {
    let segment = Segment::new();
    let table = segment.open();
    table.create_publisher("raw", ElementKind::Fixed(4)).unwrap();

    table.write_bytes_named("raw", &[9, 8, 7, 6]).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(table.read_bytes_named("raw", &mut buf).unwrap(), 4);
    assert_eq!(buf, [9, 8, 7, 6]);

    let err = table.write_bytes_named("raw", &[1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = table.write_bytes_named("absent", &[1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn only_registering_instance_may_write() {
    let segment = Segment::new();
    let owner = segment.open();
    let other = segment.open();
    let id = owner.create_publisher("speed", ElementKind::Fixed(4)).unwrap();

    let err = other.write_value(id, &7u32).unwrap_err();
    assert!(matches!(err, ShmError::NotPublisher(_)));

    // Registering the same name makes the other instance a publisher too.
    assert_eq!(
        other.create_publisher("speed", ElementKind::Fixed(4)).unwrap(),
        id
    );
    other.write_value(id, &7u32).unwrap();
    assert_eq!(owner.read_value::<u32>(id).unwrap(), 7);
}

#[test]
fn header_array_capacity_is_enforced() {
    let segment = Segment::new();
    let table = segment.open();
    assert_eq!(table.capacity(), 256);

    for i in 1..=255u16 {
        let id = table
            .create_publisher(&format!("e{}", i), ElementKind::Fixed(1))
            .unwrap();
        assert_eq!(id.get(), i);
    }
    let err = table
        .create_publisher("e256", ElementKind::Fixed(1))
        .unwrap_err();
    assert!(matches!(err, ShmError::TableFull { capacity: 256 }));
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    // Existing names still resolve once full.
    assert_eq!(table.subscribe("e255").unwrap().get(), 255);
}

#[test]
fn small_tables_fill_up_sooner() {
    init_tracing();
    let title = unique_title();
    let _segment = Segment(title.clone());
    let table = SharedTable::open(TableConfig::default().with_title(&title).with_capacity(3)).unwrap();

    table.create_publisher("a", ElementKind::Fixed(1)).unwrap();
    table.create_publisher("b", ElementKind::Fixed(1)).unwrap();
    let err = table.create_publisher("c", ElementKind::Fixed(1)).unwrap_err();
    assert!(matches!(err, ShmError::TableFull { capacity: 3 }));

    // A later attacher asking for the default size keeps the segment's own.
    let again = SharedTable::open_titled(&title).unwrap();
    assert_eq!(again.capacity(), 3);
    assert_eq!(again.len(), 2);
}

#[test]
fn data_area_is_bounded() {
    let segment = Segment::new();
    let table = segment.open();

    table
        .create_publisher("big", ElementKind::fixed(0x7FFF).unwrap())
        .unwrap();
    table.create_publisher("last", ElementKind::Fixed(1)).unwrap();
    assert_eq!(table.allocated_bytes(), 0x8000);

    let err = table
        .create_publisher("more", ElementKind::Fixed(1))
        .unwrap_err();
    assert!(matches!(
        err,
        ShmError::DataAreaExhausted {
            requested: 1,
            available: 0
        }
    ));
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
}

#[test]
fn introspection_lists_elements() {
    let segment = Segment::new();
    let table = segment.open();
    assert!(table.is_empty());
    assert_eq!(table.title().to_string(), segment.0);

    table
        .create_publisher("GPS-position", ElementKind::BoundedString)
        .unwrap();
    let alt = table
        .create_publisher("GPS-altitude", ElementKind::Fixed(8))
        .unwrap();

    let info = table.element_info(alt).unwrap();
    assert_eq!(info.name.to_string(), "GPS-altitude");
    assert_eq!(info.kind, ElementKind::Fixed(8));
    assert_eq!(info.offset, 64);

    table.write_value(alt, &1.0f64).unwrap();
    assert_eq!(table.element_info(alt).unwrap().offset, 64 | 0x8000);

    let names: Vec<String> = table
        .elements()
        .iter()
        .map(|e| e.name.to_string())
        .collect();
    assert_eq!(names, ["GPS-position", "GPS-altitude"]);
    assert_eq!(table.stale_lock_recoveries(), 0);
}
