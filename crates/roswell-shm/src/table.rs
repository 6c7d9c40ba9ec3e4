//! The shared element table: creation, registration and lookup.
//!
//! Readers and writers of element values never block; see [`crate::access`].
//! Only registration takes the structural lock.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use roswell_primitives::{LockGuard, LockOutcome, Region, SpinPolicy, StructuralLock};
use roswell_wire::element::{
    DATA_HALF_LEN, DEFAULT_TITLE, MAX_ELEMENT_ID, MAX_ELEMENTS, NAME_SLOT_LEN,
};
use roswell_wire::{ElementHeader, ElementKind, ElementName, TableControl, TableTitle};

use crate::ShmError;
use crate::layout::TableOffsets;
use crate::mapping::ShmMapping;

/// Handle for a registered element. Valid IDs start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u16);

impl ElementId {
    /// Wrap a raw ID. Range is checked when the ID is used.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Configuration for opening a table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Segment title. Empty means [`DEFAULT_TITLE`]; longer than 15 bytes is
    /// truncated.
    pub title: String,
    /// Header slots, including the control slot (1..=256). Ignored when
    /// attaching to a segment that already has a size.
    pub capacity: usize,
    /// Backoff for the structural lock.
    pub lock_policy: SpinPolicy,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_owned(),
            capacity: MAX_ELEMENTS,
            lock_policy: SpinPolicy::DEFAULT,
        }
    }
}

impl TableConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_lock_policy(mut self, policy: SpinPolicy) -> Self {
        self.lock_policy = policy;
        self
    }
}

/// Snapshot of one registered element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementInfo {
    pub id: ElementId,
    pub name: ElementName,
    pub kind: ElementKind,
    /// Data-area offset of the currently published copy.
    pub offset: u16,
}

/// A process's attachment to a named shared element table.
///
/// All methods take `&self`; the table may be shared between threads.
pub struct SharedTable {
    pub(crate) region: Region,
    pub(crate) offsets: TableOffsets,
    title: TableTitle,
    lock_policy: SpinPolicy,
    /// Element IDs this instance may write.
    publishers: Box<[AtomicBool]>,
    stale_recoveries: AtomicU64,
    last_message: Mutex<Cow<'static, str>>,
    mapping: ShmMapping,
}

impl SharedTable {
    /// Create or attach to the table described by `config`.
    pub fn open(config: TableConfig) -> Result<Self, ShmError> {
        let title = if config.title.is_empty() {
            TableTitle::new(DEFAULT_TITLE)?
        } else {
            TableTitle::truncating(&config.title)?
        };

        let (mapping, offsets) = ShmMapping::open(&title.to_string_lossy(), config.capacity)?;
        let region = mapping.region();
        let publishers = (0..offsets.capacity)
            .map(|_| AtomicBool::new(false))
            .collect();

        let table = Self {
            region,
            offsets,
            title,
            lock_policy: config.lock_policy,
            publishers,
            stale_recoveries: AtomicU64::new(0),
            last_message: Mutex::new(Cow::Borrowed("")),
            mapping,
        };
        table.initialize(table.mapping.created());
        Ok(table)
    }

    /// Open the default `Roswell` table with 256 slots.
    pub fn open_default() -> Result<Self, ShmError> {
        Self::open(TableConfig::default())
    }

    /// Open the table `title` with 256 slots.
    pub fn open_titled(title: &str) -> Result<Self, ShmError> {
        Self::open(TableConfig::default().with_title(title))
    }

    /// Zero the segment and stamp the title, unless another attacher already
    /// did. The title in name slot 0 is the initialization marker and is
    /// written last.
    fn initialize(&self, created: bool) {
        if !created && self.title_matches() {
            tracing::debug!(title = %self.title, count = self.len(), "attached to table");
            self.set_message(Cow::Borrowed("attached"));
            return;
        }

        let (guard, recovered) = self.lock_structure();
        let reinitialized = !self.title_matches();
        if reinitialized {
            self.reset_locked();
        }
        drop(guard);
        self.report_recovery(recovered);

        if reinitialized {
            tracing::debug!(
                title = %self.title,
                capacity = self.offsets.capacity,
                created,
                "initialized table"
            );
            self.set_message(Cow::Borrowed("initialized"));
        } else {
            // Another process finished initializing while we waited.
            self.set_message(Cow::Borrowed("attached"));
        }
    }

    /// Zero the bookkeeping, headers, names and data, then stamp the title.
    /// Caller holds the structural lock.
    fn reset_locked(&self) {
        let control = self.control();
        control.count.store(0, Ordering::Relaxed);
        control.next_offset.store(0, Ordering::Relaxed);
        let headers_end = self.offsets.names;
        let first_header = self.offsets.header(1);
        self.region
            .fill(first_header, headers_end - first_header, 0);
        self.region
            .fill(self.offsets.names, self.offsets.total - self.offsets.names, 0);

        let mut slot = [0u8; NAME_SLOT_LEN];
        self.title.write_padded(&mut slot);
        self.region.copy_in(self.offsets.name_slot(0), &slot);
    }

    fn title_matches(&self) -> bool {
        self.title.matches_slot(&self.name_slot(0))
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register `name` as an element of `kind`, or return the existing ID.
    ///
    /// An existing element is reused when `kind` is the same category and no
    /// larger than what was registered. The instance becomes a publisher of
    /// the returned ID.
    pub fn create_publisher(&self, name: &str, kind: ElementKind) -> Result<ElementId, ShmError> {
        let name = ElementName::new(name).map_err(|e| self.fail(e.into()))?;
        if !kind.is_valid() {
            return Err(self.fail(ShmError::SizeOutOfRange {
                size: kind.wire_size(),
            }));
        }
        let result = self.register(name, kind);
        match result {
            Ok(id) => {
                self.publishers[id.0 as usize].store(true, Ordering::Relaxed);
                self.set_message(Cow::Owned(format!("publishing {} as {}", name, id)));
                Ok(id)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Like [`SharedTable::create_publisher`] with a raw wire size: 0 for a
    /// bounded string, otherwise 1..=32767 bytes.
    pub fn create_publisher_sized(&self, name: &str, size: u16) -> Result<ElementId, ShmError> {
        let kind = ElementKind::from_wire_size(size)
            .ok_or_else(|| self.fail(ShmError::SizeOutOfRange { size }))?;
        self.create_publisher(name, kind)
    }

    fn register(&self, name: ElementName, kind: ElementKind) -> Result<ElementId, ShmError> {
        let (guard, recovered) = self.lock_structure();
        let result = self.register_locked(name, kind);
        drop(guard);
        self.report_recovery(recovered);

        let (id, base) = result?;
        if let Some(base) = base {
            tracing::debug!(
                title = %self.title,
                %name,
                %id,
                %kind,
                offset = base,
                "registered element"
            );
        }
        Ok(id)
    }

    /// Registration proper. Runs with the structural lock held, so nothing
    /// in here may block or log. The offset is `None` when `name` already
    /// existed.
    fn register_locked(
        &self,
        name: ElementName,
        kind: ElementKind,
    ) -> Result<(ElementId, Option<u16>), ShmError> {
        let control = self.control();
        let count = control.count.load(Ordering::Acquire) as u16;

        if let Some(id) = self.find(&name, count) {
            let stored = self.stored_kind(id.0)?;
            if !kind.fits_within(stored) {
                return Err(ShmError::InvalidSize {
                    name,
                    stored,
                    requested: kind,
                });
            }
            return Ok((id, None));
        }

        let id = count + 1;
        if id as usize >= self.offsets.capacity || id > MAX_ELEMENT_ID {
            return Err(ShmError::TableFull {
                capacity: self.offsets.capacity,
            });
        }

        let base = control.next_offset.load(Ordering::Relaxed);
        let requested = kind.reserved_bytes() as usize;
        let available = DATA_HALF_LEN.saturating_sub(base as usize);
        if requested > available {
            return Err(ShmError::DataAreaExhausted {
                requested,
                available,
            });
        }

        let mut slot = [0u8; NAME_SLOT_LEN];
        name.write_padded(&mut slot);
        self.region.copy_in(self.offsets.name_slot(id), &slot);

        let header = self.header(id);
        header.size.store(kind.wire_size(), Ordering::Relaxed);
        header.offset.store(base, Ordering::Relaxed);
        control
            .next_offset
            .store(base + requested as u16, Ordering::Relaxed);
        // Publishing the count makes the name and header visible to lookups.
        control.count.store(id as u8, Ordering::Release);

        Ok((ElementId(id), Some(base)))
    }

    /// Look up an element by name.
    pub fn subscribe(&self, name: &str) -> Result<ElementId, ShmError> {
        let name = ElementName::new(name).map_err(|e| self.fail(e.into()))?;
        match self.find(&name, self.count()) {
            Some(id) => {
                self.set_message(Cow::Borrowed("subscribed"));
                Ok(id)
            }
            None => Err(self.fail(ShmError::NotFound(name))),
        }
    }

    fn find(&self, name: &ElementName, count: u16) -> Option<ElementId> {
        (1..=count)
            .find(|&id| name.matches_slot(&self.name_slot(id)))
            .map(ElementId)
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn title(&self) -> &TableTitle {
        &self.title
    }

    /// Header slots in the segment, including the control slot.
    pub fn capacity(&self) -> usize {
        self.offsets.capacity
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Bytes of each data half handed out so far.
    pub fn allocated_bytes(&self) -> usize {
        self.control().next_offset.load(Ordering::Acquire) as usize
    }

    /// How many times this instance took the structural lock over from a
    /// stale holder.
    pub fn stale_lock_recoveries(&self) -> u64 {
        self.stale_recoveries.load(Ordering::Relaxed)
    }

    /// Whether this instance may write `id`.
    pub fn is_publisher(&self, id: ElementId) -> bool {
        self.publishers
            .get(id.0 as usize)
            .is_some_and(|p| p.load(Ordering::Relaxed))
    }

    pub fn element_info(&self, id: ElementId) -> Result<ElementInfo, ShmError> {
        let (header, kind) = self.element(id)?;
        Ok(ElementInfo {
            id,
            name: ElementName::from_bytes(&self.name_slot(id.0)),
            kind,
            offset: header.offset.load(Ordering::Acquire),
        })
    }

    /// Snapshot of every registered element, in ID order.
    pub fn elements(&self) -> Vec<ElementInfo> {
        (1..=self.count())
            .filter_map(|id| self.element_info(ElementId(id)).ok())
            .collect()
    }

    /// Human-readable outcome of the last operation on this instance.
    pub fn last_message(&self) -> String {
        self.last_message.lock().to_string()
    }

    // -------------------------------------------------------------------------
    // Internals shared with the accessors
    // -------------------------------------------------------------------------

    fn control(&self) -> &TableControl {
        // SAFETY: slot 0 lies inside the header array and is only mutated
        // through atomics.
        unsafe { self.region.get::<TableControl>(self.offsets.header(0)) }
    }

    fn header(&self, id: u16) -> &ElementHeader {
        debug_assert!((id as usize) < self.offsets.capacity);
        // SAFETY: id < capacity, so the slot lies inside the header array.
        unsafe { self.region.get::<ElementHeader>(self.offsets.header(id)) }
    }

    fn name_slot(&self, id: u16) -> [u8; NAME_SLOT_LEN] {
        let mut slot = [0u8; NAME_SLOT_LEN];
        self.region.copy_out(self.offsets.name_slot(id), &mut slot);
        slot
    }

    pub(crate) fn count(&self) -> u16 {
        self.control().count.load(Ordering::Acquire) as u16
    }

    fn stored_kind(&self, id: u16) -> Result<ElementKind, ShmError> {
        ElementKind::from_wire_size(self.header(id).size.load(Ordering::Relaxed))
            .ok_or(ShmError::Layout("element header holds an invalid size"))
    }

    /// Header and kind of a registered element.
    pub(crate) fn element(&self, id: ElementId) -> Result<(&ElementHeader, ElementKind), ShmError> {
        let count = self.count();
        if id.0 == 0 || id.0 > count || id.0 as usize >= self.offsets.capacity {
            return Err(ShmError::OutOfRange { id: id.0, count });
        }
        let kind = self.stored_kind(id.0)?;
        let header = self.header(id.0);
        let base = header.offset.load(Ordering::Relaxed) & roswell_primitives::OFFSET_MASK;
        if base as usize + kind.reserved_bytes() as usize > DATA_HALF_LEN {
            return Err(ShmError::Layout("element header points outside the data area"));
        }
        Ok((header, kind))
    }

    /// Take the structural lock. The second value is how long we waited when
    /// the lock had to be taken over from a stale holder; report it with
    /// [`SharedTable::report_recovery`] once the guard is gone.
    fn lock_structure(&self) -> (LockGuard<'_>, Option<Duration>) {
        let lock = StructuralLock::new(&self.control().lock);
        let (guard, outcome) = lock.lock(self.lock_policy);
        let recovered = match outcome {
            LockOutcome::Recovered { waited } => Some(waited),
            LockOutcome::Acquired { .. } => None,
        };
        (guard, recovered)
    }

    fn report_recovery(&self, recovered: Option<Duration>) {
        let Some(waited) = recovered else {
            return;
        };
        self.stale_recoveries.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            title = %self.title,
            waited_us = waited.as_micros() as u64,
            "took over stale structural lock"
        );
        self.set_message(Cow::Borrowed("recovered stale structural lock"));
    }

    pub(crate) fn set_message(&self, message: Cow<'static, str>) {
        *self.last_message.lock() = message;
    }

    /// Record `err` as the last message and hand it back.
    pub(crate) fn fail(&self, err: ShmError) -> ShmError {
        self.set_message(Cow::Owned(err.to_string()));
        err
    }
}

impl fmt::Debug for SharedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTable")
            .field("title", &self.title)
            .field("capacity", &self.offsets.capacity)
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}
