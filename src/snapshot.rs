use crate::models::Report;

/// Maximum number of retained reports.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    records: Vec<Report>,
    capacity: usize,
}

impl Default for ListSnapshot {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ListSnapshot {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
        }
    }

    /// Builds a snapshot from a bulk load, keeping the load's order among
    /// equal timestamps and the first occurrence of a repeated id.
    pub fn from_records(records: Vec<Report>, capacity: usize) -> Self {
        let mut unique: Vec<Report> = Vec::with_capacity(records.len().min(capacity));
        for record in records {
            if !unique.iter().any(|r| r.id == record.id) {
                unique.push(record);
            }
        }
        unique.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unique.truncate(capacity);
        Self {
            records: unique,
            capacity,
        }
    }

    pub fn records(&self) -> &[Report] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Report> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Places `record` ahead of every entry that is not newer than it.
    /// Returns false when the id is already present or the record falls
    /// past the capacity.
    pub fn insert(&mut self, record: Report) -> bool {
        if self.contains(record.id) {
            return false;
        }
        let position = self
            .records
            .iter()
            .position(|r| r.created_at <= record.created_at)
            .unwrap_or(self.records.len());
        if position >= self.capacity {
            return false;
        }
        self.records.insert(position, record);
        self.records.truncate(self.capacity);
        true
    }

    /// Replaces the entry with the same id; unknown ids are ignored.
    pub fn replace(&mut self, record: Report) -> bool {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) if *existing != record => {
                *existing = record;
                true
            }
            _ => false,
        }
    }
}

impl<'a> IntoIterator for &'a ListSnapshot {
    type Item = &'a Report;
    type IntoIter = std::slice::Iter<'a, Report>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Sequence number handed out when a bulk load is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A load with an equal or higher sequence number was already applied.
    Stale,
}

/// Merges loads and inserts; a load never overwrites a newer one.
#[derive(Debug)]
pub struct Reconciler {
    snapshot: ListSnapshot,
    issued: u64,
    applied: u64,
    /// Inserts delivered while a load was in flight, tagged with the last
    /// issued sequence at delivery time.
    deliveries: Vec<(u64, Report)>,
}

impl Reconciler {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshot: ListSnapshot::with_capacity(capacity),
            issued: 0,
            applied: 0,
            deliveries: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> &ListSnapshot {
        &self.snapshot
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.issued += 1;
        LoadTicket(self.issued)
    }

    pub fn apply_load(&mut self, ticket: LoadTicket, records: Vec<Report>) -> LoadOutcome {
        if ticket.0 <= self.applied {
            return LoadOutcome::Stale;
        }

        let mut next = ListSnapshot::from_records(records, self.snapshot.capacity);
        // Anything delivered at or after this load was issued may be missing
        // from its result.
        for (_, record) in self.deliveries.iter().filter(|(tag, _)| *tag >= ticket.0) {
            next.insert(record.clone());
        }

        self.applied = ticket.0;
        self.deliveries.retain(|(tag, _)| *tag >= ticket.0);
        self.snapshot = next;
        LoadOutcome::Applied
    }

    /// Merges a single inserted record. Returns true if the snapshot changed.
    pub fn apply_insert(&mut self, record: Report) -> bool {
        if self.issued > self.applied {
            self.deliveries.push((self.issued, record.clone()));
            let excess = self.deliveries.len().saturating_sub(self.snapshot.capacity);
            self.deliveries.drain(..excess);
        }
        self.snapshot.insert(record)
    }

    pub fn apply_update(&mut self, record: Report) -> bool {
        if let Some((_, pending)) = self.deliveries.iter_mut().find(|(_, r)| r.id == record.id) {
            *pending = record.clone();
        }
        self.snapshot.replace(record)
    }
}
