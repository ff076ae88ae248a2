use crate::common::{PageId, RecordId, SlotId, PAGE_SIZE};
use crate::index::KeyComparator;

const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

const KEY_SIZE: usize = 4; // u32 keys
const VALUE_SIZE: usize = 6; // RecordId: PageId(4) + SlotId(2)
const ENTRY_SIZE: usize = KEY_SIZE + VALUE_SIZE;

/// Largest number of entries a bucket page can hold
pub const HASH_BUCKET_CAPACITY: usize = (PAGE_SIZE - ENTRIES_OFFSET) / ENTRY_SIZE;

/// The third level of the hash index: an ordered array of `(key, record)`
/// entries. Insertion appends, removal compacts left. Keys are compared
/// through their serialized bytes so the comparator stays pluggable.
///
/// Layout: `size: u32`, `max_size: u32`, then `max_size` entries of
/// 10 bytes each.
pub struct HashBucketPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HashBucketPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_size: u32) {
        assert!(max_size as usize <= HASH_BUCKET_CAPACITY);
        self.data.fill(0);
        self.set_size(0);
        self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4].copy_from_slice(&max_size.to_le_bytes());
    }

    pub fn size(&self) -> u32 {
        let bytes: [u8; 4] = self.data[SIZE_OFFSET..SIZE_OFFSET + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    fn set_size(&mut self, size: u32) {
        self.data[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&size.to_le_bytes());
    }

    pub fn max_size(&self) -> u32 {
        let bytes: [u8; 4] = self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: u32) -> u32 {
        assert!(idx < self.size());
        let offset = ENTRIES_OFFSET + idx as usize * ENTRY_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn value_at(&self, idx: u32) -> RecordId {
        assert!(idx < self.size());
        let offset = ENTRIES_OFFSET + idx as usize * ENTRY_SIZE + KEY_SIZE;
        let page_id_bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        let slot_id_bytes: [u8; 2] = self.data[offset + 4..offset + 6].try_into().unwrap();
        RecordId::new(
            PageId::new(u32::from_le_bytes(page_id_bytes)),
            SlotId::new(u16::from_le_bytes(slot_id_bytes)),
        )
    }

    pub fn entry_at(&self, idx: u32) -> (u32, RecordId) {
        (self.key_at(idx), self.value_at(idx))
    }

    fn set_entry_at(&mut self, idx: u32, key: u32, value: RecordId) {
        let offset = ENTRIES_OFFSET + idx as usize * ENTRY_SIZE;
        self.data[offset..offset + 4].copy_from_slice(&key.to_le_bytes());
        self.data[offset + 4..offset + 8].copy_from_slice(&value.page_id.as_u32().to_le_bytes());
        self.data[offset + 8..offset + 10].copy_from_slice(&value.slot_id.as_u16().to_le_bytes());
    }

    /// Scans for the key under the comparator.
    pub fn lookup(&self, key: u32, cmp: &dyn KeyComparator) -> Option<RecordId> {
        let key_bytes = key.to_le_bytes();
        for i in 0..self.size() {
            if cmp
                .compare(&self.key_at(i).to_le_bytes(), &key_bytes)
                .is_eq()
            {
                return Some(self.value_at(i));
            }
        }
        None
    }

    /// Appends the entry. Returns false when the bucket is full or the key
    /// is already present.
    pub fn insert(&mut self, key: u32, value: RecordId, cmp: &dyn KeyComparator) -> bool {
        if self.is_full() {
            return false;
        }
        if self.lookup(key, cmp).is_some() {
            return false;
        }

        let size = self.size();
        self.set_entry_at(size, key, value);
        self.set_size(size + 1);
        true
    }

    /// Removes the entry with the given key, compacting the array left.
    /// Returns false when the key is not present.
    pub fn remove(&mut self, key: u32, cmp: &dyn KeyComparator) -> bool {
        let key_bytes = key.to_le_bytes();
        for i in 0..self.size() {
            if cmp
                .compare(&self.key_at(i).to_le_bytes(), &key_bytes)
                .is_eq()
            {
                self.remove_at(i);
                return true;
            }
        }
        false
    }

    /// Removes the entry at the given index, compacting the array left.
    pub fn remove_at(&mut self, idx: u32) {
        let size = self.size();
        if idx >= size {
            return;
        }
        for j in idx..size - 1 {
            let (key, value) = self.entry_at(j + 1);
            self.set_entry_at(j, key, value);
        }
        self.set_size(size - 1);
    }
}

/// Read-only view of a bucket page.
pub struct HashBucketPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HashBucketPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> u32 {
        let bytes: [u8; 4] = self.data[SIZE_OFFSET..SIZE_OFFSET + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn max_size(&self) -> u32 {
        let bytes: [u8; 4] = self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: u32) -> u32 {
        assert!(idx < self.size());
        let offset = ENTRIES_OFFSET + idx as usize * ENTRY_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn value_at(&self, idx: u32) -> RecordId {
        assert!(idx < self.size());
        let offset = ENTRIES_OFFSET + idx as usize * ENTRY_SIZE + KEY_SIZE;
        let page_id_bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        let slot_id_bytes: [u8; 2] = self.data[offset + 4..offset + 6].try_into().unwrap();
        RecordId::new(
            PageId::new(u32::from_le_bytes(page_id_bytes)),
            SlotId::new(u16::from_le_bytes(slot_id_bytes)),
        )
    }

    pub fn lookup(&self, key: u32, cmp: &dyn KeyComparator) -> Option<RecordId> {
        let key_bytes = key.to_le_bytes();
        for i in 0..self.size() {
            if cmp
                .compare(&self.key_at(i).to_le_bytes(), &key_bytes)
                .is_eq()
            {
                return Some(self.value_at(i));
            }
        }
        None
    }
}
