//! Growable circular buffer.

/// FIFO circular buffer that grows by a fixed increment when full.
///
/// Growth copies the logical window (oldest to newest) into the start of a
/// larger allocation, so buffered entries keep their order and none are
/// dropped or duplicated.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
    grow_increment: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer with `capacity` slots growing by `grow_increment`.
    ///
    /// Both values are clamped to at least one.
    #[must_use]
    pub fn new(capacity: usize, grow_increment: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            tail: 0,
            count: 0,
            grow_increment: grow_increment.max(1),
        }
    }

    /// Number of buffered entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current physical capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends an entry, growing first if the buffer is full.
    ///
    /// Returns true if this push triggered a growth.
    pub fn push(&mut self, item: T) -> bool {
        let grew = self.count == self.slots.len();
        if grew {
            self.grow();
        }
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
        grew
    }

    /// Removes and returns the oldest entry, clearing its slot.
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        item
    }

    /// Drops every buffered entry, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.count;
        while self.pop().is_some() {}
        self.head = 0;
        self.tail = 0;
        discarded
    }

    fn grow(&mut self) {
        let new_capacity = self.slots.len() + self.grow_increment;
        let mut slots = Vec::with_capacity(new_capacity);

        if self.count > 0 && self.tail <= self.head {
            // Window wraps: head..end, then 0..tail.
            let (front, back) = self.slots.split_at_mut(self.head);
            slots.extend(back.iter_mut().map(Option::take));
            slots.extend(front[..self.tail].iter_mut().map(Option::take));
        } else {
            slots.extend(self.slots[self.head..self.tail].iter_mut().map(Option::take));
        }
        slots.resize_with(new_capacity, || None);

        self.slots = slots;
        self.head = 0;
        self.tail = self.count;
    }
}
