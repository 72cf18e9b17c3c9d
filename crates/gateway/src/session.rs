/// Hands out session ids for session-correlated commands.
///
/// Owned by one processor, so independent processors never share a
/// counter. Ids start at 1; 0 is skipped on wrap-around.
#[derive(Debug, Clone)]
pub struct SessionAllocator {
    next: u16,
}

impl Default for SessionAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SessionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current id and advances the counter.
    pub fn allocate(&mut self) -> u16 {
        let id = self.next;
        self.next = match self.next.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        id
    }
}
