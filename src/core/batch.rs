// Fixed-size windows over a borrowed sequence; used to respect per-request entity caps.
use crate::core::error::{Error, ErrorKind};

/// Largest number of titles the API accepts in one multi-title request.
pub const MAX_GROUP_QUERY: usize = 50;

#[derive(Debug, Clone)]
pub struct BatchGrouper<'a, T> {
    source: &'a [T],
    window: usize,
    cursor: usize,
}

impl<'a, T> BatchGrouper<'a, T> {
    pub fn new(source: &'a [T], window: usize) -> Result<Self, Error> {
        if window == 0 {
            return Err(
                Error::new(ErrorKind::Usage).with_message("batch window size must be positive")
            );
        }
        Ok(Self {
            source,
            window,
            cursor: 0,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.source.len()
    }

    /// Returns up to `window` items and moves the cursor by a full window, so the short final
    /// batch still exhausts the grouper. Empty once exhausted.
    pub fn next_batch(&mut self) -> &'a [T] {
        if !self.has_more() {
            return &[];
        }
        let end = self.cursor.saturating_add(self.window).min(self.source.len());
        let batch = &self.source[self.cursor..end];
        self.cursor = self.cursor.saturating_add(self.window);
        batch
    }
}

impl<'a, T> Iterator for BatchGrouper<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_more() {
            Some(self.next_batch())
        } else {
            None
        }
    }
}
