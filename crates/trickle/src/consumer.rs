/// Downstream sink for contiguous byte windows.
pub trait Consumer: Send {
    /// Offer `chunk`, whose first byte sits at stream offset `byte_start`.
    ///
    /// Returns how many leading bytes were consumed. The remainder is kept
    /// and offered again, prefixed to later data. Values above
    /// `chunk.len()` are treated as `chunk.len()`.
    fn dispatch(&mut self, chunk: &[u8], byte_start: u64) -> usize;
}

impl<F> Consumer for F
where
    F: FnMut(&[u8], u64) -> usize + Send,
{
    fn dispatch(&mut self, chunk: &[u8], byte_start: u64) -> usize {
        self(chunk, byte_start)
    }
}
