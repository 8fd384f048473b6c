use std::{
    io,
    io::{Seek, SeekFrom},
    ops::{Deref, DerefMut},
};

/// Holds a stream's position and seeks back to it when dropped.
///
/// All access to the stream goes through the guard while it is alive, so any
/// exit path (including `?`) leaves the stream where it was found.
pub struct PositionGuard<'a, S: Seek + ?Sized> {
    inner: &'a mut S,
    saved: u64,
}

impl<'a, S: Seek + ?Sized> PositionGuard<'a, S> {
    pub fn new(inner: &'a mut S) -> io::Result<Self> {
        let saved = inner.stream_position()?;
        Ok(Self { inner, saved })
    }

    /// The position that will be restored.
    #[inline]
    pub fn saved(&self) -> u64 { self.saved }
}

impl<S: Seek + ?Sized> Deref for PositionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S { self.inner }
}

impl<S: Seek + ?Sized> DerefMut for PositionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S { self.inner }
}

impl<S: Seek + ?Sized> Drop for PositionGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.seek(SeekFrom::Start(self.saved)) {
            log::error!("Failed to restore stream position {:#X}: {e}", self.saved);
        }
    }
}

/// Total stream length, leaving the position untouched.
pub fn stream_len<S: Seek + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let mut guard = PositionGuard::new(stream)?;
    guard.seek(SeekFrom::End(0))
}
