use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, SetEvent};
use windows::core::PCWSTR;

/// A manual-reset event object, for driving readiness of real waitable handles in tests.
///
/// The event stays signaled until reset, so a test can keep it permanently ready.
#[derive(Debug)]
pub struct Event {
    handle: HANDLE,
}

impl Event {
    /// Creates a new event in the non-signaled state.
    ///
    /// # Panics
    ///
    /// Panics if the operating system fails to create the event.
    #[must_use]
    pub fn new() -> Self {
        // SAFETY: No safety requirements.
        let handle = unsafe { CreateEventW(None, true, false, PCWSTR::null()) }
            .expect("creating an anonymous event succeeds");

        Self { handle }
    }

    /// The raw handle value, for registering the event with an event loop.
    #[must_use]
    pub fn raw(&self) -> isize {
        self.handle.0 as isize
    }

    /// # Panics
    ///
    /// Panics if the operating system refuses to signal the event.
    pub fn set(&self) {
        // SAFETY: The handle is owned by us and open until drop.
        unsafe { SetEvent(self.handle) }.expect("signaling an owned event succeeds");
    }

    /// # Panics
    ///
    /// Panics if the operating system refuses to reset the event.
    pub fn reset(&self) {
        // SAFETY: The handle is owned by us and open until drop.
        unsafe { ResetEvent(self.handle) }.expect("resetting an owned event succeeds");
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // SAFETY: The handle is owned by us and not used after this.
        unsafe { CloseHandle(self.handle) }.expect("closing an owned event succeeds");
    }
}
