//! Host state notifications.
//!
//! Internally the driver reports topology transitions through
//! [`HostListener`]. Applications register a plain callback instead;
//! [`ExternalHostListener`] adapts one to the other by reducing each host to
//! its raw inet address.

use crate::address::Inet;
use crate::host::HostPtr;

/// Kind of topology transition, as seen by external callbacks.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostEvent {
    Up = 0,
    Down = 1,
    Add = 2,
    Remove = 3,
}

/// Receiver of topology transitions. All methods default to no-ops.
pub trait HostListener: Send + Sync {
    fn on_host_up(&self, _host: &HostPtr) {}
    fn on_host_down(&self, _host: &HostPtr) {}
    fn on_host_added(&self, _host: &HostPtr) {}
    fn on_host_removed(&self, _host: &HostPtr) {}
}

/// Application callback. Any user data travels in the closure's captures.
pub type HostListenerCallback = Box<dyn Fn(HostEvent, Inet) + Send + Sync>;

/// Forwards every transition to an application callback.
pub struct ExternalHostListener {
    callback: HostListenerCallback,
}

impl ExternalHostListener {
    pub fn new(callback: impl Fn(HostEvent, Inet) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    fn notify(&self, event: HostEvent, host: &HostPtr) {
        (self.callback)(event, host.address().to_inet());
    }
}

impl HostListener for ExternalHostListener {
    fn on_host_up(&self, host: &HostPtr) {
        self.notify(HostEvent::Up, host);
    }

    fn on_host_down(&self, host: &HostPtr) {
        self.notify(HostEvent::Down, host);
    }

    fn on_host_added(&self, host: &HostPtr) {
        self.notify(HostEvent::Add, host);
    }

    fn on_host_removed(&self, host: &HostPtr) {
        self.notify(HostEvent::Remove, host);
    }
}

impl std::fmt::Debug for ExternalHostListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalHostListener").finish_non_exhaustive()
    }
}
