// Coroutine run-state
//
//          Suspended
//          ^       ^
//         /         \
//        v           \
//   Yielding       Delaying
//        ^           ^
//         \         /
//          v       v
//           Running
//              |
//              v
//           Ending
//              |
//              v
//          Terminated

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Parked by `suspend()`; the scheduler skips it until `resume()`.
    Suspended,
    /// Ready to run. Initial state, and the state after a yield or await.
    Yielding,
    /// Waiting for a delay timer to expire.
    Delaying,
    /// Inside its body. Only observable from within a dispatch.
    Running,
    /// Body finished; the next reap pass unlinks it.
    Ending,
    /// Unlinked from the registry.
    Terminated,
}

impl Status {
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Suspended => "Suspended",
            Status::Yielding => "Yielding",
            Status::Delaying => "Delaying",
            Status::Running => "Running",
            Status::Ending => "Ending",
            Status::Terminated => "Terminated",
        }
    }

    // compact codes for narrow displays
    pub const fn short(self) -> &'static str {
        match self {
            Status::Suspended => "Sspd",
            Status::Yielding => "Yldg",
            Status::Delaying => "Dlyg",
            Status::Running => "Rnng",
            Status::Ending => "Endg",
            Status::Terminated => "Trmntd",
        }
    }

    #[inline]
    pub const fn is_done(self) -> bool {
        matches!(self, Status::Ending | Status::Terminated)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
