pub mod aligned;
pub mod format;
pub mod timer;

pub use aligned::AlignedBytes;
pub use format::format_bytes;
pub use timer::ScopedTimer;
