//! Low-level building blocks shared by the codecs and the engine threads.

/// Little-endian writers and a bounds-checked reader.
pub mod bytes;

/// Blocking queues and start signals.
pub mod concurrency;
