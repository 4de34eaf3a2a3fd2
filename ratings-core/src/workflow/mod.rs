//! Outer workflow (C9, §4.9, §5): the artist/album loop, concurrency,
//! cancellation, and fatal-error bookkeeping that drives C2 through C8.

pub mod coordinator;

pub use coordinator::Coordinator;
