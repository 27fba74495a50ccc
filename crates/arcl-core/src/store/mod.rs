// ── Mirror storage ──
//
// Concurrent keyed storage with push-based change notification.

mod collection;

pub(crate) use collection::Mirror;
