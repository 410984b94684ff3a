//! Identifiers for jobs and queues.

crate::define_string_id! {
    /// Caller-supplied job identifier, unique across all live jobs.
    pub struct JobId;
}

crate::define_string_id! {
    /// Name of a scheduling queue. The distinguished value `"NONE"` means
    /// "no serialization, run immediately and in parallel with anything".
    pub struct QueueName;
}

impl QueueName {
    /// The distinguished queue name meaning "run in parallel, unbounded".
    pub const NONE: &'static str = "NONE";

    /// True if this is the distinguished parallel queue.
    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }
}
