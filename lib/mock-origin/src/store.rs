use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use papaya::HashMap;

use crate::{request::RecordedRequest, response::ProgrammedResponse, trace::TraceId};

type FastBuildHasher = foldhash::quality::RandomState;

#[derive(Default)]
struct CorrelationEntry {
    requests: Vec<RecordedRequest>,
    responses: VecDeque<ProgrammedResponse>,
}

/// Concurrent mapping from trace identifier to the requests received, and the responses queued, for that trace.
///
/// Each trace has its own entry, created on first reference and kept for the lifetime of the store. Operations on the
/// same trace are serialized by a lock held only for the duration of a single push or pop, while operations on
/// different traces never contend with one another.
///
/// Responses are delivered strictly in the order they were enqueued: the Nth request that finds a response waiting
/// gets the Nth response enqueued for its trace.
pub struct CorrelationStore {
    entries: HashMap<TraceId, Arc<Mutex<CorrelationEntry>>, FastBuildHasher>,
}

impl CorrelationStore {
    /// Creates a new, empty `CorrelationStore`.
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_hasher(FastBuildHasher::default()),
        }
    }

    fn entry(&self, trace_id: &TraceId) -> Arc<Mutex<CorrelationEntry>> {
        let entries = self.entries.pin();
        if let Some(entry) = entries.get(trace_id) {
            return Arc::clone(entry);
        }

        Arc::clone(entries.get_or_insert_with(trace_id.clone(), Default::default))
    }

    fn existing_entry(&self, trace_id: &TraceId) -> Option<Arc<Mutex<CorrelationEntry>>> {
        self.entries.pin().get(trace_id).map(Arc::clone)
    }

    /// Appends a request to the request log of the given trace.
    pub fn record_request(&self, trace_id: &TraceId, request: RecordedRequest) {
        let entry = self.entry(trace_id);
        lock(&entry).requests.push(request);
    }

    /// Appends a response to the response queue of the given trace.
    pub fn enqueue_response(&self, trace_id: &TraceId, response: ProgrammedResponse) {
        let entry = self.entry(trace_id);
        lock(&entry).responses.push_back(response);
    }

    /// Removes and returns the next queued response for the given trace.
    ///
    /// Returns `None` if the trace is unknown or its queue is empty.
    pub fn next_response(&self, trace_id: &TraceId) -> Option<ProgrammedResponse> {
        let entry = self.existing_entry(trace_id)?;
        let response = lock(&entry).responses.pop_front();
        response
    }

    /// Records a request and pops the next queued response for its trace, as one step.
    ///
    /// The request is always recorded, whether or not a response is available.
    pub fn exchange(&self, trace_id: &TraceId, request: RecordedRequest) -> Option<ProgrammedResponse> {
        let entry = self.entry(trace_id);
        let mut entry = lock(&entry);
        entry.requests.push(request);
        entry.responses.pop_front()
    }

    /// Returns a snapshot of every request recorded so far for the given trace, in arrival order.
    pub fn requests_for(&self, trace_id: &TraceId) -> Vec<RecordedRequest> {
        let Some(entry) = self.existing_entry(trace_id) else {
            return Vec::new();
        };

        let requests = lock(&entry).requests.clone();
        requests
    }

    /// Returns the number of responses still queued for the given trace.
    pub fn pending_responses(&self, trace_id: &TraceId) -> usize {
        let Some(entry) = self.existing_entry(trace_id) else {
            return 0;
        };

        let pending = lock(&entry).responses.len();
        pending
    }

    /// Returns `true` if the given trace has been referenced at least once.
    pub fn contains(&self, trace_id: &TraceId) -> bool {
        self.entries.pin().contains_key(trace_id)
    }

    /// Returns the number of traces that have been referenced.
    pub fn trace_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CorrelationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationStore")
            .field("traces", &self.trace_count())
            .finish()
    }
}

// Critical sections only ever push or pop a single element, so a poisoned entry is still consistent.
fn lock(entry: &Mutex<CorrelationEntry>) -> MutexGuard<'_, CorrelationEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
