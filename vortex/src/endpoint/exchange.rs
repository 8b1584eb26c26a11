//! Exchange: the unit of work passed from producers to consumers.

use std::fmt;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;

use crate::config::WaitForTaskToComplete;
use crate::disruptor::Sequence;
use crate::error::VortexError;

/// Bound for exchange bodies
pub trait Payload: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Payload for T {}

/// One-shot callback run when an exchange completes
pub type OnCompletion<T> = Box<dyn FnOnce(&Exchange<T>) + Send>;

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePattern {
    /// Fire and forget
    #[default]
    InOnly,
    /// Request/reply, the producer expects the processed result
    InOut,
}

/// Where a consumer's copy was dispatched from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchInfo {
    pub sequence: Sequence,
    pub ordinal: usize,
    pub consumer_id: usize,
}

pub struct Exchange<T> {
    id: u64,
    body: T,
    pattern: ExchangePattern,
    error: Option<VortexError>,
    wait_for_task_to_complete: Option<WaitForTaskToComplete>,
    ignored: Arc<AtomicBool>,
    dispatch: Option<DispatchInfo>,
    on_completion: Vec<OnCompletion<T>>,
}

impl<T> Exchange<T> {
    pub fn new(body: T) -> Self {
        Self {
            id: NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed),
            body,
            pattern: ExchangePattern::InOnly,
            error: None,
            wait_for_task_to_complete: None,
            ignored: Arc::new(AtomicBool::new(false)),
            dispatch: None,
            on_completion: Vec::new(),
        }
    }

    /// A request/reply exchange
    pub fn in_out(body: T) -> Self {
        Self::new(body).with_pattern(ExchangePattern::InOut)
    }

    pub fn with_pattern(mut self, pattern: ExchangePattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Override the endpoint's wait policy for this exchange
    pub fn with_wait_for_task_to_complete(mut self, wait: WaitForTaskToComplete) -> Self {
        self.wait_for_task_to_complete = Some(wait);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut T {
        &mut self.body
    }

    pub fn set_body(&mut self, body: T) {
        self.body = body;
    }

    pub fn into_body(self) -> T {
        self.body
    }

    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    pub fn is_reply_expected(&self) -> bool {
        self.pattern == ExchangePattern::InOut
    }

    pub fn error(&self) -> Option<&VortexError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: VortexError) {
        self.error = Some(error);
    }

    pub fn take_error(&mut self) -> Option<VortexError> {
        self.error.take()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn wait_for_task_to_complete(&self) -> Option<WaitForTaskToComplete> {
        self.wait_for_task_to_complete
    }

    /// Whether consumers should skip this exchange.
    ///
    /// The marker is shared by an exchange and all of its copies.
    pub fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::Acquire)
    }

    pub fn mark_ignored(&self) {
        self.ignored.store(true, Ordering::Release);
    }

    pub(crate) fn ignore_marker(&self) -> Arc<AtomicBool> {
        self.ignored.clone()
    }

    /// Set on the copy handed to a consumer
    pub fn dispatch(&self) -> Option<DispatchInfo> {
        self.dispatch
    }

    pub(crate) fn set_dispatch(&mut self, dispatch: DispatchInfo) {
        self.dispatch = Some(dispatch);
    }

    pub fn add_on_completion(&mut self, callback: impl FnOnce(&Exchange<T>) + Send + 'static) {
        self.on_completion.push(Box::new(callback));
    }

    pub fn completion_count(&self) -> usize {
        self.on_completion.len()
    }

    /// Take the completion callbacks, leaving none on this exchange
    pub fn handover_completions(&mut self) -> Vec<OnCompletion<T>> {
        std::mem::take(&mut self.on_completion)
    }

    pub(crate) fn restore_completions(&mut self, callbacks: Vec<OnCompletion<T>>) {
        self.on_completion.extend(callbacks);
    }

    /// Run and clear the completion callbacks
    pub fn done(&mut self) {
        for callback in self.handover_completions() {
            callback(self);
        }
    }
}

impl<T: Clone> Exchange<T> {
    /// Copy with the same id and ignore marker, without completion callbacks
    pub fn copy(&self) -> Self {
        Self {
            id: self.id,
            body: self.body.clone(),
            pattern: self.pattern,
            error: self.error.clone(),
            wait_for_task_to_complete: self.wait_for_task_to_complete,
            ignored: self.ignored.clone(),
            dispatch: None,
            on_completion: Vec::new(),
        }
    }

    /// Take over the body and error of a processed exchange
    pub fn copy_results_from(&mut self, other: &Exchange<T>) {
        self.body = other.body.clone();
        self.error = other.error.clone();
    }
}

impl<T: fmt::Debug> fmt::Debug for Exchange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("body", &self.body)
            .field("pattern", &self.pattern)
            .field("error", &self.error)
            .field("ignored", &self.is_ignored())
            .field("dispatch", &self.dispatch)
            .field("on_completion", &self.on_completion.len())
            .finish()
    }
}
