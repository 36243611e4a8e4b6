//! Search resolution for the combobox
//!
//! A [`SearchResolver`] turns the settled query and the item list into the
//! result set shown in the panel. Resolution is either immediate (no query,
//! search disabled, the built-in label filter, or a synchronous [`SearchFn`])
//! or pending on a future returned by an asynchronous `SearchFn`.
//!
//! Every resolution bumps a generation counter. A pending future carries the
//! generation it was started with and [`SearchResolver::finish`] only applies
//! its outcome if nothing newer was started since, so a slow lookup for `"k"`
//! can never overwrite the results for `"ky"`.

use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use selecta_core::{Scheduler, TaskId};
use thiserror::Error;

/// Result of a caller-supplied search
pub type SearchResult<T> = Result<Vec<Rc<T>>, SearchError>;

/// Errors an asynchronous search can finish with
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search failed: {0}")]
    Failed(String),
    #[error("search was cancelled before it produced results")]
    Cancelled,
}

impl From<futures::channel::oneshot::Canceled> for SearchError {
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        SearchError::Cancelled
    }
}

/// What a [`SearchFn`] hands back: results now, or a future of results
pub enum SearchOutcome<T> {
    Ready(Vec<Rc<T>>),
    Pending(LocalBoxFuture<'static, SearchResult<T>>),
}

/// Caller-supplied search over the item list
///
/// Receives the trimmed, lowercased query and the full item list. It is
/// called in the middle of a widget update and must not call back into the
/// widget; slow work belongs in the returned future.
///
/// Two `SearchFn`s are the same function only if one is a clone of the other.
pub struct SearchFn<T> {
    f: Rc<dyn Fn(&str, &[Rc<T>]) -> SearchOutcome<T>>,
}

impl<T: 'static> SearchFn<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &[Rc<T>]) -> SearchOutcome<T> + 'static,
    {
        Self { f: Rc::new(f) }
    }

    /// A search that answers immediately
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&str, &[Rc<T>]) -> Vec<Rc<T>> + 'static,
    {
        Self::new(move |query, items| SearchOutcome::Ready(f(query, items)))
    }

    /// A search that answers through a future, e.g. a server lookup
    ///
    /// ```ignore
    /// let search = SearchFn::future(move |query: &str, items: &[Rc<City>]| {
    ///     let (query, items) = (query.to_string(), items.to_vec());
    ///     let sleep = scheduler.sleep(Duration::from_millis(300));
    ///     async move {
    ///         sleep.await;
    ///         Ok(items.into_iter().filter(|c| c.name.to_lowercase().contains(&query)).collect())
    ///     }
    /// });
    /// ```
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(&str, &[Rc<T>]) -> Fut + 'static,
        Fut: Future<Output = SearchResult<T>> + 'static,
    {
        Self::new(move |query, items| SearchOutcome::Pending(f(query, items).boxed_local()))
    }

    pub fn call(&self, query: &str, items: &[Rc<T>]) -> SearchOutcome<T> {
        (self.f)(query, items)
    }

    pub fn same_as(&self, other: &SearchFn<T>) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<T> Clone for SearchFn<T> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<T> std::fmt::Debug for SearchFn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SearchFn({:p})", Rc::as_ptr(&self.f))
    }
}

/// Trimmed, lowercased form of a query
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Items whose label contains `query` (already normalized), case-insensitively
pub fn filter_by_label<T>(items: &[Rc<T>], query: &str, label: &dyn Fn(&T) -> String) -> Vec<Rc<T>> {
    items
        .iter()
        .filter(|item| label(item).to_lowercase().contains(query))
        .cloned()
        .collect()
}

/// Inputs of one resolution
pub struct SearchRequest<'a, T> {
    /// Settled query, as typed
    pub query: &'a str,
    pub items: &'a [Rc<T>],
    pub searchable: bool,
    pub search_fn: Option<&'a SearchFn<T>>,
    pub label: &'a dyn Fn(&T) -> String,
}

/// A resolution waiting on a future
pub struct PendingSearch<T> {
    pub generation: u64,
    pub future: LocalBoxFuture<'static, SearchResult<T>>,
}

/// Owns the result set, the loading flag and the stale-result guard
pub struct SearchResolver<T> {
    scheduler: Scheduler,
    generation: u64,
    results: Vec<Rc<T>>,
    loading: bool,
    last_error: Option<SearchError>,
    task: Option<TaskId>,
    /// Bumped whenever `results` or `loading` change
    revision: u64,
}

impl<T: 'static> SearchResolver<T> {
    pub fn new(scheduler: &Scheduler, items: &[Rc<T>]) -> Self {
        Self {
            scheduler: scheduler.clone(),
            generation: 0,
            results: items.to_vec(),
            loading: false,
            last_error: None,
            task: None,
            revision: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn results(&self) -> &[Rc<T>] {
        &self.results
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&SearchError> {
        self.last_error.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Make every in-flight resolution stale and drop its task
    pub fn invalidate(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            self.scheduler.cancel_task(task);
        }
        if self.loading {
            self.loading = false;
            self.revision += 1;
        }
    }

    /// Invalidate and show `items` unfiltered
    pub fn reset(&mut self, items: &[Rc<T>]) {
        self.invalidate();
        self.results = items.to_vec();
        self.revision += 1;
    }

    /// Start a new resolution
    ///
    /// Returns `None` when the results were replaced right away, or the
    /// future to drive when the search function answered asynchronously.
    pub fn resolve(&mut self, request: SearchRequest<'_, T>) -> Option<PendingSearch<T>> {
        self.invalidate();
        let query = normalize_query(request.query);

        let outcome = match request.search_fn {
            _ if !request.searchable || query.is_empty() => {
                SearchOutcome::Ready(request.items.to_vec())
            }
            Some(search_fn) => search_fn.call(&query, request.items),
            None => SearchOutcome::Ready(filter_by_label(request.items, &query, request.label)),
        };

        match outcome {
            SearchOutcome::Ready(results) => {
                self.results = results;
                self.last_error = None;
                self.revision += 1;
                None
            }
            SearchOutcome::Pending(future) => {
                self.loading = true;
                self.revision += 1;
                Some(PendingSearch {
                    generation: self.generation,
                    future,
                })
            }
        }
    }

    /// Remember the task driving the current pending resolution
    pub fn track(&mut self, task: TaskId) {
        self.task = Some(task);
    }

    /// Apply the outcome of the resolution started as `generation`
    ///
    /// Stale outcomes are dropped and leave everything untouched. A failure
    /// clears the loading flag but keeps the previous results. Returns whether
    /// the outcome was current.
    pub fn finish(&mut self, generation: u64, result: SearchResult<T>) -> bool {
        if generation != self.generation {
            tracing::trace!(generation, current = self.generation, "discarding stale search result");
            return false;
        }

        self.task = None;
        self.loading = false;
        self.revision += 1;
        match result {
            Ok(results) => {
                self.results = results;
                self.last_error = None;
            }
            Err(err) => {
                tracing::warn!(%err, "search failed, keeping previous results");
                self.last_error = Some(err);
            }
        }
        true
    }
}
