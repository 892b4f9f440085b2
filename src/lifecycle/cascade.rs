use core::fmt;
use core::ops::Deref;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use super::reclaim::keep_first;
use super::{Lifecycle, NotifyRelease, OwnedField, QueryRelease, Release, ReleaseEvent};
use crate::error::{ReleaseError, ReleasedError};
use crate::observer::WeakObserverRegistry;

/// State whose owned fields can be released by a [`Cascade`].
///
/// Normally derived with `#[derive(OwnedState)]`:
///
/// - fields are walked in declaration order, then each `#[release(base)]`
///   field's own layer;
/// - `#[release(not_owned)]` fields are recorded and left untouched;
/// - `#[release(teardown = method)]` and `#[release(unmanaged = method)]` on
///   the struct name the hooks below.
pub trait OwnedState {
    /// Visits and releases every owned field, recording each in `walker`.
    fn release_owned(&self, walker: &mut Walker);

    /// Managed teardown run before the field walk.
    ///
    /// # Errors
    /// Any failure; the walk still runs and this error wins.
    fn teardown(&self) -> Result<(), ReleaseError> {
        Ok(())
    }

    /// Releases non-owned native resources. Runs on every release path,
    /// including the drop backstop.
    fn release_unmanaged(&self) {}
}

/// What happened to one field during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The field was classified and, unless [`OwnedField::Skip`], released.
    Visited(OwnedField),
    /// The field is annotated as not owned.
    NotOwned,
    /// Releasing the field failed.
    Failed,
}

/// One entry of a [`ReleaseReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldVisit {
    /// The type that declares the field.
    pub layer: &'static str,
    /// The field name, or its index for tuple structs.
    pub field: &'static str,
    /// The result.
    pub outcome: FieldOutcome,
}

/// Per-field log of one cascade walk, most-derived layer first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    visits: Vec<FieldVisit>,
}

impl ReleaseReport {
    /// Every visited field, in walk order.
    pub fn visits(&self) -> &[FieldVisit] {
        &self.visits
    }

    /// The outcome for the first field called `field`, in any layer.
    pub fn outcome_of(&self, field: &str) -> Option<FieldOutcome> {
        self.visits
            .iter()
            .find(|visit| visit.field == field)
            .map(|visit| visit.outcome)
    }

    /// Number of fields that actually released something.
    pub fn released_count(&self) -> usize {
        self.visits
            .iter()
            .filter(|visit| {
                matches!(visit.outcome, FieldOutcome::Visited(kind) if kind != OwnedField::Skip)
            })
            .count()
    }
}

/// Cursor handed to [`OwnedState::release_owned`].
///
/// Failures are collected rather than propagated so the remaining fields are
/// still released; the first one is reported at the end.
#[derive(Debug, Default)]
pub struct Walker {
    layer: &'static str,
    visits: Vec<FieldVisit>,
    first_error: Option<ReleaseError>,
}

impl Walker {
    /// An empty walk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording fields declared by `layer`.
    pub fn enter_layer(&mut self, layer: &'static str) {
        self.layer = layer;
    }

    /// Records the result of releasing `field`.
    pub fn record(&mut self, field: &'static str, outcome: Result<OwnedField, ReleaseError>) {
        let outcome = match outcome {
            Ok(kind) => FieldOutcome::Visited(kind),
            Err(err) => {
                debug!(layer = self.layer, field, error = %err, "field release failed");
                keep_first(&mut self.first_error, Err(err));
                FieldOutcome::Failed
            }
        };
        self.push(field, outcome);
    }

    /// Records that `field` is not owned and was left alone.
    pub fn not_owned(&mut self, field: &'static str) {
        self.push(field, FieldOutcome::NotOwned);
    }

    /// Ends the walk.
    ///
    /// # Errors
    /// The first field failure, returned alongside the full report.
    pub fn finish(self) -> (ReleaseReport, Result<(), ReleaseError>) {
        let report = ReleaseReport {
            visits: self.visits,
        };
        (report, self.first_error.map_or(Ok(()), Err))
    }

    fn push(&mut self, field: &'static str, outcome: FieldOutcome) {
        self.visits.push(FieldVisit {
            layer: self.layer,
            field,
            outcome,
        });
    }
}

/// A release-gated owner of `S`.
///
/// [`release`](Release::release) runs exactly once: it notifies the
/// releasing listeners, runs [`OwnedState::teardown`], walks the owned
/// fields, then runs [`OwnedState::release_unmanaged`]. Dropping a cascade
/// that was never released runs only the unmanaged step and logs a warning;
/// release explicitly instead.
pub struct Cascade<S: OwnedState> {
    lifecycle: Lifecycle,
    state: S,
    report: Mutex<Option<ReleaseReport>>,
}

impl<S: OwnedState> Cascade<S> {
    /// Wraps `state`.
    pub fn new(state: S) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            state,
            report: Mutex::new(None),
        }
    }

    /// Fails once released.
    ///
    /// # Errors
    /// [`ReleasedError`] naming `S`.
    pub fn check_live(&self) -> Result<(), ReleasedError> {
        self.lifecycle.check_live(core::any::type_name::<S>())
    }

    /// The wrapped state, or an error once released.
    ///
    /// # Errors
    /// [`ReleasedError`] naming `S`.
    pub fn try_get(&self) -> Result<&S, ReleasedError> {
        self.check_live().map(|()| &self.state)
    }

    /// The report of the completed walk, if release has run.
    pub fn report(&self) -> Option<ReleaseReport> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: OwnedState> Deref for Cascade<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.state
    }
}

impl<S: OwnedState + 'static> Release for Cascade<S> {
    fn release(&self) -> Result<(), ReleaseError> {
        let type_name = core::any::type_name::<S>();
        self.lifecycle
            .run(self, type_name, || {
                let teardown = self.state.teardown();

                let mut walker = Walker::new();
                self.state.release_owned(&mut walker);
                self.state.release_unmanaged();
                let (report, walked) = walker.finish();

                debug!(
                    type_name,
                    fields = report.visits().len(),
                    released = report.released_count(),
                    "cascade walk finished"
                );
                *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
                teardown.and(walked)
            })
            .map(drop)
    }
}

impl<S: OwnedState + 'static> QueryRelease for Cascade<S> {
    fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    fn is_releasing(&self) -> bool {
        self.lifecycle.is_releasing()
    }
}

impl<S: OwnedState + 'static> NotifyRelease for Cascade<S> {
    fn releasing(&self) -> &WeakObserverRegistry<ReleaseEvent> {
        self.lifecycle.listeners()
    }
}

impl<S: OwnedState> Drop for Cascade<S> {
    fn drop(&mut self) {
        if !self.lifecycle.is_released() {
            warn!(
                type_name = core::any::type_name::<S>(),
                "cascade dropped without release; releasing unmanaged resources only"
            );
            self.state.release_unmanaged();
        }
    }
}

impl<S: OwnedState + fmt::Debug> fmt::Debug for Cascade<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cascade")
            .field("state", &self.state)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
