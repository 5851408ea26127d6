//! Error/loading state shared by every collection.
//!
//! Each operation takes a ticket on entry and settles it on exit; the
//! collection is loading while any ticket of the current epoch is open.
//! Changing identity starts a new epoch, which both clears the state and
//! disowns tickets still held by in-flight operations.

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Error(String),
}

#[derive(Debug, Default)]
pub(crate) struct OpState {
    epoch: u64,
    in_flight: usize,
    error: Option<AppError>,
}

impl OpState {
    /// Enters `Loading`, clearing any previous error.
    pub fn begin(&mut self) -> u64 {
        self.in_flight += 1;
        self.error = None;
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    pub fn finish(&mut self, epoch: u64) {
        if self.is_current(epoch) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    /// Records `err` unless the ticket belongs to an older epoch.
    pub fn fail(&mut self, epoch: u64, err: AppError) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        self.error = Some(err);
        true
    }

    pub fn reset(&mut self) {
        self.epoch += 1;
        self.in_flight = 0;
        self.error = None;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    pub fn status(&self) -> Status {
        match (&self.error, self.loading()) {
            (_, true) => Status::Loading,
            (Some(err), false) => Status::Error(err.to_string()),
            (None, false) => Status::Idle,
        }
    }
}
