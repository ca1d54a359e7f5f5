use serde::Serialize;
use shared::domain::OrderId;

use crate::{
    error::SyncError,
    token::{FetchToken, TokenSource},
    FetchOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidentPhase {
    Empty,
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidentSnapshot<T> {
    pub phase: ResidentPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Only the latest `begin` may commit.
pub(crate) struct ResidentSlot<T> {
    phase: ResidentPhase,
    requested: Option<OrderId>,
    resident: Option<(OrderId, T)>,
    tokens: TokenSource,
    last_error: Option<SyncError>,
}

impl<T: Clone> ResidentSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            phase: ResidentPhase::Empty,
            requested: None,
            resident: None,
            tokens: TokenSource::default(),
            last_error: None,
        }
    }

    pub(crate) fn begin(&mut self, id: OrderId) -> FetchToken {
        let token = self.tokens.mint();
        self.requested = Some(id);
        if self.resident_id() != Some(id) {
            self.resident = None;
        }
        self.phase = ResidentPhase::Loading;
        token
    }

    /// Applies a fetch result; `None` when the token has been superseded.
    pub(crate) fn commit(
        &mut self,
        token: FetchToken,
        result: Result<T, SyncError>,
    ) -> Option<Result<FetchOutcome, SyncError>> {
        if !self.tokens.is_current(token) {
            return None;
        }
        let id = self.requested?;
        Some(match result {
            Ok(value) => {
                self.resident = Some((id, value));
                self.phase = ResidentPhase::Loaded;
                self.last_error = None;
                Ok(FetchOutcome::Applied)
            }
            Err(err) => {
                self.resident = None;
                self.phase = ResidentPhase::Error;
                self.last_error = Some(err.clone());
                Err(err)
            }
        })
    }

    pub(crate) fn clear(&mut self) {
        self.tokens.mint();
        self.phase = ResidentPhase::Empty;
        self.requested = None;
        self.resident = None;
        self.last_error = None;
    }

    pub(crate) fn requested(&self) -> Option<OrderId> {
        self.requested
    }

    pub(crate) fn resident_id(&self) -> Option<OrderId> {
        self.resident.as_ref().map(|(id, _)| *id)
    }

    pub(crate) fn resident_for(&self, id: OrderId) -> Option<&T> {
        match &self.resident {
            Some((resident_id, value)) if *resident_id == id => Some(value),
            _ => None,
        }
    }

    pub(crate) fn snapshot(&self) -> ResidentSnapshot<T> {
        ResidentSnapshot {
            phase: self.phase,
            requested: self.requested,
            value: self.resident.as_ref().map(|(_, value)| value.clone()),
            error: self.last_error.as_ref().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::TransportError;

    #[test]
    fn switching_orders_drops_the_previous_resident_immediately() {
        let mut slot = ResidentSlot::<&str>::new();
        let first = slot.begin(OrderId(1));
        assert!(slot.commit(first, Ok("one")).is_some());
        assert_eq!(slot.resident_for(OrderId(1)), Some(&"one"));

        slot.begin(OrderId(2));
        assert_eq!(slot.snapshot().value, None);
        assert_eq!(slot.snapshot().phase, ResidentPhase::Loading);
    }

    #[test]
    fn reloading_the_same_order_keeps_it_visible() {
        let mut slot = ResidentSlot::<&str>::new();
        let first = slot.begin(OrderId(1));
        slot.commit(first, Ok("one"));

        slot.begin(OrderId(1));
        assert_eq!(slot.snapshot().value, Some("one"));
    }

    #[test]
    fn superseded_commit_is_ignored() {
        let mut slot = ResidentSlot::<&str>::new();
        let stale = slot.begin(OrderId(1));
        let latest = slot.begin(OrderId(2));

        assert!(slot.commit(stale, Ok("one")).is_none());
        assert_eq!(slot.snapshot().value, None);
        assert!(slot.commit(latest, Ok("two")).is_some());
        assert_eq!(slot.resident_id(), Some(OrderId(2)));
    }

    #[test]
    fn failure_clears_to_empty_and_records_error() {
        let mut slot = ResidentSlot::<&str>::new();
        let first = slot.begin(OrderId(1));
        slot.commit(first, Ok("one"));

        let retry = slot.begin(OrderId(1));
        let outcome = slot.commit(
            retry,
            Err(SyncError::Transport(TransportError::unavailable("offline"))),
        );
        assert!(matches!(outcome, Some(Err(_))));
        let snapshot = slot.snapshot();
        assert_eq!(snapshot.phase, ResidentPhase::Error);
        assert_eq!(snapshot.value, None);
        assert_eq!(snapshot.error.as_deref(), Some("offline"));
    }

    #[test]
    fn clear_voids_in_flight_loads() {
        let mut slot = ResidentSlot::<&str>::new();
        let token = slot.begin(OrderId(1));
        slot.clear();
        assert!(slot.commit(token, Ok("one")).is_none());
        assert_eq!(slot.snapshot().phase, ResidentPhase::Empty);
    }
}
