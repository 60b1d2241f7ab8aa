//! Booking flow state machine.
//!
//! A draft walks `select-teacher → select-availability → payment →
//! request-form` and ends when the request is submitted. Back-navigation
//! moves exactly one state and drops whatever that state had captured, so a
//! student who goes back to pick a different slot cannot submit with the old
//! one attached.
//!
//! Drafts are in-memory only; the first durable write happens at settlement.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::db::SessionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowState {
    SelectTeacher,
    SelectAvailability,
    Payment,
    RequestForm,
    Submitted,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectTeacher => write!(f, "select-teacher"),
            Self::SelectAvailability => write!(f, "select-availability"),
            Self::Payment => write!(f, "payment"),
            Self::RequestForm => write!(f, "request-form"),
            Self::Submitted => write!(f, "submitted"),
        }
    }
}

/// What kind of booking the chosen offer implies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Individual,
    Course,
}

/// The offer a student picked in the select-availability state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum OfferRef {
    Slot(String),
    Course(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("operation requires state {expected}, draft is in {actual}")]
    WrongState {
        expected: FlowState,
        actual: FlowState,
    },
    #[error("teacher id must not be empty")]
    EmptyTeacherId,
    #[error("order id must not be empty")]
    EmptyOrderId,
    #[error("cannot navigate back from {0}")]
    AtStart(FlowState),
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDraft {
    pub id: String,
    pub student_id: String,
    pub state: FlowState,
    pub teacher_id: Option<String>,
    pub offer: Option<OfferRef>,
    pub kind: Option<BookingKind>,
    pub order_id: Option<String>,
    pub created_at: String,
}

impl BookingDraft {
    pub fn new(student_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            state: FlowState::SelectTeacher,
            teacher_id: None,
            offer: None,
            kind: None,
            order_id: None,
            created_at: crate::util::now_rfc3339(),
        }
    }

    fn expect_state(&self, expected: FlowState) -> Result<(), FlowError> {
        if self.state != expected {
            return Err(FlowError::WrongState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub fn select_teacher(&mut self, teacher_id: &str) -> Result<(), FlowError> {
        self.expect_state(FlowState::SelectTeacher)?;
        if teacher_id.is_empty() {
            return Err(FlowError::EmptyTeacherId);
        }
        self.teacher_id = Some(teacher_id.to_string());
        self.state = FlowState::SelectAvailability;
        Ok(())
    }

    /// Choose an availability slot. The booking kind is individual only when
    /// the slot itself says so; group slots book like course purchases.
    pub fn select_slot(
        &mut self,
        slot_id: &str,
        session_type: Option<SessionType>,
    ) -> Result<(), FlowError> {
        self.expect_state(FlowState::SelectAvailability)?;
        self.offer = Some(OfferRef::Slot(slot_id.to_string()));
        self.kind = Some(match session_type {
            Some(SessionType::Individual) => BookingKind::Individual,
            _ => BookingKind::Course,
        });
        self.state = FlowState::Payment;
        Ok(())
    }

    pub fn select_course(&mut self, course_id: &str) -> Result<(), FlowError> {
        self.expect_state(FlowState::SelectAvailability)?;
        self.offer = Some(OfferRef::Course(course_id.to_string()));
        self.kind = Some(BookingKind::Course);
        self.state = FlowState::Payment;
        Ok(())
    }

    /// Record the gateway order and advance to the request form.
    pub fn confirm_payment(&mut self, order_id: &str) -> Result<(), FlowError> {
        self.expect_state(FlowState::Payment)?;
        if order_id.is_empty() {
            return Err(FlowError::EmptyOrderId);
        }
        self.order_id = Some(order_id.to_string());
        self.state = FlowState::RequestForm;
        Ok(())
    }

    pub fn mark_submitted(&mut self) -> Result<(), FlowError> {
        self.expect_state(FlowState::RequestForm)?;
        self.state = FlowState::Submitted;
        Ok(())
    }

    /// Move one state backwards, clearing what the abandoned state captured.
    pub fn back(&mut self) -> Result<(), FlowError> {
        self.state = match self.state {
            FlowState::SelectTeacher => return Err(FlowError::AtStart(self.state)),
            FlowState::SelectAvailability => {
                self.teacher_id = None;
                FlowState::SelectTeacher
            }
            FlowState::Payment => {
                self.offer = None;
                self.kind = None;
                FlowState::SelectAvailability
            }
            FlowState::RequestForm => {
                self.order_id = None;
                FlowState::Payment
            }
            FlowState::Submitted => return Err(FlowError::AtStart(self.state)),
        };
        Ok(())
    }
}

/// In-memory draft store shared across handlers
#[derive(Clone, Default)]
pub struct DraftStore {
    inner: Arc<DashMap<String, BookingDraft>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, draft: BookingDraft) {
        self.inner.insert(draft.id.clone(), draft);
    }

    pub fn get(&self, id: &str) -> Option<BookingDraft> {
        self.inner.get(id).map(|d| d.clone())
    }

    pub fn remove(&self, id: &str) -> Option<BookingDraft> {
        self.inner.remove(id).map(|(_, d)| d)
    }

    /// Apply a mutation to a stored draft under its shard lock.
    pub fn update<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut BookingDraft) -> Result<T, FlowError>,
    ) -> Option<Result<T, FlowError>> {
        self.inner.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_at_payment() -> BookingDraft {
        let mut draft = BookingDraft::new("student-1");
        draft.select_teacher("teacher-1").unwrap();
        draft
            .select_slot("slot-1", Some(SessionType::Individual))
            .unwrap();
        draft
    }

    #[test]
    fn happy_path_walks_all_four_states() {
        let mut draft = BookingDraft::new("student-1");
        assert_eq!(draft.state, FlowState::SelectTeacher);

        draft.select_teacher("teacher-1").unwrap();
        assert_eq!(draft.state, FlowState::SelectAvailability);

        draft
            .select_slot("slot-1", Some(SessionType::Individual))
            .unwrap();
        assert_eq!(draft.state, FlowState::Payment);
        assert_eq!(draft.kind, Some(BookingKind::Individual));

        draft.confirm_payment("order_abc").unwrap();
        assert_eq!(draft.state, FlowState::RequestForm);

        draft.mark_submitted().unwrap();
        assert_eq!(draft.state, FlowState::Submitted);
    }

    #[test]
    fn individual_session_type_is_the_only_individual_kind() {
        let mut draft = BookingDraft::new("s");
        draft.select_teacher("t").unwrap();
        draft
            .select_slot("slot", Some(SessionType::Group))
            .unwrap();
        assert_eq!(draft.kind, Some(BookingKind::Course));

        let mut draft = BookingDraft::new("s");
        draft.select_teacher("t").unwrap();
        draft.select_slot("slot", None).unwrap();
        assert_eq!(draft.kind, Some(BookingKind::Course));

        let mut draft = BookingDraft::new("s");
        draft.select_teacher("t").unwrap();
        draft.select_course("course").unwrap();
        assert_eq!(draft.kind, Some(BookingKind::Course));
    }

    #[test]
    fn empty_teacher_id_is_rejected() {
        let mut draft = BookingDraft::new("s");
        assert_eq!(draft.select_teacher(""), Err(FlowError::EmptyTeacherId));
        assert_eq!(draft.state, FlowState::SelectTeacher);
    }

    #[test]
    fn out_of_order_operations_are_rejected() {
        let mut draft = BookingDraft::new("s");
        assert!(matches!(
            draft.confirm_payment("order"),
            Err(FlowError::WrongState { .. })
        ));
        assert!(matches!(
            draft.select_slot("slot", None),
            Err(FlowError::WrongState { .. })
        ));
        assert!(matches!(
            draft.mark_submitted(),
            Err(FlowError::WrongState { .. })
        ));
    }

    #[test]
    fn back_clears_the_abandoned_selection() {
        let mut draft = draft_at_payment();
        draft.confirm_payment("order_abc").unwrap();

        draft.back().unwrap();
        assert_eq!(draft.state, FlowState::Payment);
        assert_eq!(draft.order_id, None);

        draft.back().unwrap();
        assert_eq!(draft.state, FlowState::SelectAvailability);
        assert_eq!(draft.offer, None);
        assert_eq!(draft.kind, None);

        draft.back().unwrap();
        assert_eq!(draft.state, FlowState::SelectTeacher);
        assert_eq!(draft.teacher_id, None);

        assert!(matches!(draft.back(), Err(FlowError::AtStart(_))));
    }

    #[test]
    fn store_update_runs_under_the_entry() {
        let store = DraftStore::new();
        let draft = BookingDraft::new("s");
        let id = draft.id.clone();
        store.insert(draft);

        let result = store.update(&id, |d| d.select_teacher("t")).unwrap();
        assert!(result.is_ok());
        assert_eq!(
            store.get(&id).unwrap().state,
            FlowState::SelectAvailability
        );

        assert!(store.update("missing", |d| d.select_teacher("t")).is_none());
    }
}
