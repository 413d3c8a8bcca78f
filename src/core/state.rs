//! Session-scoped finance state: balance, movements and the selected date.
//!
//! Server fetches replace everything; local add/remove patch balance and list
//! in a single transition without re-fetching. Concurrent fetches are ordered
//! by a generation number so a slow, older response can never overwrite a
//! newer one.

use chrono::{Local, NaiveDate};
use futures::future::try_join;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::api::{ApiError, FinanceApi};
use super::movement::{BalanceSnapshot, Movement, MovementType, NewMovement, RecordId};
use super::session::SessionProvider;

pub const GENERIC_SUBMISSION_ERROR: &str = "Failed to register movement";

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error("{0}")]
    Validation(String),

    /// User-facing message for a failed write.
    #[error("{0}")]
    Submission(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoSession,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No user signed in; nothing was requested.
    NoSession,
    Committed,
    /// A newer fetch was issued while this one was in flight.
    Stale,
    /// Either request failed; prior state kept.
    Failed,
}

/// Point-in-time copy of everything a consumer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct FinanceSnapshot {
    pub balance: BalanceSnapshot,
    pub movements: Vec<Movement>,
    pub selected_date: NaiveDate,
    pub loading: bool,
}

struct Inner {
    balance: BalanceSnapshot,
    movements: Vec<Movement>,
    selected_date: NaiveDate,
    loading: bool,
}

pub struct FinanceState {
    api: Arc<dyn FinanceApi>,
    session: Arc<dyn SessionProvider>,
    inner: RwLock<Inner>,
    latest_generation: AtomicU64,
}

/// Clears the loading flag when the fetch that owns it ends, however it ends.
struct LoadingGuard<'a> {
    state: &'a FinanceState,
    generation: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.state.write();
        if self.state.is_latest(self.generation) {
            inner.loading = false;
        }
    }
}

impl FinanceState {
    pub fn new(api: Arc<dyn FinanceApi>, session: Arc<dyn SessionProvider>) -> Self {
        Self::with_date(api, session, Local::now().date_naive())
    }

    pub fn with_date(
        api: Arc<dyn FinanceApi>,
        session: Arc<dyn SessionProvider>,
        selected_date: NaiveDate,
    ) -> Self {
        Self {
            api,
            session,
            inner: RwLock::new(Inner {
                balance: BalanceSnapshot::default(),
                movements: Vec::new(),
                selected_date,
                loading: false,
            }),
            latest_generation: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.latest_generation.load(Ordering::SeqCst) == generation
    }

    pub fn snapshot(&self) -> FinanceSnapshot {
        let inner = self.read();
        FinanceSnapshot {
            balance: inner.balance,
            movements: inner.movements.clone(),
            selected_date: inner.selected_date,
            loading: inner.loading,
        }
    }

    pub fn balance(&self) -> BalanceSnapshot {
        self.read().balance
    }

    pub fn movements(&self) -> Vec<Movement> {
        self.read().movements.clone()
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.read().selected_date
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn phase(&self) -> Phase {
        if self.session.current_user().is_none() {
            Phase::NoSession
        } else if self.is_loading() {
            Phase::Loading
        } else {
            Phase::Ready
        }
    }

    /// Fetches balance and movements for the selected date.
    ///
    /// Both requests run concurrently and are committed together or not at
    /// all. Failures are logged and never returned.
    #[instrument(name = "FinanceFetch", skip(self))]
    pub async fn fetch(&self) -> FetchOutcome {
        if self.session.current_user().is_none() {
            debug!("No active session, skipping fetch");
            return FetchOutcome::NoSession;
        }

        let generation = self.latest_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let date = {
            let mut inner = self.write();
            inner.loading = true;
            inner.selected_date
        };
        let _guard = LoadingGuard {
            state: self,
            generation,
        };
        debug!(generation, %date, "Fetching finance data");

        let result = try_join(self.api.fetch_balance(date), self.api.fetch_movements(date)).await;

        match result {
            Ok((balance, movements)) => {
                let mut inner = self.write();
                if !self.is_latest(generation) {
                    debug!(generation, "Discarding stale finance data");
                    return FetchOutcome::Stale;
                }
                info!(
                    movements = movements.len(),
                    balance = balance.balance,
                    "Loaded finance data"
                );
                inner.balance = balance;
                inner.movements = movements;
                FetchOutcome::Committed
            }
            Err(e) => {
                error!(error = %e, %date, "Failed to load finance data");
                FetchOutcome::Failed
            }
        }
    }

    /// Explicit re-fetch for the current date.
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch().await
    }

    /// Changes the selected date and re-fetches.
    pub async fn select_date(&self, date: NaiveDate) -> FetchOutcome {
        self.write().selected_date = date;
        self.fetch().await
    }

    /// Reacts to a session change: fetch when signed in, reset otherwise.
    pub async fn sync_session(&self) -> FetchOutcome {
        if self.session.current_user().is_some() {
            self.fetch().await
        } else {
            self.clear();
            FetchOutcome::NoSession
        }
    }

    /// Resets balance and movements to their initial shape.
    pub fn clear(&self) {
        // Invalidate anything still in flight.
        self.latest_generation.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.write();
        inner.balance = BalanceSnapshot::default();
        inner.movements.clear();
        inner.loading = false;
    }

    /// Applies a movement locally and puts it at the head of the list.
    pub fn add_movement(&self, movement: Movement) {
        let mut inner = self.write();
        inner.balance.apply(movement.kind, movement.value);
        inner.movements.insert(0, movement);
    }

    /// Reverts the balance by `value`/`kind` and drops the first entry with
    /// `id`.
    ///
    /// The caller-supplied value and kind are trusted; if they differ from
    /// the stored movement the balance drifts.
    pub fn remove_movement(&self, id: &RecordId, value: f64, kind: MovementType) {
        let mut inner = self.write();
        inner.balance.revert(kind, value);
        if let Some(pos) = inner.movements.iter().position(|m| &m.id == id) {
            inner.movements.remove(pos);
        }
    }

    /// Submits a validated movement and applies the server's record locally.
    ///
    /// Input is validated before any request; local state is only touched
    /// once the server has accepted the movement.
    #[instrument(name = "RegisterMovement", skip(self, value, description))]
    pub async fn register_movement(
        &self,
        value: &str,
        description: &str,
        kind: MovementType,
    ) -> Result<Movement, FinanceError> {
        let movement =
            NewMovement::parse(value, description, kind).map_err(FinanceError::Validation)?;

        let created = self.api.create_movement(&movement).await.map_err(|e| {
            error!(error = %e, "Failed to register movement");
            match e {
                ApiError::SessionExpired => FinanceError::Api(e),
                other => FinanceError::Submission(
                    other
                        .server_message()
                        .unwrap_or(GENERIC_SUBMISSION_ERROR)
                        .to_string(),
                ),
            }
        })?;

        info!(id = %created.id, "Registered movement");
        self.add_movement(created.clone());
        Ok(created)
    }

    /// Deletes a movement on the server, then reverts it locally using the
    /// stored record.
    #[instrument(name = "DeleteMovement", skip(self), fields(id = %id))]
    pub async fn delete_movement(&self, id: &RecordId) -> Result<(), FinanceError> {
        self.api.delete_movement(id).await?;

        let mut inner = self.write();
        match inner.movements.iter().position(|m| &m.id == id) {
            Some(pos) => {
                let removed = inner.movements.remove(pos);
                inner.balance.revert(removed.kind, removed.value);
            }
            None => debug!("Deleted movement not in local list"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::api::ApiResult;
    use crate::core::session::{StaticSession, User};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn user() -> User {
        User {
            id: RecordId::from(1),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
        }
    }

    fn movement(id: u64, value: f64, kind: MovementType) -> Movement {
        Movement {
            id: RecordId::from(id),
            description: format!("movement {id}"),
            value,
            kind,
            date: "17/10/2026".to_string(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[derive(Default)]
    struct FakeApi {
        balance: Mutex<Option<BalanceSnapshot>>,
        movements: Mutex<Option<Vec<Movement>>>,
        create_result: Mutex<Option<ApiResult<Movement>>>,
        calls: AtomicUsize,
        deleted: Mutex<Vec<RecordId>>,
    }

    fn status(status: u16, message: Option<&str>) -> ApiError {
        ApiError::Status {
            status,
            message: message.map(str::to_string),
        }
    }

    #[async_trait]
    impl FinanceApi for FakeApi {
        async fn fetch_balance(&self, _date: NaiveDate) -> ApiResult<BalanceSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let balance = *self.balance.lock().unwrap();
            balance.ok_or_else(|| status(500, None))
        }

        async fn fetch_movements(&self, _date: NaiveDate) -> ApiResult<Vec<Movement>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.movements
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| status(500, None))
        }

        async fn create_movement(&self, _movement: &NewMovement) -> ApiResult<Movement> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.create_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(status(500, None)))
        }

        async fn delete_movement(&self, id: &RecordId) -> ApiResult<()> {
            self.deleted.lock().unwrap().push(id.clone());
            Ok(())
        }

        async fn fetch_profile(&self) -> ApiResult<User> {
            Ok(user())
        }
    }

    fn state_with(api: Arc<FakeApi>, signed_in: bool) -> FinanceState {
        let session = Arc::new(StaticSession::new(signed_in.then(user)));
        FinanceState::with_date(api, session, date())
    }

    #[test]
    fn test_add_income_then_expense() {
        let state = state_with(Arc::new(FakeApi::default()), true);

        state.add_movement(movement(1, 50.0, MovementType::Income));
        assert_eq!(state.balance(), BalanceSnapshot::new(50.0, 50.0, 0.0));
        assert_eq!(state.movements().len(), 1);

        state.add_movement(movement(2, 20.0, MovementType::Expense));
        assert_eq!(state.balance(), BalanceSnapshot::new(30.0, 50.0, 20.0));
        let ids: Vec<_> = state.movements().iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn test_head_is_most_recent() {
        let state = state_with(Arc::new(FakeApi::default()), true);
        for id in 1..=5 {
            state.add_movement(movement(id, 1.0, MovementType::Income));
            assert_eq!(state.movements()[0].id, RecordId::from(id));
        }
    }

    #[test]
    fn test_add_then_remove_round_trip() {
        let state = state_with(Arc::new(FakeApi::default()), true);
        state.add_movement(movement(9, 3.0, MovementType::Expense));
        let before = state.balance();

        state.add_movement(movement(1, 42.5, MovementType::Income));
        state.remove_movement(&RecordId::from(1), 42.5, MovementType::Income);

        assert_eq!(state.balance(), before);
        assert_eq!(state.movements().len(), 1);
    }

    #[test]
    fn test_remove_from_first_scenario() {
        let state = state_with(Arc::new(FakeApi::default()), true);
        state.add_movement(movement(1, 50.0, MovementType::Income));

        state.remove_movement(&RecordId::from(1), 50.0, MovementType::Income);
        assert_eq!(state.balance(), BalanceSnapshot::new(0.0, 0.0, 0.0));
        assert!(state.movements().is_empty());
    }

    #[test]
    fn test_remove_from_initial_state() {
        let state = state_with(Arc::new(FakeApi::default()), true);

        state.remove_movement(&RecordId::from(1), 50.0, MovementType::Income);
        assert_eq!(state.balance(), BalanceSnapshot::new(-50.0, -50.0, 0.0));
        assert!(state.movements().is_empty());
    }

    #[test]
    fn test_remove_unknown_id_keeps_list() {
        let state = state_with(Arc::new(FakeApi::default()), true);
        state.add_movement(movement(1, 50.0, MovementType::Income));

        state.remove_movement(&RecordId::from(99), 10.0, MovementType::Expense);
        assert_eq!(state.movements().len(), 1);
        assert_eq!(state.balance(), BalanceSnapshot::new(60.0, 50.0, -10.0));
    }

    #[test]
    fn test_remove_only_first_match() {
        let state = state_with(Arc::new(FakeApi::default()), true);
        state.add_movement(movement(1, 5.0, MovementType::Income));
        state.add_movement(movement(1, 5.0, MovementType::Income));

        state.remove_movement(&RecordId::from(1), 5.0, MovementType::Income);
        assert_eq!(state.movements().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_without_session_is_noop() {
        let api = Arc::new(FakeApi::default());
        *api.balance.lock().unwrap() = Some(BalanceSnapshot::new(1.0, 1.0, 0.0));
        *api.movements.lock().unwrap() = Some(vec![]);
        let state = state_with(api.clone(), false);

        assert_eq!(state.fetch().await, FetchOutcome::NoSession);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.balance(), BalanceSnapshot::default());
        assert_eq!(state.phase(), Phase::NoSession);
    }

    #[tokio::test]
    async fn test_fetch_replaces_state() {
        let api = Arc::new(FakeApi::default());
        *api.balance.lock().unwrap() = Some(BalanceSnapshot::new(80.0, 100.0, 20.0));
        *api.movements.lock().unwrap() = Some(vec![movement(3, 100.0, MovementType::Income)]);
        let state = state_with(api.clone(), true);
        state.add_movement(movement(1, 5.0, MovementType::Expense));

        assert_eq!(state.fetch().await, FetchOutcome::Committed);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.balance, BalanceSnapshot::new(80.0, 100.0, 20.0));
        assert_eq!(snapshot.movements, vec![movement(3, 100.0, MovementType::Income)]);
        assert!(!snapshot.loading);
        assert_eq!(state.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn test_fetch_is_all_or_nothing() {
        let api = Arc::new(FakeApi::default());
        *api.movements.lock().unwrap() = Some(vec![movement(3, 100.0, MovementType::Income)]);
        let state = state_with(api.clone(), true);
        state.add_movement(movement(1, 50.0, MovementType::Income));
        let before = state.snapshot();

        assert_eq!(state.fetch().await, FetchOutcome::Failed);
        assert_eq!(state.snapshot(), before);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_sync_session_clears_on_sign_out() {
        let api = Arc::new(FakeApi::default());
        let session = Arc::new(StaticSession::new(Some(user())));
        let state = FinanceState::with_date(api, session.clone(), date());
        state.add_movement(movement(1, 50.0, MovementType::Income));

        session.sign_out();
        assert_eq!(state.sync_session().await, FetchOutcome::NoSession);
        assert_eq!(state.balance(), BalanceSnapshot::default());
        assert!(state.movements().is_empty());
    }

    #[tokio::test]
    async fn test_register_validation_makes_no_request() {
        let api = Arc::new(FakeApi::default());
        let state = state_with(api.clone(), true);

        let err = state
            .register_movement("abc", "Lunch", MovementType::Expense)
            .await
            .unwrap_err();
        assert!(matches!(err, FinanceError::Validation(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_register_failure_uses_server_message() {
        let api = Arc::new(FakeApi::default());
        *api.create_result.lock().unwrap() = Some(Err(status(400, Some("Value too high"))));
        let state = state_with(api.clone(), true);

        let err = state
            .register_movement("10", "Lunch", MovementType::Expense)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Value too high");
        assert!(state.movements().is_empty());

        let err = state
            .register_movement("10", "Lunch", MovementType::Expense)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), GENERIC_SUBMISSION_ERROR);
        assert_eq!(state.balance(), BalanceSnapshot::default());
    }

    #[tokio::test]
    async fn test_register_success_applies_locally() {
        let api = Arc::new(FakeApi::default());
        *api.create_result.lock().unwrap() = Some(Ok(movement(7, 10.0, MovementType::Expense)));
        let state = state_with(api.clone(), true);

        let created = state
            .register_movement("10", "Lunch", MovementType::Expense)
            .await
            .unwrap();
        assert_eq!(created.id, RecordId::from(7));
        assert_eq!(state.balance(), BalanceSnapshot::new(-10.0, 0.0, 10.0));
        assert_eq!(state.movements()[0].id, RecordId::from(7));
    }

    #[tokio::test]
    async fn test_delete_uses_stored_record() {
        let api = Arc::new(FakeApi::default());
        let state = state_with(api.clone(), true);
        state.add_movement(movement(1, 50.0, MovementType::Income));
        state.add_movement(movement(2, 20.0, MovementType::Expense));

        state.delete_movement(&RecordId::from(2)).await.unwrap();
        assert_eq!(state.balance(), BalanceSnapshot::new(50.0, 50.0, 0.0));
        assert_eq!(state.movements().len(), 1);
        assert_eq!(api.deleted.lock().unwrap().as_slice(), &[RecordId::from(2)]);
    }

    #[tokio::test]
    async fn test_concurrent_deletes_revert_once() {
        let api = Arc::new(FakeApi::default());
        let state = state_with(api.clone(), true);
        state.add_movement(movement(1, 50.0, MovementType::Income));
        state.add_movement(movement(2, 20.0, MovementType::Expense));

        let id = RecordId::from(2);
        let (first, second) = tokio::join!(state.delete_movement(&id), state.delete_movement(&id));
        first.unwrap();
        second.unwrap();

        assert_eq!(state.balance(), BalanceSnapshot::new(50.0, 50.0, 0.0));
        assert_eq!(state.movements().len(), 1);
        assert_eq!(api.deleted.lock().unwrap().len(), 2);
    }

    /// Holds the first balance request until released so a second fetch can
    /// overtake it.
    struct GatedApi {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FinanceApi for GatedApi {
        async fn fetch_balance(&self, _date: NaiveDate) -> ApiResult<BalanceSnapshot> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.gate.notified().await;
                Ok(BalanceSnapshot::new(1.0, 1.0, 0.0))
            } else {
                Ok(BalanceSnapshot::new(2.0, 2.0, 0.0))
            }
        }

        async fn fetch_movements(&self, _date: NaiveDate) -> ApiResult<Vec<Movement>> {
            Ok(vec![])
        }

        async fn create_movement(&self, _movement: &NewMovement) -> ApiResult<Movement> {
            Err(status(500, None))
        }

        async fn delete_movement(&self, _id: &RecordId) -> ApiResult<()> {
            Ok(())
        }

        async fn fetch_profile(&self) -> ApiResult<User> {
            Ok(user())
        }
    }

    #[tokio::test]
    async fn test_stale_fetch_is_discarded() {
        let api = Arc::new(GatedApi {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let state = state_with_api(api.clone());

        let slow = state.fetch();
        let fast = async {
            // Let the slow fetch reach its gate first.
            tokio::task::yield_now().await;
            assert_eq!(state.phase(), Phase::Loading);
            let outcome = state.fetch().await;
            assert!(!state.is_loading());
            api.gate.notify_one();
            outcome
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(fast, FetchOutcome::Committed);
        assert_eq!(slow, FetchOutcome::Stale);
        assert_eq!(state.balance(), BalanceSnapshot::new(2.0, 2.0, 0.0));
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_phase_is_loading_while_fetch_in_flight() {
        let api = Arc::new(GatedApi {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let state = state_with_api(api.clone());
        assert_eq!(state.phase(), Phase::Ready);

        let fetch = state.fetch();
        let observe = async {
            tokio::task::yield_now().await;
            assert!(state.is_loading());
            assert_eq!(state.phase(), Phase::Loading);
            assert!(state.snapshot().loading);
            api.gate.notify_one();
        };
        let (outcome, ()) = tokio::join!(fetch, observe);

        assert_eq!(outcome, FetchOutcome::Committed);
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.balance(), BalanceSnapshot::new(1.0, 1.0, 0.0));
    }

    fn state_with_api(api: Arc<GatedApi>) -> FinanceState {
        let session = Arc::new(StaticSession::new(Some(user())));
        FinanceState::with_date(api, session, date())
    }
}
