//! In-memory implementation of every storage port.
//!
//! All state sits behind one async mutex. A unit of work owns the guard for its
//! whole lifetime and edits a working copy, which replaces the shared state only
//! on commit. Dropping the unit discards the copy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{
    Course, LedgerEntry, NewLedgerEntry, Notification, TransactionState, User,
};
use crate::ports::{
    CourseCatalog, LedgerFilter, LedgerStats, RepositoryResult, TransactionLedger, UnitOfWork,
    UserDirectory,
};

#[derive(Debug, Default, Clone)]
struct StoreState {
    courses: HashMap<i64, Course>,
    users: HashMap<i64, User>,
    enrollments: HashSet<(i64, i64)>,
    transactions: HashMap<String, LedgerEntry>,
    notifications: Vec<Notification>,
    next_id: i64,
}

impl StoreState {
    fn is_enrolled(&self, user_id: i64, course_id: i64) -> bool {
        self.enrollments.contains(&(user_id, course_id))
    }

    fn sorted_by_create_time(&self, newest_first: bool) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self.transactions.values().cloned().collect();
        entries.sort_by_key(|entry| (entry.create_time, entry.id));
        if newest_first {
            entries.reverse();
        }
        entries
    }
}

/// Thread-safe in-memory store for tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_course(&self, course: Course) {
        self.state.lock().await.courses.insert(course.id, course);
    }

    pub async fn add_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Enroll outside the payment flow, e.g. a free or card purchase.
    pub async fn enroll_directly(&self, user_id: i64, course_id: i64) {
        let mut state = self.state.lock().await;
        if state.enrollments.insert((user_id, course_id)) {
            if let Some(course) = state.courses.get_mut(&course_id) {
                course.enrollment_count += 1;
            }
        }
    }

    pub async fn enrollment_count(&self, course_id: i64) -> Option<i32> {
        self.state
            .lock()
            .await
            .courses
            .get(&course_id)
            .map(|course| course.enrollment_count)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }
}

#[async_trait]
impl CourseCatalog for InMemoryStore {
    async fn find_course(&self, course_id: i64) -> RepositoryResult<Option<Course>> {
        Ok(self.state.lock().await.courses.get(&course_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, user_id: i64) -> RepositoryResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> RepositoryResult<bool> {
        Ok(self.state.lock().await.is_enrolled(user_id, course_id))
    }
}

#[async_trait]
impl TransactionLedger for InMemoryStore {
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }

    async fn find(&self, external_id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        Ok(self.state.lock().await.transactions.get(external_id).cloned())
    }

    async fn statement(&self, from: i64, to: i64) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .sorted_by_create_time(false)
            .into_iter()
            .filter(|entry| entry.create_time >= from && entry.create_time <= to)
            .collect())
    }

    async fn list_for_user(&self, user_id: i64) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .sorted_by_create_time(true)
            .into_iter()
            .filter(|entry| entry.account.user_id == user_id)
            .collect())
    }

    async fn list(
        &self,
        filter: &LedgerFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .sorted_by_create_time(true)
            .into_iter()
            .filter(|entry| filter.state.map_or(true, |s| entry.state == s))
            .filter(|entry| filter.created_since.map_or(true, |t| entry.create_time >= t))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn stats(&self, created_since: Option<i64>) -> RepositoryResult<LedgerStats> {
        let state = self.state.lock().await;
        let mut stats = LedgerStats::default();
        for entry in state
            .transactions
            .values()
            .filter(|entry| created_since.map_or(true, |t| entry.create_time >= t))
        {
            stats.total += 1;
            match entry.state {
                TransactionState::PayAccepted => {
                    stats.accepted += 1;
                    stats.accepted_amount += entry.amount;
                }
                TransactionState::CancelledAfterSuccessful => stats.cancelled_after_success += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock(&mut self, external_id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        Ok(self.working.transactions.get(external_id).cloned())
    }

    async fn insert(&mut self, entry: NewLedgerEntry) -> RepositoryResult<Option<LedgerEntry>> {
        if self.working.transactions.contains_key(&entry.external_id) {
            return Ok(None);
        }
        self.working.next_id += 1;
        let stored = LedgerEntry::from_new(self.working.next_id, entry);
        self.working
            .transactions
            .insert(stored.external_id.clone(), stored.clone());
        Ok(Some(stored))
    }

    async fn save(&mut self, entry: &LedgerEntry) -> RepositoryResult<()> {
        self.working
            .transactions
            .insert(entry.external_id.clone(), entry.clone());
        Ok(())
    }

    async fn is_enrolled(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<bool> {
        Ok(self.working.is_enrolled(user_id, course_id))
    }

    async fn find_course(&mut self, course_id: i64) -> RepositoryResult<Option<Course>> {
        Ok(self.working.courses.get(&course_id).cloned())
    }

    async fn find_user(&mut self, user_id: i64) -> RepositoryResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn enroll(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<()> {
        if self.working.enrollments.insert((user_id, course_id)) {
            if let Some(course) = self.working.courses.get_mut(&course_id) {
                course.enrollment_count += 1;
            }
        }
        Ok(())
    }

    async fn unenroll(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<()> {
        self.working.enrollments.remove(&(user_id, course_id));
        if let Some(course) = self.working.courses.get_mut(&course_id) {
            course.enrollment_count = (course.enrollment_count - 1).max(0);
        }
        Ok(())
    }

    async fn queue_notification(&mut self, notification: &Notification) -> RepositoryResult<()> {
        self.working.notifications.push(notification.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
