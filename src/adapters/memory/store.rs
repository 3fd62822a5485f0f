//! In-memory enrollment store.
//!
//! Transactions work on a private copy of the tables and replay their
//! writes onto the shared tables on commit, so nothing is observable
//! before `commit` and a dropped transaction leaves no trace.
//!
//! Individual operations can be made to fail with `fail_on` to exercise
//! rollback and compensation paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::{
    DomainError, ErrorCode, FundingId, MembershipId, RecurringFundingId,
};
use crate::domain::funding::{FundingRecord, LineItem, RecurringFundingRecord, SoftCreditEntry};
use crate::domain::membership::MembershipRecord;
use crate::ports::{EnrollmentStore, StoreTransaction};

/// Store operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Begin,
    InsertMembership,
    UpdateMembership,
    InsertFunding,
    UpdateFunding,
    InsertRecurring,
    UpdateRecurring,
    DeleteRecurring,
    ReplaceLineItems,
    InsertSoftCredit,
    LinkMembershipFunding,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    memberships: HashMap<MembershipId, MembershipRecord>,
    fundings: HashMap<FundingId, FundingRecord>,
    recurring: HashMap<RecurringFundingId, RecurringFundingRecord>,
    line_items: HashMap<FundingId, Vec<LineItem>>,
    soft_credits: Vec<SoftCreditEntry>,

    /// Membership/funding links in insertion order.
    links: Vec<(MembershipId, FundingId)>,
}

impl Tables {
    fn apply(&mut self, write: Write) {
        match write {
            Write::Membership(m) => {
                self.memberships.insert(m.id, m);
            }
            Write::Funding(f) => {
                self.fundings.insert(f.id, f);
            }
            Write::Recurring(r) => {
                self.recurring.insert(r.id, r);
            }
            Write::DeleteRecurring(id) => {
                self.recurring.remove(&id);
            }
            Write::LineItems(funding_id, items) => {
                self.line_items.insert(funding_id, items);
            }
            Write::SoftCredit(entry) => self.soft_credits.push(entry),
            Write::Link(membership_id, funding_id) => {
                if !self.links.contains(&(membership_id, funding_id)) {
                    self.links.push((membership_id, funding_id));
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Write {
    Membership(MembershipRecord),
    Funding(FundingRecord),
    Recurring(RecurringFundingRecord),
    DeleteRecurring(RecurringFundingId),
    LineItems(FundingId, Vec<LineItem>),
    SoftCredit(SoftCreditEntry),
    Link(MembershipId, FundingId),
}

#[derive(Default)]
struct State {
    tables: Tables,
    failures: HashSet<StoreOperation>,
    commits: usize,
}

/// In-memory `EnrollmentStore` for tests and local runs.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryEnrollmentStore::new());
/// store.fail_on(StoreOperation::LinkMembershipFunding);
/// // ... run an enrollment, then
/// assert!(store.memberships().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEnrollmentStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future `operation` fail with a database error.
    pub fn fail_on(&self, operation: StoreOperation) {
        lock(&self.state).failures.insert(operation);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Seeding and inspection
    // ════════════════════════════════════════════════════════════════════════════

    /// Inserts a membership directly, bypassing transactions.
    pub fn seed_membership(&self, membership: MembershipRecord) {
        lock(&self.state).tables.apply(Write::Membership(membership));
    }

    /// Inserts a funding record with its line items and links it to
    /// `memberships`.
    pub fn seed_funding(&self, funding: FundingRecord, items: Vec<LineItem>, memberships: &[MembershipId]) {
        let mut state = lock(&self.state);
        let funding_id = funding.id;
        state.tables.apply(Write::Funding(funding));
        state.tables.apply(Write::LineItems(funding_id, items));
        for membership_id in memberships {
            state.tables.apply(Write::Link(*membership_id, funding_id));
        }
    }

    pub fn seed_recurring(&self, recurring: RecurringFundingRecord) {
        lock(&self.state).tables.apply(Write::Recurring(recurring));
    }

    pub fn memberships(&self) -> Vec<MembershipRecord> {
        let mut all: Vec<_> = lock(&self.state).tables.memberships.values().cloned().collect();
        all.sort_by_key(|m| (m.created_at, m.id));
        all
    }

    pub fn fundings(&self) -> Vec<FundingRecord> {
        let mut all: Vec<_> = lock(&self.state).tables.fundings.values().cloned().collect();
        all.sort_by_key(|f| (f.created_at, f.id));
        all
    }

    pub fn recurring_agreements(&self) -> Vec<RecurringFundingRecord> {
        lock(&self.state).tables.recurring.values().cloned().collect()
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> usize {
        lock(&self.state).commits
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check(state: &Mutex<State>, operation: StoreOperation) -> Result<(), DomainError> {
    if lock(state).failures.contains(&operation) {
        return Err(DomainError::database(format!("{:?} failed", operation)));
    }
    Ok(())
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        check(&self.state, StoreOperation::Begin)?;
        let working = lock(&self.state).tables.clone();
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            working,
            writes: Vec::new(),
        }))
    }

    async fn find_membership(&self, id: MembershipId) -> Result<Option<MembershipRecord>, DomainError> {
        Ok(lock(&self.state).tables.memberships.get(&id).cloned())
    }

    async fn find_funding(&self, id: FundingId) -> Result<Option<FundingRecord>, DomainError> {
        Ok(lock(&self.state).tables.fundings.get(&id).cloned())
    }

    async fn find_recurring(
        &self,
        id: RecurringFundingId,
    ) -> Result<Option<RecurringFundingRecord>, DomainError> {
        Ok(lock(&self.state).tables.recurring.get(&id).cloned())
    }

    async fn line_items_for(&self, funding_id: FundingId) -> Result<Vec<LineItem>, DomainError> {
        Ok(lock(&self.state)
            .tables
            .line_items
            .get(&funding_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn soft_credits_for(&self, funding_id: FundingId) -> Result<Vec<SoftCreditEntry>, DomainError> {
        Ok(lock(&self.state)
            .tables
            .soft_credits
            .iter()
            .filter(|s| s.funding_id == funding_id)
            .cloned()
            .collect())
    }

    async fn latest_funding_for_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<FundingRecord>, DomainError> {
        let state = lock(&self.state);
        let tables = &state.tables;
        Ok(tables
            .links
            .iter()
            .filter(|(m, _)| *m == membership_id)
            .filter_map(|(_, f)| tables.fundings.get(f))
            .max_by_key(|f| f.created_at)
            .cloned())
    }

    async fn memberships_for_funding(
        &self,
        funding_id: FundingId,
    ) -> Result<Vec<MembershipRecord>, DomainError> {
        let state = lock(&self.state);
        let tables = &state.tables;
        Ok(tables
            .links
            .iter()
            .filter(|(_, f)| *f == funding_id)
            .filter_map(|(m, _)| tables.memberships.get(m))
            .cloned()
            .collect())
    }
}

struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    working: Tables,
    writes: Vec<Write>,
}

impl InMemoryTransaction {
    fn stage(&mut self, operation: StoreOperation, write: Write) -> Result<(), DomainError> {
        check(&self.state, operation)?;
        self.working.apply(write.clone());
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_membership(&mut self, membership: &MembershipRecord) -> Result<(), DomainError> {
        if self.working.memberships.contains_key(&membership.id) {
            return Err(DomainError::database(format!("Membership {} already exists", membership.id)));
        }
        self.stage(StoreOperation::InsertMembership, Write::Membership(membership.clone()))
    }

    async fn update_membership(&mut self, membership: &MembershipRecord) -> Result<(), DomainError> {
        if !self.working.memberships.contains_key(&membership.id) {
            return Err(DomainError::new(
                ErrorCode::MembershipNotFound,
                format!("Membership {} not found", membership.id),
            ));
        }
        self.stage(StoreOperation::UpdateMembership, Write::Membership(membership.clone()))
    }

    async fn insert_funding(&mut self, funding: &FundingRecord) -> Result<(), DomainError> {
        if self.working.fundings.contains_key(&funding.id) {
            return Err(DomainError::database(format!("Funding {} already exists", funding.id)));
        }
        self.stage(StoreOperation::InsertFunding, Write::Funding(funding.clone()))
    }

    async fn update_funding(&mut self, funding: &FundingRecord) -> Result<(), DomainError> {
        if !self.working.fundings.contains_key(&funding.id) {
            return Err(DomainError::new(
                ErrorCode::FundingNotFound,
                format!("Funding {} not found", funding.id),
            ));
        }
        self.stage(StoreOperation::UpdateFunding, Write::Funding(funding.clone()))
    }

    async fn insert_recurring(&mut self, recurring: &RecurringFundingRecord) -> Result<(), DomainError> {
        if self.working.recurring.contains_key(&recurring.id) {
            return Err(DomainError::database(format!(
                "Recurring funding {} already exists",
                recurring.id
            )));
        }
        self.stage(StoreOperation::InsertRecurring, Write::Recurring(recurring.clone()))
    }

    async fn update_recurring(&mut self, recurring: &RecurringFundingRecord) -> Result<(), DomainError> {
        if !self.working.recurring.contains_key(&recurring.id) {
            return Err(DomainError::new(
                ErrorCode::RecurringFundingNotFound,
                format!("Recurring funding {} not found", recurring.id),
            ));
        }
        self.stage(StoreOperation::UpdateRecurring, Write::Recurring(recurring.clone()))
    }

    async fn delete_recurring(&mut self, id: RecurringFundingId) -> Result<(), DomainError> {
        self.stage(StoreOperation::DeleteRecurring, Write::DeleteRecurring(id))
    }

    async fn replace_line_items(
        &mut self,
        funding_id: FundingId,
        items: &[LineItem],
    ) -> Result<(), DomainError> {
        self.stage(
            StoreOperation::ReplaceLineItems,
            Write::LineItems(funding_id, items.to_vec()),
        )
    }

    async fn insert_soft_credit(&mut self, entry: &SoftCreditEntry) -> Result<(), DomainError> {
        self.stage(StoreOperation::InsertSoftCredit, Write::SoftCredit(entry.clone()))
    }

    async fn link_membership_funding(
        &mut self,
        membership_id: MembershipId,
        funding_id: FundingId,
    ) -> Result<(), DomainError> {
        self.stage(
            StoreOperation::LinkMembershipFunding,
            Write::Link(membership_id, funding_id),
        )
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTransaction { state, writes, .. } = *self;
        check(&state, StoreOperation::Commit)?;
        let mut guard = lock(&state);
        for write in writes {
            guard.tables.apply(write);
        }
        guard.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
