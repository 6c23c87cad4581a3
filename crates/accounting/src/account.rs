use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keel_core::{AggregateId, AggregateRoot, DomainError, DomainResult};
use keel_events::{Aggregate, AggregateRegistry, Event, Lifecycle, LifecycleOf, Sequenced};

use crate::money::Money;

/// Business-rule failures of [`Account`].
///
/// Raised before any event is built, so a failed operation never changes the
/// account or stages anything.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("account {account_id} is closed")]
    AccountClosed { account_id: AggregateId },

    #[error(
        "insufficient funds on account {account_id}: balance {balance}, amount {amount}, overdraft limit {overdraft_limit}"
    )]
    InsufficientFunds {
        account_id: AggregateId,
        balance: Money,
        amount: Money,
        overdraft_limit: Money,
    },

    #[error("overdraft limit cannot be negative: {0}")]
    InvalidOverdraftLimit(Money),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Event: Opened (creates the account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opened {
    pub full_name: String,
    pub email_address: String,
}

impl Event for Opened {
    fn event_type(&self) -> &'static str {
        "accounting.account.opened"
    }
}

/// Event: TransactionAppended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAppended {
    /// Signed: credits are positive, debits negative.
    pub amount: Money,
}

/// Event: OverdraftLimitSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdraftLimitSet {
    pub overdraft_limit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    TransactionAppended(TransactionAppended),
    OverdraftLimitSet(OverdraftLimitSet),
    Closed,
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::TransactionAppended(_) => "accounting.account.transaction_appended",
            AccountEvent::OverdraftLimitSet(_) => "accounting.account.overdraft_limit_set",
            AccountEvent::Closed => "accounting.account.closed",
        }
    }
}

/// Capability to stage account events.
///
/// Only this module can build one, so every staged event went through the
/// account's own checks:
///
/// ```compile_fail
/// use keel_accounting::{Account, AccountEvent};
/// use keel_accounting::account::AccountToken;
/// use keel_events::Aggregate;
///
/// let mut account = Account::open("Migo", "test@mail.com").unwrap();
/// account.close().unwrap();
/// account.trigger(AccountEvent::Closed, AccountToken(())).unwrap();
/// ```
#[derive(Debug)]
pub struct AccountToken(());

/// Aggregate root: Account.
#[derive(Debug, PartialEq, Eq)]
pub struct Account {
    lifecycle: Lifecycle<Opened, AccountEvent>,
    full_name: String,
    email_address: String,
    balance: Money,
    overdraft_limit: Money,
    is_closed: bool,
}

keel_core::impl_topic!(Account);

impl Account {
    /// Open a new account with a zero balance.
    pub fn open(
        full_name: impl Into<String>,
        email_address: impl Into<String>,
    ) -> Result<Self, AccountError> {
        let account = Self::create(
            Opened {
                full_name: full_name.into(),
                email_address: email_address.into(),
            },
            AccountToken(()),
        )?;
        Ok(account)
    }

    /// Append a signed transaction amount to the balance.
    pub fn append_transaction(&mut self, amount: Money) -> Result<(), AccountError> {
        self.ensure_not_closed()?;
        self.ensure_sufficient_funds(amount)?;
        self.trigger(
            AccountEvent::TransactionAppended(TransactionAppended { amount }),
            AccountToken(()),
        )?;
        Ok(())
    }

    /// Replace the overdraft limit. The limit must not be negative.
    pub fn set_overdraft_limit(&mut self, overdraft_limit: Money) -> Result<(), AccountError> {
        if overdraft_limit.is_negative() {
            tracing::debug!(account_id = %self.id(), %overdraft_limit, "rejected negative overdraft limit");
            return Err(AccountError::InvalidOverdraftLimit(overdraft_limit));
        }
        self.ensure_not_closed()?;
        self.trigger(
            AccountEvent::OverdraftLimitSet(OverdraftLimitSet { overdraft_limit }),
            AccountToken(()),
        )?;
        Ok(())
    }

    /// Close the account.
    ///
    /// Not idempotent: every call records another `Closed` event.
    pub fn close(&mut self) -> Result<(), AccountError> {
        self.trigger(AccountEvent::Closed, AccountToken(()))?;
        Ok(())
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn email_address(&self) -> &str {
        &self.email_address
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn overdraft_limit(&self) -> Money {
        self.overdraft_limit
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    fn ensure_not_closed(&self) -> Result<(), AccountError> {
        if self.is_closed {
            tracing::debug!(account_id = %self.id(), "rejected operation on closed account");
            return Err(AccountError::AccountClosed {
                account_id: *self.id(),
            });
        }
        Ok(())
    }

    fn ensure_sufficient_funds(&self, amount: Money) -> Result<(), AccountError> {
        let new_balance = self.balance.checked_add(amount)?;
        let floor = self.overdraft_limit.checked_neg()?;
        if new_balance < floor {
            tracing::debug!(
                account_id = %self.id(),
                balance = %self.balance,
                %amount,
                "rejected transaction: insufficient funds"
            );
            return Err(AccountError::InsufficientFunds {
                account_id: *self.id(),
                balance: self.balance,
                amount,
                overdraft_limit: self.overdraft_limit,
            });
        }
        Ok(())
    }
}

impl AggregateRoot for Account {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        self.lifecycle.id()
    }

    fn version(&self) -> u64 {
        self.lifecycle.version()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.lifecycle.timestamp()
    }
}

impl Aggregate for Account {
    type Created = Opened;
    type Event = AccountEvent;
    type Token = AccountToken;

    fn instantiate(lifecycle: LifecycleOf<Self>, created: &Opened, _: Sequenced) -> Self {
        Self {
            lifecycle,
            full_name: created.full_name.clone(),
            email_address: created.email_address.clone(),
            balance: Money::ZERO,
            overdraft_limit: Money::ZERO,
            is_closed: false,
        }
    }

    fn apply(&mut self, event: &AccountEvent, _: Sequenced) -> DomainResult<()> {
        match event {
            AccountEvent::TransactionAppended(e) => {
                self.balance = self.balance.checked_add(e.amount)?;
            }
            AccountEvent::OverdraftLimitSet(e) => self.overdraft_limit = e.overdraft_limit,
            AccountEvent::Closed => self.is_closed = true,
        }
        Ok(())
    }

    fn lifecycle(&self) -> &LifecycleOf<Self> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self, _: Sequenced) -> &mut LifecycleOf<Self> {
        &mut self.lifecycle
    }
}

/// Register the account aggregate so stored account histories can be rebuilt.
pub fn register(registry: &mut AggregateRegistry) -> Result<(), DomainError> {
    registry.register::<Account>()?;
    Ok(())
}
