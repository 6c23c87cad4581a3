//! Walks one account through its life, then rebuilds it from the stored history.
//!
//! `KEEL_LOG_FORMAT=pretty RUST_LOG=debug cargo run --bin account-demo`

use anyhow::{Context, bail};

use keel_core::AggregateRoot;
use keel_events::{Aggregate, AggregateEvent, AggregateRegistry, StoredEvent};
use keel_accounting::{Account, AccountError, Money};

fn main() -> anyhow::Result<()> {
    keel_observability::init();

    let mut registry = AggregateRegistry::new();
    keel_accounting::register(&mut registry).context("registering account aggregate")?;

    let mut account = Account::open("Migo", "test@mail.com")?;
    for raw in ["10", "10", "-15.00"] {
        account.append_transaction(raw.parse()?)?;
    }

    match account.append_transaction("-15.00".parse()?) {
        Err(AccountError::InsufficientFunds { .. }) => {
            tracing::info!(balance = %account.balance(), "debit refused")
        }
        other => bail!("expected insufficient funds, got {other:?}"),
    }

    account.set_overdraft_limit(Money::from_major(100)?)?;
    account.append_transaction("-15.00".parse()?)?;
    account.close()?;

    let history = account
        .collect()
        .iter()
        .map(AggregateEvent::to_stored)
        .collect::<Result<Vec<StoredEvent>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&history)?);

    let rebuilt = registry.reconstruct(&history)?;
    let Some(rebuilt) = rebuilt.downcast_ref::<Account>() else {
        bail!("reconstructed aggregate is not an account");
    };

    tracing::info!(
        account_id = %rebuilt.id(),
        version = rebuilt.version(),
        balance = %rebuilt.balance(),
        closed = rebuilt.is_closed(),
        "account rebuilt from {} events",
        history.len()
    );
    Ok(())
}
