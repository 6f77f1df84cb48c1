//! Double-entry money transfer.

use tracing::instrument;

use housebank_accounting::{
    Account, BalanceAdjustment, CreateEntryParams, OrderedPair, TransferTxParams,
    TransferTxResult,
};
use housebank_core::LedgerResult;

use crate::store::{Database, LedgerStore, Queries};

use super::record_outcome;

/// Move `amount` from one account to another in a single transaction.
///
/// Writes, in order: the transfer record, the debit entry on the source, the
/// credit entry on the destination, then both balance adjustments in lock
/// order. Any failure rolls everything back.
///
/// Currency and balance checks are the caller's job
/// ([`TransferRequest::check_preconditions`]); this only relies on the store
/// to refuse a negative balance.
///
/// [`TransferRequest::check_preconditions`]: housebank_accounting::TransferRequest::check_preconditions
#[instrument(
    skip(store),
    fields(
        from = %params.from_account_id,
        to = %params.to_account_id,
        amount = params.amount
    ),
    err
)]
pub async fn execute_money_transfer<D: Database>(
    store: &LedgerStore<D>,
    params: TransferTxParams,
) -> LedgerResult<TransferTxResult> {
    let result = store
        .run_in_transaction(move |q| Box::pin(transfer_steps(q, params)))
        .await;

    record_outcome("money_transfer", &result);
    result
}

async fn transfer_steps(
    q: &mut dyn Queries,
    params: TransferTxParams,
) -> LedgerResult<TransferTxResult> {
    let transfer = q.create_transfer(params.into()).await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.from_account_id,
            amount: -params.amount,
        })
        .await?;
    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.to_account_id,
            amount: params.amount,
        })
        .await?;

    let (from_account, to_account) = apply_ordered_adjustments(
        q,
        BalanceAdjustment::new(params.from_account_id, -params.amount),
        BalanceAdjustment::new(params.to_account_id, params.amount),
    )
    .await?;

    Ok(TransferTxResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}

/// Apply two balance adjustments, lower account id first.
///
/// Returns the post-update accounts in the caller's `(a, b)` order. When both
/// adjustments target the same account, both returned values are the final
/// row.
pub async fn apply_ordered_adjustments(
    q: &mut dyn Queries,
    a: BalanceAdjustment,
    b: BalanceAdjustment,
) -> LedgerResult<(Account, Account)> {
    let pair = OrderedPair::new(a, b);

    let first = q.add_account_balance(*pair.first()).await?;
    let second = q.add_account_balance(*pair.second()).await?;

    if first.id == second.id {
        return Ok((second.clone(), second));
    }
    Ok(pair.restore(first, second))
}
