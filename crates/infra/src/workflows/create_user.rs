//! User creation coupled to a side effect.
//!
//! Two flavors:
//!
//! - [`execute_user_creation`] runs a caller-supplied callback inside the
//!   transaction, right after the user row is written. If the callback
//!   fails, the user is rolled back. If the callback talks to a system
//!   outside the database (a task queue, a mailer), that system commits on
//!   its own: a commit failure *after* the callback succeeded leaves the
//!   external effect behind for a user that never existed. The transaction
//!   cannot close that gap.
//! - [`create_user_with_verification`] avoids the gap by writing the
//!   verification task as an outbox row in the same transaction (no callback,
//!   so store failures are not re-tagged as side-effect failures); the
//!   [`OutboxDispatcher`](crate::outbox::OutboxDispatcher) delivers it after
//!   commit.

use tracing::instrument;

use housebank_auth::{CreateUserParams, SendVerifyEmail, User};
use housebank_core::{LedgerError, LedgerResult};

use crate::outbox::NewOutboxMessage;
use crate::store::{Database, LedgerStore, Queries, TxFuture};

use super::record_outcome;

/// Create a user, then run `after_create` in the same transaction.
///
/// Any error from `after_create` becomes [`LedgerError::SideEffect`] and
/// rolls the user back.
#[instrument(skip(store, params, after_create), fields(username = %params.username), err)]
pub async fn execute_user_creation<D, F>(
    store: &LedgerStore<D>,
    params: CreateUserParams,
    after_create: F,
) -> LedgerResult<User>
where
    D: Database,
    F: for<'t> FnOnce(&'t mut dyn Queries, User) -> TxFuture<'t, ()> + Send + 'static,
{
    let result = store
        .run_in_transaction(move |q| Box::pin(create_then(q, params, after_create)))
        .await;

    record_outcome("user_creation", &result);
    result
}

async fn create_then<'t, F>(
    q: &'t mut dyn Queries,
    params: CreateUserParams,
    after_create: F,
) -> LedgerResult<User>
where
    F: FnOnce(&'t mut dyn Queries, User) -> TxFuture<'t, ()>,
{
    let user = q.create_user(params).await?;
    after_create(q, user.clone())
        .await
        .map_err(LedgerError::into_side_effect)?;
    Ok(user)
}

async fn create_with_verification(
    q: &mut dyn Queries,
    params: CreateUserParams,
) -> LedgerResult<User> {
    let user = q.create_user(params).await?;
    let task = SendVerifyEmail::new(user.username.clone());
    q.enqueue_outbox(NewOutboxMessage::from(&task)).await?;
    Ok(user)
}

/// Create a user and stage a [`SendVerifyEmail`] outbox row with it.
///
/// The task exists if and only if the user does. The outbox insert is an
/// ordinary write of the same transaction, so its failures keep their own
/// category (a lock timeout stays retryable).
#[instrument(skip(store, params), fields(username = %params.username), err)]
pub async fn create_user_with_verification<D: Database>(
    store: &LedgerStore<D>,
    params: CreateUserParams,
) -> LedgerResult<User> {
    let result = store
        .run_in_transaction(move |q| Box::pin(create_with_verification(q, params)))
        .await;

    record_outcome("user_creation", &result);
    result
}
