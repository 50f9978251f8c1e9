//! Default address switching.

use dropshop_core::{AddressId, UserId};

use crate::client::Client;
use crate::error::ClientError;
use crate::filter::Filter;
use crate::model::FindManyArgs;
use crate::models::{Address, AddressUpdateInput, AddressWhereInput, AddressWhereUniqueInput};
use crate::transaction::TransactionOptions;

/// Make `address_id` the user's only default address.
///
/// Clearing the old default and setting the new one happen in one
/// transaction, so the partial unique index never sees two defaults.
///
/// # Errors
///
/// Returns `ClientError::NotFound` if the address does not belong to the user.
pub async fn set_default_address(
    client: &Client,
    user_id: UserId,
    address_id: AddressId,
) -> Result<Address, ClientError> {
    let address = client
        .transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.address()
                    .find_first_or_throw(FindManyArgs::new().filter(AddressWhereInput {
                        id: Some(Filter::equals(address_id)),
                        user_id: Some(Filter::equals(user_id)),
                        ..AddressWhereInput::default()
                    }))
                    .await?;

                let cleared = tx
                    .address()
                    .update_many(
                        AddressWhereInput {
                            user_id: Some(Filter::equals(user_id)),
                            is_default: Some(Filter::equals(true)),
                            id: Some(Filter::not(address_id)),
                            ..AddressWhereInput::default()
                        },
                        AddressUpdateInput {
                            is_default: Some(false),
                            ..AddressUpdateInput::default()
                        },
                    )
                    .await?;
                tracing::debug!(%user_id, cleared, "Cleared previous default address");

                tx.address()
                    .update(
                        AddressWhereUniqueInput::Id(address_id),
                        AddressUpdateInput {
                            is_default: Some(true),
                            ..AddressUpdateInput::default()
                        },
                    )
                    .await
            })
        })
        .await?;

    tracing::info!(%user_id, %address_id, "Default address set");
    Ok(address)
}
