//! Sender resolution

use runeth_primitives::Address;

use crate::node::Node;
use crate::TxError;

/// Pick the sending account.
///
/// An explicit address is returned as-is without contacting the node.
/// Otherwise the node's first account is used.
pub async fn resolve_account(node: &dyn Node, explicit: Option<Address>) -> Result<Address, TxError> {
    if let Some(from) = explicit {
        return Ok(from);
    }

    let accounts = node.accounts().await?;
    accounts.first().copied().ok_or(TxError::NoAccountAvailable)
}
