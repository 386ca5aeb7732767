//! Gas limit selection

use std::future::Future;

use runeth_primitives::Gas;

use crate::args::CallOptions;
use crate::TxError;

/// Default simulation ceiling
pub const DEFAULT_GAS_CEILING: Gas = 4_700_000;

/// Default margin added on top of simulated usage
pub const DEFAULT_EXTRA_GAS: Gas = 10_000;

/// Limits applied when choosing a gas limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    /// Gas cap handed to the simulation; usage at or above it is fatal
    pub ceiling: Gas,
    /// Margin used when the caller gives no `extra_gas`
    pub default_extra_gas: Gas,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_GAS_CEILING,
            default_extra_gas: DEFAULT_EXTRA_GAS,
        }
    }
}

/// Choose the gas limit for a submission.
///
/// In order of precedence:
/// 1. `no_estimate_gas` yields the ceiling, with no simulation
/// 2. an explicit `gas` is used verbatim, with no simulation
/// 3. otherwise `simulate(ceiling)` is run; usage at or above the ceiling
///    fails with [`TxError::GasLimitExceeded`], anything below gets the
///    safety margin added
pub async fn estimate_gas<F, Fut>(
    policy: GasPolicy,
    options: &CallOptions,
    simulate: F,
) -> Result<Gas, TxError>
where
    F: FnOnce(Gas) -> Fut,
    Fut: Future<Output = Result<Gas, TxError>>,
{
    if options.no_estimate_gas {
        return Ok(policy.ceiling);
    }
    if let Some(gas) = options.gas {
        return Ok(gas);
    }

    let used = simulate(policy.ceiling).await?;
    if used >= policy.ceiling {
        return Err(TxError::GasLimitExceeded {
            used,
            ceiling: policy.ceiling,
        });
    }

    let extra = options.extra_gas.unwrap_or(policy.default_extra_gas);
    Ok(used.saturating_add(extra))
}
