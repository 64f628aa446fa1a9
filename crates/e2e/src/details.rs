//! Opening the detail view of a user's latest job

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::E2eResult;
use crate::job::{owner_filter, JobKind};
use crate::selectors::SelectorChain;
use crate::table::{JobTable, Scope, Target};

/// Click the view control of the first `kind` row requested by `owner`.
///
/// Only the first matching row is considered: when it has no view control
/// the result is `false`, later rows are not tried. No owner (or a blank
/// one) means no row is opened. Transient lookup failures count as "not
/// opened"; anything else is returned.
pub async fn open_recent_job<T>(
    table: &T,
    kind: JobKind,
    owner: Option<&str>,
    view: &SelectorChain,
    timeout: Duration,
) -> E2eResult<bool>
where
    T: JobTable + ?Sized,
{
    let Some(owner) = owner_filter(owner) else {
        debug!("No owner given - not opening {} job details", kind);
        return Ok(false);
    };

    let rows = match table.rows().await {
        Ok(rows) => rows,
        Err(e) if e.is_transient() => {
            warn!("Could not read job rows: {}", e);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let Some((index, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| kind.classifies(row) && row.owned_by(owner))
    else {
        info!("No {} job found for user: {}", kind, owner);
        return Ok(false);
    };

    let Some(selector) = view.first_visible(table, Scope::Row(index), timeout).await else {
        warn!("No view details control on job: {}", row.summary());
        return Ok(false);
    };

    match table.click(Target::row(index, selector)).await {
        Ok(()) => {
            info!("Opened details of {} job: {}", kind, row.summary());
            Ok(true)
        }
        Err(e) if e.is_transient() => {
            warn!("Could not open job details: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
