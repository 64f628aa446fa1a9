//! Opening a job's detail view against an in-memory job table

mod common;

use std::time::Duration;

use test_case::test_case;

use common::{claim_row, post_charge_row, Event, FakeJobTable};
use rcm_e2e::details::open_recent_job;
use rcm_e2e::selectors::SelectorChain;
use rcm_e2e::{E2eError, JobKind};

const LOOKUP: Duration = Duration::from_secs(2);

#[tokio::test(start_paused = true)]
async fn opens_the_owners_first_claim_job() {
    let table = FakeJobTable::new(vec![
        post_charge_row("alice"),
        claim_row("bob"),
        claim_row("alice"),
        claim_row("alice"),
    ]);

    let opened = open_recent_job(
        &table,
        JobKind::ClaimGeneration,
        Some("alice"),
        &SelectorChain::view_details(),
        LOOKUP,
    )
    .await
    .unwrap();

    assert!(opened);
    assert_eq!(table.events(), [Event::Snapshot, Event::Viewed("alice".into())]);
    assert_eq!(table.rows_now().len(), 4);
}

#[test_case(None ; "no owner")]
#[test_case(Some("") ; "empty owner")]
#[test_case(Some("  ") ; "blank owner")]
#[tokio::test(start_paused = true)]
async fn blank_owner_opens_nothing(owner: Option<&str>) {
    let table = FakeJobTable::new(vec![claim_row("alice")]);

    let opened = open_recent_job(&table, JobKind::ClaimGeneration, owner, &SelectorChain::view_details(), LOOKUP)
        .await
        .unwrap();

    assert!(!opened);
    assert!(table.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_view_control_is_not_opened() {
    let table = FakeJobTable::new(vec![claim_row("alice"), claim_row("alice")]).without_view_controls();

    let opened = open_recent_job(
        &table,
        JobKind::ClaimGeneration,
        Some("alice"),
        &SelectorChain::view_details(),
        LOOKUP,
    )
    .await
    .unwrap();

    assert!(!opened);
    assert_eq!(table.events(), [Event::Snapshot]);
}

#[tokio::test(start_paused = true)]
async fn no_job_of_that_kind() {
    let table = FakeJobTable::new(vec![post_charge_row("alice")]);

    let opened = open_recent_job(
        &table,
        JobKind::ClaimGeneration,
        Some("alice"),
        &SelectorChain::view_details(),
        LOOKUP,
    )
    .await
    .unwrap();

    assert!(!opened);
}

#[tokio::test(start_paused = true)]
async fn snapshot_timeout_is_not_opened() {
    let table = FakeJobTable::new(vec![claim_row("alice")]).with_failing_snapshots(1);

    let opened = open_recent_job(
        &table,
        JobKind::ClaimGeneration,
        Some("alice"),
        &SelectorChain::view_details(),
        LOOKUP,
    )
    .await
    .unwrap();

    assert!(!opened);
}

#[tokio::test(start_paused = true)]
async fn closed_driver_is_returned() {
    let table = FakeJobTable::new(vec![claim_row("alice")]).with_closed_driver();

    let err = open_recent_job(
        &table,
        JobKind::ClaimGeneration,
        Some("alice"),
        &SelectorChain::view_details(),
        LOOKUP,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, E2eError::DriverClosed));
}
