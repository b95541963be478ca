//! Shared fixtures for chronicle-core integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use chronicle_core::aggregate::Aggregate;
use chronicle_core::command::Command;
use chronicle_core::error::DomainError;
use chronicle_core::event::{DomainEvent, decode_payload, encode_payload, unknown_event_type};
use chronicle_core::repository::Repository;
use chronicle_event_store::memory::{InMemoryEventStore, InMemorySnapshotStore};
use chronicle_test_support::FixedClock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ledger of per-account balances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub opened: bool,
    pub balances: BTreeMap<String, i64>,
    pub postings: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub account: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Opened,
    Posted(Posting),
}

impl DomainEvent for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened => "ledger.opened.v1",
            Self::Posted(_) => "ledger.posted.v1",
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        match self {
            Self::Opened => Ok(serde_json::json!({})),
            Self::Posted(posting) => encode_payload(posting),
        }
    }

    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            "ledger.opened.v1" => Ok(Self::Opened),
            "ledger.posted.v1" => Ok(Self::Posted(decode_payload(event_type, payload)?)),
            other => Err(unknown_event_type(other)),
        }
    }
}

impl Aggregate for Ledger {
    const AGGREGATE_TYPE: &'static str = "ledger";
    type Event = LedgerEvent;

    fn apply(mut self, event: &LedgerEvent) -> Self {
        match event {
            LedgerEvent::Opened => self.opened = true,
            LedgerEvent::Posted(posting) => {
                *self.balances.entry(posting.account.clone()).or_insert(0) += posting.amount;
                self.postings += 1;
            }
        }
        self
    }
}

pub fn posted(account: &str, amount: i64) -> LedgerEvent {
    LedgerEvent::Posted(Posting {
        account: account.to_owned(),
        amount,
    })
}

#[derive(Debug)]
pub struct Post {
    pub ledger_id: String,
    pub correlation_id: Uuid,
    pub account: String,
    pub amount: i64,
}

impl Post {
    pub fn new(ledger_id: &str, account: &str, amount: i64) -> Self {
        Self {
            ledger_id: ledger_id.to_owned(),
            correlation_id: Uuid::new_v4(),
            account: account.to_owned(),
            amount,
        }
    }
}

impl Command for Post {
    fn command_type(&self) -> &'static str {
        "ledger.post"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> String {
        self.ledger_id.clone()
    }
}

pub struct Fixture {
    pub events: Arc<InMemoryEventStore>,
    pub snapshots: Arc<InMemorySnapshotStore>,
    pub repository: Repository,
}

pub fn fixture() -> Fixture {
    let clock = Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    ));
    let events = Arc::new(InMemoryEventStore::with_clock(clock.clone()));
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repository = Repository::new(events.clone(), snapshots.clone(), clock);
    Fixture {
        events,
        snapshots,
        repository,
    }
}
