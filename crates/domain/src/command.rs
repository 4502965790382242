//! Command handling infrastructure.
//!
//! A command runs in two steps: `decide` loads the aggregate and asks it for
//! the events a command produces, then the decision is committed either alone
//! (`execute`) or together with decisions on other aggregates through a
//! [`UnitOfWork`], which appends every stream in one atomic batch.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, StreamAppend, Version,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Events decided for one aggregate, not yet persisted.
#[derive(Debug)]
pub struct Decision<A: Aggregate> {
    aggregate_id: AggregateId,
    aggregate: A,
    events: Vec<A::Event>,
    envelopes: Vec<EventEnvelope>,
    expected_version: Version,
}

impl<A: Aggregate> Decision<A> {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// State the decision was made against.
    pub fn aggregate(&self) -> &A {
        &self.aggregate
    }

    pub fn events(&self) -> &[A::Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn expected_version(&self) -> Version {
        self.expected_version
    }

    fn options(&self) -> AppendOptions {
        if self.expected_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(self.expected_version)
        }
    }

    /// Applies the decided events once they are persisted.
    pub fn finish(self) -> CommandResult<A> {
        let mut aggregate = self.aggregate;
        let mut new_version = self.expected_version;
        for event in &self.events {
            aggregate.apply(event.clone());
            new_version = new_version.next();
        }
        aggregate.set_version(new_version);

        CommandResult {
            aggregate,
            events: self.events,
            new_version,
        }
    }
}

/// Decisions on several aggregates committed as one atomic append.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    appends: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a decision. Decisions without events are skipped.
    pub fn stage<A: Aggregate>(&mut self, decision: &Decision<A>) -> &mut Self {
        if !decision.is_empty() {
            self.appends.push(StreamAppend::new(
                decision.envelopes.clone(),
                decision.options(),
            ));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    /// Number of streams that will be written.
    pub fn stream_count(&self) -> usize {
        self.appends.len()
    }

    /// Writes every staged stream or none of them.
    pub async fn commit<S: EventStore + ?Sized>(self, store: &S) -> Result<(), DomainError> {
        match self.appends.len() {
            0 => Ok(()),
            1 => {
                let mut appends = self.appends;
                let append = appends.remove(0);
                store.append(append.events, append.options).await?;
                Ok(())
            }
            _ => {
                store.append_batch(self.appends).await?;
                Ok(())
            }
        }
    }
}

/// Loads aggregates of one type and turns command closures into decisions.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate + DeserializeOwned,
{
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let version = snapshot.version;
                let mut aggregate: A = snapshot.into_state()?;
                aggregate.set_version(version);
                aggregate
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Loads the aggregate and runs the command against it.
    pub async fn decide<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<Decision<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load(aggregate_id).await?;
        self.decide_on(aggregate_id, aggregate, command_fn)
    }

    /// Runs the command against an already loaded aggregate.
    pub fn decide_on<F>(
        &self,
        aggregate_id: AggregateId,
        aggregate: A,
        command_fn: F,
    ) -> Result<Decision<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let events = command_fn(&aggregate)?;
        let expected_version = aggregate.version();
        let envelopes = build_envelopes::<A>(aggregate_id, expected_version, &events)?;

        Ok(Decision {
            aggregate_id,
            aggregate,
            events,
            envelopes,
            expected_version,
        })
    }

    /// Executes a command on a single aggregate and persists the resulting
    /// events with optimistic concurrency.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let decision = self.decide(aggregate_id, command_fn).await?;

        let mut uow = UnitOfWork::new();
        uow.stage(&decision);
        uow.commit(&self.store).await?;

        Ok(decision.finish())
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Snapshots after a commit that is already durable. A failed save is
    /// logged and never turns the committed command into an error.
    pub async fn snapshot_if_due(&self, result: &CommandResult<A>) {
        if let Err(error) = self.try_snapshot_if_due(result).await {
            tracing::warn!(
                aggregate_type = A::aggregate_type(),
                version = %result.new_version,
                %error,
                "snapshot not saved"
            );
        }
    }

    /// Saves a snapshot when the last commit crossed the aggregate's interval.
    pub async fn try_snapshot_if_due(&self, result: &CommandResult<A>) -> Result<(), DomainError> {
        let previous = Version::new(result.new_version.as_i64() - result.events.len() as i64);
        if !result.aggregate.should_snapshot(previous) {
            return Ok(());
        }
        let Some(aggregate_id) = result.aggregate.id() else {
            return Ok(());
        };

        let snapshot = Snapshot::from_state(
            aggregate_id,
            A::aggregate_type(),
            result.new_version,
            &result.aggregate,
        )?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(%aggregate_id, version = %result.new_version, "snapshot saved");
        Ok(())
    }
}

fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError>
where
    A::Event: Serialize,
{
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        envelopes.push(EventEnvelope::for_event(
            aggregate_id,
            A::aggregate_type(),
            event.event_type(),
            version,
            event,
        )?);
    }

    Ok(envelopes)
}
