//! The traits every order, table and settlement stream is folded through.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded on an aggregate's stream, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Stored as the envelope's `event_type`; projections and queries match on it.
    fn event_type(&self) -> &'static str;
}

/// An event-sourced consistency boundary (an order, a table, a settlement run).
///
/// State is rebuilt by replaying events. Command methods inspect the current
/// state and return the events to record; `apply` folds one event in and
/// never fails.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    /// Stored as the envelope's `aggregate_type`.
    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// Number of events applied so far; 0 for a fresh aggregate.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state is periodically stored as a snapshot so loading
/// does not replay the full stream.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    /// Whether a commit that moved the aggregate from `previous` to its
    /// current version crossed a multiple of the interval. One command can
    /// record several events, so the version may skip the exact multiple.
    fn should_snapshot(&self, previous: Version) -> bool {
        let interval = Self::snapshot_interval() as i64;
        let current = self.version().as_i64();
        current > 0 && current / interval > previous.as_i64() / interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// A loyalty card that collects stamps.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CardEvent {
        Issued { id: AggregateId },
        Stamped { stamps: u32 },
    }

    impl DomainEvent for CardEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CardEvent::Issued { .. } => "CardIssued",
                CardEvent::Stamped { .. } => "CardStamped",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Card {
        id: Option<AggregateId>,
        stamps: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("card is full")]
    struct CardFull;

    impl Aggregate for Card {
        type Event = CardEvent;
        type Error = CardFull;

        fn aggregate_type() -> &'static str {
            "Card"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                CardEvent::Issued { id } => self.id = Some(id),
                CardEvent::Stamped { stamps } => self.stamps += stamps,
            }
        }
    }

    impl SnapshotCapable for Card {
        fn snapshot_interval() -> usize {
            10
        }
    }

    #[test]
    fn events_fold_in_order() {
        let id = AggregateId::new();
        let mut card = Card::default();
        assert_eq!(card.id(), None);

        card.apply_events([
            CardEvent::Issued { id },
            CardEvent::Stamped { stamps: 2 },
            CardEvent::Stamped { stamps: 3 },
        ]);

        assert_eq!(card.id(), Some(id));
        assert_eq!(card.stamps, 5);
        assert_eq!(CardEvent::Stamped { stamps: 1 }.event_type(), "CardStamped");
    }

    #[test]
    fn snapshot_due_only_when_a_commit_crosses_the_interval() {
        let mut card = Card::default();
        assert!(!card.should_snapshot(Version::initial()));

        let cases = [(10, 9, true), (11, 10, false), (21, 19, true), (29, 21, false)];
        for (current, previous, due) in cases {
            card.set_version(Version::new(current));
            assert_eq!(card.should_snapshot(Version::new(previous)), due, "{previous} -> {current}");
        }
    }
}
