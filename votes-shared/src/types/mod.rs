mod change;
mod counts;
mod direction;
mod popular;
mod record;
mod target;

pub use change::{BulkChange, VoteChange, VoteMutation};
pub use counts::{VoteCounts, VoteTotals};
pub use direction::VoteDirection;
pub use popular::PopularFilter;
pub use record::VoteRecord;
pub use target::{TargetKind, TargetRef};

/// Identifier of the user casting a vote.
pub type VoterId = i64;

/// Identifier of a stored vote record.
pub type RecordId = i64;
