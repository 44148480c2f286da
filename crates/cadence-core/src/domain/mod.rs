//! Domain model (ids, job, schedule, state machine, retry, decisions, ...).
//!
//! ここは純粋なモデル層です。ストレージやキューの実装には依存しません。

pub mod attempt;
pub mod decision;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod job_type;
pub mod outcome;
pub mod retry;
pub mod schedule;
pub mod spec;
pub mod state;

pub use self::attempt::AttemptRecord;
pub use self::decision::{Decider, Decision, DefaultDecider, add_duration};
pub use self::envelope::TaskEnvelope;
pub use self::errors::{CadenceError, ErrorKind, HandlerError};
pub use self::events::DomainEvent;
pub use self::ids::{JobId, LeaseOwner, MessageId};
pub use self::job::Job;
pub use self::job_type::JobType;
pub use self::outcome::{HandlerResult, OutcomeKind};
pub use self::retry::{RetryDecision, RetryPolicies, RetryPolicy};
pub use self::schedule::Schedule;
pub use self::spec::{JobFilter, JobPatch, JobSpec};
pub use self::state::JobStatus;
