//! Payment flow services
//!
//! The five sequencer stages (charge, route, execute, settle, record), the
//! sequencer that chains them, and the link claim flow.

pub mod charge;
pub mod claim;
pub mod executor;
pub mod poller;
pub mod recorder;
pub mod route;
pub mod sequencer;

pub use charge::ChargeCreator;
pub use claim::{ClaimOutcome, LinkClaimer};
pub use executor::TransactionExecutor;
pub use poller::{SettlementOutcome, SettlementPoller};
pub use recorder::PaymentRecorder;
pub use route::{needs_route, RoutePolicy, RouteResolver};
pub use sequencer::{PaymentSequencer, SequencerServices, SequencerSettings};
