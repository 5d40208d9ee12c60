//! Escrow-backed deal lifecycle engine.
//!
//! A [`Deal`] moves from draft through payment, escrow custody and a
//! verified handover to settlement. Every change is recorded in the deal's
//! append-only event log, and invoices are projected from that state on
//! demand.

mod actor;
mod clock;
mod command;
mod deal;
mod error;
mod event;
mod fixtures;
mod handover;
mod projection;
mod repository;
mod snapshot;
mod status;
mod storage;

pub use clock::{
    Clock, IdGenerator, ManualClock, OTP_MAX, OTP_MIN, RandomIds, SequentialIds, SystemClock,
    Timestamp,
};
pub use command::{CommandContext, DealCommand};
pub use deal::{
    Buyer, Deal, DealPayload, Handover, PickupCenter, invoice_number, order_number,
    quotation_number,
};
pub use error::{DealError, ExecuteError, StateError, StoreError, ValidationError};
pub use event::{Actor, DealEvent, RecordedEvent};
pub use fixtures::{SeedDeal, demo_seed};
pub use handover::{
    HandoverAction, HandoverCredential, HandoverVerifier, VerificationState, VerifyOutcome,
    parse_qr,
};
pub use projection::{
    DocumentKind, InvoiceIndex, InvoiceRecord, InvoiceView, PickupPayload, TimelineEntry,
    project,
};
pub use repository::{DealRepository, DealRepositoryBuilder};
pub use status::{DealStatus, TransitionPolicy};
pub use storage::{DealStore, FileStore, MemoryStore};
