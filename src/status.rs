//! Deal status and the transition guard table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::DealCommand;

/// Lifecycle status of a deal.
///
/// The happy path runs `Draft -> Sent -> Paid -> EscrowHeld -> Ready ->
/// Released`. `Refunded`, `Cancelled` and `Expired` are exits. `Released`
/// and the three exits are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    EscrowHeld,
    Ready,
    Released,
    Refunded,
    Cancelled,
    Expired,
}

impl DealStatus {
    /// Return the wire label for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Sent => "SENT",
            Self::Paid => "PAID",
            Self::EscrowHeld => "ESCROW_HELD",
            Self::Ready => "READY",
            Self::Released => "RELEASED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether no further transition may leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Released | Self::Refunded | Self::Cancelled | Self::Expired
        )
    }

    /// Position on the happy path, or `None` for the exit statuses.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Draft => Some(0),
            Self::Sent => Some(1),
            Self::Paid => Some(2),
            Self::EscrowHeld => Some(3),
            Self::Ready => Some(4),
            Self::Released => Some(5),
            Self::Refunded | Self::Cancelled | Self::Expired => None,
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strictly commands are checked against the current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// The guard table is authoritative; out-of-order commands are rejected.
    #[default]
    Guarded,
    /// Every command is applied and recorded regardless of status. Exits
    /// from a terminal status are silently ignored.
    Recorded,
}

/// Statuses from which `command` is legal under [`TransitionPolicy::Guarded`].
pub fn allowed_from(command: DealCommand) -> &'static [DealStatus] {
    use DealStatus::*;
    match command {
        DealCommand::GenerateQuotation => &[Draft, Sent],
        DealCommand::SendToBuyer => &[Draft],
        DealCommand::ConfirmByBuyer => &[Sent],
        DealCommand::PaySuccess => &[Sent, Paid],
        DealCommand::PayFail => &[Sent, Paid],
        DealCommand::MarkReady => &[EscrowHeld],
        DealCommand::ConfirmHandover => &[EscrowHeld, Ready],
        DealCommand::MarkReleased => &[Ready],
        DealCommand::Refund => &[Paid, EscrowHeld, Ready],
        DealCommand::Cancel | DealCommand::Expire => &[Draft, Sent],
    }
}

/// Whether `command` is legal from `status` under the given policy.
///
/// Under [`TransitionPolicy::Recorded`] only the exit commands are
/// restricted: they never leave a terminal status.
pub fn is_allowed(policy: TransitionPolicy, command: DealCommand, status: DealStatus) -> bool {
    match policy {
        TransitionPolicy::Guarded => allowed_from(command).contains(&status),
        TransitionPolicy::Recorded => !(command.is_exit() && status.is_terminal()),
    }
}
