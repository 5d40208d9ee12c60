//! Deal commands and the context that travels with them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Actor;

/// A state machine operation issued against an existing deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealCommand {
    /// Assign the quotation number.
    GenerateQuotation,
    /// Send the deal to the buyer.
    SendToBuyer,
    /// Buyer accepts the quotation.
    ConfirmByBuyer,
    /// Payment gateway reported success; funds move into escrow.
    PaySuccess,
    /// Payment gateway reported failure; the deal returns to `Sent`.
    PayFail,
    /// Item is ready at the pickup point.
    MarkReady,
    /// Agent verified the handover credential.
    ConfirmHandover,
    /// Escrow is released to the dealer.
    MarkReleased,
    /// Held funds are returned to the buyer.
    Refund,
    /// Deal is abandoned before payment.
    Cancel,
    /// Deal lapsed before payment.
    Expire,
}

impl DealCommand {
    /// Every command, in happy-path order followed by the exits.
    pub const ALL: [DealCommand; 11] = [
        Self::GenerateQuotation,
        Self::SendToBuyer,
        Self::ConfirmByBuyer,
        Self::PaySuccess,
        Self::PayFail,
        Self::MarkReady,
        Self::ConfirmHandover,
        Self::MarkReleased,
        Self::Refund,
        Self::Cancel,
        Self::Expire,
    ];

    /// Return the snake_case name of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateQuotation => "generate_quotation",
            Self::SendToBuyer => "send_to_buyer",
            Self::ConfirmByBuyer => "confirm_by_buyer",
            Self::PaySuccess => "pay_success",
            Self::PayFail => "pay_fail",
            Self::MarkReady => "mark_ready",
            Self::ConfirmHandover => "confirm_handover",
            Self::MarkReleased => "mark_released",
            Self::Refund => "refund",
            Self::Cancel => "cancel",
            Self::Expire => "expire",
        }
    }

    /// The role that issues this command when the context names none.
    pub fn default_actor(&self) -> Actor {
        match self {
            Self::GenerateQuotation | Self::SendToBuyer | Self::MarkReady | Self::Cancel => {
                Actor::Dealer
            }
            Self::ConfirmByBuyer | Self::PaySuccess | Self::PayFail => Actor::Buyer,
            Self::ConfirmHandover | Self::MarkReleased | Self::Refund | Self::Expire => {
                Actor::Agent
            }
        }
    }

    /// Whether this command leaves the happy path.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Refund | Self::Cancel | Self::Expire)
    }
}

impl fmt::Display for DealCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-cutting metadata passed alongside a command.
///
/// Carries the audit role and correlation information without polluting
/// [`DealCommand`]. Both fields are stamped onto the recorded event.
///
/// # Examples
///
/// ```
/// use escrowfold::{Actor, CommandContext};
///
/// let ctx = CommandContext::default()
///     .with_actor(Actor::Agent)
///     .with_correlation_id("req-abc-123");
///
/// assert_eq!(ctx.actor, Some(Actor::Agent));
/// assert_eq!(ctx.correlation_id.as_deref(), Some("req-abc-123"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Role issuing the command. `None` means the command's default role.
    pub actor: Option<Actor>,
    /// Correlation ID for tracing a request across deals.
    pub correlation_id: Option<String>,
}

impl CommandContext {
    /// Set the issuing role.
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Set the correlation ID.
    ///
    /// # Arguments
    ///
    /// * `id` - Any value convertible to `String` used to correlate this
    ///   command with other operations.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// The role to record for `command`.
    pub fn actor_for(&self, command: DealCommand) -> Actor {
        self.actor.unwrap_or_else(|| command.default_actor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_has_no_fields_set() {
        let ctx = CommandContext::default();
        assert_eq!(ctx.actor, None);
        assert_eq!(ctx.correlation_id, None);
    }

    #[test]
    fn actor_for_falls_back_to_command_default() {
        let ctx = CommandContext::default();
        assert_eq!(ctx.actor_for(DealCommand::PaySuccess), Actor::Buyer);
        assert_eq!(ctx.actor_for(DealCommand::MarkReleased), Actor::Agent);
        assert_eq!(ctx.actor_for(DealCommand::MarkReady), Actor::Dealer);
    }

    #[test]
    fn explicit_actor_overrides_default() {
        let ctx = CommandContext::default().with_actor(Actor::Agent);
        assert_eq!(ctx.actor_for(DealCommand::MarkReady), Actor::Agent);
    }

    #[test]
    fn builder_accepts_owned_string() {
        let ctx = CommandContext::default().with_correlation_id(String::from("id-007"));
        assert_eq!(ctx.correlation_id.as_deref(), Some("id-007"));
    }

    #[test]
    fn command_names_are_unique() {
        let mut names: Vec<_> = DealCommand::ALL.iter().map(DealCommand::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DealCommand::ALL.len());
    }

    #[test]
    fn command_serde_uses_snake_case() {
        let json = serde_json::to_string(&DealCommand::ConfirmHandover).expect("serialize");
        assert_eq!(json, "\"confirm_handover\"");
        let back: DealCommand = serde_json::from_str("\"pay_fail\"").expect("deserialize");
        assert_eq!(back, DealCommand::PayFail);
    }
}
