//! OTP/QR handover verification.
//!
//! Every deal carries a [`HandoverCredential`] minted once at creation. At
//! the pickup centre an agent looks the deal up by the buyer's OTP (or the
//! scanned QR payload) and confirms the handover, which is what unlocks
//! escrow release.

use serde::{Deserialize, Serialize};

use crate::command::CommandContext;
use crate::deal::Deal;
use crate::error::{ExecuteError, StateError};
use crate::repository::DealRepository;

/// Number of digits in a handover OTP.
pub const OTP_LEN: usize = 6;

/// The OTP and QR payload shown to the buyer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverCredential {
    pub otp: String,
    /// `"{deal_id}:{otp}"`.
    pub qr_payload: String,
}

impl HandoverCredential {
    /// Derive the credential for `deal_id` from a freshly drawn `otp`.
    pub fn new(deal_id: &str, otp: String) -> Self {
        Self {
            qr_payload: format!("{deal_id}:{otp}"),
            otp,
        }
    }

    /// Whether `candidate`, trimmed, equals this credential's OTP.
    pub fn matches(&self, candidate: &str) -> bool {
        normalize_otp(candidate).is_some_and(|otp| otp == self.otp)
    }
}

/// Split a QR payload into `(deal_id, otp)`.
///
/// The OTP is the text after the last `:`. Returns `None` when either part
/// is empty.
pub fn parse_qr(payload: &str) -> Option<(String, String)> {
    let (deal_id, otp) = payload.trim().rsplit_once(':')?;
    if deal_id.is_empty() || otp.is_empty() {
        return None;
    }
    Some((deal_id.to_string(), otp.to_string()))
}

/// Trim `input` and return it if it is a well-formed OTP.
fn normalize_otp(input: &str) -> Option<&str> {
    let otp = input.trim();
    (otp.len() == OTP_LEN && otp.bytes().all(|b| b.is_ascii_digit())).then_some(otp)
}

/// Whether an agent has confirmed the handover for a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationState {
    Unverified,
    Verified,
}

/// What the agent wants to do once the credential checks out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverAction {
    /// Record the handover only.
    ConfirmHandover,
    /// Record the handover if needed, then release escrow.
    Release,
}

/// Result of [`HandoverVerifier::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The credential matched and the action was applied.
    Confirmed(Deal),
    /// The deal exists but the OTP does not match its credential.
    NoMatch,
    /// No deal has this id.
    NotFound,
}

/// Looks deals up by credential and drives the handover transitions.
///
/// The verifier never writes status itself; every change goes through the
/// repository's transition operations.
#[derive(Clone)]
pub struct HandoverVerifier {
    repo: DealRepository,
}

impl HandoverVerifier {
    /// Create a verifier over `repo`.
    pub fn new(repo: DealRepository) -> Self {
        Self { repo }
    }

    /// All deals whose OTP equals the trimmed `otp`.
    ///
    /// OTPs are not unique across deals, so the result may hold several
    /// deals; the caller disambiguates. Input that is not six ASCII digits
    /// matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the repository cannot be read.
    pub async fn lookup(&self, otp: &str) -> Result<Vec<Deal>, StateError> {
        let Some(otp) = normalize_otp(otp) else {
            return Ok(Vec::new());
        };
        let matches: Vec<Deal> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|deal| deal.credential.otp == otp)
            .collect();
        tracing::debug!(matches = matches.len(), "otp lookup");
        Ok(matches)
    }

    /// The deal named by a scanned QR payload, if its OTP matches too.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the repository cannot be read.
    pub async fn lookup_qr(&self, payload: &str) -> Result<Option<Deal>, StateError> {
        let Some((deal_id, otp)) = parse_qr(payload) else {
            return Ok(None);
        };
        Ok(self
            .repo
            .get(&deal_id)
            .await?
            .filter(|deal| deal.credential.matches(&otp)))
    }

    /// Check `otp` against the stored deal and apply `action`.
    ///
    /// For [`HandoverAction::Release`] on a deal whose handover has not been
    /// confirmed yet, the confirmation is recorded first, so the log gains
    /// two entries.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] if a transition is rejected or cannot be
    /// persisted.
    ///
    /// The two steps of a release are committed separately. If the release
    /// fails after the confirmation was recorded, the error is returned but
    /// the deal stays confirmed; calling `confirm` again with
    /// [`HandoverAction::Release`] then only retries the release.
    pub async fn confirm(
        &self,
        deal_id: &str,
        otp: &str,
        action: HandoverAction,
        ctx: CommandContext,
    ) -> Result<VerifyOutcome, ExecuteError> {
        let deal = match self.repo.get(deal_id).await {
            Ok(Some(deal)) => deal,
            Ok(None) => return Ok(VerifyOutcome::NotFound),
            Err(StateError::Store(e)) => return Err(e.into()),
            Err(StateError::ActorGone) => return Err(ExecuteError::ActorGone),
        };

        if !deal.credential.matches(otp) {
            tracing::warn!(deal_id, "handover otp mismatch");
            return Ok(VerifyOutcome::NoMatch);
        }

        let needs_confirmation = match action {
            HandoverAction::ConfirmHandover => true,
            HandoverAction::Release => deal.verification() == VerificationState::Unverified,
        };

        let mut current = Some(deal);
        if needs_confirmation {
            current = self.repo.confirm_handover(deal_id, ctx.clone()).await?;
        }
        if action == HandoverAction::Release {
            current = self.repo.mark_released(deal_id, ctx).await?;
        }

        Ok(current.map_or(VerifyOutcome::NotFound, VerifyOutcome::Confirmed))
    }
}
