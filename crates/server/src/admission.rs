//! Credit-gated admission for new generation jobs.

use thiserror::Error;

use crate::external::{CreditStore, StoreError};

/// How a submission was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Unlimited account or admin email; nothing was charged.
    Unlimited,
    /// One credit was taken; `remaining` is the balance afterwards.
    Charged { remaining: u32 },
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("no credits left")]
    NoCredits,

    /// The balance looked positive but the decrement did not apply, usually a
    /// concurrent submission that spent the last credit first.
    #[error("credit decrement failed")]
    DecrementFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Check `user_id` against the credit store and spend one credit if needed.
pub async fn admit(
    credits: &dyn CreditStore,
    user_id: &str,
    admin_emails: &[String],
) -> Result<Admission, AdmissionError> {
    let account = credits
        .account(user_id)
        .await?
        .ok_or_else(|| AdmissionError::UnknownUser(user_id.to_string()))?;

    let is_admin = account
        .email
        .as_deref()
        .map(|email| {
            let email = email.trim().to_ascii_lowercase();
            admin_emails.iter().any(|a| *a == email)
        })
        .unwrap_or(false);

    if account.unlimited || is_admin {
        tracing::debug!(user_id, "unlimited account admitted");
        return Ok(Admission::Unlimited);
    }

    if account.credits == 0 {
        tracing::info!(user_id, "submission refused: no credits");
        return Err(AdmissionError::NoCredits);
    }

    if !credits.decrement_credit(user_id).await? {
        tracing::warn!(user_id, credits = account.credits, "credit decrement did not apply");
        return Err(AdmissionError::DecrementFailed);
    }

    let remaining = account.credits - 1;
    tracing::info!(user_id, remaining, "credit spent");
    Ok(Admission::Charged { remaining })
}
