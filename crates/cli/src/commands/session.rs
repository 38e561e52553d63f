//! Sign-in and sign-out.
//!
//! # Usage
//!
//! ```bash
//! # Store tokens obtained from the storefront's login flow
//! cartsync login --token eyJ... --refresh-token rt_... --user-id u_17 --phone +2348035550100
//!
//! # Forget the session and the cart
//! cartsync logout
//! ```

use clap::Args;

use cartsync_client::{AuthSession, AuthUser};
use cartsync_core::{PhoneNumber, UserId};

use super::{CliError, Session, cart};

/// Tokens and user details for `login`.
#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Access token
    #[arg(long, env = "CARTSYNC_ACCESS_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Refresh token
    #[arg(long, env = "CARTSYNC_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long)]
    pub expires_in: Option<i64>,

    /// User ID
    #[arg(long)]
    pub user_id: Option<String>,

    /// User display name
    #[arg(long)]
    pub name: Option<String>,

    /// User phone number
    #[arg(long)]
    pub phone: Option<String>,
}

impl LoginArgs {
    fn into_session(self) -> Result<AuthSession, CliError> {
        let phone = self.phone.as_deref().map(PhoneNumber::parse).transpose()?;
        let user = self.user_id.map(|id| AuthUser {
            id: UserId::new(id),
            name: self.name,
            phone,
            email: None,
        });

        let session = AuthSession::new(user, self.token, self.refresh_token);
        Ok(match self.expires_in {
            Some(secs) => session.with_expires_in(secs),
            None => session,
        })
    }
}

/// Store the session, then replace the guest cart with the server cart.
pub async fn login(session: &Session, args: LoginArgs) -> Result<(), CliError> {
    let auth_session = args.into_session()?;
    session.auth.login(auth_session)?;

    let guest_lines = session.store.snapshot().items.len();
    if guest_lines > 0 {
        tracing::info!(guest_lines, "Guest cart will be replaced by the server cart");
    }
    session.store.handle_auth_change(true).await;
    if !session.store.sync_state().is_synced {
        tracing::warn!("Signed in, but the server cart could not be fetched");
    }
    cart::render(session)
}

/// Clear the session and the cart from storage.
pub async fn logout(session: &Session) -> Result<(), CliError> {
    session.auth.logout()?;
    session.store.handle_auth_change(false).await;
    session.store.reset_cart()?;
    tracing::info!("Signed out");
    Ok(())
}
