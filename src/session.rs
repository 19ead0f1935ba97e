use std::fmt;

use tracing::{info, warn};

use crate::browser::Browser;
use crate::config::Timings;
use crate::error::{Result, ScrapeError};

const USERNAME_INPUT: &str = "#username";
const PASSWORD_INPUT: &str = "#password";
const SUBMIT_BUTTON: &str = "button[type=\"submit\"]";

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Sign in through the login form. Still being on a login URL afterwards means rejection.
pub async fn authenticate(
    browser: &dyn Browser,
    credentials: &Credentials,
    login_url: &str,
    timings: &Timings,
) -> Result<()> {
    info!(email = %credentials.email, "Signing in");
    browser.navigate(login_url).await?;

    let form = browser
        .wait_for_all(USERNAME_INPUT, timings.wait_timeout)
        .await?;
    if form.is_empty() {
        return Err(ScrapeError::Auth("login form did not appear".into()));
    }

    browser.type_into(USERNAME_INPUT, &credentials.email).await?;
    browser.type_into(PASSWORD_INPUT, &credentials.password).await?;
    browser.click(SUBMIT_BUTTON).await?;
    tokio::time::sleep(timings.login_settle).await;

    let landed = browser.current_url().await?;
    if landed.contains("login") {
        warn!(url = %landed, "Still on the login page after submitting");
        return Err(ScrapeError::Auth(format!("rejected, landed on {landed}")));
    }

    info!("Signed in");
    Ok(())
}
