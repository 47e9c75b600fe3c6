//! Session policies for chain members
//!
//! The first member of a chain starts from a hard reset. Later members either
//! soft-navigate to their page, keeping in-memory application state, or
//! continue exactly where the previous member left off.
//!
//! Session facts are carried in an immutable [`SessionState`] that each
//! operation returns updated.

use attest_browser::page::{tagged_script, url_path};
use attest_browser::{ActionAgent, PageControl};
use attest_core::config::TimingConfig;
use attest_core::{AttestError, CredentialSet, Result};
use tracing::{debug, info, warn};

/// How to prepare the page before a chain member runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Wipe storage and cookies, then reload the base URL
    HardReset,
    /// In-page location change to the member's page
    SoftNavigate { path: String },
    /// Leave the page as it is
    Keep,
}

impl SessionPolicy {
    pub fn select(clear_session: bool, navigate_to: Option<&str>) -> Self {
        if clear_session {
            SessionPolicy::HardReset
        } else {
            match navigate_to {
                Some(path) if !path.is_empty() && !is_parameterized(path) => {
                    SessionPolicy::SoftNavigate { path: path.to_string() }
                }
                _ => SessionPolicy::Keep,
            }
        }
    }
}

/// Session facts threaded through a verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub base_url: String,
    /// URL observed after the last session operation
    pub current_url: Option<String>,
    pub hard_resets: u32,
    pub auth_recoveries: u32,
}

impl SessionState {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            current_url: None,
            hard_resets: 0,
            auth_recoveries: 0,
        }
    }

    pub fn at(&self, url: impl Into<String>) -> Self {
        Self {
            current_url: Some(url.into()),
            ..self.clone()
        }
    }

    fn after_reset(&self, url: impl Into<String>) -> Self {
        Self {
            hard_resets: self.hard_resets + 1,
            ..self.at(url)
        }
    }

    fn after_recovery(&self) -> Self {
        Self {
            auth_recoveries: self.auth_recoveries + 1,
            ..self.clone()
        }
    }
}

/// Paths with route parameters (`/tasks/:id`, `/p/[slug]`, `/u/{id}`)
pub fn is_parameterized(path: &str) -> bool {
    path.split('/').any(|segment| {
        segment.starts_with(':')
            || segment.starts_with('[')
            || segment.starts_with('{')
            || segment.starts_with('<')
            || segment == "*"
    })
}

/// Sign-in style pages that indicate a lost session
pub fn is_auth_page(url: &str) -> bool {
    url_path(url)
        .to_lowercase()
        .split('/')
        .any(|segment| matches!(segment, "login" | "signin" | "sign-in" | "log-in" | "auth"))
}

/// Whether a soft navigation from `current` to `target` is unnecessary
pub fn skip_soft_navigation(current_path: &str, target: &str) -> bool {
    let current = current_path.trim_end_matches('/');
    let target = target.trim_end_matches('/');
    current == target
        || is_parameterized(target)
        || (!target.is_empty() && current.starts_with(&format!("{}/", target)))
}

const CLEAR_STORAGE: &str = r#"try { window.localStorage.clear(); } catch (e) {}
try { window.sessionStorage.clear(); } catch (e) {}
for (const cookie of document.cookie.split(';')) {
  const name = cookie.split('=')[0].trim();
  if (name) document.cookie = name + '=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/';
}
return true;"#;

/// Applies [`SessionPolicy`]s against one page
pub struct SessionManager<'a> {
    page: &'a dyn PageControl,
    agent: &'a dyn ActionAgent,
    timing: &'a TimingConfig,
}

impl<'a> SessionManager<'a> {
    pub fn new(page: &'a dyn PageControl, agent: &'a dyn ActionAgent, timing: &'a TimingConfig) -> Self {
        Self { page, agent, timing }
    }

    pub async fn apply(
        &self,
        policy: &SessionPolicy,
        state: SessionState,
        credentials: &CredentialSet,
    ) -> Result<SessionState> {
        match policy {
            SessionPolicy::HardReset => self.hard_reset(state).await,
            SessionPolicy::SoftNavigate { path } => self.soft_navigate(path, state, credentials).await,
            SessionPolicy::Keep => {
                debug!("Keeping session as-is");
                Ok(state)
            }
        }
    }

    /// Leave the origin, come back, wipe client state and reload
    pub async fn hard_reset(&self, state: SessionState) -> Result<SessionState> {
        info!("Hard-resetting session at {}", state.base_url);
        self.page.navigate("about:blank").await?;
        self.page.navigate(&state.base_url).await?;
        self.page
            .evaluate(&tagged_script("clear-storage", CLEAR_STORAGE))
            .await?;
        self.page.reload().await?;
        self.page
            .wait_for_network_idle(self.timing.network_idle_timeout())
            .await?;
        let url = self.page.current_url().await?;
        Ok(state.after_reset(url))
    }

    /// Move to `path` in-page, recovering a lost sign-in when possible
    pub async fn soft_navigate(
        &self,
        path: &str,
        state: SessionState,
        credentials: &CredentialSet,
    ) -> Result<SessionState> {
        let current = self.page.current_url().await?;
        if skip_soft_navigation(&url_path(&current), path) {
            debug!("Already at {}, skipping soft navigation to {}", current, path);
            return Ok(state.at(current));
        }

        self.move_to(path).await?;
        let mut state = state;
        let landed = self.page.current_url().await?;

        if is_auth_page(&landed) {
            if credentials.is_empty() {
                warn!("Session lost at {} and no credentials are tracked", landed);
                return Err(AttestError::UnexpectedPage(format!(
                    "soft navigation to {} landed on sign-in page {} with no tracked credentials",
                    path, landed
                )));
            }
            warn!("Session lost at {}, signing in again", landed);
            self.sign_in(credentials).await?;
            state = state.after_recovery();
            self.move_to(path).await?;
        }

        let url = self.page.current_url().await?;
        Ok(state.at(url))
    }

    async fn move_to(&self, path: &str) -> Result<()> {
        debug!("Soft-navigating to {}", path);
        self.page.navigate_in_page(path).await?;
        tokio::time::sleep(self.timing.stabilize()).await;
        self.page
            .wait_for_network_idle(self.timing.network_idle_timeout())
            .await
    }

    async fn sign_in(&self, credentials: &CredentialSet) -> Result<()> {
        if credentials.is_empty() {
            return Err(AttestError::UnexpectedPage("sign-in required but no credentials tracked".into()));
        }

        let mut steps = Vec::new();
        if let Some(email) = &credentials.email {
            steps.push(format!("Type '{}' into the email field", email));
        }
        if let Some(password) = &credentials.password {
            steps.push(format!("Type '{}' into the password field", password));
        }
        steps.push("Click the sign in button to submit the form".to_string());
        for instruction in &steps {
            let outcome = self.agent.act(instruction).await?;
            if !outcome.success {
                return Err(AttestError::Agent(format!("Re-authentication failed: {}", outcome.message)));
            }
        }

        self.page
            .wait_for_network_idle(self.timing.network_idle_timeout())
            .await?;
        info!(
            "Re-authenticated as {}",
            credentials.email.as_deref().unwrap_or("(password only)")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_browser::testing::{MockAgent, MockPage};

    fn creds() -> CredentialSet {
        CredentialSet {
            email: Some("ada_1@test.com".to_string()),
            password: Some("pw".to_string()),
        }
    }

    #[test]
    fn test_policy_selection() {
        assert_eq!(SessionPolicy::select(true, Some("/tasks")), SessionPolicy::HardReset);
        assert_eq!(
            SessionPolicy::select(false, Some("/tasks")),
            SessionPolicy::SoftNavigate { path: "/tasks".to_string() }
        );
        assert_eq!(SessionPolicy::select(false, Some("/tasks/:id")), SessionPolicy::Keep);
        assert_eq!(SessionPolicy::select(false, None), SessionPolicy::Keep);
    }

    #[test]
    fn test_skip_rules() {
        assert!(skip_soft_navigation("/tasks/", "/tasks"));
        assert!(skip_soft_navigation("/tasks/42/edit", "/tasks"));
        assert!(skip_soft_navigation("/home", "/p/[slug]"));
        assert!(!skip_soft_navigation("/tasks-archive", "/tasks"));
        assert!(!skip_soft_navigation("/home", "/tasks"));
        assert!(is_auth_page("http://localhost:3000/auth/sign-in?next=/"));
        assert!(!is_auth_page("http://localhost:3000/author"));
    }

    #[tokio::test]
    async fn test_hard_reset_sequence() {
        let page = MockPage::new("http://localhost:3000/old");
        let agent = MockAgent::new();
        let timing = TimingConfig::immediate();
        let manager = SessionManager::new(&page, &agent, &timing);

        let state = manager
            .apply(&SessionPolicy::HardReset, SessionState::new("http://localhost:3000"), &CredentialSet::default())
            .await
            .unwrap();

        assert_eq!(state.hard_resets, 1);
        assert_eq!(state.current_url.as_deref(), Some("http://localhost:3000"));
        let calls = page.calls();
        assert_eq!(calls[0], "page:navigate about:blank");
        assert_eq!(calls[1], "page:navigate http://localhost:3000");
        assert_eq!(calls[2], "page:evaluate clear-storage");
        assert_eq!(calls[3], "page:reload");
    }

    #[tokio::test]
    async fn test_soft_navigation_skips_descendant() {
        let page = MockPage::new("http://localhost:3000/tasks/7");
        let agent = MockAgent::new();
        let timing = TimingConfig::immediate();
        let manager = SessionManager::new(&page, &agent, &timing);

        let state = manager
            .soft_navigate("/tasks", SessionState::new("http://localhost:3000"), &creds())
            .await
            .unwrap();
        assert_eq!(state.current_url.as_deref(), Some("http://localhost:3000/tasks/7"));
        assert_eq!(page.log().count("page:soft-navigate"), 0);
    }

    #[tokio::test]
    async fn test_soft_navigation_moves_without_reload() {
        let page = MockPage::new("http://localhost:3000/home");
        let agent = MockAgent::new();
        let timing = TimingConfig::immediate();
        let manager = SessionManager::new(&page, &agent, &timing);

        let state = manager
            .soft_navigate("/settings", SessionState::new("http://localhost:3000"), &creds())
            .await
            .unwrap();
        assert_eq!(state.current_url.as_deref(), Some("http://localhost:3000/settings"));
        assert_eq!(page.log().count("page:reload"), 0);
        assert_eq!(state.auth_recoveries, 0);
        assert!(agent.acts().is_empty());
    }

    #[tokio::test]
    async fn test_auth_loss_recovery_signs_in() {
        // The app bounced to /login; soft-navigating there simulates the redirect
        let page = MockPage::new("http://localhost:3000/home");
        let agent = MockAgent::new();
        let timing = TimingConfig::immediate();
        let manager = SessionManager::new(&page, &agent, &timing);

        let state = manager
            .soft_navigate("/login", SessionState::new("http://localhost:3000"), &creds())
            .await
            .unwrap();

        assert_eq!(state.auth_recoveries, 1);
        let acts = agent.acts();
        assert_eq!(acts.len(), 3);
        assert!(acts[0].contains("ada_1@test.com"));
        assert_eq!(page.log().count("page:soft-navigate"), 2);
    }

    #[tokio::test]
    async fn test_auth_loss_recovery_with_email_only() {
        let page = MockPage::new("http://localhost:3000/home");
        let agent = MockAgent::new();
        let timing = TimingConfig::immediate();
        let manager = SessionManager::new(&page, &agent, &timing);
        let email_only = CredentialSet {
            email: Some("ada_1@test.com".to_string()),
            password: None,
        };

        let state = manager
            .soft_navigate("/login", SessionState::new("http://localhost:3000"), &email_only)
            .await
            .unwrap();

        assert_eq!(state.auth_recoveries, 1);
        let acts = agent.acts();
        assert_eq!(acts.len(), 2);
        assert!(acts[0].contains("ada_1@test.com"));
    }

    #[tokio::test]
    async fn test_auth_loss_without_credentials_is_unexpected_page() {
        let page = MockPage::new("http://localhost:3000/home");
        let agent = MockAgent::new();
        let timing = TimingConfig::immediate();
        let manager = SessionManager::new(&page, &agent, &timing);

        let error = manager
            .soft_navigate("/login", SessionState::new("http://localhost:3000"), &CredentialSet::default())
            .await
            .unwrap_err();

        assert!(matches!(error, AttestError::UnexpectedPage(_)));
        assert!(agent.acts().is_empty());
    }
}
