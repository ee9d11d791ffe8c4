//! Authorization flow sequencing.
//!
//! Drives the two-step handshake against a running server: begin
//! authentication, complete it with an operator-supplied verification
//! code when the server asks for one, then fetch the account list.
//! The server is always stopped afterwards, whatever the outcome.

use crate::display;
use crate::flow::{ApiClient, FlowError};
use crate::server::{ServerSupervisor, SupervisorError};

/// Error type for a complete run.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// Supervisor failure (launch or shutdown).
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// Flow failure (readiness, HTTP, or operator input).
    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// Seam for obtaining the verification code from the operator.
pub trait CodePrompt {
    /// Display the authorization URL and block for a verification code.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the code cannot be read.
    fn read_code(&mut self, authorization_url: &str) -> std::io::Result<String>;
}

/// Prompt that reads the verification code from stdin.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl CodePrompt for ConsolePrompt {
    fn read_code(&mut self, authorization_url: &str) -> std::io::Result<String> {
        display::print_authorization_url(authorization_url);
        display::print_code_prompt();
        let mut code = String::new();
        std::io::stdin().read_line(&mut code)?;
        Ok(code.trim().to_string())
    }
}

/// Run the authorization handshake and fetch the account list.
///
/// Steps are strictly ordered and abort on the first failure:
/// 1. POST the auth endpoint with no body.
/// 2. If the status is `authorize`, prompt for a verification code and
///    POST it back as a form field.
/// 3. GET the accounts endpoint and return its body verbatim.
///
/// # Errors
///
/// Returns `FlowError` on any transport failure or non-success status.
pub async fn run_flow(
    client: &ApiClient,
    customer: &str,
    prompt: &mut dyn CodePrompt,
) -> Result<String, FlowError> {
    let status = client.begin_auth(customer).await?;
    tracing::info!(status = %status.status, "authentication started");

    if status.needs_authorization() {
        let url = status
            .authorization_url
            .as_deref()
            .ok_or(FlowError::MissingAuthorizationUrl)?;
        let code = prompt.read_code(url)?;
        client.verify(customer, &code).await?;
        tracing::info!("verification accepted");
    }

    client.list_accounts(customer).await
}

/// Execute the flow against an already-started supervisor, guaranteeing
/// the server is stopped exactly once afterwards.
///
/// A shutdown failure is reported but never masks the flow's own
/// result, successful or not.
///
/// # Errors
///
/// Returns `RunError` if the readiness poll, the handshake, or the
/// accounts fetch fails.
pub async fn execute(
    supervisor: &mut ServerSupervisor,
    client: &ApiClient,
    customer: &str,
    prompt: &mut dyn CodePrompt,
    ready_attempts: u32,
) -> Result<String, RunError> {
    let result = async {
        client.wait_ready(ready_attempts).await?;
        run_flow(client, customer, prompt).await
    }
    .await;

    let shutdown = supervisor.stop().await;

    // Relay whatever the server printed before it exited.
    for line in supervisor.drain_output() {
        display::print_server_line(&line);
    }

    if let Err(e) = shutdown {
        display::print_error(&format!("server shutdown failed: {e}"));
        tracing::error!(error = %e, "server shutdown failed");
    }

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Prompt that returns a scripted code and counts invocations.
    pub struct ScriptedPrompt {
        code: String,
        pub calls: usize,
        pub seen_url: Option<String>,
    }

    impl ScriptedPrompt {
        pub fn new(code: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                calls: 0,
                seen_url: None,
            }
        }
    }

    impl CodePrompt for ScriptedPrompt {
        fn read_code(&mut self, authorization_url: &str) -> std::io::Result<String> {
            self.calls += 1;
            self.seen_url = Some(authorization_url.to_string());
            Ok(self.code.clone())
        }
    }

    #[test]
    fn scripted_prompt_records_url() {
        let mut prompt = ScriptedPrompt::new("12345");
        let code = prompt.read_code("https://example.com/verify").unwrap();
        assert_eq!(code, "12345");
        assert_eq!(prompt.calls, 1);
        assert_eq!(
            prompt.seen_url.as_deref(),
            Some("https://example.com/verify")
        );
    }
}
