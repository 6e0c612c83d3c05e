//! The authentication collaborator (§4.7, §6 `authentication_provider`).

use async_trait::async_trait;
use relay_rpc_wire::{AuthenticationRequestMessage, Identity};

/// Validates credentials carried in an `auth` message and produces the
/// resulting identity. Implementations may fail; a failure is caught by the
/// server, emitted on the `error` event, and reported to the client as an
/// unauthenticated response (§7 propagation policy) — it never tears down
/// the session.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    async fn authenticate(&self, request: &AuthenticationRequestMessage) -> Result<Identity, String>;
}

/// A provider that accepts every request, assigning the identity found
/// under the `"name"` credential (or `"anonymous"` if absent). Useful for
/// demos and tests; production embedders supply their own.
pub struct AllowAllAuthenticationProvider;

#[async_trait]
impl AuthenticationProvider for AllowAllAuthenticationProvider {
    async fn authenticate(&self, request: &AuthenticationRequestMessage) -> Result<Identity, String> {
        let name = request.get("name").unwrap_or("anonymous").to_string();
        Ok(Identity { name, auth_type: "allow-all".to_string(), domain: None, roles: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_rpc_wire::Credential;

    #[tokio::test]
    async fn allow_all_uses_name_credential() {
        let provider = AllowAllAuthenticationProvider;
        let request = AuthenticationRequestMessage {
            credentials: vec![Credential { name: "name".into(), value: "alice".into() }],
        };
        let identity = provider.authenticate(&request).await.unwrap();
        assert_eq!(identity.name, "alice");
    }

    #[tokio::test]
    async fn allow_all_defaults_to_anonymous() {
        let provider = AllowAllAuthenticationProvider;
        let identity = provider.authenticate(&AuthenticationRequestMessage::default()).await.unwrap();
        assert_eq!(identity.name, "anonymous");
    }
}
