//! DTOs for the token and athlete endpoints.
//!
//! List and detail bodies stay as raw JSON; only the token exchange and the
//! athlete lookup are decoded into typed shapes.

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::domain::ports::TokenGrant;

#[derive(Deserialize)]
pub(super) struct TokenResponseDto {
    access_token: Option<String>,
    refresh_token: Option<String>,
    athlete: Option<AthleteDto>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AthleteDto {
    pub(super) id: Option<i64>,
}

impl TokenResponseDto {
    pub(super) fn into_grant(self) -> Result<TokenGrant, String> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| "token response carried no access_token".to_owned())?;
        Ok(TokenGrant {
            access_token: Zeroizing::new(access_token),
            refresh_token: self
                .refresh_token
                .filter(|token| !token.is_empty())
                .map(Zeroizing::new),
            athlete_id: self.athlete.and_then(|athlete| athlete.id),
            scope: self.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_keeps_rotation_owner_and_scope() {
        let dto: TokenResponseDto = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r2","athlete":{"id":5},"scope":"read"}"#,
        )
        .expect("valid json");

        let grant = dto.into_grant().expect("grant");

        assert_eq!(grant.access_token.as_str(), "a");
        assert_eq!(grant.refresh_token.as_deref().map(String::as_str), Some("r2"));
        assert_eq!(grant.athlete_id, Some(5));
        assert_eq!(grant.scope.as_deref(), Some("read"));
    }

    #[test]
    fn missing_access_token_is_rejected() {
        let dto: TokenResponseDto =
            serde_json::from_str(r#"{"refresh_token":"r2"}"#).expect("valid json");
        assert!(dto.into_grant().is_err());
    }
}
