/*
 * Responsibility
 * - Handler から見える「認可済みコンテキスト」の型
 * - authorization middleware が predicate を評価した後に request extensions に格納する
 *
 * Notes
 * - token の検証ロジックは services::auth の責務
 */
use crate::services::auth::VerifiedToken;

/// What the authorization stage learned about the caller.
///
/// - `token`: `None` for anonymous calls and for `API-Key` credentials
/// - `credential_presented`: an `Authorization` header was sent at all
#[derive(Debug, Clone, Default)]
pub struct AuthCtx {
    pub token: Option<VerifiedToken>,
    pub credential_presented: bool,
}

impl AuthCtx {
    pub fn new(token: Option<VerifiedToken>, credential_presented: bool) -> Self {
        Self {
            token,
            credential_presented,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.subject.as_str())
    }

    pub fn is_service_call(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_inter_service_call)
    }
}
