use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;

use crate::dtos::{AuthRequest, AuthResponse};
use crate::engines::{engine_factory, Credentials, EngineFactory, EngineServices};
use crate::error::AuthError;
use crate::middleware::RequestIdentity;
use crate::services::StorageSession;
use crate::utils::ValidatedJson;
use crate::AppState;

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// `POST /auth/auth`: authenticate with the named engine.
///
/// The access token is returned in the body and the refresh token is set as
/// an http-only, secure, strict same-site cookie. Storage writes are
/// committed only when the whole exchange succeeds.
pub async fn authenticate(
    State(state): State<AppState>,
    mut identity: RequestIdentity,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<AuthRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    // Resolve the engine before touching storage.
    let factory = engine_factory(&req.engine)?;
    let mut session = state.storage.begin().await.map_err(AuthError::from)?;

    let outcome = run_engine(
        factory,
        session.as_mut(),
        state.engine_services(),
        &req.credentials,
        &mut identity,
    )
    .await;

    let (response, refresh_token) = match outcome {
        Ok(done) => {
            session.commit().await.map_err(AuthError::from)?;
            done
        }
        Err(e) => {
            if let Err(rollback_err) = session.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back auth session");
            }
            return Err(e.into());
        }
    };

    let cookie = Cookie::build((REFRESH_TOKEN_COOKIE, refresh_token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::minutes(
            state.tokens.refresh_token_timeout_minutes(),
        ))
        .build();

    Ok((jar.add(cookie), Json(response)))
}

async fn run_engine(
    factory: EngineFactory,
    session: &mut dyn StorageSession,
    services: EngineServices<'_>,
    credentials: &Credentials,
    identity: &mut RequestIdentity,
) -> Result<(AuthResponse, String), AuthError> {
    let authenticated = {
        let mut engine = factory(Some(&mut *session), services)?;
        engine.authenticate(credentials).await?
    };

    identity.seed_authenticated(authenticated.access_token.clone(), authenticated.user);
    let user = identity.user(session).await?.sanitized();

    Ok((
        AuthResponse {
            access_token: authenticated.access_token,
            user,
        },
        authenticated.refresh_token,
    ))
}
