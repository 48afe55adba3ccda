use axum::{
    Extension, Json,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::warn;

use super::{
    ApiError, ApiResponse, AppState, LoginRequest, LoginStageResponse, MessageResponse,
    NewPasswordRequest, OtpRequest, OtpSetupResponse, ResetRequest,
};
use crate::constants::{routes, session as keys};
use crate::domain::Account;
use crate::services::{
    AuthError, LoginStage, OtpSetup, PendingLoginTicket, RateLimitAction, RateLimitDecision,
    Registration,
};

/// The authenticated account, inserted by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Account);

// ============================================================================
// Middleware
// ============================================================================

/// Admits only requests whose session completed both login steps.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(account_id) = session.get::<i32>(keys::ACCOUNT_ID_KEY).await? else {
        return Err(ApiError::unauthenticated());
    };

    let account = match state.auth().get_account(account_id).await {
        Ok(account) => account,
        Err(AuthError::AccountNotFound) => {
            session.flush().await?;
            return Err(ApiError::unauthenticated());
        }
        Err(e) => return Err(e.into()),
    };

    tracing::Span::current().record("user_id", account.id);
    request.extensions_mut().insert(CurrentUser(account));

    Ok(next.run(request).await)
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn client_ip(request: &Request, trust_forwarded_headers: bool) -> Option<String> {
    let forwarded = trust_forwarded_headers
        .then(|| forwarded_ip(request.headers()))
        .flatten();
    if forwarded.is_some() {
        return forwarded;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Caps login submissions per client address.
pub async fn login_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trust_forwarded = state.config().security.login_rate_limit.trust_forwarded_headers;
    let ip = client_ip(&request, trust_forwarded);

    if state
        .shared
        .login_limiter
        .check_ip(ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        metrics::counter!("auth_login_outcomes_total", "outcome" => "rate_limited").increment(1);
        warn!(client = ip.as_deref().unwrap_or("unknown"), "Login rate limit exceeded");
        return Err(ApiError::TooManyRequests(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Helpers
// ============================================================================

async fn is_authenticated(session: &Session) -> Result<bool, ApiError> {
    Ok(session.get::<i32>(keys::ACCOUNT_ID_KEY).await?.is_some())
}

async fn redirect_if_authenticated(session: &Session) -> Result<(), ApiError> {
    if is_authenticated(session).await? {
        return Err(ApiError::Redirect(routes::INDEX));
    }
    Ok(())
}

/// The pending login for this session. Expired tickets are discarded.
async fn pending_ticket(session: &Session) -> Result<PendingLoginTicket, ApiError> {
    let Some(ticket) = session
        .get::<PendingLoginTicket>(keys::PENDING_LOGIN_KEY)
        .await?
    else {
        return Err(ApiError::Redirect(routes::LOGIN));
    };

    if ticket.is_expired(Utc::now()) {
        session
            .remove::<PendingLoginTicket>(keys::PENDING_LOGIN_KEY)
            .await?;
        return Err(ApiError::Redirect(routes::LOGIN));
    }

    Ok(ticket)
}

const fn next_step(stage: LoginStage) -> &'static str {
    match stage {
        LoginStage::NeedsOtpSetup => routes::OTP_SETUP,
        LoginStage::NeedsOtpVerify => routes::OTP_VERIFY,
    }
}

/// Drops the ticket when the service says the login can no longer proceed.
async fn discard_on_dead_ticket(session: &Session, err: AuthError) -> ApiError {
    if matches!(err, AuthError::NoPendingLogin)
        && let Err(e) = session
            .remove::<PendingLoginTicket>(keys::PENDING_LOGIN_KEY)
            .await
    {
        return e.into();
    }
    err.into()
}

async fn finish_login(
    state: &AppState,
    session: &Session,
    token: &str,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let ticket = pending_ticket(session).await?;

    let account = match state
        .auth()
        .complete_login(&ticket, token, Utc::now())
        .await
    {
        Ok(account) => account,
        Err(e) => return Err(discard_on_dead_ticket(session, e).await),
    };

    session
        .remove::<PendingLoginTicket>(keys::PENDING_LOGIN_KEY)
        .await?;
    session.cycle_id().await?;
    session.insert(keys::ACCOUNT_ID_KEY, account.id).await?;

    Ok(Json(ApiResponse::success(account)))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<Registration>,
) -> Result<Response, ApiError> {
    redirect_if_authenticated(&session).await?;

    let account = state.auth().register(payload).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(account))).into_response())
}

/// POST /auth/login
/// Password step. On success the session holds a pending login ticket.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginStageResponse>>, ApiError> {
    redirect_if_authenticated(&session).await?;

    if payload.username.trim().is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let ticket = state
        .auth()
        .submit_credentials(payload.username.trim(), &payload.password, Utc::now())
        .await?;

    session.insert(keys::PENDING_LOGIN_KEY, &ticket).await?;

    Ok(Json(ApiResponse::success(LoginStageResponse {
        stage: ticket.stage,
        next: next_step(ticket.stage),
    })))
}

/// GET /auth/2fa-setup
/// Provisions a fresh secret and returns the URI to render as a QR code.
pub async fn otp_setup_page(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    let mut ticket = pending_ticket(&session).await?;

    let outcome = match state
        .auth()
        .begin_otp_setup(&mut ticket, Utc::now())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return Err(discard_on_dead_ticket(&session, e).await),
    };

    session.insert(keys::PENDING_LOGIN_KEY, &ticket).await?;

    match outcome {
        OtpSetup::Provisioned { provisioning_uri } => Ok(Json(ApiResponse::success(
            OtpSetupResponse { provisioning_uri },
        ))
        .into_response()),
        OtpSetup::AlreadyEnrolled => Ok(Redirect::to(routes::OTP_VERIFY).into_response()),
    }
}

/// POST /auth/2fa-setup
pub async fn otp_setup_submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<OtpRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    finish_login(&state, &session, &payload.token).await
}

/// GET /auth/2fa-verify
pub async fn otp_verify_page(
    session: Session,
) -> Result<Json<ApiResponse<LoginStageResponse>>, ApiError> {
    let ticket = pending_ticket(&session).await?;

    Ok(Json(ApiResponse::success(LoginStageResponse {
        stage: ticket.stage,
        next: next_step(ticket.stage),
    })))
}

/// POST /auth/2fa-verify
pub async fn otp_verify_submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<OtpRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    finish_login(&state, &session, &payload.token).await
}

/// GET /auth/logout
pub async fn logout(session: Session) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    session.flush().await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "You have been logged out.",
    ))))
}

/// GET /auth/me
pub async fn me(Extension(CurrentUser(account)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(ApiResponse::success(account))
}

/// GET /auth/reset_password_request
pub async fn reset_password_request_page(
    session: Session,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    redirect_if_authenticated(&session).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Submit the email address of your account to receive a reset link.",
    ))))
}

/// POST /auth/reset_password_request
/// Answers the same way whether or not the email is known.
pub async fn reset_password_request(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    redirect_if_authenticated(&session).await?;

    state
        .auth()
        .request_password_reset(payload.email.trim(), Utc::now())
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "If an account with that email exists, you will receive a password-reset email shortly.",
    ))))
}

/// GET /auth/reset_password/{token}
pub async fn reset_password_check(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    redirect_if_authenticated(&session).await?;

    state.auth().check_reset_token(&token, Utc::now()).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Choose a new password.",
    ))))
}

/// POST /auth/reset_password/{token}
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(token): Path<String>,
    Json(payload): Json<NewPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    redirect_if_authenticated(&session).await?;

    state
        .auth()
        .reset_password(&token, &payload.password, &payload.password2, Utc::now())
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Your password has been reset.",
    ))))
}
