/// Authentication Routes
///
/// Signup, login, token refresh, logout, current user, email verification,
/// password reset and bulk mail. Token checks happen in `BearerAuth` before
/// the guarded handlers run.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{require_role, AuthService, SignupData, TokenPayload, ANY_ROLE};
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, ErrorContext};
use crate::mail_queue::{EmailMessage, MailQueue};
use crate::users::{Role, User};
use crate::validators::is_valid_email;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub new_password: String,
    pub confirm_new_password: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub addresses: Vec<String>,
}

#[derive(Serialize)]
pub struct LoginUser {
    pub email: String,
    pub user_id: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: LoginUser,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Public view of a user; the password hash is never part of it
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            is_verified: user.is_verified,
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: UserResponse,
}

fn message(text: &str) -> serde_json::Value {
    serde_json::json!({ "message": text })
}

/// POST /auth/signup
///
/// # Errors
/// - 400: validation errors
/// - 403: email already registered
pub async fn signup(
    form: web::Json<SignupData>,
    auth: web::Data<AuthService>,
    mail: web::Data<MailQueue>,
    app: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("signup");

    let user = auth.signup(form.into_inner()).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    let token = auth.verification_token(&user.email)?;
    let link = format!("{}/auth/verify/{}", app.base_url.trim_end_matches('/'), token);
    mail.send(EmailMessage {
        recipients: vec![user.email.clone()],
        subject: "Verify your email".to_string(),
        html_body: format!(
            "<h1>Verify your Email</h1><p>Please click this <a href=\"{}\">link</a> to verify your email</p>",
            link
        ),
    });

    tracing::info!(request_id = %context.request_id, user_id = %user.id, "Signup complete");

    Ok(HttpResponse::Created().json(SignupResponse {
        message: "Account created! Check email to verify your account".to_string(),
        user: UserResponse::from(&user),
    }))
}

/// POST /auth/login
///
/// Unknown email and wrong password produce the same 400 response.
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.login(&form.email, &form.password).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "Login successful".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: auth.codec().access_ttl().num_seconds(),
        user: LoginUser {
            email: pair.user.email,
            user_id: pair.user.user_id,
        },
    }))
}

/// GET /auth/refresh-token (refresh token required)
pub async fn refresh_token(
    payload: web::ReqData<TokenPayload>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let access_token = auth.refresh(&payload)?;

    Ok(HttpResponse::Ok().json(RefreshResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: auth.codec().access_ttl().num_seconds(),
    }))
}

/// GET /auth/logout (access token required)
pub async fn logout(
    payload: web::ReqData<TokenPayload>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&payload).await?;
    Ok(HttpResponse::Ok().json(message("Logged Out Successfully")))
}

/// GET /auth/me (access token required, any role)
pub async fn get_current_user(
    payload: web::ReqData<TokenPayload>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth.access().current_principal(&payload).await?;
    require_role(&user, ANY_ROLE)?;

    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// GET /auth/verify/{token}
pub async fn verify_email(
    token: web::Path<String>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.verify_email(&token).await?;
    Ok(HttpResponse::Ok().json(message("Account verified successfully")))
}

/// POST /auth/password-reset-request
///
/// Answers the same way whether or not the email has an account.
pub async fn password_reset_request(
    form: web::Json<PasswordResetRequest>,
    auth: web::Data<AuthService>,
    mail: web::Data<MailQueue>,
    app: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    if let Some((user, token)) = auth.request_password_reset(&form.email).await? {
        let link = format!(
            "{}/auth/password-reset-confirm/{}",
            app.base_url.trim_end_matches('/'),
            token
        );
        mail.send(EmailMessage {
            recipients: vec![user.email],
            subject: "Reset your password".to_string(),
            html_body: format!(
                "<h1>Reset Your Password</h1><p>Please click this <a href=\"{}\">link</a> to reset your password</p>",
                link
            ),
        });
    }

    Ok(HttpResponse::Ok().json(message(
        "Please check your email for instructions to reset your password",
    )))
}

/// POST /auth/password-reset-confirm/{token}
pub async fn password_reset_confirm(
    token: web::Path<String>,
    form: web::Json<PasswordResetConfirm>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    auth.reset_password(&token, form.new_password, &form.confirm_new_password)
        .await?;

    Ok(HttpResponse::Ok().json(message("Password reset successfully")))
}

/// Normalised valid addresses, plus how many were dropped
fn valid_recipients(addresses: &[String]) -> (Vec<String>, usize) {
    let recipients: Vec<String> = addresses
        .iter()
        .filter_map(|address| is_valid_email(address).ok())
        .collect();
    let skipped = addresses.len() - recipients.len();
    (recipients, skipped)
}

/// POST /auth/send-mail
///
/// Mails every valid address and skips the rest.
pub async fn send_mail(
    form: web::Json<EmailRequest>,
    mail: web::Data<MailQueue>,
) -> Result<HttpResponse, AppError> {
    let (recipients, skipped) = valid_recipients(&form.addresses);
    if skipped > 0 {
        tracing::warn!(skipped, "Skipped invalid addresses in bulk mail request");
    }

    if !recipients.is_empty() {
        mail.send(EmailMessage {
            recipients,
            subject: "Welcome to Bookly".to_string(),
            html_body: "<h1>Welcome to Bookly</h1>".to_string(),
        });
    }

    Ok(HttpResponse::Ok().json(message("Email sent successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::NewUser;

    #[test]
    fn test_user_response_hides_password_hash() {
        let user = User::from_new(NewUser {
            username: "reader".to_string(),
            email: "a@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password_hash: "$2b$12$secret".to_string(),
        });

        let json = serde_json::to_value(UserResponse::from(&user)).unwrap();
        assert_eq!(json["email"], "a@x.com");
        assert_eq!(json["role"], "user");
        assert!(!json.to_string().contains("secret"));
    }

    #[test]
    fn test_valid_recipients_skips_bad_addresses() {
        let addresses = vec![
            "A@Example.com".to_string(),
            "nope".to_string(),
            "b@example.com".to_string(),
        ];

        let (recipients, skipped) = valid_recipients(&addresses);
        assert_eq!(recipients, vec!["a@example.com".to_string(), "b@example.com".to_string()]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_password_reset_confirm_deserialization() {
        let json = r#"{"new_password": "a", "confirm_new_password": "b"}"#;
        let form: PasswordResetConfirm = serde_json::from_str(json).unwrap();
        assert_eq!(form.new_password, "a");
        assert_eq!(form.confirm_new_password, "b");
    }
}
