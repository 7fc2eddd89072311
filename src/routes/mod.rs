mod auth;
mod health_check;

pub use auth::{
    get_current_user, login, logout, password_reset_confirm, password_reset_request, refresh_token,
    send_mail, signup, verify_email,
};
pub use health_check::health_check;
