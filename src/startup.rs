use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::mail_queue::MailQueue;
use crate::middleware::BearerAuth;
use crate::routes::{
    get_current_user, health_check, login, logout, password_reset_confirm, password_reset_request,
    refresh_token, send_mail, signup, verify_email,
};

/// Builds the HTTP server around an already wired `AuthService`.
///
/// Storage and mail delivery are decided by the caller, so tests can run the
/// full route table against in-memory stores.
pub fn run(
    listener: TcpListener,
    auth: AuthService,
    mail: MailQueue,
    application: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(auth);
    let mail = web::Data::new(mail);
    let application = web::Data::new(application);

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            tracing::warn!(error = %err, "Rejected request body");
            AppError::Validation(ValidationError::InvalidFormat("request body".to_string())).into()
        });

        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(json_config)
            .app_data(auth.clone())
            .app_data(mail.clone())
            .app_data(application.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
                    .route("/verify/{token}", web::get().to(verify_email))
                    .route("/password-reset-request", web::post().to(password_reset_request))
                    .route(
                        "/password-reset-confirm/{token}",
                        web::post().to(password_reset_confirm),
                    )
                    .route("/send-mail", web::post().to(send_mail))
                    .service(
                        web::resource("/refresh-token")
                            .wrap(BearerAuth::refresh(auth.verifier()))
                            .route(web::get().to(refresh_token)),
                    )
                    .service(
                        web::resource("/logout")
                            .wrap(BearerAuth::access(auth.verifier()))
                            .route(web::get().to(logout)),
                    )
                    .service(
                        web::resource("/me")
                            .wrap(BearerAuth::access(auth.verifier()))
                            .route(web::get().to(get_current_user)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
