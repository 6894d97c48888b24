use crate::{
    api::{attendance, batch, reports, users},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(handlers::protected)
            .service(
                web::scope("/accounts")
                    // /accounts/{id}/role
                    .service(
                        web::resource("/{id}/role").route(web::put().to(handlers::set_role)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // literal tails before the generic {date} pattern
                    .service(
                        web::resource("/{email}/today")
                            .route(web::get().to(attendance::today_status)),
                    )
                    .service(
                        web::resource("/{email}/punch").route(web::post().to(attendance::punch)),
                    )
                    .service(
                        web::resource("/{email}/{date}")
                            .route(web::put().to(attendance::update_record))
                            .route(web::delete().to(attendance::delete_record)),
                    )
                    .service(
                        web::resource("/{email}").route(web::get().to(attendance::list_records)),
                    ),
            )
            .service(
                web::scope("/batch")
                    .service(
                        web::resource("")
                            .route(web::get().to(batch::list_batch))
                            .route(web::delete().to(batch::clear_batch)),
                    )
                    .service(web::resource("/toggle").route(web::post().to(batch::toggle_action)))
                    .service(web::resource("/sync").route(web::post().to(batch::sync_batch))),
            )
            .service(
                web::scope("/users")
                    .service(web::resource("/lookup").route(web::get().to(users::lookup)))
                    .service(
                        web::resource("/import").route(web::post().to(users::import_profiles)),
                    )
                    .service(
                        web::resource("")
                            .route(web::post().to(users::create_profile))
                            .route(web::get().to(users::list_profiles)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(users::update_profile))
                            .route(web::delete().to(users::delete_profile)),
                    ),
            )
            .service(
                web::scope("/reports")
                    .service(web::resource("/user").route(web::get().to(reports::user_report)))
                    .service(web::resource("/rankings").route(web::get().to(reports::rankings))),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)
//
// API REQUEST
//  └─ Authorization: Bearer access_token
//
// ACCESS EXPIRED
//  └─ POST /refresh with refresh_token
//       └─ returns new access_token
