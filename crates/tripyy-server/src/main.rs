use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use tripyy_api::middleware::require_auth;
use tripyy_api::state::{AppState, AppStateInner};
use tripyy_api::{
    admin, auth, communities, health, notifications, pois, posts, profile, reports, search, trips,
    upload,
};
use tripyy_api::{mailer::Mailer, media::MediaGateway, notifier::Notifier};

mod janitor;
mod rate_limit;

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripyy=debug,tower_http=debug".into()),
        )
        .init();

    // Config; missing secrets are fatal, not defaulted
    let Some(jwt_secret) = env_opt("JWT_SECRET") else {
        error!("JWT_SECRET is not set, refusing to start");
        std::process::exit(1);
    };
    let Some(database_url) = env_opt("DATABASE_URL") else {
        error!("DATABASE_URL is not set, refusing to start");
        std::process::exit(1);
    };
    let db_path = database_url
        .strip_prefix("sqlite://")
        .unwrap_or(&database_url)
        .to_string();

    let port: u16 = env_opt("PORT").unwrap_or_else(|| "3000".into()).parse()?;
    let dev_bypass_emails: Vec<String> = env_opt("DEV_BYPASS_EMAILS")
        .unwrap_or_else(|| "dev@tripyy.com".into())
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mailer = Mailer::new(
        env_opt("SENDGRID_API_KEY"),
        env_opt("SENDGRID_FROM_EMAIL").unwrap_or_else(|| "noreply@tripyy.com".into()),
        env_opt("SENDGRID_FROM_NAME").unwrap_or_else(|| "Tripyy".into()),
        env_opt("FRONTEND_URL"),
    );
    let media = MediaGateway::new(
        env_opt("CLOUDINARY_CLOUD_NAME"),
        env_opt("CLOUDINARY_API_KEY"),
        env_opt("CLOUDINARY_API_SECRET"),
    );

    // Init database
    let db = tripyy_db::Database::open(&PathBuf::from(&db_path))?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        dev_bypass_emails,
        mailer,
        notifier: Notifier::new(),
        media,
    });

    // Background maintenance
    tokio::spawn(janitor::run_post_reaper(state.clone()));
    tokio::spawn(janitor::run_token_cleaner(state.clone(), 60 * 60, false));
    tokio::spawn(janitor::run_token_cleaner(state.clone(), 6 * 60 * 60, true));

    // Routes
    let public_routes = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/send-verification", post(auth::send_verification))
        .route("/api/auth/verify-email", post(auth::verify_email))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/api/check-nickname/{nickname}", get(profile::check_nickname))
        .with_state(state.clone());

    let protected_routes = Router::new()
        // Profile
        .route(
            "/api/user/traveler-profile",
            get(profile::get_traveler_profile).put(profile::update_traveler_profile),
        )
        .route("/api/user/stats", get(profile::get_my_stats))
        .route("/api/user/stats/{identifier}", get(profile::get_user_stats))
        .route("/api/user/friends", get(profile::get_friends))
        .route(
            "/api/user/llm-config",
            get(profile::get_llm_config).put(profile::update_llm_config),
        )
        .route(
            "/api/user/check-nickname/{nickname}",
            get(profile::check_nickname_authed),
        )
        // Trips
        .route(
            "/api/user/trips",
            get(trips::list_user_trips).post(trips::create_user_trip),
        )
        .route(
            "/api/user/trips/{tripId}",
            put(trips::update_user_trip).delete(trips::delete_user_trip),
        )
        .route("/api/trips", get(trips::list_trips).post(trips::create_trip))
        .route(
            "/api/trips/{id}",
            get(trips::get_trip)
                .put(trips::update_trip)
                .delete(trips::delete_trip),
        )
        // Posts
        .route("/api/posts", get(posts::list_posts).post(posts::create_post))
        .route("/api/posts/{postId}", put(posts::update_post))
        .route("/api/posts/{postId}/like", post(posts::toggle_like))
        .route("/api/posts/{postId}/comments", post(posts::add_comment))
        .route(
            "/api/posts/{postId}/comments/{commentId}/like",
            post(posts::toggle_comment_like),
        )
        // POIs
        .route(
            "/api/pois",
            get(pois::list_pois)
                .post(pois::create_poi)
                .put(pois::update_poi)
                .delete(pois::delete_poi),
        )
        .route("/api/pois/{poiId}/like", post(pois::toggle_like))
        .route("/api/pois/review", post(pois::add_review))
        .route(
            "/api/pois/review/{reviewId}/like",
            post(pois::toggle_review_like),
        )
        // Communities
        .route(
            "/api/communities",
            get(communities::list_communities).post(communities::create_community),
        )
        .route("/api/communities/{id}/join", post(communities::join_community))
        .route("/api/communities/{id}/leave", post(communities::leave_community))
        // Search
        .route("/api/search", get(search::search))
        // Moderation
        .route("/api/reports", post(reports::submit_report).get(reports::list_reports))
        .route(
            "/api/reports/{id}",
            get(reports::get_report).put(reports::update_report),
        )
        // Admin
        .route("/api/admin/assign", post(admin::assign_admin))
        .route("/api/admin/users", get(admin::list_admins))
        .route("/api/admin/users/{id}", put(admin::update_admin))
        .route("/api/admin/cleanup-posts", post(admin::cleanup_posts))
        .route("/api/fix-poi-strings", post(admin::fix_poi_strings))
        // Notifications
        .route(
            "/api/notifications/register-token",
            post(notifications::register_token),
        )
        .route("/api/notifications/send", post(notifications::send))
        .route(
            "/api/notifications/send-multiple",
            post(notifications::send_multiple),
        )
        // Uploads
        .route("/api/upload", post(upload::upload))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let limiter = rate_limit::RateLimiter::new();
    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(limiter, rate_limit::limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(12 * 1024 * 1024));

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Tripyy server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn cors_layer() -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    match env_opt("ALLOWED_ORIGINS") {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(methods)
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
    info!("shutdown signal received, draining connections");
}
