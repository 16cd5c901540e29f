use super::handlers::{auth, fs, health};
use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and documented. Handlers sharing a path go into one `routes!`
/// call so their methods merge.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut kesto_tag = Tag::new("kesto");
    kesto_tag.description = Some("Service metadata".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, verification, and login".to_string());

    let mut fs_tag = Tag::new("fs");
    fs_tag.description = Some("Per-user directory and file tree".to_string());

    let mut seed = cargo_openapi();
    seed.tags = Some(vec![kesto_tag, auth_tag, fs_tag]);

    let router = OpenApiRouter::with_openapi(seed)
        .routes(routes!(health::health))
        .routes(routes!(auth::login::password_login))
        .routes(routes!(auth::login::two_factor_login))
        .routes(routes!(auth::registration::username_available))
        .routes(routes!(auth::registration::send_verification))
        .routes(routes!(auth::registration::confirm_verification))
        .routes(routes!(auth::registration::totp_provision))
        .routes(routes!(auth::registration::confirm_totp))
        .routes(routes!(auth::registration::create_user))
        .routes(routes!(fs::directories::entry_directory))
        .routes(routes!(
            fs::directories::get_directory,
            fs::directories::create_directory
        ))
        .routes(routes!(fs::directories::delete_directory))
        .routes(routes!(fs::files::get_file, fs::files::upload_file))
        .routes(routes!(fs::files::delete_file));

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum defaults.
    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    OpenApiBuilder::new().info(info).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );
    }

    #[test]
    fn all_routes_are_documented() {
        let spec = openapi();
        let paths = &spec.paths.paths;
        for path in [
            "/health",
            "/v1/auth/password",
            "/v1/auth/two-factor",
            "/v1/auth/username-available",
            "/v1/auth/verification/send",
            "/v1/auth/verification/confirm",
            "/v1/auth/totp/provision",
            "/v1/auth/totp/confirm",
            "/v1/users",
            "/v1/fs/entry",
            "/v1/fs/directory",
            "/v1/fs/directory/delete",
            "/v1/fs/file",
            "/v1/fs/file/delete",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }
}
